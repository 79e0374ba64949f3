//! Syntax tree → bytecode.
//!
//! Locals live on the operand stack: a `let` inside a scope leaves its
//! initializer on the stack and records that position as the local's slot,
//! and leaving the scope pops it again. Top-level `let`s become globals.
//! Forward jumps are emitted with a placeholder offset and backpatched once
//! the length of the skipped code is known.

use tracing::debug;

use crate::ast::{self, AssignOp, BinOp, Expr, Literal, LogicalOp, Spanned, Stmt};
use crate::bytecode::chunk::{Chunk, SymbolTable};
use crate::bytecode::{Constant, Op, Program, Tag};

pub mod literal;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("internal error: scope depth fell below zero")]
    ScopeUnderflow,
    #[error("too many locals in one function (at '{name}'; limit 256)")]
    TooManyLocals { name: String },
    #[error("too many globals (at '{name}'; limit 255)")]
    TooManyGlobals { name: String },
    #[error("too many function literals (limit 255)")]
    TooManyFunctions,
    #[error("too many distinct string literals (limit 65536)")]
    TooManyStrings,
    #[error("call has {count} arguments (limit 255)")]
    TooManyArguments { count: usize },
    #[error("function has {count} parameters (limit 255)")]
    TooManyParameters { count: usize },
    #[error("jump over {distance} bytes does not fit in 16 bits")]
    JumpTooLarge { distance: usize },
    #[error("LONG literal out of range: {text}")]
    LongOutOfRange { text: String },
    #[error("invalid numeric literal: {text}")]
    InvalidLiteral { text: String },
}

type Result<T> = std::result::Result<T, CompileError>;

/// Compile a parsed program. The main code is the top-level statements in
/// order; each function literal becomes a function-table entry.
pub fn compile(program: &ast::Program) -> Result<Program> {
    let mut symbols = SymbolTable::new();
    let main = {
        let mut root = Chunk::root(&mut symbols);
        let mut codegen = Codegen { chunk: &mut root };
        for stmt in &program.statements {
            codegen.stmt(stmt)?;
        }
        root.finish()
    };
    let global_count = symbols.global_count();
    let (functions, strings) = symbols.into_parts();
    debug!(
        main_bytes = main.len(),
        functions = functions.len() - 1,
        strings = strings.len(),
        globals = global_count,
        "compiled program"
    );
    Ok(Program { main, functions, strings, global_count })
}

struct Codegen<'c, 't> {
    chunk: &'c mut Chunk<'t>,
}

impl Codegen<'_, '_> {
    fn stmt(&mut self, stmt: &Spanned<Stmt>) -> Result<()> {
        match &stmt.node {
            Stmt::Block(body) => self.block(body),

            Stmt::If { condition, then_branch, else_branch } => {
                self.expr(condition)?;
                let skip_then = self.chunk.emit_jump(Op::Cjf);
                self.branch(then_branch)?;
                match else_branch {
                    None => self.chunk.patch_jump(skip_then),
                    // The then-branch cannot fall through, so the else-branch
                    // can follow it directly.
                    Some(else_branch) if then_branch.always_returns() => {
                        self.chunk.patch_jump(skip_then)?;
                        self.branch(else_branch)
                    }
                    Some(else_branch) => {
                        let skip_else = self.chunk.emit_jump(Op::Jmp);
                        self.chunk.patch_jump(skip_then)?;
                        self.branch(else_branch)?;
                        self.chunk.patch_jump(skip_else)
                    }
                }
            }

            Stmt::Return(value) => {
                self.expr_or_null(value.as_ref())?;
                self.chunk.emit_op(Op::Return);
                Ok(())
            }

            Stmt::Let { name, value } => {
                // Compile the initializer before declaring, so `let x = x;`
                // reads the outer binding.
                self.expr_or_null(value.as_ref())?;
                if self.chunk.scope_depth() == 0 {
                    let slot = self.chunk.create_global(name)?;
                    self.emit_slot(Op::SetGlobal, slot);
                    self.chunk.emit_op(Op::Pop);
                } else {
                    self.chunk.create_local(name)?;
                }
                Ok(())
            }

            Stmt::Expr(expr) => {
                self.expr(expr)?;
                self.chunk.emit_op(Op::Pop);
                Ok(())
            }
        }
    }

    /// `{ ... }`: a new scope. Statements after one that always returns are
    /// unreachable and skipped.
    fn block(&mut self, body: &[Spanned<Stmt>]) -> Result<()> {
        self.chunk.enter_scope();
        for stmt in body {
            self.stmt(stmt)?;
            if stmt.always_returns() {
                break;
            }
        }
        self.chunk.leave_scope()?;
        Ok(())
    }

    /// An `if`/`else` branch. Inside a scope, an unbraced branch gets its own
    /// scope so a `let` in it is popped whether or not the branch runs.
    fn branch(&mut self, stmt: &Spanned<Stmt>) -> Result<()> {
        if self.chunk.scope_depth() == 0 || matches!(stmt.node, Stmt::Block(_)) {
            return self.stmt(stmt);
        }
        self.chunk.enter_scope();
        self.stmt(stmt)?;
        self.chunk.leave_scope()?;
        Ok(())
    }

    fn expr_or_null(&mut self, expr: Option<&Expr>) -> Result<()> {
        match expr {
            Some(e) => self.expr(e),
            None => {
                self.chunk.emit_push_tag(Tag::Null);
                Ok(())
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal(lit) => self.literal(lit),

            Expr::Ident(name) => self.load(name),

            Expr::Binary { op, left, right } => {
                self.expr(left)?;
                self.expr(right)?;
                self.chunk.emit_op(binary_op(*op));
                Ok(())
            }

            Expr::Logical { op, left, right } => {
                self.expr(left)?;
                // Peek-jump: a decisive left operand stays on the stack as
                // the result.
                let jump = match op {
                    LogicalOp::And => Op::Jf,
                    LogicalOp::Or => Op::Jt,
                };
                let at = self.chunk.emit_jump(jump);
                self.chunk.emit_op(Op::Pop);
                self.expr(right)?;
                self.chunk.patch_jump(at)
            }

            Expr::Assign { name, op, value } => {
                if let AssignOp::Compound(bin) = op {
                    self.load(name)?;
                    self.expr(value)?;
                    self.chunk.emit_op(binary_op(*bin));
                } else {
                    self.expr(value)?;
                }
                self.store(name)
            }

            Expr::Call { callee, args } => {
                let arity = u8::try_from(args.len())
                    .map_err(|_| CompileError::TooManyArguments { count: args.len() })?;
                self.expr(callee)?;
                for arg in args {
                    self.expr(arg)?;
                }
                self.chunk.emit_op(Op::Call);
                self.chunk.emit_u8(arity);
                Ok(())
            }

            Expr::Function { params, body } => self.function(params, body),
        }
    }

    fn function(&mut self, params: &[String], body: &[Spanned<Stmt>]) -> Result<()> {
        let arity = u8::try_from(params.len())
            .map_err(|_| CompileError::TooManyParameters { count: params.len() })?;

        let mut child = self.chunk.child();
        // Parameters sit one scope above the body so they are never popped;
        // RETURN discards them with the rest of the frame.
        child.enter_scope();
        for p in params {
            child.create_local(p)?;
        }
        Codegen { chunk: &mut child }.block(body)?;
        if !body.iter().any(|s| s.always_returns()) {
            child.emit_push_tag(Tag::Null);
            child.emit_op(Op::Return);
        }
        let len = child.len();
        let index = child.into_function(arity)?;
        debug!(index, arity, bytes = len, "compiled function");

        self.emit_constant(Constant::Function(index));
        Ok(())
    }

    fn literal(&mut self, lit: &Literal) -> Result<()> {
        let constant = match lit {
            Literal::Numeric(text) => literal::numeric(text)?,
            Literal::Text(s) => Constant::String(self.chunk.intern_string(s)?),
            Literal::Bool(b) => Constant::Boolean(*b),
            Literal::Null => Constant::Null,
        };
        self.emit_constant(constant);
        Ok(())
    }

    fn emit_constant(&mut self, c: Constant) {
        self.chunk.emit_push_tag(c.tag());
        match c {
            Constant::Number(n) => self.chunk.emit_double(n),
            Constant::Long(n) => self.chunk.emit_long(n),
            Constant::Boolean(b) => self.chunk.emit_u8(b as u8),
            Constant::String(i) => self.chunk.emit_u16(i),
            Constant::Function(i) => self.chunk.emit_u8(i),
            Constant::Null => 0,
        };
    }

    fn emit_slot(&mut self, op: Op, slot: u8) {
        self.chunk.emit_op(op);
        self.chunk.emit_u8(slot);
    }

    /// Identifiers that are not visible locals are globals.
    fn load(&mut self, name: &str) -> Result<()> {
        match self.chunk.local_slot(name) {
            Some(slot) => self.emit_slot(Op::GetLocal, slot),
            None => {
                let slot = self.chunk.global_slot(name)?;
                self.emit_slot(Op::GetGlobal, slot);
            }
        }
        Ok(())
    }

    fn store(&mut self, name: &str) -> Result<()> {
        match self.chunk.local_slot(name) {
            Some(slot) => self.emit_slot(Op::SetLocal, slot),
            None => {
                let slot = self.chunk.global_slot(name)?;
                self.emit_slot(Op::SetGlobal, slot);
            }
        }
        Ok(())
    }
}

fn binary_op(op: BinOp) -> Op {
    match op {
        BinOp::Add => Op::Add,
        BinOp::Subtract => Op::Sub,
        BinOp::Multiply => Op::Mul,
        BinOp::Divide => Op::Div,
        BinOp::Modulo => Op::Mod,
        BinOp::Equals => Op::Ceq,
        BinOp::NotEquals => Op::Cne,
        BinOp::LessThan => Op::Clt,
        BinOp::LessOrEqual => Op::Cle,
        BinOp::GreaterThan => Op::Cgt,
        BinOp::GreaterOrEqual => Op::Cge,
    }
}
