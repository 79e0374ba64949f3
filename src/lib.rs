//! spoodle: a small dynamically typed language compiled to a compact
//! bytecode and run on a stack machine that can be single-stepped.
//!
//! ```text
//! source ──lexer/parser──▶ ast ──codegen──▶ bytecode::Program ──▶ vm::Context
//!                                                           └──▶ disasm
//! ```

pub mod ast;
pub mod bytecode;
pub mod codegen;
pub mod diagnostic;
pub mod disasm;
pub mod lexer;
pub mod parser;
pub mod vm;

use bytecode::{DecodeError, Program};
use codegen::CompileError;
use diagnostic::Diagnostic;
use disasm::Listing;
use vm::snapshot::Snapshot;
use vm::value::Value;
use vm::{Context, Output, Step, VmError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] VmError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<&Error> for Diagnostic {
    fn from(e: &Error) -> Self {
        match e {
            Error::Compile(e) => e.into(),
            Error::Runtime(e) => e.into(),
            Error::Decode(e) => (&VmError::Decode(e.clone())).into(),
        }
    }
}

/// Lex and parse. The tree is only meaningful when no diagnostics came back.
pub fn parse(source: &str) -> (ast::Program, Vec<Diagnostic>) {
    let tokens = match lexer::lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => return (ast::Program::default(), errors.iter().map(Diagnostic::from).collect()),
    };
    let (program, errors) = parser::parse(tokens);
    (program, errors.iter().map(Diagnostic::from).collect())
}

/// Compile a syntax tree that parsed cleanly.
pub fn compile(program: &ast::Program) -> Result<Program, Error> {
    Ok(codegen::compile(program)?)
}

/// Parse and compile `source`. Syntax errors go to `on_error` as
/// `(line, column, message)`, 1-based, and produce `Ok(None)`; the code
/// generator does not run in that case.
pub fn compile_source(
    source: &str,
    mut on_error: impl FnMut(usize, usize, &str),
) -> Result<Option<Program>, Error> {
    let (tree, diagnostics) = parse(source);
    if !diagnostics.is_empty() {
        let map = ast::SourceMap::new(source);
        for d in &diagnostics {
            let (line, col) = d.label.as_ref().map_or((1, 1), |l| map.lookup(l.span.start));
            on_error(line, col, &d.message);
        }
        return Ok(None);
    }
    compile(&tree).map(Some)
}

/// Execute `program` to completion, `$emit` writing to `out`.
pub fn run(program: &Program, out: Output) -> Result<Value, Error> {
    Ok(Context::new(program, out).execute()?)
}

/// Start a paused execution of `program`. Nothing runs until `step`.
pub fn debug(program: &Program, out: Output) -> Result<DebugSession<'_>, Error> {
    Ok(DebugSession {
        context: Context::new(program, out),
        listing: disasm::disassemble_program(program)?,
    })
}

/// An execution driven one instruction at a time, with the program listing
/// to map the instruction pointer onto.
pub struct DebugSession<'p> {
    context: Context<'p>,
    listing: Listing,
}

impl<'p> DebugSession<'p> {
    pub fn step(&mut self) -> Result<Step, Error> {
        Ok(self.context.step_one()?)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.context.snapshot()
    }

    /// Listing line of the instruction that executes next.
    pub fn current_line(&self) -> Option<usize> {
        self.listing.line_of(self.context.function(), self.context.ip())
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn context(&self) -> &Context<'p> {
        &self.context
    }
}
