use serde::{Deserialize, Serialize};

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(r: std::ops::Range<usize>) -> Self {
        Span { start: r.start, end: r.end }
    }
}

/// Wraps a node with its source span. Transparent to serde (serializes as inner node only).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Spanned { node, span }
    }

    pub fn unknown(node: T) -> Self {
        Spanned { node, span: Span::UNKNOWN }
    }
}

impl<T> std::ops::Deref for Spanned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.node
    }
}

impl<T: Serialize> Serialize for Spanned<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.node.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Spanned<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Spanned::unknown)
    }
}

// ---- Core AST types ----

/// A whole compile unit: top-level statements in source order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Spanned<Stmt>>,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `{ stmt* }`
    Block(Vec<Spanned<Stmt>>),

    /// `if (cond) then_branch else else_branch`
    If {
        condition: Expr,
        then_branch: Box<Spanned<Stmt>>,
        else_branch: Option<Box<Spanned<Stmt>>>,
    },

    /// `return expr?;`
    Return(Option<Expr>),

    /// `let name (= expr)?;`
    Let { name: String, value: Option<Expr> },

    /// `expr;`
    Expr(Expr),
}

impl Stmt {
    /// True when control cannot fall through this statement: a `return`,
    /// a block with a statement that always returns, or an `if` whose two
    /// branches both always return.
    pub fn always_returns(&self) -> bool {
        match self {
            Stmt::Return(_) => true,
            Stmt::Block(body) => body.iter().any(|s| s.always_returns()),
            Stmt::If { then_branch, else_branch: Some(else_branch), .. } => {
                then_branch.always_returns() && else_branch.always_returns()
            }
            _ => false,
        }
    }
}

/// Literals keep their source text; numeric conversion (and the LONG range
/// check) happens in codegen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Numeric(String),
    Text(String),
    Bool(bool),
    Null,
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),

    /// Variable reference
    Ident(String),

    /// `left op right`
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `left && right`, `left || right`
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `name = value`, `name += value`, ...
    Assign {
        name: String,
        op: AssignOp,
        value: Box<Expr>,
    },

    /// `callee(args...)`
    Call { callee: Box<Expr>, args: Vec<Expr> },

    /// `function(params) { body }`
    Function { params: Vec<String>, body: Vec<Spanned<Stmt>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl BinOp {
    pub fn from_symbol(s: &str) -> Option<BinOp> {
        Some(match s {
            "+" => BinOp::Add,
            "-" => BinOp::Subtract,
            "*" => BinOp::Multiply,
            "/" => BinOp::Divide,
            "%" => BinOp::Modulo,
            "==" => BinOp::Equals,
            "!=" => BinOp::NotEquals,
            "<" => BinOp::LessThan,
            "<=" => BinOp::LessOrEqual,
            ">" => BinOp::GreaterThan,
            ">=" => BinOp::GreaterOrEqual,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// `=` stores directly; the compound forms read, combine, then store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Set,
    Compound(BinOp),
}
