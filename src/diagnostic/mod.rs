pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Span;
use crate::codegen::CompileError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::vm::VmError;

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

/// A reportable error, independent of how it is rendered.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<&'static str>,
    pub message: String,
    pub label: Option<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            code: None,
            message: message.into(),
            label: None,
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.label = Some(Label { span, message: label.into() });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ---- From impls for each error tier ----

impl From<&LexError> for Diagnostic {
    fn from(e: &LexError) -> Self {
        let span = Span {
            start: e.position,
            end: e.position + e.snippet.len().max(1),
        };
        let mut d = Diagnostic::error(format!("unexpected input '{}'", e.snippet))
            .with_code("SPD-L001")
            .with_span(span, "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(e: &ParseError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        let code = match e {
            CompileError::ScopeUnderflow => "SPD-C001",
            CompileError::TooManyLocals { .. } => "SPD-C002",
            CompileError::TooManyGlobals { .. } => "SPD-C003",
            CompileError::TooManyFunctions => "SPD-C004",
            CompileError::TooManyStrings => "SPD-C005",
            CompileError::TooManyArguments { .. } => "SPD-C006",
            CompileError::TooManyParameters { .. } => "SPD-C007",
            CompileError::JumpTooLarge { .. } => "SPD-C008",
            CompileError::LongOutOfRange { .. } => "SPD-C009",
            CompileError::InvalidLiteral { .. } => "SPD-C010",
        };
        let d = Diagnostic::error(e.to_string()).with_code(code);
        match e {
            CompileError::LongOutOfRange { .. } => {
                d.with_suggestion("LONG literals must fit in a signed 64-bit integer")
            }
            CompileError::JumpTooLarge { .. } => {
                d.with_suggestion("split the branch body into smaller functions")
            }
            _ => d,
        }
    }
}

impl From<&VmError> for Diagnostic {
    fn from(e: &VmError) -> Self {
        let code = match e {
            VmError::GlobalNotInitialized { .. } => "SPD-R001",
            VmError::NotCallable { .. } => "SPD-R002",
            VmError::ArityMismatch { .. } => "SPD-R003",
            VmError::Type { .. } => "SPD-R004",
            VmError::Decode(_) => "SPD-R005",
            VmError::UnknownFunction { .. } | VmError::UnknownString { .. } => "SPD-R006",
            VmError::BadLocal { .. } | VmError::StackUnderflow => "SPD-R007",
            VmError::StackOverflow { .. } | VmError::CallDepthExceeded { .. } => "SPD-R008",
            VmError::UnexpectedEnd { .. } => "SPD-R009",
            VmError::Native { .. } | VmError::Output(_) => "SPD-R010",
        };
        let d = Diagnostic::error(e.to_string()).with_code(code);
        match e {
            VmError::GlobalNotInitialized { .. } => {
                d.with_note("globals may be referenced before their `let`, but not read before it runs")
            }
            VmError::Type { .. } => d.with_note("arithmetic and comparison take NUMBER operands only"),
            _ => d,
        }
    }
}
