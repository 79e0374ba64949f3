use logos::Logos;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
pub enum Token {
    // Keywords
    #[token("let")]
    Let,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("function")]
    Function,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,

    // Assignment
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,

    // Operators
    #[token("||")]
    OrOr,
    #[token("&&")]
    AndAnd,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Literals. Numbers keep their text (suffix included) so codegen can
    // pick NUMBER or LONG and range-check.
    #[regex(r"[0-9]+(\.[0-9]+)?[bBsSlL]?", |lex| lex.slice().to_string())]
    Number(String),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    Text(String),

    // `$` prefixes are part of the name; built-ins use them.
    #[regex(r"\$?[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// Short human-readable form used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number '{n}'"),
            Token::Text(s) => format!("string \"{s}\""),
            Token::Ident(name) => format!("identifier '{name}'"),
            other => format!("{other:?}"),
        }
    }
}

/// Lexing stops collecting after this many errors.
pub const MAX_ERRORS: usize = 20;

/// Lex source code into a stream of tokens with positions. Bad input is
/// skipped and lexing carries on, so every bad spot (up to `MAX_ERRORS`) is
/// reported at once.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, Vec<LexError>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                errors.push(LexError {
                    position: span.start,
                    snippet: source[span.clone()].to_string(),
                    suggestion: suggest_fix(&source[span]),
                });
                if errors.len() == MAX_ERRORS {
                    break;
                }
            }
        }
    }

    if errors.is_empty() { Ok(tokens) } else { Err(errors) }
}

fn suggest_fix(bad_token: &str) -> String {
    match bad_token.chars().next() {
        Some('\'') => "String literals use double quotes".to_string(),
        Some('"') => "Unterminated string literal".to_string(),
        Some('&') => "Logical and is written '&&'".to_string(),
        Some('|') => "Logical or is written '||'".to_string(),
        Some('!') => "There is no unary '!'; compare with 'false' instead".to_string(),
        _ => format!("Unexpected character(s): '{}'", bad_token),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}
