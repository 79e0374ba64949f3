use crate::ast::*;
use crate::lexer::Token;

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    errors: Vec<ParseError>,
    /// Current nesting of statements and expressions; bounded so deep input
    /// is a syntax error instead of a stack overflow.
    depth: usize,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

type Result<T> = std::result::Result<T, ParseError>;

const MAX_ERRORS: usize = 20;

/// Deepest nesting of blocks, `if`s, parentheses and operator chains.
pub const MAX_NESTING: usize = 128;

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Parser { tokens, pos: 0, errors: Vec::new(), depth: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn token_at(&self, idx: usize) -> Option<&Token> {
        self.tokens.get(idx).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, s)) => *s,
            // At EOF point just past the last token
            None => self
                .tokens
                .last()
                .map(|(_, s)| Span { start: s.end, end: s.end })
                .unwrap_or(Span::UNKNOWN),
        }
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|(_, s)| *s)
            .unwrap_or(Span::UNKNOWN)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => {
                let msg = format!("expected {:?}, got {}", expected, tok.describe());
                Err(self.error("SPD-P001", msg))
            }
            None => Err(self.error("SPD-P002", format!("expected {:?}, got EOF", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(name)
            }
            Some(tok) => {
                let msg = format!("expected identifier, got {}", tok.describe());
                Err(self.error("SPD-P003", msg))
            }
            None => Err(self.error("SPD-P004", "expected identifier, got EOF".into())),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError {
            code,
            position: self.pos,
            span: self.peek_span(),
            message,
        }
    }

    fn descend(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING {
            let msg = format!("nesting deeper than {MAX_NESTING} levels");
            return Err(self.error("SPD-P009", msg));
        }
        self.depth += 1;
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    // ---- Top-level parsing ----

    /// Parse the whole token stream. Errors are collected rather than
    /// returned early; the program is only meaningful if the list is empty.
    pub fn parse_program(mut self) -> (Program, Vec<ParseError>) {
        let statements = self.parse_statements(false);
        (Program { statements }, self.errors)
    }

    /// Parse statements until EOF (top level) or a closing `}` (nested).
    fn parse_statements(&mut self, nested: bool) -> Vec<Spanned<Stmt>> {
        let mut statements = Vec::new();
        loop {
            if self.at_end() || (nested && self.peek() == Some(&Token::RBrace)) {
                break;
            }
            if self.errors.len() >= MAX_ERRORS {
                // Give up: skip the rest so the caller terminates.
                self.pos = self.tokens.len();
                break;
            }
            let start = self.pos;
            let depth = self.depth;
            let result = self.parse_statement();
            // An error unwinds past the matching decrements.
            self.depth = depth;
            match result {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.sync_to_statement_boundary(nested);
                    if self.pos == start && !self.at_end() && !nested {
                        self.advance();
                    }
                }
            }
        }
        statements
    }

    /// Skip tokens until just after the next `;` or just before the `}` that
    /// closes the current block. Nested `{…}` groups are skipped atomically.
    fn sync_to_statement_boundary(&mut self, nested: bool) {
        let mut depth: usize = 0;
        while let Some(tok) = self.peek() {
            match tok {
                Token::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                Token::LBrace => depth += 1,
                Token::RBrace if depth == 0 => {
                    if !nested {
                        self.advance();
                    }
                    return;
                }
                Token::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        // `};` closes a function-literal statement
                        self.eat(&Token::Semi);
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_statement(&mut self) -> Result<Spanned<Stmt>> {
        self.descend()?;
        let start = self.peek_span();
        let stmt = match self.peek() {
            Some(Token::LBrace) => Stmt::Block(self.parse_block()?),
            Some(Token::If) => self.parse_if()?,
            Some(Token::Return) => self.parse_return()?,
            Some(Token::Let) => self.parse_let()?,
            Some(_) => {
                let expr = self.parse_expr()?;
                self.expect(&Token::Semi)?;
                Stmt::Expr(expr)
            }
            None => return Err(self.error("SPD-P005", "expected statement, got EOF".into())),
        };
        self.depth -= 1;
        Ok(Spanned::new(stmt, start.merge(self.prev_span())))
    }

    fn parse_block(&mut self) -> Result<Vec<Spanned<Stmt>>> {
        self.expect(&Token::LBrace)?;
        let body = self.parse_statements(true);
        self.expect(&Token::RBrace)?;
        Ok(body)
    }

    /// `if (cond) stmt (else stmt)?`
    fn parse_if(&mut self) -> Result<Stmt> {
        self.expect(&Token::If)?;
        self.expect(&Token::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(&Token::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        self.expect(&Token::Return)?;
        let value = if self.peek() == Some(&Token::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::Semi)?;
        Ok(Stmt::Return(value))
    }

    fn parse_let(&mut self) -> Result<Stmt> {
        self.expect(&Token::Let)?;
        let name = self.expect_ident()?;
        let value = if self.eat(&Token::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&Token::Semi)?;
        Ok(Stmt::Let { name, value })
    }

    // ---- Expressions ----

    fn parse_expr(&mut self) -> Result<Expr> {
        self.descend()?;
        let expr = self.parse_assign()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_assign(&mut self) -> Result<Expr> {
        if let Some(Token::Ident(name)) = self.peek() {
            if let Some(op) = self.token_at(self.pos + 1).and_then(assign_op) {
                let name = name.clone();
                self.pos += 2;
                let value = self.parse_expr()?;
                return Ok(Expr::Assign { name, op, value: Box::new(value) });
            }
        }
        self.parse_or()
    }

    // Each further operand of a chain sits one level deeper in the tree, so
    // chains count toward the nesting limit too.

    fn parse_or(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            self.descend()?;
            let right = self.parse_and()?;
            left = Expr::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.parse_binary(0)?;
        while self.eat(&Token::AndAnd) {
            self.descend()?;
            let right = self.parse_binary(0)?;
            left = Expr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = depth;
        Ok(left)
    }

    /// Left-associative binary operators, one precedence level per entry of
    /// `LEVELS` (loosest first).
    fn parse_binary(&mut self, level: usize) -> Result<Expr> {
        if level == LEVELS.len() {
            return self.parse_call();
        }
        let depth = self.depth;
        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = self.peek().and_then(|t| binary_op(t, level)) {
            self.advance();
            self.descend()?;
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_call(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut expr = self.parse_primary()?;
        while self.eat(&Token::LParen) {
            self.descend()?;
            let mut args = Vec::new();
            if self.peek() != Some(&Token::RParen) {
                loop {
                    args.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            self.expect(&Token::RParen)?;
            expr = Expr::Call { callee: Box::new(expr), args };
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Number(text)) => {
                self.advance();
                Ok(Expr::Literal(Literal::Numeric(text)))
            }
            Some(Token::Text(s)) => {
                self.advance();
                Ok(Expr::Literal(Literal::Text(s)))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Some(Token::Null) => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Function) => self.parse_function(),
            Some(tok) => {
                let msg = format!("expected expression, got {}", tok.describe());
                Err(self.error("SPD-P006", msg))
            }
            None => Err(self.error("SPD-P007", "expected expression, got EOF".into())),
        }
    }

    /// `function(a, b) { body }`
    fn parse_function(&mut self) -> Result<Expr> {
        self.expect(&Token::Function)?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                let name = self.expect_ident()?;
                if params.contains(&name) {
                    let msg = format!("duplicate parameter '{name}'");
                    return Err(ParseError { span: self.prev_span(), ..self.error("SPD-P008", msg) });
                }
                params.push(name);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        let body = self.parse_block()?;
        Ok(Expr::Function { params, body })
    }
}

const LEVELS: [&[(Token, BinOp)]; 4] = [
    &[(Token::EqEq, BinOp::Equals), (Token::NotEq, BinOp::NotEquals)],
    &[
        (Token::Less, BinOp::LessThan),
        (Token::LessEq, BinOp::LessOrEqual),
        (Token::Greater, BinOp::GreaterThan),
        (Token::GreaterEq, BinOp::GreaterOrEqual),
    ],
    &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Subtract)],
    &[(Token::Star, BinOp::Multiply), (Token::Slash, BinOp::Divide), (Token::Percent, BinOp::Modulo)],
];

fn binary_op(tok: &Token, level: usize) -> Option<BinOp> {
    LEVELS[level].iter().find(|(t, _)| t == tok).map(|(_, op)| *op)
}

fn assign_op(tok: &Token) -> Option<AssignOp> {
    Some(match tok {
        Token::Assign => AssignOp::Set,
        Token::PlusEq => AssignOp::Compound(BinOp::Add),
        Token::MinusEq => AssignOp::Compound(BinOp::Subtract),
        Token::StarEq => AssignOp::Compound(BinOp::Multiply),
        Token::SlashEq => AssignOp::Compound(BinOp::Divide),
        Token::PercentEq => AssignOp::Compound(BinOp::Modulo),
        _ => return None,
    })
}

/// Parse a token stream (as produced by `lexer::lex`) into a program plus
/// every syntax error found.
pub fn parse(tokens: Vec<(Token, std::ops::Range<usize>)>) -> (Program, Vec<ParseError>) {
    let tokens = tokens.into_iter().map(|(t, r)| (t, Span::from(r))).collect();
    Parser::new(tokens).parse_program()
}
