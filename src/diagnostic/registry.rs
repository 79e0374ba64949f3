/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    /// One line, for listings
    pub short: &'static str,
    /// Markdown, for `spoodle explain`
    pub long: &'static str,
}

/// Every stable error code. `L` lexer, `P` parser, `C` code generator,
/// `R` runtime.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Lexer ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "SPD-L001",
        short: "unexpected input",
        long: r#"## SPD-L001: unexpected input

The lexer met text that starts no token. Common causes are single-quoted
strings, an unterminated string, or `&`/`|` written alone.

    let s = 'hi';      // use "hi"
    if (a & b) ...     // use &&
"#,
    },
    // ── Parser ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "SPD-P001",
        short: "unexpected token",
        long: r#"## SPD-P001: unexpected token

A specific token was required here, usually a `;`, `)` or `}`.

    let x = 1          // missing ;
    $emit(x;           // missing )
"#,
    },
    ErrorEntry {
        code: "SPD-P002",
        short: "unexpected end of input",
        long: r#"## SPD-P002: unexpected end of input

The source ended while a token was still expected, for example an
unclosed block or a statement without its trailing `;`.
"#,
    },
    ErrorEntry {
        code: "SPD-P003",
        short: "expected identifier",
        long: r#"## SPD-P003: expected identifier

`let` and function parameters need a name: letters, digits and `_`,
not starting with a digit, optionally prefixed with `$`.

    let 1x = 2;        // names cannot start with a digit
"#,
    },
    ErrorEntry {
        code: "SPD-P004",
        short: "expected identifier, got end of input",
        long: r#"## SPD-P004: expected identifier, got end of input

The source ended right after `let` or inside a parameter list.
"#,
    },
    ErrorEntry {
        code: "SPD-P005",
        short: "expected statement",
        long: r#"## SPD-P005: expected statement

The source ended where a statement was required, such as the branch of
an `if` or `else`.

    if (x)             // needs a statement or block
"#,
    },
    ErrorEntry {
        code: "SPD-P006",
        short: "expected expression",
        long: r#"## SPD-P006: expected expression

An operand is missing. There are no unary operators, so `-1` must be
written `0 - 1`.

    let y = -1;
    f(1, );
"#,
    },
    ErrorEntry {
        code: "SPD-P007",
        short: "expected expression, got end of input",
        long: r#"## SPD-P007: expected expression, got end of input

The source ended in the middle of an expression.
"#,
    },
    ErrorEntry {
        code: "SPD-P008",
        short: "duplicate parameter",
        long: r#"## SPD-P008: duplicate parameter

Each parameter of a function must have a distinct name.

    function(a, a) { return a; }
"#,
    },
    ErrorEntry {
        code: "SPD-P009",
        short: "nesting too deep",
        long: r#"## SPD-P009: nesting too deep

Blocks, `if` statements, parentheses and chains of operators can nest at
most 128 levels. Each further operand of a chain like `a + b + c` counts
as one level. Split the expression with `let` or move code into a
function.
"#,
    },
    // ── Code generator ───────────────────────────────────────────────────────
    ErrorEntry {
        code: "SPD-C001",
        short: "scope underflow (compiler bug)",
        long: r#"## SPD-C001: scope underflow

The code generator closed more scopes than it opened. This is a
compiler bug, not a problem with the program.
"#,
    },
    ErrorEntry {
        code: "SPD-C002",
        short: "too many locals",
        long: r#"## SPD-C002: too many locals

Local slots are one byte, so a function body can have at most 256
parameters and block locals alive at once. Move values into globals or
split the function.
"#,
    },
    ErrorEntry {
        code: "SPD-C003",
        short: "too many globals",
        long: r#"## SPD-C003: too many globals

Global slots are one byte and slots 0-2 are reserved, so a program can
name at most 253 distinct globals (including ones only ever read).
"#,
    },
    ErrorEntry {
        code: "SPD-C004",
        short: "too many functions",
        long: r#"## SPD-C004: too many functions

Function references are one byte and index 0 is the main code, so a
program can contain at most 255 `function` literals.
"#,
    },
    ErrorEntry {
        code: "SPD-C005",
        short: "too many string literals",
        long: r#"## SPD-C005: too many string literals

String references are two bytes; at most 65536 distinct string
literals fit in one program. Identical literals share an entry.
"#,
    },
    ErrorEntry {
        code: "SPD-C006",
        short: "too many call arguments",
        long: r#"## SPD-C006: too many call arguments

`CALL` carries its argument count in one byte; at most 255 arguments.
"#,
    },
    ErrorEntry {
        code: "SPD-C007",
        short: "too many parameters",
        long: r#"## SPD-C007: too many parameters

A function's arity is one byte; at most 255 parameters.
"#,
    },
    ErrorEntry {
        code: "SPD-C008",
        short: "jump too large",
        long: r#"## SPD-C008: jump too large

Jump offsets are 16-bit, so an `if` branch or the right side of `&&`/`||`
must compile to fewer than 65536 bytes. Move the body into a function.
"#,
    },
    ErrorEntry {
        code: "SPD-C009",
        short: "LONG literal out of range",
        long: r#"## SPD-C009: LONG literal out of range

A literal with the `l` suffix must fit in a signed 64-bit integer
(at most 9223372036854775807).
"#,
    },
    ErrorEntry {
        code: "SPD-C010",
        short: "invalid numeric literal",
        long: r#"## SPD-C010: invalid numeric literal

LONG literals must be whole numbers: `1.5l` is rejected.
"#,
    },
    // ── Runtime ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "SPD-R001",
        short: "global not initialized",
        long: r#"## SPD-R001: global not initialized

A global was read before any value was stored in it. Globals may be
mentioned before their `let` (that compiles), but the `let` must run
first.

    $emit(x);          // fails at runtime
    let x = 1;
"#,
    },
    ErrorEntry {
        code: "SPD-R002",
        short: "call of a non-function",
        long: r#"## SPD-R002: call of a non-function

Only `function` values and built-ins can be called.

    let n = 3;
    n();
"#,
    },
    ErrorEntry {
        code: "SPD-R003",
        short: "wrong number of arguments",
        long: r#"## SPD-R003: wrong number of arguments

A function was called with a different number of arguments than it
declares parameters. Pass `null` explicitly for unused ones.
"#,
    },
    ErrorEntry {
        code: "SPD-R004",
        short: "operand type mismatch",
        long: r#"## SPD-R004: operand type mismatch

Arithmetic and comparison operators, `==` and `!=` included, accept
NUMBER operands only. LONG, STRING and BOOLEAN values are rejected.

    "a" + "b";
    1l + 2l;
"#,
    },
    ErrorEntry {
        code: "SPD-R005",
        short: "malformed bytecode",
        long: r#"## SPD-R005: malformed bytecode

The engine decoded an unknown opcode or type tag, or an instruction ran
past the end of its buffer. Bytecode from the compiler never does this.
"#,
    },
    ErrorEntry {
        code: "SPD-R006",
        short: "dangling table reference",
        long: r#"## SPD-R006: dangling table reference

An instruction referred to a function or string table entry that does
not exist. Bytecode from the compiler never does this.
"#,
    },
    ErrorEntry {
        code: "SPD-R007",
        short: "stack underflow",
        long: r#"## SPD-R007: stack underflow

An instruction needed more operands than the stack held, or a local slot
pointed past the top. Bytecode from the compiler never does this.
"#,
    },
    ErrorEntry {
        code: "SPD-R008",
        short: "resource limit exceeded",
        long: r#"## SPD-R008: resource limit exceeded

The operand stack or call depth passed its limit, usually because of
unbounded recursion.

    let f = function() { return f(); };
    f();
"#,
    },
    ErrorEntry {
        code: "SPD-R009",
        short: "function ran off its end",
        long: r#"## SPD-R009: function ran off its end

Execution reached the end of a function body without `RETURN`. The
compiler always terminates bodies, so this means hand-built bytecode.
"#,
    },
    ErrorEntry {
        code: "SPD-R010",
        short: "built-in failed",
        long: r#"## SPD-R010: built-in failed

A built-in such as `$typeof` rejected its arguments, or `$emit` could not
write its output.
"#,
    },
];

/// Look up an error entry by code (e.g. `"SPD-R001"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code == code)
}
