//! Code buffer plus symbol bookkeeping for one compile unit.
//!
//! A compilation owns one [`SymbolTable`] (globals, function table, string
//! table). The root [`Chunk`] emits the main code; every function literal
//! gets a child chunk that borrows the same table, so global and function
//! lookups never walk a parent chain.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Function, Op, Tag};
use crate::codegen::CompileError;

/// Built-in globals, in slot order starting at 1. Slot 0 is never used.
pub const RESERVED_GLOBALS: [&str; 2] = ["$emit", "$typeof"];

/// Slots `0..=RESERVED_SLOTS` cannot be written by programs.
pub const RESERVED_SLOTS: u8 = RESERVED_GLOBALS.len() as u8;

const INITIAL_CAPACITY: usize = 128;

type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug)]
pub struct SymbolTable {
    globals: HashMap<String, u8>,
    functions: Vec<Option<Function>>,
    strings: Vec<Arc<str>>,
    string_index: HashMap<Arc<str>, u16>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            globals: HashMap::new(),
            // index 0 is the main code
            functions: vec![None],
            strings: Vec::new(),
            string_index: HashMap::new(),
        };
        for (i, name) in RESERVED_GLOBALS.iter().enumerate() {
            table.globals.insert(name.to_string(), i as u8 + 1);
        }
        table
    }

    /// Idempotent: returns the existing slot if `name` is already known.
    pub fn create_global(&mut self, name: &str) -> Result<u8> {
        if let Some(&slot) = self.globals.get(name) {
            return Ok(slot);
        }
        let slot = u8::try_from(self.globals.len() + 1)
            .map_err(|_| CompileError::TooManyGlobals { name: name.to_string() })?;
        self.globals.insert(name.to_string(), slot);
        Ok(slot)
    }

    pub fn global_count(&self) -> usize {
        self.globals.len() + 1
    }

    pub fn add_function(&mut self, arity: u8, code: Arc<[u8]>) -> Result<u8> {
        let index = u8::try_from(self.functions.len()).map_err(|_| CompileError::TooManyFunctions)?;
        self.functions.push(Some(Function { arity, code }));
        Ok(index)
    }

    /// Interned: equal strings share an index.
    pub fn intern_string(&mut self, s: &str) -> Result<u16> {
        if let Some(&i) = self.string_index.get(s) {
            return Ok(i);
        }
        let index = u16::try_from(self.strings.len()).map_err(|_| CompileError::TooManyStrings)?;
        let s: Arc<str> = Arc::from(s);
        self.strings.push(s.clone());
        self.string_index.insert(s, index);
        Ok(index)
    }

    pub fn into_parts(self) -> (Vec<Option<Function>>, Vec<Arc<str>>) {
        (self.functions, self.strings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    pub scope: usize,
    pub slot: u8,
}

pub struct Chunk<'t> {
    code: Vec<u8>,
    scope: usize,
    /// Live locals in declaration order; the innermost binding of a name is
    /// the last one with that name.
    locals: Vec<Local>,
    symbols: &'t mut SymbolTable,
}

impl<'t> Chunk<'t> {
    pub fn root(symbols: &'t mut SymbolTable) -> Self {
        Chunk {
            code: Vec::with_capacity(INITIAL_CAPACITY),
            scope: 0,
            locals: Vec::new(),
            symbols,
        }
    }

    /// A fresh chunk for a function body, sharing this chunk's symbol table.
    pub fn child(&mut self) -> Chunk<'_> {
        Chunk::root(&mut *self.symbols)
    }

    // ---- Emission ----

    /// Append raw bytes. Returns the number of bytes written.
    pub fn emit_bytes(&mut self, bytes: &[u8]) -> usize {
        self.code.extend_from_slice(bytes);
        bytes.len()
    }

    pub fn emit_op(&mut self, op: Op) -> usize {
        self.emit_bytes(&[op as u8])
    }

    pub fn emit_u8(&mut self, v: u8) -> usize {
        self.emit_bytes(&[v])
    }

    pub fn emit_u16(&mut self, v: u16) -> usize {
        self.emit_bytes(&v.to_le_bytes())
    }

    pub fn emit_double(&mut self, v: f64) -> usize {
        self.emit_bytes(&v.to_le_bytes())
    }

    pub fn emit_long(&mut self, v: i64) -> usize {
        self.emit_bytes(&v.to_le_bytes())
    }

    pub fn emit_push_tag(&mut self, tag: Tag) -> usize {
        self.emit_op(Op::Push) + self.emit_u8(tag as u8)
    }

    /// Emit a jump with a placeholder offset. Returns the offset field's
    /// position for `patch_jump`.
    pub fn emit_jump(&mut self, op: Op) -> usize {
        debug_assert!(op.is_jump());
        self.emit_op(op);
        let at = self.code.len();
        self.emit_u16(u16::MAX);
        at
    }

    /// Point the jump whose offset field sits at `at` to the current end of
    /// the code. Offsets count from the byte after the field.
    pub fn patch_jump(&mut self, at: usize) -> Result<()> {
        let distance = self.code.len() - (at + 2);
        let offset = u16::try_from(distance).map_err(|_| CompileError::JumpTooLarge { distance })?;
        self.code[at..at + 2].copy_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    // ---- Locals and scopes ----

    pub fn scope_depth(&self) -> usize {
        self.scope
    }

    /// Register `name` at the current scope in the next stack slot. Emits
    /// nothing: the value already on the stack becomes the local's storage.
    pub fn create_local(&mut self, name: &str) -> Result<u8> {
        let slot = u8::try_from(self.locals.len())
            .map_err(|_| CompileError::TooManyLocals { name: name.to_string() })?;
        self.locals.push(Local { name: name.to_string(), scope: self.scope, slot });
        Ok(slot)
    }

    /// Slot of the innermost visible local called `name`.
    pub fn local_slot(&self, name: &str) -> Option<u8> {
        self.locals.iter().rev().find(|l| l.name == name).map(|l| l.slot)
    }

    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    pub fn enter_scope(&mut self) {
        self.scope += 1;
    }

    /// Close the current scope, emitting one POP per local it declared.
    /// Returns the bytes written.
    pub fn leave_scope(&mut self) -> Result<usize> {
        self.scope = self.scope.checked_sub(1).ok_or(CompileError::ScopeUnderflow)?;
        let mut written = 0;
        while self.locals.last().is_some_and(|l| l.scope > self.scope) {
            self.locals.pop();
            written += self.emit_op(Op::Pop);
        }
        Ok(written)
    }

    // ---- Root table delegation ----

    pub fn create_global(&mut self, name: &str) -> Result<u8> {
        self.symbols.create_global(name)
    }

    /// Slot for `name`, created on first use so globals may be referenced
    /// before their `let`.
    pub fn global_slot(&mut self, name: &str) -> Result<u8> {
        self.symbols.create_global(name)
    }

    pub fn intern_string(&mut self, s: &str) -> Result<u16> {
        self.symbols.intern_string(s)
    }

    /// Finalize this chunk as a function body and append it to the shared
    /// function table. Returns the function's index.
    pub fn into_function(self, arity: u8) -> Result<u8> {
        let symbols = self.symbols;
        let code: Arc<[u8]> = Arc::from(self.code.as_slice());
        symbols.add_function(arity, code)
    }

    /// Exact-length immutable copy of the code emitted so far.
    pub fn finish(self) -> Arc<[u8]> {
        Arc::from(self.code.as_slice())
    }
}
