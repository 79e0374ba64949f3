//! Stack machine executing [`bytecode::Program`](crate::bytecode::Program).
//!
//! A [`Context`] is the whole mutable machine state. [`Context::step_one`]
//! applies exactly one instruction, so the boundary between two calls is the
//! only place execution can be suspended; dropping a `Context` at any such
//! boundary is always safe.
//!
//! Call protocol: before `CALL n` the stack holds `[.., callee, arg0 .. argN-1]`.
//! A user function gets a new frame whose base pointer is the index of
//! `arg0`, so parameters are locals `0..n`. `RETURN` overwrites the callee
//! slot with the return value and drops everything above it.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::bytecode::chunk::RESERVED_SLOTS;
use crate::bytecode::{Constant, DecodeError, Instruction, Op, Program, Tag};

pub mod natives;
pub mod snapshot;
pub mod value;

use snapshot::{FrameSnapshot, Snapshot, ValueSnapshot};
use value::Value;

/// Where `$emit` writes.
pub type Output = Rc<RefCell<dyn Write>>;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("global not initialized (slot {slot})")]
    GlobalNotInitialized { slot: u8 },
    #[error("attempted to call non-function ({tag})")]
    NotCallable { tag: Tag },
    #[error("function #{id} expects {expected} arguments, got {got}")]
    ArityMismatch { id: u8, expected: u8, got: u8 },
    #[error("cannot apply {op} to {left} and {right}")]
    Type { op: Op, left: Tag, right: Tag },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no function #{id} in the function table")]
    UnknownFunction { id: usize },
    #[error("no string #{index} in the string table")]
    UnknownString { index: u16 },
    #[error("local slot {slot} is outside the operand stack")]
    BadLocal { slot: u8 },
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("operand stack overflow (limit {limit})")]
    StackOverflow { limit: usize },
    #[error("call depth exceeded (limit {limit})")]
    CallDepthExceeded { limit: usize },
    #[error("function #{id} ran past the end of its code")]
    UnexpectedEnd { id: usize },
    #[error("{name}: {message}")]
    Native { name: &'static str, message: String },
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

pub type VmResult<T> = Result<T, VmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_stack: usize,
    pub max_frames: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_stack: 65_536, max_frames: 4_096 }
    }
}

/// Saved caller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub function: usize,
    pub ip: usize,
    pub bp: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue,
    /// Top-level `RETURN` (or the end of the main code) was reached.
    Halt(Value),
}

pub struct Context<'p> {
    program: &'p Program,
    ip: usize,
    bp: usize,
    function: usize,
    globals: Vec<Option<Value>>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    limits: Limits,
    result: Option<Value>,
}

impl<'p> Context<'p> {
    /// A context positioned at the first instruction of the main code, with
    /// built-ins installed. Nothing runs until `step_one` or `execute`.
    pub fn new(program: &'p Program, out: Output) -> Self {
        let mut globals = vec![None; program.global_count.max(RESERVED_SLOTS as usize + 1)];
        natives::install(&mut globals, out);
        Context {
            program,
            ip: 0,
            bp: 0,
            function: 0,
            globals,
            stack: Vec::with_capacity(256),
            // The synthetic top-level frame; RETURN never pops it.
            frames: vec![Frame { function: 0, ip: 0, bp: 0 }],
            limits: Limits::default(),
            result: None,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn bp(&self) -> usize {
        self.bp
    }

    pub fn function(&self) -> usize {
        self.function
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn globals(&self) -> &[Option<Value>] {
        &self.globals
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.result.is_some()
    }

    /// Run until the program halts.
    pub fn execute(&mut self) -> VmResult<Value> {
        loop {
            if let Step::Halt(v) = self.step_one()? {
                return Ok(v);
            }
        }
    }

    /// Decode and apply one instruction. Once halted, further calls keep
    /// returning the same result without touching state.
    pub fn step_one(&mut self) -> VmResult<Step> {
        if let Some(v) = &self.result {
            return Ok(Step::Halt(v.clone()));
        }
        let program = self.program;
        let code = program
            .code(self.function)
            .ok_or(VmError::UnknownFunction { id: self.function })?;
        if self.ip >= code.len() {
            if self.function != 0 {
                return Err(VmError::UnexpectedEnd { id: self.function });
            }
            return Ok(self.halt(Value::Null));
        }

        let (inst, len) = Instruction::decode(code, self.ip)?;
        trace!(
            function = self.function,
            ip = self.ip,
            op = %inst.op(),
            depth = self.stack.len(),
            "step"
        );
        self.ip += len;

        match inst {
            Instruction::Push(c) => {
                let v = self.constant(c)?;
                self.push(v)?;
            }
            Instruction::Simple(Op::Pop) => {
                self.pop()?;
            }
            Instruction::Jump(op, offset) => {
                let taken = match op {
                    Op::Jmp => true,
                    Op::Cjf => !self.pop()?.is_truthy(),
                    Op::Jt => self.top()?.is_truthy(),
                    _ => !self.top()?.is_truthy(),
                };
                if taken {
                    self.ip += offset as usize;
                }
            }
            Instruction::Slot(Op::GetLocal, slot) => {
                let v = self.local(slot)?.clone();
                self.push(v)?;
            }
            Instruction::Slot(Op::SetLocal, slot) => {
                let v = self.top()?.clone();
                *self.local(slot)? = v;
            }
            Instruction::Slot(Op::GetGlobal, slot) => {
                let v = self
                    .globals
                    .get(slot as usize)
                    .and_then(Option::as_ref)
                    .ok_or(VmError::GlobalNotInitialized { slot })?
                    .clone();
                self.push(v)?;
            }
            Instruction::Slot(_, slot) => self.set_global(slot)?,
            Instruction::Call(argc) => self.call(argc)?,
            Instruction::Simple(Op::Return) => {
                if let Some(v) = self.ret()? {
                    return Ok(self.halt(v));
                }
            }
            Instruction::Simple(op) => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(binary(op, left, right)?)?;
            }
        }
        Ok(Step::Continue)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            ip: self.ip,
            bp: self.bp,
            function: self.function,
            stack: self.stack.iter().map(ValueSnapshot::from).collect(),
            globals: self.globals.iter().map(|g| g.as_ref().map(ValueSnapshot::from)).collect(),
            frames: self.frames.iter().map(FrameSnapshot::from).collect(),
            halted: self.is_halted(),
        }
    }

    fn halt(&mut self, v: Value) -> Step {
        debug!(result = %v, depth = self.stack.len(), "program halted");
        self.result = Some(v.clone());
        Step::Halt(v)
    }

    fn constant(&self, c: Constant) -> VmResult<Value> {
        Ok(match c {
            Constant::Number(n) => Value::Number(n),
            Constant::Long(n) => Value::Long(n),
            Constant::Boolean(b) => Value::Boolean(b),
            Constant::String(index) => Value::String(
                self.program
                    .strings
                    .get(index as usize)
                    .ok_or(VmError::UnknownString { index })?
                    .clone(),
            ),
            Constant::Function(i) => Value::Function(i),
            Constant::Null => Value::Null,
        })
    }

    fn push(&mut self, v: Value) -> VmResult<()> {
        if self.stack.len() >= self.limits.max_stack {
            return Err(VmError::StackOverflow { limit: self.limits.max_stack });
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn top(&self) -> VmResult<&Value> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    fn local(&mut self, slot: u8) -> VmResult<&mut Value> {
        self.stack.get_mut(self.bp + slot as usize).ok_or(VmError::BadLocal { slot })
    }

    fn set_global(&mut self, slot: u8) -> VmResult<()> {
        let v = self.top()?.clone();
        if slot <= RESERVED_SLOTS {
            warn!(slot, "write to reserved global slot ignored");
            return Ok(());
        }
        let slot = slot as usize;
        if slot >= self.globals.len() {
            self.globals.resize(slot + 1, None);
        }
        self.globals[slot] = Some(v);
        Ok(())
    }

    fn call(&mut self, argc: u8) -> VmResult<()> {
        let callee_at = self
            .stack
            .len()
            .checked_sub(argc as usize + 1)
            .ok_or(VmError::StackUnderflow)?;
        match &self.stack[callee_at] {
            Value::Function(id) => {
                let id = *id;
                let f = self
                    .program
                    .function(id as usize)
                    .ok_or(VmError::UnknownFunction { id: id as usize })?;
                if f.arity != argc {
                    return Err(VmError::ArityMismatch { id, expected: f.arity, got: argc });
                }
                if self.frames.len() >= self.limits.max_frames {
                    return Err(VmError::CallDepthExceeded { limit: self.limits.max_frames });
                }
                self.frames.push(Frame { function: self.function, ip: self.ip, bp: self.bp });
                self.bp = callee_at + 1;
                self.ip = 0;
                self.function = id as usize;
            }
            Value::Native(native) => {
                let native = native.clone();
                let args = self.stack.split_off(callee_at + 1);
                let result = native.call(&args)?;
                self.stack.truncate(callee_at);
                self.push(result)?;
            }
            other => return Err(VmError::NotCallable { tag: other.tag() }),
        }
        Ok(())
    }

    /// Returns the program result when this was the top-level RETURN.
    fn ret(&mut self) -> VmResult<Option<Value>> {
        if self.frames.len() == 1 {
            return Ok(Some(self.top()?.clone()));
        }
        let v = self.pop()?;
        let frame = self.frames.pop().ok_or(VmError::StackUnderflow)?;
        // bp >= 1 inside any call: the callee sits just below it
        self.stack.truncate(self.bp.saturating_sub(1));
        self.stack.push(v);
        self.ip = frame.ip;
        self.bp = frame.bp;
        self.function = frame.function;
        Ok(None)
    }
}

fn binary(op: Op, left: Value, right: Value) -> VmResult<Value> {
    let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
        return Err(VmError::Type { op, left: left.tag(), right: right.tag() });
    };
    let (a, b) = (*a, *b);
    Ok(match op {
        Op::Add => Value::Number(a + b),
        Op::Sub => Value::Number(a - b),
        Op::Mul => Value::Number(a * b),
        Op::Div => Value::Number(a / b),
        Op::Mod => Value::Number(a % b),
        Op::Ceq => Value::Boolean(a == b),
        Op::Cne => Value::Boolean(a != b),
        Op::Clt => Value::Boolean(a < b),
        Op::Cle => Value::Boolean(a <= b),
        Op::Cgt => Value::Boolean(a > b),
        Op::Cge => Value::Boolean(a >= b),
        _ => return Err(VmError::Type { op, left: left.tag(), right: right.tag() }),
    })
}
