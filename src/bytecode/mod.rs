//! Binary instruction format.
//!
//! Every instruction starts with a one-byte opcode. Multi-byte operands are
//! little-endian:
//!
//! | Instruction | Layout |
//! |---|---|
//! | `PUSH` | op, tag, payload (NUMBER: f64, LONG: i64, BOOLEAN: u8, STRING: u16 string index, FUNCTION: u8 table index, NULL: none) |
//! | `JMP` `CJF` `JT` `JF` | op, u16 offset measured from the end of the instruction |
//! | `GETLOCAL` `SETLOCAL` `GETGLOBAL` `SETGLOBAL` | op, u8 slot |
//! | `CALL` | op, u8 arity |
//! | everything else | op |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod chunk;

/// Instruction kinds. The arithmetic/comparison block `Add..=Cge` is
/// contiguous; `is_binary` relies on it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Push = 0,
    Pop,
    Jmp,
    /// Consume and jump if false
    Cjf,
    /// Peek and jump if true
    Jt,
    /// Peek and jump if false
    Jf,

    GetLocal,
    SetLocal,
    GetGlobal,
    SetGlobal,

    Call,
    Return,

    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Ceq,
    Cne,
    Clt,
    Cle,
    Cgt,
    Cge,
}

impl Op {
    const ALL: [Op; 23] = [
        Op::Push, Op::Pop, Op::Jmp, Op::Cjf, Op::Jt, Op::Jf,
        Op::GetLocal, Op::SetLocal, Op::GetGlobal, Op::SetGlobal,
        Op::Call, Op::Return,
        Op::Add, Op::Sub, Op::Mul, Op::Div, Op::Mod,
        Op::Ceq, Op::Cne, Op::Clt, Op::Cle, Op::Cgt, Op::Cge,
    ];

    pub fn from_byte(b: u8) -> Option<Op> {
        Op::ALL.get(b as usize).copied()
    }

    pub fn is_binary(self) -> bool {
        (Op::Add as u8..=Op::Cge as u8).contains(&(self as u8))
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::Jmp | Op::Cjf | Op::Jt | Op::Jf)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Push => "PUSH",
            Op::Pop => "POP",
            Op::Jmp => "JMP",
            Op::Cjf => "CJF",
            Op::Jt => "JT",
            Op::Jf => "JF",
            Op::GetLocal => "GETLOCAL",
            Op::SetLocal => "SETLOCAL",
            Op::GetGlobal => "GETGLOBAL",
            Op::SetGlobal => "SETGLOBAL",
            Op::Call => "CALL",
            Op::Return => "RETURN",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Ceq => "CEQ",
            Op::Cne => "CNE",
            Op::Clt => "CLT",
            Op::Cle => "CLE",
            Op::Cgt => "CGT",
            Op::Cge => "CGE",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Runtime type tags. Also the `PUSH` type byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tag {
    Number = 0,
    Long,
    String,
    Boolean,
    Null,
    Function,
    NativeFunction,
}

impl Tag {
    pub fn from_byte(b: u8) -> Option<Tag> {
        Some(match b {
            0 => Tag::Number,
            1 => Tag::Long,
            2 => Tag::String,
            3 => Tag::Boolean,
            4 => Tag::Null,
            5 => Tag::Function,
            6 => Tag::NativeFunction,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::Number => "NUMBER",
            Tag::Long => "LONG",
            Tag::String => "STRING",
            Tag::Boolean => "BOOLEAN",
            Tag::Null => "NULL",
            Tag::Function => "FUNCTION",
            Tag::NativeFunction => "NATIVE_FUNCTION",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Constant operand of a `PUSH`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Number(f64),
    Long(i64),
    Boolean(bool),
    /// Index into the program's string table
    String(u16),
    /// Index into the function table
    Function(u8),
    Null,
}

impl Constant {
    pub fn tag(self) -> Tag {
        match self {
            Constant::Number(_) => Tag::Number,
            Constant::Long(_) => Tag::Long,
            Constant::Boolean(_) => Tag::Boolean,
            Constant::String(_) => Tag::String,
            Constant::Function(_) => Tag::Function,
            Constant::Null => Tag::Null,
        }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Push(Constant),
    Jump(Op, u16),
    Slot(Op, u8),
    Call(u8),
    Simple(Op),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown opcode {op} at offset {at}")]
    UnknownOpcode { op: u8, at: usize },
    #[error("unknown type tag {tag} at offset {at}")]
    UnknownTag { tag: u8, at: usize },
    #[error("{tag} cannot be a PUSH operand (offset {at})")]
    UnpushableTag { tag: Tag, at: usize },
    #[error("instruction at offset {at} is truncated")]
    Truncated { at: usize },
}

fn read<const N: usize>(code: &[u8], at: usize, start: usize) -> Result<[u8; N], DecodeError> {
    code.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(DecodeError::Truncated { at: start })
}

impl Instruction {
    pub fn op(&self) -> Op {
        match *self {
            Instruction::Push(_) => Op::Push,
            Instruction::Jump(op, _) | Instruction::Slot(op, _) | Instruction::Simple(op) => op,
            Instruction::Call(_) => Op::Call,
        }
    }

    /// Decode the instruction starting at `at`. Returns it together with its
    /// encoded length.
    pub fn decode(code: &[u8], at: usize) -> Result<(Instruction, usize), DecodeError> {
        let [b] = read::<1>(code, at, at)?;
        let op = Op::from_byte(b).ok_or(DecodeError::UnknownOpcode { op: b, at })?;
        let operands = at + 1;
        let inst = match op {
            Op::Push => {
                let [t] = read::<1>(code, operands, at)?;
                let tag = Tag::from_byte(t).ok_or(DecodeError::UnknownTag { tag: t, at })?;
                let payload = operands + 1;
                let constant = match tag {
                    Tag::Number => Constant::Number(f64::from_le_bytes(read(code, payload, at)?)),
                    Tag::Long => Constant::Long(i64::from_le_bytes(read(code, payload, at)?)),
                    Tag::Boolean => Constant::Boolean(read::<1>(code, payload, at)?[0] != 0),
                    Tag::String => Constant::String(u16::from_le_bytes(read(code, payload, at)?)),
                    Tag::Function => Constant::Function(read::<1>(code, payload, at)?[0]),
                    Tag::Null => Constant::Null,
                    Tag::NativeFunction => return Err(DecodeError::UnpushableTag { tag, at }),
                };
                Instruction::Push(constant)
            }
            Op::Jmp | Op::Cjf | Op::Jt | Op::Jf => {
                Instruction::Jump(op, u16::from_le_bytes(read(code, operands, at)?))
            }
            Op::GetLocal | Op::SetLocal | Op::GetGlobal | Op::SetGlobal => {
                Instruction::Slot(op, read::<1>(code, operands, at)?[0])
            }
            Op::Call => Instruction::Call(read::<1>(code, operands, at)?[0]),
            _ => Instruction::Simple(op),
        };
        Ok((inst, inst.encoded_len()))
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Instruction::Push(c) => {
                2 + match c {
                    Constant::Number(_) | Constant::Long(_) => 8,
                    Constant::String(_) => 2,
                    Constant::Boolean(_) | Constant::Function(_) => 1,
                    Constant::Null => 0,
                }
            }
            Instruction::Jump(..) => 3,
            Instruction::Slot(..) | Instruction::Call(_) => 2,
            Instruction::Simple(_) => 1,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.op() as u8);
        match *self {
            Instruction::Push(c) => {
                out.push(c.tag() as u8);
                match c {
                    Constant::Number(n) => out.extend_from_slice(&n.to_le_bytes()),
                    Constant::Long(n) => out.extend_from_slice(&n.to_le_bytes()),
                    Constant::Boolean(b) => out.push(b as u8),
                    Constant::String(i) => out.extend_from_slice(&i.to_le_bytes()),
                    Constant::Function(i) => out.push(i),
                    Constant::Null => {}
                }
            }
            Instruction::Jump(_, off) => out.extend_from_slice(&off.to_le_bytes()),
            Instruction::Slot(_, n) | Instruction::Call(n) => out.push(n),
            Instruction::Simple(_) => {}
        }
    }
}

/// Decode a whole buffer into `(offset, instruction)` pairs.
pub fn decode_all(code: &[u8]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
    let mut out = Vec::new();
    let mut at = 0;
    while at < code.len() {
        let (inst, len) = Instruction::decode(code, at)?;
        out.push((at, inst));
        at += len;
    }
    Ok(out)
}

/// A finalized function-table entry. The code is immutable and shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub arity: u8,
    pub code: Arc<[u8]>,
}

/// Finalized output of a compilation.
///
/// `functions[0]` is reserved for the main code and is always `None`;
/// `main` holds that code instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub main: Arc<[u8]>,
    pub functions: Vec<Option<Function>>,
    pub strings: Vec<Arc<str>>,
    /// Number of global slots in use, reserved slots included.
    pub global_count: usize,
}

impl Program {
    /// Code for a function id; 0 is the main code.
    pub fn code(&self, id: usize) -> Option<&Arc<[u8]>> {
        if id == 0 {
            return Some(&self.main);
        }
        self.functions.get(id)?.as_ref().map(|f| &f.code)
    }

    pub fn function(&self, id: usize) -> Option<&Function> {
        self.functions.get(id)?.as_ref()
    }
}
