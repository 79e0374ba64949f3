//! Human-readable listings of compiled code.
//!
//! Each instruction is one line, `OFFSET: MNEMONIC operands`. Alongside the
//! text comes a map from line index to byte offset so a debugger can turn a
//! live instruction pointer into a line to highlight.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::bytecode::{Constant, DecodeError, Instruction, Program, decode_all};

/// Disassemble one code buffer. Returns the listing and, for each line, the
/// byte offset of its instruction.
pub fn disassemble(code: &[u8]) -> Result<(String, Vec<usize>), DecodeError> {
    let mut text = String::new();
    let mut offsets = Vec::new();
    for (at, inst) in decode_all(code)? {
        let _ = writeln!(text, "{}", line(at, &inst, &[]));
        offsets.push(at);
    }
    Ok((text, offsets))
}

/// Where a listing line came from. Section headers have no offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOrigin {
    /// 0 for main
    pub function: usize,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub text: String,
    pub lines: Vec<LineOrigin>,
}

impl Listing {
    /// Line index of the instruction at `offset` in `function`.
    pub fn line_of(&self, function: usize, offset: usize) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.function == function && l.offset == Some(offset))
    }
}

/// The main code followed by every function, each under a header line.
/// String constants are shown with their text.
pub fn disassemble_program(program: &Program) -> Result<Listing, DecodeError> {
    let mut listing = Listing { text: String::new(), lines: Vec::new() };
    let sections = std::iter::once((0, &program.main)).chain(
        program
            .functions
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|f| (i, &f.code))),
    );
    for (function, code) in sections {
        if function == 0 {
            listing.text.push_str("main:\n");
        } else {
            let _ = writeln!(listing.text, "{function}:");
        }
        listing.lines.push(LineOrigin { function, offset: None });
        for (at, inst) in decode_all(code)? {
            let _ = writeln!(listing.text, "\t{}", line(at, &inst, &program.strings));
            listing.lines.push(LineOrigin { function, offset: Some(at) });
        }
    }
    Ok(listing)
}

fn line(at: usize, inst: &Instruction, strings: &[Arc<str>]) -> String {
    let mut s = format!("{at:04}: {}", inst.op());
    match *inst {
        Instruction::Push(c) => {
            let _ = write!(s, " {}", c.tag());
            match c {
                Constant::Number(n) => {
                    let _ = write!(s, " {n}");
                }
                Constant::Long(n) => {
                    let _ = write!(s, " {n}");
                }
                Constant::Boolean(b) => {
                    let _ = write!(s, " {b}");
                }
                Constant::String(i) => {
                    let _ = write!(s, " {i}");
                    if let Some(text) = strings.get(i as usize) {
                        let _ = write!(s, " {text:?}");
                    }
                }
                Constant::Function(i) => {
                    let _ = write!(s, " {i}");
                }
                Constant::Null => {}
            }
        }
        Instruction::Jump(_, offset) => {
            let target = at + inst.encoded_len() + offset as usize;
            let _ = write!(s, " {offset} (-> {target:04})");
        }
        Instruction::Slot(_, n) | Instruction::Call(n) => {
            let _ = write!(s, " {n}");
        }
        Instruction::Simple(_) => {}
    }
    s
}
