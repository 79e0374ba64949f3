use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::VmResult;
use crate::bytecode::Tag;

type NativeFn = dyn Fn(&[Value]) -> VmResult<Value>;

/// Host callback callable from programs.
#[derive(Clone)]
pub struct NativeFunction {
    name: &'static str,
    f: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(name: &'static str, f: impl Fn(&[Value]) -> VmResult<Value> + 'static) -> Self {
        NativeFunction { name, f: Rc::new(f) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn call(&self, args: &[Value]) -> VmResult<Value> {
        (self.f)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

/// A runtime value. Plain data: copying a value never aliases mutable state.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Long(i64),
    String(Arc<str>),
    Boolean(bool),
    Null,
    /// Function-table index
    Function(u8),
    Native(NativeFunction),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Number(_) => Tag::Number,
            Value::Long(_) => Tag::Long,
            Value::String(_) => Tag::String,
            Value::Boolean(_) => Tag::Boolean,
            Value::Null => Tag::Null,
            Value::Function(_) => Tag::Function,
            Value::Native(_) => Tag::NativeFunction,
        }
    }

    /// NULL, `false`, numeric zero and the empty string are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Long(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Function(_) | Value::Native(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Null => f.write_str("null"),
            Value::Function(i) => write!(f, "<function #{i}>"),
            Value::Native(n) => write!(f, "<native {}>", n.name),
        }
    }
}
