//! Serializable view of a [`Context`](super::Context) between two steps.

use serde::Serialize;

use super::Frame;
use super::value::Value;
use crate::bytecode::Tag;

/// Stand-in for host callbacks, which have no serializable form.
pub const NATIVE_PLACEHOLDER: &str = "<NATIVE FUNCTION>";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSnapshot {
    #[serde(rename = "type")]
    pub tag: Tag,
    pub v: serde_json::Value,
}

impl From<&Value> for ValueSnapshot {
    fn from(value: &Value) -> Self {
        let v = match value {
            Value::Number(n) => serde_json::Value::from(*n),
            Value::Long(n) => serde_json::Value::from(*n),
            Value::String(s) => serde_json::Value::from(&**s),
            Value::Boolean(b) => serde_json::Value::from(*b),
            Value::Null => serde_json::Value::Null,
            Value::Function(i) => serde_json::Value::from(*i),
            Value::Native(_) => serde_json::Value::from(NATIVE_PLACEHOLDER),
        };
        ValueSnapshot { tag: value.tag(), v }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSnapshot {
    pub function: usize,
    pub ip: usize,
    pub bp: usize,
}

impl From<&Frame> for FrameSnapshot {
    fn from(f: &Frame) -> Self {
        FrameSnapshot { function: f.function, ip: f.ip, bp: f.bp }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub ip: usize,
    pub bp: usize,
    pub function: usize,
    pub stack: Vec<ValueSnapshot>,
    /// `None` for slots never written
    pub globals: Vec<Option<ValueSnapshot>>,
    pub frames: Vec<FrameSnapshot>,
    pub halted: bool,
}
