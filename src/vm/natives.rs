//! Built-ins living in the reserved global slots.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

use super::value::{NativeFunction, Value};
use super::{Output, VmError};
use crate::bytecode::chunk::RESERVED_GLOBALS;

/// Populate slots `1..=RESERVED_SLOTS`, in `RESERVED_GLOBALS` order.
pub fn install(globals: &mut [Option<Value>], out: Output) {
    for (i, name) in RESERVED_GLOBALS.iter().enumerate() {
        let native = match *name {
            "$emit" => emit(out.clone()),
            "$typeof" => type_of(),
            _ => continue,
        };
        if let Some(slot) = globals.get_mut(i + 1) {
            *slot = Some(Value::Native(native));
        }
    }
}

/// `$emit(a, b, ...)`: each argument on its own line. Returns NULL.
pub fn emit(out: Rc<RefCell<dyn Write>>) -> NativeFunction {
    NativeFunction::new("$emit", move |args| {
        let mut out = out.borrow_mut();
        for arg in args {
            writeln!(out, "{arg}")?;
        }
        Ok(Value::Null)
    })
}

/// `$typeof(v)`: the runtime type name, e.g. `"NUMBER"`.
pub fn type_of() -> NativeFunction {
    NativeFunction::new("$typeof", |args| match args {
        [v] => Ok(Value::String(Arc::from(v.tag().name()))),
        _ => Err(VmError::Native {
            name: "$typeof",
            message: format!("expects 1 argument, got {}", args.len()),
        }),
    })
}
