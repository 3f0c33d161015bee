//! Runtime values of the interpreter.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::exec::StackFrame;

#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Double(f64),
    Bool(bool),
    Str(Rc<str>),
    Null,
    Object(Rc<Object>),
    /// Result of a `void` call.
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Plain,
    Enum { name: String, ordinal: i32 },
    Record,
    /// `System.out` and `System.err`.
    Stream { err: bool },
}

#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub value: Value,
}

#[derive(Debug)]
pub struct Object {
    pub class: String,
    pub kind: ObjectKind,
    pub identity: u32,
    pub fields: RefCell<Vec<Field>>,
    /// Captured at construction for throwables, innermost frame first.
    pub trace: Vec<StackFrame>,
}

/// Field holding a throwable's detail message.
pub const MESSAGE_FIELD: &str = "$message";

impl Object {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields
            .borrow()
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.clone())
    }

    /// Store into an existing field, converting to its declared type.
    /// Returns false if the object has no such field.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let mut fields = self.fields.borrow_mut();
        match fields.iter_mut().find(|f| f.name == name) {
            Some(f) => {
                f.value = coerce(value, &f.type_name);
                true
            }
            None => false,
        }
    }

    pub fn declare(&self, name: &str, type_name: &str, value: Value) {
        let mut fields = self.fields.borrow_mut();
        let value = coerce(value, type_name);
        match fields.iter_mut().find(|f| f.name == name) {
            Some(f) => f.value = value,
            None => fields.push(Field {
                name: name.to_string(),
                type_name: type_name.to_string(),
                value,
            }),
        }
    }

    pub fn message(&self) -> Option<String> {
        match self.get(MESSAGE_FIELD) {
            Some(Value::Str(s)) => Some(s.to_string()),
            _ => None,
        }
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(i64::from(*n)),
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(f64::from(*n)),
            Value::Long(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Runtime class name used for `instanceof`, catch clauses and dispatch.
    pub fn class_name(&self) -> &str {
        match self {
            Value::Int(_) => "Integer",
            Value::Long(_) => "Long",
            Value::Double(_) => "Double",
            Value::Bool(_) => "Boolean",
            Value::Str(_) => "String",
            Value::Object(o) => &o.class,
            Value::Null | Value::Void => "Object",
        }
    }
}

/// Convert a value to the representation of a declared type: numeric
/// widening, and narrowing for compound assignments like `i += 1.5`.
pub fn coerce(value: Value, type_name: &str) -> Value {
    match (type_name, &value) {
        ("long", Value::Int(n)) => Value::Long(i64::from(*n)),
        ("long", Value::Double(d)) => Value::Long(*d as i64),
        ("double", Value::Int(n)) => Value::Double(f64::from(*n)),
        ("double", Value::Long(n)) => Value::Double(*n as f64),
        ("int", Value::Long(n)) => Value::Int(*n as i32),
        ("int", Value::Double(d)) => Value::Int(*d as i32),
        _ => value,
    }
}

pub fn default_for(type_name: &str) -> Value {
    match type_name {
        "int" => Value::Int(0),
        "long" => Value::Long(0),
        "double" => Value::Double(0.0),
        "boolean" => Value::Bool(false),
        _ => Value::Null,
    }
}

/// `Double.toString` formatting: `1.0`, `0.001`, `1.0E7`, `NaN`.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".into();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0.0" } else { "0.0" }.into();
    }
    if (1e-3..1e7).contains(&d.abs()) {
        let s = d.to_string();
        if s.contains('.') {
            s
        } else {
            format!("{}.0", s)
        }
    } else {
        let s = format!("{:e}", d);
        let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
        if mantissa.contains('.') {
            format!("{}E{}", mantissa, exp)
        } else {
            format!("{}.0E{}", mantissa, exp)
        }
    }
}

/// A string as a Java literal, for feedback like `s ==> "hi\n"`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `String.hashCode` over UTF-16 code units.
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, u| h.wrapping_mul(31).wrapping_add(i32::from(u)))
}

/// Primitive and string rendering; objects need the interpreter for
/// user-defined `toString`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            Value::Double(d) => f.write_str(&format_double(*d)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
            Value::Object(o) => write!(f, "{}@{:x}", o.class, o.identity),
            Value::Void => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_format_like_java() {
        assert_eq!(format_double(1.0), "1.0");
        assert_eq!(format_double(0.1), "0.1");
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(1e7), "1.0E7");
        assert_eq!(format_double(1.5e10), "1.5E10");
        assert_eq!(format_double(1e-4), "1.0E-4");
        assert_eq!(format_double(-0.0), "-0.0");
        assert_eq!(format_double(f64::NAN), "NaN");
    }

    #[test]
    fn coercion_widens_and_narrows() {
        assert!(matches!(coerce(Value::Int(3), "double"), Value::Double(d) if d == 3.0));
        assert!(matches!(coerce(Value::Int(3), "long"), Value::Long(3)));
        assert!(matches!(coerce(Value::Double(3.9), "int"), Value::Int(3)));
        assert!(matches!(coerce(Value::Int(3), "Object"), Value::Int(3)));
    }

    #[test]
    fn quoting_escapes() {
        assert_eq!(quote("a\"b\n"), "\"a\\\"b\\n\"");
    }

    #[test]
    fn string_hash_matches_java() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("hello"), 99162322);
    }

    #[test]
    fn fields_convert_on_store() {
        let o = Object {
            class: "P".into(),
            kind: ObjectKind::Plain,
            identity: 1,
            fields: RefCell::new(Vec::new()),
            trace: Vec::new(),
        };
        o.declare("d", "double", Value::Int(1));
        assert!(matches!(o.get("d"), Some(Value::Double(_))));
        assert!(o.set("d", Value::Int(2)));
        assert!(!o.set("missing", Value::Int(2)));
    }
}
