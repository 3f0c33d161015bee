//! Library methods that need nothing from the interpreter but their
//! arguments.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::lang::value::{string_hash, Value};

/// A library exception to be thrown by the caller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fault {
    pub class: &'static str,
    pub message: Option<String>,
}

impl Fault {
    fn new(class: &'static str, message: impl Into<String>) -> Self {
        Fault {
            class,
            message: Some(message.into()),
        }
    }
}

pub(crate) type Outcome = Option<Result<Value, Fault>>;

fn int_arg(args: &[Value], i: usize) -> i32 {
    args.get(i).and_then(Value::as_int).unwrap_or(0)
}

fn double_arg(args: &[Value], i: usize) -> f64 {
    args.get(i).and_then(Value::as_double).unwrap_or(0.0)
}

fn str_arg(args: &[Value], i: usize) -> Option<&str> {
    match args.get(i) {
        Some(Value::Str(s)) => Some(s),
        _ => None,
    }
}

fn number_format(s: &str) -> Fault {
    Fault::new("NumberFormatException", format!("For input string: \"{}\"", s))
}

/// Numeric result in the widest representation among `args`.
fn widest(args: &[Value], int: impl Fn(i32, i32) -> i32, long: impl Fn(i64, i64) -> i64, double: impl Fn(f64, f64) -> f64) -> Value {
    match (args.first(), args.get(1)) {
        (Some(Value::Int(a)), Some(Value::Int(b))) => Value::Int(int(*a, *b)),
        (Some(a), Some(b)) => match (a.as_long(), b.as_long()) {
            (Some(a), Some(b)) => Value::Long(long(a, b)),
            _ => Value::Double(double(
                a.as_double().unwrap_or(0.0),
                b.as_double().unwrap_or(0.0),
            )),
        },
        _ => Value::Null,
    }
}

/// Static methods of library classes. `None` when the method is unknown;
/// `String.valueOf` and `System.exit` are handled by the interpreter.
pub(crate) fn call_static(class: &str, name: &str, args: &[Value], started: Instant) -> Outcome {
    let value = match (class, name) {
        ("Math", "abs") => match args.first() {
            Some(Value::Int(n)) => Value::Int(n.wrapping_abs()),
            Some(Value::Long(n)) => Value::Long(n.wrapping_abs()),
            _ => Value::Double(double_arg(args, 0).abs()),
        },
        ("Math", "max") => widest(args, i32::max, i64::max, f64::max),
        ("Math", "min") => widest(args, i32::min, i64::min, f64::min),
        ("Math", "pow") => Value::Double(double_arg(args, 0).powf(double_arg(args, 1))),
        ("Math", "sqrt") => Value::Double(double_arg(args, 0).sqrt()),
        ("Math", "floor") => Value::Double(double_arg(args, 0).floor()),
        ("Math", "ceil") => Value::Double(double_arg(args, 0).ceil()),
        ("Integer", "parseInt") => {
            let s = str_arg(args, 0).unwrap_or("null");
            match s.parse::<i32>() {
                Ok(n) => Value::Int(n),
                Err(_) => return Some(Err(number_format(s))),
            }
        }
        ("Integer", "valueOf") => Value::Int(int_arg(args, 0)),
        ("Integer", "toString") => Value::str(&int_arg(args, 0).to_string()),
        ("Integer", "max") => Value::Int(int_arg(args, 0).max(int_arg(args, 1))),
        ("Integer", "min") => Value::Int(int_arg(args, 0).min(int_arg(args, 1))),
        ("Long", "parseLong") => {
            let s = str_arg(args, 0).unwrap_or("null");
            match s.parse::<i64>() {
                Ok(n) => Value::Long(n),
                Err(_) => return Some(Err(number_format(s))),
            }
        }
        ("Double", "parseDouble") => {
            let s = str_arg(args, 0).unwrap_or("null");
            match s.trim().parse::<f64>() {
                Ok(d) => Value::Double(d),
                Err(_) => return Some(Err(number_format(s))),
            }
        }
        ("Boolean", "parseBoolean") => Value::Bool(
            str_arg(args, 0).map_or(false, |s| s.eq_ignore_ascii_case("true")),
        ),
        ("System", "currentTimeMillis") => {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            Value::Long(millis)
        }
        ("System", "nanoTime") => Value::Long(started.elapsed().as_nanos() as i64),
        _ => return None,
    };
    Some(Ok(value))
}

pub(crate) fn static_field(class: &str, name: &str) -> Option<Value> {
    Some(match (class, name) {
        ("Integer", "MAX_VALUE") => Value::Int(i32::MAX),
        ("Integer", "MIN_VALUE") => Value::Int(i32::MIN),
        ("Long", "MAX_VALUE") => Value::Long(i64::MAX),
        ("Long", "MIN_VALUE") => Value::Long(i64::MIN),
        ("Math", "PI") => Value::Double(std::f64::consts::PI),
        ("Math", "E") => Value::Double(std::f64::consts::E),
        _ => return None,
    })
}

fn char_slice(s: &str, begin: i32, end: i32) -> Result<Value, Fault> {
    let len = s.chars().count() as i32;
    if begin < 0 || end > len || begin > end {
        return Err(Fault::new(
            "StringIndexOutOfBoundsException",
            format!("begin {}, end {}, length {}", begin, end, len),
        ));
    }
    let out: String = s
        .chars()
        .skip(begin as usize)
        .take((end - begin) as usize)
        .collect();
    Ok(Value::str(&out))
}

/// Methods of `java.lang.String`. `equals` compares contents.
pub(crate) fn string_method(s: &str, name: &str, args: &[Value]) -> Outcome {
    let arg = str_arg(args, 0);
    let value = match (name, args.len()) {
        ("length", 0) => Value::Int(s.chars().count() as i32),
        ("isEmpty", 0) => Value::Bool(s.is_empty()),
        ("substring", 1) => {
            let len = s.chars().count() as i32;
            return Some(char_slice(s, int_arg(args, 0), len));
        }
        ("substring", 2) => return Some(char_slice(s, int_arg(args, 0), int_arg(args, 1))),
        ("toUpperCase", 0) => Value::str(&s.to_uppercase()),
        ("toLowerCase", 0) => Value::str(&s.to_lowercase()),
        ("trim", 0) => Value::str(s.trim_matches(|c: char| c <= ' ')),
        ("equalsIgnoreCase", 1) => {
            Value::Bool(arg.map_or(false, |a| a.to_lowercase() == s.to_lowercase()))
        }
        ("contains", 1) => match arg {
            Some(a) => Value::Bool(s.contains(a)),
            None => return Some(Err(Fault { class: "NullPointerException", message: None })),
        },
        ("indexOf", 1) => {
            let index = arg
                .and_then(|a| s.find(a))
                .map_or(-1, |byte| s[..byte].chars().count() as i32);
            Value::Int(index)
        }
        ("startsWith", 1) => Value::Bool(arg.map_or(false, |a| s.starts_with(a))),
        ("endsWith", 1) => Value::Bool(arg.map_or(false, |a| s.ends_with(a))),
        ("concat", 1) => Value::str(&format!("{}{}", s, arg.unwrap_or(""))),
        ("repeat", 1) => {
            let count = int_arg(args, 0);
            if count < 0 {
                return Some(Err(Fault::new(
                    "IllegalArgumentException",
                    format!("count is negative: {}", count),
                )));
            }
            Value::str(&s.repeat(count as usize))
        }
        ("equals", 1) => Value::Bool(arg == Some(s)),
        ("hashCode", 0) => Value::Int(string_hash(s)),
        ("toString", 0) => Value::str(s),
        _ => return None,
    };
    Some(Ok(value))
}

/// `hashCode` of boxed primitives.
pub(crate) fn primitive_hash(value: &Value) -> i32 {
    match value {
        Value::Int(n) => *n,
        Value::Long(n) => (*n ^ ((*n as u64) >> 32) as i64) as i32,
        Value::Double(d) => {
            let bits = d.to_bits();
            (bits ^ (bits >> 32)) as i32
        }
        Value::Bool(b) => {
            if *b {
                1231
            } else {
                1237
            }
        }
        Value::Str(s) => string_hash(s),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(class: &str, name: &str, args: &[Value]) -> Result<Value, Fault> {
        call_static(class, name, args, Instant::now()).expect("known method")
    }

    #[test]
    fn math_keeps_integer_results_integral() {
        assert!(matches!(call("Math", "max", &[Value::Int(3), Value::Int(9)]), Ok(Value::Int(9))));
        assert!(matches!(call("Math", "max", &[Value::Int(3), Value::Long(9)]), Ok(Value::Long(9))));
        assert!(matches!(
            call("Math", "min", &[Value::Double(1.5), Value::Int(9)]),
            Ok(Value::Double(d)) if d == 1.5
        ));
        assert!(matches!(call("Math", "abs", &[Value::Int(-4)]), Ok(Value::Int(4))));
    }

    #[test]
    fn parse_int_reports_bad_input() {
        assert!(matches!(call("Integer", "parseInt", &[Value::str("42")]), Ok(Value::Int(42))));
        let fault = call("Integer", "parseInt", &[Value::str("4x")]).unwrap_err();
        assert_eq!(fault.class, "NumberFormatException");
        assert_eq!(fault.message.as_deref(), Some("For input string: \"4x\""));
    }

    #[test]
    fn unknown_methods_are_none() {
        assert!(call_static("Math", "cbrt", &[], Instant::now()).is_none());
        assert!(string_method("abc", "chars", &[]).is_none());
    }

    #[test]
    fn string_methods() {
        let s = |name: &str, args: &[Value]| match string_method("Hello", name, args) {
            Some(Ok(v)) => v.to_string(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(s("length", &[]), "5");
        assert_eq!(s("substring", &[Value::Int(1), Value::Int(3)]), "el");
        assert_eq!(s("indexOf", &[Value::str("lo")]), "3");
        assert_eq!(s("toUpperCase", &[]), "HELLO");
        assert_eq!(s("repeat", &[Value::Int(2)]), "HelloHello");
        assert_eq!(s("equals", &[Value::str("Hello")]), "true");
        let err = string_method("Hello", "substring", &[Value::Int(9)]);
        assert!(matches!(err, Some(Err(f)) if f.class == "StringIndexOutOfBoundsException"));
    }
}
