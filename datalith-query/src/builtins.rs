//! Built-in predicates and functions
//!
//! Predicates filter rows; functions compute a value to bind. `tuple` packs
//! its arguments, `untuple` unpacks (the evaluator routes its components into
//! a tuple binding), `ground` passes a constant through.

use crate::error::{Error, Result};
use datalith_core::Value;

fn bad_apply(op: &str, args: &[Value]) -> Error {
    Error::BadApply {
        op: op.to_string(),
        args: format!(
            "({})",
            args.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        ),
    }
}

/// True if `op` names a built-in predicate.
pub fn is_pred(op: &str) -> bool {
    matches!(
        op,
        "=" | "!=" | "not=" | "<" | "<=" | ">" | ">=" | "even?" | "odd?" | "zero?" | "pos?" | "neg?"
    )
}

/// Apply a predicate to evaluated arguments.
pub fn call_pred(op: &str, args: &[Value]) -> Result<bool> {
    match op {
        "=" => Ok(args.windows(2).all(|w| w[0] == w[1])),
        "!=" | "not=" => Ok(args.windows(2).all(|w| w[0] != w[1])),
        "<" => Ok(args.windows(2).all(|w| w[0] < w[1])),
        "<=" => Ok(args.windows(2).all(|w| w[0] <= w[1])),
        ">" => Ok(args.windows(2).all(|w| w[0] > w[1])),
        ">=" => Ok(args.windows(2).all(|w| w[0] >= w[1])),
        "even?" | "odd?" | "zero?" | "pos?" | "neg?" => {
            let [Value::Long(n)] = args else {
                return Err(bad_apply(op, args));
            };
            Ok(match op {
                "even?" => n % 2 == 0,
                "odd?" => n % 2 != 0,
                "zero?" => *n == 0,
                "pos?" => *n > 0,
                _ => *n < 0,
            })
        }
        other => Err(Error::UnknownFn(other.to_string())),
    }
}

/// Apply a function to evaluated arguments, returning the value to bind.
pub fn call_fn(op: &str, args: &[Value]) -> Result<Value> {
    match op {
        "+" | "-" | "*" | "/" => arith(op, args),
        "inc" => arith("+", &[args.first().cloned().unwrap_or(Value::Nil), Value::Long(1)]),
        "dec" => arith("-", &[args.first().cloned().unwrap_or(Value::Nil), Value::Long(1)]),
        "str" => {
            let mut out = String::new();
            for a in args {
                match a {
                    Value::Str(s) => out.push_str(s),
                    Value::Nil => {}
                    other => out.push_str(&other.to_string()),
                }
            }
            Ok(Value::Str(out))
        }
        "ground" => args.first().cloned().ok_or_else(|| bad_apply(op, args)),
        "tuple" => Ok(Value::Tuple(args.to_vec())),
        "untuple" => match args {
            [Value::Tuple(_)] => Ok(args[0].clone()),
            _ => Err(bad_apply(op, args)),
        },
        other => Err(Error::UnknownFn(other.to_string())),
    }
}

/// Numeric tower: all-long stays long, any double promotes.
fn arith(op: &str, args: &[Value]) -> Result<Value> {
    if args.is_empty() {
        return Err(bad_apply(op, args));
    }
    let all_long = args.iter().all(|v| matches!(v, Value::Long(_)));
    if all_long {
        let mut acc = args[0].as_long().unwrap();
        for v in &args[1..] {
            let n = v.as_long().unwrap();
            acc = match op {
                "+" => acc + n,
                "-" => acc - n,
                "*" => acc * n,
                "/" => {
                    if n == 0 {
                        return Err(bad_apply(op, args));
                    }
                    acc / n
                }
                _ => unreachable!(),
            };
        }
        Ok(Value::Long(acc))
    } else {
        let mut floats = Vec::with_capacity(args.len());
        for v in args {
            match v {
                Value::Long(n) => floats.push(*n as f64),
                Value::Double(d) => floats.push(*d),
                _ => return Err(bad_apply(op, args)),
            }
        }
        let mut acc = floats[0];
        for &f in &floats[1..] {
            acc = match op {
                "+" => acc + f,
                "-" => acc - f,
                "*" => acc * f,
                "/" => acc / f,
                _ => unreachable!(),
            };
        }
        Ok(Value::Double(acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparisons() {
        assert!(call_pred("<", &[Value::Long(1), Value::Long(2), Value::Long(3)]).unwrap());
        assert!(!call_pred("<", &[Value::Long(2), Value::Long(1)]).unwrap());
        assert!(call_pred("=", &[Value::Str("a".into()), "a".into()]).unwrap());
        assert!(call_pred("not=", &[Value::Long(1), Value::Long(2)]).unwrap());
        assert!(call_pred("even?", &[Value::Long(4)]).unwrap());
    }

    #[test]
    fn test_arith_tower() {
        assert_eq!(
            call_fn("+", &[Value::Long(1), Value::Long(2)]).unwrap(),
            Value::Long(3)
        );
        assert_eq!(
            call_fn("+", &[Value::Long(1), Value::Double(0.5)]).unwrap(),
            Value::Double(1.5)
        );
        assert!(call_fn("/", &[Value::Long(1), Value::Long(0)]).is_err());
    }

    #[test]
    fn test_str_and_tuple() {
        assert_eq!(
            call_fn("str", &[Value::Str("a".into()), Value::Long(1)]).unwrap(),
            Value::Str("a1".into())
        );
        assert_eq!(
            call_fn("tuple", &[Value::Long(1), "x".into()]).unwrap(),
            Value::Tuple(vec![Value::Long(1), "x".into()])
        );
    }

    #[test]
    fn test_unknown() {
        let err = call_fn("frobnicate", &[]).unwrap_err();
        assert!(err.to_string().starts_with("Unknown predicate or function"));
    }
}
