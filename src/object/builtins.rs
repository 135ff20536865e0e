//! The builtin function catalog.
//!
//! Catalog order is stable: `OpGetBuiltin` operands are indices into
//! `BUILTINS`, so reordering entries breaks previously compiled programs.
//! Builtins report failure by returning a `Value::Error`, which the caller
//! pushes as the call's result rather than unwinding.

use crate::object::Value;

/// Signature of a builtin: takes the evaluated arguments, returns a value
/// or nothing (`None` becomes Null).
pub type BuiltinFn = fn(Vec<Value>) -> Option<Value>;

/// A named builtin function.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// The ordered catalog. Index is the `OpGetBuiltin` operand.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "puts",
        func: builtin_puts,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
    Builtin {
        name: "pop",
        func: builtin_pop,
    },
    Builtin {
        name: "del",
        func: builtin_del,
    },
    Builtin {
        name: "pushleft",
        func: builtin_pushleft,
    },
    Builtin {
        name: "popleft",
        func: builtin_popleft,
    },
];

/// Look up a builtin by name.
pub fn builtin_by_name(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn error(message: impl Into<String>) -> Option<Value> {
    Some(Value::Error(message.into()))
}

fn builtin_len(args: Vec<Value>) -> Option<Value> {
    if args.len() != 1 {
        return error("len() takes 1 argument");
    }

    match &args[0] {
        Value::Array(arr) => Some(Value::Integer(arr.borrow().len() as i64)),
        Value::String(s) => Some(Value::Integer(s.len() as i64)),
        _ => error("len() argument must be iterable"),
    }
}

fn builtin_puts(args: Vec<Value>) -> Option<Value> {
    if args.len() != 1 {
        return error("puts() takes 1 argument");
    }

    match &args[0] {
        // strings print raw, without the quoted inspect form
        Value::String(s) => println!("{}", s),
        other => println!("{}", other),
    }
    None
}

fn builtin_push(mut args: Vec<Value>) -> Option<Value> {
    if args.len() < 2 {
        return error("push() takes 2 or more arguments");
    }

    let target = args.remove(0);
    let Value::Array(arr) = &target else {
        return error("first argument to push() must be an array");
    };
    arr.borrow_mut().extend(args);
    Some(target)
}

fn builtin_pop(args: Vec<Value>) -> Option<Value> {
    if args.len() != 1 {
        return error("pop() takes 1 argument");
    }

    let Value::Array(arr) = &args[0] else {
        return error("pop() argument must be an array");
    };
    match arr.borrow_mut().pop() {
        Some(value) => Some(value),
        None => error("pop() from an empty array"),
    }
}

fn builtin_del(args: Vec<Value>) -> Option<Value> {
    if args.len() != 2 {
        return error("del() takes 2 arguments");
    }

    match &args[0] {
        Value::Array(arr) => {
            let Value::Integer(raw_index) = &args[1] else {
                return error("must supply an Integer index to del() for an Array");
            };
            let mut arr = arr.borrow_mut();
            let index = *raw_index;
            if index < 0 || index as usize >= arr.len() {
                return error(format!(
                    "index {} is not valid for an Array of length {}",
                    index,
                    arr.len()
                ));
            }
            arr.remove(index as usize);
            None
        }
        Value::Hash(hash) => {
            let Some(key) = args[1].hash_key() else {
                return error(format!(
                    "cannot delete non-hashable key of type {} from Hash",
                    args[1].type_name()
                ));
            };
            // shift_remove keeps the remaining entries in insertion order
            if hash.borrow_mut().shift_remove(&key).is_none() {
                return error(format!("entry {} not found in Hash", args[1]));
            }
            None
        }
        _ => error("first argument to del() must be an Array or Hash"),
    }
}

fn builtin_pushleft(mut args: Vec<Value>) -> Option<Value> {
    if args.len() < 2 {
        return error("pushleft() takes 2 or more arguments");
    }

    let target = args.remove(0);
    let Value::Array(arr) = &target else {
        return error("first argument to pushleft() must be an array");
    };
    {
        let mut arr = arr.borrow_mut();
        for (i, value) in args.into_iter().enumerate() {
            arr.insert(i, value);
        }
    }
    Some(target)
}

fn builtin_popleft(args: Vec<Value>) -> Option<Value> {
    if args.len() != 1 {
        return error("popleft() takes 1 argument");
    }

    let Value::Array(arr) = &args[0] else {
        return error("popleft() argument must be an array");
    };
    let mut arr = arr.borrow_mut();
    if arr.is_empty() {
        return error("popleft() from an empty array");
    }
    Some(arr.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_on_strings_and_arrays() {
        let result = builtin_len(vec![Value::string("hello")]);
        assert_eq!(result, Some(Value::Integer(5)));

        let arr = Value::array(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(builtin_len(vec![arr]), Some(Value::Integer(2)));
    }

    #[test]
    fn test_len_rejects_other_types() {
        assert!(matches!(
            builtin_len(vec![Value::Integer(1)]),
            Some(Value::Error(_))
        ));
    }

    #[test]
    fn test_push_mutates_in_place_and_returns_the_array() {
        let arr = Value::array(vec![Value::Integer(1)]);
        let result = builtin_push(vec![arr.clone(), Value::Integer(2), Value::Integer(3)]);

        // returned value aliases the argument
        assert_eq!(result, Some(arr.clone()));
        let Value::Array(inner) = arr else {
            unreachable!()
        };
        assert_eq!(inner.borrow().len(), 3);
    }

    #[test]
    fn test_pop_returns_last_element() {
        let arr = Value::array(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(builtin_pop(vec![arr.clone()]), Some(Value::Integer(2)));

        let Value::Array(inner) = arr else {
            unreachable!()
        };
        assert_eq!(inner.borrow().len(), 1);
    }

    #[test]
    fn test_pop_empty_is_an_error() {
        let arr = Value::array(vec![]);
        assert!(matches!(builtin_pop(vec![arr]), Some(Value::Error(_))));
    }

    #[test]
    fn test_del_array_by_index() {
        let arr = Value::array(vec![
            Value::Integer(10),
            Value::Integer(20),
            Value::Integer(30),
        ]);
        assert_eq!(builtin_del(vec![arr.clone(), Value::Integer(1)]), None);

        let Value::Array(inner) = arr else {
            unreachable!()
        };
        assert_eq!(
            *inner.borrow(),
            vec![Value::Integer(10), Value::Integer(30)]
        );
    }

    #[test]
    fn test_del_missing_hash_key_is_an_error() {
        let hash = Value::hash(Default::default());
        assert!(matches!(
            builtin_del(vec![hash, Value::string("missing")]),
            Some(Value::Error(_))
        ));
    }

    #[test]
    fn test_pushleft_and_popleft() {
        let arr = Value::array(vec![Value::Integer(3)]);
        builtin_pushleft(vec![arr.clone(), Value::Integer(1), Value::Integer(2)]);

        {
            let Value::Array(inner) = &arr else {
                unreachable!()
            };
            assert_eq!(
                *inner.borrow(),
                vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
            );
        }

        assert_eq!(builtin_popleft(vec![arr]), Some(Value::Integer(1)));
    }

    #[test]
    fn test_catalog_order_is_stable() {
        let names: Vec<_> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(
            names,
            vec!["len", "puts", "push", "pop", "del", "pushleft", "popleft"]
        );
    }
}
