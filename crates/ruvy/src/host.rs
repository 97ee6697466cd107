//! The host-runtime boundary.
//!
//! Everything the interpreted program can do that is not user-defined ends
//! up here: arithmetic, comparison, indexing, kernel printing, constants,
//! and the predefined global set. The interpreter reaches all of it through
//! the [`HostRuntime`] trait, so tests and embedders can substitute their
//! own runtime the same way they substitute a [`PrintWriter`].

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    error::HostException,
    io::{p_values, print_values, puts_values, PrintWriter},
    value::Value,
};

/// Dynamic host services the interpreter delegates to.
pub trait HostRuntime {
    /// Dynamic method invocation by name: the fallback for every call whose
    /// receiver type has no user-defined method under that name.
    fn send<P: PrintWriter>(
        &mut self,
        receiver: Value,
        mid: &str,
        args: &[Value],
        writer: &mut P,
    ) -> Result<Value, HostException>;

    /// Looks up a predefined host global, e.g. `$PROGRAM_NAME`.
    fn global(&self, name: &str) -> Option<Value>;

    /// Enumerates the currently-defined host globals.
    fn global_names(&self) -> Vec<Rc<str>>;

    /// Looks up a host constant by name.
    fn constant(&self, name: &str) -> Result<Value, HostException>;
}

/// The default host runtime: primitive behavior for the builtin types plus
/// the kernel printing methods.
pub struct StdHost {
    globals: AHashMap<Rc<str>, Value>,
    constants: AHashMap<Rc<str>, Value>,
}

impl StdHost {
    #[must_use]
    pub fn new() -> Self {
        let mut globals: AHashMap<Rc<str>, Value> = AHashMap::new();
        globals.insert("$PROGRAM_NAME".into(), Value::Str("main".into()));
        globals.insert("$0".into(), Value::Str("main".into()));
        globals.insert("$DEBUG".into(), Value::False);
        globals.insert("$VERBOSE".into(), Value::False);

        let mut constants: AHashMap<Rc<str>, Value> = AHashMap::new();
        constants.insert("RUBY_VERSION".into(), Value::Str("3.3.0".into()));
        constants.insert("RUBY_PLATFORM".into(), Value::Str("x86_64-linux".into()));
        constants.insert("RUBY_ENGINE".into(), Value::Str("ruvy".into()));

        Self { globals, constants }
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRuntime for StdHost {
    fn send<P: PrintWriter>(
        &mut self,
        receiver: Value,
        mid: &str,
        args: &[Value],
        writer: &mut P,
    ) -> Result<Value, HostException> {
        // Kernel printing is available on any receiver.
        match mid {
            "puts" => {
                puts_values(args, writer);
                return Ok(Value::Nil);
            }
            "print" => {
                print_values(args, writer);
                return Ok(Value::Nil);
            }
            "p" | "pp" => return Ok(p_values(args, writer)),
            _ => {}
        }

        // Universal object protocol.
        match mid {
            "==" => {
                expect_argc(args, 1)?;
                return Ok(Value::from(receiver == args[0]));
            }
            "!=" => {
                expect_argc(args, 1)?;
                return Ok(Value::from(receiver != args[0]));
            }
            "!" => {
                expect_argc(args, 0)?;
                return Ok(Value::from(!receiver.is_truthy()));
            }
            "nil?" => {
                expect_argc(args, 0)?;
                return Ok(Value::from(matches!(receiver, Value::Nil)));
            }
            "inspect" => {
                expect_argc(args, 0)?;
                return Ok(Value::Str(receiver.inspect().into()));
            }
            "to_s" => {
                expect_argc(args, 0)?;
                return Ok(Value::Str(receiver.to_string().into()));
            }
            // All values here are immutable, so freezing is identity.
            "freeze" => {
                expect_argc(args, 0)?;
                return Ok(receiver);
            }
            "frozen?" => {
                expect_argc(args, 0)?;
                return Ok(Value::True);
            }
            _ => {}
        }

        match &receiver {
            Value::Int(n) => integer_send(*n, &receiver, mid, args),
            Value::Str(s) => string_send(s, &receiver, mid, args),
            Value::Sym(name) => symbol_send(name, &receiver, mid, args),
            Value::Array(items) => array_send(items, &receiver, mid, args),
            Value::Hash(map) => hash_send(map, &receiver, mid, args),
            Value::True | Value::False => bool_send(&receiver, mid, args),
            Value::Nil => nil_send(&receiver, mid, args),
            Value::Main | Value::Method(_) => Err(HostException::no_method(&receiver, mid)),
        }
    }

    fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    fn global_names(&self) -> Vec<Rc<str>> {
        self.globals.keys().cloned().collect()
    }

    fn constant(&self, name: &str) -> Result<Value, HostException> {
        self.constants
            .get(name)
            .cloned()
            .ok_or_else(|| HostException::uninitialized_constant(name))
    }
}

fn expect_argc(args: &[Value], expected: usize) -> Result<(), HostException> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(HostException::arity(args.len(), expected))
    }
}

// ============================================================================
// Per-type primitive methods
// ============================================================================

fn integer_send(n: i64, receiver: &Value, mid: &str, args: &[Value]) -> Result<Value, HostException> {
    match mid {
        "+" | "-" | "*" | "/" | "%" | "&" | "|" | "^" | "<" | "<=" | ">" | ">=" => {
            expect_argc(args, 1)?;
            let Value::Int(rhs) = args[0] else {
                return Err(HostException::coerce_error(&args[0], "Integer"));
            };
            integer_binary(n, mid, rhs)
        }
        "succ" | "next" => {
            expect_argc(args, 0)?;
            Ok(Value::Int(n.wrapping_add(1)))
        }
        "zero?" => {
            expect_argc(args, 0)?;
            Ok(Value::from(n == 0))
        }
        "abs" => {
            expect_argc(args, 0)?;
            Ok(Value::Int(n.wrapping_abs()))
        }
        _ => Err(HostException::no_method(receiver, mid)),
    }
}

fn integer_binary(lhs: i64, mid: &str, rhs: i64) -> Result<Value, HostException> {
    let value = match mid {
        "+" => Value::Int(lhs.wrapping_add(rhs)),
        "-" => Value::Int(lhs.wrapping_sub(rhs)),
        "*" => Value::Int(lhs.wrapping_mul(rhs)),
        "/" => {
            if rhs == 0 {
                return Err(HostException::zero_division());
            }
            // The hardware quotient overflows at i64::MIN / -1.
            if rhs == -1 {
                Value::Int(lhs.wrapping_neg())
            } else {
                Value::Int(floor_div(lhs, rhs))
            }
        }
        "%" => {
            if rhs == 0 {
                return Err(HostException::zero_division());
            }
            // Same trap as division; the remainder by -1 is always 0.
            if rhs == -1 {
                Value::Int(0)
            } else {
                Value::Int(floor_mod(lhs, rhs))
            }
        }
        "&" => Value::Int(lhs & rhs),
        "|" => Value::Int(lhs | rhs),
        "^" => Value::Int(lhs ^ rhs),
        "<" => Value::from(lhs < rhs),
        "<=" => Value::from(lhs <= rhs),
        ">" => Value::from(lhs > rhs),
        ">=" => Value::from(lhs >= rhs),
        _ => unreachable!("integer_binary called with unhandled operator"),
    };
    Ok(value)
}

/// Integer division truncates toward negative infinity.
fn floor_div(lhs: i64, rhs: i64) -> i64 {
    let quotient = lhs / rhs;
    if lhs % rhs != 0 && (lhs < 0) != (rhs < 0) {
        quotient - 1
    } else {
        quotient
    }
}

/// The sign of the result follows the divisor.
fn floor_mod(lhs: i64, rhs: i64) -> i64 {
    let remainder = lhs % rhs;
    if remainder != 0 && (remainder < 0) != (rhs < 0) {
        remainder + rhs
    } else {
        remainder
    }
}

fn string_send(s: &Rc<str>, receiver: &Value, mid: &str, args: &[Value]) -> Result<Value, HostException> {
    match mid {
        "+" => {
            expect_argc(args, 1)?;
            let Value::Str(rhs) = &args[0] else {
                return Err(HostException::type_error(format!(
                    "no implicit conversion of {} into String",
                    args[0].type_tag()
                )));
            };
            Ok(Value::Str(format!("{s}{rhs}").into()))
        }
        "*" => {
            expect_argc(args, 1)?;
            let Value::Int(count) = args[0] else {
                return Err(HostException::coerce_error(&args[0], "Integer"));
            };
            let count = usize::try_from(count)
                .map_err(|_| HostException::new(crate::error::HostExcClass::ArgumentError, "negative argument"))?;
            Ok(Value::Str(s.repeat(count).into()))
        }
        "<" | "<=" | ">" | ">=" => {
            expect_argc(args, 1)?;
            let Value::Str(rhs) = &args[0] else {
                return Err(HostException::coerce_error(&args[0], "String"));
            };
            let ordering = s.as_ref().cmp(rhs.as_ref());
            Ok(Value::from(match mid {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        "length" | "size" => {
            expect_argc(args, 0)?;
            Ok(Value::Int(s.chars().count() as i64))
        }
        "empty?" => {
            expect_argc(args, 0)?;
            Ok(Value::from(s.is_empty()))
        }
        "succ" | "next" => {
            expect_argc(args, 0)?;
            Ok(Value::Str(string_succ(s).into()))
        }
        // Strings are immutable and deduplicated at decode time.
        "-@" => {
            expect_argc(args, 0)?;
            Ok(receiver.clone())
        }
        "[]" => {
            expect_argc(args, 1)?;
            let Value::Int(index) = args[0] else {
                return Err(HostException::coerce_error(&args[0], "Integer"));
            };
            let chars: Vec<char> = s.chars().collect();
            Ok(match wrap_index(index, chars.len()) {
                Some(at) => Value::Str(chars[at].to_string().into()),
                None => Value::Nil,
            })
        }
        _ => Err(HostException::no_method(receiver, mid)),
    }
}

/// String successor: increment the rightmost alphanumeric with carry, the
/// way the host does for ASCII ranges ("az" -> "ba", "zz" -> "aaa",
/// "a9" -> "b0"). Strings without alphanumerics bump their last character.
fn string_succ(s: &str) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    let alnum: Vec<usize> = (0..chars.len()).filter(|&i| chars[i].is_ascii_alphanumeric()).collect();
    if alnum.is_empty() {
        if let Some(last) = chars.last_mut() {
            if let Some(next) = char::from_u32(*last as u32 + 1) {
                *last = next;
            }
        }
        return chars.into_iter().collect();
    }
    let mut carried = true;
    let mut leftmost = alnum[0];
    for &i in alnum.iter().rev() {
        leftmost = i;
        let (next, carry) = match chars[i] {
            '9' => ('0', true),
            'z' => ('a', true),
            'Z' => ('A', true),
            c => ((c as u8 + 1) as char, false),
        };
        chars[i] = next;
        if !carry {
            carried = false;
            break;
        }
    }
    if carried {
        let seed = match chars[leftmost] {
            '0' => '1',
            c if c.is_ascii_lowercase() => 'a',
            _ => 'A',
        };
        chars.insert(leftmost, seed);
    }
    chars.into_iter().collect()
}

fn symbol_send(name: &Rc<str>, receiver: &Value, mid: &str, args: &[Value]) -> Result<Value, HostException> {
    match mid {
        "to_sym" => {
            expect_argc(args, 0)?;
            Ok(receiver.clone())
        }
        "length" | "size" => {
            expect_argc(args, 0)?;
            Ok(Value::Int(name.chars().count() as i64))
        }
        "empty?" => {
            expect_argc(args, 0)?;
            Ok(Value::from(name.is_empty()))
        }
        _ => Err(HostException::no_method(receiver, mid)),
    }
}

fn array_send(
    items: &Rc<Vec<Value>>,
    receiver: &Value,
    mid: &str,
    args: &[Value],
) -> Result<Value, HostException> {
    match mid {
        "[]" => {
            expect_argc(args, 1)?;
            let Value::Int(index) = args[0] else {
                return Err(HostException::coerce_error(&args[0], "Integer"));
            };
            Ok(match wrap_index(index, items.len()) {
                Some(at) => items[at].clone(),
                None => Value::Nil,
            })
        }
        "length" | "size" => {
            expect_argc(args, 0)?;
            Ok(Value::Int(items.len() as i64))
        }
        "empty?" => {
            expect_argc(args, 0)?;
            Ok(Value::from(items.is_empty()))
        }
        "first" => {
            expect_argc(args, 0)?;
            Ok(items.first().cloned().unwrap_or(Value::Nil))
        }
        "last" => {
            expect_argc(args, 0)?;
            Ok(items.last().cloned().unwrap_or(Value::Nil))
        }
        "+" => {
            expect_argc(args, 1)?;
            let Value::Array(rhs) = &args[0] else {
                return Err(HostException::type_error(format!(
                    "no implicit conversion of {} into Array",
                    args[0].type_tag()
                )));
            };
            let mut joined = (**items).clone();
            joined.extend(rhs.iter().cloned());
            Ok(Value::Array(Rc::new(joined)))
        }
        "include?" => {
            expect_argc(args, 1)?;
            Ok(Value::from(items.contains(&args[0])))
        }
        _ => Err(HostException::no_method(receiver, mid)),
    }
}

fn hash_send(
    map: &Rc<indexmap::IndexMap<Value, Value>>,
    receiver: &Value,
    mid: &str,
    args: &[Value],
) -> Result<Value, HostException> {
    match mid {
        "[]" => {
            expect_argc(args, 1)?;
            Ok(map.get(&args[0]).cloned().unwrap_or(Value::Nil))
        }
        "length" | "size" => {
            expect_argc(args, 0)?;
            Ok(Value::Int(map.len() as i64))
        }
        "empty?" => {
            expect_argc(args, 0)?;
            Ok(Value::from(map.is_empty()))
        }
        "key?" | "has_key?" | "include?" | "member?" => {
            expect_argc(args, 1)?;
            Ok(Value::from(map.contains_key(&args[0])))
        }
        _ => Err(HostException::no_method(receiver, mid)),
    }
}

fn bool_send(receiver: &Value, mid: &str, args: &[Value]) -> Result<Value, HostException> {
    let lhs = matches!(receiver, Value::True);
    match mid {
        "&" | "|" | "^" => {
            expect_argc(args, 1)?;
            let rhs = args[0].is_truthy();
            Ok(Value::from(match mid {
                "&" => lhs && rhs,
                "|" => lhs || rhs,
                _ => lhs != rhs,
            }))
        }
        _ => Err(HostException::no_method(receiver, mid)),
    }
}

fn nil_send(receiver: &Value, mid: &str, args: &[Value]) -> Result<Value, HostException> {
    match mid {
        "to_a" => {
            expect_argc(args, 0)?;
            Ok(Value::Array(Rc::new(Vec::new())))
        }
        _ => Err(HostException::no_method(receiver, mid)),
    }
}

/// Resolves a possibly-negative index against a length.
fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let at = if index < 0 { index + len } else { index };
    if (0..len).contains(&at) {
        Some(at as usize)
    } else {
        None
    }
}
