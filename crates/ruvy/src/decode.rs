//! Decoding of the compiler's "to-array" instruction-sequence dump.
//!
//! The host compiler serializes an instruction sequence as a nested array:
//! the 11th element is the locals name list, the 12th the argument
//! descriptor, and the last a flat list of entries. An entry is a line
//! number (skipped), a tracing-event symbol (skipped), a bare label symbol
//! (its position is recorded), or an opcode tuple. The decoder performs
//! exhaustive structural matching over those tuples; anything it does not
//! recognize is a [`DecodeError`], never a silent skip.
//!
//! The tree itself is represented by [`Raw`], which can be built directly or
//! loaded from the tagged-JSON form the CLI's compile bridge emits. Plain
//! JSON cannot tell the host's symbols and strings apart, so the bridge tags
//! them: symbols become JSON strings, runtime strings become
//! `{"string": s}`, and literal hashes become `{"hash": [[k, v], ...]}`.

use std::{fmt, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    call_data::CallData,
    insn::Insn,
    iseq::{ArgsDescriptor, InstructionSequence},
    value::Value,
};

/// One node of the compiler's dump tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    Nil,
    Bool(bool),
    Int(i64),
    Sym(Rc<str>),
    Str(Rc<str>),
    List(Vec<Raw>),
    Map(Vec<(Raw, Raw)>),
}

impl Raw {
    pub fn sym(name: &str) -> Self {
        Self::Sym(name.into())
    }

    pub fn str(s: &str) -> Self {
        Self::Str(s.into())
    }

    /// Parses the tagged-JSON dump format.
    pub fn from_json_str(json: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|err| DecodeError::BadJson(err.to_string()))?;
        Self::from_json(&value)
    }

    /// Converts a parsed JSON tree into a `Raw` tree.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DecodeError> {
        use serde_json::Value as Json;
        match value {
            Json::Null => Ok(Self::Nil),
            Json::Bool(b) => Ok(Self::Bool(*b)),
            Json::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .ok_or_else(|| DecodeError::BadLiteral(format!("non-integer number {n}"))),
            Json::String(s) => Ok(Self::Sym(s.as_str().into())),
            Json::Array(items) => items.iter().map(Self::from_json).collect::<Result<_, _>>().map(Self::List),
            Json::Object(fields) => {
                if fields.len() != 1 {
                    return Err(DecodeError::BadLiteral(format!(
                        "expected a single-key tag object, got {} keys",
                        fields.len()
                    )));
                }
                let (tag, payload) = fields.iter().next().expect("len checked above");
                match (tag.as_str(), payload) {
                    ("string", Json::String(s)) => Ok(Self::Str(s.as_str().into())),
                    ("hash", Json::Array(pairs)) => {
                        let mut entries = Vec::with_capacity(pairs.len());
                        for pair in pairs {
                            let Json::Array(kv) = pair else {
                                return Err(DecodeError::BadLiteral("hash entry is not a pair".to_owned()));
                            };
                            let [key, value] = kv.as_slice() else {
                                return Err(DecodeError::BadLiteral("hash entry is not a pair".to_owned()));
                            };
                            entries.push((Self::from_json(key)?, Self::from_json(value)?));
                        }
                        Ok(Self::Map(entries))
                    }
                    _ => Err(DecodeError::BadLiteral(format!("unrecognized tag object `{tag}'"))),
                }
            }
        }
    }
}

/// Malformed compiler input. Fatal to construction; never raised at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// An opcode symbol outside the supported instruction set.
    UnknownOpcode(String),
    /// A known opcode whose operand list does not match its shape.
    BadOperands { opcode: String, expected: &'static str },
    /// An operand that is not a representable literal.
    BadLiteral(String),
    /// The dump's JSON could not be parsed at all.
    BadJson(String),
    /// A branch names a label the sequence never defines.
    MissingLabel(String),
    /// `newhash` with an odd operand cannot form key/value pairs.
    OddHashCount(usize),
    /// A structural problem with the sequence container itself.
    MalformedSequence(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode(op) => write!(f, "unknown opcode `{op}'"),
            Self::BadOperands { opcode, expected } => {
                write!(f, "opcode `{opcode}' expects operands {expected}")
            }
            Self::BadLiteral(detail) => write!(f, "unrepresentable literal: {detail}"),
            Self::BadJson(detail) => write!(f, "malformed dump JSON: {detail}"),
            Self::MissingLabel(label) => write!(f, "branch to undefined label `{label}'"),
            Self::OddHashCount(n) => write!(f, "newhash with odd operand {n}"),
            Self::MalformedSequence(detail) => write!(f, "malformed instruction sequence: {detail}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes a toplevel dump tree into an instruction sequence.
///
/// Nested sequences (method bodies inside `definemethod`) are decoded
/// recursively and inherit the toplevel `main` self value.
pub fn decode(raw: &Raw) -> Result<Rc<InstructionSequence>, DecodeError> {
    decode_iseq(raw, &Value::Main)
}

fn decode_iseq(raw: &Raw, self_value: &Value) -> Result<Rc<InstructionSequence>, DecodeError> {
    let Raw::List(elems) = raw else {
        return Err(DecodeError::MalformedSequence("sequence must be a list"));
    };
    // Layout: ..., label at [5], locals at [10], args at [11], body last.
    if elems.len() < 13 {
        return Err(DecodeError::MalformedSequence("truncated sequence container"));
    }

    let label: Rc<str> = match &elems[5] {
        Raw::Str(s) | Raw::Sym(s) => s.clone(),
        _ => "<iseq>".into(),
    };
    let locals = decode_locals(&elems[10])?;
    let args = decode_args(&elems[11])?;
    let Raw::List(entries) = elems.last().expect("length checked above") else {
        return Err(DecodeError::MalformedSequence("instruction list must be a list"));
    };

    let mut insns = Vec::new();
    let mut labels = AHashMap::new();
    for entry in entries {
        match entry {
            // Line numbers carry no behavior.
            Raw::Int(_) => {}
            Raw::Sym(s) if &**s == "RUBY_EVENT_LINE" => {}
            // Any other bare symbol defines a label at the next instruction.
            Raw::Sym(s) => {
                labels.insert(s.clone(), insns.len());
            }
            Raw::List(tuple) => insns.push(decode_insn(tuple, self_value)?),
            _ => return Err(DecodeError::MalformedSequence("unrecognized entry in instruction list")),
        }
    }

    // Branch targets are resolved through this map at run time; validating
    // here keeps a runtime miss an internal bug rather than a user error.
    for insn in &insns {
        if let Some(target) = insn.branch_target() {
            if !labels.contains_key(target) {
                return Err(DecodeError::MissingLabel(target.to_string()));
            }
        }
    }

    Ok(Rc::new(InstructionSequence {
        self_value: self_value.clone(),
        label,
        insns,
        labels,
        locals,
        args,
    }))
}

fn decode_locals(raw: &Raw) -> Result<Vec<Rc<str>>, DecodeError> {
    let Raw::List(entries) = raw else {
        return Err(DecodeError::MalformedSequence("locals must be a list"));
    };
    entries
        .iter()
        .map(|entry| match entry {
            Raw::Sym(name) | Raw::Str(name) => Ok(name.clone()),
            _ => Err(DecodeError::MalformedSequence("local names must be symbols")),
        })
        .collect()
}

fn decode_args(raw: &Raw) -> Result<ArgsDescriptor, DecodeError> {
    match raw {
        Raw::List(entries) if entries.is_empty() => Ok(ArgsDescriptor::None),
        Raw::Map(pairs) => {
            if pairs.is_empty() {
                return Ok(ArgsDescriptor::None);
            }
            for (key, value) in pairs {
                if matches!(key, Raw::Sym(name) if &**name == "lead_num") {
                    let Raw::Int(count) = value else {
                        return Err(DecodeError::MalformedSequence("lead_num must be an integer"));
                    };
                    let count = usize::try_from(*count)
                        .map_err(|_| DecodeError::MalformedSequence("lead_num must be non-negative"))?;
                    return Ok(ArgsDescriptor::Lead(count));
                }
            }
            Err(DecodeError::MalformedSequence("unsupported argument descriptor"))
        }
        _ => Err(DecodeError::MalformedSequence("argument descriptor must be empty or a map")),
    }
}

/// Converts a literal operand into a runtime value.
fn decode_literal(raw: &Raw) -> Result<Value, DecodeError> {
    match raw {
        Raw::Nil => Ok(Value::Nil),
        Raw::Bool(true) => Ok(Value::True),
        Raw::Bool(false) => Ok(Value::False),
        Raw::Int(n) => Ok(Value::Int(*n)),
        Raw::Sym(name) => Ok(Value::Sym(name.clone())),
        Raw::Str(s) => Ok(Value::Str(s.clone())),
        Raw::List(items) => {
            let values = items.iter().map(decode_literal).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(Rc::new(values)))
        }
        Raw::Map(pairs) => Ok(Value::Hash(Rc::new(decode_literal_hash(pairs)?))),
    }
}

fn decode_literal_hash(pairs: &[(Raw, Raw)]) -> Result<IndexMap<Value, Value>, DecodeError> {
    let mut map = IndexMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        map.insert(decode_literal(key)?, decode_literal(value)?);
    }
    Ok(map)
}

/// Extracts `mid` and `orig_argc` from a call-data descriptor map; other
/// keys (`flag`) carry no behavior here.
fn decode_call_data(raw: &Raw) -> Result<CallData, DecodeError> {
    let Raw::Map(pairs) = raw else {
        return Err(DecodeError::MalformedSequence("call data must be a map"));
    };
    let mut mid = None;
    let mut argc = None;
    for (key, value) in pairs {
        let Raw::Sym(key) = key else { continue };
        match (&**key, value) {
            ("mid", Raw::Sym(name)) => mid = Some(name.clone()),
            ("orig_argc", Raw::Int(n)) => {
                argc = usize::try_from(*n).ok();
            }
            _ => {}
        }
    }
    match (mid, argc) {
        (Some(mid), Some(argc)) => Ok(CallData { mid, argc }),
        _ => Err(DecodeError::MalformedSequence("call data must carry mid and orig_argc")),
    }
}

fn decode_count(n: i64) -> Result<usize, DecodeError> {
    usize::try_from(n).map_err(|_| DecodeError::MalformedSequence("count operand must be non-negative"))
}

/// Every opcode symbol the decoder understands, used to tell a bad operand
/// list apart from an opcode outside the subset.
const KNOWN_OPCODES: &[&str] = &[
    "putnil",
    "putobject",
    "putobject_INT2FIX_0_",
    "putobject_INT2FIX_1_",
    "putself",
    "putstring",
    "pop",
    "dup",
    "swap",
    "newarray",
    "duparray",
    "newhash",
    "duphash",
    "concatarray",
    "getglobal",
    "setglobal",
    "getlocal_WC_0",
    "setlocal_WC_0",
    "getconstant",
    "opt_getinlinecache",
    "opt_setinlinecache",
    "jump",
    "branchnil",
    "branchunless",
    "opt_plus",
    "opt_minus",
    "opt_div",
    "opt_mod",
    "opt_and",
    "opt_or",
    "opt_eq",
    "opt_ge",
    "opt_gt",
    "opt_le",
    "opt_lt",
    "opt_aref",
    "opt_aref_with",
    "opt_not",
    "opt_empty_p",
    "opt_nil_p",
    "opt_length",
    "opt_succ",
    "opt_str_freeze",
    "opt_str_uminus",
    "opt_send_without_block",
    "definemethod",
    "leave",
];

fn decode_insn(tuple: &[Raw], self_value: &Value) -> Result<Insn, DecodeError> {
    let Some(Raw::Sym(opcode)) = tuple.first() else {
        return Err(DecodeError::MalformedSequence("instruction tuple must start with an opcode symbol"));
    };
    let operands = &tuple[1..];

    let insn = match (&**opcode, operands) {
        ("putnil", []) => Insn::PutNil,
        ("putobject", [literal]) => Insn::PutObject(decode_literal(literal)?),
        ("putobject_INT2FIX_0_", []) => Insn::PutObjectFix0,
        ("putobject_INT2FIX_1_", []) => Insn::PutObjectFix1,
        ("putself", []) => Insn::PutSelf,
        ("putstring", [Raw::Str(s)]) => Insn::PutString(s.clone()),
        ("pop", []) => Insn::Pop,
        ("dup", []) => Insn::Dup,
        ("swap", []) => Insn::Swap,
        ("newarray", [Raw::Int(n)]) => Insn::NewArray(decode_count(*n)?),
        ("duparray", [Raw::List(items)]) => {
            let values = items.iter().map(decode_literal).collect::<Result<Vec<_>, _>>()?;
            Insn::DupArray(Rc::new(values))
        }
        ("newhash", [Raw::Int(n)]) => {
            let count = decode_count(*n)?;
            if count % 2 != 0 {
                return Err(DecodeError::OddHashCount(count));
            }
            Insn::NewHash(count)
        }
        ("duphash", [Raw::Map(pairs)]) => Insn::DupHash(Rc::new(decode_literal_hash(pairs)?)),
        ("concatarray", []) => Insn::ConcatArray,
        ("getglobal", [Raw::Sym(name)]) => Insn::GetGlobal(name.clone()),
        ("setglobal", [Raw::Sym(name)]) => Insn::SetGlobal(name.clone()),
        ("getlocal_WC_0", [Raw::Int(index)]) => Insn::GetLocal(decode_count(*index)?),
        ("setlocal_WC_0", [Raw::Int(index)]) => Insn::SetLocal(decode_count(*index)?),
        ("getconstant", [Raw::Sym(name)]) => Insn::GetConstant(name.clone()),
        ("opt_getinlinecache", [Raw::Sym(label), _cache]) => Insn::OptGetInlineCache { label: label.clone() },
        ("opt_setinlinecache", [_cache]) => Insn::OptSetInlineCache,
        ("jump", [Raw::Sym(label)]) => Insn::Jump(label.clone()),
        ("branchnil", [Raw::Sym(label)]) => Insn::BranchNil(label.clone()),
        ("branchunless", [Raw::Sym(label)]) => Insn::BranchUnless(label.clone()),
        ("opt_plus", [cd]) => Insn::OptPlus(decode_call_data(cd)?),
        ("opt_minus", [cd]) => Insn::OptMinus(decode_call_data(cd)?),
        ("opt_div", [cd]) => Insn::OptDiv(decode_call_data(cd)?),
        ("opt_mod", [cd]) => Insn::OptMod(decode_call_data(cd)?),
        ("opt_and", [cd]) => Insn::OptAnd(decode_call_data(cd)?),
        ("opt_or", [cd]) => Insn::OptOr(decode_call_data(cd)?),
        ("opt_eq", [cd]) => Insn::OptEq(decode_call_data(cd)?),
        ("opt_ge", [cd]) => Insn::OptGe(decode_call_data(cd)?),
        ("opt_gt", [cd]) => Insn::OptGt(decode_call_data(cd)?),
        ("opt_le", [cd]) => Insn::OptLe(decode_call_data(cd)?),
        ("opt_lt", [cd]) => Insn::OptLt(decode_call_data(cd)?),
        ("opt_aref", [cd]) => Insn::OptAref(decode_call_data(cd)?),
        ("opt_aref_with", [Raw::Str(key), cd]) => Insn::OptArefWith {
            key: key.clone(),
            call_data: decode_call_data(cd)?,
        },
        ("opt_not", [cd]) => Insn::OptNot(decode_call_data(cd)?),
        ("opt_empty_p", [cd]) => Insn::OptEmptyP(decode_call_data(cd)?),
        ("opt_nil_p", [cd]) => Insn::OptNilP(decode_call_data(cd)?),
        ("opt_length", [cd]) => Insn::OptLength(decode_call_data(cd)?),
        ("opt_succ", [cd]) => Insn::OptSucc(decode_call_data(cd)?),
        // Current compilers append call data to the freeze specialization;
        // older dumps carry the bare literal. Both decode the same way.
        ("opt_str_freeze", [Raw::Str(s)]) | ("opt_str_freeze", [Raw::Str(s), Raw::Map(_)]) => {
            Insn::OptStrFreeze(s.clone())
        }
        ("opt_str_uminus", [Raw::Str(s), cd]) => Insn::OptStrUminus {
            s: s.clone(),
            call_data: decode_call_data(cd)?,
        },
        ("opt_send_without_block", [cd]) => Insn::OptSendWithoutBlock(decode_call_data(cd)?),
        ("definemethod", [Raw::Sym(name), body]) => Insn::DefineMethod {
            name: name.clone(),
            iseq: decode_iseq(body, self_value)?,
        },
        ("leave", []) => Insn::Leave,
        (opcode, _) => {
            return Err(if KNOWN_OPCODES.contains(&opcode) {
                DecodeError::BadOperands {
                    opcode: opcode.to_owned(),
                    expected: expected_shape(opcode),
                }
            } else {
                DecodeError::UnknownOpcode(opcode.to_owned())
            });
        }
    };
    Ok(insn)
}

/// Human-readable operand shape for diagnostics.
fn expected_shape(opcode: &str) -> &'static str {
    match opcode {
        "putobject" => "(literal)",
        "putstring" | "opt_str_freeze" => "(string)",
        "newarray" | "newhash" | "getlocal_WC_0" | "setlocal_WC_0" => "(count)",
        "duparray" => "(array literal)",
        "duphash" => "(hash literal)",
        "getglobal" | "setglobal" | "getconstant" => "(name)",
        "jump" | "branchnil" | "branchunless" => "(label)",
        "opt_getinlinecache" => "(label, cache)",
        "opt_setinlinecache" => "(cache)",
        "opt_aref_with" => "(key, call data)",
        "opt_str_uminus" => "(string, call data)",
        "definemethod" => "(name, sequence)",
        _ if opcode.starts_with("opt_") => "(call data)",
        _ => "()",
    }
}
