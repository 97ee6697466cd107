//! Instruction definitions.
//!
//! Each variant carries its decoded operands inline; the dispatch loop in
//! [`crate::vm`] executes them. Mnemonics follow the compiler's opcode
//! symbols exactly so a decoded sequence disassembles back to the names it
//! was built from.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;
use strum::IntoStaticStr;

use crate::{call_data::CallData, iseq::InstructionSequence, value::Value};

/// A single decoded instruction.
#[derive(Debug, IntoStaticStr)]
pub enum Insn {
    // === Literals ===
    #[strum(serialize = "putnil")]
    PutNil,
    #[strum(serialize = "putobject")]
    PutObject(Value),
    /// Specialized `putobject 0`, emitted by the compiler for the common case.
    #[strum(serialize = "putobject_INT2FIX_0_")]
    PutObjectFix0,
    /// Specialized `putobject 1`.
    #[strum(serialize = "putobject_INT2FIX_1_")]
    PutObjectFix1,
    #[strum(serialize = "putself")]
    PutSelf,
    #[strum(serialize = "putstring")]
    PutString(Rc<str>),

    // === Stack manipulation ===
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "swap")]
    Swap,

    // === Collections ===
    /// Pop n values, push them as one array in push order.
    #[strum(serialize = "newarray")]
    NewArray(usize),
    /// Push a shallow copy of a literal array.
    #[strum(serialize = "duparray")]
    DupArray(Rc<Vec<Value>>),
    /// Pop n values (n even), push a hash built from consecutive pairs.
    #[strum(serialize = "newhash")]
    NewHash(usize),
    /// Push a shallow copy of a literal hash.
    #[strum(serialize = "duphash")]
    DupHash(Rc<IndexMap<Value, Value>>),
    /// Pop b, pop a, push a + b.
    #[strum(serialize = "concatarray")]
    ConcatArray,

    // === Globals & constants ===
    #[strum(serialize = "getglobal")]
    GetGlobal(Rc<str>),
    #[strum(serialize = "setglobal")]
    SetGlobal(Rc<str>),
    #[strum(serialize = "getconstant")]
    GetConstant(Rc<str>),

    // === Locals ===
    /// Operand is the compiler's biased index; see [`crate::frame::Frame`].
    #[strum(serialize = "getlocal_WC_0")]
    GetLocal(usize),
    #[strum(serialize = "setlocal_WC_0")]
    SetLocal(usize),

    // === Branches & inline caches ===
    #[strum(serialize = "jump")]
    Jump(Rc<str>),
    /// Pop; branch if nil.
    #[strum(serialize = "branchnil")]
    BranchNil(Rc<str>),
    /// Pop; branch if falsy (nil or false).
    #[strum(serialize = "branchunless")]
    BranchUnless(Rc<str>),
    /// The constant cache is never populated, so this always falls through;
    /// the label is kept for disassembly only.
    #[strum(serialize = "opt_getinlinecache")]
    OptGetInlineCache { label: Rc<str> },
    #[strum(serialize = "opt_setinlinecache")]
    OptSetInlineCache,

    // === Operator dispatch (binary: pop argc+1, call, push) ===
    #[strum(serialize = "opt_plus")]
    OptPlus(CallData),
    #[strum(serialize = "opt_minus")]
    OptMinus(CallData),
    #[strum(serialize = "opt_div")]
    OptDiv(CallData),
    #[strum(serialize = "opt_mod")]
    OptMod(CallData),
    #[strum(serialize = "opt_and")]
    OptAnd(CallData),
    #[strum(serialize = "opt_or")]
    OptOr(CallData),
    #[strum(serialize = "opt_eq")]
    OptEq(CallData),
    #[strum(serialize = "opt_ge")]
    OptGe(CallData),
    #[strum(serialize = "opt_gt")]
    OptGt(CallData),
    #[strum(serialize = "opt_le")]
    OptLe(CallData),
    #[strum(serialize = "opt_lt")]
    OptLt(CallData),
    #[strum(serialize = "opt_aref")]
    OptAref(CallData),
    /// Indexing with a literal string key: pop the receiver only.
    #[strum(serialize = "opt_aref_with")]
    OptArefWith { key: Rc<str>, call_data: CallData },

    // === Operator dispatch (unary: pop 1, call, push) ===
    #[strum(serialize = "opt_not")]
    OptNot(CallData),
    #[strum(serialize = "opt_empty_p")]
    OptEmptyP(CallData),
    #[strum(serialize = "opt_nil_p")]
    OptNilP(CallData),
    #[strum(serialize = "opt_length")]
    OptLength(CallData),
    #[strum(serialize = "opt_succ")]
    OptSucc(CallData),

    // === Strings ===
    /// Push the literal; strings here are immutable, so freeze is identity.
    #[strum(serialize = "opt_str_freeze")]
    OptStrFreeze(Rc<str>),
    /// Push the deduplicated literal, via method dispatch so a user-defined
    /// `-@` wins.
    #[strum(serialize = "opt_str_uminus")]
    OptStrUminus { s: Rc<str>, call_data: CallData },

    // === Calls & definitions ===
    #[strum(serialize = "opt_send_without_block")]
    OptSendWithoutBlock(CallData),
    #[strum(serialize = "definemethod")]
    DefineMethod {
        name: Rc<str>,
        iseq: Rc<InstructionSequence>,
    },

    /// Terminates the current frame's dispatch loop; TOS is the return value.
    #[strum(serialize = "leave")]
    Leave,
}

impl Insn {
    /// The compiler's opcode symbol for this instruction.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.into()
    }

    /// The branch label this instruction resolves at runtime, if any.
    ///
    /// `opt_getinlinecache` is excluded: its label is recorded for
    /// disassembly but never taken, since the cache always misses.
    #[must_use]
    pub fn branch_target(&self) -> Option<&Rc<str>> {
        match self {
            Self::Jump(label) | Self::BranchNil(label) | Self::BranchUnless(label) => Some(label),
            _ => None,
        }
    }
}

/// One disassembly line: mnemonic plus rendered operands.
impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Self::PutObject(value) => write!(f, "{mnemonic:<24} {}", value.inspect()),
            Self::PutString(s) | Self::OptStrFreeze(s) => {
                write!(f, "{mnemonic:<24} {}", Value::Str(s.clone()).inspect())
            }
            Self::NewArray(n) | Self::NewHash(n) => write!(f, "{mnemonic:<24} {n}"),
            Self::DupArray(items) => {
                write!(f, "{mnemonic:<24} {}", Value::Array(items.clone()).inspect())
            }
            Self::DupHash(map) => write!(f, "{mnemonic:<24} {}", Value::Hash(map.clone()).inspect()),
            Self::GetGlobal(name) | Self::SetGlobal(name) | Self::GetConstant(name) => {
                write!(f, "{mnemonic:<24} :{name}")
            }
            Self::GetLocal(index) | Self::SetLocal(index) => write!(f, "{mnemonic:<24} {index}"),
            Self::Jump(label) | Self::BranchNil(label) | Self::BranchUnless(label) => {
                write!(f, "{mnemonic:<24} {label}")
            }
            Self::OptGetInlineCache { label } => write!(f, "{mnemonic:<24} {label}, <is>"),
            Self::OptSetInlineCache => write!(f, "{mnemonic:<24} <is>"),
            Self::OptPlus(cd)
            | Self::OptMinus(cd)
            | Self::OptDiv(cd)
            | Self::OptMod(cd)
            | Self::OptAnd(cd)
            | Self::OptOr(cd)
            | Self::OptEq(cd)
            | Self::OptGe(cd)
            | Self::OptGt(cd)
            | Self::OptLe(cd)
            | Self::OptLt(cd)
            | Self::OptAref(cd)
            | Self::OptNot(cd)
            | Self::OptEmptyP(cd)
            | Self::OptNilP(cd)
            | Self::OptLength(cd)
            | Self::OptSucc(cd)
            | Self::OptSendWithoutBlock(cd) => write!(f, "{mnemonic:<24} {cd}"),
            Self::OptArefWith { key, call_data } => {
                write!(f, "{mnemonic:<24} {}, {call_data}", Value::Str(key.clone()).inspect())
            }
            Self::OptStrUminus { s, call_data } => {
                write!(f, "{mnemonic:<24} {}, {call_data}", Value::Str(s.clone()).inspect())
            }
            Self::DefineMethod { name, .. } => write!(f, "{mnemonic:<24} :{name}"),
            Self::PutNil
            | Self::PutObjectFix0
            | Self::PutObjectFix1
            | Self::PutSelf
            | Self::Pop
            | Self::Dup
            | Self::Swap
            | Self::ConcatArray
            | Self::Leave => f.write_str(mnemonic),
        }
    }
}
