//! Decoded instruction sequences.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{insn::Insn, value::Value};

/// The argument descriptor of an instruction sequence.
///
/// Only two shapes are supported: no arguments, or exactly `k` leading
/// positional arguments that land in the first `k` local slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgsDescriptor {
    None,
    Lead(usize),
}

impl ArgsDescriptor {
    /// Whether a call with `argc` positional arguments matches this shape.
    #[must_use]
    pub fn accepts(self, argc: usize) -> bool {
        match self {
            Self::None => argc == 0,
            Self::Lead(count) => argc == count,
        }
    }

    /// Number of leading positional arguments this descriptor binds.
    #[must_use]
    pub fn lead_count(self) -> usize {
        match self {
            Self::None => 0,
            Self::Lead(count) => count,
        }
    }
}

/// One unit of decoded code: the instruction list of a toplevel program or a
/// method body, together with everything needed to execute it.
///
/// Immutable after construction. Nested sequences (method bodies) hang off
/// `definemethod` instructions, so a program forms a plain ownership tree.
#[derive(Debug)]
pub struct InstructionSequence {
    /// Receiver pushed by `putself` inside this sequence.
    pub self_value: Value,
    /// Display label from the compiler dump, e.g. `<main>` or a method name.
    pub label: Rc<str>,
    pub insns: Vec<Insn>,
    /// Branch label -> index into `insns`.
    pub labels: AHashMap<Rc<str>, usize>,
    /// Ordered local-variable names; the length is the frame's slot count.
    pub locals: Vec<Rc<str>>,
    pub args: ArgsDescriptor,
}

impl InstructionSequence {
    /// Number of local slots a frame over this sequence needs.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}
