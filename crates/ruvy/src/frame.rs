//! Runtime activation records.

use std::rc::Rc;

use crate::{
    error::{RunError, RunResult},
    iseq::InstructionSequence,
    value::Value,
};

/// One activation of an instruction sequence.
///
/// Owns a locals vector with one slot per name in the sequence's locals
/// list. Every slot starts out undefined (`None`), which is distinct from
/// every runtime value including nil; reading an undefined slot is a
/// [`RunError::UndefinedLocal`].
#[derive(Debug)]
pub struct Frame {
    iseq: Rc<InstructionSequence>,
    locals: Vec<Option<Value>>,
}

impl Frame {
    #[must_use]
    pub fn new(iseq: Rc<InstructionSequence>) -> Self {
        let locals = vec![None; iseq.local_count()];
        Self { iseq, locals }
    }

    /// The instruction sequence this frame is executing.
    #[must_use]
    pub fn iseq(&self) -> &Rc<InstructionSequence> {
        &self.iseq
    }

    /// Translates the compiler's biased operand index into a slot.
    ///
    /// The compiler counts local indices down from `locals.len() + 2`, so
    /// index 3 names the last slot and index `3 + (len - 1)` names slot 0.
    fn translate(&self, index: usize) -> RunResult<usize> {
        let count = self.locals.len();
        index
            .checked_sub(3)
            .and_then(|bias| count.checked_sub(bias))
            .and_then(|slot| slot.checked_sub(1))
            .ok_or_else(|| {
                RunError::internal(format!(
                    "local index {index} out of range for {count} slots in {}",
                    self.iseq.label
                ))
            })
    }

    /// Reads a local through its biased operand index.
    pub fn get_local(&self, index: usize) -> RunResult<Value> {
        let slot = self.translate(index)?;
        self.locals[slot].clone().ok_or_else(|| RunError::UndefinedLocal {
            name: self.iseq.locals[slot].clone(),
            receiver: self.iseq.self_value.inspect(),
        })
    }

    /// Writes a local through its biased operand index.
    pub fn set_local(&mut self, index: usize, value: Value) -> RunResult<()> {
        let slot = self.translate(index)?;
        self.locals[slot] = Some(value);
        Ok(())
    }

    /// Writes an argument directly into slot `slot`, used when binding the
    /// leading positional arguments of a method call.
    pub fn bind_argument(&mut self, slot: usize, value: Value) -> RunResult<()> {
        match self.locals.get_mut(slot) {
            Some(local) => {
                *local = Some(value);
                Ok(())
            }
            None => Err(RunError::internal(format!(
                "argument slot {slot} out of range for {} locals in {}",
                self.locals.len(),
                self.iseq.label
            ))),
        }
    }
}
