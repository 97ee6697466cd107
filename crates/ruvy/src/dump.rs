//! Instruction-sequence disassembly.

use std::{collections::VecDeque, rc::Rc};

use crate::{insn::Insn, iseq::InstructionSequence};

/// Pretty-prints every instruction in every sequence reachable from `root`,
/// breadth-first, each sequence introduced by a `== disasm` banner.
#[must_use]
pub fn disasm(root: &Rc<InstructionSequence>) -> String {
    let mut out = String::new();
    let mut queue: VecDeque<Rc<InstructionSequence>> = VecDeque::from([root.clone()]);
    while let Some(iseq) = queue.pop_front() {
        out.push_str(&format!("== disasm: #<ISeq:{}>\n", iseq.label));
        for (index, insn) in iseq.insns.iter().enumerate() {
            out.push_str(&format!("{index:04} {insn}\n"));
            if let Insn::DefineMethod { iseq: body, .. } = insn {
                queue.push_back(body.clone());
            }
        }
    }
    out
}
