#![doc = include_str!("../../../README.md")]
mod call_data;
mod decode;
mod dump;
mod error;
mod frame;
mod host;
mod insn;
mod io;
mod iseq;
mod value;
mod vm;

pub use crate::{
    call_data::CallData,
    decode::{decode, DecodeError, Raw},
    dump::disasm,
    error::{HostExcClass, HostException, RunError, RunResult},
    frame::Frame,
    host::{HostRuntime, StdHost},
    insn::Insn,
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    iseq::{ArgsDescriptor, InstructionSequence},
    value::{MethodHandle, TypeTag, Value},
    vm::ExecutionContext,
};
