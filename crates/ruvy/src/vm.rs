//! The execution core.
//!
//! [`ExecutionContext`] is the single mutable aggregate of a program run: an
//! operand stack, a frame stack, the shared program counter, the globals
//! map, and the user-method table. Execution is strictly single-threaded
//! and synchronous; an instruction runs to completion before the next fetch,
//! and the only yield points are instruction boundaries.
//!
//! The frame protocol is a scoped acquisition: [`ExecutionContext::eval`]
//! and user-method calls enter a frame through `with_frame`, which saves the
//! program counter and stack depth, runs the dispatch loop until `leave`,
//! and restores both on every exit path, error included. Errors are never
//! recovered here; they unwind through the cleanup and surface to the
//! caller.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    call_data::CallData,
    error::{RunError, RunResult},
    frame::Frame,
    host::HostRuntime,
    insn::Insn,
    io::PrintWriter,
    iseq::InstructionSequence,
    value::{MethodHandle, TypeTag, Value},
};

/// Outcome of a single instruction step.
enum Step {
    /// Continue with the next fetch (branches have already moved the pc).
    Next,
    /// `leave` executed; the frame's dispatch loop is done.
    Leave,
}

/// Everything a running program can see and mutate.
pub struct ExecutionContext<'a, H: HostRuntime, P: PrintWriter> {
    /// Operand stack, shared by all frames.
    stack: Vec<Value>,
    /// Frame stack; the last entry is the running activation.
    frames: Vec<Frame>,
    /// Index of the next instruction in the current frame's sequence.
    pc: usize,
    /// Global variables, lazily imported from the host on first reference
    /// and shadowing the host's set from then on.
    globals: AHashMap<Rc<str>, Value>,
    /// User-defined methods, keyed by the receiver type observed at
    /// definition time.
    methods: AHashMap<(TypeTag, Rc<str>), Rc<MethodHandle>>,
    host: &'a mut H,
    writer: &'a mut P,
}

impl<'a, H: HostRuntime, P: PrintWriter> ExecutionContext<'a, H, P> {
    pub fn new(host: &'a mut H, writer: &'a mut P) -> Self {
        Self {
            stack: Vec::with_capacity(64),
            frames: Vec::with_capacity(16),
            pc: 0,
            globals: AHashMap::new(),
            methods: AHashMap::new(),
            host,
            writer,
        }
    }

    /// Runs a toplevel sequence to completion and returns its value.
    pub fn eval(&mut self, iseq: &Rc<InstructionSequence>) -> RunResult<Value> {
        self.with_frame(iseq, |_| Ok(()))?;
        self.pop()
    }

    /// Reads a global from the context's map (tests and embedders).
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Looks up a user-defined method as a method handle value.
    #[must_use]
    pub fn lookup_method(&self, owner: TypeTag, mid: &str) -> Option<Value> {
        self.methods
            .iter()
            .find(|((tag, name), _)| *tag == owner && &**name == mid)
            .map(|(_, handle)| Value::Method(handle.clone()))
    }

    /// Registers a user-defined method on the type of `owner`.
    pub fn define_method(&mut self, owner: &Value, name: Rc<str>, iseq: Rc<InstructionSequence>) {
        let tag = owner.type_tag();
        let handle = Rc::new(MethodHandle {
            owner: tag,
            name: name.clone(),
            iseq,
        });
        self.methods.insert((tag, name), handle);
    }

    // ========================================================================
    // Frame protocol
    // ========================================================================

    /// Scoped frame acquisition: pushes a frame over `iseq`, runs `pre_body`
    /// (callers bind arguments there), then the dispatch loop until `leave`.
    ///
    /// On every exit, normal or error, the frame is popped, the caller's
    /// program counter restored, and the stack truncated to at most its
    /// prior depth plus one, leaving room for the frame's return value.
    fn with_frame<F>(&mut self, iseq: &Rc<InstructionSequence>, pre_body: F) -> RunResult<()>
    where
        F: FnOnce(&mut Self) -> RunResult<()>,
    {
        let saved_pc = self.pc;
        let saved_depth = self.stack.len();
        self.frames.push(Frame::new(iseq.clone()));
        self.pc = 0;

        let result = pre_body(self).and_then(|()| self.dispatch());

        self.frames.pop().expect("frame stack corrupted");
        self.pc = saved_pc;
        self.stack.truncate(saved_depth + 1);
        result
    }

    /// Fetch, advance, execute until the current frame's `leave`.
    fn dispatch(&mut self) -> RunResult<()> {
        let iseq = self.current_frame().iseq().clone();
        loop {
            let insn = self.fetch(&iseq)?;
            self.pc += 1;
            match self.step(insn)? {
                Step::Next => {}
                Step::Leave => return Ok(()),
            }
        }
    }

    fn fetch<'i>(&self, iseq: &'i InstructionSequence) -> RunResult<&'i Insn> {
        iseq.insns
            .get(self.pc)
            .ok_or_else(|| RunError::internal(format!("program counter {} out of range in {}", self.pc, iseq.label)))
    }

    // ========================================================================
    // Instruction execution
    // ========================================================================

    fn step(&mut self, insn: &Insn) -> RunResult<Step> {
        match insn {
            // === Literals ===
            Insn::PutNil => self.push(Value::Nil),
            Insn::PutObject(value) => self.push(value.clone()),
            Insn::PutObjectFix0 => self.push(Value::Int(0)),
            Insn::PutObjectFix1 => self.push(Value::Int(1)),
            Insn::PutSelf => {
                let receiver = self.current_frame().iseq().self_value.clone();
                self.push(receiver);
            }
            Insn::PutString(s) => self.push(Value::Str(s.clone())),

            // === Stack manipulation ===
            Insn::Pop => {
                self.pop()?;
            }
            Insn::Dup => {
                let top = self.peek()?.clone();
                self.push(top);
            }
            Insn::Swap => {
                let depth = self.stack.len();
                if depth < 2 {
                    return Err(RunError::internal("swap on a stack shallower than two"));
                }
                self.stack.swap(depth - 1, depth - 2);
            }

            // === Collections ===
            Insn::NewArray(count) => {
                let items = self.pop_n(*count)?;
                self.push(Value::Array(Rc::new(items)));
            }
            Insn::DupArray(literal) => self.push(Value::Array(Rc::new((**literal).clone()))),
            Insn::NewHash(count) => {
                let items = self.pop_n(*count)?;
                let mut map = IndexMap::with_capacity(count / 2);
                let mut entries = items.into_iter();
                while let (Some(key), Some(value)) = (entries.next(), entries.next()) {
                    map.insert(key, value);
                }
                self.push(Value::Hash(Rc::new(map)));
            }
            Insn::DupHash(literal) => self.push(Value::Hash(Rc::new((**literal).clone()))),
            Insn::ConcatArray => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                match (&lhs, &rhs) {
                    (Value::Array(a), Value::Array(b)) => {
                        let mut joined = (**a).clone();
                        joined.extend(b.iter().cloned());
                        self.push(Value::Array(Rc::new(joined)));
                    }
                    (Value::Array(_), other) | (other, _) => {
                        return Err(crate::error::HostException::type_error(format!(
                            "no implicit conversion of {} into Array",
                            other.type_tag()
                        ))
                        .into());
                    }
                }
            }

            // === Globals & constants ===
            Insn::GetGlobal(name) => {
                self.import_global(name);
                let value = self.globals.get(&**name).cloned().unwrap_or(Value::Nil);
                self.push(value);
            }
            Insn::SetGlobal(name) => {
                self.import_global(name);
                let value = self.pop()?;
                self.globals.insert(name.clone(), value);
            }
            Insn::GetConstant(name) => {
                let value = self.host.constant(name)?;
                self.push(value);
            }

            // === Locals ===
            Insn::GetLocal(index) => {
                let value = self.current_frame().get_local(*index)?;
                self.push(value);
            }
            Insn::SetLocal(index) => {
                let value = self.pop()?;
                self.current_frame_mut().set_local(*index, value)?;
            }

            // === Branches & inline caches ===
            Insn::Jump(label) => self.jump(label)?,
            Insn::BranchNil(label) => {
                if matches!(self.pop()?, Value::Nil) {
                    self.jump(label)?;
                }
            }
            Insn::BranchUnless(label) => {
                if !self.pop()?.is_truthy() {
                    self.jump(label)?;
                }
            }
            // The constant cache is never filled, so the get always misses
            // and falls through; the set has nothing to store into.
            Insn::OptGetInlineCache { .. } | Insn::OptSetInlineCache => {}

            // === Operator dispatch ===
            Insn::OptPlus(cd)
            | Insn::OptMinus(cd)
            | Insn::OptDiv(cd)
            | Insn::OptMod(cd)
            | Insn::OptAnd(cd)
            | Insn::OptOr(cd)
            | Insn::OptEq(cd)
            | Insn::OptGe(cd)
            | Insn::OptGt(cd)
            | Insn::OptLe(cd)
            | Insn::OptLt(cd)
            | Insn::OptAref(cd)
            | Insn::OptNot(cd)
            | Insn::OptEmptyP(cd)
            | Insn::OptNilP(cd)
            | Insn::OptLength(cd)
            | Insn::OptSucc(cd)
            | Insn::OptSendWithoutBlock(cd) => self.call_from_stack(cd)?,
            Insn::OptArefWith { key, call_data } => {
                let receiver = self.pop()?;
                let result = self.call_method(call_data, receiver, vec![Value::Str(key.clone())])?;
                self.push(result);
            }
            Insn::OptStrFreeze(s) => self.push(Value::Str(s.clone())),
            Insn::OptStrUminus { s, call_data } => {
                let result = self.call_method(call_data, Value::Str(s.clone()), Vec::new())?;
                self.push(result);
            }

            // === Definitions ===
            Insn::DefineMethod { name, iseq } => {
                let owner = iseq.self_value.clone();
                self.define_method(&owner, name.clone(), iseq.clone());
                self.push(Value::Nil);
            }

            Insn::Leave => return Ok(Step::Leave),
        }
        Ok(Step::Next)
    }

    // ========================================================================
    // Method dispatch
    // ========================================================================

    /// Pops `argc` arguments and the receiver, dispatches, pushes the result.
    fn call_from_stack(&mut self, call_data: &CallData) -> RunResult<()> {
        let args = self.pop_n(call_data.argc)?;
        let receiver = self.pop()?;
        let result = self.call_method(call_data, receiver, args)?;
        self.push(result);
        Ok(())
    }

    /// Invokes `call_data.mid` on `receiver`.
    ///
    /// A user-defined method for the receiver's type runs under a fresh
    /// frame with its leading arguments bound into the first local slots;
    /// its result is the value on top of the stack when its `leave`
    /// executes. Everything else is delegated to the host runtime, the only
    /// path to primitive arithmetic, comparison, and printing.
    pub fn call_method(&mut self, call_data: &CallData, receiver: Value, args: Vec<Value>) -> RunResult<Value> {
        let key = (receiver.type_tag(), call_data.mid.clone());
        if let Some(handle) = self.methods.get(&key).cloned() {
            if !handle.iseq.args.accepts(args.len()) {
                return Err(RunError::ArityMismatch {
                    mid: call_data.mid.clone(),
                    expected: handle.iseq.args.lead_count(),
                    given: args.len(),
                });
            }
            let iseq = handle.iseq.clone();
            self.with_frame(&iseq, |ctx| {
                let frame = ctx.current_frame_mut();
                for (slot, arg) in args.into_iter().enumerate() {
                    frame.bind_argument(slot, arg)?;
                }
                Ok(())
            })?;
            self.pop()
        } else {
            self.host
                .send(receiver, &call_data.mid, &args, self.writer)
                .map_err(RunError::Host)
        }
    }

    /// Copies a host global into the context's map the first time the
    /// program touches it; afterwards the context's entry shadows the host.
    fn import_global(&mut self, name: &Rc<str>) {
        if !self.globals.contains_key(&**name) {
            if let Some(value) = self.host.global(name) {
                self.globals.insert(name.clone(), value);
            }
        }
    }

    fn jump(&mut self, label: &Rc<str>) -> RunResult<()> {
        let target = {
            let iseq = self.current_frame().iseq();
            iseq.labels
                .get(&**label)
                .copied()
                .ok_or_else(|| RunError::internal(format!("undefined label `{label}' in {}", iseq.label)))?
        };
        self.pc = target;
        Ok(())
    }

    // ========================================================================
    // Stack and frame helpers
    // ========================================================================

    #[inline]
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    fn pop(&mut self) -> RunResult<Value> {
        self.stack.pop().ok_or_else(|| RunError::internal("stack underflow"))
    }

    #[inline]
    fn peek(&self) -> RunResult<&Value> {
        self.stack.last().ok_or_else(|| RunError::internal("stack underflow"))
    }

    /// Pops n values, preserving their push order.
    fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(RunError::internal("stack underflow"));
        }
        let start = self.stack.len() - n;
        Ok(self.stack.drain(start..).collect())
    }

    #[inline]
    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    #[inline]
    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }
}
