use crate::jvm::code::{BranchInstruction, Instruction};
use crate::util::{Offset, Width};

/// What one stack or local variable word may hold, as far as one resource is concerned
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceValue {
    NotInstance,

    /// The word may hold the tracked instance
    Instance,
}

impl ResourceValue {
    pub fn is_instance(self) -> bool {
        self == ResourceValue::Instance
    }

    fn merge(self, other: ResourceValue) -> ResourceValue {
        if self.is_instance() || other.is_instance() {
            ResourceValue::Instance
        } else {
            ResourceValue::NotInstance
        }
    }
}

/// Status of the tracked resource at a point in the method
///
/// The variants are declared in lattice order: merging two statuses keeps the smaller one. That
/// way a resource that is open on one incoming path and closed on the other is still open.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceStatus {
    /// Stored somewhere or handed off, so someone else is responsible for closing it
    Escaped,
    Open,

    /// Open, but only on paths that involve an exception being thrown
    OpenOnExceptionPath,
    Closed,

    /// Allocated, but the constructor that opens it hasn't run yet
    Created,
    Nonexistent,
}

impl ResourceStatus {
    pub fn merge(self, other: ResourceStatus) -> ResourceStatus {
        self.min(other)
    }

    /// Statuses at the exit that amount to a leak
    pub fn is_potential_leak(self) -> bool {
        matches!(self, ResourceStatus::Open | ResourceStatus::OpenOnExceptionPath)
    }
}

/// Inconsistent abstract state, from bytecode the verifier would have rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataflowError {
    StackUnderflow,
    StackHeightMismatch { expected: usize, found: usize },
    LocalOutOfRange { index: usize, max_locals: usize },
}

/// Abstract frame for one resource
///
/// Locals and stack are tracked by words, so `long` and `double` take two entries. Only whether
/// a word may hold the tracked instance matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFrame {
    pub locals: Vec<ResourceValue>,
    pub stack: Vec<ResourceValue>,
    pub status: ResourceStatus,
}

impl ResourceFrame {
    /// Frame on method entry, optionally with the tracked instance already in a local
    pub fn entry(max_locals: u16, instance_param_slot: Option<u16>) -> ResourceFrame {
        let mut locals = vec![ResourceValue::NotInstance; max_locals as usize];
        if let Some(local) = instance_param_slot.and_then(|slot| locals.get_mut(slot as usize)) {
            *local = ResourceValue::Instance;
        }
        ResourceFrame {
            locals,
            stack: vec![],
            status: ResourceStatus::Nonexistent,
        }
    }

    pub fn push(&mut self, value: ResourceValue) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<ResourceValue, DataflowError> {
        self.stack.pop().ok_or(DataflowError::StackUnderflow)
    }

    /// Look at a word on the stack, counting down from the top (`0` is the top)
    pub fn peek(&self, depth: usize) -> Result<ResourceValue, DataflowError> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|idx| self.stack[idx])
            .ok_or(DataflowError::StackUnderflow)
    }

    pub fn local(&self, index: u16) -> Result<ResourceValue, DataflowError> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or(DataflowError::LocalOutOfRange {
                index: index as usize,
                max_locals: self.locals.len(),
            })
    }

    pub fn set_local(&mut self, index: u16, value: ResourceValue) -> Result<(), DataflowError> {
        let max_locals = self.locals.len();
        let local = self
            .locals
            .get_mut(index as usize)
            .ok_or(DataflowError::LocalOutOfRange {
                index: index as usize,
                max_locals,
            })?;
        *local = value;
        Ok(())
    }

    pub fn mark_top_instance(&mut self) -> Result<(), DataflowError> {
        let top = self.stack.last_mut().ok_or(DataflowError::StackUnderflow)?;
        *top = ResourceValue::Instance;
        Ok(())
    }

    /// Positions of every word holding the instance among the top `consumed` stack words
    ///
    /// Positions count from the deepest consumed word, so for a call with a receiver the
    /// receiver is at position 0.
    pub fn instance_arguments(&self, consumed: usize) -> Result<Vec<usize>, DataflowError> {
        let start = self
            .stack
            .len()
            .checked_sub(consumed)
            .ok_or(DataflowError::StackUnderflow)?;
        Ok(self.stack[start..]
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_instance())
            .map(|(position, _)| position)
            .collect())
    }

    /// Merge another frame into this one, returning whether this one changed
    pub fn merge_with(&mut self, other: &ResourceFrame) -> Result<bool, DataflowError> {
        if self.stack.len() != other.stack.len() {
            return Err(DataflowError::StackHeightMismatch {
                expected: self.stack.len(),
                found: other.stack.len(),
            });
        }
        if self.locals.len() != other.locals.len() {
            return Err(DataflowError::LocalOutOfRange {
                index: other.locals.len(),
                max_locals: self.locals.len(),
            });
        }

        let mut changed = false;
        let words = self.locals.iter_mut().chain(self.stack.iter_mut());
        let other_words = other.locals.iter().chain(other.stack.iter());
        for (word, other_word) in words.zip(other_words) {
            let merged = word.merge(*other_word);
            changed |= merged != *word;
            *word = merged;
        }

        let status = self.status.merge(other.status);
        changed |= status != self.status;
        self.status = status;

        Ok(changed)
    }

    fn pop_words(&mut self, count: usize) -> Result<(), DataflowError> {
        let remaining = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(DataflowError::StackUnderflow)?;
        self.stack.truncate(remaining);
        Ok(())
    }

    fn push_words(&mut self, count: usize) {
        for _ in 0..count {
            self.stack.push(ResourceValue::NotInstance);
        }
    }

    /// Update slot marks for a non-branching instruction
    ///
    /// Only the movement of words is modelled here. Status changes depend on the resource and
    /// are the visitor's job.
    pub fn model_instruction(&mut self, insn: &Instruction) -> Result<(), DataflowError> {
        use Instruction::*;
        use ResourceValue::NotInstance;

        match insn {
            Nop | IInc(_, _) => (),

            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) | Ldc(_) | ILoad(_)
            | FLoad(_) | New(_) => self.push_words(1),

            LConst0 | LConst1 | DConst0 | DConst1 | Ldc2(_) | LLoad(_) | DLoad(_) => {
                self.push_words(2)
            }

            ALoad(idx) => {
                let value = self.local(*idx)?;
                self.push(value);
            }

            IStore(idx) | FStore(idx) => {
                self.pop()?;
                self.set_local(*idx, NotInstance)?;
            }
            LStore(idx) | DStore(idx) => {
                self.pop_words(2)?;
                self.set_local(*idx, NotInstance)?;
                self.set_local(*idx + 1, NotInstance)?;
            }
            AStore(idx) => {
                let value = self.pop()?;
                self.set_local(*idx, value)?;
            }

            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => {
                self.pop_words(2)?;
                self.push_words(1);
            }
            LALoad | DALoad => {
                self.pop_words(2)?;
                self.push_words(2);
            }
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => self.pop_words(3)?,
            LAStore | DAStore => self.pop_words(4)?,

            Pop | MonitorEnter | MonitorExit => self.pop_words(1)?,
            Pop2 => self.pop_words(2)?,

            Dup => {
                let v1 = self.pop()?;
                self.stack.extend([v1, v1]);
            }
            DupX1 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.stack.extend([v1, v2, v1]);
            }
            DupX2 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                let v3 = self.pop()?;
                self.stack.extend([v1, v3, v2, v1]);
            }
            Dup2 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.stack.extend([v2, v1, v2, v1]);
            }
            Dup2X1 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                let v3 = self.pop()?;
                self.stack.extend([v2, v1, v3, v2, v1]);
            }
            Dup2X2 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                let v3 = self.pop()?;
                let v4 = self.pop()?;
                self.stack.extend([v2, v1, v4, v3, v2, v1]);
            }
            Swap => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.stack.extend([v1, v2]);
            }

            IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) | FAdd | FSub
            | FMul | FDiv | FRem | FCmp(_) => {
                self.pop_words(2)?;
                self.push_words(1);
            }
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor | DAdd | DSub | DMul | DDiv
            | DRem => {
                self.pop_words(4)?;
                self.push_words(2);
            }
            LSh(_) => {
                self.pop_words(3)?;
                self.push_words(2);
            }
            LCmp | DCmp(_) => {
                self.pop_words(4)?;
                self.push_words(1);
            }

            INeg | FNeg | I2F | F2I | I2B | I2C | I2S | NewArray(_) | ANewArray(_)
            | ArrayLength | InstanceOf(_) => {
                self.pop_words(1)?;
                self.push_words(1);
            }
            LNeg | DNeg | L2D | D2L => {
                self.pop_words(2)?;
                self.push_words(2);
            }
            I2L | I2D | F2L | F2D => {
                self.pop_words(1)?;
                self.push_words(2);
            }
            L2I | L2F | D2I | D2F => {
                self.pop_words(2)?;
                self.push_words(1);
            }

            // A cast doesn't change which object is on the stack
            CheckCast(_) => {
                self.peek(0)?;
            }

            GetStatic(field) => self.push_words(field.descriptor.width()),
            PutStatic(field) => self.pop_words(field.descriptor.width())?,
            GetField(field) => {
                self.pop_words(1)?;
                self.push_words(field.descriptor.width());
            }
            PutField(field) => self.pop_words(1 + field.descriptor.width())?,

            Invoke(invoke_type, method) => {
                self.pop_words(method.descriptor.parameter_length(invoke_type.has_receiver()))?;
                self.push_words(method.descriptor.return_width());
            }
            InvokeDynamic(call_site) => {
                self.pop_words(call_site.descriptor.parameter_length(false))?;
                self.push_words(call_site.descriptor.return_width());
            }

            MultiANewArray(_, dimensions) => {
                self.pop_words(*dimensions as usize)?;
                self.push_words(1);
            }
        }

        Ok(())
    }

    /// Update slot marks for the operands a branch instruction consumes
    pub fn model_branch(&mut self, insn: &BranchInstruction<Offset>) -> Result<(), DataflowError> {
        use BranchInstruction::*;

        match insn {
            Goto(_) | Return => Ok(()),
            If(_, _)
            | TableSwitch { .. }
            | LookupSwitch { .. }
            | IfNull(_, _)
            | IReturn
            | FReturn
            | AReturn
            | AThrow => self.pop_words(1),
            IfICmp(_, _) | IfACmp(_, _) | LReturn | DReturn => self.pop_words(2),
        }
    }
}
