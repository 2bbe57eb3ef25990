use crate::jvm::code::{AnyInstruction, BranchInstruction, Code, ExceptionHandler, Instruction};
use crate::jvm::{BinaryName, Error};
use crate::util::{Offset, Width};
use std::collections::HashMap;
use std::fmt;

/// Opaque label, used to refer to a code position before its offset is known
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SynLabel(usize);

impl fmt::Debug for SynLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

enum PendingInstruction {
    Regular(Instruction),
    Branch(BranchInstruction<SynLabel>),
}

struct PendingHandler {
    start: SynLabel,
    end: SynLabel,
    handler: SynLabel,
    catch_type: Option<BinaryName>,
}

/// Assemble method code from the top down, using labels for jump targets and handler ranges
///
/// Offsets are assigned as instructions are pushed, using the most compact encoding of each
/// instruction. This is what lets analyses be run (and tested) on code that never went through a
/// class file.
///
/// ```
/// use jvmleak::jvm::code::{BranchInstruction, CodeBuilder, EqComparison, Instruction};
///
/// let mut builder = CodeBuilder::new();
/// let is_null = builder.fresh_label();
/// builder.push_instruction(Instruction::ALoad(0));
/// builder.push_branch(BranchInstruction::IfNull(EqComparison::EQ, is_null));
/// builder.push_branch(BranchInstruction::Return);
/// builder.place_label(is_null).unwrap();
/// builder.push_branch(BranchInstruction::Return);
///
/// let code = builder.build().unwrap();
/// assert_eq!(code.instructions.len(), 4);
/// ```
pub struct CodeBuilder {
    instructions: Vec<(Offset, PendingInstruction)>,
    next_offset: Offset,
    next_label: usize,
    label_offsets: HashMap<SynLabel, Offset>,
    handlers: Vec<PendingHandler>,
    line_numbers: Vec<(Offset, u16)>,
    max_locals: usize,
    max_stack: u16,
}

impl Default for CodeBuilder {
    fn default() -> Self {
        CodeBuilder::new()
    }
}

impl CodeBuilder {
    pub fn new() -> CodeBuilder {
        CodeBuilder {
            instructions: vec![],
            next_offset: Offset(0),
            next_label: 0,
            label_offsets: HashMap::new(),
            handlers: vec![],
            line_numbers: vec![],
            max_locals: 0,
            max_stack: 0,
        }
    }

    /// Generate a fresh (unplaced) label
    pub fn fresh_label(&mut self) -> SynLabel {
        let label = SynLabel(self.next_label);
        self.next_label += 1;
        label
    }

    /// Place a label at the current position (the next instruction pushed, or the end of the
    /// code if nothing else gets pushed)
    pub fn place_label(&mut self, label: SynLabel) -> Result<(), Error> {
        if self.label_offsets.insert(label, self.next_offset).is_some() {
            return Err(Error::MalformedCode {
                offset: self.next_offset.0,
                message: format!("label {:?} placed twice", label),
            });
        }
        Ok(())
    }

    /// Generate a fresh label and place it at the current position
    pub fn here(&mut self) -> SynLabel {
        let label = self.fresh_label();
        self.label_offsets.insert(label, self.next_offset);
        label
    }

    /// Attribute the following instructions to a source line
    pub fn mark_line(&mut self, line: u16) {
        self.line_numbers.push((self.next_offset, line));
    }

    /// The operand stack depth is not computed, so it must be declared for anything that reads
    /// `max_stack`
    pub fn set_max_stack(&mut self, max_stack: u16) {
        self.max_stack = max_stack;
    }

    pub fn push_instruction(&mut self, insn: Instruction) {
        use Instruction::*;
        let locals_end = match &insn {
            ILoad(idx) | FLoad(idx) | ALoad(idx) | IStore(idx) | FStore(idx) | AStore(idx)
            | IInc(idx, _) => *idx as usize + 1,
            LLoad(idx) | DLoad(idx) | LStore(idx) | DStore(idx) => *idx as usize + 2,
            _ => 0,
        };
        self.max_locals = self.max_locals.max(locals_end);

        let width = insn.width();
        self.instructions
            .push((self.next_offset, PendingInstruction::Regular(insn)));
        self.next_offset.0 += width;
    }

    pub fn push_branch(&mut self, insn: BranchInstruction<SynLabel>) {
        let width = insn.width_at(self.next_offset);
        self.instructions
            .push((self.next_offset, PendingInstruction::Branch(insn)));
        self.next_offset.0 += width;
    }

    /// Register an exception handler covering `[start, end)`. Handlers are tried in the order in
    /// which they are added.
    pub fn add_exception_handler(
        &mut self,
        start: SynLabel,
        end: SynLabel,
        handler: SynLabel,
        catch_type: Option<BinaryName>,
    ) {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    /// Resolve labels to offsets and produce the final code
    pub fn build(self) -> Result<Code, Error> {
        let label_offsets = self.label_offsets;
        let resolve = |label: &SynLabel| -> Result<Offset, Error> {
            label_offsets
                .get(label)
                .copied()
                .ok_or_else(|| Error::MalformedCode {
                    offset: 0,
                    message: format!("label {:?} was never placed", label),
                })
        };

        let code_end = self.next_offset;
        let mut instructions = Vec::with_capacity(self.instructions.len());
        for (offset, insn) in self.instructions {
            let insn = match insn {
                PendingInstruction::Regular(insn) => AnyInstruction::Regular(insn),
                PendingInstruction::Branch(branch) => {
                    let branch = branch.map_labels(&resolve)?;
                    if let Some(target) = branch.jump_targets().into_iter().find(|t| *t >= code_end) {
                        return Err(Error::MalformedCode {
                            offset: offset.0,
                            message: format!("jump target {:?} is past the end", target),
                        });
                    }
                    AnyInstruction::Branch(branch)
                }
            };
            instructions.push((offset, insn));
        }

        let exception_table = self
            .handlers
            .into_iter()
            .map(|handler| -> Result<ExceptionHandler, Error> {
                Ok(ExceptionHandler {
                    start: resolve(&handler.start)?,
                    end: resolve(&handler.end)?,
                    handler: resolve(&handler.handler)?,
                    catch_type: handler.catch_type,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let max_locals = u16::try_from(self.max_locals).map_err(|_| Error::MalformedCode {
            offset: 0,
            message: format!("{} locals", self.max_locals),
        })?;

        Code::new(
            self.max_stack,
            max_locals,
            instructions,
            exception_table,
            self.line_numbers,
        )
    }
}
