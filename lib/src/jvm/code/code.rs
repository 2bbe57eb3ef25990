use crate::jvm::class_file::{
    Attribute, AttributeLike, CodeAttribute, ConstantPool, ExceptionHandler as RawHandler, LineNumberTable,
};
use crate::jvm::code::{decode_instructions, AnyInstruction};
use crate::jvm::{BinaryName, Error};
use crate::util::Offset;

/// Semantic representation of a method body
#[derive(Debug, Clone)]
pub struct Code {
    /// Maximum size of locals through the method
    pub max_locals: u16,

    /// Maximum size of stack through the method
    pub max_stack: u16,

    /// Instructions in code order, along with the offset at which they start
    pub instructions: Vec<(Offset, AnyInstruction)>,

    /// Exception handlers, in the order in which the JVM tries them
    pub exception_table: Vec<ExceptionHandler>,

    /// Line number of the source that generated each offset range, sorted by offset
    pub line_numbers: Vec<(Offset, u16)>,

    /// Opcodes used somewhere in the method
    pub bytecode_set: BytecodeSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start: Offset,

    /// End of exception handler range (exclusive)
    pub end: Offset,

    /// Start of the exception handler
    pub handler: Offset,

    /// Caught exception class, `None` for catch-all handlers (used for `finally`)
    pub catch_type: Option<BinaryName>,
}

impl ExceptionHandler {
    pub fn covers(&self, offset: Offset) -> bool {
        self.start <= offset && offset < self.end
    }
}

impl Code {
    /// Find and decode the code of a method, if the method has any (abstract and native methods
    /// don't)
    pub fn from_attributes(
        attributes: &[Attribute],
        constants: &ConstantPool,
    ) -> Result<Option<Code>, Error> {
        match CodeAttribute::find(attributes, constants)? {
            None => Ok(None),
            Some(code) => Code::from_attribute(&code, constants).map(Some),
        }
    }

    /// Decode the `Code` attribute of a method
    pub fn from_attribute(code: &CodeAttribute, constants: &ConstantPool) -> Result<Code, Error> {
        let instructions = decode_instructions(&code.code_array, constants)?;

        let exception_table = code
            .exception_table
            .iter()
            .map(|handler: &RawHandler| -> Result<ExceptionHandler, Error> {
                let catch_type = if handler.is_catch_all() {
                    None
                } else {
                    Some(constants.class_name(handler.catch_type)?)
                };
                Ok(ExceptionHandler {
                    start: Offset(handler.start_pc as usize),
                    end: Offset(handler.end_pc as usize),
                    handler: Offset(handler.handler_pc as usize),
                    catch_type,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let line_numbers = LineNumberTable::collect(&code.attributes, constants)?
            .0
            .into_iter()
            .map(|entry| (Offset(entry.start_pc as usize), entry.line_number))
            .collect();

        Code::new(
            code.max_stack,
            code.max_locals,
            instructions,
            exception_table,
            line_numbers,
        )
    }

    /// Assemble code from already decoded parts, checking that handlers point at instructions
    pub fn new(
        max_stack: u16,
        max_locals: u16,
        instructions: Vec<(Offset, AnyInstruction)>,
        exception_table: Vec<ExceptionHandler>,
        mut line_numbers: Vec<(Offset, u16)>,
    ) -> Result<Code, Error> {
        for handler in &exception_table {
            if instructions
                .binary_search_by_key(&handler.handler, |(offset, _)| *offset)
                .is_err()
            {
                return Err(Error::MalformedCode {
                    offset: handler.handler.0,
                    message: String::from("exception handler does not start an instruction"),
                });
            }
        }

        let mut bytecode_set = BytecodeSet::default();
        for (_, insn) in &instructions {
            bytecode_set.insert(insn.opcode());
        }

        line_numbers.sort_by_key(|(offset, _)| *offset);

        Ok(Code {
            max_locals,
            max_stack,
            instructions,
            exception_table,
            line_numbers,
            bytecode_set,
        })
    }

    /// Index into `instructions` of the instruction starting at an offset
    pub fn index_of(&self, offset: Offset) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |(offset, _)| *offset)
            .ok()
    }

    /// Source line for the instruction at an offset (the closest line entry at or before it)
    pub fn line_at(&self, offset: Offset) -> Option<u16> {
        match self
            .line_numbers
            .binary_search_by_key(&offset, |(start, _)| *start)
        {
            Ok(idx) => Some(self.line_numbers[idx].1),
            Err(0) => None,
            Err(idx) => Some(self.line_numbers[idx - 1].1),
        }
    }
}

/// Set of opcodes, for quickly ruling out methods that can't be interesting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BytecodeSet([u64; 4]);

impl BytecodeSet {
    pub fn insert(&mut self, opcode: u8) {
        self.0[(opcode / 64) as usize] |= 1 << (opcode % 64);
    }

    pub fn contains(&self, opcode: u8) -> bool {
        self.0[(opcode / 64) as usize] & (1 << (opcode % 64)) != 0
    }

    pub fn contains_any(&self, opcodes: &[u8]) -> bool {
        opcodes.iter().any(|opcode| self.contains(*opcode))
    }
}
