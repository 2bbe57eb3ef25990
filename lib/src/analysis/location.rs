use std::fmt;

/// Index of a basic block in a [`super::Cfg`]
///
/// Blocks are numbered in code order, and the synthetic exit block comes last.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BlockId(pub usize);

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// One point in a method: an instruction inside a basic block
///
/// `instruction` is the index of the instruction in [`crate::jvm::code::Code::instructions`].
/// Since blocks are laid out in code order, ordering by block and then by instruction is also
/// code order.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Location {
    pub block: BlockId,
    pub instruction: usize,
}

impl Location {
    pub fn new(block: BlockId, instruction: usize) -> Location {
        Location { block, instruction }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.block, self.instruction)
    }
}
