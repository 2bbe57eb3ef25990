use super::{BlockId, Location};
use crate::jvm::code::{AnyInstruction, Code, ExceptionKind};
use crate::jvm::Error;
use crate::util::Offset;
use std::ops::Range;

/// Control flow graph of a method body
///
/// Blocks are maximal straight-line runs of instructions. Exceptional control flow is not
/// attached to blocks as a whole but to the individual instructions that may throw, so that the
/// state flowing into a handler is the state right before the throwing instruction.
///
/// There is one synthetic exit block (with no instructions) which every return and every
/// uncaught exception flows into.
#[derive(Debug)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub exit: BlockId,

    /// Block containing each instruction
    block_of: Vec<BlockId>,
}

#[derive(Debug)]
pub struct BasicBlock {
    pub id: BlockId,

    /// Indices of the block's instructions in `Code::instructions`
    pub instructions: Range<usize>,

    /// Normal control flow out of the last instruction
    pub successors: Vec<Edge>,

    /// Exceptional control flow out of the instructions in the block, in instruction order
    pub exception_edges: Vec<ExceptionEdge>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Into the next block, either by running off the end or by not taking a conditional branch
    FallThrough,

    /// Taken branch (including switch cases)
    Jump,

    /// From a return instruction into the exit block
    Return,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub target: BlockId,
    pub kind: EdgeKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExceptionEdge {
    /// Throwing instruction
    pub instruction: usize,

    /// Handler block, or the exit block for exceptions that propagate out of the method
    pub target: BlockId,

    pub kind: ExceptionKind,
}

impl Cfg {
    pub fn build(code: &Code) -> Result<Cfg, Error> {
        let instruction_count = code.instructions.len();
        let index_of = |offset: Offset| -> Result<usize, Error> {
            code.index_of(offset).ok_or_else(|| Error::MalformedCode {
                offset: offset.0,
                message: String::from("control flow into the middle of an instruction"),
            })
        };

        // Find block leaders
        let mut leaders = vec![false; instruction_count];
        if let Some(first) = leaders.first_mut() {
            *first = true;
        }
        for (idx, (_, insn)) in code.instructions.iter().enumerate() {
            if let AnyInstruction::Branch(branch) = insn {
                for target in branch.jump_targets() {
                    leaders[index_of(target)?] = true;
                }
                if idx + 1 < instruction_count {
                    leaders[idx + 1] = true;
                }
            }
        }
        for handler in &code.exception_table {
            leaders[index_of(handler.handler)?] = true;
        }

        let starts: Vec<usize> = leaders
            .iter()
            .enumerate()
            .filter(|(_, is_leader)| **is_leader)
            .map(|(idx, _)| idx)
            .collect();
        let exit = BlockId(starts.len());

        let mut block_of = Vec::with_capacity(instruction_count);
        for (block_idx, start) in starts.iter().enumerate() {
            let end = starts.get(block_idx + 1).copied().unwrap_or(instruction_count);
            block_of.extend((*start..end).map(|_| BlockId(block_idx)));
        }

        let mut blocks = Vec::with_capacity(starts.len());
        for (block_idx, start) in starts.iter().enumerate() {
            let end = starts.get(block_idx + 1).copied().unwrap_or(instruction_count);

            let mut successors = vec![];
            let mut add_successor = |target: BlockId, kind: EdgeKind| {
                let edge = Edge { target, kind };
                if !successors.contains(&edge) {
                    successors.push(edge);
                }
            };
            match &code.instructions[end - 1].1 {
                AnyInstruction::Regular(_) => {
                    if end < instruction_count {
                        add_successor(block_of[end], EdgeKind::FallThrough);
                    }
                }
                AnyInstruction::Branch(branch) => {
                    for target in branch.jump_targets() {
                        add_successor(block_of[index_of(target)?], EdgeKind::Jump);
                    }
                    if branch.falls_through() && end < instruction_count {
                        add_successor(block_of[end], EdgeKind::FallThrough);
                    }
                    if branch.is_return() {
                        add_successor(exit, EdgeKind::Return);
                    }
                }
            }

            let mut exception_edges = vec![];
            for idx in *start..end {
                let (offset, insn) = &code.instructions[idx];
                let kind = match insn.exception_kind() {
                    Some(kind) => kind,
                    None => continue,
                };

                let mut caught = false;
                for handler in &code.exception_table {
                    if !handler.covers(*offset) {
                        continue;
                    }
                    exception_edges.push(ExceptionEdge {
                        instruction: idx,
                        target: block_of[index_of(handler.handler)?],
                        kind,
                    });
                    if handler.catch_type.is_none() {
                        caught = true;
                        break;
                    }
                }
                if !caught {
                    exception_edges.push(ExceptionEdge {
                        instruction: idx,
                        target: exit,
                        kind,
                    });
                }
            }

            blocks.push(BasicBlock {
                id: BlockId(block_idx),
                instructions: *start..end,
                successors,
                exception_edges,
            });
        }

        Ok(Cfg {
            blocks,
            exit,
            block_of,
        })
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Location of the first instruction (`None` for empty code)
    pub fn first_location(&self) -> Option<Location> {
        self.location_of(0)
    }

    pub fn location_of(&self, instruction: usize) -> Option<Location> {
        self.block_of
            .get(instruction)
            .map(|block| Location::new(*block, instruction))
    }

    /// Every instruction location, in code order
    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.block_of
            .iter()
            .enumerate()
            .map(|(instruction, block)| Location::new(*block, instruction))
    }

    /// Number of blocks, including the exit block
    pub fn block_count(&self) -> usize {
        self.blocks.len() + 1
    }
}
