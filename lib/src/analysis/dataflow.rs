use super::cfg::{Cfg, EdgeKind};
use super::{
    BlockId, DataflowError, Location, ResourceFrame, ResourceStatus, ResourceValue,
    ResourceVisitor,
};
use crate::jvm::code::{AnyInstruction, BranchInstruction, Code, EqComparison, ExceptionKind};
use std::collections::BTreeSet;

/// Outcome of analyzing one resource over a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataflowResult {
    /// Frame on entry to each block (`None` for blocks that were never reached)
    pub block_entries: Vec<Option<ResourceFrame>>,

    /// Status on entry to the exit block, if the exit is reachable at all
    pub exit_status: Option<ResourceStatus>,
}

/// Forward dataflow analysis of a single resource over a method's CFG
pub struct ResourceDataflow<'c> {
    cfg: &'c Cfg,
    code: &'c Code,
}

impl<'c> ResourceDataflow<'c> {
    pub fn new(cfg: &'c Cfg, code: &'c Code) -> ResourceDataflow<'c> {
        ResourceDataflow { cfg, code }
    }

    /// Run to a fixed point
    ///
    /// Blocks are processed lowest id first, which is code order, so most forward edges are
    /// handled before their targets get visited.
    pub fn analyze(&self, visitor: &mut ResourceVisitor) -> Result<DataflowResult, DataflowError> {
        let cfg = self.cfg;
        let ignore_implicit = visitor.resource().ignore_implicit_exceptions;
        let mut block_entries: Vec<Option<ResourceFrame>> = vec![None; cfg.block_count()];
        let mut worklist: BTreeSet<BlockId> = BTreeSet::new();

        if !cfg.blocks.is_empty() {
            let entry = cfg.entry();
            block_entries[entry.0] = Some(ResourceFrame::entry(
                self.code.max_locals,
                visitor.resource().instance_param_slot,
            ));
            worklist.insert(entry);
        }

        while let Some(block_id) = worklist.iter().next().copied() {
            worklist.remove(&block_id);
            if block_id == cfg.exit {
                continue;
            }

            let block = &cfg.blocks[block_id.0];
            let mut frame = match &block_entries[block_id.0] {
                Some(frame) => frame.clone(),
                None => continue,
            };

            let mut exception_edges = block.exception_edges.iter().peekable();
            let mut null_check: Option<(EqComparison, bool)> = None;

            for idx in block.instructions.clone() {
                let (_, insn) = &self.code.instructions[idx];
                let location = Location::new(block_id, idx);

                let before = match exception_edges.peek() {
                    Some(edge) if edge.instruction == idx => Some(frame.clone()),
                    _ => None,
                };
                if let AnyInstruction::Branch(BranchInstruction::IfNull(comparison, _)) = insn {
                    null_check = Some((*comparison, frame.peek(0)?.is_instance()));
                }

                let closes = visitor.transfer(location, insn, &mut frame)?;

                // Exceptional successors see the state from before the instruction
                let before = match before {
                    Some(before) => before,
                    None => continue,
                };
                while let Some(edge) = exception_edges.next_if(|edge| edge.instruction == idx) {
                    if ignore_implicit && edge.kind == ExceptionKind::Implicit {
                        continue;
                    }

                    let mut thrown = before.clone();
                    thrown.status = if closes {
                        ResourceStatus::Closed
                    } else if before.status == ResourceStatus::Open {
                        ResourceStatus::OpenOnExceptionPath
                    } else {
                        before.status
                    };
                    thrown.stack.clear();
                    if edge.target != cfg.exit {
                        thrown.push(ResourceValue::NotInstance);
                    }
                    merge_into(&mut block_entries, &mut worklist, edge.target, &thrown)?;
                }
            }

            for edge in &block.successors {
                let mut out = frame.clone();
                if edge.kind == EdgeKind::Return {
                    out.stack.clear();
                }

                // Where the instance is known to be null, there is nothing to leak
                if let Some((comparison, true)) = null_check {
                    let null_path = matches!(
                        (comparison, edge.kind),
                        (EqComparison::EQ, EdgeKind::Jump)
                            | (EqComparison::NE, EdgeKind::FallThrough)
                    );
                    if null_path {
                        out.status = ResourceStatus::Nonexistent;
                    }
                }

                merge_into(&mut block_entries, &mut worklist, edge.target, &out)?;
            }
        }

        let exit_status = block_entries[cfg.exit.0].as_ref().map(|frame| frame.status);
        Ok(DataflowResult {
            block_entries,
            exit_status,
        })
    }
}

fn merge_into(
    block_entries: &mut [Option<ResourceFrame>],
    worklist: &mut BTreeSet<BlockId>,
    target: BlockId,
    frame: &ResourceFrame,
) -> Result<(), DataflowError> {
    let entry = &mut block_entries[target.0];
    let changed = match entry {
        Some(existing) => existing.merge_with(frame)?,
        None => {
            *entry = Some(frame.clone());
            true
        }
    };
    if changed {
        worklist.insert(target);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::bugs::BugAccumulator;
    use crate::analysis::{Creation, ResourceCollection, ResourceTracker, Settings};
    use crate::jvm::class_file::MethodRef;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas};
    use crate::jvm::code::{CodeBuilder, Instruction, InvokeType};
    use crate::jvm::{
        BinaryName, MethodDescriptor, Name, ParseDescriptor, RefType, UnqualifiedName,
    };

    fn invoke(
        invoke_type: InvokeType,
        class: BinaryName,
        name: &str,
        descriptor: &str,
    ) -> Instruction {
        Instruction::Invoke(
            invoke_type,
            MethodRef {
                class: RefType::Object(class),
                name: UnqualifiedName::from_string(name.to_owned()).unwrap(),
                descriptor: MethodDescriptor::parse(descriptor).unwrap(),
                is_interface: false,
            },
        )
    }

    /// `new FileInputStream(path)` into local 1
    fn open_stream(builder: &mut CodeBuilder) {
        builder.push_instruction(Instruction::New(BinaryName::FILEINPUTSTREAM));
        builder.push_instruction(Instruction::Dup);
        builder.push_instruction(Instruction::ALoad(0));
        builder.push_instruction(invoke(
            InvokeType::Special,
            BinaryName::FILEINPUTSTREAM,
            "<init>",
            "(Ljava/lang/String;)V",
        ));
        builder.push_instruction(Instruction::AStore(1));
    }

    fn close_stream(builder: &mut CodeBuilder) {
        builder.push_instruction(Instruction::ALoad(1));
        builder.push_instruction(invoke(
            InvokeType::Virtual,
            BinaryName::FILEINPUTSTREAM,
            "close",
            "()V",
        ));
    }

    fn read_stream(builder: &mut CodeBuilder) {
        builder.push_instruction(Instruction::ALoad(1));
        builder.push_instruction(invoke(
            InvokeType::Virtual,
            BinaryName::FILEINPUTSTREAM,
            "read",
            "()I",
        ));
        builder.push_instruction(Instruction::Pop);
    }

    /// Analyze the stream created by the first instruction
    fn exit_status(code: &Code) -> Option<ResourceStatus> {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();
        let settings = Settings::default();
        let mut bugs = BugAccumulator::new();
        let mut tracker = ResourceTracker::new(&settings, &class_graph);

        let cfg = Cfg::build(code).unwrap();
        let location = cfg.first_location().unwrap();
        let first = &code.instructions[0].1;
        let resource = match tracker.is_resource_creation(location, first, &mut bugs) {
            Some(Creation::Discovered(resource)) => resource,
            other => panic!("expected a new resource, got {:?}", other),
        };
        let mut collection = ResourceCollection::new();
        let id = collection.add_created_resource(location, resource);
        tracker.set_resource_collection(&collection);

        let mut resource = collection.resource(id).unwrap().clone();
        let mut visitor = ResourceVisitor::new(id, &mut resource, &mut tracker, &mut bugs);
        let dataflow = ResourceDataflow::new(&cfg, code);
        let result = dataflow.analyze(&mut visitor).unwrap();

        // Running again from scratch gives the same answer
        assert_eq!(dataflow.analyze(&mut visitor).unwrap(), result);
        result.exit_status
    }

    #[test]
    fn leaked_on_return() {
        let mut builder = CodeBuilder::new();
        open_stream(&mut builder);
        read_stream(&mut builder);
        builder.push_branch(BranchInstruction::Return);
        let code = builder.build().unwrap();

        assert_eq!(exit_status(&code), Some(ResourceStatus::Open));
    }

    #[test]
    fn closed_in_finally() {
        let mut builder = CodeBuilder::new();
        let handler = builder.fresh_label();
        open_stream(&mut builder);
        let start = builder.here();
        read_stream(&mut builder);
        let end = builder.here();
        close_stream(&mut builder);
        builder.push_branch(BranchInstruction::Return);
        builder.place_label(handler).unwrap();
        builder.push_instruction(Instruction::AStore(2));
        close_stream(&mut builder);
        builder.push_instruction(Instruction::ALoad(2));
        builder.push_branch(BranchInstruction::AThrow);
        builder.add_exception_handler(start, end, handler, None);
        let code = builder.build().unwrap();

        assert_eq!(exit_status(&code), Some(ResourceStatus::Closed));
    }

    #[test]
    fn open_on_exception_path() {
        let mut builder = CodeBuilder::new();
        open_stream(&mut builder);
        read_stream(&mut builder);
        close_stream(&mut builder);
        builder.push_branch(BranchInstruction::Return);
        let code = builder.build().unwrap();

        assert_eq!(exit_status(&code), Some(ResourceStatus::OpenOnExceptionPath));
    }

    #[test]
    fn null_checked_before_close() {
        // FileInputStream in = null; try { in = new ...; } finally { if (in != null) in.close(); }
        let mut builder = CodeBuilder::new();
        let skip_close = builder.fresh_label();
        open_stream(&mut builder);
        builder.push_instruction(Instruction::ALoad(1));
        builder.push_branch(BranchInstruction::IfNull(EqComparison::EQ, skip_close));
        close_stream(&mut builder);
        builder.place_label(skip_close).unwrap();
        builder.push_branch(BranchInstruction::Return);
        let code = builder.build().unwrap();

        // The jump is only taken when there is no stream
        assert_eq!(exit_status(&code), Some(ResourceStatus::Closed));
    }

    #[test]
    fn returned_stream_escapes() {
        let mut builder = CodeBuilder::new();
        open_stream(&mut builder);
        builder.push_instruction(Instruction::ALoad(1));
        builder.push_branch(BranchInstruction::AReturn);
        let code = builder.build().unwrap();

        assert_eq!(exit_status(&code), Some(ResourceStatus::Escaped));
    }
}
