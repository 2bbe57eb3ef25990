use super::bugs::BugReporter;
use super::resource::{OpenRule, Resource, ResourceId};
use super::{DataflowError, Location, ResourceFrame, ResourceStatus, ResourceTracker};
use crate::jvm::class_file::MethodRef;
use crate::jvm::code::{AnyInstruction, BranchInstruction, Instruction, InvokeType};
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, UnqualifiedName};

/// Transfer function for one resource
///
/// The visitor interprets instructions against the abstract frame of the resource it was made
/// for, and reports open locations and escapes to the tracker as it sees them.
pub struct ResourceVisitor<'a, 'h> {
    id: ResourceId,
    resource: &'a mut Resource,
    tracker: &'a mut ResourceTracker<'h>,
    reporter: &'a mut dyn BugReporter,
}

impl<'a, 'h> ResourceVisitor<'a, 'h> {
    pub fn new(
        id: ResourceId,
        resource: &'a mut Resource,
        tracker: &'a mut ResourceTracker<'h>,
        reporter: &'a mut dyn BugReporter,
    ) -> ResourceVisitor<'a, 'h> {
        ResourceVisitor {
            id,
            resource,
            tracker,
            reporter,
        }
    }

    pub fn resource(&self) -> &Resource {
        &*self.resource
    }

    /// Apply one instruction to the frame
    ///
    /// Returns whether the instruction closes the resource, since exception edges out of a
    /// `close()` call still see the resource as closed.
    pub fn transfer(
        &mut self,
        location: Location,
        insn: &AnyInstruction,
        frame: &mut ResourceFrame,
    ) -> Result<bool, DataflowError> {
        let is_creation = location == self.resource.creation;
        let opens = !is_creation && self.tracker.is_resource_open(&*self.resource, insn, frame);
        let closes = !is_creation
            && !opens
            && self.tracker.might_close_resource(insn)
            && self
                .tracker
                .is_resource_close(&*self.resource, insn, frame, &mut *self.reporter);
        let escapes = self.check_escape(location, insn, frame)?;

        match insn {
            AnyInstruction::Regular(insn) => frame.model_instruction(insn)?,
            AnyInstruction::Branch(insn) => frame.model_branch(insn)?,
        }
        if escapes {
            frame.status = ResourceStatus::Escaped;
        }

        if is_creation {
            if self.resource.open_rule == OpenRule::OnCreation {
                frame.status = ResourceStatus::Open;
                self.record_open(location);
            } else {
                frame.status = ResourceStatus::Created;
            }

            // Parameters are already sitting in their local
            if self.resource.instance_param_slot.is_none() {
                frame.mark_top_instance()?;
            }
        } else if opens {
            frame.status = ResourceStatus::Open;
            self.record_open(location);
        } else if closes {
            frame.status = ResourceStatus::Closed;
        }

        Ok(closes)
    }

    fn record_open(&mut self, location: Location) {
        self.resource.open_location = Some(location);
        self.tracker
            .add_open_location(location, self.id, &*self.resource);
    }

    /// Check whether the instance escapes the method at this instruction (looking at the frame
    /// from before the instruction runs)
    fn check_escape(
        &mut self,
        location: Location,
        insn: &AnyInstruction,
        frame: &ResourceFrame,
    ) -> Result<bool, DataflowError> {
        match insn {
            AnyInstruction::Regular(
                Instruction::PutField(_) | Instruction::PutStatic(_) | Instruction::AAStore,
            )
            | AnyInstruction::Branch(BranchInstruction::AReturn) => {
                let stored = frame.peek(0)?.is_instance();
                if stored && self.tracker.is_debug() {
                    log::debug!("{:?} escapes at {:?} (stored or returned)", self.id, location);
                }
                Ok(stored)
            }

            AnyInstruction::Regular(Instruction::Invoke(invoke_type, method)) => {
                let consumed = method.descriptor.parameter_length(invoke_type.has_receiver());
                let positions = frame.instance_arguments(consumed)?;
                if positions.is_empty() {
                    return Ok(false);
                }

                // The instance may be both the receiver and an argument
                let as_argument = *invoke_type == InvokeType::Static
                    || positions.iter().any(|arg_num| *arg_num != 0);
                let escapes = positions
                    .iter()
                    .any(|arg_num| instance_escapes(*invoke_type, method, *arg_num));
                Ok(self.record_escape(location, as_argument, escapes))
            }

            AnyInstruction::Regular(Instruction::InvokeDynamic(call_site)) => {
                let consumed = call_site.descriptor.parameter_length(false);
                if frame.instance_arguments(consumed)?.is_empty() {
                    return Ok(false);
                }
                Ok(self.record_escape(location, true, true))
            }

            _ => Ok(false),
        }
    }

    fn record_escape(&mut self, location: Location, as_argument: bool, escapes: bool) -> bool {
        if self.resource.open_location.is_some() {
            self.tracker.add_escape(self.id, location, as_argument);
        }

        let escaped = escapes && !self.tracker.is_wrapper_site(location);
        if escaped && self.tracker.is_debug() {
            log::debug!("{:?} escapes into the call at {:?}", self.id, location);
        }
        escaped
    }
}

/// Does passing the instance at `arg_num` (the receiver is 0) let it escape the method?
///
/// Receivers don't escape, other arguments do, except for a few library calls that are known to
/// only use the stream temporarily. Getting the channel of a stream counts as an escape since
/// the stream can then be closed through the channel.
pub fn instance_escapes(invoke_type: InvokeType, method: &MethodRef, arg_num: usize) -> bool {
    let mut escapes = invoke_type == InvokeType::Static || arg_num != 0;

    if invoke_type == InvokeType::Virtual {
        let class_name = method.class_name();
        let name = &method.name;

        if class_name == Some(&BinaryName::PROPERTIES)
            && [
                UnqualifiedName::LOAD,
                UnqualifiedName::LOADFROMXML,
                UnqualifiedName::STORE,
                UnqualifiedName::SAVE,
            ]
            .contains(name)
        {
            escapes = false;
        }

        if class_name == Some(&BinaryName::KEYSTORE)
            && [UnqualifiedName::LOAD, UnqualifiedName::STORE].contains(name)
        {
            escapes = false;
        }

        if *name == UnqualifiedName::GETCHANNEL && is_file_channel_getter(&method.descriptor) {
            escapes = true;
        }
    }

    escapes
}

/// `()Ljava/nio/channels/FileChannel;`
fn is_file_channel_getter(descriptor: &MethodDescriptor) -> bool {
    descriptor.parameters.is_empty()
        && descriptor.return_type == Some(FieldType::object(BinaryName::FILECHANNEL))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::bugs::BugAccumulator;
    use crate::analysis::{BlockId, ResourceCollection, ResourceValue, Settings};
    use crate::jvm::class_file::FieldRef;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas};
    use crate::jvm::{Name, ParseDescriptor, RefType};

    fn at(instruction: usize) -> Location {
        Location::new(BlockId(0), instruction)
    }

    fn method(class: BinaryName, name: UnqualifiedName, descriptor: &str) -> MethodRef {
        MethodRef {
            class: RefType::Object(class),
            name,
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            is_interface: false,
        }
    }

    fn invoke(invoke_type: InvokeType, method: MethodRef) -> AnyInstruction {
        AnyInstruction::Regular(Instruction::Invoke(invoke_type, method))
    }

    #[test]
    fn escape_policy() {
        let load = method(
            BinaryName::PROPERTIES,
            UnqualifiedName::LOAD,
            "(Ljava/io/InputStream;)V",
        );
        assert!(!instance_escapes(InvokeType::Virtual, &load, 1));
        assert!(instance_escapes(InvokeType::Special, &load, 1));

        let store = method(
            BinaryName::KEYSTORE,
            UnqualifiedName::STORE,
            "(Ljava/io/OutputStream;[C)V",
        );
        assert!(!instance_escapes(InvokeType::Virtual, &store, 1));

        let get_channel = method(
            BinaryName::FILEINPUTSTREAM,
            UnqualifiedName::GETCHANNEL,
            "()Ljava/nio/channels/FileChannel;",
        );
        assert!(instance_escapes(InvokeType::Virtual, &get_channel, 0));

        let read = method(
            BinaryName::INPUTSTREAM,
            UnqualifiedName::from_string(String::from("read")).unwrap(),
            "()I",
        );
        assert!(!instance_escapes(InvokeType::Virtual, &read, 0));
        assert!(!instance_escapes(InvokeType::Interface(1), &read, 0));

        let consume = method(
            BinaryName::from_dotted("app.Util").unwrap(),
            UnqualifiedName::from_string(String::from("consume")).unwrap(),
            "(Ljava/io/InputStream;)V",
        );
        assert!(instance_escapes(InvokeType::Static, &consume, 0));
    }

    #[test]
    fn creation_then_escape() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();
        let settings = Settings::default();
        let mut bugs = BugAccumulator::new();
        let mut tracker = ResourceTracker::new(&settings, &class_graph);

        let open = invoke(
            InvokeType::Static,
            method(
                BinaryName::from_dotted("app.Files").unwrap(),
                UnqualifiedName::from_string(String::from("open")).unwrap(),
                "()Ljava/io/InputStream;",
            ),
        );
        let mut collection = ResourceCollection::new();
        let id = collection.add_created_resource(
            at(0),
            Resource::returned_by_call(at(0), BinaryName::INPUTSTREAM, BinaryName::INPUTSTREAM),
        );
        tracker.set_resource_collection(&collection);
        let mut resource = collection.resource(id).unwrap().clone();

        let mut frame = ResourceFrame::entry(1, None);
        let mut visitor = ResourceVisitor::new(id, &mut resource, &mut tracker, &mut bugs);
        assert_eq!(visitor.transfer(at(0), &open, &mut frame), Ok(false));
        assert_eq!(frame.status, ResourceStatus::Open);
        assert_eq!(frame.stack, vec![ResourceValue::Instance]);

        // Storing to a field hands the stream off
        let field = Instruction::PutStatic(FieldRef {
            class: BinaryName::from_dotted("app.Files").unwrap(),
            name: UnqualifiedName::from_string(String::from("cached")).unwrap(),
            descriptor: FieldType::object(BinaryName::INPUTSTREAM),
        });
        let mut stored = frame.clone();
        visitor
            .transfer(at(1), &AnyInstruction::Regular(field), &mut stored)
            .unwrap();
        assert_eq!(stored.status, ResourceStatus::Escaped);
        assert!(stored.stack.is_empty());

        // Closing it
        let close = invoke(
            InvokeType::Virtual,
            method(BinaryName::INPUTSTREAM, UnqualifiedName::CLOSE, "()V"),
        );
        assert_eq!(visitor.transfer(at(1), &close, &mut frame), Ok(true));
        assert_eq!(frame.status, ResourceStatus::Closed);

        assert_eq!(resource.open_location, Some(at(0)));
        assert_eq!(tracker.escapes().count(), 1);
    }

    #[test]
    fn constructor_opens_and_wrappers_keep_status() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();
        let settings = Settings::default();
        let mut bugs = BugAccumulator::new();
        let mut tracker = ResourceTracker::new(&settings, &class_graph);

        let mut collection = ResourceCollection::new();
        let inner = collection.add_created_resource(
            at(0),
            Resource::constructed(at(0), BinaryName::FILEREADER, BinaryName::READER),
        );
        collection.add_constructor_site(at(3));
        collection.add_constructor_site(at(8));
        tracker.set_resource_collection(&collection);
        let mut resource = collection.resource(inner).unwrap().clone();
        let mut visitor = ResourceVisitor::new(inner, &mut resource, &mut tracker, &mut bugs);

        let mut frame = ResourceFrame::entry(2, None);
        let new_reader = AnyInstruction::Regular(Instruction::New(BinaryName::FILEREADER));
        visitor.transfer(at(0), &new_reader, &mut frame).unwrap();
        assert_eq!(frame.status, ResourceStatus::Created);

        let steps = [
            AnyInstruction::Regular(Instruction::Dup),
            AnyInstruction::Regular(Instruction::ALoad(0)),
            invoke(
                InvokeType::Special,
                method(BinaryName::FILEREADER, UnqualifiedName::INIT, "(Ljava/lang/String;)V"),
            ),
            AnyInstruction::Regular(Instruction::AStore(1)),
        ];
        for (idx, insn) in steps.iter().enumerate() {
            visitor.transfer(at(idx + 1), insn, &mut frame).unwrap();
        }
        assert_eq!(frame.status, ResourceStatus::Open);
        assert_eq!(visitor.resource().open_location, Some(at(3)));

        // new BufferedReader(reader)
        let wrap = [
            AnyInstruction::Regular(Instruction::New(BinaryName::BUFFEREDREADER)),
            AnyInstruction::Regular(Instruction::Dup),
            AnyInstruction::Regular(Instruction::ALoad(1)),
            invoke(
                InvokeType::Special,
                method(BinaryName::BUFFEREDREADER, UnqualifiedName::INIT, "(Ljava/io/Reader;)V"),
            ),
        ];
        for (idx, insn) in wrap.iter().enumerate() {
            visitor.transfer(at(idx + 5), insn, &mut frame).unwrap();
        }
        assert_eq!(frame.status, ResourceStatus::Open);

        // Whereas passing it to some other constructor is an escape
        let mut elsewhere = frame.clone();
        elsewhere.push(ResourceValue::NotInstance);
        elsewhere.model_instruction(&Instruction::ALoad(1)).unwrap();
        let other_init = invoke(
            InvokeType::Special,
            method(
                BinaryName::from_dotted("app.Holder").unwrap(),
                UnqualifiedName::INIT,
                "(Ljava/io/Reader;)V",
            ),
        );
        visitor.transfer(at(10), &other_init, &mut elsewhere).unwrap();
        assert_eq!(elsewhere.status, ResourceStatus::Escaped);

        let escapes: Vec<(Location, bool)> = tracker
            .escapes()
            .map(|escape| (escape.target, escape.as_argument))
            .collect();
        assert_eq!(escapes, vec![(at(8), true), (at(10), true)]);
    }
}
