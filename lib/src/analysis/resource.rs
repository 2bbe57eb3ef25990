use super::bugs::{BugReporter, RESOURCE_LEAK};
use super::{Location, ResourceFrame};
use crate::jvm::class_graph::Hierarchy;
use crate::jvm::code::{AnyInstruction, Instruction, InvokeType};
use crate::jvm::{BinaryName, RefType, UnqualifiedName};

/// Index of a resource in the method's [`super::ResourceCollection`]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ResourceId(pub usize);

/// How a resource goes from being created to being open
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenRule {
    /// Already open when the creating instruction completes (factory methods, parameters)
    OnCreation,

    /// Opened by the constructor call on the allocated instance (`new` then `<init>`)
    Constructor,
}

/// One tracked resource instance in a method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    /// Where the instance is created (method entry for parameters)
    pub creation: Location,

    /// Actual type of the instance
    pub declared_type: BinaryName,

    /// Tracked base category the declared type falls under
    pub base_type: BinaryName,

    pub open_rule: OpenRule,

    /// Where the resource got opened, once it has been
    pub open_location: Option<Location>,

    /// Bug type to report on a leak, or `None` if the resource is never reported
    pub bug_type: Option<&'static str>,

    /// Local holding the instance on method entry, for resources passed in as parameters
    pub instance_param_slot: Option<u16>,

    /// Don't follow implicit exception edges while analyzing this resource
    pub ignore_implicit_exceptions: bool,

    /// Closed on every path to the exit
    pub closed: bool,
}

impl Resource {
    /// Resource returned by a method call
    pub fn returned_by_call(
        creation: Location,
        declared_type: BinaryName,
        base_type: BinaryName,
    ) -> Resource {
        Resource {
            creation,
            declared_type,
            base_type,
            open_rule: OpenRule::OnCreation,
            open_location: None,
            bug_type: Some(RESOURCE_LEAK),
            instance_param_slot: None,
            ignore_implicit_exceptions: true,
            closed: false,
        }
    }

    /// Resource allocated by `new` and opened by its constructor
    pub fn constructed(
        creation: Location,
        declared_type: BinaryName,
        base_type: BinaryName,
    ) -> Resource {
        Resource {
            open_rule: OpenRule::Constructor,
            ..Resource::returned_by_call(creation, declared_type, base_type)
        }
    }

    /// Resource passed in by the caller
    ///
    /// The caller is responsible for closing it, so it is never reported and anything wrapping
    /// it isn't either.
    pub fn parameter(
        entry: Location,
        declared_type: BinaryName,
        base_type: BinaryName,
        slot: u16,
    ) -> Resource {
        Resource {
            creation: entry,
            declared_type,
            base_type,
            open_rule: OpenRule::OnCreation,
            open_location: Some(entry),
            bug_type: None,
            instance_param_slot: Some(slot),
            ignore_implicit_exceptions: false,
            closed: false,
        }
    }

    pub fn is_interesting(&self) -> bool {
        self.bug_type.is_some()
    }

    /// Does the instruction open the instance?
    pub fn is_open_at(&self, insn: &AnyInstruction, frame: &ResourceFrame) -> bool {
        if self.open_rule != OpenRule::Constructor {
            return false;
        }
        match insn {
            AnyInstruction::Regular(Instruction::Invoke(InvokeType::Special, method))
                if method.name == UnqualifiedName::INIT
                    && method.class == RefType::Object(self.declared_type.clone()) =>
            {
                let receiver_depth = method.descriptor.parameter_length(false);
                frame
                    .peek(receiver_depth)
                    .map_or(false, |value| value.is_instance())
            }
            _ => false,
        }
    }

    /// Does the instruction close the instance?
    ///
    /// That is a `close()` call on the instance, through a type related to the base category.
    /// Hierarchy lookup failures are reported and count as "not a close".
    pub fn is_close_at(
        &self,
        insn: &AnyInstruction,
        frame: &ResourceFrame,
        hierarchy: &dyn Hierarchy,
        reporter: &mut dyn BugReporter,
    ) -> bool {
        let owner = match close_call_owner(insn) {
            Some(owner) => owner,
            None => return false,
        };
        if !frame.peek(0).map_or(false, |value| value.is_instance()) {
            return false;
        }

        let related = hierarchy
            .is_subtype(owner, &self.base_type)
            .and_then(|is_sub| {
                if is_sub {
                    Ok(true)
                } else {
                    hierarchy.is_subtype(&self.base_type, owner)
                }
            });
        match related {
            Ok(related) => related,
            Err(failure) => {
                reporter.report_missing_class(failure);
                false
            }
        }
    }
}

/// Could the instruction close any resource at all?
pub fn might_close_any(insn: &AnyInstruction) -> bool {
    close_call_owner(insn).is_some()
}

/// Owning class of a `close()V` call through `invokevirtual` or `invokeinterface`
fn close_call_owner(insn: &AnyInstruction) -> Option<&BinaryName> {
    match insn {
        AnyInstruction::Regular(Instruction::Invoke(
            InvokeType::Virtual | InvokeType::Interface(_),
            method,
        )) if method.name == UnqualifiedName::CLOSE
            && method.descriptor.parameters.is_empty()
            && method.descriptor.return_type.is_none() =>
        {
            method.class_name()
        }
        _ => None,
    }
}
