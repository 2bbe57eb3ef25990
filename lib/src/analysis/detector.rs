use super::bugs::{exception_path_variant, BugInstance, BugReporter, Priority, SourceLine};
use super::{
    AnalysisError, Cfg, Creation, Resource, ResourceCollection, ResourceDataflow, ResourceId,
    ResourceStatus, ResourceTracker, ResourceVisitor, Settings,
};
use crate::jvm::class_graph::Hierarchy;
use crate::jvm::code::Code;
use crate::jvm::model::{Class, Method};
use crate::jvm::{Name, RenderDescriptor};

/// Opcodes a method must use for it to possibly create or receive a resource: `new`,
/// `invokevirtual`, `invokespecial`, `invokestatic`, `invokeinterface`
const PRESCREEN_OPCODES: [u8; 5] = [0xbb, 0xb6, 0xb7, 0xb8, 0xb9];

/// Finds resources that are opened in a method but not closed on every path out of it
pub struct ResourceLeakDetector<'a> {
    settings: &'a Settings,
    hierarchy: &'a dyn Hierarchy,
}

impl<'a> ResourceLeakDetector<'a> {
    pub fn new(settings: &'a Settings, hierarchy: &'a dyn Hierarchy) -> ResourceLeakDetector<'a> {
        ResourceLeakDetector {
            settings,
            hierarchy,
        }
    }

    /// Does the class call methods on anything that looks like a resource type?
    pub fn prescreen_class(&self, class: &Class) -> bool {
        class.referenced_method_classes.iter().any(|class_name| {
            self.settings
                .prescreen_fragments
                .iter()
                .any(|fragment| class_name.contains(fragment.as_str()))
        })
    }

    pub fn prescreen_method(&self, code: &Code) -> bool {
        code.bytecode_set.contains_any(&PRESCREEN_OPCODES)
    }

    /// Analyze every method of the class, reporting leaks as they are found
    ///
    /// A method whose analysis fails is logged and skipped.
    pub fn visit_class(&self, class: &Class, reporter: &mut dyn BugReporter) {
        if !self.prescreen_class(class) {
            log::debug!("Skipping {}: no resource types referenced", class.name);
            return;
        }

        for method in &class.methods {
            if let Err(err) = self.analyze_method(class, method, reporter) {
                log::error!(
                    "Failed to analyze {}.{}{}: {}",
                    class.name,
                    method.name,
                    method.descriptor.render(),
                    err
                );
            }
        }
    }

    /// Analyze one method
    pub fn analyze_method(
        &self,
        class: &Class,
        method: &Method,
        reporter: &mut dyn BugReporter,
    ) -> Result<(), AnalysisError> {
        let code = match &method.code {
            Some(code) if self.prescreen_method(code) => code,
            _ => return Ok(()),
        };
        let cfg = match Cfg::build(code) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::debug!(
                    "No control flow graph for {}.{}: {:?}",
                    class.name,
                    method.name,
                    err
                );
                return Ok(());
            }
        };
        let entry = match cfg.first_location() {
            Some(entry) => entry,
            None => return Ok(()),
        };

        let mut tracker = ResourceTracker::new(self.settings, self.hierarchy);
        let mut collection = ResourceCollection::new();

        // Resources passed in by the caller
        for (slot, parameter) in method.parameter_slots() {
            if let Some(class_name) = parameter.as_object() {
                if let Some(base) = tracker.base_type_of(class_name, reporter) {
                    collection.add_preexisting_resource(Resource::parameter(
                        entry,
                        class_name.clone(),
                        base,
                        slot,
                    ));
                }
            }
        }

        // Resources created in the method, and constructor calls that may wrap them
        for location in cfg.locations() {
            let insn = &code.instructions[location.instruction].1;
            match tracker.is_resource_creation(location, insn, reporter) {
                Some(Creation::Discovered(resource)) => {
                    collection.add_created_resource(location, resource);
                }
                Some(Creation::Collected(_)) => (),
                None => {
                    if tracker.is_resource_constructor(insn, reporter) {
                        collection.add_constructor_site(location);
                    }
                }
            }
        }

        if collection.is_empty() {
            return Ok(());
        }
        tracker.set_resource_collection(&collection);

        let dataflow = ResourceDataflow::new(&cfg, code);
        let mut potential_leaks: Vec<(ResourceId, ResourceStatus)> = vec![];
        let ids: Vec<ResourceId> = collection.ids().collect();
        for id in ids {
            let resource = collection
                .resource_mut(id)
                .ok_or(AnalysisError::UnknownResource(id))?;
            let mut visitor = ResourceVisitor::new(id, resource, &mut tracker, &mut *reporter);
            let exit_status = match dataflow.analyze(&mut visitor) {
                Ok(result) => result.exit_status,
                Err(err) => {
                    log::warn!(
                        "Abandoning {:?} in {}.{}: {:?}",
                        id,
                        class.name,
                        method.name,
                        err
                    );
                    continue;
                }
            };
            if self.settings.debug {
                log::debug!(
                    "{:?} in {}.{} exits as {:?}",
                    id,
                    class.name,
                    method.name,
                    exit_status
                );
            }

            match exit_status {
                Some(status) if status.is_potential_leak() => potential_leaks.push((id, status)),
                Some(ResourceStatus::Closed) => {
                    if let Some(resource) = collection.resource_mut(id) {
                        resource.closed = true;
                    }
                }
                _ => (),
            }
        }

        tracker.mark_transitive_uninteresting_escapes()?;
        for id in collection.ids() {
            if collection.resource(id).map_or(false, |resource| resource.closed) {
                tracker.set_class_closed(id);
            }
        }

        for (id, status) in potential_leaks {
            let resource = collection
                .resource(id)
                .ok_or(AnalysisError::UnknownResource(id))?;
            let bug_type = match resource.bug_type {
                Some(bug_type) => bug_type,
                None => continue,
            };
            if tracker.is_class_closed(id) {
                continue;
            }
            if resource.open_location.is_none() {
                log::warn!(
                    "{:?} in {}.{} is open at the exit but has no open location",
                    id,
                    class.name,
                    method.name
                );
                continue;
            }
            if !self.settings.allow_wrapped_uninteresting && tracker.is_uninteresting(id) {
                continue;
            }
            if tracker.is_wrapped(id) {
                continue;
            }

            // Streams opened in `main` are closed when the program exits
            let base = resource.base_type.as_str();
            if method.is_main() && (base.contains("InputStream") || base.contains("Reader")) {
                continue;
            }

            let (bug_type, priority) = if status == ResourceStatus::Open {
                (bug_type, Priority::Normal)
            } else {
                match exception_path_variant(bug_type) {
                    Some(bug_type) => (bug_type, Priority::Low),
                    None => {
                        log::warn!("No exception path variant of bug type {}", bug_type);
                        continue;
                    }
                }
            };
            let offset = code.instructions[resource.creation.instruction].0;

            reporter.accumulate(
                BugInstance {
                    bug_type,
                    priority,
                    class_name: class.name.clone(),
                    method_name: method.name.as_str().to_owned(),
                    method_descriptor: method.descriptor.render(),
                    source_file: class.source_file.clone(),
                    leaked_type: resource.base_type.clone(),
                    declared_type: resource.declared_type.clone(),
                },
                SourceLine {
                    class_name: class.name.clone(),
                    source_file: class.source_file.clone(),
                    line: code.line_at(offset),
                    offset,
                },
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::bugs::{BugAccumulator, RESOURCE_LEAK};
    use crate::jvm::class_file::MethodRef;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas};
    use crate::jvm::code::{BranchInstruction, CodeBuilder, Instruction, InvokeType};
    use crate::jvm::{
        BinaryName, ClassAccessFlags, MethodAccessFlags, MethodDescriptor, ParseDescriptor,
        RefType, UnqualifiedName,
    };

    fn class_with(method: Method) -> Class {
        let mut class = Class::new(
            BinaryName::from_dotted("app.Sql").unwrap(),
            Some(BinaryName::OBJECT),
            ClassAccessFlags::PUBLIC,
        );
        class.add_method(method);
        class
    }

    fn get_connection() -> Instruction {
        Instruction::Invoke(
            InvokeType::Static,
            MethodRef {
                class: RefType::Object(BinaryName::DRIVERMANAGER),
                name: UnqualifiedName::from_string(String::from("getConnection")).unwrap(),
                descriptor: MethodDescriptor::parse("(Ljava/lang/String;)Ljava/sql/Connection;")
                    .unwrap(),
                is_interface: false,
            },
        )
    }

    #[test]
    fn prescreens() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let settings = Settings::default();
        let detector = ResourceLeakDetector::new(&settings, &class_graph);

        let mut builder = CodeBuilder::new();
        builder.push_instruction(Instruction::IConst0);
        builder.push_branch(BranchInstruction::IReturn);
        let arithmetic = builder.build().unwrap();
        assert!(!detector.prescreen_method(&arithmetic));

        let mut builder = CodeBuilder::new();
        builder.push_instruction(Instruction::ALoad(0));
        builder.push_instruction(get_connection());
        builder.push_branch(BranchInstruction::AReturn);
        let code = builder.build().unwrap();
        assert!(detector.prescreen_method(&code));

        let method = Method::new(
            UnqualifiedName::from_string(String::from("connect")).unwrap(),
            MethodDescriptor::parse("(Ljava/lang/String;)Ljava/sql/Connection;").unwrap(),
            MethodAccessFlags::STATIC,
        )
        .with_code(code);
        assert!(detector.prescreen_class(&class_with(method)));

        let empty = Class::new(
            BinaryName::from_dotted("app.Empty").unwrap(),
            Some(BinaryName::OBJECT),
            ClassAccessFlags::PUBLIC,
        );
        assert!(!detector.prescreen_class(&empty));
    }

    #[test]
    fn connection_leaks() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();
        let settings = Settings::default();
        let detector = ResourceLeakDetector::new(&settings, &class_graph);

        // static void query(String url) { Connection c = DriverManager.getConnection(url); }
        let mut builder = CodeBuilder::new();
        builder.mark_line(7);
        builder.push_instruction(Instruction::ALoad(0));
        builder.push_instruction(get_connection());
        builder.push_instruction(Instruction::AStore(1));
        builder.mark_line(8);
        builder.push_branch(BranchInstruction::Return);
        let method = Method::new(
            UnqualifiedName::from_string(String::from("query")).unwrap(),
            MethodDescriptor::parse("(Ljava/lang/String;)V").unwrap(),
            MethodAccessFlags::STATIC,
        )
        .with_code(builder.build().unwrap());
        let mut class = class_with(method);
        class.source_file = Some(String::from("Sql.java"));

        let mut bugs = BugAccumulator::new();
        detector.visit_class(&class, &mut bugs);
        let found = bugs.bugs();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance.bug_type, RESOURCE_LEAK);
        assert_eq!(found[0].instance.priority, Priority::Normal);
        assert_eq!(found[0].instance.leaked_type, BinaryName::CONNECTION);
        assert_eq!(found[0].lines[0].line, Some(7));
        assert_eq!(
            found[0].to_string(),
            "NORMAL RESOURCE_LEAK app.Sql.query(Ljava/lang/String;)V [leaks java.sql.Connection] \
             at Sql.java:7"
        );
    }

    #[test]
    fn returned_connections_are_not_leaks() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();
        let settings = Settings::default();
        let detector = ResourceLeakDetector::new(&settings, &class_graph);

        let mut builder = CodeBuilder::new();
        builder.push_instruction(Instruction::ALoad(0));
        builder.push_instruction(get_connection());
        builder.push_branch(BranchInstruction::AReturn);
        let method = Method::new(
            UnqualifiedName::from_string(String::from("connect")).unwrap(),
            MethodDescriptor::parse("(Ljava/lang/String;)Ljava/sql/Connection;").unwrap(),
            MethodAccessFlags::STATIC,
        )
        .with_code(builder.build().unwrap());

        let mut bugs = BugAccumulator::new();
        detector.visit_class(&class_with(method), &mut bugs);
        assert!(bugs.is_empty());
    }
}
