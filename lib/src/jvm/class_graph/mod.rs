use super::model::Class;
use super::{BinaryName, Name};
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod java_classes;

pub use java_classes::*;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        ClassGraphArenas::new()
    }
}

/// Subtype queries, as needed by the analyses
pub trait Hierarchy {
    /// Query if `sub_type` is `super_type` or one of its (transitive) subtypes
    ///
    /// Fails if `sub_type` is unknown, or if the answer depends on a supertype that could not be
    /// resolved.
    fn is_subtype(&self, sub_type: &BinaryName, super_type: &BinaryName)
        -> Result<bool, LookupFailure>;
}

/// A class needed to answer a hierarchy query is missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupFailure {
    pub class_name: BinaryName,
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {} could not be found", self.class_name)
    }
}

/// Tracks the subtyping relationships between classes/interfaces
///
/// The graph is seeded with the part of the JDK that matters for resource tracking (see
/// [`ClassGraph::insert_java_library_types`]) and then extended with the classes under analysis.
/// Supertypes that are neither in the JDK subset nor in the analyzed classes are recorded on the
/// class that refers to them, so that queries depending on them fail instead of guessing.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<&'g BinaryName, &'g ClassData<'g>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
        }
    }

    pub fn lookup_class(&'g self, name: &BinaryName) -> Option<&'g ClassData<'g>> {
        self.classes.get(name)
    }

    /// Add a new class to the class graph
    pub fn add_class(&self, data: ClassData<'g>) -> &'g ClassData<'g> {
        let data = &*self.arenas.class_arena.alloc(data);
        self.classes.insert(&data.name, data);
        data
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) -> JavaClasses<'g> {
        JavaClasses::add_to_graph(self)
    }

    /// Add a class being analyzed
    ///
    /// Supertypes must already be in the graph to get linked up: use
    /// [`ClassGraph::add_model_classes`] when adding classes that extend one another.
    ///
    /// A class that is already in the graph (for instance, an analyzed copy of a JDK class) is
    /// left alone.
    pub fn add_model_class(&'g self, class: &Class) -> &'g ClassData<'g> {
        if let Some(existing) = self.lookup_class(&class.name) {
            log::debug!("{:?} is already in the class graph", class.name);
            return existing;
        }

        let mut missing_supertypes = vec![];
        let mut resolve = |name: &BinaryName| -> Option<&'g ClassData<'g>> {
            let found = self.lookup_class(name);
            if found.is_none() {
                missing_supertypes.push(name.clone());
            }
            found
        };

        let superclass = class.superclass.as_ref().and_then(&mut resolve);
        let interfaces = FrozenVec::new();
        for interface in &class.interfaces {
            if let Some(interface) = resolve(interface) {
                interfaces.push(interface);
            }
        }

        if !missing_supertypes.is_empty() {
            log::debug!(
                "{:?} has unresolved supertypes {:?}",
                class.name,
                missing_supertypes
            );
        }

        self.add_class(ClassData {
            name: class.name.clone(),
            superclass,
            interfaces,
            is_interface: class.is_interface(),
            missing_supertypes,
        })
    }

    /// Add a batch of classes being analyzed, supertypes before subtypes
    ///
    /// Classes caught in a cycle of supertypes are added anyway, with the edges that close the
    /// cycle treated as unresolved.
    pub fn add_model_classes<'c>(&'g self, classes: impl IntoIterator<Item = &'c Class>) {
        let mut pending: Vec<&'c Class> = classes.into_iter().collect();

        while !pending.is_empty() {
            let pending_names: HashSet<BinaryName> =
                pending.iter().map(|class| class.name.clone()).collect();
            let (ready, blocked): (Vec<&'c Class>, Vec<&'c Class>) =
                pending.into_iter().partition(|class| {
                    class
                        .superclass
                        .iter()
                        .chain(&class.interfaces)
                        .all(|supertype| !pending_names.contains(supertype))
                });

            if ready.is_empty() {
                for class in &blocked {
                    self.add_model_class(class);
                }
                break;
            }

            for class in ready {
                self.add_model_class(class);
            }
            pending = blocked;
        }
    }
}

impl<'g> Hierarchy for ClassGraph<'g> {
    /// Object to object assignability
    ///
    /// This does a search up the superclasses and superinterfaces looking for the super type.
    fn is_subtype(
        &self,
        sub_type: &BinaryName,
        super_type: &BinaryName,
    ) -> Result<bool, LookupFailure> {
        if sub_type == super_type {
            return Ok(true);
        }

        let sub_class = self.classes.get(sub_type).ok_or_else(|| LookupFailure {
            class_name: sub_type.clone(),
        })?;

        let mut supertypes_to_visit: Vec<&ClassData<'g>> = vec![sub_class];
        let mut dont_revisit: HashSet<&BinaryName> = HashSet::new();
        dont_revisit.insert(&sub_class.name);
        let mut unresolved: Option<&BinaryName> = None;

        while let Some(class_data) = supertypes_to_visit.pop() {
            if &class_data.name == super_type {
                return Ok(true);
            }

            if unresolved.is_none() {
                unresolved = class_data.missing_supertypes.first();
            }

            // Enqueue next types to visit
            if let Some(superclass) = class_data.superclass {
                if dont_revisit.insert(&superclass.name) {
                    supertypes_to_visit.push(superclass);
                }
            }
            for interface in &class_data.interfaces {
                if dont_revisit.insert(&interface.name) {
                    supertypes_to_visit.push(interface);
                }
            }
        }

        match unresolved {
            Some(class_name) => Err(LookupFailure {
                class_name: class_name.clone(),
            }),
            None => Ok(false),
        }
    }
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is missing for `java/lang/Object` and for classes whose superclass is unknown
    pub superclass: Option<&'g ClassData<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: FrozenVec<&'g ClassData<'g>>,

    /// Is this an interface?
    pub is_interface: bool,

    /// Declared supertypes that were not in the graph when the class was added
    pub missing_supertypes: Vec<BinaryName>,
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: &'g ClassData<'g>,
        is_interface: bool,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: FrozenVec::new(),
            is_interface,
            missing_supertypes: vec![],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ClassAccessFlags;

    fn user_class(name: &str, superclass: &str, interfaces: &[&str]) -> Class {
        let mut class = Class::new(
            BinaryName::from_dotted(name).unwrap(),
            Some(BinaryName::from_dotted(superclass).unwrap()),
            ClassAccessFlags::PUBLIC,
        );
        class.interfaces = interfaces
            .iter()
            .map(|name| BinaryName::from_dotted(name).unwrap())
            .collect();
        class
    }

    #[test]
    fn library_hierarchy() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let java = graph.insert_java_library_types();
        assert_eq!(java.io.file_input_stream.name, BinaryName::FILEINPUTSTREAM);

        let subtype = |sub: &BinaryName, sup: &BinaryName| graph.is_subtype(sub, sup).unwrap();
        assert!(subtype(&BinaryName::BUFFEREDREADER, &BinaryName::READER));
        assert!(subtype(&BinaryName::FILEWRITER, &BinaryName::WRITER));
        assert!(subtype(&BinaryName::GZIPINPUTSTREAM, &BinaryName::INPUTSTREAM));
        assert!(subtype(&BinaryName::JARFILE, &BinaryName::ZIPFILE));
        assert!(subtype(&BinaryName::PREPAREDSTATEMENT, &BinaryName::STATEMENT));
        assert!(subtype(&BinaryName::CALLABLESTATEMENT, &BinaryName::AUTOCLOSEABLE));
        assert!(subtype(&BinaryName::PROPERTIES, &BinaryName::OBJECT));
        assert!(subtype(&BinaryName::INPUTSTREAM, &BinaryName::INPUTSTREAM));
        assert!(subtype(&BinaryName::FILECHANNEL, &BinaryName::CLOSEABLE));

        assert!(!subtype(&BinaryName::READER, &BinaryName::BUFFEREDREADER));
        assert!(!subtype(&BinaryName::INPUTSTREAM, &BinaryName::OUTPUTSTREAM));
        assert!(!subtype(&BinaryName::CONNECTION, &BinaryName::STATEMENT));
        assert!(!subtype(&BinaryName::STRING, &BinaryName::CLOSEABLE));
    }

    #[test]
    fn unknown_classes() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();

        let unknown = BinaryName::from_dotted("com.example.Mystery").unwrap();
        assert_eq!(
            graph.is_subtype(&unknown, &BinaryName::INPUTSTREAM),
            Err(LookupFailure {
                class_name: unknown.clone()
            })
        );

        // Known class, but with a supertype nobody knows about
        graph.add_model_class(&user_class(
            "com.example.Wrapper",
            "com.example.Mystery",
            &["java.io.Closeable"],
        ));
        let wrapper = BinaryName::from_dotted("com.example.Wrapper").unwrap();
        assert_eq!(graph.is_subtype(&wrapper, &BinaryName::CLOSEABLE), Ok(true));
        assert_eq!(
            graph.is_subtype(&wrapper, &BinaryName::INPUTSTREAM),
            Err(LookupFailure {
                class_name: unknown
            })
        );
    }

    #[test]
    fn batch_in_dependency_order() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();

        let classes = vec![
            user_class("app.CountingStream", "app.TrackedStream", &[]),
            user_class("app.TrackedStream", "java.io.FilterInputStream", &[]),
            user_class("app.Loop1", "app.Loop2", &[]),
            user_class("app.Loop2", "app.Loop1", &[]),
        ];
        graph.add_model_classes(&classes);

        let counting = BinaryName::from_dotted("app.CountingStream").unwrap();
        assert_eq!(graph.is_subtype(&counting, &BinaryName::INPUTSTREAM), Ok(true));
        assert!(graph.lookup_class(&counting).unwrap().missing_supertypes.is_empty());

        let loop1 = BinaryName::from_dotted("app.Loop1").unwrap();
        assert!(graph.lookup_class(&loop1).is_some());
        assert!(graph.is_subtype(&loop1, &BinaryName::READER).is_err());
    }
}
