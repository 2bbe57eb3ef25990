use crate::jvm::class_file::{AttributeLike, ClassFile, SourceFile};
use crate::jvm::model::Method;
use crate::jvm::{BinaryName, ClassAccessFlags, Error};
use std::collections::BTreeSet;
use std::path::Path;

/// Semantic representation of a class
#[derive(Debug, Clone)]
pub struct Class {
    pub name: BinaryName,

    /// Only `java/lang/Object` has no superclass
    pub superclass: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    pub access_flags: ClassAccessFlags,

    /// Name of the source file the class was compiled from
    pub source_file: Option<String>,

    /// Raw names of the classes owning methods referenced from the constant pool
    pub referenced_method_classes: BTreeSet<String>,

    pub methods: Vec<Method>,
}

impl Class {
    /// Create a new class, without methods
    pub fn new(
        name: BinaryName,
        superclass: Option<BinaryName>,
        access_flags: ClassAccessFlags,
    ) -> Class {
        Class {
            name,
            superclass,
            interfaces: vec![],
            access_flags,
            source_file: None,
            referenced_method_classes: BTreeSet::new(),
            methods: vec![],
        }
    }

    /// Add a method (and record the classes of all the methods it calls)
    pub fn add_method(&mut self, method: Method) {
        use crate::jvm::code::{AnyInstruction, Instruction};

        if let Some(code) = &method.code {
            for (_, insn) in &code.instructions {
                if let AnyInstruction::Regular(Instruction::Invoke(_, method_ref)) = insn {
                    self.referenced_method_classes
                        .insert(method_ref.class.class_name_str());
                }
            }
        }
        self.methods.push(method);
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Class, Error> {
        Class::from_class_file(&ClassFile::from_path(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Class, Error> {
        Class::from_class_file(&ClassFile::from_bytes(bytes)?)
    }

    pub fn from_class_file(class_file: &ClassFile) -> Result<Class, Error> {
        let constants = &class_file.constants;
        let name = constants.class_name(class_file.this_class)?;
        let superclass = class_file
            .super_class()
            .map(|idx| constants.class_name(idx))
            .transpose()?;
        let interfaces = class_file
            .interfaces
            .iter()
            .map(|idx| constants.class_name(*idx))
            .collect::<Result<Vec<_>, Error>>()?;
        let source_file = SourceFile::find(&class_file.attributes, constants)?.map(|src| src.0);
        let referenced_method_classes = constants
            .method_ref_classes()
            .map(str::to_owned)
            .collect();
        let methods = class_file
            .methods
            .iter()
            .map(|method| Method::from_class_file(method, constants, &name))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Class {
            name,
            superclass,
            interfaces,
            access_flags: class_file.access_flags,
            source_file,
            referenced_method_classes,
            methods,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::MethodRef;
    use crate::jvm::code::{BranchInstruction, CodeBuilder, Instruction, InvokeType};
    use crate::jvm::{
        MethodAccessFlags, MethodDescriptor, ParseDescriptor, RefType, UnqualifiedName,
    };

    #[test]
    fn referenced_classes_follow_methods() {
        let mut builder = CodeBuilder::new();
        builder.push_instruction(Instruction::ALoad(0));
        builder.push_instruction(Instruction::Invoke(
            InvokeType::Virtual,
            MethodRef {
                class: RefType::Object(BinaryName::INPUTSTREAM),
                name: UnqualifiedName::CLOSE,
                descriptor: MethodDescriptor::parse("()V").unwrap(),
                is_interface: false,
            },
        ));
        builder.push_branch(BranchInstruction::Return);

        let mut class = Class::new(
            BinaryName::from_dotted("Example").unwrap(),
            Some(BinaryName::OBJECT),
            ClassAccessFlags::PUBLIC,
        );
        class.add_method(
            Method::new(
                UnqualifiedName::CLOSE,
                MethodDescriptor::parse("(Ljava/io/InputStream;)V").unwrap(),
                MethodAccessFlags::STATIC,
            )
            .with_code(builder.build().unwrap()),
        );
        assert!(class.referenced_method_classes.contains("java/io/InputStream"));
        assert!(!class.is_interface());
    }
}
