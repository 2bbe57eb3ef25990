use crate::jvm::class_file::{self, ConstantPool};
use crate::jvm::code::Code;
use crate::jvm::{
    ArrayType, BinaryName, Error, FieldType, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor, RefType, RenderDescriptor, UnqualifiedName,
};
use crate::util::Width;

/// Semantic representation of a method
#[derive(Debug, Clone)]
pub struct Method {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,

    /// Method code implementation
    ///
    /// This is `None` for abstract and native methods, but also for methods whose code could not
    /// be decoded (those are skipped by analyses).
    pub code: Option<Code>,
}

impl Method {
    /// Create a new method, without code
    pub fn new(
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
    ) -> Method {
        Method {
            name,
            descriptor,
            access_flags,
            code: None,
        }
    }

    pub fn with_code(mut self, code: Code) -> Method {
        self.code = Some(code);
        self
    }

    /// Resolve a method from the class file
    ///
    /// A name or descriptor that fails to resolve is an error, but bytecode that fails to decode
    /// only leaves the method without code.
    pub fn from_class_file(
        method: &class_file::Method,
        constants: &ConstantPool,
        class_name: &BinaryName,
    ) -> Result<Method, Error> {
        let name = UnqualifiedName::from_string(constants.utf8(method.name_index)?.to_owned())
            .map_err(Error::BadName)?;
        let descriptor = constants.utf8(method.descriptor_index)?;
        let descriptor = MethodDescriptor::parse(descriptor)
            .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?;

        let code = match Code::from_attributes(&method.attributes, constants) {
            Ok(code) => code,
            Err(err) => {
                log::warn!(
                    "Skipping code of {}.{}{}: {:?}",
                    class_name,
                    name,
                    descriptor.render(),
                    err
                );
                None
            }
        };

        Ok(Method {
            name,
            descriptor,
            access_flags: method.access_flags,
            code,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Is this `public static void main(String[])`?
    pub fn is_main(&self) -> bool {
        let string_array = FieldType::Ref(RefType::ObjectArray(ArrayType {
            additional_dimensions: 0,
            element_type: BinaryName::STRING,
        }));
        self.is_static()
            && self.name == UnqualifiedName::MAIN
            && self.descriptor.return_type.is_none()
            && self.descriptor.parameters == [string_array]
    }

    /// Local variable slot of each parameter (the receiver, if any, is in slot 0)
    pub fn parameter_slots(&self) -> impl Iterator<Item = (u16, &FieldType)> + '_ {
        let mut slot: u16 = if self.is_static() { 0 } else { 1 };
        self.descriptor.parameters.iter().map(move |parameter| {
            let this_slot = slot;
            slot += parameter.width() as u16;
            (this_slot, parameter)
        })
    }
}
