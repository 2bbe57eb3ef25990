use crate::jvm::class_file::{read_bytes, Deserialize};
use crate::jvm::descriptors::ParseDescriptor;
use crate::jvm::names::Name;
use crate::jvm::{BinaryName, Error, FieldType, MethodDescriptor, RefType, UnqualifiedName};
use crate::util::Width;
use byteorder::ReadBytesExt;
use std::result::Result;

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant string value, already decoded from modified UTF-8
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    /// Module (only in `module-info.class`)
    Module(Utf8ConstantIndex),

    /// Package exported or opened by a module
    Package(Utf8ConstantIndex),
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Constant {
    /// Read one tagged constant. `index` is only used for error messages.
    fn read<R: ReadBytesExt>(reader: &mut R, index: u16) -> Result<Constant, Error> {
        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)? as usize;
                let bytes = read_bytes(reader, len)?;
                let string = decode_modified_utf8(&bytes).map_err(|message| {
                    Error::MalformedAttribute {
                        name: "CONSTANT_Utf8",
                        message,
                    }
                })?;
                Constant::Utf8(string)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => {
                let kind = u8::deserialize(reader)?;
                let handle_kind = HandleKind::from_byte(kind)
                    .ok_or(Error::BadConstantTag { index, tag: kind })?;
                Constant::MethodHandle {
                    handle_kind,
                    member: ConstantIndex::deserialize(reader)?,
                }
            }
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            _ => return Err(Error::BadConstantTag { index, tag }),
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. The null character is encoded on two bytes,
/// only the 1, 2, and 3 byte forms appear, and supplementary characters are spelled out as
/// surrogate pairs (each surrogate taking 3 bytes). Unpaired surrogates are replaced with
/// `U+FFFD`.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut idx = 0;

    let continuation = |idx: usize| -> Result<u16, String> {
        match bytes.get(idx) {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
            Some(b) => Err(format!("Bad continuation byte {:#04x} at {}", b, idx)),
            None => Err(format!("Truncated character at {}", idx)),
        }
    };

    while idx < bytes.len() {
        let lead = bytes[idx];
        if lead & 0b1000_0000 == 0 {
            units.push(lead as u16);
            idx += 1;
        } else if lead & 0b1110_0000 == 0b1100_0000 {
            let unit = ((lead & 0x1F) as u16) << 6 | continuation(idx + 1)?;
            units.push(unit);
            idx += 2;
        } else if lead & 0b1111_0000 == 0b1110_0000 {
            let unit = ((lead & 0x0F) as u16) << 12
                | continuation(idx + 1)? << 6
                | continuation(idx + 2)?;
            units.push(unit);
            idx += 3;
        } else {
            return Err(format!("Bad leading byte {:#04x} at {}", lead, idx));
        }
    }

    Ok(char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct FieldRefConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(pub ConstantIndex);

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        u16::deserialize(reader).map(ConstantIndex)
    }
}
impl Deserialize for Utf8ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        ConstantIndex::deserialize(reader).map(Utf8ConstantIndex)
    }
}
impl Deserialize for ClassConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        ConstantIndex::deserialize(reader).map(ClassConstantIndex)
    }
}
impl Deserialize for NameAndTypeConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        ConstantIndex::deserialize(reader).map(NameAndTypeConstantIndex)
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    fn from_byte(byte: u8) -> Option<HandleKind> {
        Some(match byte {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }
}

/// Field referenced from bytecode, resolved out of the constant pool
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Method referenced from bytecode, resolved out of the constant pool
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    /// Usually an object type, but `clone` gets called on arrays
    pub class: RefType,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub is_interface: bool,
}

impl MethodRef {
    /// Owning class, unless the method is called on an array type
    pub fn class_name(&self) -> Option<&BinaryName> {
        match &self.class {
            RefType::Object(class_name) => Some(class_name),
            _ => None,
        }
    }
}

/// Constant pool read out of a class file
///
/// Indexing starts at 1. The slot following a `long` or `double` is unusable and looking it up
/// is an error.
#[derive(Debug, Default)]
pub struct ConstantPool {
    constants: Vec<Option<Constant>>,
}

impl ConstantPool {
    /// Read the `constant_pool_count` followed by the constants themselves
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<ConstantPool, Error> {
        let count = u16::deserialize(reader)?;
        let mut constants = Vec::with_capacity(count as usize);
        let mut index: u16 = 1;
        while index < count {
            let constant = Constant::read(reader, index)?;
            let width = constant.width();
            constants.push(Some(constant));
            if width == 2 {
                constants.push(None);
            }
            index += width as u16;
        }
        Ok(ConstantPool { constants })
    }

    /// Build a pool from constants, in order starting at index 1
    pub fn from_constants(entries: impl IntoIterator<Item = Constant>) -> ConstantPool {
        let mut constants = vec![];
        for constant in entries {
            let width = constant.width();
            constants.push(Some(constant));
            if width == 2 {
                constants.push(None);
            }
        }
        ConstantPool { constants }
    }

    /// Iterate over the usable constants, along with their indices
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .enumerate()
            .filter_map(|(idx, constant)| {
                constant
                    .as_ref()
                    .map(|constant| (ConstantIndex(idx as u16 + 1), constant))
            })
    }

    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        (index.0 as usize)
            .checked_sub(1)
            .and_then(|idx| self.constants.get(idx))
            .and_then(|constant| constant.as_ref())
            .ok_or(Error::BadConstantIndex {
                index,
                expected: "usable constant",
            })
    }

    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "CONSTANT_Utf8",
            }),
        }
    }

    /// Class reference (which may be an array type, as in `anewarray` or `checkcast`)
    pub fn class_ref(&self, index: ClassConstantIndex) -> Result<RefType, Error> {
        let name_index = match self.get(index.0)? {
            Constant::Class(name_index) => *name_index,
            _ => {
                return Err(Error::BadConstantIndex {
                    index: index.0,
                    expected: "CONSTANT_Class",
                })
            }
        };
        let name = self.utf8(name_index)?;
        if name.starts_with('[') {
            RefType::parse(name).map_err(|_| Error::BadDescriptor(name.to_owned()))
        } else {
            BinaryName::from_string(name.to_owned())
                .map(RefType::Object)
                .map_err(Error::BadName)
        }
    }

    /// Class reference that must not be an array type
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<BinaryName, Error> {
        match self.class_ref(index)? {
            RefType::Object(class_name) => Ok(class_name),
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "CONSTANT_Class of a non-array type",
            }),
        }
    }

    /// Raw name of a class reference, without validation (used for quick prescreening)
    pub fn class_name_str(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Class(name_index) => self.utf8(*name_index),
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "CONSTANT_Class",
            }),
        }
    }

    pub fn name_and_type(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(UnqualifiedName, &str), Error> {
        match self.get(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                let name = UnqualifiedName::from_string(self.utf8(*name)?.to_owned())
                    .map_err(Error::BadName)?;
                Ok((name, self.utf8(*descriptor)?))
            }
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "CONSTANT_NameAndType",
            }),
        }
    }

    pub fn field_ref(&self, index: FieldRefConstantIndex) -> Result<FieldRef, Error> {
        match self.get(index.0)? {
            Constant::FieldRef(class, name_and_type) => {
                let class = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                let descriptor = FieldType::parse(descriptor)
                    .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?;
                Ok(FieldRef {
                    class,
                    name,
                    descriptor,
                })
            }
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "CONSTANT_Fieldref",
            }),
        }
    }

    pub fn method_ref(&self, index: MethodRefConstantIndex) -> Result<MethodRef, Error> {
        match self.get(index.0)? {
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let class = self.class_ref(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                let descriptor = MethodDescriptor::parse(descriptor)
                    .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?;
                Ok(MethodRef {
                    class,
                    name,
                    descriptor,
                    is_interface: *is_interface,
                })
            }
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "CONSTANT_Methodref or CONSTANT_InterfaceMethodref",
            }),
        }
    }

    /// Name and descriptor of an `invokedynamic` call site
    pub fn invoke_dynamic(
        &self,
        index: ConstantIndex,
    ) -> Result<(UnqualifiedName, MethodDescriptor), Error> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                method_descriptor, ..
            } => {
                let (name, descriptor) = self.name_and_type(*method_descriptor)?;
                let descriptor = MethodDescriptor::parse(descriptor)
                    .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?;
                Ok((name, descriptor))
            }
            _ => Err(Error::BadConstantIndex {
                index,
                expected: "CONSTANT_InvokeDynamic",
            }),
        }
    }

    /// Names of the classes owning every `Methodref` and `InterfaceMethodref` in the pool
    pub fn method_ref_classes(&self) -> impl Iterator<Item = &str> + '_ {
        self.iter().filter_map(move |(_, constant)| match constant {
            Constant::MethodRef { class, .. } => self.class_name_str(*class).ok(),
            _ => None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn modified_utf8() {
        assert_eq!(decode_modified_utf8(&[102, 111, 111]).unwrap(), "foo");
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\u{0}a");
        assert_eq!(
            decode_modified_utf8(&[196, 132, 224, 164, 132]).unwrap(),
            "Ąऄ"
        );
        assert_eq!(
            decode_modified_utf8(&[237, 160, 128, 237, 176, 128]).unwrap(),
            "\u{10000}"
        );

        // Lone high surrogate
        assert_eq!(
            decode_modified_utf8(&[237, 160, 128, 97]).unwrap(),
            "\u{FFFD}a"
        );
        assert!(decode_modified_utf8(&[0xC4]).is_err());
        assert!(decode_modified_utf8(&[0xF0, 0x90, 0x80, 0x80]).is_err());
    }

    #[test]
    fn wide_constants_take_two_slots() {
        #[rustfmt::skip]
        let bytes: Vec<u8> = vec![
            0x00, 0x06,                                     // count = 6 (5 slots)
            0x05, 0, 0, 0, 0, 0, 0, 0, 0x2a,                // #1 long 42 (#2 unusable)
            0x01, 0x00, 0x05, b'H', b'e', b'l', b'l', b'o', // #3 utf8 "Hello"
            0x07, 0x00, 0x03,                               // #4 class #3
            0x03, 0xff, 0xff, 0xff, 0xff,                   // #5 int -1
        ];
        let pool = ConstantPool::read(&mut Cursor::new(bytes)).unwrap();

        assert!(matches!(pool.get(ConstantIndex(1)), Ok(Constant::Long(42))));
        assert!(pool.get(ConstantIndex(2)).is_err());
        assert!(pool.get(ConstantIndex(0)).is_err());
        assert!(pool.get(ConstantIndex(6)).is_err());
        assert_eq!(
            pool.class_name(ClassConstantIndex(ConstantIndex(4))).unwrap(),
            BinaryName::from_string(String::from("Hello")).unwrap()
        );
        assert!(matches!(pool.get(ConstantIndex(5)), Ok(Constant::Integer(-1))));
        assert!(pool.utf8(Utf8ConstantIndex(ConstantIndex(4))).is_err());
    }

    #[test]
    fn unknown_tag() {
        let bytes: Vec<u8> = vec![0x00, 0x02, 0x02, 0x00];
        match ConstantPool::read(&mut Cursor::new(bytes)) {
            Err(Error::BadConstantTag { index: 1, tag: 2 }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn resolved_method_refs() {
        let pool = ConstantPool::from_constants(vec![
            Constant::Utf8(String::from("java/io/FileInputStream")), // #1
            Constant::Class(Utf8ConstantIndex(ConstantIndex(1))),    // #2
            Constant::Utf8(String::from("<init>")),                  // #3
            Constant::Utf8(String::from("(Ljava/lang/String;)V")),   // #4
            Constant::NameAndType {
                name: Utf8ConstantIndex(ConstantIndex(3)),
                descriptor: Utf8ConstantIndex(ConstantIndex(4)),
            }, // #5
            Constant::MethodRef {
                class: ClassConstantIndex(ConstantIndex(2)),
                name_and_type: NameAndTypeConstantIndex(ConstantIndex(5)),
                is_interface: false,
            }, // #6
            Constant::Utf8(String::from("[I")),                   // #7
            Constant::Class(Utf8ConstantIndex(ConstantIndex(7))), // #8
        ]);

        let method = pool
            .method_ref(MethodRefConstantIndex(ConstantIndex(6)))
            .unwrap();
        assert_eq!(method.name, UnqualifiedName::INIT);
        assert_eq!(
            method.class_name().map(|name| name.as_str()),
            Some("java/io/FileInputStream")
        );
        assert_eq!(method.descriptor.parameters.len(), 1);
        assert_eq!(method.descriptor.return_type, None);

        assert!(matches!(
            pool.class_ref(ClassConstantIndex(ConstantIndex(8))),
            Ok(RefType::PrimitiveArray(_))
        ));
        assert!(pool.class_name(ClassConstantIndex(ConstantIndex(8))).is_err());

        let classes: Vec<&str> = pool.method_ref_classes().collect();
        assert_eq!(classes, vec!["java/io/FileInputStream"]);
    }
}
