use crate::jvm::class_file::{
    Attribute, ClassConstantIndex, ConstantIndex, ConstantPool, Deserialize, Field, Method,
};
use crate::jvm::{ClassAccessFlags, Error};
use byteorder::ReadBytesExt;
use std::fs;
use std::io::{BufReader, Cursor};
use std::path::Path;

/// Class file version
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-B.2
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const JAVA8: Version = Version {
        major: 52,
        minor: 0,
    };
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let minor = u16::deserialize(reader)?;
        let major = u16::deserialize(reader)?;
        Ok(Version { major, minor })
    }
}

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Index `0` only for `java/lang/Object`
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Read a class file from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ClassFile, Error> {
        let file = fs::File::open(path)?;
        ClassFile::read(&mut BufReader::new(file))
    }

    /// Read a class file already in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<ClassFile, Error> {
        ClassFile::read(&mut Cursor::new(bytes))
    }

    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<ClassFile, Error> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let version = Version::deserialize(reader)?;
        let constants = ConstantPool::read(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = ClassConstantIndex::deserialize(reader)?;
        let interfaces = Vec::<ClassConstantIndex>::deserialize(reader)?;
        let fields = Vec::<Field>::deserialize(reader)?;
        let methods = Vec::<Method>::deserialize(reader)?;
        let attributes = Vec::<Attribute>::deserialize(reader)?;

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Superclass reference, unless this is `java/lang/Object`
    pub fn super_class(&self) -> Option<ClassConstantIndex> {
        if self.super_class.0 == ConstantIndex(0) {
            None
        } else {
            Some(self.super_class)
        }
    }
}
