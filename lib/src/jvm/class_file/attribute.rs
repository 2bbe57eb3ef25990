use crate::jvm::class_file::{
    read_bytes, ClassConstantIndex, ConstantIndex, ConstantPool, Deserialize, Utf8ConstantIndex,
};
use crate::jvm::Error;
use byteorder::ReadBytesExt;
use std::io::Cursor;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attributes are kept as raw bytes until something asks for a specific one. Only the few that
/// the analysis needs get decoded: `Code`, `LineNumberTable`, and `SourceFile`.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;

        // Attribute info length is 4 bytes
        let len = u32::deserialize(reader)? as usize;
        let info = read_bytes(reader, len)?;

        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally they represent
/// very different things. This trait is implemented by things which can be decoded out of
/// attributes.
pub trait AttributeLike: Sized {
    /// Name of the attribute
    const NAME: &'static str;

    /// Decode the attribute contents
    fn parse(info: &[u8], constants: &ConstantPool) -> Result<Self, Error>;

    /// Find and decode the first attribute with a matching name
    fn find(attributes: &[Attribute], constants: &ConstantPool) -> Result<Option<Self>, Error> {
        for attribute in attributes {
            if constants.utf8(attribute.name_index)? == Self::NAME {
                return Self::parse(&attribute.info, constants).map(Some);
            }
        }
        Ok(None)
    }
}

fn malformed(name: &'static str, err: std::io::Error) -> Error {
    Error::MalformedAttribute {
        name,
        message: err.to_string(),
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl AttributeLike for CodeAttribute {
    const NAME: &'static str = "Code";

    fn parse(info: &[u8], _constants: &ConstantPool) -> Result<Self, Error> {
        let mut reader = Cursor::new(info);
        let read = |reader: &mut Cursor<&[u8]>| -> std::io::Result<CodeAttribute> {
            let max_stack = u16::deserialize(reader)?;
            let max_locals = u16::deserialize(reader)?;
            let code_len = u32::deserialize(reader)? as usize;
            let code_array = read_bytes(reader, code_len)?;
            let exception_table = Vec::<ExceptionHandler>::deserialize(reader)?;
            let attributes = Vec::<Attribute>::deserialize(reader)?;
            Ok(CodeAttribute {
                max_stack,
                max_locals,
                code_array,
                exception_table,
                attributes,
            })
        };
        read(&mut reader).map_err(|err| malformed(Self::NAME, err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Index `0` means the handler catches everything (used for `finally`)
    pub catch_type: ClassConstantIndex,
}

impl ExceptionHandler {
    pub fn is_catch_all(&self) -> bool {
        self.catch_type.0 == ConstantIndex(0)
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(ExceptionHandler {
            start_pc: u16::deserialize(reader)?,
            end_pc: u16::deserialize(reader)?,
            handler_pc: u16::deserialize(reader)?,
            catch_type: ClassConstantIndex::deserialize(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, Default)]
pub struct LineNumberTable(pub Vec<LineNumberEntry>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

impl Deserialize for LineNumberEntry {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(LineNumberEntry {
            start_pc: u16::deserialize(reader)?,
            line_number: u16::deserialize(reader)?,
        })
    }
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";

    fn parse(info: &[u8], _constants: &ConstantPool) -> Result<Self, Error> {
        Vec::<LineNumberEntry>::deserialize(&mut Cursor::new(info))
            .map(LineNumberTable)
            .map_err(|err| malformed(Self::NAME, err))
    }
}

impl LineNumberTable {
    /// Collect every `LineNumberTable` (there may be several, in any order)
    pub fn collect(
        attributes: &[Attribute],
        constants: &ConstantPool,
    ) -> Result<LineNumberTable, Error> {
        let mut entries = vec![];
        for attribute in attributes {
            if constants.utf8(attribute.name_index)? == Self::NAME {
                entries.extend(Self::parse(&attribute.info, constants)?.0);
            }
        }
        entries.sort_by_key(|entry| entry.start_pc);
        Ok(LineNumberTable(entries))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.10
#[derive(Debug, Clone)]
pub struct SourceFile(pub String);

impl AttributeLike for SourceFile {
    const NAME: &'static str = "SourceFile";

    fn parse(info: &[u8], constants: &ConstantPool) -> Result<Self, Error> {
        let index = Utf8ConstantIndex::deserialize(&mut Cursor::new(info))
            .map_err(|err| malformed(Self::NAME, err))?;
        Ok(SourceFile(constants.utf8(index)?.to_owned()))
    }
}
