use super::class_file::ConstantIndex;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Class file does not start with `0xCAFEBABE`
    BadMagic([u8; 4]),

    /// Unknown constant pool tag
    BadConstantTag { index: u16, tag: u8 },

    /// A constant pool index is out of range, points at the unusable second slot of a `long` or
    /// `double`, or points at a constant of the wrong kind
    BadConstantIndex {
        index: ConstantIndex,
        expected: &'static str,
    },

    /// Malformed method or field descriptor
    BadDescriptor(String),

    /// Malformed class or member name
    BadName(String),

    /// Attribute whose contents don't match its declared structure
    MalformedAttribute {
        name: &'static str,
        message: String,
    },

    /// Byte that isn't a valid opcode
    InvalidOpcode { offset: usize, opcode: u8 },

    /// Valid opcode that the analysis does not support (`jsr`, `ret`)
    UnsupportedOpcode { offset: usize, opcode: u8 },

    /// Instruction runs past the end of the code array, or a jump lands outside the code
    MalformedCode { offset: usize, message: String },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
