use byteorder::{BigEndian, ReadBytesExt};
use std::io::Result;

/// Utility trait for deserializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when deserializing a sequence, the length of the sequence is usually `u16`
///   - everything is big endian
///
pub trait Deserialize: Sized {
    /// Deserialize construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self>;
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u8()
    }
}

impl Deserialize for u16 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u16::<BigEndian>()
    }
}

impl Deserialize for u32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u32::<BigEndian>()
    }
}

impl Deserialize for i8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i8()
    }
}

impl Deserialize for i16 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i16::<BigEndian>()
    }
}

impl Deserialize for i32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i32::<BigEndian>()
    }
}

impl Deserialize for i64 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i64::<BigEndian>()
    }
}

impl Deserialize for f32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_f32::<BigEndian>()
    }
}

impl Deserialize for f64 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_f64::<BigEndian>()
    }
}

/// Size in `u16` is the first thing deserialized
impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let len = u16::deserialize(reader)? as usize;
        let mut elements = Vec::with_capacity(len);
        for _ in 0..len {
            elements.push(A::deserialize(reader)?);
        }
        Ok(elements)
    }
}

/// Read exactly `len` raw bytes
pub fn read_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn big_endian_integers() {
        let mut cursor = Cursor::new(vec![0x01, 0x02, 0xff, 0xfe, 0x00, 0x00, 0x00, 0x2a]);
        assert_eq!(u16::deserialize(&mut cursor).unwrap(), 0x0102);
        assert_eq!(i16::deserialize(&mut cursor).unwrap(), -2);
        assert_eq!(u32::deserialize(&mut cursor).unwrap(), 42);
        assert!(u8::deserialize(&mut cursor).is_err());
    }

    #[test]
    fn length_prefixed_vectors() {
        let mut cursor = Cursor::new(vec![0x00, 0x03, 0x00, 0x07, 0x00, 0x08, 0x00, 0x09]);
        let parsed: Vec<u16> = Vec::deserialize(&mut cursor).unwrap();
        assert_eq!(parsed, vec![7, 8, 9]);

        let mut truncated = Cursor::new(vec![0x00, 0x02, 0x00, 0x07]);
        assert!(Vec::<u16>::deserialize(&mut truncated).is_err());
    }
}
