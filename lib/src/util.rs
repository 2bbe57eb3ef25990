use std::fmt;
use std::ops::Sub;

/// Elements with a width
///
/// What the unit is depends on the element: operand stack and local variable words for types,
/// bytes for instructions, and constant pool slots for constants.
pub trait Width {
    fn width(&self) -> usize;
}

/// Byte offset into a method's code array
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
