//! This module contains the AST of JVM bytecode, as decoded out of a method's `Code` attribute.
//! The representation is slightly different from the usual presentation to make it more
//! convenient to analyze bytecode. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches.
//!
//!   - Constant pool references are resolved, so that an `invokevirtual` carries the method name
//!     and descriptor instead of an index
//!
//!   - `jsr` and `ret` are omitted. Methods using them are rejected when decoding.

use crate::jvm::class_file::{FieldRef, MethodRef};
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};
use crate::util::{Offset, Width};

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantData), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantData),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(InvokeDynamicRef),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType),
    ArrayLength,
    CheckCast(RefType),
    InstanceOf(RefType),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(RefType, u8),
}

/// Constant loaded by `ldc`, `ldc_w`, or `ldc2_w`
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantData {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType),
    MethodHandle,
    MethodType(MethodDescriptor),

    /// Dynamically computed constant of the given type
    Dynamic(FieldType),
}

/// Call site of an `invokedynamic`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvokeDynamicRef {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

/// Branching JVM bytecode instruction
///
/// `Lbl` is the type of jump targets. Fall-through is implicit: a conditional branch that isn't
/// taken continues with the next instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    Goto(Lbl), // covers `goto` and `goto_w`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
}

impl<Lbl: Copy> BranchInstruction<Lbl> {
    /// Whether execution can continue with the next instruction
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(_, _)
                | BranchInstruction::IfICmp(_, _)
                | BranchInstruction::IfACmp(_, _)
                | BranchInstruction::IfNull(_, _)
        )
    }

    /// Non-fallthrough jump targets (a switch's default comes first)
    pub fn jump_targets(&self) -> Vec<Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl) => vec![*lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                ts
            }
            BranchInstruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                ts
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => vec![],
        }
    }

    /// Whether the instruction leaves the method normally
    pub fn is_return(&self) -> bool {
        matches!(
            self,
            BranchInstruction::IReturn
                | BranchInstruction::LReturn
                | BranchInstruction::FReturn
                | BranchInstruction::DReturn
                | BranchInstruction::AReturn
                | BranchInstruction::Return
        )
    }

    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets.iter().map(&mut map_label).collect::<Result<_, E>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| -> Result<(i32, Lbl2), E> { Ok((*key, map_label(lbl)?)) })
                    .collect::<Result<_, E>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
        })
    }
}

/// Either sort of instruction, as it appears in the flat instruction list of a method
#[derive(Clone, Debug, PartialEq)]
pub enum AnyInstruction {
    Regular(Instruction),
    Branch(BranchInstruction<Offset>),
}

/// How an instruction may raise an exception
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ExceptionKind {
    /// Method calls and `athrow`
    Explicit,

    /// Runtime exceptions raised by the JVM itself (null dereference, bad array index, division
    /// by zero, failed cast, allocation failure, illegal monitor state)
    Implicit,
}

impl AnyInstruction {
    pub fn exception_kind(&self) -> Option<ExceptionKind> {
        use Instruction::*;
        match self {
            AnyInstruction::Branch(BranchInstruction::AThrow) => Some(ExceptionKind::Explicit),
            AnyInstruction::Branch(_) => None,
            AnyInstruction::Regular(insn) => match insn {
                Invoke(_, _) | InvokeDynamic(_) => Some(ExceptionKind::Explicit),

                GetStatic(_) | PutStatic(_) | GetField(_) | PutField(_) | IALoad | LALoad
                | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad | IAStore | LAStore
                | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore | New(_)
                | NewArray(_) | ANewArray(_) | MultiANewArray(_, _) | IDiv | LDiv | IRem
                | LRem | ArrayLength | CheckCast(_) | MonitorEnter | MonitorExit => {
                    Some(ExceptionKind::Implicit)
                }

                _ => None,
            },
        }
    }

    /// Canonical opcode (for instructions with compact or `wide` variants, this is the plain
    /// one-byte-index form)
    pub fn opcode(&self) -> u8 {
        match self {
            AnyInstruction::Regular(insn) => insn.opcode(),
            AnyInstruction::Branch(insn) => insn.opcode(),
        }
    }
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        use Instruction::*;
        match self {
            Nop => 0x00,
            AConstNull => 0x01,
            IConstM1 => 0x02,
            IConst0 => 0x03,
            IConst1 => 0x04,
            IConst2 => 0x05,
            IConst3 => 0x06,
            IConst4 => 0x07,
            IConst5 => 0x08,
            LConst0 => 0x09,
            LConst1 => 0x0a,
            FConst0 => 0x0b,
            FConst1 => 0x0c,
            FConst2 => 0x0d,
            DConst0 => 0x0e,
            DConst1 => 0x0f,
            BiPush(_) => 0x10,
            SiPush(_) => 0x11,
            Ldc(_) => 0x12,
            Ldc2(_) => 0x14,
            ILoad(_) => 0x15,
            LLoad(_) => 0x16,
            FLoad(_) => 0x17,
            DLoad(_) => 0x18,
            ALoad(_) => 0x19,
            IALoad => 0x2e,
            LALoad => 0x2f,
            FALoad => 0x30,
            DALoad => 0x31,
            AALoad => 0x32,
            BALoad => 0x33,
            CALoad => 0x34,
            SALoad => 0x35,
            IStore(_) => 0x36,
            LStore(_) => 0x37,
            FStore(_) => 0x38,
            DStore(_) => 0x39,
            AStore(_) => 0x3a,
            IAStore => 0x4f,
            LAStore => 0x50,
            FAStore => 0x51,
            DAStore => 0x52,
            AAStore => 0x53,
            BAStore => 0x54,
            CAStore => 0x55,
            SAStore => 0x56,
            Pop => 0x57,
            Pop2 => 0x58,
            Dup => 0x59,
            DupX1 => 0x5a,
            DupX2 => 0x5b,
            Dup2 => 0x5c,
            Dup2X1 => 0x5d,
            Dup2X2 => 0x5e,
            Swap => 0x5f,
            IAdd => 0x60,
            LAdd => 0x61,
            FAdd => 0x62,
            DAdd => 0x63,
            ISub => 0x64,
            LSub => 0x65,
            FSub => 0x66,
            DSub => 0x67,
            IMul => 0x68,
            LMul => 0x69,
            FMul => 0x6a,
            DMul => 0x6b,
            IDiv => 0x6c,
            LDiv => 0x6d,
            FDiv => 0x6e,
            DDiv => 0x6f,
            IRem => 0x70,
            LRem => 0x71,
            FRem => 0x72,
            DRem => 0x73,
            INeg => 0x74,
            LNeg => 0x75,
            FNeg => 0x76,
            DNeg => 0x77,
            ISh(ShiftType::Left) => 0x78,
            LSh(ShiftType::Left) => 0x79,
            ISh(ShiftType::ArithmeticRight) => 0x7a,
            LSh(ShiftType::ArithmeticRight) => 0x7b,
            ISh(ShiftType::LogicalRight) => 0x7c,
            LSh(ShiftType::LogicalRight) => 0x7d,
            IAnd => 0x7e,
            LAnd => 0x7f,
            IOr => 0x80,
            LOr => 0x81,
            IXor => 0x82,
            LXor => 0x83,
            IInc(_, _) => 0x84,
            I2L => 0x85,
            I2F => 0x86,
            I2D => 0x87,
            L2I => 0x88,
            L2F => 0x89,
            L2D => 0x8a,
            F2I => 0x8b,
            F2L => 0x8c,
            F2D => 0x8d,
            D2I => 0x8e,
            D2L => 0x8f,
            D2F => 0x90,
            I2B => 0x91,
            I2C => 0x92,
            I2S => 0x93,
            LCmp => 0x94,
            FCmp(CompareMode::L) => 0x95,
            FCmp(CompareMode::G) => 0x96,
            DCmp(CompareMode::L) => 0x97,
            DCmp(CompareMode::G) => 0x98,
            GetStatic(_) => 0xb2,
            PutStatic(_) => 0xb3,
            GetField(_) => 0xb4,
            PutField(_) => 0xb5,
            Invoke(InvokeType::Virtual, _) => 0xb6,
            Invoke(InvokeType::Special, _) => 0xb7,
            Invoke(InvokeType::Static, _) => 0xb8,
            Invoke(InvokeType::Interface(_), _) => 0xb9,
            InvokeDynamic(_) => 0xba,
            New(_) => 0xbb,
            NewArray(_) => 0xbc,
            ANewArray(_) => 0xbd,
            ArrayLength => 0xbe,
            CheckCast(_) => 0xc0,
            InstanceOf(_) => 0xc1,
            MonitorEnter => 0xc2,
            MonitorExit => 0xc3,
            MultiANewArray(_, _) => 0xc5,
        }
    }
}

impl<Lbl> BranchInstruction<Lbl> {
    pub fn opcode(&self) -> u8 {
        use BranchInstruction::*;
        match self {
            If(OrdComparison::EQ, _) => 0x99,
            If(OrdComparison::NE, _) => 0x9a,
            If(OrdComparison::LT, _) => 0x9b,
            If(OrdComparison::GE, _) => 0x9c,
            If(OrdComparison::GT, _) => 0x9d,
            If(OrdComparison::LE, _) => 0x9e,
            IfICmp(OrdComparison::EQ, _) => 0x9f,
            IfICmp(OrdComparison::NE, _) => 0xa0,
            IfICmp(OrdComparison::LT, _) => 0xa1,
            IfICmp(OrdComparison::GE, _) => 0xa2,
            IfICmp(OrdComparison::GT, _) => 0xa3,
            IfICmp(OrdComparison::LE, _) => 0xa4,
            IfACmp(EqComparison::EQ, _) => 0xa5,
            IfACmp(EqComparison::NE, _) => 0xa6,
            Goto(_) => 0xa7,
            TableSwitch { .. } => 0xaa,
            LookupSwitch { .. } => 0xab,
            IReturn => 0xac,
            LReturn => 0xad,
            FReturn => 0xae,
            DReturn => 0xaf,
            AReturn => 0xb0,
            Return => 0xb1,
            AThrow => 0xbf,
            IfNull(EqComparison::EQ, _) => 0xc6,
            IfNull(EqComparison::NE, _) => 0xc7,
        }
    }
}

/// Width of the most compact encoding of a local variable index operand (including the opcode)
fn local_index_width(index: u16) -> usize {
    match index {
        0..=3 => 1,
        4..=255 => 2,
        _ => 4,
    }
}

/// Bytes taken by the most compact encoding of the instruction. Constant pool indices are assumed
/// to fit in one byte for `ldc`.
impl Width for Instruction {
    fn width(&self) -> usize {
        use Instruction::*;
        match self {
            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) | IStore(idx)
            | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) => local_index_width(*idx),

            IInc(idx, by) => {
                if *idx <= 255 && i8::try_from(*by).is_ok() {
                    3
                } else {
                    6
                }
            }

            BiPush(_) | Ldc(_) | NewArray(_) => 2,

            SiPush(_) | Ldc2(_) | GetStatic(_) | PutStatic(_) | GetField(_) | PutField(_)
            | New(_) | ANewArray(_) | CheckCast(_) | InstanceOf(_) => 3,

            Invoke(InvokeType::Interface(_), _) | InvokeDynamic(_) => 5,
            Invoke(_, _) => 3,

            MultiANewArray(_, _) => 4,

            _ => 1,
        }
    }
}

/// Bytes taken by the instruction, assuming that it starts at offset 0. Use
/// [`BranchInstruction::width_at`] for switches elsewhere.
impl<Lbl> Width for BranchInstruction<Lbl> {
    fn width(&self) -> usize {
        self.width_at(Offset(0))
    }
}

impl<Lbl> BranchInstruction<Lbl> {
    /// Bytes taken by the instruction when it starts at the given offset (switches are padded so
    /// that their operands are 4-byte aligned)
    pub fn width_at(&self, offset: Offset) -> usize {
        let padding = (4 - (offset.0 + 1) % 4) % 4;
        match self {
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,

            BranchInstruction::Goto(_)
            | BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => 3,

            BranchInstruction::TableSwitch { targets, .. } => {
                1 + padding + 4 * (3 + targets.len())
            }

            BranchInstruction::LookupSwitch { targets, .. } => {
                1 + padding + 8 * (1 + targets.len())
            }
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because the constant argument it expects is not to a
/// `Constant::MethodRef`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}

impl InvokeType {
    /// Whether the call consumes a receiver from the stack
    pub fn has_receiver(&self) -> bool {
        !matches!(self, InvokeType::Static)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exception_kinds() {
        let athrow = AnyInstruction::Branch(BranchInstruction::AThrow);
        assert_eq!(athrow.exception_kind(), Some(ExceptionKind::Explicit));

        let goto = AnyInstruction::Branch(BranchInstruction::Goto(Offset(0)));
        assert_eq!(goto.exception_kind(), None);

        for insn in [
            Instruction::AALoad,
            Instruction::ArrayLength,
            Instruction::IDiv,
            Instruction::New(BinaryName::INPUTSTREAM),
            Instruction::MonitorExit,
        ] {
            assert_eq!(
                AnyInstruction::Regular(insn).exception_kind(),
                Some(ExceptionKind::Implicit)
            );
        }

        for insn in [Instruction::FDiv, Instruction::ALoad(1), Instruction::Dup] {
            assert_eq!(AnyInstruction::Regular(insn).exception_kind(), None);
        }
    }

    #[test]
    fn switch_padding() {
        let switch = BranchInstruction::TableSwitch {
            default: 0,
            low: 0,
            targets: vec![1, 2],
        };
        assert_eq!(switch.width_at(Offset(0)), 1 + 3 + 20);
        assert_eq!(switch.width_at(Offset(3)), 1 + 20);

        let lookup: BranchInstruction<usize> = BranchInstruction::LookupSwitch {
            default: 0,
            targets: vec![(7, 1)],
        };
        assert_eq!(lookup.width_at(Offset(1)), 1 + 2 + 16);
    }

    #[test]
    fn compact_local_widths() {
        assert_eq!(Instruction::ALoad(0).width(), 1);
        assert_eq!(Instruction::ALoad(4).width(), 2);
        assert_eq!(Instruction::ALoad(300).width(), 4);
        assert_eq!(Instruction::IInc(1, 1).width(), 3);
        assert_eq!(Instruction::IInc(1, 1000).width(), 6);
    }

    #[test]
    fn branch_targets() {
        let branch = BranchInstruction::IfNull(EqComparison::EQ, 12usize);
        assert!(branch.falls_through());
        assert_eq!(branch.jump_targets(), vec![12]);
        assert!(!BranchInstruction::<usize>::AReturn.falls_through());
        assert!(BranchInstruction::<usize>::AReturn.is_return());

        let mapped: Result<BranchInstruction<Offset>, ()> =
            branch.map_labels(|lbl| Ok(Offset(*lbl * 2)));
        assert_eq!(
            mapped,
            Ok(BranchInstruction::IfNull(EqComparison::EQ, Offset(24)))
        );
    }
}
