use crate::jvm::class_file::{
    ClassConstantIndex, Constant, ConstantIndex, ConstantPool, Deserialize, FieldRef,
    FieldRefConstantIndex, MethodRef, MethodRefConstantIndex,
};
use crate::jvm::code::{
    AnyInstruction, BranchInstruction, CompareMode, ConstantData, EqComparison, Instruction,
    InvokeDynamicRef, InvokeType, OrdComparison, ShiftType,
};
use crate::jvm::descriptors::ParseDescriptor;
use crate::jvm::{BaseType, Error, FieldType, MethodDescriptor};
use crate::util::Offset;
use std::collections::HashSet;
use std::io::Cursor;

/// Decode a method's code array into a flat list of instructions, each tagged with the offset at
/// which it starts
///
/// Constant pool references get resolved along the way. Jumps are checked to land on the start of
/// an instruction.
pub fn decode_instructions(
    code_array: &[u8],
    constants: &ConstantPool,
) -> Result<Vec<(Offset, AnyInstruction)>, Error> {
    let mut decoder = Decoder {
        reader: Cursor::new(code_array),
        constants,
        len: code_array.len(),
        start: 0,
    };

    let mut instructions = vec![];
    while (decoder.reader.position() as usize) < code_array.len() {
        decoder.start = decoder.reader.position() as usize;
        let insn = decoder.next_instruction()?;
        instructions.push((Offset(decoder.start), insn));
    }

    // Every jump must land at the start of an instruction
    let starts: HashSet<Offset> = instructions.iter().map(|(offset, _)| *offset).collect();
    for (offset, insn) in &instructions {
        if let AnyInstruction::Branch(branch) = insn {
            for target in branch.jump_targets() {
                if !starts.contains(&target) {
                    return Err(Error::MalformedCode {
                        offset: offset.0,
                        message: format!("jump into the middle of an instruction at {:?}", target),
                    });
                }
            }
        }
    }

    Ok(instructions)
}

struct Decoder<'a> {
    reader: Cursor<&'a [u8]>,
    constants: &'a ConstantPool,
    len: usize,

    /// Offset of the instruction being decoded
    start: usize,
}

impl<'a> Decoder<'a> {
    fn truncated(&self) -> Error {
        Error::MalformedCode {
            offset: self.start,
            message: String::from("instruction runs past the end of the code"),
        }
    }

    fn u8(&mut self) -> Result<u8, Error> {
        u8::deserialize(&mut self.reader).map_err(|_| self.truncated())
    }

    fn i8(&mut self) -> Result<i8, Error> {
        i8::deserialize(&mut self.reader).map_err(|_| self.truncated())
    }

    fn u16(&mut self) -> Result<u16, Error> {
        u16::deserialize(&mut self.reader).map_err(|_| self.truncated())
    }

    fn i16(&mut self) -> Result<i16, Error> {
        i16::deserialize(&mut self.reader).map_err(|_| self.truncated())
    }

    fn i32(&mut self) -> Result<i32, Error> {
        i32::deserialize(&mut self.reader).map_err(|_| self.truncated())
    }

    /// Turn a jump relative to the current instruction into an absolute offset
    fn target(&self, relative: i32) -> Result<Offset, Error> {
        let target = self.start as i64 + relative as i64;
        if target < 0 || target >= self.len as i64 {
            Err(Error::MalformedCode {
                offset: self.start,
                message: format!("jump target {} is outside the code", target),
            })
        } else {
            Ok(Offset(target as usize))
        }
    }

    fn short_target(&mut self) -> Result<Offset, Error> {
        let relative = self.i16()?;
        self.target(relative as i32)
    }

    fn wide_target(&mut self) -> Result<Offset, Error> {
        let relative = self.i32()?;
        self.target(relative)
    }

    /// Switch operands start at the next multiple of 4 (relative to the code start)
    fn skip_padding(&mut self) -> Result<(), Error> {
        while self.reader.position() % 4 != 0 {
            self.u8()?;
        }
        Ok(())
    }

    fn constant(&mut self, wide: bool) -> Result<ConstantData, Error> {
        let index = ConstantIndex(if wide {
            self.u16()?
        } else {
            self.u8()? as u16
        });
        Ok(match self.constants.get(index)? {
            Constant::Integer(i) => ConstantData::Integer(*i),
            Constant::Float(f) => ConstantData::Float(*f),
            Constant::Long(l) => ConstantData::Long(*l),
            Constant::Double(d) => ConstantData::Double(*d),
            Constant::String(utf8) => ConstantData::String(self.constants.utf8(*utf8)?.to_owned()),
            Constant::Class(_) => ConstantData::Class(
                self.constants.class_ref(ClassConstantIndex(index))?,
            ),
            Constant::MethodHandle { .. } => ConstantData::MethodHandle,
            Constant::MethodType { descriptor } => {
                let descriptor = self.constants.utf8(*descriptor)?;
                ConstantData::MethodType(
                    MethodDescriptor::parse(descriptor)
                        .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?,
                )
            }
            Constant::Dynamic { name_and_type, .. } => {
                let (_, descriptor) = self.constants.name_and_type(*name_and_type)?;
                ConstantData::Dynamic(
                    FieldType::parse(descriptor)
                        .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?,
                )
            }
            _ => {
                return Err(Error::BadConstantIndex {
                    index,
                    expected: "loadable constant",
                })
            }
        })
    }

    fn class(&mut self) -> Result<ClassConstantIndex, Error> {
        Ok(ClassConstantIndex(ConstantIndex(self.u16()?)))
    }

    fn field(&mut self) -> Result<FieldRef, Error> {
        let index = FieldRefConstantIndex(ConstantIndex(self.u16()?));
        self.constants.field_ref(index)
    }

    fn method(&mut self) -> Result<MethodRef, Error> {
        let index = MethodRefConstantIndex(ConstantIndex(self.u16()?));
        self.constants.method_ref(index)
    }

    fn next_instruction(&mut self) -> Result<AnyInstruction, Error> {
        use AnyInstruction::{Branch, Regular};
        use BranchInstruction as B;
        use Instruction::*;

        let opcode = self.u8()?;
        let insn = match opcode {
            0x00 => Regular(Nop),
            0x01 => Regular(AConstNull),
            0x02 => Regular(IConstM1),
            0x03 => Regular(IConst0),
            0x04 => Regular(IConst1),
            0x05 => Regular(IConst2),
            0x06 => Regular(IConst3),
            0x07 => Regular(IConst4),
            0x08 => Regular(IConst5),
            0x09 => Regular(LConst0),
            0x0a => Regular(LConst1),
            0x0b => Regular(FConst0),
            0x0c => Regular(FConst1),
            0x0d => Regular(FConst2),
            0x0e => Regular(DConst0),
            0x0f => Regular(DConst1),
            0x10 => Regular(BiPush(self.i8()?)),
            0x11 => Regular(SiPush(self.i16()?)),
            0x12 => Regular(Ldc(self.constant(false)?)),
            0x13 => Regular(Ldc(self.constant(true)?)),
            0x14 => Regular(Ldc2(self.constant(true)?)),
            0x15 => Regular(ILoad(self.u8()? as u16)),
            0x16 => Regular(LLoad(self.u8()? as u16)),
            0x17 => Regular(FLoad(self.u8()? as u16)),
            0x18 => Regular(DLoad(self.u8()? as u16)),
            0x19 => Regular(ALoad(self.u8()? as u16)),
            0x1a..=0x1d => Regular(ILoad((opcode - 0x1a) as u16)),
            0x1e..=0x21 => Regular(LLoad((opcode - 0x1e) as u16)),
            0x22..=0x25 => Regular(FLoad((opcode - 0x22) as u16)),
            0x26..=0x29 => Regular(DLoad((opcode - 0x26) as u16)),
            0x2a..=0x2d => Regular(ALoad((opcode - 0x2a) as u16)),
            0x2e => Regular(IALoad),
            0x2f => Regular(LALoad),
            0x30 => Regular(FALoad),
            0x31 => Regular(DALoad),
            0x32 => Regular(AALoad),
            0x33 => Regular(BALoad),
            0x34 => Regular(CALoad),
            0x35 => Regular(SALoad),
            0x36 => Regular(IStore(self.u8()? as u16)),
            0x37 => Regular(LStore(self.u8()? as u16)),
            0x38 => Regular(FStore(self.u8()? as u16)),
            0x39 => Regular(DStore(self.u8()? as u16)),
            0x3a => Regular(AStore(self.u8()? as u16)),
            0x3b..=0x3e => Regular(IStore((opcode - 0x3b) as u16)),
            0x3f..=0x42 => Regular(LStore((opcode - 0x3f) as u16)),
            0x43..=0x46 => Regular(FStore((opcode - 0x43) as u16)),
            0x47..=0x4a => Regular(DStore((opcode - 0x47) as u16)),
            0x4b..=0x4e => Regular(AStore((opcode - 0x4b) as u16)),
            0x4f => Regular(IAStore),
            0x50 => Regular(LAStore),
            0x51 => Regular(FAStore),
            0x52 => Regular(DAStore),
            0x53 => Regular(AAStore),
            0x54 => Regular(BAStore),
            0x55 => Regular(CAStore),
            0x56 => Regular(SAStore),
            0x57 => Regular(Pop),
            0x58 => Regular(Pop2),
            0x59 => Regular(Dup),
            0x5a => Regular(DupX1),
            0x5b => Regular(DupX2),
            0x5c => Regular(Dup2),
            0x5d => Regular(Dup2X1),
            0x5e => Regular(Dup2X2),
            0x5f => Regular(Swap),
            0x60 => Regular(IAdd),
            0x61 => Regular(LAdd),
            0x62 => Regular(FAdd),
            0x63 => Regular(DAdd),
            0x64 => Regular(ISub),
            0x65 => Regular(LSub),
            0x66 => Regular(FSub),
            0x67 => Regular(DSub),
            0x68 => Regular(IMul),
            0x69 => Regular(LMul),
            0x6a => Regular(FMul),
            0x6b => Regular(DMul),
            0x6c => Regular(IDiv),
            0x6d => Regular(LDiv),
            0x6e => Regular(FDiv),
            0x6f => Regular(DDiv),
            0x70 => Regular(IRem),
            0x71 => Regular(LRem),
            0x72 => Regular(FRem),
            0x73 => Regular(DRem),
            0x74 => Regular(INeg),
            0x75 => Regular(LNeg),
            0x76 => Regular(FNeg),
            0x77 => Regular(DNeg),
            0x78 => Regular(ISh(ShiftType::Left)),
            0x79 => Regular(LSh(ShiftType::Left)),
            0x7a => Regular(ISh(ShiftType::ArithmeticRight)),
            0x7b => Regular(LSh(ShiftType::ArithmeticRight)),
            0x7c => Regular(ISh(ShiftType::LogicalRight)),
            0x7d => Regular(LSh(ShiftType::LogicalRight)),
            0x7e => Regular(IAnd),
            0x7f => Regular(LAnd),
            0x80 => Regular(IOr),
            0x81 => Regular(LOr),
            0x82 => Regular(IXor),
            0x83 => Regular(LXor),
            0x84 => {
                let index = self.u8()? as u16;
                let by = self.i8()? as i16;
                Regular(IInc(index, by))
            }
            0x85 => Regular(I2L),
            0x86 => Regular(I2F),
            0x87 => Regular(I2D),
            0x88 => Regular(L2I),
            0x89 => Regular(L2F),
            0x8a => Regular(L2D),
            0x8b => Regular(F2I),
            0x8c => Regular(F2L),
            0x8d => Regular(F2D),
            0x8e => Regular(D2I),
            0x8f => Regular(D2L),
            0x90 => Regular(D2F),
            0x91 => Regular(I2B),
            0x92 => Regular(I2C),
            0x93 => Regular(I2S),
            0x94 => Regular(LCmp),
            0x95 => Regular(FCmp(CompareMode::L)),
            0x96 => Regular(FCmp(CompareMode::G)),
            0x97 => Regular(DCmp(CompareMode::L)),
            0x98 => Regular(DCmp(CompareMode::G)),
            0x99 => Branch(B::If(OrdComparison::EQ, self.short_target()?)),
            0x9a => Branch(B::If(OrdComparison::NE, self.short_target()?)),
            0x9b => Branch(B::If(OrdComparison::LT, self.short_target()?)),
            0x9c => Branch(B::If(OrdComparison::GE, self.short_target()?)),
            0x9d => Branch(B::If(OrdComparison::GT, self.short_target()?)),
            0x9e => Branch(B::If(OrdComparison::LE, self.short_target()?)),
            0x9f => Branch(B::IfICmp(OrdComparison::EQ, self.short_target()?)),
            0xa0 => Branch(B::IfICmp(OrdComparison::NE, self.short_target()?)),
            0xa1 => Branch(B::IfICmp(OrdComparison::LT, self.short_target()?)),
            0xa2 => Branch(B::IfICmp(OrdComparison::GE, self.short_target()?)),
            0xa3 => Branch(B::IfICmp(OrdComparison::GT, self.short_target()?)),
            0xa4 => Branch(B::IfICmp(OrdComparison::LE, self.short_target()?)),
            0xa5 => Branch(B::IfACmp(EqComparison::EQ, self.short_target()?)),
            0xa6 => Branch(B::IfACmp(EqComparison::NE, self.short_target()?)),
            0xa7 => Branch(B::Goto(self.short_target()?)),
            0xa8 | 0xa9 | 0xc9 => {
                return Err(Error::UnsupportedOpcode {
                    offset: self.start,
                    opcode,
                })
            }
            0xaa => {
                self.skip_padding()?;
                let default = self.wide_target()?;
                let low = self.i32()?;
                let high = self.i32()?;
                if high < low {
                    return Err(Error::MalformedCode {
                        offset: self.start,
                        message: format!("tableswitch with low {} above high {}", low, high),
                    });
                }
                let mut targets = vec![];
                for _ in low..=high {
                    targets.push(self.wide_target()?);
                }
                Branch(B::TableSwitch {
                    default,
                    low,
                    targets,
                })
            }
            0xab => {
                self.skip_padding()?;
                let default = self.wide_target()?;
                let npairs = self.i32()?;
                if npairs < 0 {
                    return Err(Error::MalformedCode {
                        offset: self.start,
                        message: format!("lookupswitch with {} pairs", npairs),
                    });
                }
                let mut targets = vec![];
                for _ in 0..npairs {
                    let key = self.i32()?;
                    targets.push((key, self.wide_target()?));
                }
                Branch(B::LookupSwitch { default, targets })
            }
            0xac => Branch(B::IReturn),
            0xad => Branch(B::LReturn),
            0xae => Branch(B::FReturn),
            0xaf => Branch(B::DReturn),
            0xb0 => Branch(B::AReturn),
            0xb1 => Branch(B::Return),
            0xb2 => Regular(GetStatic(self.field()?)),
            0xb3 => Regular(PutStatic(self.field()?)),
            0xb4 => Regular(GetField(self.field()?)),
            0xb5 => Regular(PutField(self.field()?)),
            0xb6 => Regular(Invoke(InvokeType::Virtual, self.method()?)),
            0xb7 => Regular(Invoke(InvokeType::Special, self.method()?)),
            0xb8 => Regular(Invoke(InvokeType::Static, self.method()?)),
            0xb9 => {
                let method = self.method()?;
                let count = self.u8()?;
                let _zero = self.u8()?;
                Regular(Invoke(InvokeType::Interface(count), method))
            }
            0xba => {
                let index = ConstantIndex(self.u16()?);
                let _zeros = self.u16()?;
                let (name, descriptor) = self.constants.invoke_dynamic(index)?;
                Regular(InvokeDynamic(InvokeDynamicRef { name, descriptor }))
            }
            0xbb => {
                let class = self.class()?;
                Regular(New(self.constants.class_name(class)?))
            }
            0xbc => {
                let atype = self.u8()?;
                let base_type = match atype {
                    4 => BaseType::Boolean,
                    5 => BaseType::Char,
                    6 => BaseType::Float,
                    7 => BaseType::Double,
                    8 => BaseType::Byte,
                    9 => BaseType::Short,
                    10 => BaseType::Int,
                    11 => BaseType::Long,
                    _ => {
                        return Err(Error::MalformedCode {
                            offset: self.start,
                            message: format!("bad newarray type {}", atype),
                        })
                    }
                };
                Regular(NewArray(base_type))
            }
            0xbd => {
                let class = self.class()?;
                Regular(ANewArray(self.constants.class_ref(class)?))
            }
            0xbe => Regular(ArrayLength),
            0xbf => Branch(B::AThrow),
            0xc0 => {
                let class = self.class()?;
                Regular(CheckCast(self.constants.class_ref(class)?))
            }
            0xc1 => {
                let class = self.class()?;
                Regular(InstanceOf(self.constants.class_ref(class)?))
            }
            0xc2 => Regular(MonitorEnter),
            0xc3 => Regular(MonitorExit),
            0xc4 => self.wide_instruction()?,
            0xc5 => {
                let class = self.class()?;
                let dimensions = self.u8()?;
                Regular(MultiANewArray(self.constants.class_ref(class)?, dimensions))
            }
            0xc6 => Branch(B::IfNull(EqComparison::EQ, self.short_target()?)),
            0xc7 => Branch(B::IfNull(EqComparison::NE, self.short_target()?)),
            0xc8 => Branch(B::Goto(self.wide_target()?)),
            _ => {
                return Err(Error::InvalidOpcode {
                    offset: self.start,
                    opcode,
                })
            }
        };
        Ok(insn)
    }

    /// Instruction following a `wide` prefix
    fn wide_instruction(&mut self) -> Result<AnyInstruction, Error> {
        use Instruction::*;

        let opcode = self.u8()?;
        let insn = match opcode {
            0x15 => ILoad(self.u16()?),
            0x16 => LLoad(self.u16()?),
            0x17 => FLoad(self.u16()?),
            0x18 => DLoad(self.u16()?),
            0x19 => ALoad(self.u16()?),
            0x36 => IStore(self.u16()?),
            0x37 => LStore(self.u16()?),
            0x38 => FStore(self.u16()?),
            0x39 => DStore(self.u16()?),
            0x3a => AStore(self.u16()?),
            0x84 => {
                let index = self.u16()?;
                IInc(index, self.i16()?)
            }
            0xa9 => {
                return Err(Error::UnsupportedOpcode {
                    offset: self.start,
                    opcode,
                })
            }
            _ => {
                return Err(Error::InvalidOpcode {
                    offset: self.start,
                    opcode,
                })
            }
        };
        Ok(AnyInstruction::Regular(insn))
    }
}
