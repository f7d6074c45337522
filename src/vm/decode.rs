use crate::vm::cpu::CpuType;
use crate::vm::fifo::Fifo;
use crate::vm::modrm::{decode_rm, ModRM, Operand};
use crate::vm::registers::{Reg, Registers, SegmentType};
use crate::vm::{Fault, Width};

pub struct Fetcher<'a> {
    stream: &'a mut Fifo<u8>,
    consumed: usize,
}

impl<'a> Fetcher<'a> {
    pub fn new(stream: &'a mut Fifo<u8>) -> Self {
        Self {
            stream,
            consumed: 0,
        }
    }

    #[inline]
    pub fn fetch_byte(&mut self) -> Result<u8, Fault> {
        let byte = self.stream.pop().map_err(|_| Fault::StreamExhausted {
            consumed: self.consumed,
        })?;
        self.consumed += 1;
        Ok(byte)
    }

    #[inline]
    pub fn fetch_word(&mut self) -> Result<u16, Fault> {
        let low = self.fetch_byte()?;
        let high = self.fetch_byte()?;
        Ok(u16::from_le_bytes([low, high]))
    }

    pub fn fetch(&mut self, width: Width) -> Result<u16, Fault> {
        match width {
            Width::Byte => self.fetch_byte().map(u16::from),
            Width::Word => self.fetch_word(),
        }
    }

    #[inline]
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

/// Repeat prefix of a string instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rep {
    /// F3: REP, or REPE/REPZ for CMPS and SCAS.
    WhileZero,
    /// F2: REPNE/REPNZ.
    WhileNotZero,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Prefixes {
    pub segment: Option<SegmentType>,
    pub rep: Option<Rep>,
    pub lock: bool,
}

/// Bytes that follow an opcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    Implied,
    /// ModRM byte plus displacement; the r/m operand has the given width.
    ModRm(Width),
    /// ModRM plus displacement, then an immediate of the second width.
    ModRmImm(Width, Width),
    /// F6/F7: ModRM, with an immediate only for the TEST extensions.
    Group3(Width),
    Imm(Width),
    /// Offset word then segment word.
    FarPointer,
    /// ENTER: frame size word then nesting level byte.
    Enter,
}

/// Operand layout of `opcode`, or `None` if the opcode does not exist on
/// `cpu_type`.
pub fn shape(opcode: u8, cpu_type: CpuType) -> Option<Shape> {
    use Shape::*;
    use Width::{Byte, Word};

    let is_186 = cpu_type == CpuType::Intel80186;
    let w = Width::from_w(opcode & 0b1 != 0);

    Some(match opcode {
        // ALU block, segment push/pop, prefixes and decimal adjust
        0x00..=0x3F => match opcode & 0b111 {
            0b000..=0b011 => ModRm(w),
            0b100 => Imm(Byte),
            0b101 => Imm(Word),
            _ if opcode == 0x0F && is_186 => return None,
            _ => Implied,
        },
        // INC, DEC, PUSH, POP reg
        0x40..=0x5F => Implied,
        // PUSHA, POPA
        0x60 | 0x61 if is_186 => Implied,
        // BOUND
        0x62 if is_186 => ModRm(Word),
        // PUSH imm16
        0x68 if is_186 => Imm(Word),
        // IMUL reg,r/m,imm16
        0x69 if is_186 => ModRmImm(Word, Word),
        // PUSH imm8
        0x6A if is_186 => Imm(Byte),
        // IMUL reg,r/m,imm8
        0x6B if is_186 => ModRmImm(Word, Byte),
        // INS, OUTS
        0x6C..=0x6F if is_186 => Implied,
        // Jcc
        0x70..=0x7F => Imm(Byte),
        0x80 | 0x82 => ModRmImm(Byte, Byte),
        0x81 => ModRmImm(Word, Word),
        0x83 => ModRmImm(Word, Byte),
        // TEST, XCHG, MOV
        0x84..=0x8B => ModRm(w),
        // MOV sreg, LEA, POP r/m
        0x8C..=0x8F => ModRm(Word),
        // XCHG AX, CBW, CWD
        0x90..=0x99 => Implied,
        0x9A => FarPointer,
        // WAIT, PUSHF, POPF, SAHF, LAHF
        0x9B..=0x9F => Implied,
        // MOV ac,moffs / moffs,ac
        0xA0..=0xA3 => Imm(Word),
        0xA4..=0xA7 => Implied,
        0xA8 | 0xA9 => Imm(w),
        0xAA..=0xAF => Implied,
        0xB0..=0xB7 => Imm(Byte),
        0xB8..=0xBF => Imm(Word),
        // Shift r/m,imm8
        0xC0 | 0xC1 if is_186 => ModRmImm(w, Byte),
        0xC2 => Imm(Word),
        0xC3 => Implied,
        // LES, LDS
        0xC4 | 0xC5 => ModRm(Word),
        0xC6 | 0xC7 => ModRmImm(w, w),
        0xC8 if is_186 => Enter,
        0xC9 if is_186 => Implied,
        0xCA => Imm(Word),
        0xCB | 0xCC => Implied,
        0xCD => Imm(Byte),
        0xCE | 0xCF => Implied,
        0xD0..=0xD3 => ModRm(w),
        // AAM, AAD
        0xD4 | 0xD5 => Imm(Byte),
        0xD7 => Implied,
        // ESC
        0xD8..=0xDF => ModRm(Word),
        // LOOPNE, LOOPE, LOOP, JCXZ, IN/OUT imm8
        0xE0..=0xE7 => Imm(Byte),
        0xE8 | 0xE9 => Imm(Word),
        0xEA => FarPointer,
        0xEB => Imm(Byte),
        0xEC..=0xEF => Implied,
        0xF0 | 0xF2..=0xF5 => Implied,
        0xF6 | 0xF7 => Group3(w),
        0xF8..=0xFD => Implied,
        0xFE | 0xFF => ModRm(w),
        _ => return None,
    })
}

/// Whether the reg field (and mode) of `modrm` names an existing
/// instruction for a group opcode.
fn extension_valid(opcode: u8, modrm: ModRM) -> bool {
    match opcode {
        // MOV r/m,sreg / sreg,r/m
        0x8C | 0x8E => modrm.reg < 4,
        // POP r/m, MOV r/m,imm
        0x8F | 0xC6 | 0xC7 => modrm.reg == 0,
        // INC, DEC
        0xFE => modrm.reg <= 1,
        // Far CALL/JMP need a memory operand
        0xFF => modrm.reg != 7 && !(modrm.is_register() && matches!(modrm.reg, 3 | 5)),
        // BOUND, LEA, LES, LDS
        0x62 | 0x8D | 0xC4 | 0xC5 => !modrm.is_register(),
        _ => true,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub prefixes: Prefixes,
    pub opcode: u8,
    pub modrm: Option<ModRM>,
    /// Resolved r/m operand, present whenever `modrm` is.
    pub operand: Option<Operand>,
    pub imm: u16,
    /// Second immediate: the segment of a far pointer or ENTER's level.
    pub imm2: u16,
    pub length: usize,
}

impl Instruction {
    /// The r/m operand. Only meaningful for opcodes that carry a ModRM byte.
    #[inline]
    pub fn rm(&self) -> Operand {
        match self.operand {
            Some(operand) => operand,
            None => unreachable!("opcode {:#04x} has no r/m operand", self.opcode),
        }
    }

    #[inline]
    pub fn reg(&self) -> u8 {
        self.modrm.map_or(0, |modrm| modrm.reg)
    }

    #[inline]
    pub fn reg_operand(&self, width: Width) -> Operand {
        Operand::Register(Reg::from_field(self.reg(), width))
    }

    /// Segment for DS-relative accesses after any override.
    #[inline]
    pub fn data_segment(&self) -> SegmentType {
        self.prefixes.segment.unwrap_or(SegmentType::DS)
    }

    fn decode_modrm(
        &mut self,
        fetch: &mut Fetcher<'_>,
        registers: &Registers,
        width: Width,
    ) -> Result<ModRM, Fault> {
        let modrm = ModRM::from_byte(fetch.fetch_byte()?);
        if !extension_valid(self.opcode, modrm) {
            return Err(Fault::InvalidOpcode {
                opcode: self.opcode,
            });
        }
        let operand = decode_rm(fetch, registers, modrm, width, self.prefixes.segment)?;
        self.modrm = Some(modrm);
        self.operand = Some(operand);
        Ok(modrm)
    }
}

/// Decodes one instruction off `stream`. Register values are only read to
/// resolve effective addresses; nothing is modified.
pub fn decode(
    stream: &mut Fifo<u8>,
    registers: &Registers,
    cpu_type: CpuType,
) -> Result<Instruction, Fault> {
    let mut fetch = Fetcher::new(stream);
    let mut prefixes = Prefixes::default();

    let opcode = loop {
        let byte = fetch.fetch_byte()?;
        match byte {
            // ES: CS: SS: DS:
            0x26 | 0x2E | 0x36 | 0x3E => prefixes.segment = Some(SegmentType::from(byte >> 3)),
            // LOCK
            0xF0 => prefixes.lock = true,
            // REPNE
            0xF2 => prefixes.rep = Some(Rep::WhileNotZero),
            // REP / REPE
            0xF3 => prefixes.rep = Some(Rep::WhileZero),
            _ => break byte,
        }
    };

    let shape = shape(opcode, cpu_type).ok_or(Fault::InvalidOpcode { opcode })?;
    let mut instruction = Instruction {
        prefixes,
        opcode,
        modrm: None,
        operand: None,
        imm: 0,
        imm2: 0,
        length: 0,
    };

    match shape {
        Shape::Implied => {}
        Shape::ModRm(width) => {
            instruction.decode_modrm(&mut fetch, registers, width)?;
        }
        Shape::ModRmImm(width, imm) => {
            instruction.decode_modrm(&mut fetch, registers, width)?;
            instruction.imm = fetch.fetch(imm)?;
        }
        Shape::Group3(width) => {
            let modrm = instruction.decode_modrm(&mut fetch, registers, width)?;
            // TEST r/m,imm (reg 1 is an alias of 0)
            if modrm.reg <= 1 {
                instruction.imm = fetch.fetch(width)?;
            }
        }
        Shape::Imm(width) => instruction.imm = fetch.fetch(width)?,
        Shape::FarPointer => {
            instruction.imm = fetch.fetch_word()?;
            instruction.imm2 = fetch.fetch_word()?;
        }
        Shape::Enter => {
            instruction.imm = fetch.fetch_word()?;
            instruction.imm2 = fetch.fetch_byte()? as u16;
        }
    }

    instruction.length = fetch.consumed();
    Ok(instruction)
}
