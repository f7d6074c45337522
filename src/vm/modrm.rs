use crate::vm::decode::Fetcher;
use crate::vm::registers::{Reg, Registers, SegmentType};
use crate::vm::{Fault, Width};

/// The r/m encoding that means "direct address" when mod is 00.
const DIRECT_ADDR: u8 = 0b110;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModType {
    /// No displacement (except the direct address form).
    MemoryMode0,
    MemoryMode8,
    MemoryMode16,
    RegisterMode,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ModRM {
    pub mode: ModType,
    pub reg: u8,
    pub rm: u8,
}

impl ModRM {
    pub fn from_byte(byte: u8) -> Self {
        let mode = match byte >> 6 {
            0b00 => ModType::MemoryMode0,
            0b01 => ModType::MemoryMode8,
            0b10 => ModType::MemoryMode16,
            _ => ModType::RegisterMode,
        };
        Self {
            mode,
            reg: (byte >> 3) & 0b111,
            rm: byte & 0b111,
        }
    }

    #[inline]
    pub fn is_register(&self) -> bool {
        self.mode == ModType::RegisterMode
    }
}

/// Where an instruction reads from or writes to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(Reg),
    Memory {
        segment: SegmentType,
        offset: u16,
        width: Width,
    },
}

impl Operand {
    pub fn width(&self) -> Width {
        match self {
            Operand::Register(reg) => reg.width(),
            Operand::Memory { width, .. } => *width,
        }
    }

    /// The location `displacement` bytes further on. Registers have no
    /// neighbours, so they yield `None`.
    pub fn advance(self, displacement: u16) -> Option<Self> {
        match self {
            Operand::Register(_) => None,
            Operand::Memory {
                segment,
                offset,
                width,
            } => Some(Operand::Memory {
                segment,
                offset: offset.wrapping_add(displacement),
                width,
            }),
        }
    }
}

/// Base + index part of the effective address for `rm`, together with the
/// segment that form defaults to. For rm = 110 this is the BP form; the
/// direct address form is handled by the caller.
#[inline(always)]
pub fn rm_address(registers: &Registers, rm: u8) -> (u16, SegmentType) {
    let bx = registers.get(Reg::BX);
    let bp = registers.get(Reg::BP);
    let si = registers.get(Reg::SI);
    let di = registers.get(Reg::DI);
    match rm & 0b111 {
        0b000 => (bx.wrapping_add(si), SegmentType::DS),
        0b001 => (bx.wrapping_add(di), SegmentType::DS),
        0b010 => (bp.wrapping_add(si), SegmentType::SS),
        0b011 => (bp.wrapping_add(di), SegmentType::SS),
        0b100 => (si, SegmentType::DS),
        0b101 => (di, SegmentType::DS),
        0b110 => (bp, SegmentType::SS),
        _ => (bx, SegmentType::DS),
    }
}

/// Resolves the r/m half of `modrm`, consuming any displacement bytes.
pub fn decode_rm(
    fetch: &mut Fetcher<'_>,
    registers: &Registers,
    modrm: ModRM,
    width: Width,
    segment_override: Option<SegmentType>,
) -> Result<Operand, Fault> {
    let (offset, segment) = match modrm.mode {
        ModType::RegisterMode => {
            return Ok(Operand::Register(Reg::from_field(modrm.rm, width)));
        }
        ModType::MemoryMode0 if modrm.rm == DIRECT_ADDR => (fetch.fetch_word()?, SegmentType::DS),
        ModType::MemoryMode0 => rm_address(registers, modrm.rm),
        ModType::MemoryMode8 => {
            let displacement = fetch.fetch_byte()? as i8 as i16;
            let (address, segment) = rm_address(registers, modrm.rm);
            (address.wrapping_add_signed(displacement), segment)
        }
        ModType::MemoryMode16 => {
            let displacement = fetch.fetch_word()?;
            let (address, segment) = rm_address(registers, modrm.rm);
            (address.wrapping_add(displacement), segment)
        }
    };

    Ok(Operand::Memory {
        segment: segment_override.unwrap_or(segment),
        offset,
        width,
    })
}
