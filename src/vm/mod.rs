pub mod cpu;
pub mod decode;
pub mod fifo;
pub mod instructions;
pub mod memory;
pub mod modrm;
pub mod registers;

use thiserror::Error;

pub use cpu::{CpuType, Emulator};
pub use fifo::{Fifo, FifoError};
pub use memory::Memory;
pub use modrm::Operand;
pub use registers::{CpuFlag, Reg, Registers, SegmentType};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    #[inline(always)]
    pub fn from_w(w: bool) -> Self {
        if w {
            Width::Word
        } else {
            Width::Byte
        }
    }

    #[inline(always)]
    pub const fn mask(self) -> u16 {
        match self {
            Width::Byte => 0x00FF,
            Width::Word => 0xFFFF,
        }
    }

    #[inline(always)]
    pub const fn sign_bit(self) -> u16 {
        match self {
            Width::Byte => 0x0080,
            Width::Word => 0x8000,
        }
    }

    #[inline(always)]
    pub const fn bytes(self) -> u16 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }
}

/// Why an instruction could not be emulated. Both leave the architectural
/// state untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("invalid opcode {opcode:#04x}")]
    InvalidOpcode { opcode: u8 },
    #[error("instruction stream exhausted after {consumed} bytes")]
    StreamExhausted { consumed: usize },
}
