use crate::vm::Width;

/// Size of one address space. Offsets are 16 bits wide, so every access
/// wraps modulo this size.
pub const SPACE_SIZE: usize = 1 << 16;

/// A flat, byte-addressable 64 KiB space. The emulator owns two of them: main
/// memory and I/O port space.
#[derive(Clone)]
pub struct Memory {
    data: Box<[u8]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; SPACE_SIZE].into_boxed_slice(),
        }
    }

    #[inline(always)]
    pub fn read_byte(&self, offset: u16) -> u8 {
        self.data[offset as usize]
    }

    #[inline(always)]
    pub fn write_byte(&mut self, offset: u16, value: u8) {
        self.data[offset as usize] = value;
    }

    /// Little-endian word at `offset`; the high byte comes from
    /// `offset + 1` modulo 0x10000.
    #[inline(always)]
    pub fn read_word(&self, offset: u16) -> u16 {
        u16::from_le_bytes([
            self.read_byte(offset),
            self.read_byte(offset.wrapping_add(1)),
        ])
    }

    #[inline(always)]
    pub fn write_word(&mut self, offset: u16, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_byte(offset, low);
        self.write_byte(offset.wrapping_add(1), high);
    }

    pub fn read(&self, offset: u16, width: Width) -> u16 {
        match width {
            Width::Byte => self.read_byte(offset) as u16,
            Width::Word => self.read_word(offset),
        }
    }

    pub fn write(&mut self, offset: u16, width: Width, value: u16) {
        match width {
            Width::Byte => self.write_byte(offset, value as u8),
            Width::Word => self.write_word(offset, value),
        }
    }

    pub fn copy_data(&mut self, offset: u16, data: &[u8]) {
        let mut address = offset;
        for &byte in data {
            self.write_byte(address, byte);
            address = address.wrapping_add(1);
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.data.iter().filter(|&&b| b != 0).count();
        write!(f, "Memory {{ {} non-zero bytes }}", used)
    }
}
