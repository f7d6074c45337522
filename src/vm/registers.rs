use crate::vm::Width;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CpuFlag {
    Carry = 0,
    Parity = 2,
    AuxCarry = 4,
    Zero = 6,
    Sign = 7,
    Trap = 8,
    Interrupt = 9,
    Directional = 10,
    Overflow = 11,
}

impl CpuFlag {
    #[inline(always)]
    pub const fn mask(self) -> u16 {
        1u16 << (self as u8)
    }
}

/// Bits that can hold a value on the 8086. Everything else is hardwired.
pub const FLAGS_WRITABLE: u16 = 0x0FD5;
/// Bits 1 and 12-15 always read as one.
pub const FLAGS_STUCK_BITS: u16 = 0xF002;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentType {
    ES = 0b_00,
    CS = 0b_01,
    SS = 0b_10,
    DS = 0b_11,
}

impl From<u8> for SegmentType {
    fn from(value: u8) -> Self {
        match value & 0b_11 {
            0b_00 => SegmentType::ES,
            0b_01 => SegmentType::CS,
            0b_10 => SegmentType::SS,
            _ => SegmentType::DS,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reg {
    AX,
    CX,
    DX,
    BX,
    SP,
    BP,
    SI,
    DI,
    AL,
    CL,
    DL,
    BL,
    AH,
    CH,
    DH,
    BH,
}

#[cfg(target_endian = "big")]
pub const LOW_IDX: usize = 1;
#[cfg(target_endian = "little")]
pub const LOW_IDX: usize = 0;

#[cfg(target_endian = "big")]
pub const HIGH_IDX: usize = 0;
#[cfg(target_endian = "little")]
pub const HIGH_IDX: usize = 1;

impl Reg {
    const WORDS: [Reg; 8] = [
        Reg::AX,
        Reg::CX,
        Reg::DX,
        Reg::BX,
        Reg::SP,
        Reg::BP,
        Reg::SI,
        Reg::DI,
    ];
    const BYTES: [Reg; 8] = [
        Reg::AL,
        Reg::CL,
        Reg::DL,
        Reg::BL,
        Reg::AH,
        Reg::CH,
        Reg::DH,
        Reg::BH,
    ];

    #[inline]
    pub fn from_field(field: u8, width: Width) -> Self {
        match width {
            Width::Byte => Self::BYTES[(field & 0b111) as usize],
            Width::Word => Self::WORDS[(field & 0b111) as usize],
        }
    }

    #[inline]
    pub fn width(self) -> Width {
        match self {
            Reg::AX | Reg::CX | Reg::DX | Reg::BX | Reg::SP | Reg::BP | Reg::SI | Reg::DI => {
                Width::Word
            }
            _ => Width::Byte,
        }
    }

    /// Index of the 16-bit register that owns the storage, and the byte of
    /// that storage this view covers (`None` for the full word).
    #[inline]
    fn view(self) -> (usize, Option<usize>) {
        match self {
            Reg::AX => (0, None),
            Reg::CX => (1, None),
            Reg::DX => (2, None),
            Reg::BX => (3, None),
            Reg::SP => (4, None),
            Reg::BP => (5, None),
            Reg::SI => (6, None),
            Reg::DI => (7, None),
            Reg::AL => (0, Some(LOW_IDX)),
            Reg::CL => (1, Some(LOW_IDX)),
            Reg::DL => (2, Some(LOW_IDX)),
            Reg::BL => (3, Some(LOW_IDX)),
            Reg::AH => (0, Some(HIGH_IDX)),
            Reg::CH => (1, Some(HIGH_IDX)),
            Reg::DH => (2, Some(HIGH_IDX)),
            Reg::BH => (3, Some(HIGH_IDX)),
        }
    }
}

/// A 16-bit register stored as native-endian bytes so the 8-bit halves are
/// plain indexed views of the same storage.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Register {
    bytes: [u8; 2],
}

impl Register {
    #[inline(always)]
    pub fn word(&self) -> u16 {
        u16::from_ne_bytes(self.bytes)
    }

    #[inline(always)]
    pub fn set(&mut self, word: u16) {
        self.bytes = word.to_ne_bytes();
    }
}

impl std::fmt::Debug for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}", self.word())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registers {
    general: [Register; 8],
    segments: [u16; 4],
    ip: u16,
    flags: u16,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    pub fn new() -> Self {
        Self {
            general: [Register::default(); 8],
            segments: [0; 4],
            ip: 0,
            flags: FLAGS_STUCK_BITS,
        }
    }

    #[inline(always)]
    pub fn get(&self, reg: Reg) -> u16 {
        match reg.view() {
            (index, None) => self.general[index].word(),
            (index, Some(byte)) => self.general[index].bytes[byte] as u16,
        }
    }

    /// Writes `value` to `reg`. Byte views only take the low byte of `value`
    /// and never touch the other half of the parent register.
    #[inline(always)]
    pub fn set(&mut self, reg: Reg, value: u16) {
        match reg.view() {
            (index, None) => self.general[index].set(value),
            (index, Some(byte)) => self.general[index].bytes[byte] = value as u8,
        }
    }

    #[inline(always)]
    pub fn get_field(&self, field: u8, width: Width) -> u16 {
        self.get(Reg::from_field(field, width))
    }

    #[inline(always)]
    pub fn set_field(&mut self, field: u8, width: Width, value: u16) {
        self.set(Reg::from_field(field, width), value)
    }

    #[inline(always)]
    pub fn segment(&self, segment: SegmentType) -> u16 {
        self.segments[segment as usize]
    }

    #[inline(always)]
    pub fn set_segment(&mut self, segment: SegmentType, value: u16) {
        self.segments[segment as usize] = value;
    }

    #[inline(always)]
    pub fn ip(&self) -> u16 {
        self.ip
    }

    #[inline(always)]
    pub fn set_ip(&mut self, ip: u16) {
        self.ip = ip;
    }

    #[inline(always)]
    pub fn get_flags(&self) -> u16 {
        (self.flags & FLAGS_WRITABLE) | FLAGS_STUCK_BITS
    }

    #[inline(always)]
    pub fn set_flags(&mut self, value: u16) {
        self.flags = (value & FLAGS_WRITABLE) | FLAGS_STUCK_BITS;
    }

    /// Replaces only the bits selected by `mask`.
    #[inline(always)]
    pub fn update_flags(&mut self, value: u16, mask: u16) {
        self.set_flags((self.flags & !mask) | (value & mask));
    }

    #[inline(always)]
    pub fn set_flag(&mut self, flag: CpuFlag) {
        self.flags |= flag.mask();
    }

    #[inline(always)]
    pub fn unset_flag(&mut self, flag: CpuFlag) {
        self.flags &= !flag.mask();
    }

    #[inline(always)]
    pub fn update_flag(&mut self, flag: CpuFlag, active: bool) {
        if active {
            self.set_flag(flag);
        } else {
            self.unset_flag(flag);
        }
    }

    #[inline(always)]
    pub fn flip_flag(&mut self, flag: CpuFlag) {
        self.update_flag(flag, !self.check_flag(flag));
    }

    #[inline(always)]
    pub fn check_flag(&self, flag: CpuFlag) -> bool {
        (self.flags & flag.mask()) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_view_keeps_high_byte() {
        let mut registers = Registers::new();
        registers.set(Reg::AX, 0x1234);
        registers.set(Reg::AL, 0xCD);
        assert_eq!(registers.get(Reg::AX), 0x12CD);
        assert_eq!(registers.get(Reg::AH), 0x12);
    }

    #[test]
    fn high_view_keeps_low_byte() {
        let mut registers = Registers::new();
        registers.set(Reg::BX, 0x1234);
        registers.set(Reg::BH, 0xAB);
        assert_eq!(registers.get(Reg::BX), 0xAB34);
        assert_eq!(registers.get(Reg::BL), 0x34);
    }

    #[test]
    fn word_write_overwrites_both_views() {
        let mut registers = Registers::new();
        registers.set(Reg::CL, 0x11);
        registers.set(Reg::CH, 0x22);
        registers.set(Reg::CX, 0xBEEF);
        assert_eq!(registers.get(Reg::CL), 0xEF);
        assert_eq!(registers.get(Reg::CH), 0xBE);
    }

    #[test]
    fn byte_view_ignores_high_bits_of_value() {
        let mut registers = Registers::new();
        registers.set(Reg::DX, 0x0000);
        registers.set(Reg::DL, 0xFF42);
        assert_eq!(registers.get(Reg::DX), 0x0042);
    }

    #[test]
    fn field_decoding_follows_modrm_order() {
        let mut registers = Registers::new();
        registers.set(Reg::SP, 0x1111);
        registers.set(Reg::AX, 0x2233);
        assert_eq!(registers.get_field(0b100, Width::Word), 0x1111);
        assert_eq!(registers.get_field(0b100, Width::Byte), 0x22);
        registers.set_field(0b111, Width::Byte, 0x99);
        assert_eq!(registers.get(Reg::BH), 0x99);
        assert_eq!(Reg::from_field(0b101, Width::Word), Reg::BP);
        assert_eq!(Reg::from_field(0b101, Width::Byte), Reg::CH);
    }

    #[test]
    fn segments_do_not_overlap() {
        let mut registers = Registers::new();
        registers.set_segment(SegmentType::ES, 0x1000);
        registers.set_segment(SegmentType::SS, 0x2000);
        assert_eq!(registers.segment(SegmentType::ES), 0x1000);
        assert_eq!(registers.segment(SegmentType::SS), 0x2000);
        assert_eq!(registers.segment(SegmentType::CS), 0);
        assert_eq!(registers.segment(SegmentType::DS), 0);
    }

    #[test]
    fn hardwired_flag_bits() {
        let mut registers = Registers::new();
        assert_eq!(registers.get_flags(), 0xF002);
        registers.set_flags(0x0000);
        assert_eq!(registers.get_flags(), 0xF002);
        registers.set_flags(0xFFFF);
        assert_eq!(registers.get_flags(), 0xFFD7);
    }

    #[test]
    fn single_flag_updates_preserve_other_bits() {
        let mut registers = Registers::new();
        registers.set_flags(CpuFlag::Interrupt.mask() | CpuFlag::Zero.mask());
        registers.set_flag(CpuFlag::Carry);
        registers.unset_flag(CpuFlag::Zero);
        registers.flip_flag(CpuFlag::Overflow);
        assert_eq!(
            registers.get_flags(),
            0xF002 | CpuFlag::Interrupt.mask() | CpuFlag::Carry.mask() | CpuFlag::Overflow.mask()
        );
    }

    #[test]
    fn masked_flag_update() {
        let mut registers = Registers::new();
        registers.set_flags(0x00FF);
        registers.update_flags(0x0000, CpuFlag::Carry.mask() | CpuFlag::Sign.mask());
        assert!(!registers.check_flag(CpuFlag::Carry));
        assert!(!registers.check_flag(CpuFlag::Sign));
        assert!(registers.check_flag(CpuFlag::Zero));
        assert!(registers.check_flag(CpuFlag::Parity));
    }
}
