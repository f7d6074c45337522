//! Firmware services reached through software interrupts.
//!
//! The emulation core never calls into this layer. A driver that sees an
//! `INT n` targeting one of the installed vectors snapshots the register
//! file into [`CallRegs`], lets [`Bios::call`] run the service against the
//! snapshot, then writes the snapshot back.

use log::debug;
use thiserror::Error;

use crate::vm::cpu::Emulator;
use crate::vm::memory::Memory;
use crate::vm::registers::CpuFlag;
use crate::vm::registers::{Reg, Registers, SegmentType};

pub mod handlers;


pub const FIRMWARE_SEGMENT: u16 = 0xF000;
/// One IRET stub per vector starts here, so a vector entry is always valid.
pub const STUB_BASE: u16 = 0xFE00;
/// Location of the system configuration table returned by INT 15h/C0h.
pub const CONFIG_TABLE_OFFSET: u16 = 0xE6F5;
/// Model byte 8 (bytes in table), then model FFh, submodel and revision 0.
pub const CONFIG_TABLE: [u8; 8] = [8, 0, 0xFF, 0, 0, 0, 0, 0];
pub const RESET_VECTOR: (u16, u16) = (0xFFFF, 0x0000);

const IRET: u8 = 0xCF;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BiosError {
    #[error("{0} Halted.")]
    Halted(String),
    #[error("no service installed for vector {vector:#04x}")]
    NoService { vector: u8 },
}

/// What the caller should do once a service returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Resume,
    Reboot,
}

/// Character sink for the teletype service.
pub trait Console {
    fn putchar(&mut self, byte: u8);

    fn putstr(&mut self, text: &str) {
        for byte in text.bytes() {
            self.putchar(byte);
        }
    }
}

impl Console for Vec<u8> {
    fn putchar(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// The registers a service can see and change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallRegs {
    pub ax: u16,
    pub bx: u16,
    pub cx: u16,
    pub dx: u16,
    pub si: u16,
    pub di: u16,
    pub bp: u16,
    pub ds: u16,
    pub es: u16,
    pub flags: u16,
}

impl CallRegs {
    pub fn capture(registers: &Registers) -> Self {
        Self {
            ax: registers.get(Reg::AX),
            bx: registers.get(Reg::BX),
            cx: registers.get(Reg::CX),
            dx: registers.get(Reg::DX),
            si: registers.get(Reg::SI),
            di: registers.get(Reg::DI),
            bp: registers.get(Reg::BP),
            ds: registers.segment(SegmentType::DS),
            es: registers.segment(SegmentType::ES),
            flags: registers.get_flags(),
        }
    }

    pub fn apply(&self, registers: &mut Registers) {
        registers.set(Reg::AX, self.ax);
        registers.set(Reg::BX, self.bx);
        registers.set(Reg::CX, self.cx);
        registers.set(Reg::DX, self.dx);
        registers.set(Reg::SI, self.si);
        registers.set(Reg::DI, self.di);
        registers.set(Reg::BP, self.bp);
        registers.set_segment(SegmentType::DS, self.ds);
        registers.set_segment(SegmentType::ES, self.es);
        registers.set_flags(self.flags);
    }

    #[inline]
    pub fn ah(&self) -> u8 {
        (self.ax >> 8) as u8
    }

    #[inline]
    pub fn al(&self) -> u8 {
        self.ax as u8
    }

    #[inline]
    pub fn set_ah(&mut self, value: u8) {
        self.ax = (self.ax & 0x00FF) | ((value as u16) << 8);
    }

    pub fn set_carry(&mut self, carry: bool) {
        if carry {
            self.flags |= CpuFlag::Carry.mask();
        } else {
            self.flags &= !CpuFlag::Carry.mask();
        }
    }

    #[inline]
    pub fn carry(&self) -> bool {
        self.flags & CpuFlag::Carry.mask() != 0
    }
}

/// What a running service gets besides the registers.
pub struct Context<'a> {
    pub console: &'a mut dyn Console,
    /// The firmware's own code segment.
    pub segment: u16,
}

pub type Service = fn(&mut Context<'_>, &mut CallRegs) -> Result<Outcome, BiosError>;

#[derive(Clone)]
pub struct VectorTable {
    services: [Option<Service>; 256],
}

impl Default for VectorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorTable {
    pub fn new() -> Self {
        Self {
            services: [None; 256],
        }
    }

    /// The services of the stock firmware, INT 10h to 1Ch.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(0x10, handlers::int10);
        table.register(0x11, handlers::int11);
        table.register(0x14, handlers::int14);
        table.register(0x15, handlers::int15);
        table.register(0x17, handlers::int17);
        table.register(0x18, handlers::int18);
        table.register(0x19, handlers::int19);
        table.register(0x1A, handlers::int1a);
        table.register(0x1B, handlers::int1b);
        table.register(0x1C, handlers::int1c);
        table
    }

    pub fn register(&mut self, vector: u8, service: Service) {
        self.services[vector as usize] = Some(service);
    }

    #[inline]
    pub fn get(&self, vector: u8) -> Option<Service> {
        self.services[vector as usize]
    }

    pub fn vectors(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|&vector| self.services[vector as usize].is_some())
    }

    /// Points every registered vector at its IRET stub in `segment` and
    /// lays down the stubs and the configuration table.
    pub fn install(&self, memory: &mut Memory, segment: u16) {
        for vector in self.vectors() {
            let stub = stub_offset(vector);
            memory.write_byte(stub, IRET);
            let entry = vector as u16 * 4;
            memory.write_word(entry, stub);
            memory.write_word(entry.wrapping_add(2), segment);
        }
        memory.copy_data(CONFIG_TABLE_OFFSET, &CONFIG_TABLE);
        debug!("installed {} vectors at {:04X}", self.vectors().count(), segment);
    }
}

#[inline]
pub fn stub_offset(vector: u8) -> u16 {
    STUB_BASE.wrapping_add(vector as u16)
}

pub struct Bios<C: Console> {
    vectors: VectorTable,
    console: C,
    segment: u16,
}

impl<C: Console> Bios<C> {
    pub fn new(vectors: VectorTable, console: C) -> Self {
        Self {
            vectors,
            console,
            segment: FIRMWARE_SEGMENT,
        }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn vectors(&self) -> &VectorTable {
        &self.vectors
    }

    pub fn install(&self, memory: &mut Memory) {
        self.vectors.install(memory, self.segment);
    }

    pub fn call(&mut self, vector: u8, regs: &mut CallRegs) -> Result<Outcome, BiosError> {
        let service = self
            .vectors
            .get(vector)
            .ok_or(BiosError::NoService { vector })?;
        debug!("INT {:02X}h AX={:04X}", vector, regs.ax);

        let mut context = Context {
            console: &mut self.console,
            segment: self.segment,
        };
        service(&mut context, regs)
    }

    /// Services `vector` directly on an emulator's register file. A reboot
    /// leaves the processor at the reset vector.
    pub fn dispatch(&mut self, vm: &mut Emulator, vector: u8) -> Result<Outcome, BiosError> {
        let mut regs = CallRegs::capture(&vm.registers);
        let outcome = self.call(vector, &mut regs)?;
        regs.apply(&mut vm.registers);

        if outcome == Outcome::Reboot {
            let (cs, ip) = RESET_VECTOR;
            vm.registers.set_segment(SegmentType::CS, cs);
            vm.registers.set_ip(ip);
            vm.halted = false;
        }
        Ok(outcome)
    }
}
