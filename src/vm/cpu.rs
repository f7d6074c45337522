use log::{debug, trace, warn};

use crate::vm::decode::decode;
use crate::vm::fifo::Fifo;
use crate::vm::instructions;
use crate::vm::memory::Memory;
use crate::vm::modrm::Operand;
use crate::vm::registers::{CpuFlag, Reg, Registers, SegmentType};
use crate::vm::Fault;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CpuType {
    Intel8086,
    #[default]
    Intel80186,
}

#[derive(Clone, Debug, Default)]
pub struct Emulator {
    pub cpu_type: CpuType,
    pub registers: Registers,
    pub memory: Memory,
    pub io: Memory,
    pub halted: bool,
}

impl Emulator {
    pub fn new(cpu_type: CpuType) -> Self {
        Self {
            cpu_type,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_186(&self) -> bool {
        self.cpu_type == CpuType::Intel80186
    }

    /// Decodes and executes exactly one instruction from `stream`, returning
    /// the number of bytes it occupied. On a fault the registers and both
    /// address spaces are left as they were.
    pub fn emulate(&mut self, stream: &mut Fifo<u8>) -> Result<usize, Fault> {
        let instruction = match decode(stream, &self.registers, self.cpu_type) {
            Ok(instruction) => instruction,
            Err(fault) => {
                match fault {
                    Fault::InvalidOpcode { .. } => warn!(
                        "{} at {:04X}:{:04X}",
                        fault,
                        self.registers.segment(SegmentType::CS),
                        self.registers.ip()
                    ),
                    Fault::StreamExhausted { .. } => debug!("{}", fault),
                }
                return Err(fault);
            }
        };

        trace!(
            "{:04X}:{:04X} {:02X} len={} {:?}",
            self.registers.segment(SegmentType::CS),
            self.registers.ip(),
            instruction.opcode,
            instruction.length,
            instruction.operand
        );

        let next = self.registers.ip().wrapping_add(instruction.length as u16);
        self.registers.set_ip(next);
        instructions::execute(self, &instruction);

        Ok(instruction.length)
    }

    #[inline]
    pub fn check_flag(&self, flag: CpuFlag) -> bool {
        self.registers.check_flag(flag)
    }

    #[inline]
    pub fn update_flag(&mut self, flag: CpuFlag, active: bool) {
        self.registers.update_flag(flag, active)
    }

    pub fn read_operand(&self, operand: Operand) -> u16 {
        match operand {
            Operand::Register(reg) => self.registers.get(reg),
            Operand::Memory { offset, width, .. } => self.memory.read(offset, width),
        }
    }

    pub fn write_operand(&mut self, operand: Operand, value: u16) {
        match operand {
            Operand::Register(reg) => self.registers.set(reg, value),
            Operand::Memory { offset, width, .. } => self.memory.write(offset, width, value),
        }
    }

    pub fn push_word(&mut self, word: u16) {
        let sp = self.registers.get(Reg::SP).wrapping_sub(2);
        self.registers.set(Reg::SP, sp);
        self.memory.write_word(sp, word);
    }

    pub fn pop_word(&mut self) -> u16 {
        let sp = self.registers.get(Reg::SP);
        self.registers.set(Reg::SP, sp.wrapping_add(2));
        self.memory.read_word(sp)
    }

    /// Takes interrupt `vector`: pushes FLAGS, CS and IP, masks IF and TF and
    /// jumps through the vector table at `vector * 4`.
    pub fn interrupt(&mut self, vector: u8) {
        let entry = (vector as u16) * 4;
        let new_ip = self.memory.read_word(entry);
        let new_cs = self.memory.read_word(entry.wrapping_add(2));
        debug!(
            "INT {:02X}h -> {:04X}:{:04X} from {:04X}:{:04X}",
            vector,
            new_cs,
            new_ip,
            self.registers.segment(SegmentType::CS),
            self.registers.ip()
        );

        self.push_word(self.registers.get_flags());
        self.registers.unset_flag(CpuFlag::Interrupt);
        self.registers.unset_flag(CpuFlag::Trap);
        self.push_word(self.registers.segment(SegmentType::CS));
        self.push_word(self.registers.ip());

        self.registers.set_segment(SegmentType::CS, new_cs);
        self.registers.set_ip(new_ip);
        self.halted = false;
    }
}
