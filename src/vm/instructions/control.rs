use log::debug;

use crate::utils::number::extend_sign;
use crate::vm::cpu::Emulator;
use crate::vm::decode::Instruction;
use crate::vm::modrm::Operand;
use crate::vm::registers::CpuFlag::*;
use crate::vm::registers::{Reg, SegmentType};
use crate::vm::Width;

use super::alu::inc_dec;

/// Evaluates the low nibble of a Jcc opcode.
pub(super) fn condition(vm: &Emulator, code: u8) -> bool {
    let taken = match code >> 1 {
        // JO / JNO
        0b_000 => vm.check_flag(Overflow),
        // JB,JNAE / JAE,JNB
        0b_001 => vm.check_flag(Carry),
        // JE,JZ / JNE,JNZ
        0b_010 => vm.check_flag(Zero),
        // JBE,JNA / JA,JNBE
        0b_011 => vm.check_flag(Carry) || vm.check_flag(Zero),
        // JS / JNS
        0b_100 => vm.check_flag(Sign),
        // JP,JPE / JNP,JPO
        0b_101 => vm.check_flag(Parity),
        // JL,JNGE / JGE,JNL
        0b_110 => vm.check_flag(Sign) != vm.check_flag(Overflow),
        // JLE,JNG / JG,JNLE
        _ => vm.check_flag(Zero) || (vm.check_flag(Sign) != vm.check_flag(Overflow)),
    };
    // Odd codes are the negated forms.
    taken != (code & 1 != 0)
}

#[inline]
pub(super) fn jump_relative(vm: &mut Emulator, displacement: u16) {
    let ip = vm.registers.ip().wrapping_add(displacement);
    vm.registers.set_ip(ip);
}

pub(super) fn jump_far(vm: &mut Emulator, ip: u16, cs: u16) {
    vm.registers.set_segment(SegmentType::CS, cs);
    vm.registers.set_ip(ip);
}

pub(super) fn call_near(vm: &mut Emulator, displacement: u16) {
    vm.push_word(vm.registers.ip());
    jump_relative(vm, displacement);
}

pub(super) fn call_far(vm: &mut Emulator, ip: u16, cs: u16) {
    vm.push_word(vm.registers.segment(SegmentType::CS));
    vm.push_word(vm.registers.ip());
    jump_far(vm, ip, cs);
}

pub(super) fn ret_near(vm: &mut Emulator, release: u16) {
    let ip = vm.pop_word();
    vm.registers.set_ip(ip);
    release_stack(vm, release);
}

pub(super) fn ret_far(vm: &mut Emulator, release: u16) {
    let ip = vm.pop_word();
    let cs = vm.pop_word();
    jump_far(vm, ip, cs);
    release_stack(vm, release);
}

#[inline]
fn release_stack(vm: &mut Emulator, release: u16) {
    let sp = vm.registers.get(Reg::SP).wrapping_add(release);
    vm.registers.set(Reg::SP, sp);
}

pub(super) fn iret(vm: &mut Emulator) {
    let ip = vm.pop_word();
    let cs = vm.pop_word();
    let flags = vm.pop_word();
    jump_far(vm, ip, cs);
    vm.registers.set_flags(flags);
}

pub(super) fn loops(vm: &mut Emulator, opcode: u8, displacement: u8) {
    let taken = if opcode == 0xE3 {
        vm.registers.get(Reg::CX) == 0
    } else {
        let cx = vm.registers.get(Reg::CX).wrapping_sub(1);
        vm.registers.set(Reg::CX, cx);
        cx != 0
            && match opcode {
                0xE0 => !vm.check_flag(Zero),
                0xE1 => vm.check_flag(Zero),
                _ => true,
            }
    };
    if taken {
        jump_relative(vm, extend_sign(displacement));
    }
}

/// PUSH of a general register. The 8086 stores SP after the decrement.
pub(super) fn push_register(vm: &mut Emulator, reg: Reg) {
    if reg == Reg::SP && !vm.is_186() {
        let sp = vm.registers.get(Reg::SP).wrapping_sub(2);
        vm.registers.set(Reg::SP, sp);
        vm.memory.write_word(sp, sp);
    } else {
        vm.push_word(vm.registers.get(reg));
    }
}

fn far_pointer(vm: &Emulator, operand: Operand) -> (u16, u16) {
    let ip = vm.read_operand(operand);
    let cs = operand
        .advance(2)
        .map_or(0, |segment| vm.read_operand(segment));
    (ip, cs)
}

pub(super) fn group_fe_ff(vm: &mut Emulator, instruction: &Instruction) {
    let rm = instruction.rm();

    match instruction.reg() {
        // INC
        0b_000 => inc_dec(vm, rm, true),
        // DEC
        0b_001 => inc_dec(vm, rm, false),
        // CALL r/m (target is read before the push so CALL SP sees the old value)
        0b_010 => {
            let target = vm.read_operand(rm);
            vm.push_word(vm.registers.ip());
            vm.registers.set_ip(target);
        }
        // CALL far mem
        0b_011 => {
            let (ip, cs) = far_pointer(vm, rm);
            call_far(vm, ip, cs);
        }
        // JMP r/m
        0b_100 => {
            let target = vm.read_operand(rm);
            vm.registers.set_ip(target);
        }
        // JMP far mem
        0b_101 => {
            let (ip, cs) = far_pointer(vm, rm);
            jump_far(vm, ip, cs);
        }
        // PUSH r/m
        _ => match rm {
            Operand::Register(reg) => push_register(vm, reg),
            Operand::Memory { .. } => {
                let value = vm.read_operand(rm);
                vm.push_word(value);
            }
        },
    }
}

/// ENTER: builds a stack frame of `size` bytes at nesting `level`.
pub(super) fn enter(vm: &mut Emulator, size: u16, level: u8) {
    let level = level & 0x1F;
    vm.push_word(vm.registers.get(Reg::BP));
    let frame = vm.registers.get(Reg::SP);

    if level > 0 {
        for _ in 1..level {
            let bp = vm.registers.get(Reg::BP).wrapping_sub(2);
            vm.registers.set(Reg::BP, bp);
            let outer = vm.memory.read_word(bp);
            vm.push_word(outer);
        }
        vm.push_word(frame);
    }

    vm.registers.set(Reg::BP, frame);
    let sp = vm.registers.get(Reg::SP).wrapping_sub(size);
    vm.registers.set(Reg::SP, sp);
}

pub(super) fn leave(vm: &mut Emulator) {
    vm.registers.set(Reg::SP, vm.registers.get(Reg::BP));
    let bp = vm.pop_word();
    vm.registers.set(Reg::BP, bp);
}

/// BOUND: raises interrupt 5 when the signed index in reg lies outside the
/// pair of words at the memory operand.
pub(super) fn bound(vm: &mut Emulator, instruction: &Instruction) {
    let rm = instruction.rm();
    let index = vm.registers.get(Reg::from_field(instruction.reg(), Width::Word)) as i16;
    let lower = vm.read_operand(rm) as i16;
    let upper = rm
        .advance(2)
        .map_or(lower, |operand| vm.read_operand(operand) as i16);

    if index < lower || index > upper {
        debug!("BOUND {} outside [{}, {}]", index, lower, upper);
        vm.interrupt(5);
    }
}

pub(super) fn div_zero(vm: &mut Emulator) {
    vm.interrupt(0);
}
