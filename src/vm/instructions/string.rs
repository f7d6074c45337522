use crate::vm::cpu::Emulator;
use crate::vm::decode::{Instruction, Rep};
use crate::vm::modrm::Operand;
use crate::vm::registers::CpuFlag::*;
use crate::vm::registers::{Reg, SegmentType};
use crate::vm::Width;

use super::accumulator;
use super::alu::{alu, AluOp};

/// DS:SI, or the override segment when one is given.
fn source(vm: &Emulator, instruction: &Instruction, width: Width) -> Operand {
    Operand::Memory {
        segment: instruction.data_segment(),
        offset: vm.registers.get(Reg::SI),
        width,
    }
}

fn destination(vm: &Emulator, width: Width) -> Operand {
    Operand::Memory {
        segment: SegmentType::ES,
        offset: vm.registers.get(Reg::DI),
        width,
    }
}

fn advance(vm: &mut Emulator, width: Width, si: bool, di: bool) {
    let step = if vm.check_flag(Directional) {
        width.bytes().wrapping_neg()
    } else {
        width.bytes()
    };
    for (reg, active) in [(Reg::SI, si), (Reg::DI, di)] {
        if active {
            let value = vm.registers.get(reg).wrapping_add(step);
            vm.registers.set(reg, value);
        }
    }
}

/// Runs `step` once, or CX times under a repeat prefix. The compare forms
/// also stop as soon as ZF no longer matches the prefix.
fn repeat<F>(vm: &mut Emulator, instruction: &Instruction, compares: bool, mut step: F)
where
    F: FnMut(&mut Emulator),
{
    let Some(rep) = instruction.prefixes.rep else {
        step(vm);
        return;
    };

    while vm.registers.get(Reg::CX) != 0 {
        step(vm);
        let cx = vm.registers.get(Reg::CX).wrapping_sub(1);
        vm.registers.set(Reg::CX, cx);

        if compares {
            let zero = vm.check_flag(Zero);
            let done = match rep {
                Rep::WhileZero => !zero,
                Rep::WhileNotZero => zero,
            };
            if done {
                break;
            }
        }
    }
}

pub(super) fn movs(vm: &mut Emulator, instruction: &Instruction, width: Width) {
    repeat(vm, instruction, false, |vm| {
        let value = vm.read_operand(source(vm, instruction, width));
        vm.write_operand(destination(vm, width), value);
        advance(vm, width, true, true);
    });
}

pub(super) fn cmps(vm: &mut Emulator, instruction: &Instruction, width: Width) {
    repeat(vm, instruction, true, |vm| {
        let lhs = vm.read_operand(source(vm, instruction, width));
        let rhs = vm.read_operand(destination(vm, width));
        alu(vm, AluOp::Cmp, lhs, rhs, width);
        advance(vm, width, true, true);
    });
}

pub(super) fn stos(vm: &mut Emulator, instruction: &Instruction, width: Width) {
    repeat(vm, instruction, false, |vm| {
        let value = vm.read_operand(accumulator(width));
        vm.write_operand(destination(vm, width), value);
        advance(vm, width, false, true);
    });
}

pub(super) fn lods(vm: &mut Emulator, instruction: &Instruction, width: Width) {
    repeat(vm, instruction, false, |vm| {
        let value = vm.read_operand(source(vm, instruction, width));
        vm.write_operand(accumulator(width), value);
        advance(vm, width, true, false);
    });
}

pub(super) fn scas(vm: &mut Emulator, instruction: &Instruction, width: Width) {
    repeat(vm, instruction, true, |vm| {
        let lhs = vm.read_operand(accumulator(width));
        let rhs = vm.read_operand(destination(vm, width));
        alu(vm, AluOp::Cmp, lhs, rhs, width);
        advance(vm, width, false, true);
    });
}

pub(super) fn ins(vm: &mut Emulator, instruction: &Instruction, width: Width) {
    repeat(vm, instruction, false, |vm| {
        let value = vm.io.read(vm.registers.get(Reg::DX), width);
        vm.write_operand(destination(vm, width), value);
        advance(vm, width, false, true);
    });
}

pub(super) fn outs(vm: &mut Emulator, instruction: &Instruction, width: Width) {
    repeat(vm, instruction, false, |vm| {
        let value = vm.read_operand(source(vm, instruction, width));
        vm.io.write(vm.registers.get(Reg::DX), width, value);
        advance(vm, width, true, false);
    });
}
