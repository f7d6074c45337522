use crate::utils::number::{extend_sign, SpecialOps};
use crate::vm::cpu::Emulator;
use crate::vm::decode::Instruction;
use crate::vm::modrm::Operand;
use crate::vm::registers::CpuFlag::*;
use crate::vm::registers::Reg;
use crate::vm::Width;

use super::control::div_zero;
use super::{update_arithmetic_flags, update_aux_carry, update_logical_flags, update_result_flags};

/// The eight two-operand ALU operations, in opcode/reg-field order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum AluOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    pub(super) fn from_field(field: u8) -> Self {
        match field & 0b_111 {
            0b_000 => AluOp::Add,
            0b_001 => AluOp::Or,
            0b_010 => AluOp::Adc,
            0b_011 => AluOp::Sbb,
            0b_100 => AluOp::And,
            0b_101 => AluOp::Sub,
            0b_110 => AluOp::Xor,
            _ => AluOp::Cmp,
        }
    }
}

#[inline]
fn add(width: Width, lhs: u16, rhs: u16, carry: bool) -> (u16, bool, bool) {
    match width {
        Width::Byte => {
            let (res, overflow, carry) = (lhs as u8).oc_carry_add(rhs as u8, carry);
            (res as u16, overflow, carry)
        }
        Width::Word => lhs.oc_carry_add(rhs, carry),
    }
}

#[inline]
fn sub(width: Width, lhs: u16, rhs: u16, borrow: bool) -> (u16, bool, bool) {
    match width {
        Width::Byte => {
            let (res, overflow, borrow) = (lhs as u8).oc_carry_sub(rhs as u8, borrow);
            (res as u16, overflow, borrow)
        }
        Width::Word => lhs.oc_carry_sub(rhs, borrow),
    }
}

/// Computes `lhs op rhs`, updates the flags and returns the value to store,
/// or `None` for CMP.
pub(super) fn alu(vm: &mut Emulator, op: AluOp, lhs: u16, rhs: u16, width: Width) -> Option<u16> {
    let carry = vm.check_flag(Carry);
    let (res, overflow, carry) = match op {
        AluOp::Add => add(width, lhs, rhs, false),
        AluOp::Adc => add(width, lhs, rhs, carry),
        AluOp::Sub | AluOp::Cmp => sub(width, lhs, rhs, false),
        AluOp::Sbb => sub(width, lhs, rhs, carry),
        AluOp::Or | AluOp::And | AluOp::Xor => {
            let res = match op {
                AluOp::Or => lhs | rhs,
                AluOp::And => lhs & rhs,
                _ => lhs ^ rhs,
            };
            update_logical_flags(vm, res, width);
            return Some(res);
        }
    };

    update_arithmetic_flags(vm, res, width, overflow, carry);
    update_aux_carry(vm, lhs, rhs, res);
    (op != AluOp::Cmp).then_some(res)
}

pub(super) fn apply(vm: &mut Emulator, op: AluOp, dst: Operand, src: u16) {
    let lhs = vm.read_operand(dst);
    if let Some(res) = alu(vm, op, lhs, src, dst.width()) {
        vm.write_operand(dst, res);
    }
}

pub(super) fn group_80_83(vm: &mut Emulator, instruction: &Instruction) {
    let rm = instruction.rm();
    let src = if instruction.opcode == 0x83 {
        extend_sign(instruction.imm as u8)
    } else {
        instruction.imm
    };
    apply(vm, AluOp::from_field(instruction.reg()), rm, src);
}

/// INC and DEC: arithmetic flags without touching CF.
pub(super) fn inc_dec(vm: &mut Emulator, operand: Operand, increment: bool) {
    let width = operand.width();
    let prev = vm.read_operand(operand);
    let (res, overflow, _) = if increment {
        add(width, prev, 1, false)
    } else {
        sub(width, prev, 1, false)
    };
    vm.write_operand(operand, res);
    update_arithmetic_flags(vm, res, width, overflow, vm.check_flag(Carry));
    update_aux_carry(vm, prev, 1, res);
}

pub(super) fn group_f6_f7(vm: &mut Emulator, instruction: &Instruction) {
    let rm = instruction.rm();
    let width = rm.width();
    let value = vm.read_operand(rm);

    match instruction.reg() {
        // TEST (reg=1 is an alias)
        0b_000 | 0b_001 => update_logical_flags(vm, value & instruction.imm, width),
        // NOT - no flags
        0b_010 => vm.write_operand(rm, !value & width.mask()),
        // NEG
        0b_011 => {
            let (res, overflow, carry) = sub(width, 0, value, false);
            vm.write_operand(rm, res);
            update_arithmetic_flags(vm, res, width, overflow, carry);
            update_aux_carry(vm, 0, value, res);
        }
        // MUL - only CF/OF
        0b_100 => match width {
            Width::Byte => {
                let res = vm.registers.get(Reg::AL) * value;
                vm.registers.set(Reg::AX, res);
                let high_nonzero = res >> 8 != 0;
                vm.update_flag(Carry, high_nonzero);
                vm.update_flag(Overflow, high_nonzero);
            }
            Width::Word => {
                let res = (vm.registers.get(Reg::AX) as u32) * (value as u32);
                let dx = (res >> 16) as u16;
                vm.registers.set(Reg::AX, res as u16);
                vm.registers.set(Reg::DX, dx);
                vm.update_flag(Carry, dx != 0);
                vm.update_flag(Overflow, dx != 0);
            }
        },
        // IMUL - only CF/OF
        0b_101 => match width {
            Width::Byte => {
                let res = (vm.registers.get(Reg::AL) as u8 as i8 as i16) * (value as u8 as i8 as i16);
                vm.registers.set(Reg::AX, res as u16);
                let truncated = (res as i8 as i16) != res;
                vm.update_flag(Carry, truncated);
                vm.update_flag(Overflow, truncated);
            }
            Width::Word => {
                let res = (vm.registers.get(Reg::AX) as i16 as i32) * (value as i16 as i32);
                vm.registers.set(Reg::AX, res as u16);
                vm.registers.set(Reg::DX, ((res as u32) >> 16) as u16);
                let truncated = (res as i16 as i32) != res;
                vm.update_flag(Carry, truncated);
                vm.update_flag(Overflow, truncated);
            }
        },
        // DIV - no flags
        0b_110 => match width {
            Width::Byte => {
                let numerator = vm.registers.get(Reg::AX);
                match numerator.checked_div(value) {
                    Some(quot) if quot <= u8::MAX as u16 => {
                        vm.registers.set(Reg::AL, quot);
                        vm.registers.set(Reg::AH, numerator % value);
                    }
                    _ => div_zero(vm),
                }
            }
            Width::Word => {
                let numerator =
                    (vm.registers.get(Reg::DX) as u32) << 16 | vm.registers.get(Reg::AX) as u32;
                let divisor = value as u32;
                match numerator.checked_div(divisor) {
                    Some(quot) if quot <= u16::MAX as u32 => {
                        vm.registers.set(Reg::AX, quot as u16);
                        vm.registers.set(Reg::DX, (numerator % divisor) as u16);
                    }
                    _ => div_zero(vm),
                }
            }
        },
        // IDIV - truncating, no flags
        _ => {
            let is_186 = vm.is_186();
            match width {
                Width::Byte => {
                    let numerator = vm.registers.get(Reg::AX) as i16 as i32;
                    let divisor = value as u8 as i8 as i32;
                    match numerator.checked_div(divisor) {
                        Some(quot) if idiv_fits(is_186, quot as i64, i8::MAX as i64) => {
                            vm.registers.set(Reg::AL, quot as u16);
                            vm.registers.set(Reg::AH, (numerator % divisor) as u16);
                        }
                        _ => div_zero(vm),
                    }
                }
                Width::Word => {
                    let numerator = ((vm.registers.get(Reg::DX) as u32) << 16
                        | vm.registers.get(Reg::AX) as u32) as i32 as i64;
                    let divisor = value as i16 as i64;
                    match numerator.checked_div(divisor) {
                        Some(quot) if idiv_fits(is_186, quot, i16::MAX as i64) => {
                            vm.registers.set(Reg::AX, quot as u16);
                            vm.registers.set(Reg::DX, (numerator % divisor) as u16);
                        }
                        _ => div_zero(vm),
                    }
                }
            }
        }
    }
}

/// The 8086 also faults on the most negative quotient.
fn idiv_fits(is_186: bool, quot: i64, max: i64) -> bool {
    let min = if is_186 { -max - 1 } else { -max };
    (min..=max).contains(&quot)
}

/// IMUL reg,r/m,imm: 16-bit signed product truncated into reg.
pub(super) fn imul_imm(vm: &mut Emulator, instruction: &Instruction, imm: u16) {
    let src = vm.read_operand(instruction.rm());
    let res = (src as i16 as i32) * (imm as i16 as i32);
    vm.registers
        .set(Reg::from_field(instruction.reg(), Width::Word), res as u16);
    let truncated = (res as i16 as i32) != res;
    vm.update_flag(Carry, truncated);
    vm.update_flag(Overflow, truncated);
}

pub(super) fn daa(vm: &mut Emulator) {
    let old_al = vm.registers.get(Reg::AL) as u8;
    let old_cf = vm.check_flag(Carry);
    let old_af = vm.check_flag(AuxCarry);
    let mut al = old_al;
    let mut cf = false;

    if old_af || (old_al & 0x0F) >= 0x0A {
        let (adjusted, carry) = al.overflowing_add(0x06);
        al = adjusted;
        cf = old_cf || carry;
        vm.registers.set_flag(AuxCarry);
    } else {
        vm.registers.unset_flag(AuxCarry);
    }
    // With AF set the upper correction kicks in above 0x9F rather than 0x99.
    let upper_threshold = if old_af { 0x9F } else { 0x99 };
    if old_cf || old_al > upper_threshold {
        al = al.wrapping_add(0x60);
        cf = true;
    }

    vm.registers.set(Reg::AL, al as u16);
    vm.update_flag(Carry, cf);
    update_result_flags(vm, al as u16, Width::Byte);
}

pub(super) fn das(vm: &mut Emulator) {
    let old_al = vm.registers.get(Reg::AL) as u8;
    let old_cf = vm.check_flag(Carry);
    let old_af = vm.check_flag(AuxCarry);
    let mut al = old_al;
    // The borrow of the low nibble correction never reaches CF.
    let mut cf = old_cf;

    if old_af || (old_al & 0x0F) >= 0x0A {
        al = al.wrapping_sub(0x06);
        vm.registers.set_flag(AuxCarry);
    } else {
        vm.registers.unset_flag(AuxCarry);
    }
    let upper_threshold = if old_af { 0x9F } else { 0x99 };
    if old_cf || old_al > upper_threshold {
        al = al.wrapping_sub(0x60);
        cf = true;
    }

    vm.registers.set(Reg::AL, al as u16);
    vm.update_flag(Carry, cf);
    update_result_flags(vm, al as u16, Width::Byte);
}

/// AAA (`increment`) and AAS.
fn ascii_adjust(vm: &mut Emulator, increment: bool) {
    let al = vm.registers.get(Reg::AL) as u8;
    let ah = vm.registers.get(Reg::AH) as u8;
    let adjust = (al & 0x0F) >= 0x0A || vm.check_flag(AuxCarry);

    if adjust {
        let (al, ah) = if increment {
            (al.wrapping_add(6), ah.wrapping_add(1))
        } else {
            (al.wrapping_sub(6), ah.wrapping_sub(1))
        };
        vm.registers.set(Reg::AL, (al & 0x0F) as u16);
        vm.registers.set(Reg::AH, ah as u16);
    } else {
        vm.registers.set(Reg::AL, (al & 0x0F) as u16);
    }
    vm.update_flag(AuxCarry, adjust);
    vm.update_flag(Carry, adjust);
}

pub(super) fn aaa(vm: &mut Emulator) {
    ascii_adjust(vm, true);
}

pub(super) fn aas(vm: &mut Emulator) {
    ascii_adjust(vm, false);
}

pub(super) fn aam(vm: &mut Emulator, base: u8) {
    if base == 0 {
        // Flags are computed for a zero result before the divide error.
        update_result_flags(vm, 0, Width::Byte);
        div_zero(vm);
        return;
    }
    let al = vm.registers.get(Reg::AL) as u8;
    vm.registers.set(Reg::AH, (al / base) as u16);
    vm.registers.set(Reg::AL, (al % base) as u16);
    update_result_flags(vm, (al % base) as u16, Width::Byte);
}

pub(super) fn aad(vm: &mut Emulator, base: u8) {
    let al = vm.registers.get(Reg::AL) as u8;
    let ah = vm.registers.get(Reg::AH) as u8;
    let res = al.wrapping_add(ah.wrapping_mul(base));
    vm.registers.set(Reg::AX, res as u16);
    update_result_flags(vm, res as u16, Width::Byte);
}
