use crate::utils::number::SpecialOps;
use crate::vm::cpu::Emulator;
use crate::vm::decode::Instruction;
use crate::vm::registers::CpuFlag::*;
use crate::vm::Width;

use super::update_result_flags;

/// The 80186 only looks at the low five bits of the count.
const COUNT_MASK_186: u8 = 0b_0001_1111;

/// (result, CF) of a rotate or shift of `value` by a non-zero `count`.
fn rotate_or_shift<T: SpecialOps + Into<u16>>(
    op: u8,
    value: T,
    count: u32,
    carry: bool,
) -> (u16, bool) {
    let bits = T::zero().count_zeros();
    let lsb = |v: T| v & T::one() == T::one();
    let (res, cf) = match op {
        // ROL: the last bit rotated out lands in bit 0
        0b_000 => {
            let res = value.rotate_left(count % bits);
            (res, lsb(res))
        }
        // ROR: ... and in the top bit
        0b_001 => {
            let res = value.rotate_right(count % bits);
            (res, res.msb())
        }
        // RCL
        0b_010 => value.rotate_carry_left(count, carry),
        // RCR
        0b_011 => value.rotate_carry_right(count, carry),
        // SHL | SAL
        0b_100 | 0b_110 => {
            if count > bits {
                (T::zero(), false)
            } else {
                let cf = lsb(value.unsigned_shr(bits - count));
                let res = if count == bits { T::zero() } else { value.unsigned_shl(count) };
                (res, cf)
            }
        }
        // SHR
        0b_101 => {
            if count > bits {
                (T::zero(), false)
            } else {
                let cf = lsb(value.unsigned_shr(count - 1));
                let res = if count == bits { T::zero() } else { value.unsigned_shr(count) };
                (res, cf)
            }
        }
        // SAR
        _ => {
            let sign = value.msb();
            if count >= bits {
                (if sign { !T::zero() } else { T::zero() }, sign)
            } else {
                let cf = lsb(value.unsigned_shr(count - 1));
                (value.signed_shr(count), cf)
            }
        }
    };
    (res.into(), cf)
}

/// ROL ROR RCL RCR SHL SHR SAL SAR of the r/m operand by `count`.
pub(super) fn group(vm: &mut Emulator, instruction: &Instruction, count: u8) {
    let count = if vm.is_186() { count & COUNT_MASK_186 } else { count };
    if count == 0 {
        return;
    }

    let rm = instruction.rm();
    let width = rm.width();
    let value = vm.read_operand(rm);
    let op = instruction.reg();
    let carry = vm.check_flag(Carry);

    let (res, cf) = match width {
        Width::Byte => rotate_or_shift(op, value as u8, count as u32, carry),
        Width::Word => rotate_or_shift(op, value, count as u32, carry),
    };
    vm.write_operand(rm, res);
    vm.update_flag(Carry, cf);

    let msb = |v: u16| v & width.sign_bit() != 0;
    let next_to_msb = |v: u16| v & (width.sign_bit() >> 1) != 0;

    if count == 1 {
        let overflow = match op {
            // ROL, RCL, SHL: top bit changed
            0b_000 | 0b_010 | 0b_100 | 0b_110 => msb(res) != cf,
            // ROR, RCR: top two bits of the result differ
            0b_001 | 0b_011 => msb(res) != next_to_msb(res),
            // SHR: the sign bit was shifted out
            0b_101 => msb(value),
            // SAR keeps the sign
            _ => false,
        };
        vm.update_flag(Overflow, overflow);
    }

    // Shifts also set SF ZF PF; AF stays as it was.
    if op & 0b_100 != 0 {
        update_result_flags(vm, res, width);
    }
}
