mod alu;
mod control;
mod shift;
mod string;


use log::error;

use crate::utils::number::{extend_sign, parity};
use crate::vm::cpu::Emulator;
use crate::vm::decode::Instruction;
use crate::vm::modrm::Operand;
use crate::vm::registers::CpuFlag::*;
use crate::vm::registers::{Reg, SegmentType};
use crate::vm::Width;

use alu::AluOp;

const WORD_MASK: u8 = 0b_0000_0001;
const DIRECTION_MASK: u8 = 0b_0000_0010;

const AUX_CARRY_BIT: u16 = 0b_0000_0000_0001_0000;
/// Flags SAHF and LAHF move: SF ZF AF PF CF.
const LOW_FLAGS_MASK: u16 = 0b_0000_0000_1101_0101;

#[inline]
fn update_result_flags(vm: &mut Emulator, res: u16, width: Width) {
    let res = res & width.mask();
    vm.update_flag(Zero, res == 0);
    vm.update_flag(Sign, res & width.sign_bit() != 0);
    vm.update_flag(Parity, parity(res));
}

#[inline]
fn update_arithmetic_flags(vm: &mut Emulator, res: u16, width: Width, overflow: bool, carry: bool) {
    vm.update_flag(Overflow, overflow);
    vm.update_flag(Carry, carry);
    update_result_flags(vm, res, width);
}

/// OR, AND, XOR and TEST: CF and OF cleared, AF left alone.
#[inline]
fn update_logical_flags(vm: &mut Emulator, res: u16, width: Width) {
    vm.update_flag(Overflow, false);
    vm.update_flag(Carry, false);
    update_result_flags(vm, res, width);
}

/// AF is the carry out of bit 3, which shows up as a flip of bit 4.
#[inline]
fn update_aux_carry(vm: &mut Emulator, lhs: u16, rhs: u16, res: u16) {
    vm.update_flag(AuxCarry, (lhs ^ rhs ^ res) & AUX_CARRY_BIT != 0);
}

#[inline]
fn accumulator(width: Width) -> Operand {
    match width {
        Width::Byte => Operand::Register(Reg::AL),
        Width::Word => Operand::Register(Reg::AX),
    }
}

/// Executes a decoded instruction. IP already points past it.
pub fn execute(vm: &mut Emulator, instruction: &Instruction) {
    let opcode = instruction.opcode;
    let width = Width::from_w(opcode & WORD_MASK != 0);
    let directional = opcode & DIRECTION_MASK != 0;
    let imm = instruction.imm;

    match opcode {
        // ADD OR ADC SBB AND SUB XOR CMP  r/m,reg / reg,r/m
        0x00..=0x03
        | 0x08..=0x0B
        | 0x10..=0x13
        | 0x18..=0x1B
        | 0x20..=0x23
        | 0x28..=0x2B
        | 0x30..=0x33
        | 0x38..=0x3B => {
            let op = AluOp::from_field(opcode >> 3);
            let rm = instruction.rm();
            let reg = instruction.reg_operand(width);
            let (dst, src) = if directional { (reg, rm) } else { (rm, reg) };
            let value = vm.read_operand(src);
            alu::apply(vm, op, dst, value);
        }
        // ADD OR ADC SBB AND SUB XOR CMP  ac,data
        0x04 | 0x05
        | 0x0C | 0x0D
        | 0x14 | 0x15
        | 0x1C | 0x1D
        | 0x24 | 0x25
        | 0x2C | 0x2D
        | 0x34 | 0x35
        | 0x3C | 0x3D => {
            let op = AluOp::from_field(opcode >> 3);
            alu::apply(vm, op, accumulator(width), imm);
        }
        // PUSH sreg
        0x06 | 0x0E | 0x16 | 0x1E => {
            let segment = SegmentType::from(opcode >> 3);
            vm.push_word(vm.registers.segment(segment));
        }
        // POP sreg (POP CS only decodes on the 8086)
        0x07 | 0x0F | 0x17 | 0x1F => {
            let segment = SegmentType::from(opcode >> 3);
            let value = vm.pop_word();
            vm.registers.set_segment(segment, value);
        }
        // DAA
        0x27 => alu::daa(vm),
        // DAS
        0x2F => alu::das(vm),
        // AAA
        0x37 => alu::aaa(vm),
        // AAS
        0x3F => alu::aas(vm),
        // INC reg
        0x40..=0x47 => {
            let reg = Operand::Register(Reg::from_field(opcode, Width::Word));
            alu::inc_dec(vm, reg, true);
        }
        // DEC reg
        0x48..=0x4F => {
            let reg = Operand::Register(Reg::from_field(opcode, Width::Word));
            alu::inc_dec(vm, reg, false);
        }
        // PUSH reg
        0x50..=0x57 => control::push_register(vm, Reg::from_field(opcode, Width::Word)),
        // POP reg
        0x58..=0x5F => {
            let value = vm.pop_word();
            vm.registers.set(Reg::from_field(opcode, Width::Word), value);
        }
        // PUSHA
        0x60 => {
            let sp = vm.registers.get(Reg::SP);
            for reg in [Reg::AX, Reg::CX, Reg::DX, Reg::BX] {
                vm.push_word(vm.registers.get(reg));
            }
            vm.push_word(sp);
            for reg in [Reg::BP, Reg::SI, Reg::DI] {
                vm.push_word(vm.registers.get(reg));
            }
        }
        // POPA
        0x61 => {
            for reg in [Reg::DI, Reg::SI, Reg::BP] {
                let value = vm.pop_word();
                vm.registers.set(reg, value);
            }
            // saved SP is discarded
            vm.pop_word();
            for reg in [Reg::BX, Reg::DX, Reg::CX, Reg::AX] {
                let value = vm.pop_word();
                vm.registers.set(reg, value);
            }
        }
        // BOUND reg,mem
        0x62 => control::bound(vm, instruction),
        // PUSH imm16
        0x68 => vm.push_word(imm),
        // IMUL reg,r/m,imm16
        0x69 => alu::imul_imm(vm, instruction, imm),
        // PUSH imm8
        0x6A => vm.push_word(extend_sign(imm as u8)),
        // IMUL reg,r/m,imm8
        0x6B => alu::imul_imm(vm, instruction, extend_sign(imm as u8)),
        // INS
        0x6C | 0x6D => string::ins(vm, instruction, width),
        // OUTS
        0x6E | 0x6F => string::outs(vm, instruction, width),
        // Jcc disp8
        0x70..=0x7F => {
            if control::condition(vm, opcode & 0x0F) {
                control::jump_relative(vm, extend_sign(imm as u8));
            }
        }
        // Group 80-83: ADD OR ADC SBB AND SUB XOR CMP  r/m,imm
        0x80..=0x83 => alu::group_80_83(vm, instruction),
        // TEST r/m,reg
        0x84 | 0x85 => {
            let lhs = vm.read_operand(instruction.rm());
            let rhs = vm.read_operand(instruction.reg_operand(width));
            update_logical_flags(vm, lhs & rhs, width);
        }
        // XCHG r/m,reg
        0x86 | 0x87 => {
            let rm = instruction.rm();
            let reg = instruction.reg_operand(width);
            let a = vm.read_operand(rm);
            let b = vm.read_operand(reg);
            vm.write_operand(rm, b);
            vm.write_operand(reg, a);
        }
        // MOV r/m,reg / reg,r/m
        0x88..=0x8B => {
            let rm = instruction.rm();
            let reg = instruction.reg_operand(width);
            let (dst, src) = if directional { (reg, rm) } else { (rm, reg) };
            let value = vm.read_operand(src);
            vm.write_operand(dst, value);
        }
        // MOV r/m,sreg
        0x8C => {
            let value = vm.registers.segment(SegmentType::from(instruction.reg()));
            vm.write_operand(instruction.rm(), value);
        }
        // LEA reg,mem
        0x8D => {
            if let Operand::Memory { offset, .. } = instruction.rm() {
                vm.registers
                    .set(Reg::from_field(instruction.reg(), Width::Word), offset);
            }
        }
        // MOV sreg,r/m
        0x8E => {
            let value = vm.read_operand(instruction.rm());
            vm.registers
                .set_segment(SegmentType::from(instruction.reg()), value);
        }
        // POP r/m
        0x8F => {
            let value = vm.pop_word();
            vm.write_operand(instruction.rm(), value);
        }
        // XCHG AX,reg (0x90 is NOP)
        0x90..=0x97 => {
            let reg = Reg::from_field(opcode, Width::Word);
            let ax = vm.registers.get(Reg::AX);
            vm.registers.set(Reg::AX, vm.registers.get(reg));
            vm.registers.set(reg, ax);
        }
        // CBW
        0x98 => {
            let al = vm.registers.get(Reg::AL) as u8;
            vm.registers.set(Reg::AX, extend_sign(al));
        }
        // CWD
        0x99 => {
            let ax = vm.registers.get(Reg::AX);
            let dx = if ax & Width::Word.sign_bit() != 0 { 0xFFFF } else { 0 };
            vm.registers.set(Reg::DX, dx);
        }
        // CALL addr
        0x9A => control::call_far(vm, imm, instruction.imm2),
        // WAIT
        0x9B => {}
        // PUSHF
        0x9C => vm.push_word(vm.registers.get_flags()),
        // POPF
        0x9D => {
            let flags = vm.pop_word();
            vm.registers.set_flags(flags);
        }
        // SAHF
        0x9E => {
            let ah = vm.registers.get(Reg::AH);
            vm.registers.update_flags(ah, LOW_FLAGS_MASK);
        }
        // LAHF
        0x9F => {
            let flags = vm.registers.get_flags();
            vm.registers.set(Reg::AH, flags & 0x00FF);
        }
        // MOV ac,mem / mem,ac
        0xA0..=0xA3 => {
            let memory = Operand::Memory {
                segment: instruction.data_segment(),
                offset: imm,
                width,
            };
            let (dst, src) = if directional {
                (memory, accumulator(width))
            } else {
                (accumulator(width), memory)
            };
            let value = vm.read_operand(src);
            vm.write_operand(dst, value);
        }
        // MOVS
        0xA4 | 0xA5 => string::movs(vm, instruction, width),
        // CMPS
        0xA6 | 0xA7 => string::cmps(vm, instruction, width),
        // TEST ac,data
        0xA8 | 0xA9 => {
            let ac = vm.read_operand(accumulator(width));
            update_logical_flags(vm, ac & imm, width);
        }
        // STOS
        0xAA | 0xAB => string::stos(vm, instruction, width),
        // LODS
        0xAC | 0xAD => string::lods(vm, instruction, width),
        // SCAS
        0xAE | 0xAF => string::scas(vm, instruction, width),
        // MOV reg,data
        0xB0..=0xBF => {
            let width = Width::from_w(opcode & 0b_0000_1000 != 0);
            vm.registers.set(Reg::from_field(opcode, width), imm);
        }
        // ROL ROR RCL RCR SHL SHR SAL SAR  r/m,imm8
        0xC0 | 0xC1 => shift::group(vm, instruction, imm as u8),
        // RET disp16
        0xC2 => control::ret_near(vm, imm),
        // RET
        0xC3 => control::ret_near(vm, 0),
        // LES / LDS
        0xC4 | 0xC5 => {
            if let Operand::Memory { offset, .. } = instruction.rm() {
                let value = vm.memory.read_word(offset);
                let segment = vm.memory.read_word(offset.wrapping_add(2));
                let target = if opcode == 0xC4 { SegmentType::ES } else { SegmentType::DS };
                vm.registers
                    .set(Reg::from_field(instruction.reg(), Width::Word), value);
                vm.registers.set_segment(target, segment);
            }
        }
        // MOV r/m,data
        0xC6 | 0xC7 => vm.write_operand(instruction.rm(), imm),
        // ENTER imm16,imm8
        0xC8 => control::enter(vm, imm, instruction.imm2 as u8),
        // LEAVE
        0xC9 => control::leave(vm),
        // RETF disp16
        0xCA => control::ret_far(vm, imm),
        // RETF
        0xCB => control::ret_far(vm, 0),
        // INT 3
        0xCC => vm.interrupt(3),
        // INT imm8
        0xCD => vm.interrupt(imm as u8),
        // INTO
        0xCE => {
            if vm.check_flag(Overflow) {
                vm.interrupt(4);
            }
        }
        // IRET
        0xCF => control::iret(vm),
        // ROL ROR RCL RCR SHL SHR SAL SAR  r/m,1 / r/m,CL
        0xD0..=0xD3 => {
            let count = if directional { vm.registers.get(Reg::CL) as u8 } else { 1 };
            shift::group(vm, instruction, count);
        }
        // AAM
        0xD4 => alu::aam(vm, imm as u8),
        // AAD
        0xD5 => alu::aad(vm, imm as u8),
        // XLAT
        0xD7 => {
            let offset = vm
                .registers
                .get(Reg::BX)
                .wrapping_add(vm.registers.get(Reg::AL));
            let table = Operand::Memory {
                segment: instruction.data_segment(),
                offset,
                width: Width::Byte,
            };
            let value = vm.read_operand(table);
            vm.registers.set(Reg::AL, value);
        }
        // ESC: no coprocessor, the operand is decoded and dropped
        0xD8..=0xDF => {}
        // LOOPNE / LOOPE / LOOP / JCXZ
        0xE0..=0xE3 => control::loops(vm, opcode, imm as u8),
        // IN ac,imm8
        0xE4 | 0xE5 => {
            let value = vm.io.read(imm, width);
            vm.write_operand(accumulator(width), value);
        }
        // OUT imm8,ac
        0xE6 | 0xE7 => {
            let value = vm.read_operand(accumulator(width));
            vm.io.write(imm, width, value);
        }
        // CALL disp16
        0xE8 => control::call_near(vm, imm),
        // JMP disp16
        0xE9 => control::jump_relative(vm, imm),
        // JMP addr
        0xEA => control::jump_far(vm, imm, instruction.imm2),
        // JMP disp8
        0xEB => control::jump_relative(vm, extend_sign(imm as u8)),
        // IN ac,DX
        0xEC | 0xED => {
            let value = vm.io.read(vm.registers.get(Reg::DX), width);
            vm.write_operand(accumulator(width), value);
        }
        // OUT DX,ac
        0xEE | 0xEF => {
            let value = vm.read_operand(accumulator(width));
            vm.io.write(vm.registers.get(Reg::DX), width, value);
        }
        // Prefixes never reach execution
        0x26 | 0x2E | 0x36 | 0x3E | 0xF0 | 0xF2 | 0xF3 => {}
        // HLT
        0xF4 => vm.halted = true,
        // CMC
        0xF5 => vm.registers.flip_flag(Carry),
        // TEST NOT NEG MUL IMUL DIV IDIV
        0xF6 | 0xF7 => alu::group_f6_f7(vm, instruction),
        // CLC / STC
        0xF8 | 0xF9 => vm.update_flag(Carry, opcode & 1 != 0),
        // CLI / STI
        0xFA | 0xFB => vm.update_flag(Interrupt, opcode & 1 != 0),
        // CLD / STD
        0xFC | 0xFD => vm.update_flag(Directional, opcode & 1 != 0),
        // (GRP) INC DEC CALL JMP PUSH
        0xFE | 0xFF => control::group_fe_ff(vm, instruction),
        _ => error!("no handler for opcode {:#04x}", opcode),
    }
}
