//! USSE SMP instruction decoder
//!
//! SMP is a 64-bit instruction. Field layout, MSB first:
//!
//! | bits  | field       | bits  | field       |
//! |-------|-------------|-------|-------------|
//! | 63-59 | op1 (11100) | 39-38 | sb_mode     |
//! | 58-56 | pred        | 37-36 | src0_type   |
//! | 55    | skipinv     | 35    | src0_bank   |
//! | 54    | nosched     | 34-33 | drc_sel     |
//! | 53    | syncstart   | 32-31 | src1_bank   |
//! | 52    | minpack     | 30-29 | src2_bank   |
//! | 51-49 | src0/1/2 ext| 28    | reserved    |
//! | 48-47 | fconv_type  | 27-21 | dest_n      |
//! | 46-45 | mask_count  | 20-14 | src0_n      |
//! | 44-43 | dim         | 13-7  | src1_n      |
//! | 42-41 | lod_mode    | 6-0   | src2_n      |
//! | 40    | dest_use_pa |       |             |

use crate::types::*;
use std::fmt;

/// Primary opcode of the SMP family
pub const SMP_OP1: u8 = 0b11100;

/// Extended predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtPredicate {
    None,
    P0,
    P1,
    P2,
    P3,
    NegP0,
    NegP1,
    Pn,
}

impl From<u8> for ExtPredicate {
    fn from(v: u8) -> Self {
        match v & 0x7 {
            0 => ExtPredicate::None,
            1 => ExtPredicate::P0,
            2 => ExtPredicate::P1,
            3 => ExtPredicate::P2,
            4 => ExtPredicate::P3,
            5 => ExtPredicate::NegP0,
            6 => ExtPredicate::NegP1,
            _ => ExtPredicate::Pn,
        }
    }
}

impl fmt::Display for ExtPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtPredicate::None => "",
            ExtPredicate::P0 => "p0 ",
            ExtPredicate::P1 => "p1 ",
            ExtPredicate::P2 => "p2 ",
            ExtPredicate::P3 => "p3 ",
            ExtPredicate::NegP0 => "!p0 ",
            ExtPredicate::NegP1 => "!p1 ",
            ExtPredicate::Pn => "pN ",
        };
        f.write_str(s)
    }
}

/// LOD mode field of SMP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmpLodMode {
    None,
    Replace,
    Bias,
    Gradient,
}

impl From<u8> for SmpLodMode {
    fn from(v: u8) -> Self {
        match v & 0x3 {
            0 => SmpLodMode::None,
            1 => SmpLodMode::Replace,
            2 => SmpLodMode::Bias,
            _ => SmpLodMode::Gradient,
        }
    }
}

/// Raw fields of an SMP instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SmpInstruction {
    pub pred: u8,
    pub skipinv: bool,
    pub nosched: bool,
    pub syncstart: bool,
    pub minpack: bool,
    pub src0_ext: bool,
    pub src1_ext: bool,
    pub src2_ext: bool,
    pub fconv_type: u8,
    pub mask_count: u8,
    /// Dimensionality, 0-based
    pub dim: u8,
    pub lod_mode: u8,
    pub dest_use_pa: bool,
    pub sb_mode: u8,
    pub src0_type: u8,
    pub src0_bank: u8,
    pub drc_sel: u8,
    pub src1_bank: u8,
    pub src2_bank: u8,
    pub dest_n: u8,
    pub src0_n: u8,
    pub src1_n: u8,
    pub src2_n: u8,
}

#[inline]
fn bit(word: u64, pos: u32) -> bool {
    (word >> pos) & 1 != 0
}

#[inline]
fn field(word: u64, pos: u32, width: u32) -> u8 {
    ((word >> pos) & ((1 << width) - 1)) as u8
}

impl SmpInstruction {
    /// Decode a raw instruction word, or `None` if it isn't an SMP
    pub fn decode(word: u64) -> Option<Self> {
        if field(word, 59, 5) != SMP_OP1 {
            return None;
        }

        Some(Self {
            pred: field(word, 56, 3),
            skipinv: bit(word, 55),
            nosched: bit(word, 54),
            syncstart: bit(word, 53),
            minpack: bit(word, 52),
            src0_ext: bit(word, 51),
            src1_ext: bit(word, 50),
            src2_ext: bit(word, 49),
            fconv_type: field(word, 47, 2),
            mask_count: field(word, 45, 2),
            dim: field(word, 43, 2),
            lod_mode: field(word, 41, 2),
            dest_use_pa: bit(word, 40),
            sb_mode: field(word, 38, 2),
            src0_type: field(word, 36, 2),
            src0_bank: field(word, 35, 1),
            drc_sel: field(word, 33, 2),
            src1_bank: field(word, 31, 2),
            src2_bank: field(word, 29, 2),
            dest_n: field(word, 21, 7),
            src0_n: field(word, 14, 7),
            src1_n: field(word, 7, 7),
            src2_n: field(word, 0, 7),
        })
    }

    /// Pack the fields back into an instruction word
    pub fn encode(&self) -> u64 {
        let b = |v: bool, pos: u32| (v as u64) << pos;
        let f = |v: u8, pos: u32, width: u32| ((v as u64) & ((1 << width) - 1)) << pos;

        f(SMP_OP1, 59, 5)
            | f(self.pred, 56, 3)
            | b(self.skipinv, 55)
            | b(self.nosched, 54)
            | b(self.syncstart, 53)
            | b(self.minpack, 52)
            | b(self.src0_ext, 51)
            | b(self.src1_ext, 50)
            | b(self.src2_ext, 49)
            | f(self.fconv_type, 47, 2)
            | f(self.mask_count, 45, 2)
            | f(self.dim, 43, 2)
            | f(self.lod_mode, 41, 2)
            | b(self.dest_use_pa, 40)
            | f(self.sb_mode, 38, 2)
            | f(self.src0_type, 36, 2)
            | f(self.src0_bank, 35, 1)
            | f(self.drc_sel, 33, 2)
            | f(self.src1_bank, 31, 2)
            | f(self.src2_bank, 29, 2)
            | f(self.dest_n, 21, 7)
            | f(self.src0_n, 14, 7)
            | f(self.src1_n, 7, 7)
            | f(self.src2_n, 0, 7)
    }

    pub fn predicate(&self) -> ExtPredicate {
        ExtPredicate::from(self.pred)
    }

    pub fn lod(&self) -> SmpLodMode {
        SmpLodMode::from(self.lod_mode)
    }
}

/// Apply double-register addressing (index counts 64-bit register pairs)
fn double_reg(num: u32, bank: RegisterBank) -> u32 {
    match bank {
        RegisterBank::Immediate | RegisterBank::Special => num,
        _ => num << 1,
    }
}

/// Decode the src0 operand fields
pub fn decode_src0(src_n: u8, bank_sel: u8, ext: bool, double_regs: bool) -> Operand {
    let bank = match (ext, bank_sel & 1) {
        (false, 0) => RegisterBank::Temp,
        (false, _) => RegisterBank::PrimAttr,
        (true, 0) => RegisterBank::Output,
        (true, _) => RegisterBank::SecAttr,
    };

    let mut num = src_n as u32;
    if double_regs {
        num = double_reg(num, bank);
    }

    Operand {
        bank,
        num,
        ext,
        ..Operand::default()
    }
}

/// Decode the src1/src2 operand fields
pub fn decode_src12(src_n: u8, bank_sel: u8, ext: bool, double_regs: bool) -> Operand {
    let bank = match (ext, bank_sel & 0x3) {
        (false, 0) => RegisterBank::Temp,
        (false, 1) => RegisterBank::Output,
        (false, 2) => RegisterBank::PrimAttr,
        (false, _) => RegisterBank::SecAttr,
        (true, 0) => RegisterBank::FpInternal,
        (true, 1) => RegisterBank::Special,
        (true, 2) => RegisterBank::Indexed1,
        (true, _) => RegisterBank::Immediate,
    };

    let mut num = src_n as u32;
    if double_regs {
        num = double_reg(num, bank);
    }

    Operand {
        bank,
        num,
        ext,
        ..Operand::default()
    }
}
