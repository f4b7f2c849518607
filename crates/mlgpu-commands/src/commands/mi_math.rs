//! MI_MATH and its ALU instruction encoding.
//!
//! Each ALU instruction is one dword: 31:20 opcode, 19:10 operand 1, 9:0 operand 2.

use core::fmt;

use super::{check_header, check_out_len, GpuCommand};
use crate::bits::field_get;
use crate::error::{Error, Result};
use crate::gen::Generation;
use crate::header::CommandKind;

/// DWordLength is 8 bits wide, but the command streamer caps MI_MATH at 64 ALU dwords.
pub const MI_MATH_MAX_INSTRUCTIONS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AluOpcode {
    Noop,
    Load,
    LoadInv,
    Load0,
    Load1,
    Add,
    Sub,
    And,
    Or,
    Xor,
    Store,
    StoreInv,
}

impl AluOpcode {
    pub const fn bits(self) -> u32 {
        match self {
            AluOpcode::Noop => 0x000,
            AluOpcode::Load => 0x080,
            AluOpcode::LoadInv => 0x480,
            AluOpcode::Load0 => 0x081,
            AluOpcode::Load1 => 0x481,
            AluOpcode::Add => 0x100,
            AluOpcode::Sub => 0x101,
            AluOpcode::And => 0x102,
            AluOpcode::Or => 0x103,
            AluOpcode::Xor => 0x104,
            AluOpcode::Store => 0x180,
            AluOpcode::StoreInv => 0x580,
        }
    }

    pub const fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            0x000 => AluOpcode::Noop,
            0x080 => AluOpcode::Load,
            0x480 => AluOpcode::LoadInv,
            0x081 => AluOpcode::Load0,
            0x481 => AluOpcode::Load1,
            0x100 => AluOpcode::Add,
            0x101 => AluOpcode::Sub,
            0x102 => AluOpcode::And,
            0x103 => AluOpcode::Or,
            0x104 => AluOpcode::Xor,
            0x180 => AluOpcode::Store,
            0x580 => AluOpcode::StoreInv,
            _ => return None,
        })
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            AluOpcode::Noop => "NOOP",
            AluOpcode::Load => "LOAD",
            AluOpcode::LoadInv => "LOADINV",
            AluOpcode::Load0 => "LOAD0",
            AluOpcode::Load1 => "LOAD1",
            AluOpcode::Add => "ADD",
            AluOpcode::Sub => "SUB",
            AluOpcode::And => "AND",
            AluOpcode::Or => "OR",
            AluOpcode::Xor => "XOR",
            AluOpcode::Store => "STORE",
            AluOpcode::StoreInv => "STOREINV",
        }
    }
}

/// ALU operand: a command streamer GPR or one of the ALU-internal registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AluOperand {
    /// CS_GPR0..CS_GPR15.
    Gpr(u8),
    SrcA,
    SrcB,
    Accu,
    Zf,
    Cf,
}

impl AluOperand {
    pub const fn bits(self) -> u32 {
        match self {
            AluOperand::Gpr(n) => n as u32,
            AluOperand::SrcA => 0x20,
            AluOperand::SrcB => 0x21,
            AluOperand::Accu => 0x31,
            AluOperand::Zf => 0x32,
            AluOperand::Cf => 0x33,
        }
    }

    pub const fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            0x00..=0x0F => AluOperand::Gpr(bits as u8),
            0x20 => AluOperand::SrcA,
            0x21 => AluOperand::SrcB,
            0x31 => AluOperand::Accu,
            0x32 => AluOperand::Zf,
            0x33 => AluOperand::Cf,
            _ => return None,
        })
    }

    fn check(self) -> Result<()> {
        match self {
            AluOperand::Gpr(n) if n > 15 => Err(Error::InvalidRegisterIndex {
                index: u32::from(n),
                max: 15,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for AluOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AluOperand::Gpr(n) => write!(f, "R{n}"),
            AluOperand::SrcA => f.write_str("SRCA"),
            AluOperand::SrcB => f.write_str("SRCB"),
            AluOperand::Accu => f.write_str("ACCU"),
            AluOperand::Zf => f.write_str("ZF"),
            AluOperand::Cf => f.write_str("CF"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AluInstruction {
    pub opcode: AluOpcode,
    pub operand1: AluOperand,
    pub operand2: AluOperand,
}

impl AluInstruction {
    const NONE: AluOperand = AluOperand::Gpr(0);

    pub const fn new(opcode: AluOpcode, operand1: AluOperand, operand2: AluOperand) -> Self {
        Self {
            opcode,
            operand1,
            operand2,
        }
    }

    pub const fn noop() -> Self {
        Self::new(AluOpcode::Noop, Self::NONE, Self::NONE)
    }

    /// `dst` (SRCA or SRCB) <- GPR `src`.
    pub const fn load(dst: AluOperand, src: AluOperand) -> Self {
        Self::new(AluOpcode::Load, dst, src)
    }

    pub const fn load_inv(dst: AluOperand, src: AluOperand) -> Self {
        Self::new(AluOpcode::LoadInv, dst, src)
    }

    pub const fn load0(dst: AluOperand) -> Self {
        Self::new(AluOpcode::Load0, dst, Self::NONE)
    }

    pub const fn load1(dst: AluOperand) -> Self {
        Self::new(AluOpcode::Load1, dst, Self::NONE)
    }

    pub const fn add() -> Self {
        Self::new(AluOpcode::Add, Self::NONE, Self::NONE)
    }

    pub const fn sub() -> Self {
        Self::new(AluOpcode::Sub, Self::NONE, Self::NONE)
    }

    pub const fn and() -> Self {
        Self::new(AluOpcode::And, Self::NONE, Self::NONE)
    }

    pub const fn or() -> Self {
        Self::new(AluOpcode::Or, Self::NONE, Self::NONE)
    }

    pub const fn xor() -> Self {
        Self::new(AluOpcode::Xor, Self::NONE, Self::NONE)
    }

    /// GPR `dst` <- `src` (ACCU, ZF, CF, SRCA or SRCB).
    pub const fn store(dst: AluOperand, src: AluOperand) -> Self {
        Self::new(AluOpcode::Store, dst, src)
    }

    pub const fn store_inv(dst: AluOperand, src: AluOperand) -> Self {
        Self::new(AluOpcode::StoreInv, dst, src)
    }

    pub const fn to_dword(self) -> u32 {
        (self.opcode.bits() << 20) | (self.operand1.bits() << 10) | self.operand2.bits()
    }

    pub fn from_dword(dword: u32) -> Result<Self> {
        let invalid = Error::InvalidAluInstruction { dword };
        let opcode = AluOpcode::from_bits(field_get(dword, 31, 20)).ok_or(invalid.clone())?;
        let operand1 = AluOperand::from_bits(field_get(dword, 19, 10)).ok_or(invalid.clone())?;
        let operand2 = AluOperand::from_bits(field_get(dword, 9, 0)).ok_or(invalid)?;
        Ok(Self::new(opcode, operand1, operand2))
    }
}

impl fmt::Display for AluInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode.mnemonic();
        match self.opcode {
            AluOpcode::Load | AluOpcode::LoadInv | AluOpcode::Store | AluOpcode::StoreInv => {
                write!(f, "{op} {}, {}", self.operand1, self.operand2)
            }
            AluOpcode::Load0 | AluOpcode::Load1 => write!(f, "{op} {}", self.operand1),
            _ => f.write_str(op),
        }
    }
}

/// MI_MATH: run a short ALU program over the CS GPRs.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiMath {
    pub instructions: Vec<AluInstruction>,
}

impl Default for MiMath {
    fn default() -> Self {
        Self {
            instructions: vec![AluInstruction::noop()],
        }
    }
}

impl MiMath {
    pub fn new(instructions: Vec<AluInstruction>) -> Self {
        Self { instructions }
    }

    /// `dst = a + b` over 64-bit GPRs.
    pub fn add(dst: u8, a: u8, b: u8) -> Self {
        Self::binary(AluInstruction::add(), dst, a, b)
    }

    /// `dst = a - b` over 64-bit GPRs.
    pub fn sub(dst: u8, a: u8, b: u8) -> Self {
        Self::binary(AluInstruction::sub(), dst, a, b)
    }

    fn binary(op: AluInstruction, dst: u8, a: u8, b: u8) -> Self {
        Self::new(vec![
            AluInstruction::load(AluOperand::SrcA, AluOperand::Gpr(a)),
            AluInstruction::load(AluOperand::SrcB, AluOperand::Gpr(b)),
            op,
            AluInstruction::store(AluOperand::Gpr(dst), AluOperand::Accu),
        ])
    }

    fn check_count(&self) -> Result<()> {
        let count = self.instructions.len();
        if count == 0 || count > MI_MATH_MAX_INSTRUCTIONS {
            return Err(Error::AluInstructionCount {
                count,
                max: MI_MATH_MAX_INSTRUCTIONS,
            });
        }
        Ok(())
    }
}

impl GpuCommand for MiMath {
    const KIND: CommandKind = CommandKind::MiMath;
    const SIZE_BYTES: usize = 8;

    fn dword_count(&self) -> usize {
        1 + self.instructions.len()
    }

    fn encode(&self, _gen: Generation, out: &mut [u32]) -> Result<()> {
        self.check_count()?;
        for alu in &self.instructions {
            alu.operand1.check()?;
            alu.operand2.check()?;
        }
        let dwords = self.dword_count();
        check_out_len(Self::KIND, out, dwords)?;
        out[0] = Self::KIND.header(dwords);
        for (slot, alu) in out[1..].iter_mut().zip(&self.instructions) {
            *slot = alu.to_dword();
        }
        Ok(())
    }

    fn decode(_gen: Generation, words: &[u32]) -> Result<Self> {
        check_header(Self::KIND, words)?;
        let math = Self::new(
            words[1..]
                .iter()
                .map(|&dword| AluInstruction::from_dword(dword))
                .collect::<Result<Vec<_>>>()?,
        );
        math.check_count()?;
        Ok(math)
    }
}
