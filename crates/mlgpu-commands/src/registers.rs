//! MMIO register offsets used by query sequences.

use crate::error::{Error, Result};
use crate::gen::Generation;

/// Render command streamer timestamp, low dword.
pub const RCS_TIMESTAMP: u32 = 0x2358;
pub const RCS_TIMESTAMP_UDW: u32 = 0x235C;

/// OA unit GPU ticks counter.
pub const GPU_TICKS: u32 = 0x2910;

pub const CS_GPR_BASE: u32 = 0x2600;
pub const CS_GPR_COUNT: u32 = 16;

/// Low dword of command streamer general purpose register `n`.
pub fn cs_gpr(n: u32) -> Result<u32> {
    if n >= CS_GPR_COUNT {
        return Err(Error::InvalidRegisterIndex {
            index: n,
            max: CS_GPR_COUNT - 1,
        });
    }
    Ok(CS_GPR_BASE + 8 * n)
}

/// High dword of GPR `n`.
pub fn cs_gpr_udw(n: u32) -> Result<u32> {
    Ok(cs_gpr(n)? + 4)
}

/// Inverse of [`cs_gpr`]/[`cs_gpr_udw`]: `(index, is_high_dword)`.
pub fn gpr_index(offset: u32) -> Option<(u32, bool)> {
    let rel = offset.checked_sub(CS_GPR_BASE)?;
    if rel >= CS_GPR_COUNT * 8 || rel % 4 != 0 {
        return None;
    }
    Some((rel / 8, rel % 8 == 4))
}

/// OA buffer control registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OaRegisters {
    pub status: u32,
    pub head: u32,
    pub tail: u32,
}

impl OaRegisters {
    pub fn for_generation(gen: Generation) -> Self {
        match gen {
            Generation::Gen9 | Generation::Gen11 => Self {
                status: 0x2B08,
                head: 0x2B0C,
                tail: 0x2B10,
            },
            Generation::Gen12 | Generation::XeHpg => Self {
                status: 0xDAFC,
                head: 0xDB00,
                tail: 0xDB04,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpr_offsets() {
        assert_eq!(cs_gpr(0), Ok(0x2600));
        assert_eq!(cs_gpr_udw(15), Ok(0x267C));
        assert_eq!(cs_gpr(16), Err(Error::InvalidRegisterIndex { index: 16, max: 15 }));
        assert_eq!(gpr_index(0x2614), Some((2, true)));
        assert_eq!(gpr_index(0x2680), None);
        assert_eq!(gpr_index(RCS_TIMESTAMP), None);
    }

    #[test]
    fn oa_registers_move_on_gen12() {
        assert_eq!(OaRegisters::for_generation(Generation::Gen9).status, 0x2B08);
        assert_eq!(OaRegisters::for_generation(Generation::XeHpg).tail, 0xDB04);
    }
}
