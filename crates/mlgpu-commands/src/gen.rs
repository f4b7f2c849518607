//! Hardware generations and the layout variants they select.

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// GPU hardware generation.
///
/// The command layouts are shared across generations; newer generations only add
/// fields (MMIO remapping, extra PIPE_CONTROL flushes) and widen the GPU address
/// space. Variants are ordered oldest first so `gen >= Generation::Gen12` reads as
/// "Gen12 and later".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Generation {
    Gen9,
    Gen11,
    Gen12,
    XeHpg,
}

impl Generation {
    pub const ALL: [Generation; 4] = [
        Generation::Gen9,
        Generation::Gen11,
        Generation::Gen12,
        Generation::XeHpg,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Generation::Gen9 => "gen9",
            Generation::Gen11 => "gen11",
            Generation::Gen12 => "gen12",
            Generation::XeHpg => "xehpg",
        }
    }

    /// "Add CS MMIO Start Offset" bits on register commands.
    pub fn has_cs_mmio_start_offset(self) -> bool {
        self >= Generation::Gen11
    }

    /// "MMIO Remap Enable" bits on register commands.
    pub fn has_mmio_remap(self) -> bool {
        self >= Generation::Gen12
    }

    /// PIPE_CONTROL DW0 bit 9.
    pub fn has_hdc_pipeline_flush(self) -> bool {
        self >= Generation::Gen12
    }

    /// PIPE_CONTROL DW0 bits 10, 11, 13 and 14.
    pub fn has_xehp_pipe_control_flushes(self) -> bool {
        self >= Generation::XeHpg
    }

    /// Width of a GPU virtual address.
    pub fn gpu_address_bits(self) -> u32 {
        match self {
            Generation::Gen9 | Generation::Gen11 | Generation::Gen12 => 48,
            Generation::XeHpg => 57,
        }
    }

    /// Size of one OA report written by `MI_REPORT_PERF_COUNT`.
    pub fn oa_report_size_bytes(self) -> usize {
        256
    }

    /// Default command streamer timestamp frequency.
    pub fn timestamp_frequency_hz(self) -> u64 {
        match self {
            Generation::Gen9 | Generation::Gen11 => 12_000_000,
            Generation::Gen12 | Generation::XeHpg => 19_200_000,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown hardware generation {0:?} (expected gen9, gen11, gen12 or xehpg)")]
pub struct ParseGenerationError(pub String);

impl FromStr for Generation {
    type Err = ParseGenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gen9" | "skl" => Ok(Generation::Gen9),
            "gen11" | "icl" => Ok(Generation::Gen11),
            "gen12" | "tgl" | "xelp" => Ok(Generation::Gen12),
            "xehpg" | "dg2" => Ok(Generation::XeHpg),
            _ => Err(ParseGenerationError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        for gen in Generation::ALL {
            assert_eq!(gen.name().parse::<Generation>(), Ok(gen));
            assert_eq!(gen.name().to_uppercase().parse::<Generation>(), Ok(gen));
        }
        assert_eq!("dg2".parse::<Generation>(), Ok(Generation::XeHpg));
        assert!("gen7".parse::<Generation>().is_err());
    }

    #[test]
    fn capabilities_are_monotonic() {
        assert!(!Generation::Gen9.has_cs_mmio_start_offset());
        assert!(Generation::Gen11.has_cs_mmio_start_offset());
        assert!(!Generation::Gen11.has_mmio_remap());
        assert!(Generation::Gen12.has_mmio_remap());
        assert!(Generation::Gen12.has_hdc_pipeline_flush());
        assert!(!Generation::Gen12.has_xehp_pipe_control_flushes());
        assert!(Generation::XeHpg.has_xehp_pipe_control_flushes());
    }
}
