//! Register load/store commands: MI_LOAD_REGISTER_IMM/REG/MEM and MI_STORE_REGISTER_MEM.

use super::{check_fixed, check_out_len, GpuCommand};
use crate::bits::{
    decode_address_checked, decode_register, encode_address, encode_register, field_get, field_set, flag_get, flag_set,
    gated_flag_get, gated_flag_set,
};
use crate::error::Result;
use crate::gen::Generation;
use crate::header::CommandKind;

const MMIO_REMAP_ENABLE_BIT: u32 = 17;
const ADD_CS_MMIO_START_OFFSET_BIT: u32 = 19;

/// Encode the two MMIO addressing bits shared by LRI, LRM and SRM.
fn set_mmio_bits(dw0: u32, gen: Generation, mmio_remap_enable: bool, add_cs_mmio_start_offset: bool) -> Result<u32> {
    let dw0 = gated_flag_set(
        dw0,
        MMIO_REMAP_ENABLE_BIT,
        mmio_remap_enable,
        gen.has_mmio_remap(),
        "mmio_remap_enable",
        gen,
    )?;
    gated_flag_set(
        dw0,
        ADD_CS_MMIO_START_OFFSET_BIT,
        add_cs_mmio_start_offset,
        gen.has_cs_mmio_start_offset(),
        "add_cs_mmio_start_offset",
        gen,
    )
}

fn get_mmio_bits(dw0: u32, gen: Generation) -> (bool, bool) {
    (
        gated_flag_get(dw0, MMIO_REMAP_ENABLE_BIT, gen.has_mmio_remap(), "mmio_remap_enable", gen),
        gated_flag_get(
            dw0,
            ADD_CS_MMIO_START_OFFSET_BIT,
            gen.has_cs_mmio_start_offset(),
            "add_cs_mmio_start_offset",
            gen,
        ),
    )
}

/// MI_LOAD_REGISTER_IMM with a single register/value pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiLoadRegisterImm {
    /// Bits 11:8. A set bit keeps the corresponding byte lane of the register.
    pub byte_write_disables: u8,
    pub mmio_remap_enable: bool,
    pub add_cs_mmio_start_offset: bool,
    pub register_offset: u32,
    pub data: u32,
}

impl GpuCommand for MiLoadRegisterImm {
    const KIND: CommandKind = CommandKind::MiLoadRegisterImm;
    const SIZE_BYTES: usize = 12;

    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 3)?;
        let dw0 = field_set(
            Self::KIND.header(3),
            11,
            8,
            u32::from(self.byte_write_disables),
            "byte_write_disables",
        )?;
        out[0] = set_mmio_bits(dw0, gen, self.mmio_remap_enable, self.add_cs_mmio_start_offset)?;
        out[1] = encode_register("register_offset", self.register_offset)?;
        out[2] = self.data;
        Ok(())
    }

    fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 3)?;
        let (mmio_remap_enable, add_cs_mmio_start_offset) = get_mmio_bits(words[0], gen);
        Ok(Self {
            byte_write_disables: field_get(words[0], 11, 8) as u8,
            mmio_remap_enable,
            add_cs_mmio_start_offset,
            register_offset: decode_register(words[1]),
            data: words[2],
        })
    }
}

/// MI_LOAD_REGISTER_REG: copy one MMIO register into another.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiLoadRegisterReg {
    pub mmio_remap_enable_source: bool,
    pub mmio_remap_enable_destination: bool,
    pub add_cs_mmio_start_offset_source: bool,
    pub add_cs_mmio_start_offset_destination: bool,
    pub source_register: u32,
    pub destination_register: u32,
}

impl GpuCommand for MiLoadRegisterReg {
    const KIND: CommandKind = CommandKind::MiLoadRegisterReg;
    const SIZE_BYTES: usize = 12;

    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 3)?;
        let remap = gen.has_mmio_remap();
        let offset = gen.has_cs_mmio_start_offset();
        let mut dw0 = Self::KIND.header(3);
        dw0 = gated_flag_set(dw0, 16, self.mmio_remap_enable_source, remap, "mmio_remap_enable_source", gen)?;
        dw0 = gated_flag_set(
            dw0,
            17,
            self.mmio_remap_enable_destination,
            remap,
            "mmio_remap_enable_destination",
            gen,
        )?;
        dw0 = gated_flag_set(
            dw0,
            18,
            self.add_cs_mmio_start_offset_source,
            offset,
            "add_cs_mmio_start_offset_source",
            gen,
        )?;
        dw0 = gated_flag_set(
            dw0,
            19,
            self.add_cs_mmio_start_offset_destination,
            offset,
            "add_cs_mmio_start_offset_destination",
            gen,
        )?;
        out[0] = dw0;
        out[1] = encode_register("source_register", self.source_register)?;
        out[2] = encode_register("destination_register", self.destination_register)?;
        Ok(())
    }

    fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 3)?;
        let dw0 = words[0];
        let remap = gen.has_mmio_remap();
        let offset = gen.has_cs_mmio_start_offset();
        Ok(Self {
            mmio_remap_enable_source: gated_flag_get(dw0, 16, remap, "mmio_remap_enable_source", gen),
            mmio_remap_enable_destination: gated_flag_get(dw0, 17, remap, "mmio_remap_enable_destination", gen),
            add_cs_mmio_start_offset_source: gated_flag_get(dw0, 18, offset, "add_cs_mmio_start_offset_source", gen),
            add_cs_mmio_start_offset_destination: gated_flag_get(
                dw0,
                19,
                offset,
                "add_cs_mmio_start_offset_destination",
                gen,
            ),
            source_register: decode_register(words[1]),
            destination_register: decode_register(words[2]),
        })
    }
}

/// MI_LOAD_REGISTER_MEM: load a register from a dword in memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiLoadRegisterMem {
    pub use_global_gtt: bool,
    pub async_mode_enable: bool,
    pub mmio_remap_enable: bool,
    pub add_cs_mmio_start_offset: bool,
    pub register_offset: u32,
    pub memory_address: u64,
}

impl GpuCommand for MiLoadRegisterMem {
    const KIND: CommandKind = CommandKind::MiLoadRegisterMem;
    const SIZE_BYTES: usize = 16;

    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 4)?;
        let mut dw0 = Self::KIND.header(4);
        dw0 = flag_set(dw0, 21, self.async_mode_enable);
        dw0 = flag_set(dw0, 22, self.use_global_gtt);
        out[0] = set_mmio_bits(dw0, gen, self.mmio_remap_enable, self.add_cs_mmio_start_offset)?;
        out[1] = encode_register("register_offset", self.register_offset)?;
        let [lo, hi] = encode_address("memory_address", self.memory_address, 2, gen.gpu_address_bits())?;
        out[2] = lo;
        out[3] = hi;
        Ok(())
    }

    fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 4)?;
        let (mmio_remap_enable, add_cs_mmio_start_offset) = get_mmio_bits(words[0], gen);
        Ok(Self {
            use_global_gtt: flag_get(words[0], 22),
            async_mode_enable: flag_get(words[0], 21),
            mmio_remap_enable,
            add_cs_mmio_start_offset,
            register_offset: decode_register(words[1]),
            memory_address: decode_address_checked(
                "memory_address",
                words[2],
                words[3],
                2,
                2,
                gen.gpu_address_bits(),
            )?,
        })
    }
}

/// MI_STORE_REGISTER_MEM: store a register dword to memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiStoreRegisterMem {
    pub use_global_gtt: bool,
    pub predicate_enable: bool,
    pub mmio_remap_enable: bool,
    pub add_cs_mmio_start_offset: bool,
    pub register_offset: u32,
    pub memory_address: u64,
}

impl GpuCommand for MiStoreRegisterMem {
    const KIND: CommandKind = CommandKind::MiStoreRegisterMem;
    const SIZE_BYTES: usize = 16;

    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 4)?;
        let mut dw0 = Self::KIND.header(4);
        dw0 = flag_set(dw0, 21, self.predicate_enable);
        dw0 = flag_set(dw0, 22, self.use_global_gtt);
        out[0] = set_mmio_bits(dw0, gen, self.mmio_remap_enable, self.add_cs_mmio_start_offset)?;
        out[1] = encode_register("register_offset", self.register_offset)?;
        let [lo, hi] = encode_address("memory_address", self.memory_address, 2, gen.gpu_address_bits())?;
        out[2] = lo;
        out[3] = hi;
        Ok(())
    }

    fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 4)?;
        let (mmio_remap_enable, add_cs_mmio_start_offset) = get_mmio_bits(words[0], gen);
        Ok(Self {
            use_global_gtt: flag_get(words[0], 22),
            predicate_enable: flag_get(words[0], 21),
            mmio_remap_enable,
            add_cs_mmio_start_offset,
            register_offset: decode_register(words[1]),
            memory_address: decode_address_checked(
                "memory_address",
                words[2],
                words[3],
                2,
                2,
                gen.gpu_address_bits(),
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn lri_mmio_bits_follow_generation() {
        let lri = MiLoadRegisterImm {
            mmio_remap_enable: true,
            register_offset: 0x2600,
            data: 7,
            ..Default::default()
        };
        assert!(matches!(
            lri.to_dwords(Generation::Gen11),
            Err(Error::UnsupportedField {
                field: "mmio_remap_enable",
                gen: Generation::Gen11
            })
        ));
        assert_eq!(lri.to_dwords(Generation::Gen12).unwrap(), vec![0x1102_0001, 0x2600, 7]);
    }

    #[test]
    fn reserved_mmio_bits_decode_as_clear_on_older_generations() {
        let words = [0x1102_0001, 0x2600, 7];
        let lri = MiLoadRegisterImm::decode(Generation::Gen9, &words).unwrap();
        assert!(!lri.mmio_remap_enable);
        assert_eq!(lri.data, 7);
    }
}
