use super::{check_fixed, check_out_len, GpuCommand};
use crate::bits::{field_get, field_set, flag_get, flag_set};
use crate::error::Result;
use crate::gen::Generation;
use crate::header::CommandKind;

/// MI_NOOP. Also used as padding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiNoop {
    /// Bits 21:0, latched into the NOPID register when the write enable is set.
    pub identification_number: u32,
    pub identification_number_register_write_enable: bool,
}

impl GpuCommand for MiNoop {
    const KIND: CommandKind = CommandKind::MiNoop;
    const SIZE_BYTES: usize = 4;

    fn encode(&self, _gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 1)?;
        let dw0 = field_set(Self::KIND.header(1), 21, 0, self.identification_number, "identification_number")?;
        out[0] = flag_set(dw0, 22, self.identification_number_register_write_enable);
        Ok(())
    }

    fn decode(_gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 1)?;
        Ok(Self {
            identification_number: field_get(words[0], 21, 0),
            identification_number_register_write_enable: flag_get(words[0], 22),
        })
    }
}

/// MI_BATCH_BUFFER_END.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiBatchBufferEnd {}

impl GpuCommand for MiBatchBufferEnd {
    const KIND: CommandKind = CommandKind::MiBatchBufferEnd;
    const SIZE_BYTES: usize = 4;

    fn encode(&self, _gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 1)?;
        out[0] = Self::KIND.header(1);
        Ok(())
    }

    fn decode(_gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 1)?;
        Ok(Self {})
    }
}
