#![forbid(unsafe_code)]

//! Helpers behind the `mlgpu-dump` binary: batch buffer rendering and query
//! template generation.

use std::fmt::Write as _;

use clap::ValueEnum;
use mlgpu_commands::query::{HwCountersQuery, PipelineTimestampsQuery, Query};
use mlgpu_commands::stream::{CommandIter, DecodedCommand};
use mlgpu_commands::{CommandBuffer, CommandSink, Generation};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("offset {offset} is not dword aligned")]
    UnalignedOffset { offset: usize },

    #[error("offset {offset} is past the end of the {len}-byte buffer")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error(transparent)]
    Command(#[from] mlgpu_commands::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid number {0:?} (expected decimal or 0x-prefixed hex)")]
pub struct ParseNumberError(pub String);

/// Parse a decimal or `0x`-prefixed hexadecimal number. `_` separators are allowed.
pub fn parse_u64(s: &str) -> Result<u64, ParseNumberError> {
    let cleaned: String = s.trim().chars().filter(|&c| c != '_').collect();
    let parsed = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|_| ParseNumberError(s.to_string()))
}

pub fn parse_u32(s: &str) -> Result<u32, ParseNumberError> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| ParseNumberError(s.to_string()))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum QueryKind {
    Timestamps,
    HwCounters,
}

/// Decode the commands in `bytes`, starting `offset` bytes in.
///
/// Offsets in the result are relative to the start of `bytes`.
pub fn decode_bytes(
    gen: Generation,
    bytes: &[u8],
    offset: usize,
    stop_at_batch_buffer_end: bool,
) -> Result<Vec<DecodedCommand>, DumpError> {
    if offset % 4 != 0 {
        return Err(DumpError::UnalignedOffset { offset });
    }
    if offset > bytes.len() {
        return Err(DumpError::OffsetOutOfRange {
            offset,
            len: bytes.len(),
        });
    }
    let words = mlgpu_commands::stream::dwords_from_le_bytes(&bytes[offset..])?;
    let base = offset / 4;

    let mut out = Vec::new();
    for raw in CommandIter::new(gen, &words).stop_at_batch_buffer_end(stop_at_batch_buffer_end) {
        let raw = raw?;
        out.push(DecodedCommand {
            offset_dwords: base + raw.offset_dwords,
            command: raw.decode()?,
            words: raw.words.to_vec(),
        });
    }
    tracing::debug!(commands = out.len(), %gen, "decoded batch buffer");
    Ok(out)
}

/// One line per command: byte offset, decoded fields, raw dwords.
pub fn render_text(commands: &[DecodedCommand]) -> String {
    let mut out = String::new();
    for cmd in commands {
        let words: Vec<String> = cmd.words.iter().map(|w| format!("{w:08x}")).collect();
        let _ = writeln!(
            out,
            "0x{:04x}  {}  [{}]",
            cmd.offset_dwords * 4,
            cmd.command,
            words.join(" ")
        );
    }
    out
}

#[derive(Serialize)]
struct JsonDump<'a> {
    generation: Generation,
    commands: &'a [DecodedCommand],
}

pub fn render_json(gen: Generation, commands: &[DecodedCommand]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonDump {
        generation: gen,
        commands,
    })
}

/// Parameters of a query template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTemplate {
    pub kind: QueryKind,
    pub report_address: u64,
    pub report_id: u32,
    pub user_registers: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltQuery {
    /// Begin sequence, end sequence, then `MI_BATCH_BUFFER_END`.
    pub words: Vec<u32>,
    pub report_size_bytes: usize,
}

impl BuiltQuery {
    pub fn to_le_bytes(&self) -> Vec<u8> {
        mlgpu_commands::stream::dwords_to_le_bytes(&self.words)
    }
}

fn write_query<Q: Query>(query: &Q, buf: &mut CommandBuffer) -> Result<(), DumpError> {
    query.write_begin(buf)?;
    query.write_end(buf)?;
    buf.batch_buffer_end()?;
    Ok(())
}

pub fn build_query(gen: Generation, template: &QueryTemplate) -> Result<BuiltQuery, DumpError> {
    let mut buf = CommandBuffer::new(gen);
    let report_size_bytes = match template.kind {
        QueryKind::Timestamps => {
            write_query(&PipelineTimestampsQuery::new(template.report_address), &mut buf)?;
            PipelineTimestampsQuery::REPORT_SIZE_BYTES
        }
        QueryKind::HwCounters => {
            let query = HwCountersQuery::new(template.report_address, template.report_id)
                .with_user_registers(template.user_registers.iter().copied());
            let layout = query.layout(gen)?;
            write_query(&query, &mut buf)?;
            layout.total_size
        }
    };
    Ok(BuiltQuery {
        words: buf.finish(),
        report_size_bytes,
    })
}
