#![forbid(unsafe_code)]

//! Bit-exact encoding and decoding of the GPU command-stream instructions used to
//! collect performance queries (`PIPE_CONTROL`, `MI_REPORT_PERF_COUNT`,
//! `MI_STORE_REGISTER_MEM`, ...).
//!
//! The layouts are hardware ABI: every field offset, width and default header
//! dword must match what the command streamer parses. Per-platform differences
//! are selected at runtime through [`Generation`].
//!
//! Layers, bottom-up:
//! - [`bits`]: shift/mask field helpers and GPU address packing.
//! - [`header`]: dword 0 classification ([`CommandKind`] and command length).
//! - [`commands`]: typed layouts implementing [`GpuCommand`], plus the [`Command`] enum.
//! - [`stream`]: walking a batch buffer into raw/decoded commands.
//! - [`buffer`]: [`CommandBuffer`] writer and [`SizeCalculator`].
//! - [`query`]: begin/end sequences for timestamp and HW counter queries, and report parsing.
//! - [`exec`]: a software command streamer used to validate sequences without hardware.

pub mod bits;
pub mod buffer;
pub mod commands;
pub mod error;
pub mod exec;
pub mod gen;
pub mod header;
pub mod query;
pub mod registers;
pub mod status;
pub mod stream;

pub use buffer::{CommandBuffer, CommandSink, SizeCalculator};
pub use commands::{Command, GpuCommand};
pub use error::{Error, Result};
pub use gen::Generation;
pub use header::CommandKind;
pub use status::StatusCode;
