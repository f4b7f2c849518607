//! Walking a batch buffer command by command.
//!
//! The iterator only trusts dword 0 of each command to find the next one; field
//! decoding happens lazily through [`RawCommand::decode`].

use crate::commands::Command;
use crate::error::{Error, Result};
use crate::gen::Generation;
use crate::header::{classify, CommandKind};

/// Reinterpret little-endian bytes as dwords.
pub fn dwords_from_le_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::UnalignedLength { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn dwords_to_le_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// One command located in a stream, not yet decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawCommand<'a> {
    pub gen: Generation,
    /// Offset of dword 0 from the start of the stream, in dwords.
    pub offset_dwords: usize,
    pub kind: CommandKind,
    pub words: &'a [u32],
}

impl RawCommand<'_> {
    pub fn offset_bytes(&self) -> usize {
        self.offset_dwords * 4
    }

    pub fn decode(&self) -> Result<Command> {
        Command::decode(self.gen, self.words)
    }
}

/// Iterator over the commands in a dword stream.
///
/// Yields `Err` once on the first malformed command and then stops.
#[derive(Clone, Debug)]
pub struct CommandIter<'a> {
    gen: Generation,
    words: &'a [u32],
    cursor: usize,
    stop_at_batch_buffer_end: bool,
    done: bool,
}

impl<'a> CommandIter<'a> {
    pub fn new(gen: Generation, words: &'a [u32]) -> Self {
        Self {
            gen,
            words,
            cursor: 0,
            stop_at_batch_buffer_end: true,
            done: false,
        }
    }

    /// Keep walking past `MI_BATCH_BUFFER_END` (default: stop after it).
    pub fn stop_at_batch_buffer_end(mut self, stop: bool) -> Self {
        self.stop_at_batch_buffer_end = stop;
        self
    }

    /// Dword offset of the next command.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = Result<RawCommand<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor >= self.words.len() {
            return None;
        }

        let offset = self.cursor;
        let dw0 = self.words[offset];
        let (kind, dwords) = match classify(dw0) {
            Ok(v) => v,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        let available = self.words.len() - offset;
        if dwords > available {
            self.done = true;
            return Some(Err(Error::Truncated {
                kind,
                offset,
                needed: dwords,
                available,
            }));
        }

        self.cursor += dwords;
        if kind == CommandKind::MiBatchBufferEnd && self.stop_at_batch_buffer_end {
            self.done = true;
        }
        tracing::trace!(offset, ?kind, dwords, "located command");
        Some(Ok(RawCommand {
            gen: self.gen,
            offset_dwords: offset,
            kind,
            words: &self.words[offset..offset + dwords],
        }))
    }
}

/// A fully decoded command together with its location and raw dwords.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DecodedCommand {
    pub offset_dwords: usize,
    pub command: Command,
    pub words: Vec<u32>,
}

/// Decode every command up to (and including) the first `MI_BATCH_BUFFER_END`.
pub fn decode_all(gen: Generation, words: &[u32]) -> Result<Vec<DecodedCommand>> {
    CommandIter::new(gen, words)
        .map(|raw| {
            let raw = raw?;
            Ok(DecodedCommand {
                offset_dwords: raw.offset_dwords,
                command: raw.decode()?,
                words: raw.words.to_vec(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unaligned_byte_length() {
        assert_eq!(
            dwords_from_le_bytes(&[0, 0, 0, 0, 1]),
            Err(Error::UnalignedLength { len: 5 })
        );
        assert_eq!(
            dwords_from_le_bytes(&[0x01, 0x00, 0x00, 0x11]).unwrap(),
            vec![0x1100_0001]
        );
    }

    #[test]
    fn stops_after_first_error() {
        // LRI claiming 3 dwords with only 2 present.
        let words = [0, 0x1100_0001, 0x2358];
        let mut iter = CommandIter::new(Generation::Gen9, &words);
        assert_eq!(iter.next().unwrap().unwrap().kind, CommandKind::MiNoop);
        assert!(matches!(
            iter.next(),
            Some(Err(Error::Truncated {
                offset: 1,
                needed: 3,
                available: 2,
                ..
            }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn batch_buffer_end_terminates_by_default() {
        let words = [0x0500_0000, 0, 0];
        assert_eq!(CommandIter::new(Generation::Gen12, &words).count(), 1);
        assert_eq!(
            CommandIter::new(Generation::Gen12, &words)
                .stop_at_batch_buffer_end(false)
                .count(),
            3
        );
    }
}
