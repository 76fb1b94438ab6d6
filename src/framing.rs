//! Splitting a byte range into sub-records.
//!
//! A stream of records is delimited either by an explicit length prefix in
//! front of each record, or Annex B style by start codes (a run of zero
//! bytes followed by `0x01`). Which one applies is decided by the
//! configuration alone, so a single format can decode both layouts.

use crate::config::Config;
use crate::context::DecodeContext;
use crate::diagnostics::DiagnosticKind;
use crate::error::DecodeResult;

/// Zero bytes required in front of `0x01` for a start code unless
/// overridden with the `start_code_min_zeros` option.
pub const DEFAULT_START_CODE_ZEROS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Each record is preceded by a big-endian length of `length_size`
    /// bytes.
    LengthPrefixed { length_size: u64 },
    /// Records are separated by start codes.
    StartCode { min_zeros: usize },
}

impl Framing {
    /// `record_length_size > 0` selects length prefixes, `0` start codes.
    pub fn from_config(config: &Config) -> Self {
        match config.record_length_size() {
            0 => Framing::StartCode {
                min_zeros: config
                    .get_u64("start_code_min_zeros")
                    .map(|n| n.max(1) as usize)
                    .unwrap_or(DEFAULT_START_CODE_ZEROS),
            },
            n => Framing::LengthPrefixed { length_size: n },
        }
    }

    /// Decode every record left in the current scope. Each record becomes a
    /// compound called `record` holding the dependency's tree under the
    /// same name (plus a `length` field in front when length-prefixed).
    pub fn decode_records(
        &self,
        d: &mut DecodeContext<'_, '_>,
        record: &str,
        dependency: &str,
    ) -> DecodeResult<()> {
        match *self {
            Framing::LengthPrefixed { length_size } => {
                decode_length_prefixed(d, length_size, record, dependency)
            }
            Framing::StartCode { min_zeros } => decode_start_codes(d, min_zeros, record, dependency),
        }
    }
}

fn decode_length_prefixed(
    d: &mut DecodeContext<'_, '_>,
    length_size: u64,
    record: &str,
    dependency: &str,
) -> DecodeResult<()> {
    let width = u32::try_from(length_size.saturating_mul(8)).unwrap_or(u32::MAX);
    while d.not_end() {
        d.check_cancelled()?;
        d.compound(record, |d| {
            let len = d.field_u("length", width)?;
            d.field_format_len(record, len.saturating_mul(8), dependency)?;
            Ok(())
        })?;
    }
    Ok(())
}

/// Position of one start code inside a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCode {
    pub offset: usize,
    /// Zero run plus the `0x01` byte.
    pub len: usize,
}

/// Find every start code in `bytes`. A start code is at least `min_zeros`
/// zero bytes followed by `0x01`; the whole zero run belongs to it.
pub fn find_start_codes(bytes: &[u8], min_zeros: usize) -> Vec<StartCode> {
    let min_zeros = min_zeros.max(1);
    let mut codes = Vec::new();
    let mut zeros = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            0x00 => zeros += 1,
            0x01 if zeros >= min_zeros => {
                codes.push(StartCode {
                    offset: i - zeros,
                    len: zeros + 1,
                });
                zeros = 0;
            }
            _ => zeros = 0,
        }
    }
    codes
}

fn decode_start_codes(
    d: &mut DecodeContext<'_, '_>,
    min_zeros: usize,
    record: &str,
    dependency: &str,
) -> DecodeResult<()> {
    if !d.is_byte_aligned() {
        let pad = (8 - d.position() % 8).min(d.remaining_bits());
        d.field_u("alignment_bits", pad as u32)?;
        d.error("start code scan must begin byte aligned");
    }

    let cursor = *d.cursor();
    let first = (cursor.position() / 8) as usize;
    let last = (cursor.end() / 8) as usize;
    let bytes = &cursor.data()[first..last.max(first)];

    let codes = find_start_codes(bytes, min_zeros);
    if codes.is_empty() {
        if !bytes.is_empty() {
            d.field_bytes("leading_bytes", bytes.len())?;
            d.error_kind(DiagnosticKind::MissingStartCode, "no start code found");
        }
        return finish_tail(d);
    }

    if codes[0].offset > 0 {
        d.field_bytes("leading_bytes", codes[0].offset)?;
    }

    for (i, code) in codes.iter().enumerate() {
        d.check_cancelled()?;
        let body_start = code.offset + code.len;
        let next = codes.get(i + 1).map(|c| c.offset).unwrap_or(bytes.len());
        let trailing = if i + 1 == codes.len() {
            bytes[body_start..next]
                .iter()
                .rev()
                .take_while(|&&b| b == 0)
                .count()
        } else {
            0
        };
        let body_len = (next - body_start - trailing) as u64;

        d.compound(record, |d| {
            d.skip_bits(code.len as u64 * 8)?;
            d.field_format_len(record, body_len * 8, dependency)?;
            Ok(())
        })?;

        if trailing > 0 {
            d.field_bytes("trailing_zero_bytes", trailing)?;
        }
    }
    finish_tail(d)
}

// Bits of a final partial byte cannot hold a start code.
fn finish_tail(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    let rest = d.remaining_bits();
    if rest > 0 {
        d.field_u("trailing_bits", rest.min(64) as u32)?;
    }
    Ok(())
}
