//! OSTC-class binary log decoder.
//!
//! The log is a fixed header followed by `sample_count` records of
//! `record_size` bytes, one per `interval` seconds. Where each header and
//! record field sits depends on the firmware revision and is looked up in
//! the configured [`LogLayout`]s by the layout version byte that follows the
//! signature. Unknown revisions are rejected rather than guessed at.
//!
//! The record array has no framing to resync on, so unlike FIT a short body
//! is a hard [`DecodeError::TruncatedRecord`].

use nom::{
    bytes::complete::take,
    number::complete::{le_i16, le_u16, le_u8},
    sequence::preceded,
    IResult, Parser,
};

use crate::config::{DecoderConfig, LogLayout};
use crate::decode::sniff::BINARY_LOG_SIGNATURE;
use crate::error::DecodeError;
use crate::models::RawSample;

/// Offset of the layout version byte, right after the signature.
const VERSION_OFFSET: usize = 2;

/// Raw value meaning "no reading" for unsigned record fields.
const NO_READING: u16 = u16::MAX;

#[derive(Debug)]
struct LogHeader<'a> {
    layout: &'a LogLayout,
    sample_count: u16,
    interval_s: u8,
    record_size: u8,
}

fn read_at<'a, O>(
    bytes: &'a [u8],
    offset: u32,
    parser: fn(&'a [u8]) -> IResult<&'a [u8], O>,
) -> Option<O> {
    let (_, value) = preceded(take(offset as usize), parser).parse(bytes).ok()?;
    Some(value)
}

fn malformed(message: impl Into<String>) -> DecodeError {
    let message = message.into();
    tracing::warn!("Rejecting binary log header: {}", message);
    DecodeError::MalformedHeader(message)
}

fn parse_header<'a>(data: &[u8], config: &'a DecoderConfig) -> Result<LogHeader<'a>, DecodeError> {
    if !data.starts_with(&BINARY_LOG_SIGNATURE) {
        return Err(malformed("missing device signature"));
    }
    let version = *data
        .get(VERSION_OFFSET)
        .ok_or_else(|| malformed("header ends before layout version"))?;
    let layout = config
        .log_layouts
        .iter()
        .find(|l| l.version == version)
        .ok_or_else(|| malformed(format!("unknown layout version {}", version)))?;

    let header_len = layout.header_len as usize;
    if data.len() < header_len {
        return Err(DecodeError::TruncatedRecord {
            offset: data.len(),
            needed: header_len - data.len(),
        });
    }
    let header = &data[..header_len];

    let field = |name: &str, value: Option<u16>| {
        value.ok_or_else(|| malformed(format!("{} lies outside the header", name)))
    };
    let sample_count = field(
        "sample count",
        read_at(header, layout.sample_count_offset, le_u16),
    )?;
    let interval_s = field(
        "interval",
        read_at(header, layout.interval_offset, le_u8).map(u16::from),
    )? as u8;
    let record_size = field(
        "record size",
        read_at(header, layout.record_size_offset, le_u8).map(u16::from),
    )? as u8;
    let max_depth_raw = field(
        "max depth",
        read_at(header, layout.max_depth_offset, le_u16),
    )?;

    if sample_count == 0 || u32::from(sample_count) > config.max_samples {
        return Err(malformed(format!(
            "implausible sample count {} (max {})",
            sample_count, config.max_samples
        )));
    }
    if interval_s == 0 {
        return Err(malformed("sample interval is zero"));
    }
    if u64::from(record_size) < layout.min_record_size() {
        return Err(malformed(format!(
            "record size {} too small for layout {} (needs {})",
            record_size,
            layout.version,
            layout.min_record_size()
        )));
    }
    let max_depth_m = f64::from(max_depth_raw) * layout.max_depth_scale;
    if max_depth_m > config.max_depth_m {
        return Err(malformed(format!(
            "max depth {:.1} m exceeds limit {:.1} m",
            max_depth_m, config.max_depth_m
        )));
    }

    tracing::debug!(
        "Binary log layout {}: {} samples every {} s, {} byte records, max depth {:.1} m",
        layout.version,
        sample_count,
        interval_s,
        record_size,
        max_depth_m
    );

    Ok(LogHeader {
        layout,
        sample_count,
        interval_s,
        record_size,
    })
}

fn decode_record(layout: &LogLayout, record: &[u8], elapsed_seconds: f64) -> RawSample {
    let depth_m = read_at(record, layout.depth_offset, le_u16)
        .filter(|&raw| raw != NO_READING)
        .map(|raw| f64::from(raw) * layout.depth_scale);
    let temperature_c = layout
        .temperature_offset
        .and_then(|off| read_at(record, off, le_i16))
        .filter(|&raw| raw != i16::MAX)
        .map(|raw| f64::from(raw) * layout.temperature_scale);
    let tank_pressure_bar = layout
        .pressure_offset
        .and_then(|off| read_at(record, off, le_u16))
        // zero means no transmitter paired
        .filter(|&raw| raw != NO_READING && raw != 0)
        .map(|raw| f64::from(raw) * layout.pressure_scale);

    RawSample {
        elapsed_seconds,
        depth_m,
        temperature_c,
        tank_pressure_bar,
    }
}

/// Decode a binary log into raw samples.
pub fn decode(data: &[u8], config: &DecoderConfig) -> Result<Vec<RawSample>, DecodeError> {
    let header = parse_header(data, config)?;
    let layout = header.layout;
    let header_len = layout.header_len as usize;
    let record_size = header.record_size as usize;

    let needed = header.sample_count as usize * record_size;
    let body = &data[header_len..];
    if body.len() < needed {
        let complete = body.len() / record_size;
        tracing::warn!(
            "Binary log body truncated after {} of {} records",
            complete,
            header.sample_count
        );
        return Err(DecodeError::TruncatedRecord {
            offset: header_len + complete * record_size,
            needed: needed - body.len(),
        });
    }

    let interval = f64::from(header.interval_s);
    let mut out_of_range = 0usize;
    let samples = body[..needed]
        .chunks_exact(record_size)
        .enumerate()
        .map(|(i, record)| {
            let mut sample = decode_record(layout, record, i as f64 * interval);
            if sample.depth_m.is_some_and(|d| d > config.max_depth_m) {
                out_of_range += 1;
                sample.depth_m = None;
            }
            sample
        })
        .collect();

    if out_of_range > 0 {
        tracing::debug!("Discarded {} out-of-range depth readings", out_of_range);
    }

    Ok(samples)
}
