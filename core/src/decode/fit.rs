//! FIT record stream decoder.
//!
//! A FIT file is a 12 or 14 byte header followed by records. Definition
//! records bind a local message number (0-15) to a field layout; data records
//! are laid out per the latest definition for their local number. Only the
//! `record` and `tank_update` global messages are read, everything else is
//! skipped by size.
//!
//! Running out of bytes mid-record is recoverable: samples completed before
//! that point are returned along with a [`DecodeWarning::Truncated`].

use std::collections::BTreeMap;

use nom::{
    bytes::complete::{tag, take},
    multi::count,
    number::complete::{be_u16, le_u16, le_u32, le_u8},
    IResult, Parser,
};

use crate::decode::{DecodeWarning, DecodedSamples};
use crate::error::DecodeError;
use crate::models::RawSample;

// ============================================================================
// Profile Constants
// ============================================================================

const RECORD_MESSAGE: u16 = 20;
const TANK_UPDATE_MESSAGE: u16 = 319;

const FIELD_TIMESTAMP: u8 = 253;

const RECORD_ALTITUDE: u8 = 2;
const RECORD_TEMPERATURE: u8 = 13;
const RECORD_ENHANCED_ALTITUDE: u8 = 78;
const RECORD_DEPTH: u8 = 92;

const TANK_UPDATE_PRESSURE: u8 = 1;

const MAX_LOCAL_MESSAGES: usize = 16;
const CRC_SIZE: usize = 2;

// ============================================================================
// Wire Structures
// ============================================================================

#[derive(Debug)]
struct FileHeader {
    header_size: u8,
    data_size: u32,
}

#[derive(Debug, Clone, Copy)]
struct FieldDef {
    number: u8,
    size: u8,
    base_type: u8,
}

#[derive(Debug, Clone)]
struct Definition {
    big_endian: bool,
    global_message: u16,
    fields: Vec<FieldDef>,
    developer_bytes: usize,
}

impl Definition {
    fn data_size(&self) -> usize {
        self.fields.iter().map(|f| f.size as usize).sum::<usize>() + self.developer_bytes
    }
}

#[derive(Debug, Clone, Copy)]
enum RecordHeader {
    Definition { local: u8, developer: bool },
    Data { local: u8 },
    CompressedTimestamp { local: u8, time_offset: u8 },
}

/// Values collected for one timestamp before it becomes a sample.
#[derive(Debug, Default, Clone)]
struct PendingSample {
    depth_m: Option<f64>,
    temperature_c: Option<f64>,
    tank_pressure_bar: Option<f64>,
}

// ============================================================================
// Parsers
// ============================================================================

fn file_header(input: &[u8]) -> IResult<&[u8], FileHeader> {
    let (input, header_size) = le_u8(input)?;
    let (input, _protocol_version) = le_u8(input)?;
    let (input, _profile_version) = le_u16(input)?;
    let (input, data_size) = le_u32(input)?;
    let (input, _) = tag(&b".FIT"[..]).parse(input)?;
    Ok((
        input,
        FileHeader {
            header_size,
            data_size,
        },
    ))
}

fn record_header(input: &[u8]) -> IResult<&[u8], RecordHeader> {
    let (input, byte) = le_u8(input)?;
    let header = if byte & 0x80 != 0 {
        RecordHeader::CompressedTimestamp {
            local: (byte >> 5) & 0x03,
            time_offset: byte & 0x1F,
        }
    } else if byte & 0x40 != 0 {
        RecordHeader::Definition {
            local: byte & 0x0F,
            developer: byte & 0x20 != 0,
        }
    } else {
        RecordHeader::Data { local: byte & 0x0F }
    };
    Ok((input, header))
}

fn field_def(input: &[u8]) -> IResult<&[u8], FieldDef> {
    let (input, number) = le_u8(input)?;
    let (input, size) = le_u8(input)?;
    let (input, base_type) = le_u8(input)?;
    Ok((
        input,
        FieldDef {
            number,
            size,
            base_type,
        },
    ))
}

fn definition_body(input: &[u8], developer: bool) -> IResult<&[u8], Definition> {
    let (input, _reserved) = le_u8(input)?;
    let (input, architecture) = le_u8(input)?;
    let big_endian = architecture == 1;
    let (input, global_message) = if big_endian {
        be_u16(input)?
    } else {
        le_u16(input)?
    };
    let (input, field_count) = le_u8(input)?;
    let (input, fields) = count(field_def, field_count as usize).parse(input)?;

    let (input, developer_bytes) = if developer {
        let (input, dev_count) = le_u8(input)?;
        let (input, dev_fields) = count(field_def, dev_count as usize).parse(input)?;
        (input, dev_fields.iter().map(|f| f.size as usize).sum())
    } else {
        (input, 0)
    };

    Ok((
        input,
        Definition {
            big_endian,
            global_message,
            fields,
            developer_bytes,
        },
    ))
}

// ============================================================================
// Field Values
// ============================================================================

/// Decode the first element of a field as a number, mapping the FIT
/// "invalid" sentinel of its base type to `None`.
fn field_value(def: &FieldDef, bytes: &[u8], big_endian: bool) -> Option<f64> {
    macro_rules! read {
        ($ty:ty) => {{
            let raw: [u8; std::mem::size_of::<$ty>()] =
                bytes.get(..std::mem::size_of::<$ty>())?.try_into().ok()?;
            if big_endian {
                <$ty>::from_be_bytes(raw)
            } else {
                <$ty>::from_le_bytes(raw)
            }
        }};
    }

    match def.base_type & 0x1F {
        // enum, uint8, byte
        0x00 | 0x02 | 0x0D => Some(read!(u8)).filter(|&v| v != u8::MAX).map(f64::from),
        0x01 => Some(read!(i8)).filter(|&v| v != i8::MAX).map(f64::from),
        0x03 => Some(read!(i16)).filter(|&v| v != i16::MAX).map(f64::from),
        0x04 => Some(read!(u16)).filter(|&v| v != u16::MAX).map(f64::from),
        0x05 => Some(read!(i32)).filter(|&v| v != i32::MAX).map(f64::from),
        0x06 => Some(read!(u32)).filter(|&v| v != u32::MAX).map(f64::from),
        0x08 => Some(read!(f32))
            .filter(|v| v.is_finite())
            .map(f64::from),
        0x09 => Some(read!(f64)).filter(|v| v.is_finite()),
        0x0A => Some(read!(u8)).filter(|&v| v != 0).map(f64::from),
        0x0B => Some(read!(u16)).filter(|&v| v != 0).map(f64::from),
        0x0C => Some(read!(u32)).filter(|&v| v != 0).map(f64::from),
        0x0E => Some(read!(i64)).filter(|&v| v != i64::MAX).map(|v| v as f64),
        0x0F => Some(read!(u64)).filter(|&v| v != u64::MAX).map(|v| v as f64),
        0x10 => Some(read!(u64)).filter(|&v| v != 0).map(|v| v as f64),
        // strings and unknown base types carry nothing we read
        _ => None,
    }
}

/// Resolve a compressed-header 5-bit time offset against the last full
/// timestamp, handling rollover of the low bits. Timestamps are widened to
/// 64 bits so a rollover past `u32::MAX` stays monotonic.
fn expand_compressed_timestamp(last: u64, time_offset: u8) -> u64 {
    let offset = u64::from(time_offset & 0x1F);
    let base = last & !0x1F;
    if offset >= last & 0x1F {
        base + offset
    } else {
        base + offset + 0x20
    }
}

/// FIT CRC-16 over `data`.
pub(crate) fn fit_crc(data: &[u8]) -> u16 {
    const CRC_TABLE: [u16; 16] = [
        0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
        0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
    ];

    data.iter().fold(0u16, |crc, byte| {
        let mut tmp = CRC_TABLE[(crc & 0xF) as usize];
        let mut crc = (crc >> 4) & 0x0FFF;
        crc ^= tmp ^ CRC_TABLE[(byte & 0xF) as usize];
        tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc ^ tmp ^ CRC_TABLE[((byte >> 4) & 0xF) as usize]
    })
}

// ============================================================================
// Decoder
// ============================================================================

struct StreamState {
    definitions: [Option<Definition>; MAX_LOCAL_MESSAGES],
    last_timestamp: Option<u64>,
    /// Earliest `record` timestamp, which need not be the first one read.
    first_record_timestamp: Option<u64>,
    pending: BTreeMap<u64, PendingSample>,
    record_count: usize,
}

impl StreamState {
    fn new() -> Self {
        Self {
            definitions: Default::default(),
            last_timestamp: None,
            first_record_timestamp: None,
            pending: BTreeMap::new(),
            record_count: 0,
        }
    }

    /// Apply one fully read data message.
    fn apply(&mut self, def: &Definition, body: &[u8], compressed_offset: Option<u8>) {
        let mut timestamp = None;
        let mut depth = None;
        let mut altitude = None;
        let mut temperature = None;
        let mut tank_pressure = None;

        let mut pos = 0;
        for field in &def.fields {
            let end = pos + field.size as usize;
            let bytes = &body[pos..end];
            pos = end;

            let value = match field_value(field, bytes, def.big_endian) {
                Some(v) => v,
                None => continue,
            };
            match (def.global_message, field.number) {
                (_, FIELD_TIMESTAMP) => timestamp = Some(value as u64),
                (RECORD_MESSAGE, RECORD_DEPTH) => depth = Some(value / 1000.0),
                (RECORD_MESSAGE, RECORD_TEMPERATURE) => temperature = Some(value),
                (RECORD_MESSAGE, RECORD_ALTITUDE | RECORD_ENHANCED_ALTITUDE) => {
                    altitude = Some(value / 5.0 - 500.0)
                }
                (TANK_UPDATE_MESSAGE, TANK_UPDATE_PRESSURE) => tank_pressure = Some(value / 100.0),
                _ => {}
            }
        }

        let timestamp = match (timestamp, compressed_offset, self.last_timestamp) {
            (Some(ts), _, _) => ts,
            (None, Some(offset), Some(last)) => expand_compressed_timestamp(last, offset),
            _ => return,
        };
        self.last_timestamp = Some(timestamp);

        match def.global_message {
            RECORD_MESSAGE => {
                // Some devices log depth as altitude below sea level.
                let depth = depth.or_else(|| altitude.filter(|a| *a < 0.0).map(|a| -a));
                self.first_record_timestamp = Some(
                    self.first_record_timestamp
                        .map_or(timestamp, |first| first.min(timestamp)),
                );
                self.record_count += 1;

                let entry = self.pending.entry(timestamp).or_default();
                if depth.is_some() {
                    entry.depth_m = depth;
                }
                if temperature.is_some() {
                    entry.temperature_c = temperature;
                }
            }
            TANK_UPDATE_MESSAGE => {
                if let Some(pressure) = tank_pressure {
                    self.pending.entry(timestamp).or_default().tank_pressure_bar = Some(pressure);
                }
            }
            _ => {}
        }
    }

    fn into_samples(self) -> Vec<RawSample> {
        let first = match self.first_record_timestamp {
            Some(first) => first,
            None => return Vec::new(),
        };
        self.pending
            .into_iter()
            .filter(|(ts, _)| *ts >= first)
            .map(|(ts, p)| RawSample {
                elapsed_seconds: (ts - first) as f64,
                depth_m: p.depth_m,
                temperature_c: p.temperature_c,
                tank_pressure_bar: p.tank_pressure_bar,
            })
            .collect()
    }
}

/// Outcome of reading one record.
enum Step {
    Continue,
    /// A data record referenced a local message with no definition.
    Undefined(u8),
}

fn read_record<'a>(input: &'a [u8], state: &mut StreamState) -> IResult<&'a [u8], Step> {
    let (input, header) = record_header(input)?;
    match header {
        RecordHeader::Definition { local, developer } => {
            let (input, def) = definition_body(input, developer)?;
            tracing::trace!(
                "Local message {} defined as global {} ({} fields)",
                local,
                def.global_message,
                def.fields.len()
            );
            state.definitions[local as usize] = Some(def);
            Ok((input, Step::Continue))
        }
        RecordHeader::Data { local } | RecordHeader::CompressedTimestamp { local, .. } => {
            let def = match &state.definitions[local as usize] {
                Some(def) => def.clone(),
                None => return Ok((input, Step::Undefined(local))),
            };
            let (input, body) = take(def.data_size()).parse(input)?;
            let offset = match header {
                RecordHeader::CompressedTimestamp { time_offset, .. } => Some(time_offset),
                _ => None,
            };
            state.apply(&def, body, offset);
            Ok((input, Step::Continue))
        }
    }
}

/// Decode a FIT buffer into raw samples.
pub fn decode(data: &[u8]) -> Result<DecodedSamples, DecodeError> {
    let header = match file_header(data) {
        Ok((_, header)) => header,
        Err(_) if data.len() < 12 => {
            return Err(DecodeError::TruncatedRecord {
                offset: data.len(),
                needed: 12 - data.len(),
            })
        }
        Err(_) => {
            return Err(DecodeError::MalformedHeader(
                "missing .FIT data type marker".to_string(),
            ))
        }
    };
    if !matches!(header.header_size, 12 | 14) {
        return Err(DecodeError::MalformedHeader(format!(
            "unsupported FIT header size {}",
            header.header_size
        )));
    }

    let header_size = header.header_size as usize;
    if data.len() < header_size {
        return Err(DecodeError::TruncatedRecord {
            offset: data.len(),
            needed: header_size - data.len(),
        });
    }

    let declared_end = header_size.saturating_add(header.data_size as usize);
    let records_end = declared_end.min(data.len());
    let records = &data[header_size..records_end];

    let mut warnings = Vec::new();
    let mut state = StreamState::new();
    let mut input = records;

    while !input.is_empty() {
        let offset = header_size + (records.len() - input.len());
        match read_record(input, &mut state) {
            Ok((rest, Step::Continue)) => input = rest,
            Ok((_, Step::Undefined(local))) => {
                // Without a layout the record cannot be sized, so nothing
                // after it can be framed either.
                tracing::warn!(
                    "Data record for undefined local message {} at byte {}",
                    local,
                    offset
                );
                warnings.push(DecodeWarning::Truncated {
                    offset: offset as u64,
                    samples_kept: state.record_count as u64,
                });
                break;
            }
            Err(_) => {
                tracing::warn!("FIT stream truncated mid-record at byte {}", offset);
                warnings.push(DecodeWarning::Truncated {
                    offset: offset as u64,
                    samples_kept: state.record_count as u64,
                });
                break;
            }
        }
    }

    if warnings.is_empty() && records_end < declared_end {
        warnings.push(DecodeWarning::Truncated {
            offset: records_end as u64,
            samples_kept: state.record_count as u64,
        });
    }

    if warnings.is_empty() && data.len() >= declared_end + CRC_SIZE {
        let expected = u16::from_le_bytes([data[declared_end], data[declared_end + 1]]);
        let actual = fit_crc(&data[..declared_end]);
        if expected != actual {
            tracing::warn!(
                "FIT checksum mismatch: stored {:#06x}, computed {:#06x}",
                expected,
                actual
            );
            warnings.push(DecodeWarning::ChecksumMismatch { expected, actual });
        }
    }

    tracing::debug!(
        "FIT stream: {} record messages, {} warnings",
        state.record_count,
        warnings.len()
    );

    Ok(DecodedSamples {
        samples: state.into_samples(),
        warnings,
    })
}

// ============================================================================
// Tests
// ============================================================================
