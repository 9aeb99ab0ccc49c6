//! Format detection from leading bytes.
//!
//! Magic bytes are the source of truth. The declared extension is only
//! consulted to break a tie between generic XML and UDDF, and a mismatch
//! between extension and content is logged but never trusted.

use std::path::Path;

use crate::config::DecoderConfig;
use crate::decode::ProfileFormat;
use crate::error::DecodeError;

/// ASCII data-type marker at bytes 8..12 of a FIT file header.
pub const FIT_MARKER: &[u8; 4] = b".FIT";

/// Device signature opening every binary log.
pub const BINARY_LOG_SIGNATURE: [u8; 2] = [0xFA, 0xFA];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Select the decoder for `data`.
pub fn sniff(
    data: &[u8],
    filename: &str,
    config: &DecoderConfig,
) -> Result<ProfileFormat, DecodeError> {
    let extension = extension_of(filename);

    let format = if is_fit(data) {
        ProfileFormat::Fit
    } else if data.starts_with(&BINARY_LOG_SIGNATURE) {
        ProfileFormat::BinaryLog
    } else if is_xml(data) {
        let window = &data[..data.len().min(config.sniff_window_bytes as usize)];
        if has_uddf_token(window) {
            ProfileFormat::Uddf
        } else if extension.as_deref() == Some("uddf") {
            tracing::debug!("No UDDF token in {}, trusting extension", filename);
            ProfileFormat::Uddf
        } else {
            ProfileFormat::GenericXml
        }
    } else {
        tracing::warn!("No known signature in {}", filename);
        return Err(DecodeError::UnsupportedFormat {
            filename: filename.to_string(),
        });
    };

    if let Some(ext) = extension.as_deref() {
        if !format.extensions().contains(&ext) {
            tracing::warn!(
                "{} has extension .{} but content looks like {}",
                filename,
                ext,
                format.label()
            );
        }
    }

    tracing::debug!("Sniffed {} as {}", filename, format.label());
    Ok(format)
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_fit(data: &[u8]) -> bool {
    data.len() >= 12 && matches!(data[0], 12 | 14) && &data[8..12] == FIT_MARKER
}

/// True when the first element tag follows an optional BOM and a prolog of
/// whitespace, comments, processing instructions and a doctype.
fn is_xml(data: &[u8]) -> bool {
    let mut rest = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    loop {
        let start = rest
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(rest.len());
        rest = &rest[start..];

        let skipped = if rest.starts_with(b"<?") {
            skip_past(rest, b"?>")
        } else if rest.starts_with(b"<!--") {
            skip_past(&rest[4..], b"-->")
        } else if rest.len() >= 9 && rest[..9].eq_ignore_ascii_case(b"<!DOCTYPE") {
            skip_doctype(&rest[9..])
        } else {
            return rest.len() > 1 && rest[0] == b'<' && rest[1].is_ascii_alphabetic();
        };
        match skipped {
            Some(after) => rest = after,
            None => return false,
        }
    }
}

/// Bytes after the first occurrence of `terminator`.
fn skip_past<'a>(data: &'a [u8], terminator: &[u8]) -> Option<&'a [u8]> {
    data.windows(terminator.len())
        .position(|w| w == terminator)
        .map(|pos| &data[pos + terminator.len()..])
}

/// Bytes after the `>` closing a doctype, past any `[...]` internal subset.
fn skip_doctype(data: &[u8]) -> Option<&[u8]> {
    let mut in_subset = false;
    for (i, &b) in data.iter().enumerate() {
        match b {
            b'[' => in_subset = true,
            b']' => in_subset = false,
            b'>' if !in_subset => return Some(&data[i + 1..]),
            _ => {}
        }
    }
    None
}

fn has_uddf_token(window: &[u8]) -> bool {
    contains_ignore_case(window, b"<uddf")
        || (contains_ignore_case(window, b"xmlns") && contains_ignore_case(window, b"/uddf"))
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}
