//! Canonicalization of decoder output into a [`DiveProfile`].
//!
//! Decoders may emit samples out of order or with repeated timestamps
//! (firmware quirks, merged message streams). Everything downstream assumes
//! monotonic, unique time, so this is the only way a decoded file becomes a
//! profile.

use crate::error::DecodeError;
use crate::models::{DiveProfile, ProfileSample, RawSample};

/// Minimum number of samples needed to describe a profile.
pub const MIN_PROFILE_SAMPLES: usize = 2;

/// Normalize one decoder's raw samples into a canonical profile.
///
/// Drops samples without a depth or with a non-finite or negative time,
/// sorts by elapsed time and keeps the last sample of any timestamp
/// collision.
/// Fewer than two usable samples is [`DecodeError::NoSamplesParsed`].
pub fn normalize(raw: Vec<RawSample>) -> Result<DiveProfile, DecodeError> {
    let total = raw.len();
    let mut before_start = 0usize;
    let with_depth: Vec<ProfileSample> = raw
        .into_iter()
        .filter_map(|s| {
            let depth = s.depth_m.filter(|d| d.is_finite())?;
            if !s.elapsed_seconds.is_finite() {
                return None;
            }
            if s.elapsed_seconds < 0.0 {
                before_start += 1;
                return None;
            }
            Some(ProfileSample {
                elapsed_seconds: s.elapsed_seconds,
                // Surface jitter can read slightly negative.
                depth_m: depth.max(0.0),
                temperature_c: s.temperature_c.filter(|t| t.is_finite()),
                tank_pressure_bar: s.tank_pressure_bar.filter(|p| p.is_finite()),
            })
        })
        .collect();

    if before_start > 0 {
        tracing::debug!(
            "Dropped {} of {} samples timed before the dive start",
            before_start,
            total
        );
    }
    let dropped = total - with_depth.len() - before_start;
    if dropped > 0 {
        tracing::debug!("Dropped {} of {} samples without depth", dropped, total);
    }

    if with_depth.len() < MIN_PROFILE_SAMPLES {
        tracing::warn!("Only {} usable sample(s) in decoded file", with_depth.len());
        return Err(DecodeError::NoSamplesParsed {
            usable: with_depth.len(),
        });
    }

    // Two usable samples sharing a timestamp collapse into a one-point
    // profile; the physics engine rejects that on its own terms.
    let samples = sort_and_dedup(with_depth);

    tracing::debug!("Normalized profile with {} samples", samples.len());
    Ok(DiveProfile::from_sorted(samples))
}

/// Stable sort by elapsed time, then collapse equal timestamps keeping the
/// later occurrence.
pub(crate) fn sort_and_dedup(mut samples: Vec<ProfileSample>) -> Vec<ProfileSample> {
    samples.sort_by(|a, b| a.elapsed_seconds.total_cmp(&b.elapsed_seconds));

    let mut out: Vec<ProfileSample> = Vec::with_capacity(samples.len());
    for sample in samples {
        match out.last_mut() {
            Some(last) if last.elapsed_seconds == sample.elapsed_seconds => *last = sample,
            _ => out.push(sample),
        }
    }
    out
}
