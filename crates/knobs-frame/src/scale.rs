//! Raw byte to float mapping.
//!
//! Controllers report 7-bit values, so raw `0` maps to the bottom of the
//! requested range and raw `127` to the top. Bytes above 127 are handled by
//! [`ClampPolicy`].

use serde::{Deserialize, Serialize};

/// Raw value that maps to the top of a range.
pub const FULL_SCALE: u8 = 127;

/// Treatment of raw values above [`FULL_SCALE`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPolicy {
    /// Use the byte as-is; 128..=255 overshoot past `max`.
    #[default]
    PassThrough,
    /// Saturate at 127.
    Clamp,
    /// Fold into 0..=127 (`raw % 128`).
    Wrap,
}

impl ClampPolicy {
    /// Apply the policy to a raw byte.
    pub fn apply(self, raw: u8) -> u8 {
        match self {
            ClampPolicy::PassThrough => raw,
            ClampPolicy::Clamp => raw.min(FULL_SCALE),
            ClampPolicy::Wrap => raw % (FULL_SCALE + 1),
        }
    }
}

/// Map a raw byte to `raw / 127`.
pub fn normalize(raw: u8, policy: ClampPolicy) -> f32 {
    f32::from(policy.apply(raw)) / f32::from(FULL_SCALE)
}

/// Map a raw byte linearly into `[min, max]`.
///
/// Computed as `(1 - n) * min + n * max` so both ends are exact.
pub fn scale(raw: u8, min: f32, max: f32, policy: ClampPolicy) -> f32 {
    let n = normalize(raw, policy);
    (1.0 - n) * min + n * max
}

/// Inverse of [`normalize`] for values in `[0, 1]`; out-of-range input saturates.
pub fn raw_from_normalized(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * f32::from(FULL_SCALE)).round() as u8
}
