//! Reader for the first-generation custom profile blob.
//!
//! That format was a raw dump of a fixed array of records, little-endian
//! with C struct padding:
//!
//! ```text
//! offset  size  field
//!      0     1  used (0 = empty slot)
//!      1    32  key, NUL-terminated
//!     33    64  name, NUL-terminated
//!     97     3  padding
//!    100     4  day_start_minute   (i32)
//!    104     4  night_start_minute (i32)
//!    108    32  day / night profiles (8 × f32)
//!    140     8  day_uvi_max, night_uvi_max (f32)
//! ```

use log::warn;

use crate::climate::schedule::{ClimateProfile, ClimateSchedule};

use super::pool::Catalog;
use super::profile::{CUSTOM_KEY_PREFIX, ProfileMetadata, custom_key_for, profile_key, truncated};
use super::tlv::DecodeError;

pub const LEGACY_RECORD_LEN: usize = 148;

const KEY_AT: usize = 1;
const KEY_LEN: usize = 32;
const NAME_AT: usize = 33;
const NAME_LEN: usize = 64;
const SCHEDULE_AT: usize = 100;

/// Text up to the first NUL.  Invalid UTF-8 is replaced, not rejected.
fn c_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn le_i32(b: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn le_f32(b: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn minute(raw: i32) -> Option<u16> {
    u16::try_from(raw).ok()
}

fn legacy_schedule(record: &[u8]) -> Option<ClimateSchedule> {
    let s = SCHEDULE_AT;
    let profile = |at: usize| ClimateProfile {
        temperature_c: le_f32(record, at),
        humidity_pct: le_f32(record, at + 4),
        temp_hysteresis_c: le_f32(record, at + 8),
        humidity_hysteresis_pct: le_f32(record, at + 12),
    };
    Some(ClimateSchedule {
        day_start_minute: minute(le_i32(record, s))?,
        night_start_minute: minute(le_i32(record, s + 4))?,
        day: profile(s + 8),
        night: profile(s + 24),
        day_uvi_max: le_f32(record, s + 40),
        night_uvi_max: le_f32(record, s + 44),
    })
}

/// Transcode a legacy blob into a catalog.  The blob must be a whole number
/// of records; empty slots and records that fail validation are skipped.
pub fn decode_legacy(blob: &[u8]) -> Result<Catalog, DecodeError> {
    if blob.len() % LEGACY_RECORD_LEN != 0 {
        return Err(DecodeError::Truncated);
    }

    let mut catalog = Catalog::new();
    for (slot, record) in blob.chunks_exact(LEGACY_RECORD_LEN).enumerate() {
        if record[0] == 0 {
            continue;
        }
        let stored_key = c_str(&record[KEY_AT..KEY_AT + KEY_LEN]);
        let name = c_str(&record[NAME_AT..NAME_AT + NAME_LEN]);

        let Some(schedule) = legacy_schedule(record).filter(|s| s.validate().is_ok()) else {
            warn!("legacy: slot {} ({}) has an invalid schedule, skipped", slot, stored_key);
            continue;
        };

        // Stored keys outside the custom namespace fall back to the
        // name-derived key.
        let key = match stored_key.strip_prefix(CUSTOM_KEY_PREFIX) {
            Some(slug) if !slug.is_empty() => {
                profile_key(&stored_key).unwrap_or_else(|_| custom_key_for(&name))
            }
            _ => custom_key_for(&name),
        };
        if catalog.find(&key).is_some() {
            warn!("legacy: duplicate key {} in slot {}, skipped", key, slot);
            continue;
        }

        catalog
            .adopt(key, truncated(&name), &schedule, ProfileMetadata::default())
            .map_err(|_| DecodeError::Capacity)?;
    }
    Ok(catalog)
}
