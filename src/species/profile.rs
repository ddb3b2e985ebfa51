//! Species profile types and key derivation.

use serde::{Deserialize, Serialize};

use crate::climate::schedule::ClimateSchedule;
use crate::error::{Error, Result};

pub const KEY_MAX_LEN: usize = 31;
pub const NAME_MAX_LEN: usize = 63;
pub const SLUG_MAX_LEN: usize = 23;
pub const HABITAT_MAX_LEN: usize = 95;
pub const UV_CATEGORY_MAX_LEN: usize = 31;
pub const SEASON_MAX_LEN: usize = 47;

pub const CUSTOM_KEY_PREFIX: &str = "custom:";

pub type ProfileKey = heapless::String<KEY_MAX_LEN>;
pub type ProfileName = heapless::String<NAME_MAX_LEN>;

/// Copy `s` into a bounded string, cutting at the last whole character
/// that fits.
pub fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Build a key from a string that must fit without truncation.
pub fn profile_key(s: &str) -> Result<ProfileKey> {
    let mut key = ProfileKey::new();
    key.push_str(s)
        .map_err(|()| Error::InvalidArgument("profile key too long"))?;
    Ok(key)
}

/// Lower-case ASCII slug: alphanumerics kept, separator runs (space, `-`,
/// `_`, `/`) folded into one `_`, everything else dropped.
pub fn slugify(name: &str) -> heapless::String<SLUG_MAX_LEN> {
    let mut slug = heapless::String::<SLUG_MAX_LEN>::new();
    for c in name.chars() {
        let mapped = if c.is_ascii_alphanumeric() {
            c.to_ascii_lowercase()
        } else if matches!(c, ' ' | '-' | '_' | '/') {
            if slug.is_empty() || slug.ends_with('_') {
                continue;
            }
            '_'
        } else {
            continue;
        };
        if slug.push(mapped).is_err() {
            break;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        let _ = slug.push_str("profile");
    }
    slug
}

/// `custom:<slug>` for a display name.
pub fn custom_key_for(name: &str) -> ProfileKey {
    let mut key = ProfileKey::new();
    // Prefix (7) + slug (≤ 23) always fits in 31.
    let _ = key.push_str(CUSTOM_KEY_PREFIX);
    let _ = key.push_str(&slugify(name));
    key
}

/// Free-text metadata shared by built-in and custom profiles.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub habitat: heapless::String<HABITAT_MAX_LEN>,
    pub uv_index_category: heapless::String<UV_CATEGORY_MAX_LEN>,
    pub season_cycle: heapless::String<SEASON_MAX_LEN>,
    pub uv_index_peak: f32,
}

impl ProfileMetadata {
    /// Build metadata, truncating each text field to its capacity.
    pub fn new(habitat: &str, uv_index_category: &str, season_cycle: &str, uv_index_peak: f32) -> Self {
        Self {
            habitat: truncated(habitat),
            uv_index_category: truncated(uv_index_category),
            season_cycle: truncated(season_cycle),
            uv_index_peak,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.uv_index_peak.is_finite() || !(0.0..=20.0).contains(&self.uv_index_peak) {
            return Err(Error::InvalidArgument("uv_index_peak must be 0–20"));
        }
        Ok(())
    }
}

/// One `(language, label)` pair of a built-in profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalizedLabel {
    pub language: &'static str,
    pub label: &'static str,
}

/// Read-only species profile compiled into the firmware.  Its schedule is
/// owned, never pool-backed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltinProfile {
    pub key: &'static str,
    /// At least one entry.
    pub labels: &'static [LocalizedLabel],
    pub habitat: &'static str,
    pub uv_index_category: &'static str,
    pub season_cycle: &'static str,
    pub uv_index_peak: f32,
    pub schedule: ClimateSchedule,
}

impl BuiltinProfile {
    /// Label in `language`, else in `fallback`, else the first label.
    pub fn label_for_locale(&self, language: &str, fallback: &str) -> &'static str {
        let find = |lang: &str| {
            self.labels
                .iter()
                .find(|l| l.language.eq_ignore_ascii_case(lang))
                .map(|l| l.label)
        };
        find(language)
            .or_else(|| find(fallback))
            .or_else(|| self.labels.first().map(|l| l.label))
            .unwrap_or(self.key)
    }

    pub fn metadata(&self) -> ProfileMetadata {
        ProfileMetadata::new(
            self.habitat,
            self.uv_index_category,
            self.season_cycle,
            self.uv_index_peak,
        )
    }
}

/// User-defined profile as stored: the schedule lives in the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomProfile {
    pub key: ProfileKey,
    pub name: ProfileName,
    pub schedule_index: u16,
    pub metadata: ProfileMetadata,
}

/// Custom profile with its schedule resolved, as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomProfileView {
    pub key: ProfileKey,
    pub name: ProfileName,
    pub metadata: ProfileMetadata,
    pub schedule: ClimateSchedule,
}
