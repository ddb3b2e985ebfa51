//! Tag-length-value codec for the custom profile catalog.
//!
//! Record layout:
//! ```text
//! ┌─────────┬──────────────┬─────────────────┐
//! │ Tag (1B)│ Length (2B)  │ Value (Length B)│
//! │         │ BE u16       │                 │
//! └─────────┴──────────────┴─────────────────┘
//! ```
//!
//! Top-level blob:
//! ```text
//! VERSION   [2]
//! POOL      { SCHEDULE { id:u16, hash:u32, schedule:44B } ... }
//! PROFILES  { PROFILE  { KEY, NAME, SCHEDULE_REF:u16, HABITAT,
//!                        UV_CATEGORY, SEASON, UV_PEAK:f32 } ... }
//! ```
//!
//! Decoding never trusts a length field beyond the bytes that are actually
//! present, and builds a fresh [`Catalog`]: callers only swap it in once the
//! whole blob has parsed.

use core::fmt;

use crate::climate::schedule::{ClimateSchedule, SCHEDULE_ENCODED_LEN};
use crate::error::{Error, Result};

use super::pool::{CUSTOM_PROFILE_MAX, Catalog, POOL_CAPACITY};
use super::profile::{CUSTOM_KEY_PREFIX, ProfileKey, ProfileMetadata, ProfileName};

/// Current blob format.
pub const FORMAT_VERSION: u8 = 2;

const HEADER_LEN: usize = 3;

pub mod tag {
    pub const VERSION: u8 = 0x01;
    pub const POOL: u8 = 0x02;
    pub const PROFILES: u8 = 0x03;

    pub const SCHEDULE: u8 = 0x10;

    pub const PROFILE: u8 = 0x20;
    pub const KEY: u8 = 0x21;
    pub const NAME: u8 = 0x22;
    pub const SCHEDULE_REF: u8 = 0x23;
    pub const HABITAT: u8 = 0x24;
    pub const UV_CATEGORY: u8 = 0x25;
    pub const SEASON: u8 = 0x26;
    pub const UV_PEAK: u8 = 0x27;
}

/// Why a blob was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A header or value runs past the end of its enclosing buffer.
    Truncated,
    /// The first record is not a version record.
    MissingVersion,
    UnsupportedVersion(u8),
    /// The pool or profiles section is absent.
    MissingSection,
    DuplicateSection,
    DuplicateScheduleId,
    UnresolvedScheduleRef,
    DuplicateProfileKey,
    /// A pool record's stored hash does not match its schedule bytes.
    HashMismatch,
    /// A field has the wrong size or is not valid UTF-8.
    BadField,
    /// A required profile field is absent.
    MissingField,
    /// A field value is outside its accepted range.
    OutOfRange,
    /// Bytes left over after the last field of a fixed record.
    TrailingBytes,
    /// More schedules or profiles than the tables hold.
    Capacity,
}

impl DecodeError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Truncated => "truncated record",
            Self::MissingVersion => "missing version record",
            Self::UnsupportedVersion(_) => "unsupported blob version",
            Self::MissingSection => "missing section",
            Self::DuplicateSection => "duplicate section",
            Self::DuplicateScheduleId => "duplicate schedule id",
            Self::UnresolvedScheduleRef => "unresolved schedule reference",
            Self::DuplicateProfileKey => "duplicate profile key",
            Self::HashMismatch => "schedule hash mismatch",
            Self::BadField => "malformed field",
            Self::MissingField => "missing profile field",
            Self::OutOfRange => "field out of range",
            Self::TrailingBytes => "trailing bytes in record",
            Self::Capacity => "too many records",
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(v) => write!(f, "unsupported blob version {v}"),
            other => f.write_str(other.reason()),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::InvalidState(e.reason())
    }
}

// ── Reading ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

/// Iterates the records of one buffer.  Yields at most one error, then
/// stops.
pub struct TlvReader<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> TlvReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = core::result::Result<Record<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        if rest.len() < HEADER_LEN {
            self.failed = true;
            return Some(Err(DecodeError::Truncated));
        }
        let len = usize::from(u16::from_be_bytes([rest[1], rest[2]]));
        let Some(value) = rest.get(HEADER_LEN..HEADER_LEN + len) else {
            self.failed = true;
            return Some(Err(DecodeError::Truncated));
        };
        self.pos += HEADER_LEN + len;
        Some(Ok(Record {
            tag: rest[0],
            value,
        }))
    }
}

/// Bounds-checked reader over a fixed-layout value.
pub struct FieldCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn take(&mut self, n: usize) -> core::result::Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        let out = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> core::result::Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u16(&mut self) -> core::result::Result<u16, DecodeError> {
        self.array().map(u16::from_be_bytes)
    }

    pub fn u32(&mut self) -> core::result::Result<u32, DecodeError> {
        self.array().map(u32::from_be_bytes)
    }

    pub fn f32(&mut self) -> core::result::Result<f32, DecodeError> {
        self.array().map(f32::from_be_bytes)
    }

    /// Require that every byte was consumed.
    pub fn finish(self) -> core::result::Result<(), DecodeError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes)
        }
    }
}

// ── Writing ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tag: u8, value: &[u8]) -> Result<()> {
        let len = u16::try_from(value.len())
            .map_err(|_| Error::InvalidArgument("TLV value exceeds 65535 bytes"))?;
        self.buf.push(tag);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Write a record whose value is itself a record list.
    pub fn nested(&mut self, tag: u8, build: impl FnOnce(&mut TlvWriter) -> Result<()>) -> Result<()> {
        let mut child = TlvWriter::new();
        build(&mut child)?;
        self.record(tag, &child.buf)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// ── Catalog encoding ────────────────────────────────────────────

pub fn encode_catalog(catalog: &Catalog) -> Result<Vec<u8>> {
    let mut w = TlvWriter::new();
    w.record(tag::VERSION, &[FORMAT_VERSION])?;

    w.nested(tag::POOL, |pool| {
        for (id, entry) in catalog.pool().iter().enumerate() {
            let mut value = Vec::with_capacity(6 + SCHEDULE_ENCODED_LEN);
            value.extend_from_slice(&(id as u16).to_be_bytes());
            value.extend_from_slice(&entry.hash.to_be_bytes());
            value.extend_from_slice(&entry.schedule.to_bytes());
            pool.record(tag::SCHEDULE, &value)?;
        }
        Ok(())
    })?;

    w.nested(tag::PROFILES, |profiles| {
        for p in catalog.profiles() {
            profiles.nested(tag::PROFILE, |f| {
                f.record(tag::KEY, p.key.as_bytes())?;
                f.record(tag::NAME, p.name.as_bytes())?;
                f.record(tag::SCHEDULE_REF, &p.schedule_index.to_be_bytes())?;
                f.record(tag::HABITAT, p.metadata.habitat.as_bytes())?;
                f.record(tag::UV_CATEGORY, p.metadata.uv_index_category.as_bytes())?;
                f.record(tag::SEASON, p.metadata.season_cycle.as_bytes())?;
                f.record(tag::UV_PEAK, &p.metadata.uv_index_peak.to_be_bytes())
            })?;
        }
        Ok(())
    })?;

    Ok(w.finish())
}

// ── Catalog decoding ────────────────────────────────────────────

struct DecodedProfile {
    key: ProfileKey,
    name: ProfileName,
    schedule_ref: u16,
    metadata: ProfileMetadata,
}

fn text<const N: usize>(value: &[u8]) -> core::result::Result<heapless::String<N>, DecodeError> {
    let s = core::str::from_utf8(value).map_err(|_| DecodeError::BadField)?;
    let mut out = heapless::String::new();
    out.push_str(s).map_err(|()| DecodeError::BadField)?;
    Ok(out)
}

fn decode_pool(value: &[u8]) -> core::result::Result<Vec<(u16, ClimateSchedule)>, DecodeError> {
    let mut entries: Vec<(u16, ClimateSchedule)> = Vec::new();
    for record in TlvReader::new(value) {
        let record = record?;
        if record.tag != tag::SCHEDULE {
            continue;
        }
        let mut cur = FieldCursor::new(record.value);
        let id = cur.u16()?;
        let hash = cur.u32()?;
        let bytes: [u8; SCHEDULE_ENCODED_LEN] = cur.array()?;
        cur.finish()?;

        if entries.iter().any(|(seen, _)| *seen == id) {
            return Err(DecodeError::DuplicateScheduleId);
        }
        let schedule = ClimateSchedule::from_bytes(&bytes);
        if schedule.content_hash() != hash {
            return Err(DecodeError::HashMismatch);
        }
        schedule.validate().map_err(|_| DecodeError::OutOfRange)?;
        if entries.len() == POOL_CAPACITY {
            return Err(DecodeError::Capacity);
        }
        entries.push((id, schedule));
    }
    Ok(entries)
}

fn decode_profile(value: &[u8]) -> core::result::Result<DecodedProfile, DecodeError> {
    let mut key = None;
    let mut name = None;
    let mut schedule_ref = None;
    let mut metadata = ProfileMetadata::default();

    for record in TlvReader::new(value) {
        let record = record?;
        match record.tag {
            tag::KEY => key = Some(text(record.value)?),
            tag::NAME => name = Some(text(record.value)?),
            tag::SCHEDULE_REF => {
                let mut cur = FieldCursor::new(record.value);
                schedule_ref = Some(cur.u16()?);
                cur.finish().map_err(|_| DecodeError::BadField)?;
            }
            tag::HABITAT => metadata.habitat = text(record.value)?,
            tag::UV_CATEGORY => metadata.uv_index_category = text(record.value)?,
            tag::SEASON => metadata.season_cycle = text(record.value)?,
            tag::UV_PEAK => {
                let mut cur = FieldCursor::new(record.value);
                metadata.uv_index_peak = cur.f32()?;
                cur.finish().map_err(|_| DecodeError::BadField)?;
            }
            _ => {}
        }
    }

    let key: ProfileKey = key.ok_or(DecodeError::MissingField)?;
    // Custom keys live in their own namespace; anything else would shadow
    // or be shadowed by a built-in.
    if key.len() <= CUSTOM_KEY_PREFIX.len() || !key.starts_with(CUSTOM_KEY_PREFIX) {
        return Err(DecodeError::BadField);
    }
    metadata.validate().map_err(|_| DecodeError::OutOfRange)?;
    Ok(DecodedProfile {
        key,
        name: name.ok_or(DecodeError::MissingField)?,
        schedule_ref: schedule_ref.ok_or(DecodeError::MissingField)?,
        metadata,
    })
}

fn decode_profiles(value: &[u8]) -> core::result::Result<Vec<DecodedProfile>, DecodeError> {
    let mut profiles: Vec<DecodedProfile> = Vec::new();
    for record in TlvReader::new(value) {
        let record = record?;
        if record.tag != tag::PROFILE {
            continue;
        }
        let profile = decode_profile(record.value)?;
        if profiles.iter().any(|p| p.key == profile.key) {
            return Err(DecodeError::DuplicateProfileKey);
        }
        if profiles.len() == CUSTOM_PROFILE_MAX {
            return Err(DecodeError::Capacity);
        }
        profiles.push(profile);
    }
    Ok(profiles)
}

/// Parse a catalog blob.  Pool refcounts are rebuilt from the profiles,
/// so schedules nothing references are dropped.
pub fn decode_catalog(blob: &[u8]) -> core::result::Result<Catalog, DecodeError> {
    let mut records = TlvReader::new(blob);

    let version = match records.next() {
        Some(Ok(r)) if r.tag == tag::VERSION => r,
        Some(Err(e)) => return Err(e),
        _ => return Err(DecodeError::MissingVersion),
    };
    match version.value {
        [FORMAT_VERSION] => {}
        [other] => return Err(DecodeError::UnsupportedVersion(*other)),
        _ => return Err(DecodeError::BadField),
    }

    let mut pool = None;
    let mut profiles = None;
    for record in records {
        let record = record?;
        match record.tag {
            tag::VERSION => return Err(DecodeError::DuplicateSection),
            tag::POOL => {
                if pool.is_some() {
                    return Err(DecodeError::DuplicateSection);
                }
                pool = Some(decode_pool(record.value)?);
            }
            tag::PROFILES => {
                if profiles.is_some() {
                    return Err(DecodeError::DuplicateSection);
                }
                profiles = Some(decode_profiles(record.value)?);
            }
            _ => {}
        }
    }
    let pool = pool.ok_or(DecodeError::MissingSection)?;
    let profiles = profiles.ok_or(DecodeError::MissingSection)?;

    let mut catalog = Catalog::new();
    for p in profiles {
        let schedule = pool
            .iter()
            .find(|(id, _)| *id == p.schedule_ref)
            .map(|(_, s)| s)
            .ok_or(DecodeError::UnresolvedScheduleRef)?;
        catalog
            .adopt(p.key, p.name, schedule, p.metadata)
            .map_err(|e| match e {
                Error::ResourceExhausted => DecodeError::Capacity,
                _ => DecodeError::DuplicateProfileKey,
            })?;
    }
    Ok(catalog)
}
