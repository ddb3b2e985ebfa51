//! Deduplicated schedule pool and the custom profile table that borrows
//! from it.
//!
//! The pool is an arena addressed by `u16` index.  Entries are kept dense:
//! when an entry's refcount reaches zero the last entry is swapped into its
//! slot and every profile that pointed at the old last slot is rewritten.
//! That remap is a linear scan over the custom profiles, which is fine at
//! [`CUSTOM_PROFILE_MAX`] entries and would need a reverse index if the
//! table ever grows to thousands.

use log::debug;

use crate::climate::schedule::ClimateSchedule;
use crate::error::{Error, Result};

use super::profile::{
    CustomProfile, CustomProfileView, ProfileKey, ProfileMetadata, ProfileName,
};

/// Maximum number of user-defined profiles.
pub const CUSTOM_PROFILE_MAX: usize = 6;

/// One slot more than the profile table: an update attaches its new
/// schedule before releasing the old one.
pub const POOL_CAPACITY: usize = CUSTOM_PROFILE_MAX + 1;

/// A pooled schedule with its content hash and live reference count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulePoolEntry {
    pub schedule: ClimateSchedule,
    pub hash: u32,
    pub refcount: u16,
}

/// Custom profiles plus the schedule arena they index into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pool: heapless::Vec<SchedulePoolEntry, POOL_CAPACITY>,
    profiles: heapless::Vec<CustomProfile, CUSTOM_PROFILE_MAX>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self) -> &[SchedulePoolEntry] {
        &self.pool
    }

    pub fn profiles(&self) -> &[CustomProfile] {
        &self.profiles
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn schedule_at(&self, index: u16) -> Option<&ClimateSchedule> {
        self.pool.get(usize::from(index)).map(|e| &e.schedule)
    }

    pub fn find(&self, key: &str) -> Option<&CustomProfile> {
        self.profiles.iter().find(|p| p.key.as_str() == key)
    }

    /// Resolve a profile's schedule reference.
    pub fn view(&self, profile: &CustomProfile) -> Option<CustomProfileView> {
        let schedule = *self.schedule_at(profile.schedule_index)?;
        Some(CustomProfileView {
            key: profile.key.clone(),
            name: profile.name.clone(),
            metadata: profile.metadata.clone(),
            schedule,
        })
    }

    pub fn views(&self) -> Vec<CustomProfileView> {
        self.profiles.iter().filter_map(|p| self.view(p)).collect()
    }

    // ── Pool ────────────────────────────────────────────────────

    /// Take a reference to `schedule`, reusing an equal entry when one
    /// exists.  A full pool leaves everything untouched.
    pub fn attach_schedule(&mut self, schedule: &ClimateSchedule) -> Result<u16> {
        let hash = schedule.content_hash();
        if let Some(index) = self
            .pool
            .iter()
            .position(|e| e.hash == hash && e.schedule == *schedule)
        {
            let entry = &mut self.pool[index];
            entry.refcount = entry.refcount.saturating_add(1);
            debug!("pool: dedup hit at {} (refcount {})", index, entry.refcount);
            return Ok(index as u16);
        }

        let index = self.pool.len() as u16;
        self.pool
            .push(SchedulePoolEntry {
                schedule: *schedule,
                hash,
                refcount: 1,
            })
            .map_err(|_| Error::ResourceExhausted)?;
        debug!("pool: new entry {} hash={:08x}", index, hash);
        Ok(index)
    }

    /// Drop one reference.  At zero the slot is reclaimed by moving the
    /// last entry into it and remapping every profile that pointed there.
    pub fn release_schedule(&mut self, index: u16) -> Result<()> {
        let slot = usize::from(index);
        let entry = self
            .pool
            .get_mut(slot)
            .ok_or(Error::InvalidState("schedule index out of range"))?;
        if entry.refcount == 0 {
            return Err(Error::InvalidState("schedule entry already released"));
        }
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return Ok(());
        }

        let last = (self.pool.len() - 1) as u16;
        self.pool.swap_remove(slot);
        if last != index {
            for profile in self.profiles.iter_mut() {
                if profile.schedule_index == last {
                    profile.schedule_index = index;
                }
            }
            debug!("pool: reclaimed {}, moved {} into it", index, last);
        } else {
            debug!("pool: reclaimed tail slot {}", index);
        }
        Ok(())
    }

    // ── Profiles ────────────────────────────────────────────────

    /// Create or update the profile named `key`.  Returns `true` when the
    /// profile is new.
    pub fn upsert(
        &mut self,
        key: ProfileKey,
        name: ProfileName,
        schedule: &ClimateSchedule,
        metadata: ProfileMetadata,
    ) -> Result<bool> {
        schedule.validate()?;
        metadata.validate()?;

        if let Some(pos) = self.profiles.iter().position(|p| p.key == key) {
            let old_index = self.profiles[pos].schedule_index;
            let unchanged = self
                .schedule_at(old_index)
                .is_some_and(|current| current == schedule);
            if !unchanged {
                let new_index = self.attach_schedule(schedule)?;
                self.profiles[pos].schedule_index = new_index;
                // The remap inside release also covers this profile if its
                // new slot was the pool tail.
                self.release_schedule(old_index)?;
            }
            let profile = &mut self.profiles[pos];
            profile.name = name;
            profile.metadata = metadata;
            return Ok(false);
        }

        if self.profiles.is_full() {
            return Err(Error::ResourceExhausted);
        }
        let schedule_index = self.attach_schedule(schedule)?;
        let pushed = self.profiles.push(CustomProfile {
            key,
            name,
            schedule_index,
            metadata,
        });
        if pushed.is_err() {
            self.release_schedule(schedule_index)?;
            return Err(Error::ResourceExhausted);
        }
        Ok(true)
    }

    /// Remove a profile and release its schedule.
    pub fn remove(&mut self, key: &str) -> Result<CustomProfile> {
        let pos = self
            .profiles
            .iter()
            .position(|p| p.key.as_str() == key)
            .ok_or(Error::NotFound)?;
        let index = self.profiles[pos].schedule_index;
        self.release_schedule(index)?;
        // Shift the tail down to keep insertion order.
        self.profiles[pos..].rotate_left(1);
        self.profiles
            .pop()
            .ok_or(Error::InvalidState("profile table underflow"))
    }

    /// Add a decoded profile whose schedule is already resolved.  Used when
    /// rebuilding a catalog from a blob; refcounts are derived, never
    /// trusted from the input.
    pub(crate) fn adopt(
        &mut self,
        key: ProfileKey,
        name: ProfileName,
        schedule: &ClimateSchedule,
        metadata: ProfileMetadata,
    ) -> Result<()> {
        if self.find(&key).is_some() {
            return Err(Error::InvalidState("duplicate profile key"));
        }
        if self.profiles.is_full() {
            return Err(Error::ResourceExhausted);
        }
        let schedule_index = self.attach_schedule(schedule)?;
        if self
            .profiles
            .push(CustomProfile {
                key,
                name,
                schedule_index,
                metadata,
            })
            .is_err()
        {
            self.release_schedule(schedule_index)?;
            return Err(Error::ResourceExhausted);
        }
        Ok(())
    }

    /// Every profile resolves to a live entry and every refcount equals the
    /// number of profiles pointing at it.
    pub fn is_consistent(&self) -> bool {
        let resolved = self
            .profiles
            .iter()
            .all(|p| usize::from(p.schedule_index) < self.pool.len());
        let counted = self.pool.iter().enumerate().all(|(i, e)| {
            let refs = self
                .profiles
                .iter()
                .filter(|p| usize::from(p.schedule_index) == i)
                .count();
            e.refcount >= 1 && usize::from(e.refcount) == refs
        });
        resolved && counted
    }
}
