//! Species profile store.
//!
//! Owns the built-in catalog (read-only, compiled in), the custom profiles
//! with their deduplicated schedule pool, the active profile key, and the
//! export secret.  Everything persistent goes through a [`StoragePort`].
//!
//! Every public operation takes the store's internal lock, so request
//! handlers on different threads may call it concurrently.  Parsing always
//! builds a fresh [`Catalog`] and swaps it in only on success; a failed
//! commit to storage is reported but leaves the in-memory state updated.

pub mod builtin;
pub mod legacy;
pub mod pool;
pub mod profile;
pub mod secure;
pub mod tlv;

use std::sync::{Mutex, MutexGuard};

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::climate::schedule::ClimateSchedule;
use crate::error::{Error, Result};

pub use builtin::{BUILTIN_PROFILES, default_builtin, find_builtin};
pub use pool::{CUSTOM_PROFILE_MAX, Catalog, SchedulePoolEntry};
pub use profile::{
    BuiltinProfile, CustomProfileView, LocalizedLabel, ProfileKey, ProfileMetadata, ProfileName,
    custom_key_for, slugify,
};
pub use secure::SecureExport;

pub const NAMESPACE: &str = "species";
pub const KEY_ACTIVE: &str = "active_key";
pub const KEY_CATALOG: &str = "custom_profiles_v2";
pub const KEY_LEGACY: &str = "custom_profiles_v1";
pub const KEY_SECRET: &str = "import_secret";

const MAX_BLOB_LEN: usize = 4096;
const MAX_LEGACY_LEN: usize = CUSTOM_PROFILE_MAX * legacy::LEGACY_RECORD_LEN;

/// Outcome of [`SpeciesStore::delete_custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    /// The deleted profile was active; the caller must apply another one.
    RemovedActive,
}

/// Outcome of [`SpeciesStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The current catalog was read, or no catalog exists yet.
    Loaded,
    /// Legacy profiles were converted and committed in the current format.
    Migrated,
    /// Legacy profiles were converted and are in use, but the commit failed.
    /// The legacy blob stays in storage until a later save succeeds.
    MigrationUncommitted(StorageError),
}

/// Any profile, resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileRef {
    Builtin(&'static BuiltinProfile),
    Custom(CustomProfileView),
}

impl ProfileRef {
    pub fn key(&self) -> &str {
        match self {
            Self::Builtin(b) => b.key,
            Self::Custom(c) => c.key.as_str(),
        }
    }

    pub fn schedule(&self) -> ClimateSchedule {
        match self {
            Self::Builtin(b) => b.schedule,
            Self::Custom(c) => c.schedule,
        }
    }
}

struct Inner<S> {
    storage: S,
    catalog: Catalog,
    active_key: Option<ProfileKey>,
    loaded: bool,
    /// The legacy blob still needs deleting after a successful commit.
    legacy_pending: bool,
}

impl<S: StoragePort> Inner<S> {
    fn ensure_loaded(&self) -> Result<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(Error::InvalidState("species store not loaded"))
        }
    }

    fn persist_catalog(&mut self) -> Result<()> {
        let blob = tlv::encode_catalog(&self.catalog)?;
        self.storage
            .write(NAMESPACE, KEY_CATALOG, &blob)
            .map_err(|e| {
                warn!("species: failed to persist catalog ({} bytes): {}", blob.len(), e);
                Error::Storage(e)
            })?;
        self.drop_legacy()
    }

    /// Delete the legacy blob once its profiles are committed.
    fn drop_legacy(&mut self) -> Result<()> {
        if !self.legacy_pending {
            return Ok(());
        }
        self.storage.delete(NAMESPACE, KEY_LEGACY).map_err(|e| {
            warn!("species: legacy catalog not erased: {}", e);
            Error::Storage(e)
        })?;
        self.legacy_pending = false;
        Ok(())
    }

    fn persist_active(&mut self) -> core::result::Result<(), StorageError> {
        match &self.active_key {
            Some(key) => self.storage.write(NAMESPACE, KEY_ACTIVE, key.as_bytes()),
            None => self.storage.delete(NAMESPACE, KEY_ACTIVE),
        }
    }

    fn read_active(&self) -> Option<ProfileKey> {
        let bytes = match self.storage.read_blob(NAMESPACE, KEY_ACTIVE, profile::KEY_MAX_LEN) {
            Ok(b) => b,
            Err(StorageError::NotFound) => return None,
            Err(e) => {
                warn!("species: active key unreadable: {}", e);
                return None;
            }
        };
        let key = core::str::from_utf8(&bytes).ok().and_then(|s| profile::profile_key(s).ok());
        if key.is_none() {
            warn!("species: stored active key is malformed, ignoring");
        }
        key
    }

    /// Read the stored catalog into `self.catalog`, migrating from the
    /// legacy layout when only that exists.  Nothing is modified unless the
    /// stored blob parses; a failed migration commit keeps the migrated
    /// profiles and leaves the legacy blob for the next save.
    fn read_catalog(&mut self) -> Result<LoadOutcome> {
        match self.storage.read_blob(NAMESPACE, KEY_CATALOG, MAX_BLOB_LEN) {
            Ok(blob) => {
                self.catalog = tlv::decode_catalog(&blob).map_err(|e| {
                    warn!("species: stored catalog rejected: {}", e);
                    Error::from(e)
                })?;
                self.legacy_pending = false;
                return Ok(LoadOutcome::Loaded);
            }
            Err(StorageError::NotFound) => {}
            Err(e) => return Err(Error::Storage(e)),
        }

        let legacy_blob = match self.storage.read_blob(NAMESPACE, KEY_LEGACY, MAX_LEGACY_LEN) {
            Ok(blob) => blob,
            Err(StorageError::NotFound) => {
                self.catalog = Catalog::new();
                self.legacy_pending = false;
                return Ok(LoadOutcome::Loaded);
            }
            Err(e) => return Err(Error::Storage(e)),
        };
        self.catalog = legacy::decode_legacy(&legacy_blob).map_err(|e| {
            warn!("species: legacy catalog rejected: {}", e);
            Error::from(e)
        })?;
        self.legacy_pending = true;
        info!(
            "species: migrated {} legacy profiles ({} schedules)",
            self.catalog.profiles().len(),
            self.catalog.pool().len()
        );

        match self.persist_catalog() {
            Ok(()) => Ok(LoadOutcome::Migrated),
            Err(Error::Storage(e)) => {
                warn!("species: migration not committed, legacy catalog kept: {}", e);
                Ok(LoadOutcome::MigrationUncommitted(e))
            }
            Err(e) => Err(e),
        }
    }

    fn secret(&mut self) -> Result<secure::Secret> {
        match self.storage.read_blob(NAMESPACE, KEY_SECRET, secure::SECRET_LEN) {
            Ok(bytes) if bytes.len() == secure::SECRET_LEN => {
                let mut secret = [0u8; secure::SECRET_LEN];
                secret.copy_from_slice(&bytes);
                return Ok(secret);
            }
            Ok(_) => warn!("species: stored import secret has wrong length, regenerating"),
            Err(StorageError::NotFound) => {}
            Err(e) => return Err(Error::Storage(e)),
        }
        let secret = secure::generate_secret();
        self.storage.write(NAMESPACE, KEY_SECRET, &secret)?;
        info!("species: generated import secret");
        Ok(secret)
    }

    fn resolve(&self, key: &str) -> Option<ProfileRef> {
        if let Some(b) = find_builtin(key) {
            return Some(ProfileRef::Builtin(b));
        }
        let custom = self.catalog.find(key)?;
        self.catalog.view(custom).map(ProfileRef::Custom)
    }
}

/// Persistent species catalog behind one lock.
pub struct SpeciesStore<S: StoragePort> {
    inner: Mutex<Inner<S>>,
}

impl<S: StoragePort> SpeciesStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            inner: Mutex::new(Inner {
                storage,
                catalog: Catalog::new(),
                active_key: None,
                loaded: false,
                legacy_pending: false,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<S>>> {
        self.inner
            .lock()
            .map_err(|_| Error::InvalidState("species store lock poisoned"))
    }

    fn lock_loaded(&self) -> Result<MutexGuard<'_, Inner<S>>> {
        let guard = self.lock()?;
        guard.ensure_loaded()?;
        Ok(guard)
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Load the catalog and active key from storage.  On a parse failure the
    /// store stays unloaded and the error is returned; see
    /// [`recover_empty`](Self::recover_empty).  A legacy migration whose
    /// commit fails still loads and is reported through the outcome.
    pub fn load(&self) -> Result<LoadOutcome> {
        let mut inner = self.lock()?;
        let outcome = inner.read_catalog()?;
        inner.active_key = inner.read_active();
        info!(
            "species: loaded {} custom profiles, active={}",
            inner.catalog.profiles().len(),
            inner.active_key.as_deref().unwrap_or("-")
        );
        inner.loaded = true;
        Ok(outcome)
    }

    /// Start with an empty catalog when the stored one cannot be read.  The
    /// stored blob is left in place until the next successful save.
    pub fn recover_empty(&self) -> Result<()> {
        let mut inner = self.lock()?;
        warn!("species: continuing with an empty custom catalog");
        inner.catalog = Catalog::new();
        inner.legacy_pending = false;
        inner.active_key = inner.read_active();
        inner.loaded = true;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().map(|i| i.loaded).unwrap_or(false)
    }

    /// Give back the storage backend.
    pub fn into_storage(self) -> Result<S> {
        self.inner
            .into_inner()
            .map(|i| i.storage)
            .map_err(|_| Error::InvalidState("species store lock poisoned"))
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn builtin_profiles(&self) -> &'static [BuiltinProfile] {
        &BUILTIN_PROFILES
    }

    pub fn custom_count(&self) -> Result<usize> {
        Ok(self.lock_loaded()?.catalog.profiles().len())
    }

    pub fn custom_profiles(&self) -> Result<Vec<CustomProfileView>> {
        Ok(self.lock_loaded()?.catalog.views())
    }

    pub fn find(&self, key: &str) -> Result<ProfileRef> {
        self.lock_loaded()?.resolve(key).ok_or(Error::NotFound)
    }

    /// `(index, hash, refcount)` for each pool entry.
    pub fn pool_entries(&self) -> Result<Vec<(u16, u32, u16)>> {
        let inner = self.lock_loaded()?;
        Ok(inner
            .catalog
            .pool()
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u16, e.hash, e.refcount))
            .collect())
    }

    pub fn active_key(&self) -> Result<Option<ProfileKey>> {
        Ok(self.lock_loaded()?.active_key.clone())
    }

    // ── Mutation ────────────────────────────────────────────────

    /// Create or update the custom profile derived from `name`.
    pub fn save_custom(
        &self,
        name: &str,
        schedule: &ClimateSchedule,
        metadata: ProfileMetadata,
    ) -> Result<ProfileKey> {
        let mut inner = self.lock_loaded()?;
        let key = custom_key_for(name);
        let created = inner
            .catalog
            .upsert(key.clone(), profile::truncated(name), schedule, metadata)?;
        info!(
            "species: {} {}",
            if created { "created" } else { "updated" },
            key
        );
        inner.persist_catalog()?;
        Ok(key)
    }

    pub fn delete_custom(&self, key: &str) -> Result<DeleteOutcome> {
        let mut inner = self.lock_loaded()?;
        inner.catalog.remove(key)?;
        let was_active = inner.active_key.as_deref() == Some(key);
        if was_active {
            inner.active_key = None;
            if let Err(e) = inner.persist_active() {
                warn!("species: failed to clear active key: {}", e);
            }
        }
        info!("species: deleted {}", key);
        inner.persist_catalog()?;
        Ok(if was_active {
            DeleteOutcome::RemovedActive
        } else {
            DeleteOutcome::Removed
        })
    }

    /// Resolve `key`, mark it active and return its schedule.  A failed
    /// commit of the active key is logged; the schedule is still returned.
    pub fn apply(&self, key: &str) -> Result<ClimateSchedule> {
        let mut inner = self.lock_loaded()?;
        let profile = inner.resolve(key).ok_or(Error::NotFound)?;
        let schedule = profile.schedule();
        schedule.validate()?;
        inner.active_key = Some(profile::profile_key(profile.key())?);
        if let Err(e) = inner.persist_active() {
            warn!("species: failed to persist active profile {}: {}", key, e);
        }
        info!("species: applied {}", key);
        Ok(schedule)
    }

    /// Drop every custom profile and the active key.  The export secret is
    /// kept so earlier exports stay importable.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.lock_loaded()?;
        inner.catalog = Catalog::new();
        inner.active_key = None;
        inner.legacy_pending = false;
        let active = inner.persist_active();
        let legacy = inner.storage.delete(NAMESPACE, KEY_LEGACY);
        let catalog = inner.storage.delete(NAMESPACE, KEY_CATALOG);
        info!("species: reset");
        active.and(legacy).and(catalog).map_err(|e| {
            warn!("species: reset incomplete in storage: {}", e);
            Error::Storage(e)
        })
    }

    // ── Export / import ─────────────────────────────────────────

    pub fn export_secure(&self) -> Result<SecureExport> {
        let mut inner = self.lock_loaded()?;
        let secret = inner.secret()?;
        let payload = tlv::encode_catalog(&inner.catalog)?;
        let nonce = secure::random_nonce();
        let signature = secure::sign(&secret, &nonce, &payload);
        Ok(SecureExport::new(payload, nonce, signature))
    }

    /// Replace the custom catalog with a signed payload.  Nothing changes
    /// unless the signature verifies and the payload parses completely.
    pub fn import_secure(
        &self,
        payload: &[u8],
        nonce: &secure::Nonce,
        signature: &secure::Signature,
    ) -> Result<()> {
        if payload.len() > secure::MAX_IMPORT_LEN {
            return Err(Error::InvalidArgument("import payload exceeds 4096 bytes"));
        }
        let mut inner = self.lock_loaded()?;
        let secret = inner.secret()?;
        if !secure::verify(&secret, nonce, payload, signature) {
            warn!("species: import rejected, signature mismatch");
            return Err(Error::AuthenticationFailed);
        }
        let catalog = tlv::decode_catalog(payload).map_err(|e| {
            warn!("species: import rejected: {}", e);
            Error::from(e)
        })?;

        inner.catalog = catalog;
        let orphaned = inner
            .active_key
            .as_deref()
            .is_some_and(|k| find_builtin(k).is_none() && inner.catalog.find(k).is_none());
        if orphaned {
            inner.active_key = None;
            if let Err(e) = inner.persist_active() {
                warn!("species: failed to clear active key: {}", e);
            }
        }
        info!(
            "species: imported {} profiles ({} schedules)",
            inner.catalog.profiles().len(),
            inner.catalog.pool().len()
        );
        inner.persist_catalog()
    }

    /// Convenience wrapper over [`import_secure`](Self::import_secure).
    pub fn import_envelope(&self, export: &SecureExport) -> Result<()> {
        if export.version != tlv::FORMAT_VERSION {
            return Err(Error::InvalidState("unsupported export version"));
        }
        self.import_secure(&export.payload, &export.nonce, &export.signature)
    }
}
