//! Fuzz target: `SpeciesStore::import_secure`
//!
//! The store is seeded with a known secret so the fuzzer's payloads are
//! correctly signed and reach the decoder.  A rejected import must leave
//! the existing catalog untouched.
//!
//! cargo fuzz run fuzz_secure_import

#![no_main]

use libfuzzer_sys::fuzz_target;
use terrarium::adapters::nvs::NvsAdapter;
use terrarium::app::ports::StoragePort;
use terrarium::climate::ClimateSchedule;
use terrarium::species::{self, ProfileMetadata, SpeciesStore, secure};

const SECRET: [u8; secure::SECRET_LEN] = [0x5A; secure::SECRET_LEN];

fuzz_target!(|data: &[u8]| {
    let mut nvs = NvsAdapter::new().expect("host NVS");
    nvs.write(species::NAMESPACE, species::KEY_SECRET, &SECRET)
        .expect("seed secret");
    let store = SpeciesStore::new(nvs);
    store.load().expect("empty store loads");
    store
        .save_custom("seed", &ClimateSchedule::default(), ProfileMetadata::default())
        .expect("seed profile");
    let before = store.custom_profiles().expect("loaded");

    let nonce = [0u8; secure::NONCE_LEN];
    let signature = secure::sign(&SECRET, &nonce, data);
    match store.import_secure(data, &nonce, &signature) {
        Ok(()) => assert!(store.custom_count().expect("loaded") <= species::CUSTOM_PROFILE_MAX),
        Err(_) => assert_eq!(store.custom_profiles().expect("loaded"), before),
    }

    // An unsigned copy never gets past verification.
    let forged = [0u8; secure::SIGNATURE_LEN];
    if forged != signature {
        assert!(store.import_secure(data, &nonce, &forged).is_err());
    }
});
