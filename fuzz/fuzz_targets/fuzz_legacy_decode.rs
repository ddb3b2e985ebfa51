//! Fuzz target: `legacy::decode_legacy`
//!
//! Arbitrary bytes into the v1 migration path.  Invalid records are
//! skipped, so the only acceptable failure is a length that is not a
//! whole number of records.
//!
//! cargo fuzz run fuzz_legacy_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use terrarium::species::legacy::{LEGACY_RECORD_LEN, decode_legacy};
use terrarium::species::tlv::DecodeError;

fuzz_target!(|data: &[u8]| {
    match decode_legacy(data) {
        Ok(catalog) => {
            assert_eq!(data.len() % LEGACY_RECORD_LEN, 0);
            assert!(catalog.is_consistent());
        }
        Err(DecodeError::Truncated) => assert_ne!(data.len() % LEGACY_RECORD_LEN, 0),
        Err(DecodeError::Capacity) => {}
        Err(other) => panic!("unexpected legacy error: {other}"),
    }
});
