//! Fuzz target: `tlv::decode_catalog`
//!
//! Feeds arbitrary bytes to the catalog decoder.  It must never panic, and
//! any catalog it accepts must be consistent and re-encode to a blob that
//! decodes to the same catalog.
//!
//! cargo fuzz run fuzz_tlv_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use terrarium::species::tlv::{decode_catalog, encode_catalog};

fuzz_target!(|data: &[u8]| {
    let Ok(catalog) = decode_catalog(data) else {
        return;
    };
    assert!(catalog.is_consistent(), "decoder produced dangling references");

    let blob = encode_catalog(&catalog).expect("accepted catalog must re-encode");
    let again = decode_catalog(&blob).expect("re-encoded catalog must decode");
    assert_eq!(again, catalog);
});
