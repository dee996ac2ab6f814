//! Fuzz testing for the basic-auth header parser and credential comparison.
//!
//! Ensures that for arbitrary `Authorization` header values:
//!
//! - `parse_basic_authorization` never panics
//! - parsed credentials always compare equal to themselves
//! - `secure_compare` agrees with plain equality
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the basic auth fuzz target
//! cargo +nightly fuzz run fuzz_basic_auth
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_basic_auth -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use hardened_http::middleware::basic_auth::parse_basic_authorization;
use hardened_http::middleware::secure_compare;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    header: &'a str,
    left: &'a [u8],
    right: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    if let Some(credentials) = parse_basic_authorization(input.header) {
        assert!(secure_compare(
            credentials.username.as_bytes(),
            credentials.username.as_bytes()
        ));
        assert!(!credentials.username.contains(':'));
    }

    assert_eq!(
        secure_compare(input.left, input.right),
        input.left == input.right
    );
});
