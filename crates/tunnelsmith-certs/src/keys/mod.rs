//! Contains primitives to create private keys, which are used to sign CAs
//! and bind to leaf certificates.
//!
//! Only RSA keys are supported, because VPN peers commonly expect them. Keys
//! are generated with a configurable strength and are persisted as
//! PEM-encoded PKCS#8.
//!
//! ```no_run
//! use tunnelsmith_certs::keys::rsa::{SigningKey, DEFAULT_KEY_SIZE};
//! let key = SigningKey::new(DEFAULT_KEY_SIZE).unwrap();
//! ```
//!
//! The `rsa` crate is affected by the Marvin timing side channel
//! ([RUSTSEC-2023-0071](https://rustsec.org/advisories/RUSTSEC-2023-0071.html)).
//! Keys here only sign locally and never decrypt, which is outside the
//! affected operation.
pub mod rsa;
