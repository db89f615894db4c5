//! # Keridian Testkit
//!
//! Testing utilities for the Keridian kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known log scripts with expected outputs for cross-platform verification
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Scripted identities for setting up test scenarios
//!
//! ## Golden Vectors
//!
//! Golden vectors ensure deterministic canonicalization across implementations:
//!
//! ```rust
//! use keridian_testkit::vectors::{all_vectors, generate_log_from_vector};
//!
//! for vector in all_vectors() {
//!     let log = generate_log_from_vector(&vector);
//!     println!("{}: {}", vector.name, log[0].event.aid);
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use keridian_testkit::generators::{inception_from_params, InceptionParams};
//!
//! proptest! {
//!     #[test]
//!     fn aid_is_deterministic(params: InceptionParams) {
//!         let a = inception_from_params(&params);
//!         let b = inception_from_params(&params);
//!         prop_assert_eq!(a.event.aid, b.event.aid);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly script coherent event chains:
//!
//! ```rust
//! use keridian_testkit::fixtures::IdentityFixture;
//!
//! let mut identity = IdentityFixture::new(0x42);
//! let icp = identity.inception();
//! let ixn = identity.interact(b"anchored data");
//! let rot = identity.rotate();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{controllers, IdentityFixture};
pub use generators::{inception_from_params, signing_keypairs, InceptionParams};
pub use vectors::{all_vectors, generate_log_from_vector, verify_all_vectors, GoldenVector};
