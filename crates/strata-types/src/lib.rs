//! Foundation types for the Strata dataset registry.
//!
//! This crate provides the address and control-flow types used throughout
//! the Strata system. Every other Strata crate depends on `strata-types`.
//!
//! # Key Types
//!
//! - [`Address`] -- 20-byte content-addressed identifier (truncated BLAKE3)
//! - [`AddressSet`] -- hash set of addresses, used for GC generation roots
//! - [`Context`] -- cancellation token with optional deadline
//! - [`ParseAddressError`] -- failure parsing an address's textual form

pub mod address;
pub mod context;
pub mod error;

pub use address::{Address, AddressSet};
pub use context::Context;
pub use error::ParseAddressError;
