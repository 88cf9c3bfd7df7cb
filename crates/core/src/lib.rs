//! Emporium Core - Shared domain types.
//!
//! This crate provides the types shared by the Emporium components:
//! - `storefront` - Cart API, checkout and payment webhook server
//! - `cli` - Migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. Cart stores, repositories and service objects live in
//! the storefront crate and speak in these types.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, quantities, prices, cart lines, product snapshots and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
