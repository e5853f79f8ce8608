//! Storehub Core - Shared domain types.
//!
//! This crate provides the types shared by every Storehub component:
//! - `storefront` - Order engine, reporting, and the HTTP API
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access. Enabling the `postgres` feature adds `sqlx` encode/decode support
//! so the storage layer can bind these types directly.
//!
//! # Modules
//!
//! - [`types`] - Type-safe ids, email, quantities, order status and payment method

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
