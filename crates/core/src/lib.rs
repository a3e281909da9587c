//! Vic Shop Core - Shared domain types.
//!
//! This crate provides the types shared by every Vic Shop component:
//! - `storefront` - Storefront API server and the commerce engines
//! - `cli` - Command-line tools for migrations, token sweeps and bootstrap
//!
//! # Architecture
//!
//! The core crate contains only types and their rules - no I/O, no database
//! access, no HTTP. The order status graph and the token lifetimes live here
//! so every caller sees the same rules.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, emails, statuses, token kinds and error kinds

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
