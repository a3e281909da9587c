//! Core types for Vic Shop.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod error;
pub mod id;
pub mod price;
pub mod status;
pub mod token;

pub use email::{Email, EmailError};
pub use error::ErrorKind;
pub use id::*;
pub use price::{Price, PriceError};
pub use status::*;
pub use token::TokenKind;
