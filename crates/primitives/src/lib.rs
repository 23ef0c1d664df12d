//! Shared types for the privacy pool engine: BN254 field newtypes, 256-bit
//! amounts, on-chain events, spend status, and canonical byte encodings.

pub mod digest;
pub mod encode;
pub mod error;
pub mod field;
pub mod types;

pub use error::{Error, Result};
pub use field::Fr;
pub use types::*;
