//! Latchkey Core
//!
//! Error taxonomy and secret reference parsing shared by the rest of the
//! Latchkey crates. This crate performs no I/O.

pub mod error;
pub mod reference;

pub use error::{Error, Result};
pub use reference::SecretReference;
