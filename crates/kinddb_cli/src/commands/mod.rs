//! CLI command implementations.

pub mod export;
pub mod inspect;
pub mod key;
pub mod verify;
