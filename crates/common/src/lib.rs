//! Common types shared by the Freeplay gateway crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
