//! Small helpers shared by the workspace crates: environment lookups, contact
//! identifier normalization, and time-zone handling.

pub mod env;
pub mod identity;
#[cfg(feature = "testing")]
pub mod testing;
pub mod tz;
