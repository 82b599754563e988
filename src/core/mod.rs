//! Core constants and callback traits shared by the log buffer components.

mod constants;
mod traits;

pub use constants::*;
pub use traits::*;
