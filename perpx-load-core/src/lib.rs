mod coin;
mod config;
mod constants;
mod error;
mod stats;

pub use coin::*;
pub use config::*;
pub use constants::*;
pub use error::*;
pub use stats::*;
