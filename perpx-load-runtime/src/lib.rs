//! Operator binary support for `perpx-load`: the CLI, the reference load driver and the live
//! rate display.
pub mod cli;
pub mod display;
pub mod driver;
pub mod error;
pub mod logging;
pub mod runtime;

pub use crate::driver::{SharedCounters, TransactorGroup};
pub use crate::error::RuntimeError;
pub use crate::logging::init_logging;
pub use crate::runtime::LoadRuntime;
