pub mod error;

pub use error::{DaemonError, Result};
