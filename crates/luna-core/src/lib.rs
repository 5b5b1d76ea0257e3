pub mod config;
pub mod error;
pub mod types;

pub use config::LunaConfig;
pub use error::{LunaError, Result};
pub use types::*;
