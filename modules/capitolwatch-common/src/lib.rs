pub mod config;
pub mod entities;
pub mod error;
pub mod types;

pub use config::Config;
pub use entities::*;
pub use error::*;
pub use types::*;
