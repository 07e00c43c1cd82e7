pub mod config;
pub mod error;
pub mod vault;
pub mod web;

pub use config::AppConfig;
pub use error::{VaultError, VaultResult};
