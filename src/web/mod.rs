pub mod auth;
pub mod routes;

pub use auth::{AdminToken, CallerIdentity};
pub use routes::create_router;

use crate::vault::SharedVault;
use std::sync::Arc;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub vault: SharedVault,
    pub admin_token: Arc<AdminToken>,
    /// Answer allow-list denials as 404 instead of 403.
    pub conceal_forbidden: bool,
}

impl AppState {
    pub fn new(vault: SharedVault, admin_token: AdminToken, conceal_forbidden: bool) -> Self {
        Self {
            vault,
            admin_token: Arc::new(admin_token),
            conceal_forbidden,
        }
    }
}
