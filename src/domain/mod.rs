//! Business logic on top of the storage layer.

pub mod atm_service;
pub mod auth_service;
pub mod models;
pub mod password;
pub mod profile_service;

pub use atm_service::AtmService;
pub use auth_service::{AuthError, AuthService};
pub use profile_service::{ProfileService, SupervisorProfile};
