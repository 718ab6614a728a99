//! API endpoint implementations.

mod auth;
mod reports;

pub use auth::AuthApi;
pub use reports::ReportsApi;
