pub mod auth;
pub mod responses;
pub mod router;
pub mod state;
pub mod uploads;

pub use auth::{AdminUser, AuthUser};
pub use state::AppState;
