pub mod handlers;
pub mod rate_limit;

pub use handlers::{create_router, ApiState};
