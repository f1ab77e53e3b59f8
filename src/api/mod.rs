pub mod handlers;
pub mod routes;

pub use routes::{admin_routes, create_router};
