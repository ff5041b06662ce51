pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
