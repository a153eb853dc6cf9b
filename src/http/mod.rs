//! HTTP surface: router, health check and static client bundle

mod routes;

pub use routes::build_router;
