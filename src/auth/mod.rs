pub mod context;
pub mod middleware;
