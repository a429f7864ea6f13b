// Library crate; main.rs and the integration tests build on it.

pub mod config;
pub mod error;
pub mod pool;
pub mod results;
pub mod routes;
pub mod server;
pub mod settings;
pub mod state;
pub mod sync;
pub mod writer;
