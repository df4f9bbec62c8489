pub mod api;
pub mod config;
pub mod connection;
pub mod database;
pub mod entries;
pub mod error;
pub mod mcp_handler;
pub mod renewal;
pub mod settlement;
pub mod types;
pub mod use_cases;
pub mod utils;
pub mod winners;

pub use error::*;
pub use settlement::DrawSettlement;
pub use types::*;
