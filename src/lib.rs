pub mod config;
pub mod deploy;
pub mod docker;
pub mod errors;
pub mod logs;
pub mod server;
pub mod telemetry;
