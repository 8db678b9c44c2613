pub mod config;
pub mod engine;
pub mod exchange;
pub mod health;
pub mod market;
pub mod telemetry;
pub mod types;
