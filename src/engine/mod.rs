pub mod accumulator;
pub mod orchestrator;
pub mod pending;
pub mod stop_loss;
pub mod strategy;
pub mod tracker;
