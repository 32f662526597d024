pub mod api;
pub mod assets;
pub mod cli;
pub mod config;
pub mod error;
pub mod inventory;
pub mod notify;
pub mod orchestrator;
pub mod poller;
pub mod regeneration;
pub mod scheduler;
pub mod state_machine;
pub mod store;
pub mod ui;

#[cfg(test)]
mod test_support;
