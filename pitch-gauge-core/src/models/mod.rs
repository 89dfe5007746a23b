pub mod config;
pub mod error;
pub mod pitch;
pub mod state;
