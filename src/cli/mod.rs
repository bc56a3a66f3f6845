pub mod agents;
pub mod commands;
pub mod render;
pub mod run;
pub mod setup;
pub mod validate;

pub use commands::{Cli, Commands};
