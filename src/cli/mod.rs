pub mod axes;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod fill;
pub mod log;
pub mod output;
pub mod revise;
pub mod unlock;

pub use context::CliContext;
pub use dispatch::dispatch;
pub use env::CliArgs;
