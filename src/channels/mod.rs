//! Channel abstraction for message I/O.

pub mod channel;
pub mod cli;
pub mod line;
pub mod manager;

pub use channel::*;
pub use cli::CliChannel;
pub use line::LineChannel;
pub use manager::ChannelManager;
