pub mod config;
pub mod logs;
pub mod snapshot;
pub mod watch;
