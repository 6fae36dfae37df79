//! Command implementations for the CLI.

pub mod init;
pub mod run;
pub mod watch;
