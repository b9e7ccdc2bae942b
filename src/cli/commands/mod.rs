//! Command implementations for the CLI.
//!
//! Each command lives in its own module; [`project`] holds the shared code
//! that turns settings and flags into an open index.

pub mod index;
pub mod init;
pub mod project;
pub mod query;
pub mod watch;
