//! msglog: a line-protocol message log
//!
//! A TCP server that stores every line a client sends in a SQLite table and
//! answers two commands:
//! - `LIST`: return every stored message in insertion order
//! - `CLOSE`: acknowledge and close the connection
//!
//! The `client` module is the counterpart used by the `msglog-client` binary.

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod storage;
