//! Side-effecting adapters: farm server HTTP API, child processes, and the
//! sploit file on disk.

pub mod collector;
pub mod config;
pub mod process;
pub mod server;
pub mod sploit;
