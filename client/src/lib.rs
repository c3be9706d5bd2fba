//! Farm client: runs a sploit against every team, every round, and ships
//! the flags it prints to the farm server.
//!
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (deadline math, roster
//!   partitioning, flag matching). No I/O.
//! - **[`io`]**: Side-effecting adapters (farm server HTTP API, child
//!   processes, the sploit file).
//!
//! The orchestration modules wire these together:
//!
//! - [`ticker`] is the round driver.
//! - [`attack`] refreshes config each round and dispatches instances onto the
//!   [`pool`].
//! - [`supervisor`] owns live processes and enforces deadlines.
//! - [`harvest`] extracts flags from output into the [`store`].
//! - [`delivery`] drains the store to the server.
//! - [`farm`] is the shared context; [`shutdown`] the cancellation signal.

pub mod attack;
pub mod core;
pub mod delivery;
pub mod exit_codes;
pub mod farm;
pub mod harvest;
pub mod io;
pub mod logging;
pub mod pool;
pub mod shutdown;
pub mod store;
pub mod supervisor;
mod sync;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod ticker;
