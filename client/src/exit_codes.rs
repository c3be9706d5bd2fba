//! Stable exit codes for `start-sploit`.

/// Stopped by Ctrl+C or a clean shutdown.
pub const OK: i32 = 0;
/// A fatal error stopped the farm (first-round config or launch failure,
/// posting loop crash).
pub const FATAL: i32 = 1;
/// Bad arguments or a sploit that failed validation. Matches clap's usage
/// error code.
pub const INVALID: i32 = 2;
