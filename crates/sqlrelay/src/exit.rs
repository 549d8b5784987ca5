/// Clean termination, including `--help` and flag parse errors.
pub const SUCCESS: i32 = 0;
/// Unhandled failure: spawn failure or an error reaching `main`.
pub const FAILURE: i32 = 1;
