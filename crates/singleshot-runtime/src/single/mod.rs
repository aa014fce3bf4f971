//! Single-shot invocation engine.
//!
//! A [`SingleShot`] owns one backend instance and one worker thread. Each call
//! to [`SingleShot::invoke`] hands a copy of the input to the worker and waits
//! for the result, bounded by the engine's timeout:
//! * the result arrives in time and is returned to the caller;
//! * the timeout expires first and the call fails with
//!   [`MlError::TimedOut`](crate::MlError::TimedOut), while the worker finishes
//!   the pass and frees its output;
//! * another invocation is still running and the call fails at once with
//!   [`MlError::TryAgain`](crate::MlError::TryAgain).
//!
//! Outputs allocated by the backend go back to it exactly once, when the
//! caller drops them or, if no caller ever receives them, when the worker or
//! [`SingleShot::close`] releases them.
mod core;
mod engine;
mod handle;
mod options;
mod pending;
mod property;
mod state;
mod worker;

#[cfg(test)]
mod tests;

pub use self::core::SingleShot;
pub use handle::HandleId;
pub use options::OpenOptions;
