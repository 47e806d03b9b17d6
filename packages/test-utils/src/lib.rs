//! Shared test utilities for Btecify workspace
//!
//! Building blocks for exercising the job registry and the API without real
//! downloads:
//!
//! - [`delayed_ok`] / [`delayed_err`] - work units that finish after a delay
//! - [`manual_unit`] - a work unit that finishes when its [`UnitTrigger`] fires
//! - [`CallCounter`] - counts completion-callback invocations across tasks
//! - [`wait_for`] - polls an async condition until it holds or times out
//!
//! # Example
//!
//! ```rust,ignore
//! use btecify_test_utils::{delayed_ok, CallCounter};
//!
//! let counter = CallCounter::new();
//! let units = (0..3).map(|i| delayed_ok(Duration::from_millis(10 * i), i));
//! ```

mod counter;
mod units;
mod wait;

pub use counter::CallCounter;
pub use units::{delayed_err, delayed_ok, manual_unit, UnitTrigger};
pub use wait::wait_for;
