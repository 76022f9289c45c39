//! bluegreen-health: health decisions and blocking waits.
//!
//! # Architecture
//!
//! ```text
//! Waiter
//!   ├── PollSchedule (min_delay → max_delay doubling, capped by max_wait)
//!   ├── Clients::describe_environment() per poll
//!   └── ProgressReporter (background task, fixed interval)
//!       ├── Clients::events_since(last_seen)
//!       └── Error/Fatal event → unwinds the wait
//! ```
//!
//! [`classify`] is the pure decision function the reconciliation loop
//! runs on every environment it observes.

pub mod classify;
pub mod reporter;
pub mod waiter;

pub use classify::{AwaitTarget, Decision, PollSchedule, classify};
pub use reporter::{ProgressReporter, ReporterTracker};
pub use waiter::Waiter;
