//! A parallel segmented wheel sieve for counting, enumerating, and locating
//! primes in 64-bit intervals `[from, to)`.
//!
//! The eight components are split across modules: [`wheel`] and
//! [`base_primes`] build the static tables, [`segmenter`] plans the work,
//! [`marker`] and [`bucket`] do the actual composite marking, [`popcount`]
//! turns a marked bitset into a count, [`wheel_bitmap`] is an alternative
//! count-only fast path for mod-30/mod-210 wheels, and [`orchestrator`]
//! wires all of it together behind [`run`].

pub mod base_primes;
pub mod bucket;
pub mod config;
pub mod error;
pub mod marker;
pub mod orchestrator;
pub mod popcount;
pub mod segmenter;
pub mod sink;
pub mod topology;
pub mod wheel;
pub mod wheel_bitmap;

pub use config::{ModeArg, RunOptions, SchedulingModeArg, WheelArg};
pub use error::{CoreError, CoreResult};
pub use orchestrator::{run, Mode, RunOutcome, RunSpec};
pub use sink::{NullSink, PrimeSink, VecSink};
pub use topology::{CoreSchedulingMode, CpuTopology};
pub use wheel::WheelType;
