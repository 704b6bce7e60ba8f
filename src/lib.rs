#![warn(missing_docs)]
//! Core library entry points for the backscroll chat-history harvester.
//!
//! The crate drives a virtualized, infinitely-scrolling chat list backward
//! through time via an externally supplied [`page::PageDriver`], extracts one
//! [`record::Record`] per rendered message, deduplicates observations across
//! overlapping render windows, and exports a chronologically ordered
//! transcript once the beginning of the conversation is reached.

pub mod controls;
pub mod engine;
pub mod extract;
pub mod page;
pub mod record;

pub use controls::{Cli, HarvestControls};
pub use engine::{CancelHandle, EngineState, HarvestEngine, HarvestError, RunSummary};
pub use extract::{ExtractError, ExtractRules, RecordExtractor};
pub use page::{DriverError, PageDriver};
pub use record::{Record, RecordStore};

#[cfg(feature = "debug_logs")]
#[macro_export]
// This allows use of the `eprintln!` macro via `debug_log!` macro.
macro_rules! debug_log {
        ($($arg:tt)*) => {
            eprintln!($($arg)*);
        };
    }
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
// This effectively disables the `eprintln!` macro, effectively removing it from the code during
// compilation.
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}
