//! Interface to the external page-control collaborator.

use regex::Regex;
use std::error::Error;
use std::fmt;
use url::Url;

/// Capabilities the harvesting engine needs from a remote-controlled page.
///
/// Methods take `&self` so the end-marker and batch-signal futures can be
/// raced concurrently against one driver; implementations own whatever
/// interior mutability their transport requires. A driver is exclusively
/// owned by one harvesting run at a time.
///
/// Dropping the future returned by [`PageDriver::await_selector`] or
/// [`PageDriver::observe_signal`] must release the underlying subscription;
/// the engine drops the losing branch of every race.
#[allow(async_fn_in_trait)]
pub trait PageDriver {
    /// Opaque handle to one currently rendered list item.
    type Item;

    /// Loads the given location; awaited before any extraction begins.
    async fn navigate(&self, url: &Url) -> Result<(), DriverError>;

    /// Enumerates the currently rendered list items. The returned set may
    /// differ across calls as the virtualized list re-renders.
    async fn visible_items(
        &self,
        container: &str,
        item_selector: &str,
    ) -> Result<Vec<Self::Item>, DriverError>;

    /// Reads one item's rendered markup for synchronous extraction.
    async fn item_html(&self, item: &Self::Item) -> Result<String, DriverError>;

    /// Scrolls the given container to the top of its scroll range,
    /// prompting the host UI to lazily render the next older batch.
    async fn scroll_to_top(&self, container: &str) -> Result<(), DriverError>;

    /// Resolves once an element matching `selector` is present in the page.
    async fn await_selector(&self, selector: &str) -> Result<(), DriverError>;

    /// Resolves once a line matching `pattern` is observed on the page's
    /// console/telemetry stream, then unsubscribes. Single-shot.
    async fn observe_signal(&self, pattern: &Regex) -> Result<(), DriverError>;
}

/// Failure reported by a [`PageDriver`] implementation.
#[derive(Debug)]
pub struct DriverError {
    message: String,
}

impl DriverError {
    /// Wraps an implementation-specific failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page driver error: {}", self.message)
    }
}

impl Error for DriverError {}
