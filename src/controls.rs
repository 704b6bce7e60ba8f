//! Harvest tuning controls shared between the engine and its callers.

use clap::Parser;
use regex::Regex;
use std::time::Duration;
use url::Url;

/// Conversation view opened before harvesting begins.
pub const DEFAULT_CONVERSATION_URL: &str = "https://discord.com/channels/@me";
/// Scrollable container hosting the virtualized message list.
pub const DEFAULT_SCROLLER_SELECTOR: &str = ".scroller";
/// List items enumerated on every extraction pass.
pub const DEFAULT_ITEM_SELECTOR: &str = "ol li";
/// Structural marker that appears only when no older history remains.
pub const DEFAULT_END_MARKER_SELECTOR: &str = r#"h1[class*="beginning"]"#;
/// Console line emitted by the host UI when a lazy-load batch has rendered.
pub const DEFAULT_BATCH_SIGNAL: &str = r"Fetched \d+ messages";

/// Tunable knobs that bound one harvesting run.
#[derive(Clone, Debug)]
pub struct HarvestControls {
    conversation_url: Url,
    scroller_selector: String,
    item_selector: String,
    end_marker_selector: String,
    batch_signal: Regex,
    signal_timeout: Duration,
    max_stalled_cycles: usize,
}

impl HarvestControls {
    /// Constructs a new set of harvest controls.
    pub fn new(
        conversation_url: Url,
        scroller_selector: String,
        item_selector: String,
        end_marker_selector: String,
        batch_signal: Regex,
        signal_timeout: Duration,
        max_stalled_cycles: usize,
    ) -> Self {
        Self {
            conversation_url,
            scroller_selector,
            item_selector,
            end_marker_selector,
            batch_signal,
            signal_timeout,
            max_stalled_cycles,
        }
    }

    /// Conversation view to open before harvesting.
    pub fn conversation_url(&self) -> &Url {
        &self.conversation_url
    }

    /// Selector for the scrollable list container.
    pub fn scroller_selector(&self) -> &str {
        &self.scroller_selector
    }

    /// Selector enumerating rendered list items within the container.
    pub fn item_selector(&self) -> &str {
        &self.item_selector
    }

    /// Selector for the end-of-history marker.
    pub fn end_marker_selector(&self) -> &str {
        &self.end_marker_selector
    }

    /// Pattern matched against console output to detect a rendered batch.
    pub fn batch_signal(&self) -> &Regex {
        &self.batch_signal
    }

    /// Bound applied to each completion signal individually.
    pub fn signal_timeout(&self) -> Duration {
        self.signal_timeout
    }

    /// Consecutive double-timeouts tolerated before the run fails as stalled.
    pub fn max_stalled_cycles(&self) -> usize {
        self.max_stalled_cycles
    }
}

impl Default for HarvestControls {
    fn default() -> Self {
        Self {
            conversation_url: Url::parse(DEFAULT_CONVERSATION_URL).expect("default url"),
            scroller_selector: DEFAULT_SCROLLER_SELECTOR.to_string(),
            item_selector: DEFAULT_ITEM_SELECTOR.to_string(),
            end_marker_selector: DEFAULT_END_MARKER_SELECTOR.to_string(),
            batch_signal: Regex::new(DEFAULT_BATCH_SIGNAL).expect("default signal pattern"),
            signal_timeout: Duration::from_secs(5),
            max_stalled_cycles: 3,
        }
    }
}

/// Command-line interface shared by binaries that want harvest controls.
#[derive(Parser, Debug, Clone)]
#[command(name = "backscroll", about = "Configurable chat-history harvester controls")]
pub struct Cli {
    /// Conversation view to open before harvesting
    #[arg(long, env = "BACKSCROLL_URL", default_value = DEFAULT_CONVERSATION_URL)]
    pub conversation_url: Url,

    /// Selector for the scrollable list container
    #[arg(long, env = "BACKSCROLL_SCROLLER", default_value = DEFAULT_SCROLLER_SELECTOR)]
    pub scroller_selector: String,

    /// Selector enumerating rendered list items
    #[arg(long, env = "BACKSCROLL_ITEMS", default_value = DEFAULT_ITEM_SELECTOR)]
    pub item_selector: String,

    /// Selector for the end-of-history marker
    #[arg(long, env = "BACKSCROLL_END_MARKER", default_value = DEFAULT_END_MARKER_SELECTOR)]
    pub end_marker_selector: String,

    /// Console pattern that announces a rendered batch
    #[arg(long, env = "BACKSCROLL_BATCH_SIGNAL", default_value = DEFAULT_BATCH_SIGNAL)]
    pub batch_signal: Regex,

    /// Seconds to wait on each completion signal per cycle
    #[arg(long, env = "BACKSCROLL_SIGNAL_TIMEOUT_SECS", default_value_t = 5)]
    pub signal_timeout_secs: u64,

    /// Consecutive double-timeouts tolerated before failing the run
    #[arg(long, env = "BACKSCROLL_MAX_STALLED", default_value_t = 3)]
    pub max_stalled_cycles: usize,
}

impl Cli {
    /// Converts the parsed CLI into `HarvestControls`.
    pub fn build_controls(&self) -> HarvestControls {
        HarvestControls::new(
            self.conversation_url.clone(),
            self.scroller_selector.clone(),
            self.item_selector.clone(),
            self.end_marker_selector.clone(),
            self.batch_signal.clone(),
            Duration::from_secs(self.signal_timeout_secs),
            self.max_stalled_cycles,
        )
    }
}
