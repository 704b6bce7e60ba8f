//! Harvesting engine driving the virtualized list backward through time.

use crate::controls::HarvestControls;
use crate::extract::{ExtractError, ExtractRules, RecordExtractor};
use crate::page::{DriverError, PageDriver};
use crate::record::{Record, RecordStore};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::timeout;

/// Lifecycle states of a [`HarvestEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed; `initialise` has not run yet.
    Uninitialised,
    /// Navigation completed; ready to `run`.
    Initialised,
    /// The harvesting loop is executing.
    Processing,
    /// The loop completed normally; records may be exported.
    Finished,
    /// A contract violation or fatal error occurred; terminal for the run.
    Invalid,
}

/// Clonable handle that aborts a running harvest at its next suspension point.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Fatal conditions that unwind out of an engine operation.
#[derive(Debug)]
pub enum HarvestError {
    /// An operation was invoked outside its required predecessor state.
    StateContract {
        /// State the operation requires.
        expected: EngineState,
        /// State the engine was actually in.
        actual: EngineState,
    },
    /// The page driver failed.
    Driver(DriverError),
    /// An item violated the extraction contract.
    Extract(ExtractError),
    /// Neither completion signal fired for too many consecutive cycles.
    Stalled {
        /// Number of consecutive double-timeout cycles observed.
        cycles: usize,
    },
    /// The run was aborted through its [`CancelHandle`].
    Cancelled,
}

impl fmt::Display for HarvestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateContract { expected, actual } => {
                write!(f, "state contract violated: expected {expected:?}, found {actual:?}")
            }
            Self::Driver(err) => write!(f, "{err}"),
            Self::Extract(err) => write!(f, "extraction failed: {err}"),
            Self::Stalled { cycles } => {
                write!(f, "page stalled: no completion signal for {cycles} consecutive cycles")
            }
            Self::Cancelled => write!(f, "harvest cancelled"),
        }
    }
}

impl Error for HarvestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            Self::Extract(err) => Some(err),
            Self::StateContract { .. } | Self::Stalled { .. } | Self::Cancelled => None,
        }
    }
}

/// Counters describing one completed harvesting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Extraction cycles performed.
    pub cycles: usize,
    /// Distinct records held at completion.
    pub records: usize,
    /// Observations that overwrote an already-held id.
    pub overwrites: usize,
}

impl RunSummary {
    /// Prints the summary in the same shape as the per-cycle progress lines.
    pub fn report(&self) {
        println!("--- harvest summary ---");
        println!("cycles: {}", self.cycles);
        println!("records: {}", self.records);
        println!("duplicate overwrites: {}", self.overwrites);
    }
}

/// How one cycle's completion race resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    BatchLoaded,
    EndOfHistory,
    Stalled,
}

/// Orchestrates repeated extract/scroll/wait cycles against one page driver,
/// accumulating deduplicated records until the start of history is reached.
pub struct HarvestEngine<D: PageDriver> {
    driver: D,
    controls: HarvestControls,
    extractor: RecordExtractor,
    store: RecordStore,
    state: EngineState,
    cancelled: Arc<AtomicBool>,
}

impl<D: PageDriver> HarvestEngine<D> {
    /// Builds an engine with the default extraction rules.
    pub fn new(driver: D, controls: HarvestControls) -> Result<Self, HarvestError> {
        let extractor =
            RecordExtractor::new(ExtractRules::default()).map_err(HarvestError::Extract)?;
        Ok(Self::with_extractor(driver, controls, extractor))
    }

    /// Builds an engine around a pre-compiled extractor.
    pub fn with_extractor(
        driver: D,
        controls: HarvestControls,
        extractor: RecordExtractor,
    ) -> Self {
        Self {
            driver,
            controls,
            extractor,
            store: RecordStore::new(),
            state: EngineState::Uninitialised,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Handle that aborts the run at its next suspension point.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// One-time navigation to the conversation view.
    pub async fn initialise(&mut self) -> Result<(), HarvestError> {
        self.require(EngineState::Uninitialised)?;
        match self.driver.navigate(self.controls.conversation_url()).await {
            Ok(()) => {
                self.state = EngineState::Initialised;
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Invalid;
                Err(HarvestError::Driver(err))
            }
        }
    }

    /// Executes the harvesting loop to completion.
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        self.require(EngineState::Initialised)?;
        self.state = EngineState::Processing;
        match self.harvest_loop().await {
            Ok(summary) => {
                self.state = EngineState::Finished;
                Ok(summary)
            }
            Err(err) => {
                self.state = EngineState::Invalid;
                Err(err)
            }
        }
    }

    /// Consumes the engine and returns the ordered, author-backfilled
    /// transcript. Only a `Finished` engine exports; a failed or unfinished
    /// run yields no partial data.
    pub fn export_records(self) -> Result<Vec<Record>, HarvestError> {
        if self.state != EngineState::Finished {
            return Err(HarvestError::StateContract {
                expected: EngineState::Finished,
                actual: self.state,
            });
        }
        Ok(self.store.into_transcript())
    }

    fn require(&mut self, expected: EngineState) -> Result<(), HarvestError> {
        if self.state != expected {
            let actual = self.state;
            self.state = EngineState::Invalid;
            return Err(HarvestError::StateContract { expected, actual });
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), HarvestError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(HarvestError::Cancelled);
        }
        Ok(())
    }

    async fn harvest_loop(&mut self) -> Result<RunSummary, HarvestError> {
        let mut cycles = 0usize;
        let mut stalled_streak = 0usize;
        loop {
            self.ensure_live()?;
            cycles += 1;
            let visible = self.harvest_pass().await?;
            println!(
                "[cycle {cycles}] {visible} items visible, {} records held",
                self.store.len()
            );

            self.driver
                .scroll_to_top(self.controls.scroller_selector())
                .await
                .map_err(HarvestError::Driver)?;
            crate::debug_log!("cycle {cycles}: waiting for an older batch or the end marker");

            match self.await_cycle_outcome().await? {
                CycleOutcome::EndOfHistory => {
                    crate::debug_log!("cycle {cycles}: end of history reached");
                    break;
                }
                CycleOutcome::BatchLoaded => {
                    stalled_streak = 0;
                }
                CycleOutcome::Stalled => {
                    stalled_streak += 1;
                    crate::debug_log!(
                        "cycle {cycles}: no signal within bound ({stalled_streak} consecutive)"
                    );
                    if stalled_streak >= self.controls.max_stalled_cycles() {
                        return Err(HarvestError::Stalled {
                            cycles: stalled_streak,
                        });
                    }
                }
            }
        }

        Ok(RunSummary {
            cycles,
            records: self.store.len(),
            overwrites: self.store.overwrites(),
        })
    }

    /// Extracts every currently rendered item into the store. Returns the
    /// number of items enumerated.
    async fn harvest_pass(&mut self) -> Result<usize, HarvestError> {
        let items = self
            .driver
            .visible_items(
                self.controls.scroller_selector(),
                self.controls.item_selector(),
            )
            .await
            .map_err(HarvestError::Driver)?;

        let count = items.len();
        for item in &items {
            self.ensure_live()?;
            let html = self
                .driver
                .item_html(item)
                .await
                .map_err(HarvestError::Driver)?;
            if let Some(record) = self.extractor.extract(&html).map_err(HarvestError::Extract)? {
                self.store.insert(record);
            }
        }
        Ok(count)
    }

    /// Races the end-of-list marker against the batch-loaded signal, each
    /// under its own timeout. The batch branch is polled first so that a
    /// final batch arriving together with the end marker still earns one
    /// more extraction cycle before the marker terminates the loop. A
    /// double timeout is an indeterminate stall, classified by the caller.
    async fn await_cycle_outcome(&self) -> Result<CycleOutcome, HarvestError> {
        let bound = self.controls.signal_timeout();
        let end_wait = timeout(
            bound,
            self.driver
                .await_selector(self.controls.end_marker_selector()),
        );
        let batch_wait = timeout(
            bound,
            self.driver.observe_signal(self.controls.batch_signal()),
        );
        tokio::pin!(end_wait, batch_wait);

        tokio::select! {
            biased;
            batch = &mut batch_wait => match batch {
                Ok(resolved) => {
                    resolved.map_err(HarvestError::Driver)?;
                    Ok(CycleOutcome::BatchLoaded)
                }
                Err(_) => match end_wait.await {
                    Ok(resolved) => {
                        resolved.map_err(HarvestError::Driver)?;
                        Ok(CycleOutcome::EndOfHistory)
                    }
                    Err(_) => Ok(CycleOutcome::Stalled),
                },
            },
            end = &mut end_wait => match end {
                Ok(resolved) => {
                    resolved.map_err(HarvestError::Driver)?;
                    Ok(CycleOutcome::EndOfHistory)
                }
                Err(_) => match batch_wait.await {
                    Ok(resolved) => {
                        resolved.map_err(HarvestError::Driver)?;
                        Ok(CycleOutcome::BatchLoaded)
                    }
                    Err(_) => Ok(CycleOutcome::Stalled),
                },
            },
        }
    }
}
