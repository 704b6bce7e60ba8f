//! Harvested message records and the dedup store behind the final transcript.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One harvested chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable message identifier; higher ids were sent later.
    pub id: u64,
    /// Display name of the sender. `None` marks a grouped continuation
    /// message whose author is inherited during export.
    pub author: Option<String>,
    /// Concatenated inline content segments, joined with no delimiter.
    pub text: String,
    /// Epoch milliseconds parsed from the item's time attribute, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Store that collapses repeated observations of the same message by id.
///
/// The same visual item is commonly re-rendered across scroll cycles near the
/// boundary of the virtualized window; re-inserting it overwrites in place,
/// so any number of overlapping cycles converges to one record per id.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: BTreeMap<u64, Record>,
    overwrites: usize,
}

impl RecordStore {
    /// Constructs an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct message ids held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records have been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of insertions that replaced an already-held id.
    pub fn overwrites(&self) -> usize {
        self.overwrites
    }

    /// Inserts a record, overwriting any previous observation of the same id.
    /// Returns `true` when the id was new.
    pub fn insert(&mut self, record: Record) -> bool {
        let fresh = self.records.insert(record.id, record).is_none();
        if !fresh {
            self.overwrites += 1;
        }
        fresh
    }

    /// Consumes the store and produces the transcript: records ascending by
    /// id, with every absent author rewritten to the nearest preceding
    /// author in that order.
    ///
    /// A single pass suffices; a run of absent authors with no preceding
    /// named record stays absent.
    pub fn into_transcript(self) -> Vec<Record> {
        let mut transcript: Vec<Record> = self.records.into_values().collect();
        let mut last_author: Option<String> = None;
        for record in &mut transcript {
            match &record.author {
                Some(name) => last_author = Some(name.clone()),
                None => record.author = last_author.clone(),
            }
        }
        transcript
    }
}
