//! Per-(site, source) progress markers.
//!
//! A watermark only moves forward. Candidates that are older, equal, or of the
//! other kind (timestamp vs. offset) are ignored without error, so a late or
//! duplicated pass can never rewind a source.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::models::SourceKind;

/// The ordering key of the most recently processed record of a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Watermark {
    /// Timestamped feeds (`recentchanges`, `logevents`, `abuselog`).
    Timestamp(DateTime<Utc>),
    /// Registry position (`wkdomains`).
    Offset(u64),
}

impl Watermark {
    /// Whether `self` is strictly ahead of `other`. Values of different kinds
    /// are never ahead of each other.
    pub fn is_after(&self, other: &Watermark) -> bool {
        match (self, other) {
            (Watermark::Timestamp(a), Watermark::Timestamp(b)) => a > b,
            (Watermark::Offset(a), Watermark::Offset(b)) => a > b,
            _ => false,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Watermark::Timestamp(ts) => Some(*ts),
            Watermark::Offset(_) => None,
        }
    }

    pub fn as_offset(&self) -> Option<u64> {
        match self {
            Watermark::Offset(offset) => Some(*offset),
            Watermark::Timestamp(_) => None,
        }
    }

    /// Whether this kind of watermark belongs to `source`.
    pub fn fits(&self, source: SourceKind) -> bool {
        matches!(self, Watermark::Offset(_)) == source.is_offset_based()
    }
}

type Key = (String, SourceKind);

/// Thread-safe watermark map.
#[derive(Debug, Default)]
pub struct WatermarkStore {
    marks: Mutex<HashMap<Key, Watermark>>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, site: &str, source: SourceKind) -> Option<Watermark> {
        self.lock_marks()
            .get(&(site.to_string(), source))
            .copied()
    }

    /// Move the watermark to `candidate` if it is strictly newer.
    ///
    /// Returns `true` when the stored value changed.
    pub fn advance(&self, site: &str, source: SourceKind, candidate: Watermark) -> bool {
        if !candidate.fits(source) {
            debug!(
                "Ignoring {:?} watermark for {} on {}: wrong kind",
                candidate, source, site
            );
            return false;
        }

        let mut marks = self.lock_marks();
        let key = (site.to_string(), source);
        match marks.get(&key) {
            Some(current) if !candidate.is_after(current) => false,
            _ => {
                marks.insert(key, candidate);
                true
            }
        }
    }

    /// All watermarks of one site, for persistence.
    pub fn snapshot(&self, site: &str) -> BTreeMap<SourceKind, Watermark> {
        self.lock_marks()
            .iter()
            .filter(|((s, _), _)| s == site)
            .map(|((_, source), mark)| (*source, *mark))
            .collect()
    }

    /// Restore persisted watermarks. Each value goes through [`advance`](Self::advance),
    /// so seeding never rewinds a source.
    pub fn seed(&self, site: &str, marks: &BTreeMap<SourceKind, Watermark>) {
        for (source, mark) in marks {
            self.advance(site, *source, *mark);
        }
    }

    /// Lock the watermark map, recovering from poison if necessary.
    ///
    /// Every update is a single insert, so a panicking holder cannot leave the
    /// map half-written.
    fn lock_marks(&self) -> MutexGuard<'_, HashMap<Key, Watermark>> {
        self.marks.lock().unwrap_or_else(|poisoned| {
            warn!("Watermark mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
