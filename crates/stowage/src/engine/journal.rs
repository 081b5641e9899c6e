//! Engine event journal: the append-only observability surface, with JSON
//! persistence.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use stowage_proto::{CorrelationId, PredictionKey, TransactionOutcome, TransactionResult};

use super::types::{EngineTime, EventId, JOURNAL_VERSION};

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub id: EventId,
    pub time: EngineTime,
    pub kind: EngineEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEventKind {
    /// A ledger was bound for this key; local effects are visible.
    SpeculationStarted {
        key: PredictionKey,
        correlation: CorrelationId,
    },
    /// A downgraded transaction left for the authority with no local effect.
    TransactionForwarded {
        key: PredictionKey,
        correlation: CorrelationId,
    },
    SpeculationConfirmed { key: PredictionKey },
    SpeculationRolledBack {
        key: PredictionKey,
        outcome: TransactionOutcome,
    },
    /// A terminal result was produced, locally or via reconciliation.
    TransactionResolved { result: TransactionResult },
}

// ============================================================================
// Journal
// ============================================================================

fn default_journal_version() -> u32 {
    JOURNAL_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineJournal {
    #[serde(default = "default_journal_version")]
    pub version: u32,
    pub next_event_id: EventId,
    pub events: Vec<EngineEvent>,
}

impl EngineJournal {
    pub fn new() -> Self {
        Self {
            version: JOURNAL_VERSION,
            next_event_id: 0,
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, time: EngineTime, kind: EngineEventKind) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.saturating_add(1);
        self.events.push(EngineEvent { id, time, kind });
        id
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, PersistError> {
        let journal: Self = serde_json::from_str(input)?;
        journal.validate_version()?;
        Ok(journal)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        write_json_to_path(self, path.as_ref())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let journal: Self = read_json_from_path(path.as_ref())?;
        journal.validate_version()?;
        Ok(journal)
    }

    pub(crate) fn validate_version(&self) -> Result<(), PersistError> {
        if self.version == JOURNAL_VERSION {
            Ok(())
        } else {
            Err(PersistError::UnsupportedVersion {
                version: self.version,
                expected: JOURNAL_VERSION,
            })
        }
    }
}

impl Default for EngineJournal {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    Io(String),
    Serde(String),
    UnsupportedVersion { version: u32, expected: u32 },
}

impl From<io::Error> for PersistError {
    fn from(err: io::Error) -> Self {
        PersistError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Serde(err.to_string())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

pub(crate) fn write_json_to_path<T: Serialize>(value: &T, path: &Path) -> Result<(), PersistError> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

pub(crate) fn read_json_from_path<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
