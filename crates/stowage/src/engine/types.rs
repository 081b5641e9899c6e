//! Core type definitions: IDs, constants, slot addressing, and tag counters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Type Aliases
// ============================================================================

pub type ContainerId = String;
pub type ItemId = String;
pub type DefinitionId = String;
pub type TagName = String;
pub type EngineTime = u64;
pub type EventId = u64;

// ============================================================================
// Constants
// ============================================================================

pub const TAG_COUNT: &str = "count";
pub const TAG_DURABILITY: &str = "durability";
pub const TAG_CHARGES: &str = "charges";

pub const JOURNAL_VERSION: u32 = 1;
pub const DEFAULT_MAX_OPERATIONS_PER_REQUEST: usize = 32;
pub const DEFAULT_RECONCILIATION_TIMEOUT_TICKS: u64 = 600;

// ============================================================================
// Slot Addressing
// ============================================================================

/// One location inside one container. The three shapes cover flat lists,
/// 2-D grids, and named equipment-style slots; equality and ordering are
/// stable across participants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SlotDescriptor {
    Index { index: u32 },
    Grid { col: u32, row: u32 },
    Named { key: String },
}

impl SlotDescriptor {
    pub fn index(index: u32) -> Self {
        SlotDescriptor::Index { index }
    }

    pub fn grid(col: u32, row: u32) -> Self {
        SlotDescriptor::Grid { col, row }
    }

    pub fn named(key: impl Into<String>) -> Self {
        SlotDescriptor::Named { key: key.into() }
    }

    /// Cheap structural check used by the pre-filter; a well-formed
    /// descriptor can still fail container-shape validation later.
    pub fn is_well_formed(&self) -> bool {
        match self {
            SlotDescriptor::Index { .. } | SlotDescriptor::Grid { .. } => true,
            SlotDescriptor::Named { key } => !key.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub container: ContainerId,
    pub slot: SlotDescriptor,
}

impl SlotRef {
    pub fn new(container: impl Into<String>, slot: SlotDescriptor) -> Self {
        Self {
            container: container.into(),
            slot,
        }
    }
}

// ============================================================================
// Tag Counters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagBounds {
    pub min: i64,
    pub max: i64,
}

impl Default for TagBounds {
    fn default() -> Self {
        Self {
            min: 0,
            max: i64::MAX,
        }
    }
}

impl TagBounds {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }
}

/// Named signed counters carried by every item instance: `count`,
/// `durability`, `charges`, and whatever else a definition declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TagStacks {
    pub values: BTreeMap<TagName, i64>,
}

impl TagStacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, tag: &str) -> bool {
        self.values.contains_key(tag)
    }

    pub fn get(&self, tag: &str) -> i64 {
        *self.values.get(tag).unwrap_or(&0)
    }

    pub fn set(&mut self, tag: impl Into<String>, value: i64) {
        self.values.insert(tag.into(), value);
    }

    pub fn remove(&mut self, tag: &str) -> Option<i64> {
        self.values.remove(tag)
    }

    /// Overlay `other` on top of these values.
    pub fn merge(&mut self, other: &TagStacks) {
        for (tag, value) in &other.values {
            self.values.insert(tag.clone(), *value);
        }
    }
}

// ============================================================================
// Policy Enums
// ============================================================================

/// How an incoming item interacts with an occupied destination slot.
/// Containers are always queried; the unconfigured default is `Reject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupiedSlotBehavior {
    Reject,
    Swap,
    StackCombine,
    FragmentCombine,
    SameItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveDisposition {
    Destroy,
    DropToWorld,
    TransferToHolding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    Take,
    Place,
    Mutate,
}
