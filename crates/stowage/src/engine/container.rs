//! Container capability interface, the standard slot container, and the
//! container registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use stowage_proto::ParticipantId;

use super::delta::{Delta, Placement};
use super::item::ItemInstance;
use super::types::{ContainerId, DefinitionId, ItemId, OccupiedSlotBehavior, SlotDescriptor};

// ============================================================================
// Capability Interface
// ============================================================================

/// One slot-level mutation handed to a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SlotMutation {
    Attach { slot: SlotDescriptor, item: ItemId },
    Detach { slot: SlotDescriptor },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    SlotInvalid {
        container: ContainerId,
        slot: SlotDescriptor,
    },
    SlotOccupied {
        container: ContainerId,
        slot: SlotDescriptor,
    },
    SlotEmpty {
        container: ContainerId,
        slot: SlotDescriptor,
    },
    OccupantMismatch {
        container: ContainerId,
        slot: SlotDescriptor,
        expected: ItemId,
        actual: ItemId,
    },
    ForeignDelta {
        container: ContainerId,
    },
}

/// Contract implemented by anything that holds items in addressable slots.
///
/// `mutate` and `apply_delta` are the only mutation entry points; everything
/// else is a read or a policy query. `can_accept` is a pure policy check —
/// occupancy is not part of it, because occupied destinations are routed
/// through `occupied_slot_behavior` instead.
pub trait Container {
    fn id(&self) -> &ContainerId;

    /// Read the occupant of a slot. No side effects.
    fn resolve_slot(&self, slot: &SlotDescriptor) -> Option<ItemId>;

    /// Every occupied slot, in stable order. Feeds merge-first scans.
    fn occupied_slots(&self) -> Vec<(SlotDescriptor, ItemId)>;

    /// The first empty slot this container would expose, if any.
    fn first_free_slot(&self) -> Option<SlotDescriptor>;

    /// Policy/capacity/geometry check; a `false` result is ordinary
    /// validation input, not an error.
    fn can_accept(
        &self,
        slot: &SlotDescriptor,
        item: &ItemInstance,
        requester: &ParticipantId,
    ) -> bool;

    /// How an incoming item interacts with the current occupant of `slot`.
    /// Unconfigured containers reject.
    fn occupied_slot_behavior(
        &self,
        _slot: &SlotDescriptor,
        _incoming: &ItemInstance,
    ) -> OccupiedSlotBehavior {
        OccupiedSlotBehavior::Reject
    }

    fn supports_speculative_execution(&self) -> bool;

    /// Apply one slot mutation, returning the delta that records it. The
    /// returned delta carries its own inverse information.
    fn mutate(&mut self, mutation: SlotMutation) -> Result<Delta, ContainerError>;

    /// Apply a delta produced by `mutate` (or its inverse during rollback).
    /// `forced = true` is rollback-only: acceptance policy is bypassed
    /// because occupancy and policy state may have changed since the
    /// original validation. Structural checks still hold.
    fn apply_delta(&mut self, delta: &Delta, forced: bool) -> Result<(), ContainerError>;
}

// ============================================================================
// Standard Slot Container
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SlotShape {
    Flat { capacity: u32 },
    Grid { cols: u32, rows: u32 },
    Keyed,
}

/// Occupied-slot policy for the standard container. Same-item repositioning
/// is detected separately and never configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OccupiedPolicy {
    #[default]
    Reject,
    Swap,
    StackCombine,
    FragmentCombine,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotContainerConfig {
    pub shape: SlotShape,
    /// Definitions this container accepts; empty accepts all.
    #[serde(default)]
    pub accepts: BTreeSet<DefinitionId>,
    /// Keys exposed when the shape is `Keyed`; empty allows any key.
    #[serde(default)]
    pub keys: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub speculative: bool,
    #[serde(default)]
    pub occupied: OccupiedPolicy,
}

impl SlotContainerConfig {
    pub fn flat(capacity: u32) -> Self {
        Self {
            shape: SlotShape::Flat { capacity },
            accepts: BTreeSet::new(),
            keys: BTreeSet::new(),
            speculative: true,
            occupied: OccupiedPolicy::Reject,
        }
    }

    pub fn grid(cols: u32, rows: u32) -> Self {
        Self {
            shape: SlotShape::Grid { cols, rows },
            ..Self::flat(0)
        }
    }

    pub fn keyed() -> Self {
        Self {
            shape: SlotShape::Keyed,
            ..Self::flat(0)
        }
    }

    pub fn with_occupied(mut self, occupied: OccupiedPolicy) -> Self {
        self.occupied = occupied;
        self
    }

    pub fn with_speculative(mut self, speculative: bool) -> Self {
        self.speculative = speculative;
        self
    }

    pub fn with_accepts(mut self, definitions: impl IntoIterator<Item = DefinitionId>) -> Self {
        self.accepts = definitions.into_iter().collect();
        self
    }
}

/// The standard container: a slot map over a configured shape. Geometry-rich
/// containers live outside the engine and implement [`Container`] directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotContainer {
    pub id: ContainerId,
    pub config: SlotContainerConfig,
    pub slots: BTreeMap<SlotDescriptor, ItemId>,
}

impl SlotContainer {
    pub fn new(id: impl Into<String>, config: SlotContainerConfig) -> Self {
        Self {
            id: id.into(),
            config,
            slots: BTreeMap::new(),
        }
    }

    pub fn flat(id: impl Into<String>, capacity: u32) -> Self {
        Self::new(id, SlotContainerConfig::flat(capacity))
    }

    pub fn grid(id: impl Into<String>, cols: u32, rows: u32) -> Self {
        Self::new(id, SlotContainerConfig::grid(cols, rows))
    }

    pub fn keyed(id: impl Into<String>) -> Self {
        Self::new(id, SlotContainerConfig::keyed())
    }

    fn slot_in_shape(&self, slot: &SlotDescriptor) -> bool {
        match (&self.config.shape, slot) {
            (SlotShape::Flat { capacity }, SlotDescriptor::Index { index }) => index < capacity,
            (SlotShape::Grid { cols, rows }, SlotDescriptor::Grid { col, row }) => {
                col < cols && row < rows
            }
            (SlotShape::Keyed, SlotDescriptor::Named { key }) => {
                !key.trim().is_empty() && (self.config.keys.is_empty() || self.config.keys.contains(key))
            }
            _ => false,
        }
    }

    fn shape_slots(&self) -> Vec<SlotDescriptor> {
        match &self.config.shape {
            SlotShape::Flat { capacity } => {
                (0..*capacity).map(SlotDescriptor::index).collect()
            }
            SlotShape::Grid { cols, rows } => {
                let mut slots = Vec::with_capacity((cols * rows) as usize);
                for row in 0..*rows {
                    for col in 0..*cols {
                        slots.push(SlotDescriptor::grid(col, row));
                    }
                }
                slots
            }
            SlotShape::Keyed => self
                .config
                .keys
                .iter()
                .map(|key| SlotDescriptor::named(key.clone()))
                .collect(),
        }
    }
}

impl Container for SlotContainer {
    fn id(&self) -> &ContainerId {
        &self.id
    }

    fn resolve_slot(&self, slot: &SlotDescriptor) -> Option<ItemId> {
        self.slots.get(slot).cloned()
    }

    fn occupied_slots(&self) -> Vec<(SlotDescriptor, ItemId)> {
        self.slots
            .iter()
            .map(|(slot, item)| (slot.clone(), item.clone()))
            .collect()
    }

    fn first_free_slot(&self) -> Option<SlotDescriptor> {
        self.shape_slots()
            .into_iter()
            .find(|slot| !self.slots.contains_key(slot))
    }

    fn can_accept(
        &self,
        slot: &SlotDescriptor,
        item: &ItemInstance,
        _requester: &ParticipantId,
    ) -> bool {
        if !self.slot_in_shape(slot) {
            return false;
        }
        self.config.accepts.is_empty() || self.config.accepts.contains(&item.definition)
    }

    fn occupied_slot_behavior(
        &self,
        slot: &SlotDescriptor,
        incoming: &ItemInstance,
    ) -> OccupiedSlotBehavior {
        if self
            .slots
            .get(slot)
            .is_some_and(|occupant| *occupant == incoming.id)
        {
            return OccupiedSlotBehavior::SameItem;
        }
        match self.config.occupied {
            OccupiedPolicy::Reject => OccupiedSlotBehavior::Reject,
            OccupiedPolicy::Swap => OccupiedSlotBehavior::Swap,
            OccupiedPolicy::StackCombine => OccupiedSlotBehavior::StackCombine,
            OccupiedPolicy::FragmentCombine => OccupiedSlotBehavior::FragmentCombine,
        }
    }

    fn supports_speculative_execution(&self) -> bool {
        self.config.speculative
    }

    fn mutate(&mut self, mutation: SlotMutation) -> Result<Delta, ContainerError> {
        match mutation {
            SlotMutation::Attach { slot, item } => {
                if !self.slot_in_shape(&slot) {
                    return Err(ContainerError::SlotInvalid {
                        container: self.id.clone(),
                        slot,
                    });
                }
                if self.slots.contains_key(&slot) {
                    return Err(ContainerError::SlotOccupied {
                        container: self.id.clone(),
                        slot,
                    });
                }
                self.slots.insert(slot.clone(), item.clone());
                Ok(Delta::SlotWrite {
                    container: self.id.clone(),
                    slot,
                    item,
                    placement: Placement::Added,
                })
            }
            SlotMutation::Detach { slot } => {
                let Some(item) = self.slots.remove(&slot) else {
                    return Err(ContainerError::SlotEmpty {
                        container: self.id.clone(),
                        slot,
                    });
                };
                Ok(Delta::SlotWrite {
                    container: self.id.clone(),
                    slot,
                    item,
                    placement: Placement::Removed,
                })
            }
        }
    }

    fn apply_delta(&mut self, delta: &Delta, _forced: bool) -> Result<(), ContainerError> {
        let Delta::SlotWrite {
            container,
            slot,
            item,
            placement,
        } = delta
        else {
            return Err(ContainerError::ForeignDelta {
                container: self.id.clone(),
            });
        };
        if *container != self.id {
            return Err(ContainerError::ForeignDelta {
                container: self.id.clone(),
            });
        }
        match placement {
            Placement::Added => {
                if !self.slot_in_shape(slot) {
                    return Err(ContainerError::SlotInvalid {
                        container: self.id.clone(),
                        slot: slot.clone(),
                    });
                }
                if self.slots.contains_key(slot) {
                    return Err(ContainerError::SlotOccupied {
                        container: self.id.clone(),
                        slot: slot.clone(),
                    });
                }
                self.slots.insert(slot.clone(), item.clone());
                Ok(())
            }
            Placement::Removed => {
                let Some(occupant) = self.slots.get(slot) else {
                    return Err(ContainerError::SlotEmpty {
                        container: self.id.clone(),
                        slot: slot.clone(),
                    });
                };
                if occupant != item {
                    return Err(ContainerError::OccupantMismatch {
                        container: self.id.clone(),
                        slot: slot.clone(),
                        expected: item.clone(),
                        actual: occupant.clone(),
                    });
                }
                self.slots.remove(slot);
                Ok(())
            }
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Explicit lookup service for every reachable container. Handed to the
/// engine at construction; there is no ambient global registry.
#[derive(Default)]
pub struct ContainerRegistry {
    containers: BTreeMap<ContainerId, Box<dyn Container>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container under its own id. Returns false (and drops
    /// nothing) when the id is already taken.
    pub fn register(&mut self, container: Box<dyn Container>) -> bool {
        let id = container.id().clone();
        if self.containers.contains_key(&id) {
            return false;
        }
        self.containers.insert(id, container);
        true
    }

    pub fn get(&self, id: &str) -> Option<&dyn Container> {
        self.containers.get(id).map(|c| c.as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut (dyn Container + '_)> {
        self.containers.get_mut(id).map(|c| &mut **c as &mut dyn Container)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.containers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ContainerId> {
        self.containers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}
