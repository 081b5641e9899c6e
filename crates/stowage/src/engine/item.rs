//! Item model: definitions, instances, and the item store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use stowage_proto::PredictionKey;

use super::types::{
    ContainerId, DefinitionId, ItemId, SlotRef, TagBounds, TagName, TagStacks, TAG_COUNT,
};

// ============================================================================
// Definitions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: DefinitionId,
    pub name: String,
    /// Maximum `count` for one stack; 1 marks a non-stackable item.
    pub max_stack: i64,
    #[serde(default)]
    pub default_tags: TagStacks,
    /// Tags that may be created or mutated on instances of this definition,
    /// with their bounds. Tags outside this map fall back to default bounds
    /// when they already exist on an instance.
    #[serde(default)]
    pub tag_bounds: BTreeMap<TagName, TagBounds>,
}

impl ItemDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, max_stack: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_stack: max_stack.max(1),
            default_tags: TagStacks::new(),
            tag_bounds: BTreeMap::new(),
        }
    }

    pub fn with_default_tag(mut self, tag: impl Into<String>, value: i64) -> Self {
        self.default_tags.set(tag, value);
        self
    }

    pub fn with_tag_bounds(mut self, tag: impl Into<String>, bounds: TagBounds) -> Self {
        self.tag_bounds.insert(tag.into(), bounds);
        self
    }

    pub fn stackable(&self) -> bool {
        self.max_stack > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ItemCatalog {
    pub definitions: BTreeMap<DefinitionId, ItemDefinition>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, definition: ItemDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn get(&self, id: &str) -> Option<&ItemDefinition> {
        self.definitions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }
}

// ============================================================================
// Instances
// ============================================================================

/// A unit of content with stable identity. Instances never move between
/// stores; containers reference them by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemId,
    pub definition: DefinitionId,
    #[serde(default)]
    pub tags: TagStacks,
    /// Nested child container, if this item carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_container: Option<ContainerId>,
}

impl ItemInstance {
    pub fn new(id: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            definition: definition.into(),
            tags: TagStacks::new(),
            child_container: None,
        }
    }

    pub fn from_definition(id: impl Into<String>, definition: &ItemDefinition, count: i64) -> Self {
        let mut tags = definition.default_tags.clone();
        if definition.stackable() || tags.has(TAG_COUNT) {
            tags.set(TAG_COUNT, count);
        }
        Self {
            id: id.into(),
            definition: definition.id.clone(),
            tags,
            child_container: None,
        }
    }

    /// Stack count; items without a `count` tag are single units.
    pub fn count(&self) -> i64 {
        if self.tags.has(TAG_COUNT) {
            self.tags.get(TAG_COUNT)
        } else {
            1
        }
    }
}

/// Deterministic identity for an item created mid-transaction. Both sides of
/// a prediction derive the same id from the same key and operation index, so
/// a speculative instance and its authoritative twin unify without any extra
/// round trip.
pub fn mint_item_id(key: &PredictionKey, op_index: usize) -> ItemId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key.as_bytes());
    hasher.update(&(op_index as u64).to_be_bytes());
    format!("item-{}", hasher.finalize().to_hex())
}

// ============================================================================
// Item Store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStoreError {
    NotFound { item: ItemId },
    Duplicate { item: ItemId },
    StillPlaced { item: ItemId },
    NotPending { item: ItemId },
}

/// Arena of item instances. Live items sit in `items`; identities detached by
/// an unresolved transaction sit in the `pending_destruction` side table,
/// still resolvable, until the transaction finalizes or rolls back. The
/// placement index mirrors container slot maps and is maintained by the
/// executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ItemStore {
    pub items: BTreeMap<ItemId, ItemInstance>,
    pub pending_destruction: BTreeMap<ItemId, ItemInstance>,
    pub placements: BTreeMap<ItemId, SlotRef>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an identity: live items first, then pending-destruction ones.
    pub fn resolve(&self, id: &str) -> Option<&ItemInstance> {
        self.items.get(id).or_else(|| self.pending_destruction.get(id))
    }

    pub fn get_live(&self, id: &str) -> Option<&ItemInstance> {
        self.items.get(id)
    }

    pub fn is_pending_destruction(&self, id: &str) -> bool {
        self.pending_destruction.contains_key(id)
    }

    pub fn placement(&self, id: &str) -> Option<&SlotRef> {
        self.placements.get(id)
    }

    pub fn insert(&mut self, item: ItemInstance) -> Result<(), ItemStoreError> {
        if self.resolve(&item.id).is_some() {
            return Err(ItemStoreError::Duplicate {
                item: item.id.clone(),
            });
        }
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Permanently release an identity. Only meaningful on the authority or
    /// when reversing a speculative instantiation.
    pub fn free(&mut self, id: &str) -> Option<ItemInstance> {
        self.placements.remove(id);
        self.items
            .remove(id)
            .or_else(|| self.pending_destruction.remove(id))
    }

    /// Park a live, unplaced item in the pending-destruction table.
    pub fn mark_pending(&mut self, id: &str) -> Result<(), ItemStoreError> {
        if self.placements.contains_key(id) {
            return Err(ItemStoreError::StillPlaced {
                item: id.to_string(),
            });
        }
        let Some(item) = self.items.remove(id) else {
            return Err(ItemStoreError::NotFound {
                item: id.to_string(),
            });
        };
        self.pending_destruction.insert(id.to_string(), item);
        Ok(())
    }

    /// Restore a parked identity to the live arena (rollback path).
    pub fn cancel_pending(&mut self, id: &str) -> Result<(), ItemStoreError> {
        let Some(item) = self.pending_destruction.remove(id) else {
            return Err(ItemStoreError::NotPending {
                item: id.to_string(),
            });
        };
        self.items.insert(id.to_string(), item);
        Ok(())
    }

    /// Drop a parked identity for good (authoritative finalization).
    pub fn finalize_pending(&mut self, id: &str) -> Option<ItemInstance> {
        self.pending_destruction.remove(id)
    }

    pub fn set_placement(&mut self, id: &str, at: SlotRef) {
        self.placements.insert(id.to_string(), at);
    }

    pub fn clear_placement(&mut self, id: &str) {
        self.placements.remove(id);
    }

    /// Write one tag, returning the previous value. Looks through both the
    /// live arena and the pending table so rollbacks can touch parked items.
    pub fn write_tag(
        &mut self,
        id: &str,
        tag: &str,
        value: i64,
    ) -> Result<i64, ItemStoreError> {
        let item = self
            .items
            .get_mut(id)
            .or_else(|| self.pending_destruction.get_mut(id));
        let Some(item) = item else {
            return Err(ItemStoreError::NotFound {
                item: id.to_string(),
            });
        };
        let old = item.tags.get(tag);
        item.tags.set(tag.to_string(), value);
        Ok(old)
    }
}
