//! Whole-batch validation: every operation is checked against current state
//! with zero mutation. The first failure aborts the entire transaction.

use super::super::container::Container;
use super::super::item::{mint_item_id, ItemDefinition, ItemInstance};
use super::super::ops::{AddItemSource, Operation, RejectReason};
use super::super::types::{
    ContainerId, OccupiedSlotBehavior, PermissionAction, RemoveDisposition, SlotDescriptor,
    SlotRef, TagBounds, TAG_COUNT,
};
use super::{ExecutionContext, TransactionEngine};

use stowage_proto::ParticipantId;

impl TransactionEngine {
    pub(super) fn validate_operation(
        &self,
        ctx: &ExecutionContext,
        index: usize,
        op: &Operation,
    ) -> Result<(), RejectReason> {
        match op {
            Operation::Move { from, to } => self.validate_move(ctx, from, to),
            Operation::ModifyTagStack {
                item,
                tag,
                delta,
                clamp,
            } => self.validate_modify_tag(item, tag, *delta, *clamp),
            Operation::SplitStack {
                from,
                to,
                amount,
                new_item,
            } => self.validate_split(ctx, index, from, to, *amount, new_item.as_deref()),
            Operation::RemoveItem {
                from,
                disposition,
                quantity,
                ..
            } => self.validate_remove(ctx, index, from, *disposition, *quantity),
            Operation::AddItem {
                to,
                source,
                merge_first,
            } => self.validate_add(ctx, index, to, source, *merge_first),
        }
    }

    // ========================================================================
    // Shared Lookups
    // ========================================================================

    pub(super) fn container_ref(&self, id: &str) -> Result<&dyn Container, RejectReason> {
        self.registry
            .get(id)
            .ok_or_else(|| RejectReason::ContainerNotFound {
                container: id.to_string(),
            })
    }

    pub(super) fn item_at(&self, at: &SlotRef) -> Result<String, RejectReason> {
        self.container_ref(&at.container)?
            .resolve_slot(&at.slot)
            .ok_or_else(|| RejectReason::SlotEmpty { slot: at.clone() })
    }

    pub(super) fn live_item(&self, id: &str) -> Result<&ItemInstance, RejectReason> {
        if self.items.is_pending_destruction(id) {
            return Err(RejectReason::ItemPendingDestruction {
                item: id.to_string(),
            });
        }
        self.items
            .get_live(id)
            .ok_or_else(|| RejectReason::ItemNotFound {
                item: id.to_string(),
            })
    }

    pub(super) fn definition_of(&self, item: &ItemInstance) -> Result<&ItemDefinition, RejectReason> {
        self.catalog
            .get(&item.definition)
            .ok_or_else(|| RejectReason::DefinitionNotFound {
                definition: item.definition.clone(),
            })
    }

    pub(super) fn require_permission(
        &self,
        container: &ContainerId,
        slot: &SlotDescriptor,
        requester: &ParticipantId,
        action: PermissionAction,
    ) -> Result<(), RejectReason> {
        if self
            .permissions
            .check_permission(container, slot, requester, action)
        {
            Ok(())
        } else {
            Err(RejectReason::PermissionDenied {
                container: container.clone(),
                action,
            })
        }
    }

    pub(super) fn tag_bounds_for(
        &self,
        definition: &ItemDefinition,
        item: &ItemInstance,
        tag: &str,
    ) -> Result<TagBounds, RejectReason> {
        if let Some(bounds) = definition.tag_bounds.get(tag) {
            return Ok(*bounds);
        }
        if item.tags.has(tag) {
            return Ok(TagBounds::default());
        }
        Err(RejectReason::TagNotDeclared {
            item: item.id.clone(),
            tag: tag.to_string(),
        })
    }

    // ========================================================================
    // Per-Operation Validation
    // ========================================================================

    fn validate_move(
        &self,
        ctx: &ExecutionContext,
        from: &SlotRef,
        to: &SlotRef,
    ) -> Result<(), RejectReason> {
        let item_id = self.item_at(from)?;
        let item = self.live_item(&item_id)?;
        self.require_permission(&from.container, &from.slot, &ctx.requester, PermissionAction::Take)?;
        self.require_permission(&to.container, &to.slot, &ctx.requester, PermissionAction::Place)?;

        let dest = self.container_ref(&to.container)?;
        let Some(occupant_id) = dest.resolve_slot(&to.slot) else {
            if !dest.can_accept(&to.slot, item, &ctx.requester) {
                return Err(RejectReason::CannotAccept {
                    slot: to.clone(),
                    item: item_id,
                });
            }
            return Ok(());
        };

        match dest.occupied_slot_behavior(&to.slot, item) {
            OccupiedSlotBehavior::SameItem => Ok(()),
            OccupiedSlotBehavior::Reject => Err(RejectReason::SlotOccupied { slot: to.clone() }),
            OccupiedSlotBehavior::Swap => {
                let occupant = self.live_item(&occupant_id)?;
                if !dest.can_accept(&to.slot, item, &ctx.requester) {
                    return Err(RejectReason::CannotAccept {
                        slot: to.clone(),
                        item: item_id,
                    });
                }
                let source = self.container_ref(&from.container)?;
                if !source.can_accept(&from.slot, occupant, &ctx.requester) {
                    return Err(RejectReason::SwapNotAccepted {
                        slot: from.clone(),
                        item: occupant_id,
                    });
                }
                // The displaced occupant moves too; permission covers both
                // directions.
                self.require_permission(
                    &to.container,
                    &to.slot,
                    &ctx.requester,
                    PermissionAction::Take,
                )?;
                self.require_permission(
                    &from.container,
                    &from.slot,
                    &ctx.requester,
                    PermissionAction::Place,
                )?;
                Ok(())
            }
            OccupiedSlotBehavior::StackCombine => {
                let occupant = self.live_item(&occupant_id)?;
                self.validate_combine(to, item, occupant, false)
            }
            OccupiedSlotBehavior::FragmentCombine => {
                let occupant = self.live_item(&occupant_id)?;
                self.validate_combine(to, item, occupant, true)
            }
        }
    }

    fn validate_combine(
        &self,
        to: &SlotRef,
        incoming: &ItemInstance,
        occupant: &ItemInstance,
        partial: bool,
    ) -> Result<(), RejectReason> {
        if occupant.definition != incoming.definition {
            return Err(RejectReason::NotCombinable { slot: to.clone() });
        }
        let definition = self.definition_of(occupant)?;
        if !definition.stackable() {
            return Err(RejectReason::NotCombinable { slot: to.clone() });
        }
        if partial {
            // Fragment combine moves whatever fits; it only needs room for
            // at least one unit.
            if occupant.count() >= definition.max_stack {
                return Err(RejectReason::CombineOverflow {
                    slot: to.clone(),
                    count: occupant.count(),
                    max_stack: definition.max_stack,
                });
            }
            return Ok(());
        }
        let combined = occupant.count().saturating_add(incoming.count());
        if combined > definition.max_stack {
            return Err(RejectReason::CombineOverflow {
                slot: to.clone(),
                count: combined,
                max_stack: definition.max_stack,
            });
        }
        Ok(())
    }

    fn validate_modify_tag(
        &self,
        item_id: &str,
        tag: &str,
        delta: i64,
        clamp: bool,
    ) -> Result<(), RejectReason> {
        let item = self.live_item(item_id)?;
        let definition = self.definition_of(item)?;
        let bounds = self.tag_bounds_for(definition, item, tag)?;
        let result = item.tags.get(tag).saturating_add(delta);
        if !clamp && !bounds.contains(result) {
            return Err(RejectReason::TagOutOfBounds {
                item: item.id.clone(),
                tag: tag.to_string(),
                value: result,
                min: bounds.min,
                max: bounds.max,
            });
        }
        Ok(())
    }

    fn validate_split(
        &self,
        ctx: &ExecutionContext,
        index: usize,
        from: &SlotRef,
        to: &SlotRef,
        amount: i64,
        new_item: Option<&str>,
    ) -> Result<(), RejectReason> {
        let item_id = self.item_at(from)?;
        let item = self.live_item(&item_id)?;
        let definition = self.definition_of(item)?;
        if !definition.stackable() {
            return Err(RejectReason::NotAStack { item: item_id });
        }
        let count = item.count();
        if amount <= 0 || amount >= count {
            return Err(RejectReason::SplitOutOfRange { amount, count });
        }
        if ctx.speculative && new_item.is_none() {
            return Err(RejectReason::CorrelationRequired { op_index: index });
        }
        if let Some(id) = new_item {
            if self.items.resolve(id).is_some() {
                return Err(RejectReason::ItemIdTaken {
                    item: id.to_string(),
                });
            }
        }
        self.require_permission(&from.container, &from.slot, &ctx.requester, PermissionAction::Take)?;
        self.require_permission(&to.container, &to.slot, &ctx.requester, PermissionAction::Place)?;

        let dest = self.container_ref(&to.container)?;
        match dest.resolve_slot(&to.slot) {
            None => {
                let candidate = new_item
                    .map(str::to_string)
                    .unwrap_or_else(|| mint_item_id(&ctx.key, index));
                let probe = ItemInstance::from_definition(candidate, definition, amount);
                if !dest.can_accept(&to.slot, &probe, &ctx.requester) {
                    return Err(RejectReason::CannotAccept {
                        slot: to.clone(),
                        item: probe.id,
                    });
                }
                Ok(())
            }
            Some(occupant_id) => {
                if occupant_id == item_id {
                    return Err(RejectReason::NotCombinable { slot: to.clone() });
                }
                let occupant = self.live_item(&occupant_id)?;
                if occupant.definition != item.definition {
                    return Err(RejectReason::NotCombinable { slot: to.clone() });
                }
                let combined = occupant.count().saturating_add(amount);
                if combined > definition.max_stack {
                    return Err(RejectReason::CombineOverflow {
                        slot: to.clone(),
                        count: combined,
                        max_stack: definition.max_stack,
                    });
                }
                Ok(())
            }
        }
    }

    fn validate_remove(
        &self,
        ctx: &ExecutionContext,
        index: usize,
        from: &SlotRef,
        disposition: RemoveDisposition,
        quantity: Option<i64>,
    ) -> Result<(), RejectReason> {
        let item_id = self.item_at(from)?;
        let item = self.live_item(&item_id)?;
        self.require_permission(&from.container, &from.slot, &ctx.requester, PermissionAction::Take)?;

        let count = item.count();
        let mut full = true;
        if let Some(qty) = quantity {
            if qty <= 0 {
                return Err(RejectReason::InvalidAmount { amount: qty });
            }
            if qty > count {
                return Err(RejectReason::SplitOutOfRange { amount: qty, count });
            }
            if qty < count {
                full = false;
                let definition = self.definition_of(item)?;
                if !definition.stackable() {
                    return Err(RejectReason::NotAStack { item: item_id });
                }
            }
        }

        match disposition {
            RemoveDisposition::Destroy | RemoveDisposition::DropToWorld => Ok(()),
            RemoveDisposition::TransferToHolding => {
                let Some(holding_id) = &self.config.holding_container else {
                    return Err(RejectReason::HoldingUnavailable);
                };
                let holding = self.container_ref(holding_id)?;
                let Some(slot) = holding.first_free_slot() else {
                    return Err(RejectReason::HoldingUnavailable);
                };
                let accepted = if full {
                    holding.can_accept(&slot, item, &ctx.requester)
                } else {
                    let definition = self.definition_of(item)?;
                    let qty = quantity.unwrap_or(count);
                    let probe = ItemInstance::from_definition(
                        mint_item_id(&ctx.key, index),
                        definition,
                        qty,
                    );
                    holding.can_accept(&slot, &probe, &ctx.requester)
                };
                if !accepted {
                    return Err(RejectReason::CannotAccept {
                        slot: SlotRef::new(holding_id.clone(), slot),
                        item: item_id,
                    });
                }
                Ok(())
            }
        }
    }

    fn validate_add(
        &self,
        ctx: &ExecutionContext,
        index: usize,
        to: &SlotRef,
        source: &AddItemSource,
        merge_first: bool,
    ) -> Result<(), RejectReason> {
        self.require_permission(&to.container, &to.slot, &ctx.requester, PermissionAction::Place)?;
        let dest = self.container_ref(&to.container)?;

        match source {
            AddItemSource::CreateNew {
                definition,
                count,
                initial_tags,
                new_item,
            } => {
                let Some(def) = self.catalog.get(definition) else {
                    return Err(RejectReason::DefinitionNotFound {
                        definition: definition.clone(),
                    });
                };
                if *count <= 0 {
                    return Err(RejectReason::InvalidAmount { amount: *count });
                }
                if *count > def.max_stack {
                    return Err(RejectReason::CombineOverflow {
                        slot: to.clone(),
                        count: *count,
                        max_stack: def.max_stack,
                    });
                }
                if ctx.speculative && new_item.is_none() {
                    return Err(RejectReason::CorrelationRequired { op_index: index });
                }
                if let Some(id) = new_item {
                    if self.items.resolve(id).is_some() {
                        return Err(RejectReason::ItemIdTaken { item: id.clone() });
                    }
                }
                let candidate = new_item
                    .clone()
                    .unwrap_or_else(|| mint_item_id(&ctx.key, index));
                for (tag, value) in &initial_tags.values {
                    let declared = def.tag_bounds.get(tag).copied().or_else(|| {
                        if def.default_tags.has(tag) || tag == TAG_COUNT {
                            Some(TagBounds::default())
                        } else {
                            None
                        }
                    });
                    let Some(bounds) = declared else {
                        return Err(RejectReason::TagNotDeclared {
                            item: candidate.clone(),
                            tag: tag.clone(),
                        });
                    };
                    if !bounds.contains(*value) {
                        return Err(RejectReason::TagOutOfBounds {
                            item: candidate.clone(),
                            tag: tag.clone(),
                            value: *value,
                            min: bounds.min,
                            max: bounds.max,
                        });
                    }
                }
                let mut probe = ItemInstance::from_definition(candidate, def, *count);
                probe.tags.merge(initial_tags);
                self.validate_add_target(ctx, to, dest, &probe, def, *count, merge_first)
            }
            AddItemSource::Existing { item } => {
                let instance = self.live_item(item)?;
                if self.items.placement(item).is_some() {
                    return Err(RejectReason::ItemAlreadyPlaced { item: item.clone() });
                }
                let def = self.definition_of(instance)?;
                self.validate_add_target(ctx, to, dest, instance, def, instance.count(), merge_first)
            }
        }
    }

    fn validate_add_target(
        &self,
        ctx: &ExecutionContext,
        to: &SlotRef,
        dest: &dyn Container,
        probe: &ItemInstance,
        definition: &ItemDefinition,
        count: i64,
        merge_first: bool,
    ) -> Result<(), RejectReason> {
        let room = if merge_first && definition.stackable() {
            self.merge_room(dest, definition, probe)
        } else {
            0
        };
        let remainder = count.saturating_sub(room).max(0);
        if remainder == 0 {
            return Ok(());
        }
        if dest.resolve_slot(&to.slot).is_some() {
            return Err(RejectReason::SlotOccupied { slot: to.clone() });
        }
        if !dest.can_accept(&to.slot, probe, &ctx.requester) {
            return Err(RejectReason::CannotAccept {
                slot: to.clone(),
                item: probe.id.clone(),
            });
        }
        Ok(())
    }

    /// Total capacity left in the destination's compatible stacks.
    pub(super) fn merge_room(
        &self,
        dest: &dyn Container,
        definition: &ItemDefinition,
        incoming: &ItemInstance,
    ) -> i64 {
        let mut room = 0i64;
        for (_slot, occupant_id) in dest.occupied_slots() {
            if occupant_id == incoming.id {
                continue;
            }
            let Some(occupant) = self.items.get_live(&occupant_id) else {
                continue;
            };
            if occupant.definition != definition.id {
                continue;
            }
            room = room.saturating_add((definition.max_stack - occupant.count()).max(0));
        }
        room
    }
}
