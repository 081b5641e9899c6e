//! Application: operations mutate in array order, each producing deltas
//! appended to the transaction ledger. Failures here are defensive — the
//! batch already validated — and unwind in the caller.

use std::collections::BTreeMap;
use std::fmt::Debug;

use super::super::container::SlotMutation;
use super::super::delta::Delta;
use super::super::item::{mint_item_id, ItemInstance};
use super::super::ops::{AddItemSource, Operation, RejectReason};
use super::super::types::{
    ContainerId, ItemId, OccupiedSlotBehavior, RemoveDisposition, SlotDescriptor, SlotRef,
    TAG_COUNT,
};
use super::{ExecutionContext, SpawnRequest, TransactionEngine};

impl TransactionEngine {
    pub(super) fn apply_operation(
        &mut self,
        ctx: &mut ExecutionContext,
        index: usize,
        op: &Operation,
    ) -> Result<(), RejectReason> {
        match op {
            Operation::Move { from, to } => self.apply_move(ctx, from, to),
            Operation::ModifyTagStack {
                item,
                tag,
                delta,
                clamp,
            } => self.apply_modify_tag(ctx, item, tag, *delta, *clamp),
            Operation::SplitStack {
                from,
                to,
                amount,
                new_item,
            } => self.apply_split(ctx, index, from, to, *amount, new_item.as_deref()),
            Operation::RemoveItem {
                from,
                disposition,
                quantity,
                material_params,
            } => self.apply_remove(ctx, index, from, *disposition, *quantity, material_params),
            Operation::AddItem {
                to,
                source,
                merge_first,
            } => self.apply_add(ctx, index, to, source, *merge_first),
        }
    }

    // ========================================================================
    // Primitive Steps
    // ========================================================================

    fn internal(err: impl Debug) -> RejectReason {
        RejectReason::InternalApplyFailure {
            message: format!("{err:?}"),
        }
    }

    fn attach(
        &mut self,
        ctx: &mut ExecutionContext,
        container: &ContainerId,
        slot: &SlotDescriptor,
        item: &ItemId,
    ) -> Result<(), RejectReason> {
        let Some(target) = self.registry.get_mut(container) else {
            return Err(RejectReason::ContainerNotFound {
                container: container.clone(),
            });
        };
        let delta = target
            .mutate(SlotMutation::Attach {
                slot: slot.clone(),
                item: item.clone(),
            })
            .map_err(Self::internal)?;
        self.items
            .set_placement(item, SlotRef::new(container.clone(), slot.clone()));
        ctx.ledger.push(delta);
        Ok(())
    }

    fn detach(
        &mut self,
        ctx: &mut ExecutionContext,
        container: &ContainerId,
        slot: &SlotDescriptor,
    ) -> Result<ItemId, RejectReason> {
        let Some(target) = self.registry.get_mut(container) else {
            return Err(RejectReason::ContainerNotFound {
                container: container.clone(),
            });
        };
        let delta = target
            .mutate(SlotMutation::Detach { slot: slot.clone() })
            .map_err(Self::internal)?;
        let Delta::SlotWrite { item, .. } = &delta else {
            return Err(Self::internal("detach produced a non-slot delta"));
        };
        let item_id = item.clone();
        self.items.clear_placement(&item_id);
        ctx.ledger.push(delta);
        Ok(item_id)
    }

    fn write_tag_delta(
        &mut self,
        ctx: &mut ExecutionContext,
        item: &ItemId,
        tag: &str,
        new: i64,
    ) -> Result<(), RejectReason> {
        let old = self
            .items
            .write_tag(item, tag, new)
            .map_err(Self::internal)?;
        ctx.ledger.push(Delta::TagWrite {
            item: item.clone(),
            tag: tag.to_string(),
            old,
            new,
        });
        Ok(())
    }

    fn instantiate(
        &mut self,
        ctx: &mut ExecutionContext,
        instance: ItemInstance,
    ) -> Result<(), RejectReason> {
        let item = instance.id.clone();
        self.items.insert(instance).map_err(Self::internal)?;
        ctx.ledger.push(Delta::Instantiated { item });
        Ok(())
    }

    /// Park a detached identity in the pending-destruction table and record
    /// it for finalization.
    fn park_identity(
        &mut self,
        ctx: &mut ExecutionContext,
        item: &ItemId,
    ) -> Result<(), RejectReason> {
        self.items.mark_pending(item).map_err(Self::internal)?;
        ctx.pending_destruction.push(item.clone());
        Ok(())
    }

    // ========================================================================
    // Per-Operation Application
    // ========================================================================

    fn apply_move(
        &mut self,
        ctx: &mut ExecutionContext,
        from: &SlotRef,
        to: &SlotRef,
    ) -> Result<(), RejectReason> {
        let item_id = self.item_at(from)?;
        let incoming = self.live_item(&item_id)?.clone();

        let occupancy = {
            let dest = self.container_ref(&to.container)?;
            dest.resolve_slot(&to.slot)
                .map(|occupant| (dest.occupied_slot_behavior(&to.slot, &incoming), occupant))
        };

        match occupancy {
            None => {
                self.detach(ctx, &from.container, &from.slot)?;
                self.attach(ctx, &to.container, &to.slot, &item_id)
            }
            Some((OccupiedSlotBehavior::SameItem, _)) => {
                // Same identity at the destination: reposition only.
                self.detach(ctx, &from.container, &from.slot)?;
                self.attach(ctx, &to.container, &to.slot, &item_id)
            }
            Some((OccupiedSlotBehavior::Reject, _)) => {
                Err(RejectReason::SlotOccupied { slot: to.clone() })
            }
            Some((OccupiedSlotBehavior::Swap, occupant_id)) => {
                self.detach(ctx, &from.container, &from.slot)?;
                self.detach(ctx, &to.container, &to.slot)?;
                self.attach(ctx, &to.container, &to.slot, &item_id)?;
                self.attach(ctx, &from.container, &from.slot, &occupant_id)
            }
            Some((OccupiedSlotBehavior::StackCombine, occupant_id)) => {
                let occupant_count = self.live_item(&occupant_id)?.count();
                self.detach(ctx, &from.container, &from.slot)?;
                self.park_identity(ctx, &item_id)?;
                self.write_tag_delta(
                    ctx,
                    &occupant_id,
                    TAG_COUNT,
                    occupant_count.saturating_add(incoming.count()),
                )
            }
            Some((OccupiedSlotBehavior::FragmentCombine, occupant_id)) => {
                let occupant_count = self.live_item(&occupant_id)?.count();
                let max_stack = self.definition_of(&incoming)?.max_stack;
                let room = (max_stack - occupant_count).max(0);
                let moved = incoming.count().min(room);
                if moved >= incoming.count() {
                    // Everything fits: the source identity is absorbed.
                    self.detach(ctx, &from.container, &from.slot)?;
                    self.park_identity(ctx, &item_id)?;
                    self.write_tag_delta(
                        ctx,
                        &occupant_id,
                        TAG_COUNT,
                        occupant_count.saturating_add(moved),
                    )
                } else {
                    self.write_tag_delta(ctx, &item_id, TAG_COUNT, incoming.count() - moved)?;
                    self.write_tag_delta(
                        ctx,
                        &occupant_id,
                        TAG_COUNT,
                        occupant_count.saturating_add(moved),
                    )
                }
            }
        }
    }

    fn apply_modify_tag(
        &mut self,
        ctx: &mut ExecutionContext,
        item_id: &ItemId,
        tag: &str,
        delta: i64,
        clamp: bool,
    ) -> Result<(), RejectReason> {
        let (current, bounds) = {
            let item = self.live_item(item_id)?;
            let definition = self.definition_of(item)?;
            let bounds = self.tag_bounds_for(definition, item, tag)?;
            (item.tags.get(tag), bounds)
        };
        let mut value = current.saturating_add(delta);
        if clamp {
            value = bounds.clamp(value);
        }
        self.write_tag_delta(ctx, item_id, tag, value)
    }

    fn apply_split(
        &mut self,
        ctx: &mut ExecutionContext,
        index: usize,
        from: &SlotRef,
        to: &SlotRef,
        amount: i64,
        new_item: Option<&str>,
    ) -> Result<(), RejectReason> {
        let item_id = self.item_at(from)?;
        let source = self.live_item(&item_id)?.clone();
        let occupant = self.container_ref(&to.container)?.resolve_slot(&to.slot);

        self.write_tag_delta(ctx, &item_id, TAG_COUNT, source.count() - amount)?;
        match occupant {
            None => {
                let new_id = new_item
                    .map(str::to_string)
                    .unwrap_or_else(|| mint_item_id(&ctx.key, index));
                // The split-off stack inherits the source's counters
                // (durability, charges, …) under its own identity.
                let mut stack = source.clone();
                stack.id = new_id.clone();
                stack.tags.set(TAG_COUNT, amount);
                stack.child_container = None;
                self.instantiate(ctx, stack)?;
                self.attach(ctx, &to.container, &to.slot, &new_id)
            }
            Some(occupant_id) => {
                let occupant_count = self.live_item(&occupant_id)?.count();
                self.write_tag_delta(
                    ctx,
                    &occupant_id,
                    TAG_COUNT,
                    occupant_count.saturating_add(amount),
                )
            }
        }
    }

    fn apply_remove(
        &mut self,
        ctx: &mut ExecutionContext,
        index: usize,
        from: &SlotRef,
        disposition: RemoveDisposition,
        quantity: Option<i64>,
        material_params: &BTreeMap<String, i64>,
    ) -> Result<(), RejectReason> {
        let item_id = self.item_at(from)?;
        let item = self.live_item(&item_id)?.clone();
        let count = item.count();
        let qty = quantity.unwrap_or(count).min(count);
        let full = qty >= count;

        match disposition {
            RemoveDisposition::Destroy => {
                if full {
                    self.detach(ctx, &from.container, &from.slot)?;
                    self.park_identity(ctx, &item_id)
                } else {
                    self.write_tag_delta(ctx, &item_id, TAG_COUNT, count - qty)
                }
            }
            RemoveDisposition::DropToWorld => {
                if full {
                    self.detach(ctx, &from.container, &from.slot)?;
                    self.park_identity(ctx, &item_id)?;
                } else {
                    self.write_tag_delta(ctx, &item_id, TAG_COUNT, count - qty)?;
                }
                // Dispatched only on authoritative finalization; the outcome
                // never affects atomicity.
                ctx.spawn_requests.push(SpawnRequest {
                    definition: item.definition.clone(),
                    quantity: qty,
                    tags: item.tags.clone(),
                    params: material_params.clone(),
                    origin: from.clone(),
                });
                Ok(())
            }
            RemoveDisposition::TransferToHolding => {
                let Some(holding_id) = self.config.holding_container.clone() else {
                    return Err(RejectReason::HoldingUnavailable);
                };
                let Some(slot) = self.container_ref(&holding_id)?.first_free_slot() else {
                    return Err(RejectReason::HoldingUnavailable);
                };
                if full {
                    self.detach(ctx, &from.container, &from.slot)?;
                    self.attach(ctx, &holding_id, &slot, &item_id)
                } else {
                    self.write_tag_delta(ctx, &item_id, TAG_COUNT, count - qty)?;
                    // Twin-stable identity: both sides derive the same id
                    // from the prediction key and operation index.
                    let twin_id = mint_item_id(&ctx.key, index);
                    let mut twin = item.clone();
                    twin.id = twin_id.clone();
                    twin.tags.set(TAG_COUNT, qty);
                    twin.child_container = None;
                    self.instantiate(ctx, twin)?;
                    self.attach(ctx, &holding_id, &slot, &twin_id)
                }
            }
        }
    }

    fn apply_add(
        &mut self,
        ctx: &mut ExecutionContext,
        index: usize,
        to: &SlotRef,
        source: &AddItemSource,
        merge_first: bool,
    ) -> Result<(), RejectReason> {
        match source {
            AddItemSource::CreateNew {
                definition,
                count,
                initial_tags,
                new_item,
            } => {
                let Some(def) = self.catalog.get(definition).cloned() else {
                    return Err(RejectReason::DefinitionNotFound {
                        definition: definition.clone(),
                    });
                };
                let candidate = new_item
                    .clone()
                    .unwrap_or_else(|| mint_item_id(&ctx.key, index));
                let remaining = if merge_first && def.stackable() {
                    self.fill_compatible_stacks(ctx, to, &def.id, def.max_stack, &candidate, *count)?
                } else {
                    *count
                };
                if remaining == 0 {
                    return Ok(());
                }
                let mut instance = ItemInstance::from_definition(candidate.clone(), &def, remaining);
                instance.tags.merge(initial_tags);
                instance.tags.set(TAG_COUNT.to_string(), remaining);
                if !def.stackable() && !def.default_tags.has(TAG_COUNT) && !initial_tags.has(TAG_COUNT)
                {
                    instance.tags.remove(TAG_COUNT);
                }
                self.instantiate(ctx, instance)?;
                self.attach(ctx, &to.container, &to.slot, &candidate)
            }
            AddItemSource::Existing { item } => {
                let instance = self.live_item(item)?.clone();
                let def = self.definition_of(&instance)?.clone();
                let count = instance.count();
                let remaining = if merge_first && def.stackable() {
                    self.fill_compatible_stacks(ctx, to, &def.id, def.max_stack, item, count)?
                } else {
                    count
                };
                if remaining == 0 {
                    // Fully absorbed into existing stacks; the identity is
                    // consumed the same way a stack-combine consumes one.
                    self.park_identity(ctx, item)
                } else {
                    if remaining != count {
                        self.write_tag_delta(ctx, item, TAG_COUNT, remaining)?;
                    }
                    self.attach(ctx, &to.container, &to.slot, item)
                }
            }
        }
    }

    /// Pour `count` units into the destination's compatible stacks, returning
    /// what is left for the target slot.
    fn fill_compatible_stacks(
        &mut self,
        ctx: &mut ExecutionContext,
        to: &SlotRef,
        definition: &str,
        max_stack: i64,
        skip_item: &str,
        count: i64,
    ) -> Result<i64, RejectReason> {
        let targets: Vec<(ItemId, i64)> = {
            let dest = self.container_ref(&to.container)?;
            dest.occupied_slots()
                .into_iter()
                .filter(|(_, occupant_id)| occupant_id != skip_item)
                .filter_map(|(_, occupant_id)| {
                    self.items
                        .get_live(&occupant_id)
                        .map(|occupant| (occupant_id, occupant))
                })
                .filter(|(_, occupant)| {
                    occupant.definition == definition && occupant.count() < max_stack
                })
                .map(|(occupant_id, occupant)| (occupant_id, occupant.count()))
                .collect()
        };
        let mut remaining = count;
        for (occupant_id, occupant_count) in targets {
            if remaining == 0 {
                break;
            }
            let room = (max_stack - occupant_count).max(0);
            let moved = remaining.min(room);
            if moved <= 0 {
                continue;
            }
            self.write_tag_delta(
                ctx,
                &occupant_id,
                TAG_COUNT,
                occupant_count.saturating_add(moved),
            )?;
            remaining -= moved;
        }
        Ok(remaining)
    }
}
