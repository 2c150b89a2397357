//! Slot topology and the mutable configuration aggregate.
//!
//! [`Configuration`] is the single unit of state a session mutates, exports,
//! imports and prices.  Every mutation entry point builds a candidate state,
//! validates it against the rule set and only then commits, so no caller can
//! observe a half-applied transition and no invariant can be broken by
//! construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, OptionValue, OptionsError, ProductKind};
use crate::rules::{self, Rule};
use crate::{OptionId, ProductId, SLOT_PITCH_HP, slot_span};

/// Default rack layout: 21 slots of 4 HP each (84 HP total).
pub const DEFAULT_SLOT_COUNT: u32 = 21;

/// Which end of the rack carries the system (CPU) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    System,
    Peripheral,
    /// Reserved for a pluggable power supply; never offered for general
    /// component selection.
    #[serde(rename = "psu")]
    PowerSupply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: u32,
    pub kind: SlotKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ProductId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selected_options: BTreeMap<OptionId, OptionValue>,
    #[serde(default = "default_slot_width")]
    pub width_hp: u32,
    /// Id of the lower-indexed slot whose occupant physically covers this
    /// one.  A covered slot holds no component of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<u32>,
}

fn default_slot_width() -> u32 {
    SLOT_PITCH_HP
}

impl Slot {
    fn empty(id: u32, kind: SlotKind) -> Self {
        Slot {
            id,
            kind,
            component: None,
            selected_options: BTreeMap::new(),
            width_hp: SLOT_PITCH_HP,
            blocked_by: None,
        }
    }

    fn clear_contents(&mut self) {
        self.component = None;
        self.selected_options.clear();
        self.width_hp = SLOT_PITCH_HP;
    }

    /// Free for a new occupant: neither occupied nor covered.
    pub fn is_free(&self) -> bool {
        self.component.is_none() && self.blocked_by.is_none()
    }
}

/// Why a mutation was refused.  Rule violations carry the human-readable
/// messages the validator produced; everything else is a structural refusal.
#[derive(Debug, thiserror::Error)]
pub enum AssignError {
    #[error("slot {0} does not exist")]
    UnknownSlot(u32),
    #[error("slot {slot} is covered by the component in slot {by}")]
    SlotBlocked { slot: u32, by: u32 },
    #[error("slot {0} is reserved for the power supply")]
    ReservedSlot(u32),
    #[error("slot {0} holds no component")]
    EmptySlot(u32),
    #[error("unknown product id '{0}'")]
    UnknownProduct(ProductId),
    #[error("product {product} cannot occupy slot {slot}")]
    KindMismatch { product: ProductId, slot: u32 },
    #[error("'{0}' is not a chassis")]
    NotChassis(ProductId),
    #[error("'{0}' is not a power supply")]
    NotPsu(ProductId),
    #[error("not enough free slots after slot {slot} for a {width_hp} HP component")]
    InsufficientSpace { slot: u32, width_hp: u32 },
    #[error("power supply '{0}' does not fit without displacing fitted components")]
    PsuDoesNotFit(ProductId),
    #[error(transparent)]
    InvalidOptions(#[from] OptionsError),
    #[error("rejected by {} rule violation(s)", .0.len())]
    Rejected(Vec<String>),
}

/// The configuration aggregate: slot array, chassis and PSU selection.
///
/// Serializes directly to the interchange document used for export/import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub slot_count: u32,
    pub system_side: SystemSide,
    pub slots: Vec<Slot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chassis: Option<ProductId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub chassis_options: BTreeMap<OptionId, OptionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psu: Option<ProductId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub psu_options: BTreeMap<OptionId, OptionValue>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::new(DEFAULT_SLOT_COUNT, SystemSide::Left)
    }
}

fn kind_for(id: u32, count: u32, side: SystemSide) -> SlotKind {
    let system = match side {
        SystemSide::Left => id == 1,
        SystemSide::Right => id == count,
    };
    if system { SlotKind::System } else { SlotKind::Peripheral }
}

impl Configuration {
    pub fn new(slot_count: u32, system_side: SystemSide) -> Self {
        Configuration {
            slot_count,
            system_side,
            slots: (1..=slot_count)
                .map(|id| Slot::empty(id, kind_for(id, slot_count, system_side)))
                .collect(),
            chassis: None,
            chassis_options: BTreeMap::new(),
            psu: None,
            psu_options: BTreeMap::new(),
        }
    }

    /// Restore the default empty layout.
    pub fn reset(&mut self) {
        *self = Configuration::default();
    }

    pub fn slot(&self, id: u32) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    /// The single system slot of the layout.
    pub fn system_slot(&self) -> Option<&Slot> {
        self.slots.iter().find(|s| s.kind == SlotKind::System)
    }

    /// Whether the selected PSU occupies dedicated power-supply slots.
    pub fn psu_in_slots(&self) -> bool {
        match &self.psu {
            Some(psu) => self
                .slots
                .iter()
                .any(|s| s.kind == SlotKind::PowerSupply && s.component.as_ref() == Some(psu)),
            None => false,
        }
    }

    /// Change the number of slots, regenerating the layout.  Occupants are
    /// preserved where their positional index survives with an unchanged
    /// slot kind; everything else is cleared.  A pluggable PSU is lifted out
    /// first and re-seated afterwards; it is dropped when it no longer fits.
    pub fn set_slot_count(&mut self, count: u32, catalog: &Catalog) {
        let psu = self.take_pluggable_psu();
        let side = self.system_side;
        let old = std::mem::take(&mut self.slots);
        self.slots = (1..=count)
            .map(|id| {
                let kind = kind_for(id, count, side);
                match old.get(id as usize - 1) {
                    Some(prev) if prev.kind == kind => {
                        let mut slot = prev.clone();
                        slot.id = id;
                        slot.blocked_by = None;
                        slot
                    }
                    _ => Slot::empty(id, kind),
                }
            })
            .collect();
        self.slot_count = count;
        self.rederive_blocking();
        self.reseat_pluggable_psu(psu, catalog);
    }

    /// Move the system slot to the other end.  Any slot whose kind changes
    /// has its component and options cleared so a peripheral never survives
    /// in a system slot or vice versa.
    pub fn set_system_side(&mut self, side: SystemSide, catalog: &Catalog) {
        let psu = self.take_pluggable_psu();
        let count = self.slot_count;
        self.system_side = side;
        for slot in &mut self.slots {
            let kind = kind_for(slot.id, count, side);
            if slot.kind != kind {
                slot.clear_contents();
                slot.kind = kind;
            }
        }
        self.rederive_blocking();
        self.reseat_pluggable_psu(psu, catalog);
    }

    /// Occupy or clear a slot.  This is the sole entry point for slot
    /// mutation: a candidate state is built, rule-validated and only then
    /// committed.  On success the slot's options reset to the supplied map
    /// (empty when none is given).
    pub fn assign(
        &mut self,
        slot_id: u32,
        component: Option<ProductId>,
        options: Option<BTreeMap<OptionId, OptionValue>>,
        catalog: &Catalog,
        rules: &[Rule],
    ) -> Result<(), AssignError> {
        let slot = self.slot(slot_id).ok_or(AssignError::UnknownSlot(slot_id))?;
        if let Some(by) = slot.blocked_by {
            return Err(AssignError::SlotBlocked { slot: slot_id, by });
        }
        if slot.kind == SlotKind::PowerSupply {
            return Err(AssignError::ReservedSlot(slot_id));
        }

        let Some(product_id) = component else {
            // Clearing cannot trigger a forbid action, so no candidate pass.
            self.clear_slot(slot_id);
            return Ok(());
        };

        let product = catalog
            .get(&product_id)
            .ok_or_else(|| AssignError::UnknownProduct(product_id.clone()))?;
        let fits = match slot.kind {
            SlotKind::System => product.kind.is_cpu(),
            SlotKind::Peripheral => {
                !product.kind.is_cpu() && !product.kind.is_infrastructure()
            }
            SlotKind::PowerSupply => false,
        };
        if !fits {
            return Err(AssignError::KindMismatch {
                product: product_id,
                slot: slot_id,
            });
        }

        let options = options.unwrap_or_default();
        product.check_options(&options)?;
        let width_hp = product.effective_width_hp(&options);

        let mut next = self.clone();
        next.place(slot_id, product_id, options, width_hp)?;
        let violations = rules::validate(rules, &next, catalog);
        if !violations.is_empty() {
            return Err(AssignError::Rejected(violations));
        }
        *self = next;
        Ok(())
    }

    /// Re-configure the options of an occupied slot.  Width is re-derived
    /// and blocking adjusted; the change is refused when the grown component
    /// would collide with a neighbour.
    pub fn set_options(
        &mut self,
        slot_id: u32,
        options: BTreeMap<OptionId, OptionValue>,
        catalog: &Catalog,
    ) -> Result<(), AssignError> {
        let slot = self.slot(slot_id).ok_or(AssignError::UnknownSlot(slot_id))?;
        let product_id = slot
            .component
            .clone()
            .ok_or(AssignError::EmptySlot(slot_id))?;
        let product = catalog
            .get(&product_id)
            .ok_or_else(|| AssignError::UnknownProduct(product_id.clone()))?;
        product.check_options(&options)?;
        let width_hp = product.effective_width_hp(&options);

        let mut next = self.clone();
        next.place(slot_id, product_id, options, width_hp)?;
        *self = next;
        Ok(())
    }

    /// Select or clear the chassis.  Selection is rule-validated first.
    pub fn set_chassis(
        &mut self,
        chassis: Option<ProductId>,
        options: BTreeMap<OptionId, OptionValue>,
        catalog: &Catalog,
        rules: &[Rule],
    ) -> Result<(), AssignError> {
        let Some(chassis_id) = chassis else {
            self.chassis = None;
            self.chassis_options.clear();
            return Ok(());
        };
        let product = catalog
            .get(&chassis_id)
            .ok_or_else(|| AssignError::UnknownProduct(chassis_id.clone()))?;
        if product.kind != ProductKind::Chassis {
            return Err(AssignError::NotChassis(chassis_id));
        }
        product.check_options(&options)?;

        let mut next = self.clone();
        next.chassis = Some(chassis_id);
        next.chassis_options = options;
        let violations = rules::validate(rules, &next, catalog);
        if !violations.is_empty() {
            return Err(AssignError::Rejected(violations));
        }
        *self = next;
        Ok(())
    }

    /// Select or clear the power supply.  A pluggable PSU (non-zero rack
    /// width) seats into dedicated power-supply slots at the left edge and
    /// shifts the existing content right; clearing shifts it back.  The
    /// change is atomic: when shifting would push a fitted component (or the
    /// system slot) off the end, the previous selection stays in place.
    pub fn set_psu(
        &mut self,
        psu: Option<ProductId>,
        options: BTreeMap<OptionId, OptionValue>,
        catalog: &Catalog,
        rules: &[Rule],
    ) -> Result<(), AssignError> {
        let mut next = self.clone();
        next.remove_psu_slots();
        next.psu = None;
        next.psu_options.clear();

        if let Some(psu_id) = psu {
            let product = catalog
                .get(&psu_id)
                .ok_or_else(|| AssignError::UnknownProduct(psu_id.clone()))?;
            if product.kind != ProductKind::Psu {
                return Err(AssignError::NotPsu(psu_id));
            }
            product.check_options(&options)?;
            // Validate before seating the PSU into its slots, so a forbidden
            // PSU yields one violation for the selection itself.
            next.psu = Some(psu_id.clone());
            next.psu_options = options.clone();
            let violations = rules::validate(rules, &next, catalog);
            if !violations.is_empty() {
                return Err(AssignError::Rejected(violations));
            }
            if product.width_hp > 0 {
                next.insert_psu_slots(&psu_id, &options, product.width_hp)?;
            }
        }
        *self = next;
        Ok(())
    }

    /// Rebuild an equivalent state from an exported document.  Blocking data
    /// is taken as-is when present and re-derived only when the document
    /// carries none.
    pub fn from_document(mut doc: Configuration) -> Configuration {
        doc.slots.sort_by_key(|s| s.id);
        doc.slot_count = doc.slots.len() as u32;
        let contiguous = doc
            .slots
            .iter()
            .enumerate()
            .all(|(i, s)| s.id == i as u32 + 1);
        if !contiguous {
            for (i, slot) in doc.slots.iter_mut().enumerate() {
                slot.id = i as u32 + 1;
                slot.blocked_by = None;
            }
        }
        let has_blocking = doc.slots.iter().any(|s| s.blocked_by.is_some());
        let needs_blocking = doc
            .slots
            .iter()
            .any(|s| s.component.is_some() && slot_span(s.width_hp) > 1);
        if !has_blocking && needs_blocking {
            doc.rederive_blocking();
        }
        doc
    }

    // -- internals ---------------------------------------------------------

    fn clear_slot(&mut self, slot_id: u32) {
        for slot in &mut self.slots {
            if slot.id == slot_id {
                slot.clear_contents();
                slot.blocked_by = None;
            } else if slot.blocked_by == Some(slot_id) {
                slot.blocked_by = None;
            }
        }
    }

    /// Write an occupant into a slot, covering the following slots its width
    /// requires and releasing any it no longer needs.
    fn place(
        &mut self,
        slot_id: u32,
        product_id: ProductId,
        options: BTreeMap<OptionId, OptionValue>,
        width_hp: u32,
    ) -> Result<(), AssignError> {
        let span = slot_span(width_hp);
        for offset in 1..span {
            let target = self
                .slot(slot_id + offset)
                .ok_or(AssignError::InsufficientSpace { slot: slot_id, width_hp })?;
            let reusable = target.blocked_by.is_none() || target.blocked_by == Some(slot_id);
            if target.kind != SlotKind::Peripheral || target.component.is_some() || !reusable {
                return Err(AssignError::InsufficientSpace { slot: slot_id, width_hp });
            }
        }

        for slot in &mut self.slots {
            if slot.id == slot_id {
                slot.component = Some(product_id.clone());
                slot.selected_options = options.clone();
                slot.width_hp = width_hp;
                slot.blocked_by = None;
            } else if slot.id > slot_id && slot.id < slot_id + span {
                slot.clear_contents();
                slot.blocked_by = Some(slot_id);
            } else if slot.blocked_by == Some(slot_id) {
                slot.blocked_by = None;
            }
        }
        Ok(())
    }

    /// Recompute every `blocked_by` from stored occupant widths.  Occupants
    /// whose span no longer fits (after a resize or an import of a foreign
    /// document) are dropped rather than left overlapping.
    fn rederive_blocking(&mut self) {
        for slot in &mut self.slots {
            slot.blocked_by = None;
        }
        for idx in 0..self.slots.len() {
            let (id, kind, span, occupied) = {
                let s = &self.slots[idx];
                (s.id, s.kind, slot_span(s.width_hp), s.component.is_some())
            };
            if !occupied || span <= 1 || self.slots[idx].blocked_by.is_some() {
                continue;
            }
            let cover_kind = match kind {
                SlotKind::PowerSupply => SlotKind::PowerSupply,
                _ => SlotKind::Peripheral,
            };
            let fits = (1..span).all(|offset| {
                self.slots
                    .get(idx + offset as usize)
                    .is_some_and(|t| t.kind == cover_kind && t.is_free())
            });
            if fits {
                for offset in 1..span {
                    self.slots[idx + offset as usize].blocked_by = Some(id);
                }
            } else {
                self.slots[idx].clear_contents();
            }
        }
    }

    /// Lift a slot-seated PSU out before a layout change.  Returns the
    /// selection so it can be re-seated afterwards.
    fn take_pluggable_psu(&mut self) -> Option<(ProductId, BTreeMap<OptionId, OptionValue>)> {
        if !self.psu_in_slots() {
            return None;
        }
        self.remove_psu_slots();
        let psu = self.psu.take()?;
        let options = std::mem::take(&mut self.psu_options);
        Some((psu, options))
    }

    fn reseat_pluggable_psu(
        &mut self,
        psu: Option<(ProductId, BTreeMap<OptionId, OptionValue>)>,
        catalog: &Catalog,
    ) {
        let Some((psu_id, options)) = psu else { return };
        let width_hp = catalog.get(&psu_id).map(|p| p.width_hp).unwrap_or(0);
        if width_hp > 0 {
            if let Err(err) = self.insert_psu_slots(&psu_id, &options, width_hp) {
                log::warn!("dropping power supply {psu_id} after layout change: {err}");
                return;
            }
        }
        self.psu = Some(psu_id);
        self.psu_options = options;
    }

    /// Remove dedicated power-supply slots and shift the content back to the
    /// left edge, filling the freed tail with empty peripheral slots.
    fn remove_psu_slots(&mut self) {
        let shift = self
            .slots
            .iter()
            .take_while(|s| s.kind == SlotKind::PowerSupply)
            .count() as u32;
        if shift == 0 {
            return;
        }
        let count = self.slot_count;
        let side = self.system_side;
        let mut slots: Vec<Slot> = self.slots.split_off(shift as usize);
        slots.extend((0..shift).map(|_| Slot::empty(0, SlotKind::Peripheral)));
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.id = i as u32 + 1;
            slot.blocked_by = slot.blocked_by.map(|b| b - shift);
            let kind = kind_for(slot.id, count, side);
            if slot.kind != kind {
                slot.clear_contents();
                slot.blocked_by = None;
                slot.kind = kind;
            }
        }
        self.slots = slots;
    }

    /// Seat a pluggable PSU into dedicated slots at the left edge, shifting
    /// the existing content right.  Fails when the displaced tail holds a
    /// fitted component or the system slot.
    fn insert_psu_slots(
        &mut self,
        psu_id: &str,
        options: &BTreeMap<OptionId, OptionValue>,
        width_hp: u32,
    ) -> Result<(), AssignError> {
        let span = slot_span(width_hp);
        let count = self.slots.len() as u32;
        if span >= count {
            return Err(AssignError::PsuDoesNotFit(psu_id.to_string()));
        }
        let tail = &self.slots[(count - span) as usize..];
        if tail.iter().any(|s| !s.is_free() || s.kind == SlotKind::System) {
            return Err(AssignError::PsuDoesNotFit(psu_id.to_string()));
        }

        self.slots.truncate((count - span) as usize);
        for slot in &mut self.slots {
            slot.id += span;
            slot.blocked_by = slot.blocked_by.map(|b| b + span);
        }
        for offset in (1..=span).rev() {
            let mut slot = Slot::empty(offset, SlotKind::PowerSupply);
            if offset == 1 {
                slot.component = Some(psu_id.to_string());
                slot.selected_options = options.clone();
                slot.width_hp = width_hp;
            } else {
                slot.blocked_by = Some(1);
            }
            self.slots.insert(0, slot);
        }
        Ok(())
    }
}
