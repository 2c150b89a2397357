//! Configuration engine for modular chassis systems.
//!
//! This crate owns the full configurator model: the slot/topology state, the
//! declarative rule validator, the power/interface/width resource accountant,
//! the tiered pricing calculator and the BOM assembler with article matching.
//! It performs no I/O of its own – catalogs, rule sets, article lists and
//! configuration documents are handed in as already-decoded data, and every
//! derived result (violations, budgets, quotes) is a plain `serde`-friendly
//! value the caller can ship wherever it wants.
//!
//! The central structure is [`topology::Configuration`], the single mutable
//! aggregate of a session.  All mutation funnels through its entry points
//! (`assign`, `set_slot_count`, `set_system_side`, `set_chassis`, `set_psu`),
//! each of which builds a candidate state, validates it and only then
//! commits – no observer ever sees a half-applied transition.  Everything
//! else ([`resources`], [`pricing`], [`bom`]) is a pure derivation over the
//! committed state and the read-only catalog.

pub mod bom;
#[cfg(feature = "table")]
mod bom_table;
pub mod catalog;
pub mod pricing;
pub mod resources;
pub mod rules;
pub mod topology;

/// Helper type alias – product part numbers are plain strings.
pub type ProductId = String;

/// Helper type alias – option identifiers within a product.
pub type OptionId = String;

/// Physical pitch of one backplane slot in HP (horizontal pitch units).
pub const SLOT_PITCH_HP: u32 = 4;

/// Widest rack a configuration may occupy, in HP (one full 19" row).
pub const MAX_SYSTEM_WIDTH_HP: u32 = 84;

/// Backplane connector every slot carries regardless of occupant.
pub const BASELINE_CONNECTOR: &str = "P1";

/// Catalog id of the blind filler panel used for empty peripheral slots.
pub const FILLER_PRODUCT_ID: &str = "FILLER_4HP";

pub use bom::{BomLine, ExternalPort, LineCategory, Quote};
pub use catalog::{
    Article, Catalog, Choice, ExternalInterface, OptionValue, OptionsError, PriceMod, Product,
    ProductKind, ProductOption,
};
pub use rules::{Action, Condition, Rule};
pub use topology::{AssignError, Configuration, Slot, SlotKind, SystemSide};

/// Number of slots a component of the given width covers.
///
/// Zero-width products (open-frame parts that never sit on the backplane)
/// still count as a single slot when they do end up in one.
pub(crate) fn slot_span(width_hp: u32) -> u32 {
    width_hp.max(1).div_ceil(SLOT_PITCH_HP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_rounds_up_to_whole_slots() {
        assert_eq!(slot_span(0), 1);
        assert_eq!(slot_span(4), 1);
        assert_eq!(slot_span(5), 2);
        assert_eq!(slot_span(8), 2);
        assert_eq!(slot_span(12), 3);
    }
}
