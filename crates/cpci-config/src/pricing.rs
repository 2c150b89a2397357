//! Tiered unit pricing.
//!
//! Tier selection is threshold-descending with a per-tier fallback to the
//! quantity-1 price.  The exact ladder and fallback are a pricing contract
//! with the catalog owners, not an implementation detail – change nothing
//! here without a commercial sign-off.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::OptionId;
use crate::catalog::{OptionValue, PriceMod, Product, ProductOption};

/// Quantity breakpoints at which unit pricing may step down.
pub const TIER_BREAKS: [u32; 6] = [1, 25, 50, 100, 250, 500];

/// Base unit price of a product at the given quantity.
pub fn tier_price(product: &Product, qty: u32) -> Decimal {
    let pick = |tier: Option<Decimal>| tier.unwrap_or(product.price_1);
    if qty >= 500 {
        pick(product.price_500)
    } else if qty >= 250 {
        pick(product.price_250)
    } else if qty >= 100 {
        pick(product.price_100)
    } else if qty >= 50 {
        pick(product.price_50)
    } else if qty >= 25 {
        pick(product.price_25)
    } else {
        product.price_1
    }
}

/// Contribution of an option price modifier at the given quantity.  A flat
/// modifier applies at every quantity; a tier map follows the product
/// ladder, falling back to its quantity-1 entry and then to zero.
pub fn price_mod_at(modifier: &PriceMod, qty: u32) -> Decimal {
    match modifier {
        PriceMod::Flat(amount) => *amount,
        PriceMod::Tiered(tiers) => {
            let bracket = TIER_BREAKS
                .iter()
                .rev()
                .find(|b| qty >= **b)
                .copied()
                .unwrap_or(1);
            tiers
                .get(&bracket)
                .or_else(|| tiers.get(&1))
                .copied()
                .unwrap_or(Decimal::ZERO)
        }
    }
}

/// Unit price of a configured item: base tier price plus every active
/// option modifier (the matching choice of a select, a set boolean's own
/// modifier).
pub fn unit_price(
    product: &Product,
    selected: &BTreeMap<OptionId, OptionValue>,
    qty: u32,
) -> Decimal {
    let mut price = tier_price(product, qty);
    for (id, value) in selected {
        let Some(option) = product.option(id) else {
            continue;
        };
        match (option, value) {
            (ProductOption::Select { .. }, OptionValue::Text(choice_value)) => {
                let modifier = option
                    .find_choice(choice_value)
                    .and_then(|c| c.price_mod.as_ref());
                if let Some(modifier) = modifier {
                    price += price_mod_at(modifier, qty);
                }
            }
            (ProductOption::Boolean { price_mod: Some(modifier), .. }, OptionValue::Flag(true)) => {
                price += price_mod_at(modifier, qty);
            }
            _ => {}
        }
    }
    price
}

/// The two independent quantity tracks of a quote: low-volume prototype
/// pricing and series production pricing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityTracks {
    pub prototype: u32,
    pub series: u32,
}

impl QuantityTracks {
    pub fn new(prototype: u32, series: u32) -> Self {
        QuantityTracks { prototype, series }
    }

    /// Prototype billing quantity: a blank prototype quantity still prices
    /// a single unit.
    pub fn prototype_billed(&self) -> u32 {
        self.prototype.max(1)
    }
}
