//! Canonical BOM assembly and article matching.
//!
//! The bill of materials is rebuilt from scratch on every request – it is a
//! pure derivation over the committed configuration, the catalog and the
//! registered article list, never persisted state.  Line order is canonical:
//! slots ascending (covered slots skipped, empty peripheral slots closed
//! with a filler panel when the catalog has one), then the chassis, then a
//! single synthesized backplane line, then the PSU unless it already sits in
//! dedicated power-supply slots.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::{Article, Catalog, OptionValue, Product, ProductOption};
use crate::pricing::{self, QuantityTracks};
use crate::resources::{self, PowerSummary};
use crate::topology::{Configuration, SlotKind};
use crate::{BASELINE_CONNECTOR, OptionId, ProductId};

/// Pseudo part number of the synthesized backplane line.
const BACKPLANE_PART: &str = "BACKPLANE_CFG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCategory {
    Slot,
    Filler,
    Chassis,
    Backplane,
    Psu,
}

/// One line of the bill of materials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    /// Slot number or section name shown on the quote.
    pub label: String,
    /// Resolved article number, or the raw product id when no registered
    /// article matches the configured item.
    pub part_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    pub name: String,
    pub category: LineCategory,
    /// Canonical position of the line within the BOM.
    pub sort_key: u32,
    pub matched_article: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<OptionId, OptionValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connectors: Vec<String>,
    /// Per-slot connector requirements; populated on the backplane line only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slot_connectors: BTreeMap<u32, Vec<String>>,
    pub width_hp: u32,
    pub unit_price_prototype: Decimal,
    pub unit_price_series: Decimal,
}

/// Aggregated externally exposed ports of the whole configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPort {
    #[serde(rename = "type")]
    pub kind: String,
    pub connector: String,
    pub count: i32,
}

/// The quote payload: ordered BOM lines, both price tracks and the derived
/// budget summaries.  Rendering and transport are the caller's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<BomLine>,
    pub quantities: QuantityTracks,
    pub prototype_total: Decimal,
    pub series_total: Decimal,
    pub grand_total: Decimal,
    pub power: PowerSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_interfaces: Vec<ExternalPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eol_horizon: Option<NaiveDate>,
}

impl Quote {
    /// Assemble the canonical, priced line-item list for a configuration.
    pub fn build(
        config: &Configuration,
        catalog: &Catalog,
        articles: &[Article],
        quantities: QuantityTracks,
    ) -> Quote {
        let mut lines = Vec::new();
        let mut sort_key = 0u32;
        let mut push = |lines: &mut Vec<BomLine>, mut line: BomLine| {
            line.sort_key = sort_key;
            sort_key += 1;
            lines.push(line);
        };

        let mut slots: Vec<_> = config.slots.iter().collect();
        slots.sort_by_key(|s| s.id);

        for slot in &slots {
            if slot.blocked_by.is_some() {
                continue;
            }
            match &slot.component {
                Some(component) => {
                    if let Some(product) = catalog.get(component) {
                        push(
                            &mut lines,
                            product_line(
                                slot.id.to_string(),
                                LineCategory::Slot,
                                product,
                                &slot.selected_options,
                                articles,
                                quantities,
                            ),
                        );
                    } else {
                        log::warn!("slot {} references unknown product {component}", slot.id);
                    }
                }
                None => {
                    if slot.kind == SlotKind::Peripheral {
                        if let Some(filler) = catalog.filler() {
                            push(
                                &mut lines,
                                product_line(
                                    slot.id.to_string(),
                                    LineCategory::Filler,
                                    filler,
                                    &BTreeMap::new(),
                                    articles,
                                    quantities,
                                ),
                            );
                        }
                    }
                }
            }
        }

        if let Some(product) = config.chassis.as_ref().and_then(|id| catalog.get(id)) {
            push(
                &mut lines,
                product_line(
                    "Chassis".to_string(),
                    LineCategory::Chassis,
                    product,
                    &config.chassis_options,
                    articles,
                    quantities,
                ),
            );
        }

        push(&mut lines, backplane_line(&slots, catalog));

        if !config.psu_in_slots() {
            if let Some(product) = config.psu.as_ref().and_then(|id| catalog.get(id)) {
                push(
                    &mut lines,
                    product_line(
                        "PSU".to_string(),
                        LineCategory::Psu,
                        product,
                        &config.psu_options,
                        articles,
                        quantities,
                    ),
                );
            }
        }

        let unit_sum_prototype: Decimal = lines.iter().map(|l| l.unit_price_prototype).sum();
        let unit_sum_series: Decimal = lines.iter().map(|l| l.unit_price_series).sum();
        let prototype_total =
            unit_sum_prototype * Decimal::from(quantities.prototype_billed());
        let series_total = unit_sum_series * Decimal::from(quantities.series);

        Quote {
            external_interfaces: external_ports(&lines, catalog),
            advisories: resources::advisories(config, catalog),
            power: resources::power_summary(config, catalog),
            eol_horizon: resources::eol_horizon(config, catalog),
            lines,
            quantities,
            prototype_total,
            series_total,
            grand_total: prototype_total + series_total,
        }
    }
}

fn product_line(
    label: String,
    category: LineCategory,
    product: &Product,
    options: &BTreeMap<OptionId, OptionValue>,
    articles: &[Article],
    quantities: QuantityTracks,
) -> BomLine {
    let article = find_article(articles, &product.id, options);
    BomLine {
        label,
        part_number: article
            .map(|a| a.article_number.clone())
            .unwrap_or_else(|| product.id.clone()),
        product_id: Some(product.id.clone()),
        name: product.name.clone(),
        category,
        sort_key: 0,
        matched_article: article.is_some(),
        options: options.clone(),
        connectors: product.connectors.clone(),
        slot_connectors: BTreeMap::new(),
        width_hp: product.effective_width_hp(options),
        unit_price_prototype: pricing::unit_price(product, options, quantities.prototype),
        unit_price_series: pricing::unit_price(product, options, quantities.series),
    }
}

/// Synthesize the single backplane line: every slot's connector requirement,
/// defaulting to the baseline connector and always including it.
fn backplane_line(slots: &[&crate::topology::Slot], catalog: &Catalog) -> BomLine {
    let mut slot_connectors = BTreeMap::new();
    for slot in slots {
        let mut connectors: Vec<String> = slot
            .component
            .as_ref()
            .and_then(|id| catalog.get(id))
            .map(|p| p.connectors.clone())
            .unwrap_or_default();
        if connectors.is_empty() {
            connectors.push(BASELINE_CONNECTOR.to_string());
        } else if !connectors.iter().any(|c| c == BASELINE_CONNECTOR) {
            connectors.push(BASELINE_CONNECTOR.to_string());
        }
        connectors.sort();
        slot_connectors.insert(slot.id, connectors);
    }

    BomLine {
        label: "Backplane".to_string(),
        part_number: BACKPLANE_PART.to_string(),
        product_id: None,
        name: "Custom backplane configuration".to_string(),
        category: LineCategory::Backplane,
        sort_key: 0,
        matched_article: false,
        options: BTreeMap::new(),
        connectors: Vec::new(),
        slot_connectors,
        width_hp: 0,
        unit_price_prototype: Decimal::ZERO,
        unit_price_series: Decimal::ZERO,
    }
}

/// First registered article satisfying the matching predicate, in feed
/// order.  Matching is total-equality, not best-effort: every option the
/// article requires must be satisfied and the item may carry no additional
/// active option beyond them.
pub fn find_article<'a>(
    articles: &'a [Article],
    product_id: &str,
    selected: &BTreeMap<OptionId, OptionValue>,
) -> Option<&'a Article> {
    articles
        .iter()
        .find(|a| a.product_id == product_id && options_match(&a.selected_options, selected))
}

fn options_match(
    required: &BTreeMap<OptionId, OptionValue>,
    actual: &BTreeMap<OptionId, OptionValue>,
) -> bool {
    for (id, requirement) in required {
        let value = actual.get(id);
        let satisfied = match requirement {
            // A required `false` is satisfied by an unset option as well.
            OptionValue::Flag(false) => {
                matches!(value, None | Some(OptionValue::Flag(false)))
            }
            other => value == Some(other),
        };
        if !satisfied {
            return false;
        }
    }
    actual
        .iter()
        .all(|(id, value)| required.contains_key(id) || !value.is_truthy())
}

/// Aggregate externally exposed ports across all lines, including those
/// contributed by active options, grouped by (type, connector) and sorted by
/// type.
fn external_ports(lines: &[BomLine], catalog: &Catalog) -> Vec<ExternalPort> {
    let mut totals: BTreeMap<(String, String), i32> = BTreeMap::new();
    let mut add = |kind: &str, connector: &str, count: i32| {
        *totals
            .entry((kind.to_string(), connector.to_string()))
            .or_insert(0) += count;
    };

    for line in lines {
        let Some(product) = line.product_id.as_ref().and_then(|id| catalog.get(id)) else {
            continue;
        };
        for port in &product.external_interfaces {
            add(&port.kind, &port.connector, port.count);
        }
        for (id, value) in &line.options {
            let Some(option) = product.option(id) else {
                continue;
            };
            match (option, value) {
                (ProductOption::Select { .. }, OptionValue::Text(choice_value)) => {
                    if let Some(choice) = option.find_choice(choice_value) {
                        for port in &choice.external_interfaces_mod {
                            add(&port.kind, &port.connector, port.count);
                        }
                    }
                }
                (
                    ProductOption::Boolean {
                        external_interfaces_mod,
                        ..
                    },
                    OptionValue::Flag(true),
                ) => {
                    for port in external_interfaces_mod {
                        add(&port.kind, &port.connector, port.count);
                    }
                }
                _ => {}
            }
        }
    }

    totals
        .into_iter()
        .map(|((kind, connector), count)| ExternalPort {
            kind,
            connector,
            count,
        })
        .collect()
}
