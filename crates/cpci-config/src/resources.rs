//! Power, interface and width budgets derived from a committed state.
//!
//! Everything in here is a pure derivation over the configuration and the
//! catalog – nothing is cached on the entities, so a catalog swap mid-session
//! can never leave stale numbers behind.  Budget overruns are advisory: they
//! are surfaced as human-readable warnings and never block a mutation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, OptionValue, Product};
use crate::topology::{Configuration, SlotKind};
use crate::{MAX_SYSTEM_WIDTH_HP, OptionId, SLOT_PITCH_HP};

/// Safety margin applied on top of raw consumption when sizing the PSU.
const PSU_MARGIN_NUM: i32 = 6;
const PSU_MARGIN_DEN: i32 = 5;

/// Power demand and supply of a configuration, in watts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSummary {
    /// Sum of all consumers: positive product draws plus active option draws.
    pub consumption_watts: i32,
    /// Supply budget carried by the fitted boards themselves.
    pub onboard_capacity_watts: i32,
    /// Recommended PSU rating: consumption plus a 20% safety margin.
    pub required_watts: i32,
    /// Rated output of the selected PSU; zero when none is selected or the
    /// PSU declares no rating.
    pub psu_capacity_watts: i32,
}

impl PowerSummary {
    /// The selected PSU declares a rating and it is below the requirement.
    pub fn psu_undersized(&self) -> bool {
        self.psu_capacity_watts > 0 && self.required_watts > self.psu_capacity_watts
    }
}

/// Widths of a configuration, in HP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidthSummary {
    /// HP occupied by fitted components, their options, and a non-pluggable
    /// PSU.
    pub used_hp: u32,
    /// Total backplane capacity (slot count times slot pitch).
    pub backplane_hp: u32,
    /// Rated width of the selected chassis, when one is selected.
    pub chassis_hp: Option<u32>,
}

pub fn power_summary(config: &Configuration, catalog: &Catalog) -> PowerSummary {
    let mut consumption = 0i32;
    let mut onboard = 0i32;
    for slot in &config.slots {
        if slot.kind == SlotKind::PowerSupply {
            continue;
        }
        let Some(product) = slot.component.as_ref().and_then(|id| catalog.get(id)) else {
            continue;
        };
        if product.power_watts > 0 {
            consumption += product.power_watts;
        } else {
            onboard += product.power_watts.abs();
        }
        consumption += option_power_watts(product, &slot.selected_options);
    }

    let required =
        ((consumption.max(0) * PSU_MARGIN_NUM) as u32).div_ceil(PSU_MARGIN_DEN as u32) as i32;
    let psu_capacity = config
        .psu
        .as_ref()
        .and_then(|id| catalog.get(id))
        .map(Product::supply_watts)
        .unwrap_or(0);

    PowerSummary {
        consumption_watts: consumption,
        onboard_capacity_watts: onboard,
        required_watts: required,
        psu_capacity_watts: psu_capacity,
    }
}

fn option_power_watts(product: &Product, selected: &BTreeMap<OptionId, OptionValue>) -> i32 {
    let mut watts = 0;
    for (id, value) in selected {
        let Some(option) = product.option(id) else {
            continue;
        };
        match value {
            OptionValue::Text(v) => {
                if let Some(choice) = option.find_choice(v) {
                    watts += choice.power_mod.unwrap_or(0);
                }
            }
            OptionValue::Flag(true) => {
                if let crate::catalog::ProductOption::Boolean { power_mod, .. } = option {
                    watts += power_mod.unwrap_or(0);
                }
            }
            OptionValue::Flag(false) => {}
        }
    }
    watts
}

/// Remaining internal interface budget per type: CPU-board capacity minus
/// the consumption of every fitted, non-covered peripheral, both adjusted by
/// active option modifiers.  Negative entries mean overcommit.
pub fn remaining_interfaces(config: &Configuration, catalog: &Catalog) -> BTreeMap<String, i32> {
    let mut remaining = BTreeMap::new();
    let Some(system) = config.system_slot() else {
        return remaining;
    };
    let Some(cpu) = system.component.as_ref().and_then(|id| catalog.get(id)) else {
        return remaining;
    };
    if cpu.interfaces.is_empty() {
        return remaining;
    }

    remaining = cpu.interfaces.clone();
    // CPU-side option modifiers extend capacity.
    for (kind, delta) in option_interface_mods(cpu, &system.selected_options) {
        *remaining.entry(kind).or_insert(0) += delta;
    }

    for slot in &config.slots {
        if slot.kind != SlotKind::Peripheral || slot.blocked_by.is_some() {
            continue;
        }
        let Some(product) = slot.component.as_ref().and_then(|id| catalog.get(id)) else {
            continue;
        };
        for (kind, consumed) in &product.interfaces {
            if let Some(r) = remaining.get_mut(kind) {
                *r -= consumed;
            }
        }
        for (kind, delta) in option_interface_mods(product, &slot.selected_options) {
            if let Some(r) = remaining.get_mut(&kind) {
                *r -= delta;
            }
        }
    }
    remaining
}

fn option_interface_mods(
    product: &Product,
    selected: &BTreeMap<OptionId, OptionValue>,
) -> Vec<(String, i32)> {
    let mut mods = Vec::new();
    for (id, value) in selected {
        let Some(text) = value.as_text() else {
            continue;
        };
        let Some(choice) = product.option(id).and_then(|o| o.find_choice(text)) else {
            continue;
        };
        for (kind, delta) in &choice.interface_mod {
            mods.push((kind.clone(), *delta));
        }
    }
    mods
}

/// HP occupied by fitted components and a non-pluggable PSU.
pub fn used_width_hp(config: &Configuration, catalog: &Catalog) -> u32 {
    let mut used = 0u32;
    for slot in &config.slots {
        if slot.component.is_none() {
            continue;
        }
        used += match slot.component.as_ref().and_then(|id| catalog.get(id)) {
            Some(product) => product.effective_width_hp(&slot.selected_options),
            None => SLOT_PITCH_HP,
        };
    }
    if !config.psu_in_slots() {
        if let Some(psu) = config.psu.as_ref().and_then(|id| catalog.get(id)) {
            used += psu.width_hp;
        }
    }
    used
}

pub fn width_summary(config: &Configuration, catalog: &Catalog) -> WidthSummary {
    WidthSummary {
        used_hp: used_width_hp(config, catalog),
        backplane_hp: config.slot_count * SLOT_PITCH_HP,
        chassis_hp: config
            .chassis
            .as_ref()
            .and_then(|id| catalog.get(id))
            .map(|p| p.width_hp),
    }
}

/// Earliest end-of-life date across every selected product and choice.
pub fn eol_horizon(config: &Configuration, catalog: &Catalog) -> Option<NaiveDate> {
    let mut horizon: Option<NaiveDate> = None;
    let mut consider = |date: Option<NaiveDate>| {
        if let Some(date) = date {
            horizon = Some(horizon.map_or(date, |h| h.min(date)));
        }
    };

    let mut items: Vec<(&str, &BTreeMap<OptionId, OptionValue>)> = Vec::new();
    if let Some(chassis) = &config.chassis {
        items.push((chassis, &config.chassis_options));
    }
    if let Some(psu) = &config.psu {
        items.push((psu, &config.psu_options));
    }
    for slot in &config.slots {
        if slot.kind == SlotKind::PowerSupply {
            continue;
        }
        if let Some(component) = &slot.component {
            items.push((component, &slot.selected_options));
        }
    }

    for (id, selected) in items {
        let Some(product) = catalog.get(id) else {
            continue;
        };
        consider(product.eol_date);
        for (opt_id, value) in selected {
            let Some(text) = value.as_text() else {
                continue;
            };
            if let Some(choice) = product.option(opt_id).and_then(|o| o.find_choice(text)) {
                consider(choice.eol_date);
            }
        }
    }
    horizon
}

/// All advisory warnings for the given state: interface overcommit, width
/// overruns and PSU undersizing.  Advisory only – a configuration with
/// warnings is still a committed, exportable state.
pub fn advisories(config: &Configuration, catalog: &Catalog) -> Vec<String> {
    let mut warnings = Vec::new();

    for (kind, remaining) in remaining_interfaces(config, catalog) {
        if remaining < 0 {
            warnings.push(format!(
                "Insufficient {kind} interfaces. (Overrun by {})",
                remaining.abs()
            ));
        }
    }

    let width = width_summary(config, catalog);
    if width.used_hp > MAX_SYSTEM_WIDTH_HP {
        warnings.push(format!(
            "Configuration used width ({}HP) exceeds the maximum system limit of {MAX_SYSTEM_WIDTH_HP}HP.",
            width.used_hp
        ));
    }
    if width.backplane_hp > MAX_SYSTEM_WIDTH_HP {
        warnings.push(format!(
            "Backplane size ({}HP) exceeds the maximum system limit of {MAX_SYSTEM_WIDTH_HP}HP.",
            width.backplane_hp
        ));
    }
    if let Some(chassis_hp) = width.chassis_hp {
        if width.backplane_hp > chassis_hp {
            warnings.push(format!(
                "Backplane size ({}HP) exceeds chassis capacity ({chassis_hp}HP).",
                width.backplane_hp
            ));
        }
        if width.used_hp > width.backplane_hp {
            warnings.push(format!(
                "Total used width ({}HP) exceeds backplane capacity ({}HP).",
                width.used_hp, width.backplane_hp
            ));
        }
    }

    let power = power_summary(config, catalog);
    if power.psu_undersized() {
        warnings.push(format!(
            "Selected PSU ({}W) is insufficient for the required power ({}W).",
            power.psu_capacity_watts, power.required_watts
        ));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use crate::topology::SystemSide;

    fn product(json: serde_json::Value) -> Product {
        serde_json::from_value(json).unwrap()
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            product(serde_json::json!({
                "id": "G25A", "type": "cpu", "name": "CPU",
                "width_hp": 4, "power_watts": 35, "price_1": 2500,
                "interfaces": { "pcie_x4": 4 },
                "options": [
                    { "type": "boolean", "id": "coating", "power_mod": 2, "price_mod": 50 },
                    { "type": "select", "id": "ram", "choices": [
                        { "value": "16gb" },
                        { "value": "32gb", "power_mod": 3 }
                    ]}
                ]
            })),
            product(serde_json::json!({
                "id": "G51", "type": "storage", "name": "Carrier",
                "width_hp": 4, "power_watts": 10, "price_1": 450,
                "interfaces": { "pcie_x4": 3 },
                "eol_date": "2031-06-30"
            })),
            product(serde_json::json!({
                "id": "P300", "type": "psu", "name": "PSU",
                "width_hp": 0, "power_watts": -300, "price_1": 350
            })),
            product(serde_json::json!({
                "id": "C01", "type": "chassis", "name": "Chassis",
                "width_hp": 24, "price_1": 800, "eol_date": "2029-01-01"
            })),
        ])
    }

    #[test]
    fn consumption_includes_option_draws_and_skips_psu() {
        let catalog = catalog();
        let mut config = Configuration::new(9, SystemSide::Left);
        let mut opts = BTreeMap::new();
        opts.insert("coating".to_string(), OptionValue::from(true));
        opts.insert("ram".to_string(), OptionValue::from("32gb"));
        config
            .assign(1, Some("G25A".into()), Some(opts), &catalog, &[])
            .unwrap();
        config.assign(2, Some("G51".into()), None, &catalog, &[]).unwrap();
        config.psu = Some("P300".into());

        let power = power_summary(&config, &catalog);
        // 35 + 2 + 3 + 10; the PSU's negative draw is not consumption.
        assert_eq!(power.consumption_watts, 50);
        assert_eq!(power.required_watts, 60);
        assert_eq!(power.psu_capacity_watts, 300);
        assert!(!power.psu_undersized());
    }

    #[test]
    fn required_power_rounds_up() {
        let catalog = Catalog::new(vec![product(serde_json::json!({
            "id": "X", "type": "io", "name": "X", "power_watts": 7, "price_1": 1
        }))]);
        let mut config = Configuration::new(3, SystemSide::Left);
        config.assign(2, Some("X".into()), None, &catalog, &[]).unwrap();
        // ceil(7 * 1.2) = ceil(8.4) = 9
        assert_eq!(power_summary(&config, &catalog).required_watts, 9);
    }

    #[test]
    fn onboard_capacity_comes_from_negative_draws() {
        let catalog = Catalog::new(vec![product(serde_json::json!({
            "id": "G29", "type": "cpu", "name": "Self-powered CPU",
            "power_watts": -60, "price_1": 1
        }))]);
        let mut config = Configuration::new(3, SystemSide::Left);
        config.assign(1, Some("G29".into()), None, &catalog, &[]).unwrap();

        let power = power_summary(&config, &catalog);
        assert_eq!(power.consumption_watts, 0);
        assert_eq!(power.onboard_capacity_watts, 60);
    }

    #[test]
    fn interface_overcommit_is_advisory_not_blocking() {
        let catalog = catalog();
        let mut config = Configuration::new(9, SystemSide::Left);
        config.assign(1, Some("G25A".into()), None, &catalog, &[]).unwrap();
        config.assign(2, Some("G51".into()), None, &catalog, &[]).unwrap();
        // The second carrier overcommits pcie_x4 (4 - 6 = -2) but still lands.
        config.assign(3, Some("G51".into()), None, &catalog, &[]).unwrap();

        let remaining = remaining_interfaces(&config, &catalog);
        assert_eq!(remaining.get("pcie_x4"), Some(&-2));

        let warnings = advisories(&config, &catalog);
        assert!(
            warnings
                .iter()
                .any(|w| w.contains("Insufficient pcie_x4 interfaces"))
        );
    }

    #[test]
    fn covered_slots_do_not_consume_interfaces() {
        let catalog = Catalog::new(vec![
            product(serde_json::json!({
                "id": "CPU", "type": "cpu", "name": "CPU", "price_1": 1,
                "interfaces": { "eth": 2 }
            })),
            product(serde_json::json!({
                "id": "WIDE", "type": "io", "name": "Wide", "width_hp": 8, "price_1": 1,
                "interfaces": { "eth": 1 }
            })),
        ]);
        let mut config = Configuration::new(5, SystemSide::Left);
        config.assign(1, Some("CPU".into()), None, &catalog, &[]).unwrap();
        config.assign(2, Some("WIDE".into()), None, &catalog, &[]).unwrap();

        // One consumer, even though it covers two slots.
        let remaining = remaining_interfaces(&config, &catalog);
        assert_eq!(remaining.get("eth"), Some(&1));
    }

    #[test]
    fn width_warnings_reference_the_chassis() {
        let catalog = catalog();
        let mut config = Configuration::new(9, SystemSide::Left);
        config.chassis = Some("C01".into());

        // 9 slots = 36HP backplane against a 24HP chassis.
        let warnings = advisories(&config, &catalog);
        assert!(
            warnings
                .iter()
                .any(|w| w.contains("exceeds chassis capacity (24HP)"))
        );
    }

    #[test]
    fn undersized_psu_raises_a_warning() {
        let catalog = Catalog::new(vec![
            product(serde_json::json!({
                "id": "HOG", "type": "io", "name": "Hog",
                "power_watts": 400, "price_1": 1
            })),
            product(serde_json::json!({
                "id": "P300", "type": "psu", "name": "PSU",
                "width_hp": 0, "power_watts": -300, "price_1": 1
            })),
        ]);
        let mut config = Configuration::new(3, SystemSide::Left);
        config.assign(2, Some("HOG".into()), None, &catalog, &[]).unwrap();
        config.psu = Some("P300".into());

        let power = power_summary(&config, &catalog);
        assert_eq!(power.required_watts, 480);
        assert!(power.psu_undersized());
        let warnings = advisories(&config, &catalog);
        assert!(warnings.iter().any(|w| w.contains("(300W)")));
    }

    #[test]
    fn eol_horizon_is_the_earliest_date() {
        let catalog = catalog();
        let mut config = Configuration::new(9, SystemSide::Left);
        assert_eq!(eol_horizon(&config, &catalog), None);

        config.assign(2, Some("G51".into()), None, &catalog, &[]).unwrap();
        assert_eq!(
            eol_horizon(&config, &catalog),
            NaiveDate::from_ymd_opt(2031, 6, 30)
        );

        config.chassis = Some("C01".into());
        assert_eq!(
            eol_horizon(&config, &catalog),
            NaiveDate::from_ymd_opt(2029, 1, 1)
        );
    }
}
