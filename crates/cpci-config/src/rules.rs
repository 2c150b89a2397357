//! Declarative compatibility rules and their stateless validator.
//!
//! Rules arrive as permissive JSON (`definition.conditions` /
//! `definition.actions`).  The variants are closed sum types with a
//! defensive `Unknown` fallback: an unrecognized condition never triggers
//! and an unrecognized action never fires, so a newer rule feed degrades
//! gracefully instead of aborting validation.

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::topology::Configuration;
use crate::{ProductId, resources};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub description: String,
    #[serde(default)]
    pub definition: Definition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// True when the referenced slot (or, without an index, any slot) holds
    /// the component.
    #[serde(rename_all = "camelCase")]
    ComponentSelected {
        component_id: ProductId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slot_index: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    SystemProperty {
        property: Property,
        operator: Operator,
        value: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")] // tolerate unknown properties in the feed
pub enum Property {
    SlotCount,
    TotalWidth,
    ChassisId,
    Unknown,
}

impl From<String> for Property {
    fn from(s: String) -> Self {
        match s.as_str() {
            "slotCount" => Property::SlotCount,
            "totalWidth" => Property::TotalWidth,
            "chassisId" => Property::ChassisId,
            _ => Property::Unknown,
        }
    }
}

impl From<Property> for String {
    fn from(property: Property) -> Self {
        match property {
            Property::SlotCount => "slotCount",
            Property::TotalWidth => "totalWidth",
            Property::ChassisId => "chassisId",
            Property::Unknown => "unknown",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Gt,
    Lt,
    /// Substring match; only meaningful for string-valued properties.
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Forbid the component in the referenced slot, in any slot, or as the
    /// selected chassis/PSU.
    #[serde(rename_all = "camelCase")]
    Forbid {
        component_id: ProductId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slot_index: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Evaluate every rule against the given state and return the violation
/// messages in rule declaration order, then action order.  Duplicates are
/// not deduplicated.  Rules with no conditions or no actions are no-ops.
pub fn validate(rules: &[Rule], config: &Configuration, catalog: &Catalog) -> Vec<String> {
    let mut violations = Vec::new();
    for rule in rules {
        let def = &rule.definition;
        if def.conditions.is_empty() || def.actions.is_empty() {
            continue;
        }
        if !def
            .conditions
            .iter()
            .all(|c| condition_holds(c, config, catalog))
        {
            continue;
        }
        for action in &def.actions {
            let Action::Forbid {
                component_id,
                slot_index,
                message,
            } = action
            else {
                continue;
            };
            let msg = || {
                message
                    .clone()
                    .unwrap_or_else(|| rule.description.clone())
            };
            match slot_index {
                Some(idx) => {
                    let hit = config
                        .slot(*idx)
                        .is_some_and(|s| s.component.as_ref() == Some(component_id));
                    if hit {
                        violations.push(msg());
                    }
                }
                None => {
                    if config
                        .slots
                        .iter()
                        .any(|s| s.component.as_ref() == Some(component_id))
                    {
                        violations.push(msg());
                    }
                    if config.chassis.as_ref() == Some(component_id) {
                        violations.push(msg());
                    }
                    if config.psu.as_ref() == Some(component_id) {
                        violations.push(msg());
                    }
                }
            }
        }
    }
    violations
}

fn condition_holds(condition: &Condition, config: &Configuration, catalog: &Catalog) -> bool {
    match condition {
        Condition::ComponentSelected {
            component_id,
            slot_index,
        } => match slot_index {
            Some(idx) => config
                .slot(*idx)
                .is_some_and(|s| s.component.as_ref() == Some(component_id)),
            None => config
                .slots
                .iter()
                .any(|s| s.component.as_ref() == Some(component_id)),
        },
        Condition::SystemProperty {
            property,
            operator,
            value,
        } => property_holds(*property, *operator, value, config, catalog),
        Condition::Unknown => false,
    }
}

fn property_holds(
    property: Property,
    operator: Operator,
    value: &serde_json::Value,
    config: &Configuration,
    catalog: &Catalog,
) -> bool {
    match property {
        Property::SlotCount => compare_number(config.slot_count as i64, operator, value),
        Property::TotalWidth => compare_number(
            resources::used_width_hp(config, catalog) as i64,
            operator,
            value,
        ),
        Property::ChassisId => {
            let Some(chassis) = &config.chassis else {
                return false;
            };
            let Some(needle) = value.as_str() else {
                return false;
            };
            match operator {
                Operator::Eq => chassis == needle,
                Operator::Contains => chassis.contains(needle),
                Operator::Gt | Operator::Lt => false,
            }
        }
        Property::Unknown => false,
    }
}

fn compare_number(actual: i64, operator: Operator, value: &serde_json::Value) -> bool {
    let Some(expected) = value.as_i64() else {
        return false;
    };
    match operator {
        Operator::Eq => actual == expected,
        Operator::Gt => actual > expected,
        Operator::Lt => actual < expected,
        Operator::Contains => false,
    }
}

/// Decode a rule feed, skipping records that fail to parse.
pub fn rules_from_json(feed: &str) -> Result<Vec<Rule>, serde_json::Error> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(feed)?;
    let rules = raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Rule>(value) {
            Ok(rule) => Some(rule),
            Err(err) => {
                log::warn!("skipping malformed rule record: {err}");
                None
            }
        })
        .collect();
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use crate::topology::SystemSide;

    fn catalog() -> Catalog {
        let products = [
            serde_json::json!({ "id": "G25A", "type": "cpu", "name": "CPU", "price_1": 1 }),
            serde_json::json!({ "id": "G28", "type": "cpu", "name": "CPU", "price_1": 1 }),
            serde_json::json!({ "id": "G239", "type": "io", "name": "IO", "price_1": 1 }),
            serde_json::json!({ "id": "P300", "type": "psu", "name": "PSU", "width_hp": 0, "price_1": 1 }),
            serde_json::json!({ "id": "C_3U_40HP", "type": "chassis", "name": "Chassis", "width_hp": 40, "price_1": 1 }),
        ];
        Catalog::new(
            products
                .into_iter()
                .map(|p| serde_json::from_value::<Product>(p).unwrap())
                .collect(),
        )
    }

    fn rule(json: serde_json::Value) -> Rule {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn forbid_falls_back_to_rule_description() {
        let catalog = catalog();
        let rules = vec![rule(serde_json::json!({
            "description": "G25A forbids P300",
            "definition": {
                "conditions": [{ "type": "component_selected", "componentId": "G25A" }],
                "actions": [{ "type": "forbid", "componentId": "P300" }]
            }
        }))];

        let mut config = Configuration::new(9, SystemSide::Left);
        config.assign(1, Some("G25A".into()), None, &catalog, &[]).unwrap();
        assert!(validate(&rules, &config, &catalog).is_empty());

        config.psu = Some("P300".into());
        assert_eq!(
            validate(&rules, &config, &catalog),
            vec!["G25A forbids P300".to_string()]
        );
    }

    #[test]
    fn slot_scoped_condition_and_action() {
        let catalog = catalog();
        let rules = vec![rule(serde_json::json!({
            "description": "G28 in slot 1 forbids G239 in slot 2",
            "definition": {
                "conditions": [
                    { "type": "component_selected", "componentId": "G28", "slotIndex": 1 }
                ],
                "actions": [{
                    "type": "forbid", "componentId": "G239", "slotIndex": 2,
                    "message": "G239 cannot sit next to G28"
                }]
            }
        }))];

        let mut config = Configuration::new(9, SystemSide::Left);
        config.assign(1, Some("G28".into()), None, &catalog, &[]).unwrap();
        config.assign(3, Some("G239".into()), None, &catalog, &[]).unwrap();
        // G239 is in slot 3, not 2: no violation.
        assert!(validate(&rules, &config, &catalog).is_empty());

        config.assign(3, None, None, &catalog, &[]).unwrap();
        config.assign(2, Some("G239".into()), None, &catalog, &[]).unwrap();
        assert_eq!(
            validate(&rules, &config, &catalog),
            vec!["G239 cannot sit next to G28".to_string()]
        );
    }

    #[test]
    fn slot_count_property_gates_chassis() {
        let catalog = catalog();
        let rules = vec![rule(serde_json::json!({
            "description": "Compact chassis supports max 5 slots",
            "definition": {
                "conditions": [{
                    "type": "system_property",
                    "property": "slotCount", "operator": "gt", "value": 5
                }],
                "actions": [{ "type": "forbid", "componentId": "C_3U_40HP" }]
            }
        }))];

        let mut config = Configuration::new(5, SystemSide::Left);
        config.chassis = Some("C_3U_40HP".into());
        assert!(validate(&rules, &config, &catalog).is_empty());

        let mut config = Configuration::new(9, SystemSide::Left);
        config.chassis = Some("C_3U_40HP".into());
        assert_eq!(
            validate(&rules, &config, &catalog),
            vec!["Compact chassis supports max 5 slots".to_string()]
        );
    }

    #[test]
    fn chassis_id_contains_operator() {
        let catalog = catalog();
        let rules = vec![rule(serde_json::json!({
            "description": "3U chassis forbids P300",
            "definition": {
                "conditions": [{
                    "type": "system_property",
                    "property": "chassisId", "operator": "contains", "value": "3U"
                }],
                "actions": [{ "type": "forbid", "componentId": "P300" }]
            }
        }))];

        let mut config = Configuration::new(5, SystemSide::Left);
        config.psu = Some("P300".into());
        assert!(validate(&rules, &config, &catalog).is_empty());

        config.chassis = Some("C_3U_40HP".into());
        assert_eq!(validate(&rules, &config, &catalog).len(), 1);
    }

    #[test]
    fn conditions_are_anded() {
        let catalog = catalog();
        let rules = vec![rule(serde_json::json!({
            "description": "both conditions required",
            "definition": {
                "conditions": [
                    { "type": "component_selected", "componentId": "G28" },
                    { "type": "component_selected", "componentId": "G239" }
                ],
                "actions": [{ "type": "forbid", "componentId": "P300" }]
            }
        }))];

        let mut config = Configuration::new(9, SystemSide::Left);
        config.assign(1, Some("G28".into()), None, &catalog, &[]).unwrap();
        config.psu = Some("P300".into());
        assert!(validate(&rules, &config, &catalog).is_empty());

        config.assign(2, Some("G239".into()), None, &catalog, &[]).unwrap();
        assert_eq!(validate(&rules, &config, &catalog).len(), 1);
    }

    #[test]
    fn empty_conditions_or_actions_are_noops() {
        let catalog = catalog();
        let rules = vec![
            rule(serde_json::json!({
                "description": "no conditions",
                "definition": { "conditions": [], "actions": [
                    { "type": "forbid", "componentId": "P300" }
                ]}
            })),
            rule(serde_json::json!({
                "description": "no actions",
                "definition": { "conditions": [
                    { "type": "component_selected", "componentId": "G28" }
                ], "actions": []}
            })),
        ];

        let mut config = Configuration::new(9, SystemSide::Left);
        config.assign(1, Some("G28".into()), None, &catalog, &[]).unwrap();
        config.psu = Some("P300".into());
        assert!(validate(&rules, &config, &catalog).is_empty());
    }

    #[test]
    fn unknown_variants_never_trigger() {
        let catalog = catalog();
        let rules = vec![rule(serde_json::json!({
            "description": "future rule type",
            "definition": {
                "conditions": [{ "type": "moon_phase", "phase": "full" }],
                "actions": [{ "type": "forbid", "componentId": "P300" }]
            }
        }))];

        let mut config = Configuration::new(9, SystemSide::Left);
        config.psu = Some("P300".into());
        assert!(validate(&rules, &config, &catalog).is_empty());
    }

    #[test]
    fn violations_keep_declaration_order_without_dedup() {
        let catalog = catalog();
        let rules = vec![
            rule(serde_json::json!({
                "description": "first",
                "definition": {
                    "conditions": [{ "type": "component_selected", "componentId": "G28" }],
                    "actions": [
                        { "type": "forbid", "componentId": "P300", "message": "a" },
                        { "type": "forbid", "componentId": "P300", "message": "b" }
                    ]
                }
            })),
            rule(serde_json::json!({
                "description": "second",
                "definition": {
                    "conditions": [{ "type": "component_selected", "componentId": "G28" }],
                    "actions": [{ "type": "forbid", "componentId": "P300", "message": "a" }]
                }
            })),
        ];

        let mut config = Configuration::new(9, SystemSide::Left);
        config.assign(1, Some("G28".into()), None, &catalog, &[]).unwrap();
        config.psu = Some("P300".into());
        assert_eq!(validate(&rules, &config, &catalog), vec!["a", "b", "a"]);
    }

    #[test]
    fn malformed_rule_records_are_skipped() {
        let feed = r#"[
            { "description": "ok", "definition": { "conditions": [], "actions": [] } },
            { "definition": 42 },
            "not even an object"
        ]"#;
        let rules = rules_from_json(feed).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].description, "ok");
    }
}
