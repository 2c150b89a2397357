//! Catalog reference data: products, their options, and registered articles.
//!
//! The catalog is owned by an external system and handed to the engine as a
//! JSON document.  The engine treats it as read-only for the duration of a
//! configuration session.  Records that fail to decode are skipped with a
//! warning rather than aborting the whole feed (structural errors are
//! defensive no-ops).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OptionId, ProductId};

/// Broad product class.  The class decides where a product may sit (CPU
/// boards in the system slot, chassis/PSU outside the backplane) and how its
/// `interfaces` map is interpreted (capacity on CPU-class products,
/// consumption on everything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")] // tolerate unknown classes in the feed
pub enum ProductKind {
    Cpu,
    Storage,
    Network,
    Io,
    Carrier,
    Chassis,
    Psu,
    Accessory,
    Backplane,
    Miscellaneous,
    /// Anything a newer catalog may introduce; never slot-assignable.
    Other,
}

impl ProductKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductKind::Cpu => "cpu",
            ProductKind::Storage => "storage",
            ProductKind::Network => "network",
            ProductKind::Io => "io",
            ProductKind::Carrier => "carrier",
            ProductKind::Chassis => "chassis",
            ProductKind::Psu => "psu",
            ProductKind::Accessory => "accessory",
            ProductKind::Backplane => "backplane",
            ProductKind::Miscellaneous => "miscellaneous",
            ProductKind::Other => "other",
        }
    }

    pub fn is_cpu(self) -> bool {
        self == ProductKind::Cpu
    }

    /// Products that live outside the backplane and are never offered for
    /// slot assignment.
    pub fn is_infrastructure(self) -> bool {
        matches!(
            self,
            ProductKind::Chassis | ProductKind::Psu | ProductKind::Backplane | ProductKind::Other
        )
    }
}

impl From<String> for ProductKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "cpu" => ProductKind::Cpu,
            "storage" => ProductKind::Storage,
            "network" => ProductKind::Network,
            "io" => ProductKind::Io,
            "carrier" => ProductKind::Carrier,
            "chassis" => ProductKind::Chassis,
            "psu" => ProductKind::Psu,
            "accessory" => ProductKind::Accessory,
            "backplane" => ProductKind::Backplane,
            "miscellaneous" => ProductKind::Miscellaneous,
            _ => ProductKind::Other,
        }
    }
}

impl From<ProductKind> for String {
    fn from(kind: ProductKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A configured option value.  Closed on purpose: the wire format only ever
/// carries select values (strings) and toggles (booleans).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Flag(bool),
    Text(String),
}

impl OptionValue {
    /// An option is "active" when it is a set flag or a non-empty text value.
    pub fn is_truthy(&self) -> bool {
        match self {
            OptionValue::Flag(b) => *b,
            OptionValue::Text(s) => !s.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OptionValue::Text(s) => Some(s),
            OptionValue::Flag(_) => None,
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Flag(b) => write!(f, "{b}"),
            OptionValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Flag(b)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

/// Price modifier of an option: either a flat amount applied at every
/// quantity, or a tier map using the same breakpoints as product pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceMod {
    Flat(Decimal),
    Tiered(BTreeMap<u32, Decimal>),
}

/// An externally exposed port (front panel or rear I/O) contributed by a
/// product or by an active option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalInterface {
    #[serde(rename = "type")]
    pub kind: String,
    pub connector: String,
    pub count: i32,
}

/// One selectable choice of a `Select` option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_mod: Option<PriceMod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_mod: Option<i32>,
    /// Extra HP the choice adds to (or removes from) the carrier width.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub width_mod: i32,
    /// Per-interface-type adjustment: capacity on CPU-class products,
    /// consumption otherwise, matching the owning product's sign convention.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub interface_mod: BTreeMap<String, i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_interfaces_mod: Vec<ExternalInterface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eol_date: Option<NaiveDate>,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// A product option.  Tagged variants keep the permissive JSON feed type-safe:
/// unknown option types decode to [`ProductOption::Unknown`] and are skipped
/// everywhere instead of failing the product record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProductOption {
    Select {
        id: OptionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default)]
        choices: Vec<Choice>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Boolean {
        id: OptionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        price_mod: Option<PriceMod>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        power_mod: Option<i32>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        external_interfaces_mod: Vec<ExternalInterface>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

impl ProductOption {
    pub fn id(&self) -> Option<&str> {
        match self {
            ProductOption::Select { id, .. } | ProductOption::Boolean { id, .. } => Some(id),
            ProductOption::Unknown => None,
        }
    }

    pub fn find_choice(&self, value: &str) -> Option<&Choice> {
        match self {
            ProductOption::Select { choices, .. } => choices.iter().find(|c| c.value == value),
            _ => None,
        }
    }

    /// Default value declared by the catalog, if any.
    pub fn default_value(&self) -> Option<OptionValue> {
        match self {
            ProductOption::Select { default, .. } => {
                default.as_ref().map(|v| OptionValue::Text(v.clone()))
            }
            ProductOption::Boolean { default, .. } => (*default).map(OptionValue::Flag),
            ProductOption::Unknown => None,
        }
    }
}

/// Violations raised when supplied option values do not fit the owning
/// product's option declarations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("unknown product '{0}'")]
    UnknownProduct(ProductId),
    #[error("product {product} declares no option '{option}'")]
    UnknownOption { product: ProductId, option: OptionId },
    #[error("option '{option}' of {product} has no choice '{value}'")]
    InvalidChoice {
        product: ProductId,
        option: OptionId,
        value: String,
    },
    #[error("option '{option}' of {product} expects a {expected} value")]
    WrongKind {
        product: ProductId,
        option: OptionId,
        expected: &'static str,
    },
}

/// A catalog product.  Negative `power_watts` means the product supplies
/// power (PSUs, CPU boards with their own supply budget); positive means it
/// consumes.  Price tiers above quantity 1 are optional and fall back to the
/// base price during tier selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_width_hp")]
    pub width_hp: u32,
    #[serde(default)]
    pub power_watts: i32,
    #[serde(default)]
    pub price_1: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_25: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_50: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_100: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_250: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_500: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connectors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ProductOption>,
    /// Interface budget: capacity if this is a CPU-class product,
    /// consumption otherwise.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub interfaces: BTreeMap<String, i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_interfaces: Vec<ExternalInterface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eol_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_u: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn default_width_hp() -> u32 {
    crate::SLOT_PITCH_HP
}

impl Product {
    pub fn option(&self, id: &str) -> Option<&ProductOption> {
        self.options.iter().find(|o| o.id() == Some(id))
    }

    /// Rated supply capacity in watts; zero for pure consumers.
    pub fn supply_watts(&self) -> i32 {
        if self.power_watts < 0 {
            self.power_watts.abs()
        } else {
            0
        }
    }

    /// Default option values declared by the catalog.
    pub fn default_options(&self) -> BTreeMap<OptionId, OptionValue> {
        self.options
            .iter()
            .filter_map(|o| Some((o.id()?.to_string(), o.default_value()?)))
            .collect()
    }

    /// Check supplied option values against this product's declarations:
    /// every key must name a declared option, select values must be declared
    /// choices and toggles must be booleans.
    pub fn check_options(
        &self,
        selected: &BTreeMap<OptionId, OptionValue>,
    ) -> Result<(), OptionsError> {
        for (id, value) in selected {
            let Some(option) = self.option(id) else {
                return Err(OptionsError::UnknownOption {
                    product: self.id.clone(),
                    option: id.clone(),
                });
            };
            match option {
                ProductOption::Select { .. } => match value.as_text() {
                    Some(v) => {
                        if option.find_choice(v).is_none() {
                            return Err(OptionsError::InvalidChoice {
                                product: self.id.clone(),
                                option: id.clone(),
                                value: v.to_string(),
                            });
                        }
                    }
                    None => {
                        return Err(OptionsError::WrongKind {
                            product: self.id.clone(),
                            option: id.clone(),
                            expected: "select",
                        });
                    }
                },
                ProductOption::Boolean { .. } => {
                    if value.as_text().is_some() {
                        return Err(OptionsError::WrongKind {
                            product: self.id.clone(),
                            option: id.clone(),
                            expected: "boolean",
                        });
                    }
                }
                ProductOption::Unknown => {}
            }
        }
        Ok(())
    }

    /// Effective width in HP with the supplied options applied.
    pub fn effective_width_hp(&self, selected: &BTreeMap<OptionId, OptionValue>) -> u32 {
        let base = if self.width_hp == 0 {
            crate::SLOT_PITCH_HP
        } else {
            self.width_hp
        };
        let mod_hp: i32 = selected
            .iter()
            .filter_map(|(id, value)| {
                let choice = self.option(id)?.find_choice(value.as_text()?)?;
                Some(choice.width_mod)
            })
            .sum();
        (base as i32 + mod_hp).max(crate::SLOT_PITCH_HP as i32) as u32
    }
}

/// A registered article: a product with a fixed option set carrying an
/// official part number.  Used only for read-matching during BOM assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub article_number: String,
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selected_options: BTreeMap<OptionId, OptionValue>,
}

impl Article {
    /// Validate this article against the owning product's declarations.
    pub fn validate(&self, catalog: &Catalog) -> Result<(), OptionsError> {
        match catalog.get(&self.product_id) {
            Some(product) => product.check_options(&self.selected_options),
            None => Err(OptionsError::UnknownProduct(self.product_id.clone())),
        }
    }
}

/// The full product catalog for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    pub products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Catalog { products }
    }

    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// The blind filler panel used to close empty peripheral slots, if the
    /// catalog carries one.
    pub fn filler(&self) -> Option<&Product> {
        self.get(crate::FILLER_PRODUCT_ID)
    }

    /// Decode a catalog feed, skipping records that fail to parse.
    pub fn from_json(feed: &str) -> Result<Self, serde_json::Error> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(feed)?;
        let products = raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Product>(value) {
                Ok(p) => Some(p),
                Err(err) => {
                    log::warn!("skipping malformed product record: {err}");
                    None
                }
            })
            .collect();
        Ok(Catalog { products })
    }
}

/// Decode an article feed, skipping records that fail to parse or that do
/// not validate against the catalog.
pub fn articles_from_json(feed: &str, catalog: &Catalog) -> Result<Vec<Article>, serde_json::Error> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(feed)?;
    let articles = raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Article>(value) {
            Ok(article) => match article.validate(catalog) {
                Ok(()) => Some(article),
                Err(err) => {
                    log::warn!("skipping article {}: {err}", article.article_number);
                    None
                }
            },
            Err(err) => {
                log::warn!("skipping malformed article record: {err}");
                None
            }
        })
        .collect();
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cpu_board() -> Product {
        serde_json::from_value(serde_json::json!({
            "id": "G25A",
            "type": "cpu",
            "name": "G25A Xeon board",
            "width_hp": 4,
            "power_watts": 35,
            "price_1": 2500,
            "price_25": 2200,
            "options": [
                {
                    "type": "select",
                    "id": "ram",
                    "choices": [
                        { "value": "16gb" },
                        { "value": "32gb", "price_mod": 200, "power_mod": 3 }
                    ],
                    "default": "16gb"
                },
                { "type": "boolean", "id": "coating", "price_mod": 50, "default": false }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn product_record_round_trips() {
        let product = cpu_board();
        assert_eq!(product.kind, ProductKind::Cpu);
        assert_eq!(product.price_25, Some(dec!(2200)));
        let json = serde_json::to_string(&product).unwrap();
        let back: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(product, back);
    }

    #[test]
    fn unknown_option_type_is_tolerated() {
        let product: Product = serde_json::from_value(serde_json::json!({
            "id": "X1",
            "type": "io",
            "name": "X1",
            "price_1": 10,
            "options": [{ "type": "slider", "id": "gain", "max": 11 }]
        }))
        .unwrap();
        assert_eq!(product.options, vec![ProductOption::Unknown]);
        assert!(product.option("gain").is_none());
    }

    #[test]
    fn unknown_product_kind_is_tolerated() {
        let product: Product = serde_json::from_value(serde_json::json!({
            "id": "X2",
            "type": "hologram",
            "name": "X2",
            "price_1": 1
        }))
        .unwrap();
        assert_eq!(product.kind, ProductKind::Other);
    }

    #[test]
    fn malformed_catalog_records_are_skipped() {
        let feed = r#"[
            { "id": "G25A", "type": "cpu", "name": "ok", "price_1": 1 },
            { "name": "missing id and type" },
            { "id": "G51", "type": "storage", "name": "ok too", "price_1": 2 }
        ]"#;
        let catalog = Catalog::from_json(feed).unwrap();
        assert_eq!(catalog.products.len(), 2);
        assert!(catalog.get("G25A").is_some());
        assert!(catalog.get("G51").is_some());
    }

    #[test]
    fn check_options_enforces_declarations() {
        let product = cpu_board();

        let mut good = BTreeMap::new();
        good.insert("ram".to_string(), OptionValue::from("32gb"));
        good.insert("coating".to_string(), OptionValue::from(true));
        assert_eq!(product.check_options(&good), Ok(()));

        let mut bad_choice = BTreeMap::new();
        bad_choice.insert("ram".to_string(), OptionValue::from("64gb"));
        assert!(matches!(
            product.check_options(&bad_choice),
            Err(OptionsError::InvalidChoice { .. })
        ));

        let mut unknown = BTreeMap::new();
        unknown.insert("turbo".to_string(), OptionValue::from(true));
        assert!(matches!(
            product.check_options(&unknown),
            Err(OptionsError::UnknownOption { .. })
        ));

        let mut wrong_kind = BTreeMap::new();
        wrong_kind.insert("coating".to_string(), OptionValue::from("yes"));
        assert!(matches!(
            product.check_options(&wrong_kind),
            Err(OptionsError::WrongKind { .. })
        ));
    }

    #[test]
    fn effective_width_applies_choice_mods() {
        let product: Product = serde_json::from_value(serde_json::json!({
            "id": "G51",
            "type": "storage",
            "name": "carrier",
            "width_hp": 4,
            "price_1": 450,
            "options": [{
                "type": "select",
                "id": "bay",
                "choices": [
                    { "value": "single" },
                    { "value": "double", "width_mod": 4 }
                ]
            }]
        }))
        .unwrap();

        let mut opts = BTreeMap::new();
        assert_eq!(product.effective_width_hp(&opts), 4);
        opts.insert("bay".to_string(), OptionValue::from("double"));
        assert_eq!(product.effective_width_hp(&opts), 8);
    }

    #[test]
    fn article_feed_drops_invalid_entries() {
        let catalog = Catalog::new(vec![cpu_board()]);
        let feed = r#"[
            { "article_number": "G25A-32GB", "product_id": "G25A",
              "selected_options": { "ram": "32gb" } },
            { "article_number": "G25A-BAD", "product_id": "G25A",
              "selected_options": { "ram": "128gb" } },
            { "article_number": "GHOST-1", "product_id": "GHOST" }
        ]"#;
        let articles = articles_from_json(feed, &catalog).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].article_number, "G25A-32GB");
    }

    #[test]
    fn price_mod_accepts_flat_and_tiered_forms() {
        let flat: PriceMod = serde_json::from_str("10").unwrap();
        assert_eq!(flat, PriceMod::Flat(dec!(10)));

        let tiered: PriceMod = serde_json::from_str(r#"{ "1": 10, "100": 8 }"#).unwrap();
        match tiered {
            PriceMod::Tiered(map) => {
                assert_eq!(map.get(&1), Some(&dec!(10)));
                assert_eq!(map.get(&100), Some(&dec!(8)));
            }
            PriceMod::Flat(_) => panic!("expected tier map"),
        }
    }
}
