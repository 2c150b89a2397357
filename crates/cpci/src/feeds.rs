//! Feed loading shared by the subcommands.  All file I/O of the tool lives
//! here; the engine itself only ever sees decoded data.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use cpci_config::{Article, Catalog, Configuration, Rule, catalog, rules};

pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let feed = fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let catalog = Catalog::from_json(&feed)
        .with_context(|| format!("invalid catalog feed {}", path.display()))?;
    log::debug!("loaded {} products from {}", catalog.products.len(), path.display());
    Ok(catalog)
}

pub fn load_rules(path: Option<&Path>) -> Result<Vec<Rule>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let feed = fs::read_to_string(path)
        .with_context(|| format!("failed to read rules {}", path.display()))?;
    rules::rules_from_json(&feed).with_context(|| format!("invalid rule feed {}", path.display()))
}

pub fn load_articles(path: Option<&Path>, catalog: &Catalog) -> Result<Vec<Article>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let feed = fs::read_to_string(path)
        .with_context(|| format!("failed to read articles {}", path.display()))?;
    catalog::articles_from_json(&feed, catalog)
        .with_context(|| format!("invalid article feed {}", path.display()))
}

pub fn load_config(path: &Path) -> Result<Configuration> {
    let doc = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration {}", path.display()))?;
    let doc: Configuration = serde_json::from_str(&doc)
        .with_context(|| format!("invalid configuration document {}", path.display()))?;
    Ok(Configuration::from_document(doc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Configuration::default();
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_rule_feed_means_no_rules() {
        assert!(load_rules(None).unwrap().is_empty());
    }

    #[test]
    fn catalog_feed_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(
            &path,
            r#"[{ "id": "G25A", "type": "cpu", "name": "CPU", "price_1": 2500 }]"#,
        )
        .unwrap();

        let catalog = load_catalog(&path).unwrap();
        assert!(catalog.get("G25A").is_some());
    }
}
