use crate::error::{PipelineError, Result};
use crate::processor::PackSizeOrder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ORDER_FILE_NAME: &str = "pack_size_order.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackSizeOrderDocument {
    pub pack_size_order: Vec<String>,
}

/// Source of the per-(brand, analysis) pack-size ordering.
pub trait PackSizeOrderStore {
    fn load(&self, brand: &str, analysis_id: &str) -> Result<Option<PackSizeOrder>>;
    fn save(&self, brand: &str, analysis_id: &str, order: &PackSizeOrder) -> Result<()>;
}

/// Parse a `{"pack_size_order": [...]}` document. An empty list counts as no
/// order at all.
pub fn parse_order_document(json: &str) -> Result<Option<PackSizeOrder>> {
    let document: PackSizeOrderDocument =
        serde_json::from_str(json).map_err(|e| PipelineError::PackSizeOrder(e.to_string()))?;
    let order = PackSizeOrder::new(&document.pack_size_order);
    if order.is_empty() {
        Ok(None)
    } else {
        Ok(Some(order))
    }
}

/// Stores each order at `{root}/{brand}/{analysis_id}/pack_size_order.json`.
pub struct JsonPackSizeOrderStore {
    root: PathBuf,
}

impl JsonPackSizeOrderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonPackSizeOrderStore { root: root.into() }
    }

    pub fn path_for(&self, brand: &str, analysis_id: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(path_segment(brand)?)
            .join(path_segment(analysis_id)?)
            .join(ORDER_FILE_NAME))
    }
}

fn path_segment(value: &str) -> Result<&str> {
    let value = value.trim();
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
    {
        return Err(PipelineError::PackSizeOrder(format!(
            "'{}' cannot be used as a key",
            value
        )));
    }
    Ok(value)
}

impl PackSizeOrderStore for JsonPackSizeOrderStore {
    fn load(&self, brand: &str, analysis_id: &str) -> Result<Option<PackSizeOrder>> {
        let path = self.path_for(brand, analysis_id)?;
        if !Path::new(&path).exists() {
            debug!("No pack size order at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let order = parse_order_document(&content)?;
        match &order {
            Some(order) => info!(
                "Loaded pack size order for {}/{}: {}",
                brand,
                analysis_id,
                order.labels().join(" < ")
            ),
            None => debug!("Pack size order at {} is empty", path.display()),
        }
        Ok(order)
    }

    fn save(&self, brand: &str, analysis_id: &str, order: &PackSizeOrder) -> Result<()> {
        let path = self.path_for(brand, analysis_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let document = PackSizeOrderDocument {
            pack_size_order: order.labels().to_vec(),
        };
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        info!("Saved pack size order to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("pack-size-order-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_parse_document() {
        let order = parse_order_document(r#"{"pack_size_order": ["Sachet", "150-250 ml"]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(order.labels(), &["Sachet".to_string(), "150-250ML".to_string()]);

        assert_eq!(parse_order_document(r#"{"pack_size_order": []}"#).unwrap(), None);
        assert!(matches!(
            parse_order_document(r#"{"order": 1}"#),
            Err(PipelineError::PackSizeOrder(_))
        ));
    }

    #[test]
    fn test_missing_file_is_none() {
        let store = JsonPackSizeOrderStore::new(temp_root());
        assert_eq!(store.load("NTW", "analysis-1").unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let root = temp_root();
        let store = JsonPackSizeOrderStore::new(&root);
        let order = PackSizeOrder::new(["Sachet", "150-250ML", "251-500ML"]);

        store.save("NTW", "analysis-1", &order).unwrap();
        assert_eq!(store.load("NTW", "analysis-1").unwrap(), Some(order));
        assert_eq!(store.load("NTW", "analysis-2").unwrap(), None);

        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let store = JsonPackSizeOrderStore::new(temp_root());
        assert!(store.load("../NTW", "a").is_err());
        assert!(store.load("NTW", "").is_err());
    }
}
