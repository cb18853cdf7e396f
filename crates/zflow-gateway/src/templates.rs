/*!
 * Device template registry.
 *
 * Device templates are multi-value descriptors keyed by device model id
 * (`manufacturerId-productId-productType`). The table is built from the
 * embedded templates, merged with an optional JSON file of the same shape,
 * and replaced as a whole on reload. Readers hold an `Arc` to the table they
 * started with.
 */
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use zflow_core::logging::operation_span;

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

/// Templates by device model id
pub type DeviceTemplates = HashMap<String, Vec<Descriptor>>;

const BUILTIN: &str = include_str!("../assets/devices.json");

/// Atomically swappable table of device templates
#[derive(Debug)]
pub struct TemplateRegistry {
    file: Option<PathBuf>,
    table: RwLock<Arc<DeviceTemplates>>,
}

impl TemplateRegistry {
    /// Registry holding the embedded templates only
    pub fn new() -> Result<Self> {
        Ok(Self {
            file: None,
            table: RwLock::new(Arc::new(load(None)?)),
        })
    }

    /// Registry merging an external template file over the embedded templates
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = path.as_ref().to_path_buf();
        let table = load(Some(&file))?;
        Ok(Self {
            file: Some(file),
            table: RwLock::new(Arc::new(table)),
        })
    }

    /// Rebuild the table and swap it in. Returns the number of device models.
    ///
    /// On error the current table stays in place.
    pub fn reload(&self) -> Result<usize> {
        let _span = operation_span("reload", "templates").entered();
        let table = load(self.file.as_deref())?;
        let models = table.len();
        let mut current = self
            .table
            .write()
            .map_err(|_| Error::template("Failed to acquire write lock on device templates"))?;
        *current = Arc::new(table);
        info!("Reloaded device templates for {} device models", models);
        Ok(models)
    }

    /// The current table
    pub fn snapshot(&self) -> Arc<DeviceTemplates> {
        match self.table.read() {
            Ok(table) => Arc::clone(&table),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Templates for a device model
    pub fn templates_for(&self, device_id: &str) -> Vec<Descriptor> {
        self.snapshot().get(device_id).cloned().unwrap_or_default()
    }
}

fn parse(source: &str, origin: &str) -> Result<DeviceTemplates> {
    serde_json::from_str(source)
        .map_err(|e| Error::template(format!("Invalid device templates in {}: {}", origin, e)))
}

fn load(file: Option<&Path>) -> Result<DeviceTemplates> {
    let mut table = parse(BUILTIN, "built-in templates")?;

    if let Some(path) = file {
        let source = fs::read_to_string(path)?;
        let external = parse(&source, &path.display().to_string())?;
        debug!("Loaded {} device models from {}", external.len(), path.display());
        table.extend(external);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::descriptor::Category;

    const EXTERNAL: &str = r#"{
        "134-100-3": [
            {"type": "switch", "object_id": "relay", "values": ["37-0-currentValue"],
             "discovery_payload": {"state_topic": "37-0-currentValue"}}
        ]
    }"#;

    #[test]
    fn test_builtin_templates() {
        let registry = TemplateRegistry::new().unwrap();
        let templates = registry.templates_for("99-12593-18756");
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].category, Category::Fan);
        assert!(registry.templates_for("0-0-0").is_empty());
    }

    #[test]
    fn test_file_merge_and_reload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{}").unwrap();

        let registry = TemplateRegistry::with_file(file.path()).unwrap();
        assert!(registry.templates_for("134-100-3").is_empty());
        let before = registry.snapshot();

        fs::write(file.path(), EXTERNAL).unwrap();
        assert_eq!(registry.reload().unwrap(), 2);
        assert_eq!(registry.templates_for("134-100-3")[0].object_id, "relay");

        // Readers keep the table they started with
        assert!(!before.contains_key("134-100-3"));
    }

    #[test]
    fn test_invalid_reload_keeps_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXTERNAL.as_bytes()).unwrap();
        let registry = TemplateRegistry::with_file(file.path()).unwrap();

        fs::write(file.path(), "not json").unwrap();
        assert!(matches!(registry.reload(), Err(Error::Template(_))));
        assert_eq!(registry.templates_for("134-100-3").len(), 1);
    }
}
