//! Heroku Connect object mappings (`mapping.json`).
//!
//! When a mapping is loaded, only mapped objects and their declared fields may
//! be written. Names are compared case-insensitively, as Postgres folds the
//! mapped column names to lower case.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

use crate::error::{DestinationError, MappingError};

#[derive(Debug, Deserialize)]
struct MappingDocument {
    mappings: Vec<ObjectMapping>,
    #[serde(default)]
    version: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ObjectMapping {
    object_name: String,
    config: ObjectConfig,
}

#[derive(Debug, Deserialize)]
struct ObjectConfig {
    #[serde(default)]
    fields: HashMap<String, serde_json::Value>,
}

/// Mapped objects and their writable fields.
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    /// Lower-cased object name -> lower-cased field names.
    objects: HashMap<String, HashSet<String>>,
    version: Option<u32>,
}

impl MappingCatalog {
    /// Parse a `mapping.json` document.
    pub fn from_json(raw: &str) -> Result<Self, MappingError> {
        let document: MappingDocument = serde_json::from_str(raw)?;

        let objects = document
            .mappings
            .into_iter()
            .map(|mapping| {
                let fields = mapping
                    .config
                    .fields
                    .into_keys()
                    .map(|field| field.to_lowercase())
                    .collect();
                (mapping.object_name.to_lowercase(), fields)
            })
            .collect();

        Ok(Self {
            objects,
            version: document.version,
        })
    }

    /// Read and parse a mapping file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json(&raw)?;

        info!(
            path = %path.display(),
            objects = catalog.objects.len(),
            version = ?catalog.version,
            "Loaded object mapping"
        );
        Ok(catalog)
    }

    #[must_use]
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    #[must_use]
    pub fn is_mapped(&self, object_type: &str) -> bool {
        self.objects.contains_key(&object_type.to_lowercase())
    }

    /// Ensure `object_type` is mapped and declares every one of `fields`.
    pub fn check<'a>(
        &self,
        object_type: &str,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), DestinationError> {
        let declared = self
            .objects
            .get(&object_type.to_lowercase())
            .ok_or_else(|| DestinationError::UnmappedObject(object_type.to_string()))?;

        for field in fields {
            if !declared.contains(&field.to_lowercase()) {
                return Err(DestinationError::UnmappedField {
                    object: object_type.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING: &str = r#"{
      "mappings": [
        {
          "object_name": "Contact",
          "config": {
            "access": "read_write",
            "sf_notify_enabled": true,
            "sf_polling_seconds": 600,
            "fields": {"Id": {}, "Email": {}, "FirstName": {}, "LastName": {}},
            "indexes": {"Id": {"unique": true}}
          }
        },
        {
          "object_name": "Account",
          "config": {"access": "read_write", "fields": {"Id": {}, "Name": {}}}
        }
      ],
      "version": 1
    }"#;

    #[test]
    fn test_mapped_fields_pass() {
        let catalog = MappingCatalog::from_json(MAPPING).unwrap();
        assert_eq!(catalog.version(), Some(1));
        assert!(catalog.is_mapped("contact"));
        assert!(catalog.check("Contact", ["Email", "firstname"]).is_ok());
        assert!(catalog.check("ACCOUNT", ["Name"]).is_ok());
    }

    #[test]
    fn test_unmapped_field_and_object() {
        let catalog = MappingCatalog::from_json(MAPPING).unwrap();
        assert_eq!(
            catalog.check("Account", ["Industry"]),
            Err(DestinationError::UnmappedField {
                object: "Account".to_string(),
                field: "Industry".to_string(),
            })
        );
        assert_eq!(
            catalog.check("Opportunity", ["Name"]),
            Err(DestinationError::UnmappedObject("Opportunity".to_string()))
        );
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(
            MappingCatalog::from_json(r#"{"objects": []}"#),
            Err(MappingError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, MAPPING).unwrap();

        let catalog = MappingCatalog::load(&path).unwrap();
        assert!(catalog.is_mapped("Account"));

        let missing = MappingCatalog::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, MappingError::Io { .. }));
    }
}
