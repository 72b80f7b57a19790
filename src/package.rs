// src/package.rs

//! Package metadata (`package.json`) used for banners, version substitution
//! and the product filename.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::errors::{KitforgeError, Result};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$")
        .expect("version regex is valid")
});

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: String,
    #[serde(default)]
    title: Option<String>,
    version: String,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    author: Option<serde_json::Value>,
}

/// Validated package metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMeta {
    pub name: String,
    /// Human-readable title; falls back to `name`.
    pub title: String,
    pub version: String,
    pub license: String,
    pub author: Option<String>,
}

impl PackageMeta {
    /// Read and validate the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KitforgeError::config(format!(
                "reading package manifest {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate manifest JSON text.
    pub fn from_json(contents: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(contents)?;

        if !VERSION_RE.is_match(raw.version.trim()) {
            return Err(KitforgeError::config(format!(
                "malformed package version '{}'",
                raw.version
            )));
        }

        let author = raw.author.and_then(|value| match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(map) => map
                .get("name")
                .and_then(|n| n.as_str())
                .map(str::to_string),
            _ => None,
        });

        Ok(Self {
            title: raw.title.unwrap_or_else(|| raw.name.clone()),
            name: raw.name,
            version: raw.version.trim().to_string(),
            license: raw.license.unwrap_or_else(|| "UNLICENSED".to_string()),
            author,
        })
    }

    /// Base filename for emitted artifacts: the package name without any
    /// npm scope.
    pub fn product_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_with_author_object() {
        let meta = PackageMeta::from_json(
            r#"{"name":"@acme/kit","title":"Acme Kit","version":"2.1.0","license":"MIT","author":{"name":"Acme Team"}}"#,
        )
        .unwrap();
        assert_eq!(meta.title, "Acme Kit");
        assert_eq!(meta.author.as_deref(), Some("Acme Team"));
        assert_eq!(meta.product_name(), "kit");
    }

    #[test]
    fn title_and_license_fall_back() {
        let meta = PackageMeta::from_json(r#"{"name":"kit","version":"1.0.0-beta.2"}"#).unwrap();
        assert_eq!(meta.title, "kit");
        assert_eq!(meta.license, "UNLICENSED");
    }

    #[test]
    fn malformed_version_fails_fast() {
        let err = PackageMeta::from_json(r#"{"name":"kit","version":"one"}"#).unwrap_err();
        assert!(matches!(err, KitforgeError::Config(_)));
    }
}
