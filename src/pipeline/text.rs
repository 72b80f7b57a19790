// src/pipeline/text.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::{NoExpand, Regex};
use tracing::debug;

use crate::banner::Banner;
use crate::errors::{KitforgeError, Result};
use crate::pipeline::{FileRecord, Step};

/// Token replaced with the package version in script sources and bundles.
pub const VERSION_PLACEHOLDER: &str = "__VERSION__";

/// Regex replacement over text records; binary records pass through.
#[derive(Debug, Clone)]
pub struct ReplaceText {
    name: String,
    pattern: Regex,
    replacement: String,
}

impl ReplaceText {
    pub fn new(name: impl Into<String>, pattern: Regex, replacement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern,
            replacement: replacement.into(),
        }
    }

    /// Replace every literal occurrence of `needle`.
    pub fn literal(name: impl Into<String>, needle: &str, replacement: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(&regex::escape(needle))
            .map_err(|e| KitforgeError::config(format!("invalid literal pattern: {e}")))?;
        Ok(Self::new(name, pattern, replacement))
    }

    /// Substitute [`VERSION_PLACEHOLDER`] with `version`.
    pub fn version(version: &str) -> Result<Self> {
        Self::literal("replace-version", VERSION_PLACEHOLDER, version)
    }

    /// Remove the injection marker. A line written as
    /// `// INJECT_SASS_VAR $font-path: "../fonts";` becomes a live declaration.
    pub fn strip_marker(marker: &str) -> Result<Self> {
        Self::literal("strip-marker", marker, "")
    }

    pub fn apply_str(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, NoExpand(&self.replacement))
            .into_owned()
    }
}

#[async_trait]
impl Step for ReplaceText {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        Ok(records
            .into_iter()
            .map(|mut record| {
                if let Some(text) = record.text() {
                    let replaced = self.apply_str(text);
                    record.contents = replaced.into_bytes();
                }
                record
            })
            .collect())
    }
}

/// Prepend the generated banner.
#[derive(Debug, Clone)]
pub struct PrependBanner {
    text: String,
}

impl PrependBanner {
    pub fn new(banner: &Banner) -> Self {
        Self {
            text: banner.render(),
        }
    }
}

#[async_trait]
impl Step for PrependBanner {
    fn name(&self) -> &str {
        "banner"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        Ok(records
            .into_iter()
            .map(|mut record| {
                let mut contents = self.text.clone().into_bytes();
                contents.extend_from_slice(&record.contents);
                record.contents = contents;
                record
            })
            .collect())
    }
}

/// Output renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rename {
    /// Insert a suffix before the extension: `kit.css` -> `kit.min.css`.
    Suffix(String),
    /// Replace the file name, keeping the directory.
    To(String),
    /// Replace the extension.
    Extension(String),
}

impl Rename {
    pub fn min() -> Self {
        Rename::Suffix(".min".to_string())
    }

    pub fn rename(&self, path: &Path) -> PathBuf {
        match self {
            Rename::Suffix(suffix) => {
                let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
                let name = match path.extension() {
                    Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
                    None => format!("{stem}{suffix}"),
                };
                path.with_file_name(name)
            }
            Rename::To(name) => path.with_file_name(name),
            Rename::Extension(ext) => path.with_extension(ext),
        }
    }
}

#[async_trait]
impl Step for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        Ok(records
            .into_iter()
            .map(|mut record| {
                record.relative = self.rename(&record.relative);
                record
            })
            .collect())
    }
}

/// Write every record under `dest` and pass the records through unchanged.
#[derive(Debug, Clone)]
pub struct Write {
    dest: PathBuf,
}

impl Write {
    pub fn to(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }
}

#[async_trait]
impl Step for Write {
    fn name(&self) -> &str {
        "write"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        for record in &records {
            let target = self.dest.join(&record.relative);
            if let Some(dir) = target.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&target, &record.contents).await?;
            debug!(path = %target.display(), bytes = record.contents.len(), "wrote file");
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_substitution_replaces_every_occurrence_and_nothing_else() {
        let step = ReplaceText::version("1.4.0").unwrap();
        let out = step.apply_str("v=__VERSION__; x = '__VERSION__'; __VERSION_");
        assert_eq!(out, "v=1.4.0; x = '1.4.0'; __VERSION_");
        assert_eq!(step.apply_str(&out), out);
    }

    #[test]
    fn replacement_is_not_a_capture_template() {
        let step = ReplaceText::version("$1.0.0").unwrap();
        assert_eq!(step.apply_str("__VERSION__"), "$1.0.0");
    }

    #[test]
    fn marker_is_removed_and_injected_line_kept() {
        let step = ReplaceText::strip_marker("// INJECT_SASS_VAR").unwrap();
        let out = step.apply_str("$a: 1;\n// INJECT_SASS_VAR$font-path: '../fonts';\n@import 'b';\n");
        assert_eq!(out, "$a: 1;\n$font-path: '../fonts';\n@import 'b';\n");
    }

    #[test]
    fn rename_variants() {
        assert_eq!(Rename::min().rename(Path::new("kit.css")), PathBuf::from("kit.min.css"));
        assert_eq!(Rename::min().rename(Path::new("kit.jq.js")), PathBuf::from("kit.jq.min.js"));
        assert_eq!(
            Rename::To("kit.js".into()).rename(Path::new("react/index.js")),
            PathBuf::from("react/kit.js")
        );
        assert_eq!(
            Rename::Extension("json".into()).rename(Path::new("a/b.md")),
            PathBuf::from("a/b.json")
        );
    }

    #[tokio::test]
    async fn binary_records_pass_through_replace() {
        let step = ReplaceText::version("1.0.0").unwrap();
        let bytes = vec![0xff, 0xfe, b'_'];
        let out = step.apply(vec![FileRecord::new("f.woff", bytes.clone())]).await.unwrap();
        assert_eq!(out[0].contents, bytes);
    }
}
