// src/pipeline/script.rs

//! Script steps backed by external tools: transpiling, bundling and JS
//! minification, plus the import filter applied before transpiling.

use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::errors::{KitforgeError, Result};
use crate::exec::ToolCommand;
use crate::exec::tool::path_arg;
use crate::pipeline::{FileRecord, Step};

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:import\s+(?:[^'"]*?\s+from\s+)?|(?:const|let|var)\s+[^=]+=\s*require\(\s*|require\(\s*)['"]([^'"]+)['"]"#,
    )
    .expect("import regex is valid")
});

/// Comment out import/require statements whose specifier ends with one of
/// the configured suffixes. With no suffixes this step is a no-op.
#[derive(Debug, Clone)]
pub struct IgnoreImports {
    suffixes: Vec<String>,
    extensions: Vec<String>,
}

impl IgnoreImports {
    pub fn new(suffixes: Vec<String>, extensions: Vec<String>) -> Self {
        Self {
            suffixes,
            extensions,
        }
    }

    pub fn filter_source(&self, source: &str) -> String {
        if self.suffixes.is_empty() {
            return source.to_string();
        }

        let mut out = String::with_capacity(source.len());
        for line in source.split_inclusive('\n') {
            let ignored = IMPORT_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .is_some_and(|spec| self.suffixes.iter().any(|s| spec.as_str().ends_with(s.as_str())));
            if ignored {
                out.push_str("// ");
            }
            out.push_str(line);
        }
        out
    }
}

#[async_trait]
impl Step for IgnoreImports {
    fn name(&self) -> &str {
        "ignore-imports"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        Ok(records
            .into_iter()
            .map(|mut record| {
                let eligible = record
                    .extension()
                    .is_some_and(|ext| self.extensions.iter().any(|e| e == ext));
                if eligible {
                    if let Some(text) = record.text() {
                        record.contents = self.filter_source(text).into_bytes();
                    }
                }
                record
            })
            .collect())
    }
}

/// Run the transpiler over every record with a transpilable extension;
/// other files are copied through verbatim.
#[derive(Debug, Clone)]
pub struct Transpile {
    tool: ToolCommand,
    extensions: Vec<String>,
}

impl Transpile {
    pub fn new(tool: ToolCommand, extensions: Vec<String>) -> Self {
        Self { tool, extensions }
    }
}

#[async_trait]
impl Step for Transpile {
    fn name(&self) -> &str {
        "transpile"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        let mut out = Vec::with_capacity(records.len());
        for mut record in records {
            let eligible = record
                .extension()
                .is_some_and(|ext| self.extensions.iter().any(|e| e == ext));
            if eligible {
                let file = record
                    .source
                    .as_deref()
                    .map(path_arg)
                    .unwrap_or_else(|| path_arg(&record.relative));
                debug!(file = %file, "transpiling");
                record.contents = self.tool.run(&[("file", &file)], Some(&record.contents)).await?;
            }
            out.push(record);
        }
        Ok(out)
    }
}

/// Bundle each entry record with the bundler and the given bundler config.
#[derive(Debug, Clone)]
pub struct Bundle {
    tool: ToolCommand,
    config: PathBuf,
}

impl Bundle {
    pub fn new(tool: ToolCommand, config: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            config: config.into(),
        }
    }

    /// Bundle a single entry file and return the bundle text.
    pub async fn bundle_entry(&self, entry: &std::path::Path) -> Result<Vec<u8>> {
        let entry = path_arg(entry);
        let config = path_arg(&self.config);
        self.tool
            .run(&[("entry", &entry), ("config", &config)], None)
            .await
    }
}

#[async_trait]
impl Step for Bundle {
    fn name(&self) -> &str {
        "bundle"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        let mut out = Vec::with_capacity(records.len());
        for mut record in records {
            let entry = record.source.clone().ok_or_else(|| {
                KitforgeError::config(format!(
                    "bundle entry {} has no source path",
                    record.relative.display()
                ))
            })?;
            record.contents = self.bundle_entry(&entry).await?;
            out.push(record);
        }
        Ok(out)
    }
}

/// Minify JavaScript with the external minifier (stdin -> stdout).
#[derive(Debug, Clone)]
pub struct MinifyJs {
    tool: ToolCommand,
}

impl MinifyJs {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl Step for MinifyJs {
    fn name(&self) -> &str {
        "minify-js"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        let mut out = Vec::with_capacity(records.len());
        for mut record in records {
            record.contents = self.tool.run(&[], Some(&record.contents)).await?;
            out.push(record);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(suffixes: &[&str]) -> IgnoreImports {
        IgnoreImports::new(
            suffixes.iter().map(|s| s.to_string()).collect(),
            vec!["js".to_string()],
        )
    }

    #[test]
    fn comments_out_matching_imports_only() {
        let src = "import '../scss/components/button.scss';\nimport React from 'react';\nconst s = require(\"./x.scss\");\n";
        let out = filter(&[".scss"]).filter_source(src);
        assert_eq!(
            out,
            "// import '../scss/components/button.scss';\nimport React from 'react';\n// const s = require(\"./x.scss\");\n"
        );
    }

    #[test]
    fn empty_rule_list_leaves_source_untouched() {
        let src = "import './a.scss';\n";
        assert_eq!(filter(&[]).filter_source(src), src);
    }

    #[tokio::test]
    async fn transpile_skips_non_script_files() {
        let step = Transpile::new(
            ToolCommand::new("upper", "tr a-z A-Z", "."),
            vec!["js".to_string()],
        );
        let out = step
            .apply(vec![
                FileRecord::new("a.js", "abc"),
                FileRecord::new("b.css", "abc"),
            ])
            .await
            .unwrap();
        assert_eq!(out[0].contents, b"ABC");
        assert_eq!(out[1].contents, b"abc");
    }
}
