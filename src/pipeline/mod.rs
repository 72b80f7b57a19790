// src/pipeline/mod.rs

//! Artifact pipelines.
//!
//! A [`Pipeline`] is a fixed, ordered list of [`Step`]s applied to a batch
//! of in-memory [`FileRecord`]s. Writes are steps too, so a pipeline can emit
//! an intermediate artifact and keep transforming it (write, minify, banner,
//! rename, write).
//!
//! - [`text`] holds the generic text steps (replace, banner, rename, write).
//! - [`style`] compiles and post-processes stylesheets.
//! - [`script`] runs the transpiler, bundler and JS minifier.
//! - [`markdown`] converts markdown docs into JSON documents.
//! - [`presets`] assembles the concrete pipelines used by the built-in tasks.

pub mod markdown;
pub mod presets;
pub mod script;
pub mod style;
pub mod text;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::Result;
use crate::paths::SourceFile;

pub use markdown::MarkdownToJson;
pub use script::{Bundle, IgnoreImports, MinifyJs, Transpile};
pub use style::{Autoprefix, CompileScss, MinifyCss};
pub use text::{PrependBanner, Rename, ReplaceText, Write};

/// One file flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Output path relative to whatever destination a `Write` step targets.
    pub relative: PathBuf,
    /// Where the record was read from, if it came from disk.
    pub source: Option<PathBuf>,
    pub contents: Vec<u8>,
}

impl FileRecord {
    pub fn new(relative: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            relative: relative.into(),
            source: None,
            contents: contents.into(),
        }
    }

    /// Contents as UTF-8, if they are text.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }

    pub fn extension(&self) -> Option<&str> {
        self.relative.extension().and_then(|e| e.to_str())
    }

    /// Directory used to resolve relative references made by this file.
    pub fn source_dir(&self) -> Option<&Path> {
        self.source.as_deref().and_then(Path::parent)
    }
}

/// A single transformation stage.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>>;
}

/// Ordered composition of steps.
pub struct Pipeline {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn then(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append a step only when `cond` holds.
    pub fn then_if(self, cond: bool, step: impl Step + 'static) -> Self {
        if cond { self.then(step) } else { self }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order. The first failing step aborts the pipeline;
    /// later steps (including later writes) never run.
    pub async fn run(&self, input: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        let mut records = input;
        for step in &self.steps {
            debug!(
                pipeline = %self.name,
                step = step.name(),
                files = records.len(),
                "applying step"
            );
            records = step.apply(records).await?;
        }
        Ok(records)
    }
}

/// Read matched source files into records.
pub async fn read_sources(files: &[SourceFile]) -> Result<Vec<FileRecord>> {
    let mut records = Vec::with_capacity(files.len());
    for file in files {
        let contents = tokio::fs::read(&file.path).await?;
        records.push(FileRecord {
            relative: file.relative.clone(),
            source: Some(file.path.clone()),
            contents,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Record {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Step for Record {
        fn name(&self) -> &str {
            self.label
        }

        async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
            self.log.lock().unwrap().push(self.label);
            if self.fail {
                return Err(crate::errors::KitforgeError::config("boom"));
            }
            Ok(records)
        }
    }

    #[tokio::test]
    async fn steps_run_in_order_and_stop_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = |label, fail| Record {
            label,
            log: Arc::clone(&log),
            fail,
        };

        let pipeline = Pipeline::new("test")
            .then(step("one", false))
            .then(step("two", true))
            .then(step("three", false));

        assert_eq!(pipeline.step_names(), vec!["one", "two", "three"]);
        assert!(pipeline.run(vec![FileRecord::new("a", "x")]).await.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["one", "two"]);
    }
}
