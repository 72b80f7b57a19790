// src/pipeline/style.rs

//! Stylesheet steps: SCSS compilation (`grass`), vendor prefixing and
//! minification (`lightningcss`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use crate::errors::{KitforgeError, Result};
use crate::pipeline::{FileRecord, Step};

/// `grass` filesystem that hands out each file's contents only once per
/// compilation; later imports of the same file resolve to nothing.
#[derive(Debug, Default)]
struct ImportOnceFs {
    seen: Mutex<HashSet<PathBuf>>,
}

impl grass::Fs for ImportOnceFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let first_time = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key);

        if first_time {
            std::fs::read(path)
        } else {
            Ok(Vec::new())
        }
    }
}

/// Compile SCSS to expanded CSS; imports of an already-imported file are
/// skipped. Output records get a `.css` extension.
#[derive(Debug, Clone, Default)]
pub struct CompileScss {
    load_paths: Vec<PathBuf>,
}

impl CompileScss {
    pub fn new(load_paths: Vec<PathBuf>) -> Self {
        Self { load_paths }
    }
}

/// Compile one stylesheet source. `base_dir` anchors relative imports.
pub fn compile_scss(source: &str, base_dir: Option<&Path>, load_paths: &[PathBuf]) -> std::result::Result<String, String> {
    let fs = ImportOnceFs::default();
    let mut options = grass::Options::default()
        .style(grass::OutputStyle::Expanded)
        .fs(&fs);
    if let Some(dir) = base_dir {
        options = options.load_path(dir);
    }
    for path in load_paths {
        options = options.load_path(path);
    }
    grass::from_string(source.to_string(), &options).map_err(|e| e.to_string())
}

#[async_trait]
impl Step for CompileScss {
    fn name(&self) -> &str {
        "compile-scss"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        let load_paths = self.load_paths.clone();

        tokio::task::spawn_blocking(move || {
            records
                .into_iter()
                .map(|mut record| {
                    let display = record.relative.display().to_string();
                    let source = record
                        .text()
                        .ok_or_else(|| KitforgeError::style(&display, "stylesheet is not UTF-8"))?;
                    let css = compile_scss(source, record.source_dir(), &load_paths)
                        .map_err(|e| KitforgeError::style(&display, e))?;
                    record.contents = css.into_bytes();
                    record.relative.set_extension("css");
                    Ok(record)
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| KitforgeError::Other(e.into()))?
    }
}

/// Resolve browserslist queries into lightningcss targets.
pub fn targets_from_queries(queries: &[String]) -> Result<Targets> {
    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| KitforgeError::config(format!("invalid browser queries {queries:?}: {e}")))?;
    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

fn process_css(css: &str, targets: Targets, minify: bool) -> std::result::Result<String, String> {
    let mut sheet = StyleSheet::parse(css, ParserOptions::default()).map_err(|e| e.to_string())?;
    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| e.to_string())?;
    let out = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;
    Ok(out.code)
}

fn map_css(
    records: Vec<FileRecord>,
    targets: Targets,
    minify: bool,
) -> Result<Vec<FileRecord>> {
    records
        .into_iter()
        .map(|mut record| {
            let display = record.relative.display().to_string();
            let css = record
                .text()
                .ok_or_else(|| KitforgeError::style(&display, "stylesheet is not UTF-8"))?;
            let out = process_css(css, targets, minify).map_err(|e| KitforgeError::style(&display, e))?;
            record.contents = out.into_bytes();
            Ok(record)
        })
        .collect()
}

/// Add vendor prefixes for the configured browser targets, keeping the
/// output readable.
#[derive(Debug, Clone)]
pub struct Autoprefix {
    targets: Targets,
}

impl Autoprefix {
    pub fn new(targets: Targets) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Step for Autoprefix {
    fn name(&self) -> &str {
        "autoprefix"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        map_css(records, self.targets, false)
    }
}

/// Minify CSS. Comments, including any banner, are dropped.
#[derive(Debug, Clone)]
pub struct MinifyCss {
    targets: Targets,
}

impl MinifyCss {
    pub fn new(targets: Targets) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Step for MinifyCss {
    fn name(&self) -> &str {
        "minify-css"
    }

    async fn apply(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        map_css(records, self.targets, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn duplicate_imports_are_included_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("_button.scss"), ".btn { color: red; }\n").unwrap();
        let source = "@import 'button';\n@import 'button';\n.x { margin: 0; }\n";

        let css = compile_scss(source, Some(dir.path()), &[]).unwrap();
        assert_eq!(css.matches(".btn").count(), 1, "css was: {css}");
        assert!(css.contains(".x"));
    }

    #[test]
    fn compile_error_is_reported() {
        let err = compile_scss(".a { color: ; ", None, &[]).unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn minify_drops_comments_and_whitespace() {
        let targets = targets_from_queries(&["last 2 versions".to_string()]).unwrap();
        let out = process_css("/** banner */\n.a {\n  color: red;\n}\n", targets, true).unwrap();
        assert!(!out.contains("banner"));
        assert!(!out.contains('\n'));
        assert!(out.contains(".a{color:red}"));
    }

    #[test]
    fn old_browser_targets_get_prefixes() {
        let targets = targets_from_queries(&["ie 10".to_string(), "safari 6".to_string()]).unwrap();
        let out = process_css(".a { user-select: none; }", targets, false).unwrap();
        assert!(out.contains("-webkit-user-select"), "got: {out}");
    }
}
