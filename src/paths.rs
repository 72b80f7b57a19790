// src/paths.rs

//! The path table: logical asset roles mapped to globs or directories.
//!
//! Built once at startup from the built-in defaults merged with `[paths]`,
//! immutable afterwards. Lookups of unknown roles fail with
//! [`KitforgeError::UnknownRole`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::PathValue;
use crate::errors::{KitforgeError, Result};

/// Built-in roles and their default locations.
pub const DEFAULT_ROLES: &[(&str, &str)] = &[
    ("style_entry", "scss/index.scss"),
    ("style_modules", "scss/**/*.scss"),
    ("fonts", "fonts/*"),
    ("scripts", "js/**/*"),
    ("bundle_entry", "js/react/index.js"),
    ("lite_entry", "js/jq/index.js"),
    ("docs_entry", "docs/app.js"),
    ("markdown_docs", "docs/jq/*.md"),
    ("dist", "dist"),
    ("docs_dist", "www"),
    ("lib", "lib"),
];

/// A file matched by a role's glob, with its path relative to the glob base
/// (the leading literal directory of the pattern). Outputs keep that relative
/// layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PathTable {
    root: PathBuf,
    entries: BTreeMap<String, Vec<String>>,
}

impl PathTable {
    /// Built-in roles overridden by `overrides`. Overrides may add new roles.
    pub fn new(root: impl Into<PathBuf>, overrides: &BTreeMap<String, PathValue>) -> Self {
        let mut entries: BTreeMap<String, Vec<String>> = DEFAULT_ROLES
            .iter()
            .map(|(role, loc)| (role.to_string(), vec![loc.to_string()]))
            .collect();

        for (role, value) in overrides {
            entries.insert(role.clone(), value.clone().into_vec());
        }

        Self {
            root: root.into(),
            entries,
        }
    }

    /// Project root every location is relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All `(role, locations)` pairs, sorted by role.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn contains(&self, role: &str) -> bool {
        self.entries.contains_key(role)
    }

    /// Raw locations (as configured, relative to the root) for a role.
    pub fn get(&self, role: &str) -> Result<&[String]> {
        self.entries
            .get(role)
            .map(|v| v.as_slice())
            .ok_or_else(|| KitforgeError::UnknownRole(role.to_string()))
    }

    /// First location of a role, resolved against the root. Used for
    /// directory roles (`dist`, `lib`) and single-file roles.
    pub fn resolve(&self, role: &str) -> Result<PathBuf> {
        let first = self
            .get(role)?
            .first()
            .ok_or_else(|| KitforgeError::config(format!("path role '{role}' is empty")))?;
        Ok(self.root.join(first))
    }

    /// All locations of a role resolved against the root.
    pub fn resolve_all(&self, role: &str) -> Result<Vec<PathBuf>> {
        Ok(self.get(role)?.iter().map(|p| self.root.join(p)).collect())
    }

    /// Expand every glob of a role into matching files.
    ///
    /// A literal pattern that names a missing file is an IO error; a glob
    /// with no matches yields nothing.
    pub fn expand(&self, role: &str) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        for pattern in self.get(role)? {
            files.extend(expand_pattern(&self.root, pattern)?);
        }
        debug!(role, count = files.len(), "expanded path role");
        Ok(files)
    }
}

fn is_glob_component(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// Split a pattern into its literal base directory and whether it contains
/// any glob syntax at all.
fn glob_base(pattern: &str) -> (PathBuf, bool) {
    let mut base = PathBuf::new();
    for component in pattern.split('/') {
        if is_glob_component(component) {
            return (base, true);
        }
        base.push(component);
    }
    // Literal file: base is its parent directory.
    let parent = base.parent().map(Path::to_path_buf).unwrap_or_default();
    (parent, false)
}

fn expand_pattern(root: &Path, pattern: &str) -> Result<Vec<SourceFile>> {
    let (base, is_glob) = glob_base(pattern);

    if !is_glob {
        let path = root.join(pattern);
        if !path.is_file() {
            return Err(KitforgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source file not found: {}", path.display()),
            )));
        }
        let relative = path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(pattern));
        return Ok(vec![SourceFile { path, relative }]);
    }

    let matcher = compile(pattern)?;
    let base_dir = root.join(&base);
    if !base_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&base_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| KitforgeError::Io(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel_to_root) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel_str = rel_to_root.to_string_lossy().replace('\\', "/");
        if !matcher.is_match(&rel_str) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&base_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            relative,
        });
    }

    Ok(files)
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| KitforgeError::config(format!("invalid glob pattern '{pattern}': {e}")))
}
