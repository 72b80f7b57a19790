#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;
use walkdir::WalkDir;

use kitforge::banner::{Clock, FixedClock};
use kitforge::config::{ConfigFile, load_and_validate};
use kitforge::context::BuildContext;
use kitforge::env::BuildMode;

pub const PACKAGE_JSON: &str = r#"{
  "name": "@acme/kit",
  "title": "Kit",
  "version": "1.2.3",
  "license": "MIT",
  "author": { "name": "Kit Team" }
}
"#;

/// External tools replaced by `cat`, so bundling and transpiling are
/// identity transforms over the entry / source text.
pub const KITFORGE_TOML: &str = r#"
[project]
product = "kit"

[paths]
style_entry = ["scss/kit.scss", "scss/kit.theme.scss"]

[banner]
holder = "Acme Inc."

[tools]
bundler = "cat {entry}"
transpiler = "cat"
js_minifier = "cat"

[server]
port = 3999
"#;

const KIT_SCSS: &str = r##"// INJECT_SASS_VAR$font-path: "fonts";
@import "variables";
@import "button";
@import "button";

@font-face {
  font-family: "Kit";
  src: url("#{$font-path}/kit.woff");
}

.kit {
  font-family: $font-family;
}
"##;

const THEME_SCSS: &str = r#"@import "variables";

.kit-theme {
  background: $primary;
}
"#;

const VARIABLES_SCSS: &str = r#"$primary: #3366ff !default;
$font-family: "Kit", sans-serif !default;
"#;

const BUTTON_SCSS: &str = r#"@import "variables";

.kit-button {
  color: $primary;
  display: flex;
}
"#;

const MARKDOWN_DOC: &str = r#"# Button

Buttons trigger actions.

## Usage

| option | default |
|--------|---------|
| size   | `md`    |

## Events
"#;

fn fixed_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0)
        .single()
        .expect("valid fixed instant")
}

/// 2024-05-17T08:30:00Z
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(fixed_instant()))
}

/// Starts at the fixed instant and moves one second forward on every read.
pub struct TickingClock(Mutex<DateTime<Utc>>);

impl TickingClock {
    pub fn new() -> Self {
        Self(Mutex::new(fixed_instant()))
    }
}

impl Default for TickingClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut at = self.0.lock().expect("clock lock poisoned");
        let now = *at;
        *at += TimeDelta::seconds(1);
        now
    }
}

/// A throwaway project directory.
pub struct Project {
    dir: TempDir,
}

impl Project {
    /// Only a package manifest; enough for a build context.
    pub fn empty() -> io::Result<Self> {
        let project = Self {
            dir: tempfile::tempdir()?,
        };
        project.write("package.json", PACKAGE_JSON)?;
        Ok(project)
    }

    /// A small component library: two stylesheet entries sharing partials,
    /// fonts, a script tree with both bundle entries, a docs app and
    /// markdown docs.
    pub fn component_library() -> io::Result<Self> {
        let project = Self::empty()?;
        project.write("Kitforge.toml", KITFORGE_TOML)?;

        project.write("scss/kit.scss", KIT_SCSS)?;
        project.write("scss/kit.theme.scss", THEME_SCSS)?;
        project.write("scss/_variables.scss", VARIABLES_SCSS)?;
        project.write("scss/_button.scss", BUTTON_SCSS)?;

        project.write_bytes("fonts/kit.woff", &[0x77, 0x4f, 0x46, 0x46, 0x00, 0x01])?;
        project.write_bytes("fonts/kit.woff2", &[0x77, 0x4f, 0x46, 0x32, 0xff])?;

        project.write(
            "js/react/index.js",
            "export const VERSION = \"__VERSION__\";\nexport default function Kit() {}\n",
        )?;
        project.write("js/jq/index.js", "window.kitVersion = \"__VERSION__\";\n")?;
        project.write("js/util/format.js", "export const format = (s) => s.trim();\n")?;

        project.write("docs/app.js", "console.log(\"docs\");\n")?;
        project.write("docs/jq/button.md", MARKDOWN_DOC)?;
        project.write("docs/jq/drafts/wip.md", "# Not published\n")?;

        Ok(project)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) -> io::Result<()> {
        self.write_bytes(rel, contents.as_bytes())
    }

    pub fn write_bytes(&self, rel: &str, contents: &[u8]) -> io::Result<()> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    pub fn read(&self, rel: &str) -> io::Result<String> {
        fs::read_to_string(self.path(rel))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    /// Every file below `rel`, relative to it, with `/` separators, sorted.
    /// A missing directory yields nothing.
    pub fn files_under(&self, rel: &str) -> Vec<String> {
        let base = self.path(rel);
        let mut out: Vec<String> = WalkDir::new(&base)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&base)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        out.sort();
        out
    }

    /// `Kitforge.toml` if present, defaults otherwise.
    pub fn config(&self) -> anyhow::Result<ConfigFile> {
        load_and_validate(self.path("Kitforge.toml"))
    }

    /// Build context in `mode` with the fixed clock.
    pub fn context(&self, mode: BuildMode) -> anyhow::Result<BuildContext> {
        self.context_with_clock(mode, fixed_clock())
    }

    pub fn context_with_clock(
        &self,
        mode: BuildMode,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<BuildContext> {
        Ok(BuildContext::with_mode(self.root(), self.config()?, mode, clock)?)
    }
}
