// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from `Kitforge.toml`.
///
/// ```toml
/// [project]
/// manifest = "package.json"
///
/// [paths]
/// style_entry = "scss/kit.scss"
/// fonts = "fonts/*"
///
/// [watch]
/// triggered_while_running_behaviour = "queue"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub project: ProjectSection,

    /// Path Table overrides from `[paths]`; merged over the built-in roles.
    #[serde(default)]
    pub paths: BTreeMap<String, PathValue>,

    #[serde(default)]
    pub banner: BannerSection,

    #[serde(default)]
    pub style: StyleSection,

    #[serde(default)]
    pub tools: ToolsSection,

    #[serde(default)]
    pub bundle: BundleSection,

    #[serde(default)]
    pub transpile: TranspileSection,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub watch: WatchSection,
}

/// A path table value: either a single glob/dir or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PathValue {
    One(String),
    Many(Vec<String>),
}

impl PathValue {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            PathValue::One(s) => vec![s],
            PathValue::Many(v) => v,
        }
    }
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Package metadata file (JSON), relative to the project root.
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Base filename for emitted artifacts; falls back to the package name.
    #[serde(default)]
    pub product: Option<String>,

    /// Environment variable holding the build mode.
    #[serde(default = "default_env_var")]
    pub env_var: String,
}

fn default_manifest() -> String {
    "package.json".to_string()
}

fn default_env_var() -> String {
    "NODE_ENV".to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            product: None,
            env_var: default_env_var(),
        }
    }
}

/// `[banner]` section. Both fields fall back to the package author.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BannerSection {
    #[serde(default)]
    pub author: Option<String>,

    /// Copyright holder printed after the year.
    #[serde(default)]
    pub holder: Option<String>,
}

/// `[style]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StyleSection {
    /// Marker comment stripped from the stylesheet entry before compiling.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Browserslist queries used for vendor prefixing.
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
}

fn default_marker() -> String {
    "// INJECT_SASS_VAR".to_string()
}

fn default_browsers() -> Vec<String> {
    vec![
        "> 1%".to_string(),
        "last 2 versions".to_string(),
        "ie 10".to_string(),
    ]
}

impl Default for StyleSection {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            browsers: default_browsers(),
        }
    }
}

/// `[tools]` section: shell command templates for external collaborators.
///
/// Placeholders are substituted with shell-quoted values:
/// - bundler: `{entry}`, `{config}`, `{output}`, `{output_dir}`, `{output_name}`
/// - transpiler: `{file}` (source on stdin, result on stdout)
/// - js_minifier: none (source on stdin, result on stdout)
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_bundler")]
    pub bundler: String,

    #[serde(default = "default_transpiler")]
    pub transpiler: String,

    #[serde(default = "default_js_minifier")]
    pub js_minifier: String,
}

fn default_bundler() -> String {
    "npx webpack --config {config} --entry {entry} --output-path {output_dir} --output-filename {output_name}"
        .to_string()
}

fn default_transpiler() -> String {
    "npx babel --filename {file}".to_string()
}

fn default_js_minifier() -> String {
    "npx uglifyjs --compress --mangle".to_string()
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            bundler: default_bundler(),
            transpiler: default_transpiler(),
            js_minifier: default_js_minifier(),
        }
    }
}

/// `[bundle]` section: bundler configuration file per bundle variant.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleSection {
    #[serde(default = "default_full_config")]
    pub full_config: String,

    #[serde(default = "default_lite_config")]
    pub lite_config: String,

    #[serde(default = "default_docs_config")]
    pub docs_config: String,
}

fn default_full_config() -> String {
    "webpack.config.js".to_string()
}

fn default_lite_config() -> String {
    "webpack.config.jq.js".to_string()
}

fn default_docs_config() -> String {
    "webpack.docs.js".to_string()
}

impl Default for BundleSection {
    fn default() -> Self {
        Self {
            full_config: default_full_config(),
            lite_config: default_lite_config(),
            docs_config: default_docs_config(),
        }
    }
}

/// `[transpile]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TranspileSection {
    /// Extensions handed to the transpiler; everything else is copied as-is.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Import specifier suffixes (e.g. `".scss"`) whose import statements are
    /// commented out before transpiling. Empty by default.
    #[serde(default)]
    pub ignore_imports: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["js".to_string(), "jsx".to_string(), "mjs".to_string()]
}

impl Default for TranspileSection {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_imports: Vec::new(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// URL prefix under which the in-memory dev bundle is served.
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// File name of the in-memory dev bundle.
    #[serde(default = "default_bundle_name")]
    pub bundle_name: String,

    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_public_path() -> String {
    "/".to_string()
}

fn default_bundle_name() -> String {
    "app.js".to_string()
}

fn default_log_prefix() -> String {
    "KIT".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_path: default_public_path(),
            bundle_name: default_bundle_name(),
            log_prefix: default_log_prefix(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// `"queue"` or `"cancel"`.
    ///
    /// - `"queue"` (default): remember triggers and rebuild after the current
    ///   rebuild finishes.
    /// - `"cancel"`: drop any queued rebuild and only keep the latest trigger.
    #[serde(default = "default_triggered_while_running_behaviour")]
    pub triggered_while_running_behaviour: String,

    /// Maximum number of queued rebuild batches to remember.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,

    /// Watch bindings; when absent the built-in bindings are used.
    #[serde(default, rename = "binding")]
    pub bindings: Option<Vec<BindingConfig>>,
}

fn default_triggered_while_running_behaviour() -> String {
    "queue".to_string()
}

fn default_queue_length() -> usize {
    1
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            triggered_while_running_behaviour: default_triggered_while_running_behaviour(),
            queue_length: default_queue_length(),
            bindings: None,
        }
    }
}

/// `[[watch.binding]]`: re-run `task` whenever a file under the globs of
/// path role `role` changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BindingConfig {
    pub role: String,
    pub task: String,
}

impl WatchSection {
    /// Effective bindings: configured ones, or the built-in pair.
    pub fn effective_bindings(&self) -> Vec<BindingConfig> {
        match &self.bindings {
            Some(list) => list.clone(),
            None => vec![
                BindingConfig {
                    role: "style_modules".to_string(),
                    task: "style:scss".to_string(),
                },
                BindingConfig {
                    role: "markdown_docs".to_string(),
                    task: "jq:md2json".to_string(),
                },
            ],
        }
    }
}
