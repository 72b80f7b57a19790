// src/pipeline/presets.rs

//! The concrete pipelines behind the built-in tasks.
//!
//! Step order is part of the output contract: the unminified artifact is
//! written with its banner, then minified (which drops the banner), stamped
//! again, renamed with `.min` and written next to it.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::context::BuildContext;
use crate::errors::Result;
use crate::pipeline::style::targets_from_queries;
use crate::pipeline::{
    Autoprefix, Bundle, CompileScss, FileRecord, IgnoreImports, MarkdownToJson, MinifyCss,
    MinifyJs, Pipeline, PrependBanner, Rename, ReplaceText, Transpile, Write, read_sources,
};

/// The two bundle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleVariant {
    /// Full React build.
    Full,
    /// Lighter jQuery integration build.
    Lite,
}

impl BundleVariant {
    /// Path role holding the entry point.
    pub fn entry_role(self) -> &'static str {
        match self {
            BundleVariant::Full => "bundle_entry",
            BundleVariant::Lite => "lite_entry",
        }
    }

    /// Output file name for a product base name.
    pub fn file_name(self, product: &str) -> String {
        match self {
            BundleVariant::Full => format!("{product}.js"),
            BundleVariant::Lite => format!("{product}.jq.js"),
        }
    }

    fn config(self, ctx: &BuildContext) -> PathBuf {
        let bundle = &ctx.config.bundle;
        match self {
            BundleVariant::Full => ctx.root.join(&bundle.full_config),
            BundleVariant::Lite => ctx.root.join(&bundle.lite_config),
        }
    }
}

/// Stylesheet entry -> `<entry>.css` + `<entry>.min.css` in the routed output.
pub fn style(ctx: &BuildContext) -> Result<Pipeline> {
    let targets = targets_from_queries(&ctx.config.style.browsers)?;
    let out = ctx.routed_output()?;

    Ok(Pipeline::new("style")
        .then(ReplaceText::strip_marker(&ctx.config.style.marker)?)
        .then(CompileScss::new(vec![ctx.root.join("node_modules")]))
        .then(Autoprefix::new(targets))
        .then(PrependBanner::new(&ctx.banner))
        .then(Write::to(&out))
        .then(MinifyCss::new(targets))
        .then(PrependBanner::new(&ctx.banner))
        .then(Rename::min())
        .then(Write::to(&out)))
}

/// Verbatim font copy into `<routed output>/fonts`.
pub fn fonts(ctx: &BuildContext) -> Result<Pipeline> {
    Ok(Pipeline::new("fonts").then(Write::to(ctx.routed_output()?.join("fonts"))))
}

/// Script tree -> transpiled, unbundled module tree under `lib`.
pub fn transpile(ctx: &BuildContext) -> Result<Pipeline> {
    let cfg = &ctx.config.transpile;
    Ok(Pipeline::new("transpile")
        .then(ReplaceText::version(&ctx.package.version)?)
        .then_if(
            !cfg.ignore_imports.is_empty(),
            IgnoreImports::new(cfg.ignore_imports.clone(), cfg.extensions.clone()),
        )
        .then(Transpile::new(ctx.tools.transpiler.clone(), cfg.extensions.clone()))
        .then(Write::to(ctx.paths.resolve("lib")?)))
}

/// Entry point -> `<product>[.jq].js` + `.min.js` in `dist`.
pub fn bundle(ctx: &BuildContext, variant: BundleVariant) -> Result<Pipeline> {
    let dist = ctx.paths.resolve("dist")?;
    let name = match variant {
        BundleVariant::Full => "bundle",
        BundleVariant::Lite => "bundle-lite",
    };

    Ok(Pipeline::new(name)
        .then(Bundle::new(ctx.tools.bundler.clone(), variant.config(ctx)))
        .then(ReplaceText::version(&ctx.package.version)?)
        .then(PrependBanner::new(&ctx.banner))
        .then(Rename::To(variant.file_name(ctx.product())))
        .then(Write::to(&dist))
        .then(MinifyJs::new(ctx.tools.js_minifier.clone()))
        .then(PrependBanner::new(&ctx.banner))
        .then(Rename::min())
        .then(Write::to(&dist)))
}

/// Markdown docs -> JSON documents under `<docs_dist>/json`.
pub fn markdown(ctx: &BuildContext) -> Result<Pipeline> {
    Ok(Pipeline::new("markdown")
        .then(MarkdownToJson)
        .then(Write::to(ctx.paths.resolve("docs_dist")?.join("json"))))
}

/// Expand `role`, read the matched files and push them through `pipeline`.
pub async fn run_for_role(
    ctx: &BuildContext,
    role: &str,
    pipeline: &Pipeline,
) -> Result<Vec<FileRecord>> {
    let files = ctx.paths.expand(role)?;
    if files.is_empty() {
        warn!(role, pipeline = pipeline.name(), "no source files matched");
    }

    let records = read_sources(&files).await?;
    let out = pipeline.run(records).await?;
    info!(pipeline = pipeline.name(), files = out.len(), "pipeline finished");
    Ok(out)
}
