// src/banner.rs

//! Banner comment prepended to emitted CSS/JS artifacts.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::package::PackageMeta;

/// Source of "now" for banner timestamps. Injected so builds can be
/// reproduced with a frozen clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Banner text for one build. The instant is read from the clock once, when
/// the banner is created, so every artifact of the build carries the same
/// stamp.
#[derive(Debug, Clone)]
pub struct Banner {
    title: String,
    version: String,
    license: String,
    author: String,
    holder: String,
    stamped_at: DateTime<Utc>,
}

impl Banner {
    pub fn new(
        meta: &PackageMeta,
        author: Option<String>,
        holder: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let author = author
            .or_else(|| meta.author.clone())
            .unwrap_or_else(|| format!("{} authors", meta.title));
        let holder = holder.unwrap_or_else(|| author.clone());

        Self {
            title: meta.title.clone(),
            version: meta.version.clone(),
            license: meta.license.clone(),
            author,
            holder,
            stamped_at: clock.now(),
        }
    }

    /// The instant stamped into every rendering.
    pub fn stamped_at(&self) -> DateTime<Utc> {
        self.stamped_at
    }

    /// Render the banner for the build's instant.
    pub fn render(&self) -> String {
        self.render_at(self.stamped_at)
    }

    /// Render the banner for a given instant.
    ///
    /// The year is UTC; the timestamp is ISO-8601 with offset.
    pub fn render_at(&self, at: DateTime<Utc>) -> String {
        format!(
            "/** {title} v{version} | by {author}\n  * (c) {year} {holder}, Licensed under {license}\n  * {stamp}\n  */\n  ",
            title = self.title,
            version = self.version,
            author = self.author,
            year = at.format("%Y"),
            holder = self.holder,
            license = self.license,
            stamp = at.format("%Y-%m-%dT%H:%M:%S%z"),
        )
    }
}
