//! Page host abstraction.
//!
//! A [`BrowserHost`] opens and closes pages and publishes their lifecycle
//! events; a [`PageDriver`] is the in-page handle the automation run uses to
//! read snapshots and simulate interaction. The heuristics never touch a
//! driver, only the [`PageSnapshot`] it returns.

pub mod dom;
pub mod fixture;
pub mod sim;

#[cfg(feature = "browser")]
pub mod chrome;

pub use dom::{Node, NodeId, PageSnapshot, Rect};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::store::Severity;

/// Opaque reference to an open page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageHandle(String);

impl PageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable reference to one element inside a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Page lifecycle signal published by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// The page finished loading. May fire more than once per page.
    LoadComplete(PageHandle),
    /// The page went away.
    Closed(PageHandle),
}

impl PageEvent {
    pub fn handle(&self) -> &PageHandle {
        match self {
            Self::LoadComplete(h) | Self::Closed(h) => h,
        }
    }
}

/// In-page operations used by one automation run.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn snapshot(&self) -> Result<PageSnapshot>;

    /// Focus, mousedown, mouseup, click.
    async fn activate(&self, target: &ElementRef) -> Result<()>;

    async fn clear_field(&self, target: &ElementRef) -> Result<()>;

    /// Append one character and fire an input notification.
    async fn append_char(&self, target: &ElementRef, ch: char) -> Result<()>;

    /// Fire the change notification after typing.
    async fn commit_field(&self, target: &ElementRef) -> Result<()>;

    async fn scroll_to_top(&self) -> Result<()>;

    /// Close any open dropdown by clicking the page body.
    async fn dismiss_menus(&self) -> Result<()>;

    /// Update the on-page status indicator, creating it on first use.
    async fn show_status(&self, message: &str, severity: Severity) -> Result<()>;

    async fn highlight(&self, target: &ElementRef, on: bool) -> Result<()>;

    /// Remove every visual affordance added during the run.
    async fn teardown(&self) -> Result<()>;
}

/// Opens pages and reports their lifecycle.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    async fn open_page(&self, url: &str) -> Result<PageHandle>;

    async fn attach(&self, handle: &PageHandle) -> Result<Arc<dyn PageDriver>>;

    async fn close_page(&self, handle: &PageHandle) -> Result<()>;

    async fn has_page(&self, handle: &PageHandle) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;
}
