//! In-memory page host.
//!
//! [`SimulatedPage`] serves a fixed snapshot that can be swapped when a given
//! element is activated, optionally after a delay measured on the tokio
//! clock. It records every interaction so runs can be inspected afterwards.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;

use super::{BrowserHost, ElementRef, PageDriver, PageEvent, PageHandle, PageSnapshot};
use crate::error::{Error, Result};
use crate::store::Severity;

#[derive(Debug, Clone)]
struct Reaction {
    next: PageSnapshot,
    after: Duration,
}

#[derive(Debug, Default)]
struct SimState {
    current: PageSnapshot,
    reactions: HashMap<ElementRef, Reaction>,
    scheduled: Option<(Instant, PageSnapshot)>,
    activations: Vec<ElementRef>,
    fields: HashMap<ElementRef, String>,
    input_events: HashMap<ElementRef, usize>,
    change_events: HashMap<ElementRef, usize>,
    highlighted: HashSet<ElementRef>,
    statuses: Vec<String>,
    status_visible: bool,
    torn_down: bool,
    menus_dismissed: usize,
    broken: Option<String>,
}

/// Scripted page used by tests and dry runs.
#[derive(Debug, Default)]
pub struct SimulatedPage {
    state: Mutex<SimState>,
}

impl SimulatedPage {
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self {
            state: Mutex::new(SimState {
                current: snapshot,
                ..Default::default()
            }),
        }
    }

    /// Replace the snapshot when `target` is activated.
    pub async fn on_activate(&self, target: ElementRef, next: PageSnapshot) {
        self.on_activate_after(target, Duration::ZERO, next).await;
    }

    /// Replace the snapshot `after` the activation of `target`.
    pub async fn on_activate_after(&self, target: ElementRef, after: Duration, next: PageSnapshot) {
        self.state
            .lock()
            .await
            .reactions
            .insert(target, Reaction { next, after });
    }

    /// Make every subsequent snapshot fail with `reason`.
    pub async fn break_with(&self, reason: &str) {
        self.state.lock().await.broken = Some(reason.to_string());
    }

    pub async fn activations(&self) -> Vec<ElementRef> {
        self.state.lock().await.activations.clone()
    }

    pub async fn field_value(&self, target: &ElementRef) -> String {
        self.state
            .lock()
            .await
            .fields
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn input_events(&self, target: &ElementRef) -> usize {
        self.state
            .lock()
            .await
            .input_events
            .get(target)
            .copied()
            .unwrap_or(0)
    }

    pub async fn change_events(&self, target: &ElementRef) -> usize {
        self.state
            .lock()
            .await
            .change_events
            .get(target)
            .copied()
            .unwrap_or(0)
    }

    /// Elements still carrying a highlight.
    pub async fn highlighted(&self) -> Vec<ElementRef> {
        self.state.lock().await.highlighted.iter().cloned().collect()
    }

    pub async fn statuses(&self) -> Vec<String> {
        self.state.lock().await.statuses.clone()
    }

    /// Whether any run affordance (status panel or highlight) is on the page.
    pub async fn has_affordances(&self) -> bool {
        let state = self.state.lock().await;
        state.status_visible || !state.highlighted.is_empty()
    }

    pub async fn torn_down(&self) -> bool {
        self.state.lock().await.torn_down
    }

    pub async fn menus_dismissed(&self) -> usize {
        self.state.lock().await.menus_dismissed
    }
}

impl SimState {
    fn apply_scheduled(&mut self) {
        if let Some((at, _)) = &self.scheduled {
            if Instant::now() >= *at {
                if let Some((_, next)) = self.scheduled.take() {
                    self.current = next;
                }
            }
        }
    }

    fn check(&self) -> Result<()> {
        match &self.broken {
            Some(reason) => Err(Error::Page(reason.clone())),
            None => Ok(()),
        }
    }

    fn require(&self, target: &ElementRef) -> Result<()> {
        self.check()?;
        if self.current.find_ref(target).is_none() {
            return Err(Error::Page(format!("element {target} is not on the page")));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for SimulatedPage {
    async fn snapshot(&self) -> Result<PageSnapshot> {
        let mut state = self.state.lock().await;
        state.check()?;
        state.apply_scheduled();
        Ok(state.current.clone())
    }

    async fn activate(&self, target: &ElementRef) -> Result<()> {
        let mut state = self.state.lock().await;
        state.apply_scheduled();
        state.require(target)?;
        state.activations.push(target.clone());
        if let Some(reaction) = state.reactions.remove(target) {
            if reaction.after.is_zero() {
                state.current = reaction.next;
            } else {
                state.scheduled = Some((Instant::now() + reaction.after, reaction.next));
            }
        }
        Ok(())
    }

    async fn clear_field(&self, target: &ElementRef) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require(target)?;
        state.fields.insert(target.clone(), String::new());
        Ok(())
    }

    async fn append_char(&self, target: &ElementRef, ch: char) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require(target)?;
        state.fields.entry(target.clone()).or_default().push(ch);
        *state.input_events.entry(target.clone()).or_default() += 1;
        Ok(())
    }

    async fn commit_field(&self, target: &ElementRef) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require(target)?;
        *state.change_events.entry(target.clone()).or_default() += 1;
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<()> {
        self.state.lock().await.check()
    }

    async fn dismiss_menus(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check()?;
        state.menus_dismissed += 1;
        Ok(())
    }

    async fn show_status(&self, message: &str, _severity: Severity) -> Result<()> {
        let mut state = self.state.lock().await;
        state.status_visible = true;
        state.statuses.push(message.to_string());
        Ok(())
    }

    async fn highlight(&self, target: &ElementRef, on: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        if on {
            state.highlighted.insert(target.clone());
        } else {
            state.highlighted.remove(target);
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.status_visible = false;
        state.highlighted.clear();
        state.torn_down = true;
        Ok(())
    }
}

/// Host serving [`SimulatedPage`]s by URL.
pub struct SimulatedHost {
    routes: Mutex<HashMap<String, Arc<SimulatedPage>>>,
    pages: Mutex<HashMap<PageHandle, Arc<SimulatedPage>>>,
    opened: Mutex<Vec<String>>,
    closed: Mutex<Vec<PageHandle>>,
    events: broadcast::Sender<PageEvent>,
    next_id: AtomicU64,
    auto_load: bool,
    unreachable: AtomicBool,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    /// Host that fires `LoadComplete` as soon as a page opens.
    pub fn new() -> Self {
        Self::with_auto_load(true)
    }

    /// Host whose load events are fired by the caller via [`Self::fire_load`].
    pub fn manual() -> Self {
        Self::with_auto_load(false)
    }

    fn with_auto_load(auto_load: bool) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            routes: Mutex::new(HashMap::new()),
            pages: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            events,
            next_id: AtomicU64::new(1),
            auto_load,
            unreachable: AtomicBool::new(false),
        }
    }

    /// Serve `page` for `url`.
    pub async fn route(&self, url: &str, page: Arc<SimulatedPage>) {
        self.routes.lock().await.insert(url.to_string(), page);
    }

    pub async fn page(&self, handle: &PageHandle) -> Option<Arc<SimulatedPage>> {
        self.pages.lock().await.get(handle).cloned()
    }

    /// Refuse every `attach` while set, as a page whose context never
    /// came up would.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn fire_load(&self, handle: &PageHandle) {
        let _ = self.events.send(PageEvent::LoadComplete(handle.clone()));
    }

    /// Simulate the page being closed from outside the engine.
    pub async fn close_externally(&self, handle: &PageHandle) {
        self.pages.lock().await.remove(handle);
        let _ = self.events.send(PageEvent::Closed(handle.clone()));
    }

    pub async fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().await.clone()
    }

    pub async fn closed_pages(&self) -> Vec<PageHandle> {
        self.closed.lock().await.clone()
    }

    pub async fn open_count(&self) -> usize {
        self.pages.lock().await.len()
    }
}

#[async_trait]
impl BrowserHost for SimulatedHost {
    async fn open_page(&self, url: &str) -> Result<PageHandle> {
        let page = match self.routes.lock().await.get(url) {
            Some(page) => page.clone(),
            None => Arc::new(SimulatedPage::new(PageSnapshot {
                url: url.to_string(),
                ..Default::default()
            })),
        };
        let handle = PageHandle::new(format!(
            "sim-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        self.pages.lock().await.insert(handle.clone(), page);
        self.opened.lock().await.push(url.to_string());
        if self.auto_load {
            self.fire_load(&handle);
        }
        Ok(handle)
    }

    async fn attach(&self, handle: &PageHandle) -> Result<Arc<dyn PageDriver>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Page(format!("page {handle} is not responding")));
        }
        match self.pages.lock().await.get(handle) {
            Some(page) => Ok(page.clone() as Arc<dyn PageDriver>),
            None => Err(Error::Page(format!("no page {handle}"))),
        }
    }

    async fn close_page(&self, handle: &PageHandle) -> Result<()> {
        if self.pages.lock().await.remove(handle).is_some() {
            self.closed.lock().await.push(handle.clone());
            let _ = self.events.send(PageEvent::Closed(handle.clone()));
        }
        Ok(())
    }

    async fn has_page(&self, handle: &PageHandle) -> bool {
        self.pages.lock().await.contains_key(handle)
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }
}
