//! Chromium page host over CDP (`chromiumoxide`).
//!
//! Elements are addressed through a `data-outreach-ref` attribute that the
//! snapshot script stamps on every element it reports, shadow trees
//! included, so later interaction scripts can find the same element again.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::EventLoadEventFired;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use super::{BrowserHost, ElementRef, PageDriver, PageEvent, PageHandle, PageSnapshot};
use crate::config::BrowserSettings;
use crate::error::{Error, Result};
use crate::store::Severity;

const SNAPSHOT_JS: &str = r#"
(() => {
  let counter = Number(document.documentElement.dataset.outreachNext || 0);
  const nodes = [];
  const visit = (el, parent, shadowChild) => {
    if (!el.dataset.outreachRef) { el.dataset.outreachRef = 'r' + (counter++); }
    const r = el.getBoundingClientRect();
    const own = Array.from(el.childNodes)
      .filter(n => n.nodeType === Node.TEXT_NODE)
      .map(n => n.textContent).join(' ');
    const id = nodes.length;
    nodes.push({
      tag: el.tagName.toLowerCase(),
      role: el.getAttribute('role'),
      ariaLabel: el.getAttribute('aria-label'),
      labelledBy: el.getAttribute('aria-labelledby'),
      text: own,
      classes: Array.from(el.classList),
      domId: el.id || null,
      rect: { x: r.left, y: r.top, width: r.width, height: r.height },
      parent: parent,
      children: [],
      shadowChild: shadowChild,
      elementRef: el.dataset.outreachRef
    });
    if (parent !== null) nodes[parent].children.push(id);
    for (const child of Array.from(el.children)) visit(child, id, false);
    if (el.shadowRoot) {
      for (const child of Array.from(el.shadowRoot.children)) visit(child, id, true);
    }
  };
  visit(document.body, null, false);
  document.documentElement.dataset.outreachNext = String(counter);
  return { url: location.href, title: document.title, nodes };
})()
"#;

const FIND_JS: &str = r#"
const __outreachFind = (ref) => {
  const search = (root) => {
    const hit = root.querySelector(`[data-outreach-ref="${ref}"]`);
    if (hit) return hit;
    for (const el of root.querySelectorAll('*')) {
      if (el.shadowRoot) { const found = search(el.shadowRoot); if (found) return found; }
    }
    return null;
  };
  const el = search(document);
  if (!el) throw new Error('element ' + ref + ' is not on the page');
  return el;
};
"#;

const OVERLAY_JS: &str = r#"
const __outreachOverlay = () => {
  if (!document.getElementById('outreach-pilot-styles')) {
    const style = document.createElement('style');
    style.id = 'outreach-pilot-styles';
    style.textContent = `
      #outreach-pilot-overlay { position: fixed; inset: 0; pointer-events: none; z-index: 2147483646; box-shadow: inset 0 0 0 4px rgba(59,130,246,0.8); }
      #outreach-pilot-status { position: fixed; top: 16px; left: 50%; transform: translateX(-50%); z-index: 2147483647; background: #0f172a; color: #f1f5f9; border: 2px solid #3b82f6; border-radius: 12px; padding: 10px 18px; font: 13px system-ui, sans-serif; }
      .outreach-highlight { outline: 3px solid #3b82f6 !important; outline-offset: 2px !important; }
    `;
    document.head.appendChild(style);
    const overlay = document.createElement('div');
    overlay.id = 'outreach-pilot-overlay';
    document.body.appendChild(overlay);
    const panel = document.createElement('div');
    panel.id = 'outreach-pilot-status';
    document.body.appendChild(panel);
  }
  return document.getElementById('outreach-pilot-status');
};
"#;

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn page_err(e: impl std::fmt::Display) -> Error {
    Error::Page(e.to_string())
}

/// One Chromium tab.
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    async fn run(&self, script: String) -> Result<()> {
        self.page.evaluate(script).await.map_err(page_err)?;
        Ok(())
    }

    async fn on_element(&self, target: &ElementRef, body: &str) -> Result<()> {
        self.run(format!(
            "(() => {{ {FIND_JS} const el = __outreachFind({}); {body} }})()",
            js_string(target.as_str())
        ))
        .await
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn snapshot(&self) -> Result<PageSnapshot> {
        self.page
            .evaluate(SNAPSHOT_JS)
            .await
            .map_err(page_err)?
            .into_value::<PageSnapshot>()
            .map_err(page_err)
    }

    async fn activate(&self, target: &ElementRef) -> Result<()> {
        self.on_element(
            target,
            "el.focus(); \
             for (const type of ['mousedown', 'mouseup', 'click']) { \
               el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window })); \
             }",
        )
        .await
    }

    async fn clear_field(&self, target: &ElementRef) -> Result<()> {
        self.on_element(
            target,
            "el.focus(); el.value = ''; el.dispatchEvent(new Event('focus', { bubbles: true }));",
        )
        .await
    }

    async fn append_char(&self, target: &ElementRef, ch: char) -> Result<()> {
        let data = js_string(&ch.to_string());
        self.on_element(
            target,
            &format!(
                "el.value += {data}; \
                 el.dispatchEvent(new InputEvent('input', {{ bubbles: true, data: {data}, inputType: 'insertText' }}));"
            ),
        )
        .await
    }

    async fn commit_field(&self, target: &ElementRef) -> Result<()> {
        self.on_element(target, "el.dispatchEvent(new Event('change', { bubbles: true }));")
            .await
    }

    async fn scroll_to_top(&self) -> Result<()> {
        self.run("window.scrollTo(0, 0)".to_string()).await
    }

    async fn dismiss_menus(&self) -> Result<()> {
        self.run("document.body.click()".to_string()).await
    }

    async fn show_status(&self, message: &str, severity: Severity) -> Result<()> {
        let icon = crate::tasks::severity_icon(severity);
        let text = js_string(&format!("{icon} {message}"));
        self.run(format!(
            "(() => {{ {OVERLAY_JS} __outreachOverlay().textContent = {text}; }})()"
        ))
        .await
    }

    async fn highlight(&self, target: &ElementRef, on: bool) -> Result<()> {
        let body = if on {
            "el.classList.add('outreach-highlight'); el.scrollIntoView({ block: 'center' });"
        } else {
            "el.classList.remove('outreach-highlight');"
        };
        self.on_element(target, body).await
    }

    async fn teardown(&self) -> Result<()> {
        self.run(
            "(() => { \
               for (const id of ['outreach-pilot-overlay', 'outreach-pilot-status', 'outreach-pilot-styles']) { \
                 document.getElementById(id)?.remove(); \
               } \
               document.querySelectorAll('.outreach-highlight').forEach(el => el.classList.remove('outreach-highlight')); \
             })()"
                .to_string(),
        )
        .await
    }
}

/// Chromium instance owning the automation tabs.
pub struct ChromeHost {
    browser: Mutex<Browser>,
    pages: Arc<Mutex<HashMap<PageHandle, Page>>>,
    events: broadcast::Sender<PageEvent>,
    next_id: AtomicU64,
    #[allow(dead_code)]
    handler_handle: tokio::task::JoinHandle<()>,
}

impl ChromeHost {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder().viewport(None);
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| Error::Page(format!("Failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Page(format!("Failed to launch browser: {e}")))?;

        let handler_handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        let (events, _) = broadcast::channel(64);
        Ok(Self {
            browser: Mutex::new(browser),
            pages: Arc::new(Mutex::new(HashMap::new())),
            events,
            next_id: AtomicU64::new(1),
            handler_handle,
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        for (_, page) in self.pages.lock().await.drain() {
            let _ = page.close().await;
        }
        self.browser.lock().await.close().await.map_err(page_err)?;
        Ok(())
    }
}

#[async_trait]
impl BrowserHost for ChromeHost {
    async fn open_page(&self, url: &str) -> Result<PageHandle> {
        let page = self
            .browser
            .lock()
            .await
            .new_page(url)
            .await
            .map_err(|e| Error::Page(format!("Failed to open page: {e}")))?;
        let handle = PageHandle::new(format!("tab_{}", self.next_id.fetch_add(1, Ordering::Relaxed)));

        // `new_page` returns after the first load, so later loads come from the listener.
        let mut loads = page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(page_err)?;
        self.pages.lock().await.insert(handle.clone(), page);
        let _ = self.events.send(PageEvent::LoadComplete(handle.clone()));

        let events = self.events.clone();
        let pages = self.pages.clone();
        let watched = handle.clone();
        tokio::spawn(async move {
            while loads.next().await.is_some() {
                let _ = events.send(PageEvent::LoadComplete(watched.clone()));
            }
            if pages.lock().await.remove(&watched).is_some() {
                warn!(page = %watched, "Page went away");
                let _ = events.send(PageEvent::Closed(watched));
            }
        });

        Ok(handle)
    }

    async fn attach(&self, handle: &PageHandle) -> Result<Arc<dyn PageDriver>> {
        let pages = self.pages.lock().await;
        let page = pages
            .get(handle)
            .ok_or_else(|| Error::Page(format!("Tab not found: {handle}")))?;
        Ok(Arc::new(ChromePage { page: page.clone() }))
    }

    async fn close_page(&self, handle: &PageHandle) -> Result<()> {
        let page = self.pages.lock().await.remove(handle);
        if let Some(page) = page {
            page.close().await.map_err(page_err)?;
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
