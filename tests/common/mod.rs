//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use outreach_pilot::page::fixture::{ElementSpec, PageBuilder};
use outreach_pilot::page::sim::SimulatedPage;
use outreach_pilot::page::{ElementRef, PageSnapshot};
use outreach_pilot::tasks::Task;

pub fn task(campaign: &str, slug: &str) -> Task {
    Task {
        campaign_id: campaign.into(),
        campaign_container_id: format!("sheet-{campaign}"),
        target_url: profile_url(slug),
        personalized_text: format!("Hi {slug}, great to meet you."),
        template_index: 1,
    }
}

pub fn profile_url(slug: &str) -> String {
    format!("https://www.linkedin.com/in/{slug}/")
}

/// A profile page for `name` with its own header action, a sidebar decoy
/// for "John Smith", and the dialog flow wired to activations:
/// action opens the dialog, "Add a note" reveals the field, "Send" closes it.
pub async fn profile_page(slug: &str, name: &str) -> Arc<SimulatedPage> {
    let base = profile_snapshot(slug, name);

    let mut with_dialog = PageBuilder::extend(base.clone());
    let dialog = with_dialog.root(
        ElementSpec::new("div")
            .role("dialog")
            .class("artdeco-modal send-invite"),
    );
    with_dialog.child(
        dialog,
        ElementSpec::button("Add a note")
            .aria_label("Add a note")
            .reference("add-note"),
    );
    with_dialog.child(
        dialog,
        ElementSpec::button("Send without a note").reference("send-direct"),
    );
    let with_dialog = with_dialog.build();

    let mut with_note = PageBuilder::extend(base.clone());
    let dialog = with_note.root(
        ElementSpec::new("div")
            .role("dialog")
            .class("artdeco-modal send-invite"),
    );
    with_note.child(dialog, ElementSpec::new("textarea").reference("note-field"));
    with_note.child(
        dialog,
        ElementSpec::button("Send")
            .class("artdeco-button artdeco-button--primary")
            .reference("send"),
    );
    let with_note = with_note.build();

    let page = Arc::new(SimulatedPage::new(base.clone()));
    page.on_activate(ElementRef::new("connect"), with_dialog).await;
    page.on_activate(ElementRef::new("add-note"), with_note).await;
    page.on_activate(ElementRef::new("send"), base).await;
    page
}

/// Header action for `name` plus a lookalike sidebar action for John Smith.
pub fn profile_snapshot(slug: &str, name: &str) -> PageSnapshot {
    let mut b = PageBuilder::new(&profile_url(slug), &format!("{name} | LinkedIn"));
    let body = b.root(ElementSpec::new("body"));
    let main = b.child(body, ElementSpec::new("main"));
    let card = b.child(main, ElementSpec::new("section").class("pv-top-card"));
    b.child(card, ElementSpec::new("h1").text(name).at(80.0));
    b.child(
        card,
        ElementSpec::button("Connect")
            .aria_label(&format!("Invite {name} to connect"))
            .at(150.0)
            .reference("connect"),
    );
    let aside = b.child(body, ElementSpec::new("aside").class("scaffold-layout__aside"));
    b.child(aside, ElementSpec::new("h2").text("People you may know"));
    b.child(
        aside,
        ElementSpec::button("Connect")
            .aria_label("Invite John Smith to connect")
            .at(120.0)
            .reference("decoy"),
    );
    b.build()
}
