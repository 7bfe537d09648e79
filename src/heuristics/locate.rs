//! Element lookups used by the dialog driver.

use super::SiteProfile;
use super::decoy::{Rejection, check_primary_control, in_decoy_region, label_names_subject};
use super::subject::first_name;
use crate::page::{NodeId, PageSnapshot};
use crate::tasks::FailureReason;

/// Result of one locate pass: the chosen control, if any, plus every
/// candidate that was looked at and turned down.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Located {
    pub control: Option<NodeId>,
    pub rejected: Vec<(NodeId, Rejection)>,
}

impl Located {
    fn found(mut self, id: NodeId) -> Self {
        self.control = Some(id);
        self
    }
}

fn normalized_text(page: &PageSnapshot, id: NodeId) -> String {
    page.text_content(id).to_lowercase()
}

/// Clickable whose label carries an action keyword and the subject's first
/// name, rendered in the header area outside any decoy region.
pub fn find_labelled_action(page: &PageSnapshot, subject: &str, profile: &SiteProfile) -> Located {
    let first = first_name(subject, profile);
    let mut out = Located::default();
    if first.is_empty() {
        return out;
    }
    for id in page.find_all(|n| n.is("button") || n.is("a")) {
        let node = page.node(id);
        let label = node.label_lower();
        if !profile.mentions_action(&label) || !label_names_subject(&label, subject, profile) {
            continue;
        }
        if let Some(rejection) = in_decoy_region(page, id, profile) {
            out.rejected.push((id, rejection));
            continue;
        }
        let rect = node.rect;
        if !rect.has_area() {
            continue;
        }
        if rect.y < 0.0 || rect.y >= profile.header_cutoff {
            out.rejected.push((id, Rejection::BelowHeader { top: rect.y }));
            continue;
        }
        return out.found(id);
    }
    out
}

/// Clickable whose visible text is exactly the action text and which passes
/// every primary-control check.
pub fn find_text_action(page: &PageSnapshot, subject: &str, profile: &SiteProfile) -> Located {
    let mut out = Located::default();
    for id in page.find_all(|n| n.is("button") || n.is("a")) {
        if normalized_text(page, id) != profile.action_text {
            continue;
        }
        if let Err(rejection) = check_primary_control(page, id, subject, profile) {
            out.rejected.push((id, rejection));
            continue;
        }
        if page.node(id).rect.has_area() {
            return out.found(id);
        }
    }
    out
}

/// The subject's own overflow ("More") button.
pub fn find_overflow_control(page: &PageSnapshot, subject: &str, profile: &SiteProfile) -> Located {
    let mut out = Located::default();
    for id in page.find_all(|n| n.is("button")) {
        let is_overflow = page.node(id).label_lower() == profile.overflow_label
            || normalized_text(page, id) == profile.overflow_label;
        if !is_overflow {
            continue;
        }
        match check_primary_control(page, id, subject, profile) {
            Ok(()) => return out.found(id),
            Err(rejection) => out.rejected.push((id, rejection)),
        }
    }
    out
}

/// The action entry inside an open dropdown menu.
pub fn find_menu_action(page: &PageSnapshot, subject: &str, profile: &SiteProfile) -> Located {
    let mut out = Located::default();
    let menu = page
        .find_all(|n| n.has_role("menu") || profile.menu_classes.iter().any(|c| n.has_class(c)))
        .into_iter()
        .next();
    let Some(menu) = menu else {
        return out;
    };

    for id in page.descendants(menu) {
        let node = page.node(id);
        let is_item = node.has_role("menuitem") || node.is("li") || node.is_clickable();
        if !is_item {
            continue;
        }
        let text = normalized_text(page, id);
        let label = node.label_lower();
        if !profile.mentions_action(&text) && !profile.mentions_action(&label) {
            continue;
        }
        if label.contains("invite") && !label_names_subject(&label, subject, profile) {
            out.rejected.push((
                id,
                Rejection::NamesOtherSubject {
                    label: node.aria_label.clone().unwrap_or_default(),
                },
            ));
            continue;
        }
        return out.found(id);
    }
    out
}

/// Explain why no action control could be found.
pub fn diagnose_missing_action(page: &PageSnapshot, profile: &SiteProfile) -> FailureReason {
    let action_buttons = page.find_all(|n| {
        n.is("button") && profile.mentions_action(&n.label_lower())
    });
    let text_buttons = page
        .find_all(|n| n.is("button"))
        .into_iter()
        .filter(|&id| normalized_text(page, id) == profile.action_text);
    let has_action = action_buttons
        .into_iter()
        .chain(text_buttons)
        .any(|id| in_decoy_region(page, id, profile).is_none());

    let main_buttons = page
        .main_region()
        .map(|main| {
            page.descendants(main)
                .into_iter()
                .filter(|&id| page.node(id).is("button"))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if main_buttons
        .iter()
        .any(|&id| normalized_text(page, id) == profile.pending_label)
    {
        return FailureReason::AlreadyInProgress;
    }

    let has_linked = main_buttons
        .iter()
        .any(|&id| normalized_text(page, id) == profile.linked_label);
    if has_linked && !has_action {
        return FailureReason::AlreadyLinked;
    }

    FailureReason::ActionControlNotFound
}

/// The open action dialog, searched through shadow trees.
///
/// A `role="dialog"` element with one of the dialog classes wins; otherwise
/// any element labelled by the invite dialog's title id.
pub fn find_dialog(page: &PageSnapshot, profile: &SiteProfile) -> Option<NodeId> {
    page.find_all_deep(|n| {
        n.has_role("dialog") && profile.dialog_classes.iter().any(|c| n.has_class(c))
    })
    .into_iter()
    .next()
    .or_else(|| {
        page.find_all_deep(|n| n.labelled_by.as_deref() == Some(profile.dialog_labelled_by.as_str()))
            .into_iter()
            .next()
    })
}

/// First button under `container` matching one of `labels`, tried in order.
///
/// For each label: exact accessible label, then exact visible text, then
/// (when `partial` is set) substring of either.
pub fn find_button_in(
    page: &PageSnapshot,
    container: NodeId,
    labels: &[String],
    partial: bool,
) -> Option<NodeId> {
    let buttons: Vec<NodeId> = page
        .descendants(container)
        .into_iter()
        .filter(|&id| page.node(id).is("button"))
        .collect();

    for label in labels {
        let wanted = label.to_lowercase();
        if let Some(&id) = buttons.iter().find(|&&id| page.node(id).label_lower() == wanted) {
            return Some(id);
        }
        if let Some(&id) = buttons
            .iter()
            .find(|&&id| normalized_text(page, id) == wanted)
        {
            return Some(id);
        }
        if partial {
            if let Some(&id) = buttons.iter().find(|&&id| {
                page.node(id).label_lower().contains(&wanted)
                    || normalized_text(page, id).contains(&wanted)
            }) {
                return Some(id);
            }
        }
    }
    None
}

/// Note field: a textarea inside the dialog, else anywhere on the page.
pub fn find_text_surface(page: &PageSnapshot, dialog: Option<NodeId>) -> Option<NodeId> {
    if let Some(dialog) = dialog {
        if let Some(id) = page
            .deep_descendants(dialog)
            .into_iter()
            .find(|&id| page.node(id).is("textarea"))
        {
            return Some(id);
        }
    }
    page.find_all_deep(|n| n.is("textarea")).into_iter().next()
}

/// Primary-styled dialog button whose text mentions sending.
pub fn find_primary_submit(
    page: &PageSnapshot,
    dialog: NodeId,
    profile: &SiteProfile,
) -> Option<NodeId> {
    page.descendants(dialog).into_iter().find(|&id| {
        let node = page.node(id);
        node.is("button")
            && node.has_class(&profile.primary_button_class)
            && normalized_text(page, id).contains("send")
    })
}

/// Whether an action dialog is still open and shows an error.
pub fn dialog_shows_error(page: &PageSnapshot, profile: &SiteProfile) -> bool {
    find_dialog(page, profile).is_some_and(|d| {
        page.text_content(d)
            .to_lowercase()
            .contains(&profile.error_indicator)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fixture::{ElementSpec, PageBuilder};

    fn p() -> SiteProfile {
        SiteProfile::default()
    }

    #[test]
    fn labelled_action_requires_first_name() {
        let mut b = PageBuilder::new("u", "t");
        let main = b.root(ElementSpec::new("main"));
        b.child(
            main,
            ElementSpec::button("Connect")
                .aria_label("Invite John Smith to connect")
                .at(150.0),
        );
        let own = b.child(
            main,
            ElementSpec::button("Connect")
                .aria_label("Invite Jane Doe to connect")
                .at(150.0),
        );
        let page = b.build();
        assert_eq!(find_labelled_action(&page, "Jane Doe", &p()).control, Some(own));
    }

    #[test]
    fn menu_action_skips_other_people() {
        let mut b = PageBuilder::new("u", "t");
        let main = b.root(ElementSpec::new("main"));
        let menu = b.child(main, ElementSpec::new("div").role("menu"));
        b.child(
            menu,
            ElementSpec::new("div")
                .role("menuitem")
                .aria_label("Invite John Smith to connect")
                .text("Connect"),
        );
        let own = b.child(
            menu,
            ElementSpec::new("div")
                .role("menuitem")
                .aria_label("Invite Jane Doe to connect")
                .text("Connect"),
        );
        let located = find_menu_action(&b.build(), "Jane Doe", &p());
        assert_eq!(located.control, Some(own));
        assert_eq!(located.rejected.len(), 1);
    }

    #[test]
    fn diagnosis_distinguishes_pending_and_linked() {
        let mut b = PageBuilder::new("u", "t");
        let main = b.root(ElementSpec::new("main"));
        b.child(main, ElementSpec::button("Pending"));
        assert_eq!(
            diagnose_missing_action(&b.build(), &p()),
            FailureReason::AlreadyInProgress
        );

        let mut b = PageBuilder::new("u", "t");
        let body = b.root(ElementSpec::new("body"));
        let main = b.child(body, ElementSpec::new("main"));
        b.child(main, ElementSpec::button("Message"));
        let aside = b.child(body, ElementSpec::new("aside"));
        b.child(aside, ElementSpec::button("Connect"));
        assert_eq!(
            diagnose_missing_action(&b.build(), &p()),
            FailureReason::AlreadyLinked
        );

        let mut b = PageBuilder::new("u", "t");
        b.root(ElementSpec::new("main"));
        assert_eq!(
            diagnose_missing_action(&b.build(), &p()),
            FailureReason::ActionControlNotFound
        );
    }

    #[test]
    fn button_matching_prefers_exact_then_partial() {
        let mut b = PageBuilder::new("u", "t");
        let dialog = b.root(ElementSpec::new("div").role("dialog").class("artdeco-modal"));
        let partial = b.child(dialog, ElementSpec::button("Send later"));
        let exact = b.child(dialog, ElementSpec::button("Send"));
        let page = b.build();
        let labels = vec!["send now".to_string(), "send".to_string()];

        assert_eq!(find_button_in(&page, dialog, &labels, true), Some(exact));
        let only_partial = vec!["send l".to_string()];
        assert_eq!(find_button_in(&page, dialog, &only_partial, true), Some(partial));
        assert_eq!(find_button_in(&page, dialog, &only_partial, false), None);
    }

    #[test]
    fn dialog_found_inside_shadow_tree() {
        let mut b = PageBuilder::new("u", "t");
        let body = b.root(ElementSpec::new("body"));
        let host = b.child(body, ElementSpec::new("div"));
        let shadow = b.child(host, ElementSpec::new("div").shadow());
        let dialog = b.child(
            shadow,
            ElementSpec::new("div").role("dialog").class("send-invite"),
        );
        b.child(dialog, ElementSpec::new("p").text("Something went wrong: error"));
        let page = b.build();

        assert_eq!(find_dialog(&page, &p()), Some(dialog));
        assert!(dialog_shows_error(&page, &p()));
    }

    #[test]
    fn dialog_found_by_its_title_reference() {
        let mut b = PageBuilder::new("u", "t");
        let body = b.root(ElementSpec::new("body"));
        b.child(body, ElementSpec::new("div").role("dialog").class("msg-overlay"));
        let host = b.child(body, ElementSpec::new("div"));
        let shadow = b.child(host, ElementSpec::new("div").shadow());
        let dialog = b.child(shadow, ElementSpec::new("div").labelled_by("send-invite-modal"));
        b.child(dialog, ElementSpec::button("Send without a note"));
        let page = b.build();

        assert_eq!(find_dialog(&page, &p()), Some(dialog));
        assert_eq!(find_dialog(&PageBuilder::new("u", "t").build(), &p()), None);
    }
}
