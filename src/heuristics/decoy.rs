//! Decoy rejection: tells the subject's own controls from lookalikes that
//! belong to other people shown on the same page.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use super::SiteProfile;
use super::subject::first_name;
use crate::page::{NodeId, PageSnapshot};

/// Why a candidate control was skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("inside an aside region")]
    InAside,
    #[error("inside a `{token}` container")]
    DecoyContainer { token: String },
    #[error("under the \"{heading}\" section")]
    DecoySection { heading: String },
    #[error("label names someone else: \"{label}\"")]
    NamesOtherSubject { label: String },
    #[error("too far down the page (top: {top})")]
    BelowHeader { top: f64 },
    #[error("outside the main region")]
    OutsideMain,
}

/// Whether `id` sits in a sidebar or recommendation area.
pub fn in_decoy_region(page: &PageSnapshot, id: NodeId, profile: &SiteProfile) -> Option<Rejection> {
    if page
        .closest(id, |n| n.is("aside") || n.has_role("complementary"))
        .is_some()
    {
        return Some(Rejection::InAside);
    }

    let chain = std::iter::once(id).chain(page.ancestors(id));
    for node_id in chain.take(profile.ancestor_depth) {
        let node = page.node(node_id);
        let classes = node.classes.join(" ").to_lowercase();
        let dom_id = node.dom_id.as_deref().unwrap_or_default().to_lowercase();
        if let Some(token) = profile
            .decoy_tokens
            .iter()
            .find(|t| classes.contains(t.as_str()) || dom_id.contains(t.as_str()))
        {
            return Some(Rejection::DecoyContainer {
                token: token.clone(),
            });
        }

        if let Some(heading) = section_heading(page, node_id) {
            let lower = heading.to_lowercase();
            if profile.decoy_headings.iter().any(|h| lower.contains(h.as_str())) {
                return Some(Rejection::DecoySection { heading });
            }
        }
    }
    None
}

/// Text of the first `h2`/`h3` that is a child of `id`, or of a `div` child.
fn section_heading(page: &PageSnapshot, id: NodeId) -> Option<String> {
    let is_heading = |n: NodeId| page.node(n).is("h2") || page.node(n).is("h3");
    let children = &page.node(id).children;
    if let Some(&h) = children.iter().find(|&&c| is_heading(c)) {
        return Some(page.text_content(h));
    }
    children
        .iter()
        .filter(|&&c| page.node(c).is("div"))
        .flat_map(|&c| page.node(c).children.iter().copied())
        .find(|&g| is_heading(g))
        .map(|g| page.text_content(g))
}

/// Whether `label` names `subject` by first or full name, as whole words.
///
/// "Invite Janet Smith" does not name "Jan Doe".
pub fn label_names_subject(label: &str, subject: &str, profile: &SiteProfile) -> bool {
    let first = first_name(subject, profile);
    let full = subject.split_whitespace().collect::<Vec<_>>().join(" ");
    if first.is_empty() {
        return false;
    }
    let pattern = format!(
        r"(?i)\b(?:{}|{})\b",
        regex::escape(&first),
        regex::escape(&full)
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(label))
}

/// Whether an action label mentions a person other than `subject`.
///
/// Labels that name nobody ("Connect") pass.
pub fn label_names_other_subject(label: &str, subject: &str, profile: &SiteProfile) -> bool {
    static NAMED: OnceLock<Regex> = OnceLock::new();
    let label = label.to_lowercase();
    if !profile.mentions_action(&label) {
        return false;
    }
    let named = NAMED.get_or_init(|| Regex::new(r"(?i)invite\s+\w+|connect.*\w+").expect("static regex"));
    if !named.is_match(&label) {
        return false;
    }
    !label_names_subject(&label, subject, profile)
}

/// Accept `id` as the subject's own header control, or say why not.
pub fn check_primary_control(
    page: &PageSnapshot,
    id: NodeId,
    subject: &str,
    profile: &SiteProfile,
) -> Result<(), Rejection> {
    if let Some(rejection) = in_decoy_region(page, id, profile) {
        return Err(rejection);
    }

    let node = page.node(id);
    if let Some(label) = node.aria_label.as_deref() {
        if label_names_other_subject(label, subject, profile) {
            return Err(Rejection::NamesOtherSubject {
                label: label.to_string(),
            });
        }
    }

    if node.rect.y > profile.header_cutoff {
        return Err(Rejection::BelowHeader { top: node.rect.y });
    }

    match page.main_region() {
        Some(main) if page.is_within(id, main) => Ok(()),
        _ => Err(Rejection::OutsideMain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fixture::{ElementSpec, PageBuilder};

    #[test]
    fn aside_and_tokens_mark_decoys() {
        let p = SiteProfile::default();
        let mut b = PageBuilder::new("u", "t");
        let body = b.root(ElementSpec::new("body"));
        let main = b.child(body, ElementSpec::new("main"));
        let header = b.child(main, ElementSpec::new("section").class("pv-top-card"));
        let own = b.child(header, ElementSpec::button("Connect"));
        let aside = b.child(body, ElementSpec::new("aside"));
        let in_aside = b.child(aside, ElementSpec::button("Connect"));
        let rail = b.child(main, ElementSpec::new("div").id("right-rail-column"));
        let in_rail = b.child(rail, ElementSpec::button("Connect"));
        let page = b.build();

        assert_eq!(in_decoy_region(&page, own, &p), None);
        assert_eq!(in_decoy_region(&page, in_aside, &p), Some(Rejection::InAside));
        assert_eq!(
            in_decoy_region(&page, in_rail, &p),
            Some(Rejection::DecoyContainer {
                token: "right-rail".into()
            })
        );
    }

    #[test]
    fn section_heading_marks_decoys() {
        let p = SiteProfile::default();
        let mut b = PageBuilder::new("u", "t");
        let main = b.root(ElementSpec::new("main"));
        let section = b.child(main, ElementSpec::new("section"));
        let wrap = b.child(section, ElementSpec::new("div"));
        b.child(wrap, ElementSpec::new("h2").text("People also viewed"));
        let list = b.child(section, ElementSpec::new("ul"));
        let item = b.child(list, ElementSpec::new("li"));
        let btn = b.child(item, ElementSpec::button("Connect"));
        let page = b.build();

        assert!(matches!(
            in_decoy_region(&page, btn, &p),
            Some(Rejection::DecoySection { .. })
        ));
    }

    #[test]
    fn labels_must_name_the_subject() {
        let p = SiteProfile::default();
        assert!(!label_names_other_subject("Invite Jane Doe to connect", "Jane Doe", &p));
        assert!(!label_names_other_subject("Invite Dr. Jane to connect", "Dr. Jane Doe", &p));
        assert!(label_names_other_subject("Invite John Smith to connect", "Jane Doe", &p));
        assert!(!label_names_other_subject("Connect", "Jane Doe", &p));
        assert!(!label_names_other_subject("More actions", "Jane Doe", &p));
    }

    #[test]
    fn first_name_must_match_a_whole_word() {
        let p = SiteProfile::default();
        assert!(label_names_subject("Invite Jan Doe to connect", "Jan Doe", &p));
        assert!(label_names_subject("Invite JAN to connect", "Jan Doe", &p));
        assert!(!label_names_subject("Invite Janet Smith to connect", "Jan Doe", &p));
        assert!(!label_names_subject("Invite Jordan Janssen to connect", "Jan Doe", &p));
        assert!(label_names_other_subject("Invite Janet Smith to connect", "Jan Doe", &p));
    }

    #[test]
    fn header_cutoff_and_main_region() {
        let p = SiteProfile::default();
        let mut b = PageBuilder::new("u", "t");
        let body = b.root(ElementSpec::new("body"));
        let main = b.child(body, ElementSpec::new("main"));
        let high = b.child(main, ElementSpec::button("Connect").at(200.0));
        let low = b.child(main, ElementSpec::button("Connect").at(900.0));
        let footer = b.child(body, ElementSpec::button("Connect").at(100.0));
        let page = b.build();

        assert_eq!(check_primary_control(&page, high, "Jane Doe", &p), Ok(()));
        assert_eq!(
            check_primary_control(&page, low, "Jane Doe", &p),
            Err(Rejection::BelowHeader { top: 900.0 })
        );
        assert_eq!(
            check_primary_control(&page, footer, "Jane Doe", &p),
            Err(Rejection::OutsideMain)
        );
    }
}
