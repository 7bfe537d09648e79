//! Target resolution over a [`PageSnapshot`](crate::page::PageSnapshot).
//!
//! Everything in this module is a pure function of a snapshot and a
//! [`SiteProfile`]. The automation run calls these between snapshots; tests
//! call them on fixture pages built with [`crate::page::fixture`].

mod decoy;
mod locate;
mod subject;

pub use decoy::{
    Rejection, check_primary_control, in_decoy_region, label_names_other_subject, label_names_subject,
};
pub use locate::{
    Located, diagnose_missing_action, dialog_shows_error, find_button_in, find_dialog,
    find_labelled_action, find_menu_action, find_overflow_control, find_primary_submit,
    find_text_action, find_text_surface,
};
pub use subject::{canonical_subject, first_name, subject_from_url};

use serde::{Deserialize, Serialize};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Site-specific vocabulary the heuristics match against.
///
/// All string lists are compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// Suffix stripped from the page title ("Jane Doe | LinkedIn").
    pub title_suffix: String,
    /// Separator before a headline in the title ("Jane Doe - Engineer").
    pub subtitle_separator: String,
    /// Path prefix that precedes the subject slug in profile URLs.
    pub subject_path_prefix: String,
    /// Controls rendered below this offset (px) are not header controls.
    pub header_cutoff: f64,
    /// How many levels up the decoy container scan looks.
    pub ancestor_depth: usize,
    /// Secondary headings that are section titles, never names.
    pub section_stoplist: Vec<String>,
    /// Class/id fragments marking sidebar and recommendation containers.
    pub decoy_tokens: Vec<String>,
    /// Section headings that introduce other people.
    pub decoy_headings: Vec<String>,
    /// Label keywords of the primary action.
    pub action_keywords: Vec<String>,
    /// Visible text of the primary action button.
    pub action_text: String,
    pub overflow_label: String,
    pub menu_classes: Vec<String>,
    /// Button text shown when a request is already outstanding.
    pub pending_label: String,
    /// Button text that implies an existing relationship.
    pub linked_label: String,
    pub dialog_classes: Vec<String>,
    /// `aria-labelledby` of the dialog when its role or classes are missing.
    pub dialog_labelled_by: String,
    pub add_note_labels: Vec<String>,
    /// Submit labels when the dialog offers no note.
    pub send_without_note_labels: Vec<String>,
    /// Submit labels after a note was typed.
    pub send_labels: Vec<String>,
    pub primary_button_class: String,
    /// Text inside a still-open dialog that marks a rejected submit.
    pub error_indicator: String,
    pub honorifics: Vec<String>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            title_suffix: "| LinkedIn".into(),
            subtitle_separator: " - ".into(),
            subject_path_prefix: "/in/".into(),
            header_cutoff: 600.0,
            ancestor_depth: 10,
            section_stoplist: strings(&[
                "about",
                "activity",
                "experience",
                "education",
                "licenses & certifications",
                "skills",
                "interests",
                "recommendations",
                "honors & awards",
                "projects",
                "volunteering",
                "languages",
                "publications",
                "causes",
                "highlights",
                "people also viewed",
                "people you may know",
                "similar profiles",
                "featured",
            ]),
            decoy_tokens: strings(&[
                "aside",
                "sidebar",
                "right-rail",
                "pymk",
                "similar",
                "recommendation",
                "more-profiles",
                "explore-premium",
            ]),
            decoy_headings: strings(&[
                "people you may know",
                "people also viewed",
                "similar profiles",
                "more profiles for you",
                "explore premium",
                "people similar to",
            ]),
            action_keywords: strings(&["connect", "invite"]),
            action_text: "connect".into(),
            overflow_label: "more".into(),
            menu_classes: strings(&["artdeco-dropdown__content"]),
            pending_label: "pending".into(),
            linked_label: "message".into(),
            dialog_classes: strings(&["send-invite", "artdeco-modal"]),
            dialog_labelled_by: "send-invite-modal".into(),
            add_note_labels: strings(&["add a note"]),
            send_without_note_labels: strings(&["send without a note", "send invitation", "send"]),
            send_labels: strings(&["send invitation", "send now", "send"]),
            primary_button_class: "artdeco-button--primary".into(),
            error_indicator: "error".into(),
            honorifics: strings(&["dr", "mr", "mrs", "ms", "prof", "rev", "er"]),
        }
    }
}

impl SiteProfile {
    pub(crate) fn mentions_action(&self, text: &str) -> bool {
        self.action_keywords.iter().any(|k| text.contains(k.as_str()))
    }
}
