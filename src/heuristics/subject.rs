//! Canonical subject name of a profile page.

use super::SiteProfile;
use crate::page::PageSnapshot;

/// Name of the entity the page is about.
///
/// Fallback chain, first non-empty wins: the main region's `h1`; the first
/// main-region `h2` that is not a known section title; the page title minus
/// the site suffix and any "- headline"; the URL slug.
pub fn canonical_subject(page: &PageSnapshot, profile: &SiteProfile) -> Option<String> {
    if let Some(main) = page.main_region() {
        let descendants = page.descendants(main);

        let h1 = descendants
            .iter()
            .find(|&&id| page.node(id).is("h1"))
            .map(|&id| page.text_content(id));
        if let Some(name) = h1.filter(|n| !n.is_empty()) {
            return Some(name);
        }

        for &id in descendants.iter().filter(|&&id| page.node(id).is("h2")) {
            let text = page.text_content(id);
            if text.is_empty() {
                continue;
            }
            let lower = text.to_lowercase();
            if profile.section_stoplist.iter().any(|s| *s == lower) {
                continue;
            }
            return Some(text);
        }
    }

    if let Some(name) = subject_from_title(&page.title, profile) {
        return Some(name);
    }

    subject_from_url(&page.url, profile)
}

fn subject_from_title(title: &str, profile: &SiteProfile) -> Option<String> {
    let (before, _) = title.split_once(profile.title_suffix.as_str())?;
    let mut name = before.trim();
    if let Some((head, _)) = name.split_once(profile.subtitle_separator.as_str()) {
        name = head.trim();
    }
    (!name.is_empty()).then(|| name.to_string())
}

/// Subject derived from the URL slug, separators replaced with spaces.
pub fn subject_from_url(url: &str, profile: &SiteProfile) -> Option<String> {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let (_, rest) = path.split_once(profile.subject_path_prefix.as_str())?;
    let slug = rest.split('/').next()?;
    let decoded = urlencoding::decode(slug)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| slug.to_string());
    let name = decoded
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!name.is_empty()).then_some(name)
}

/// Lower-cased first name with a leading honorific removed.
pub fn first_name(full_name: &str, profile: &SiteProfile) -> String {
    let lower = full_name.trim().to_lowercase();
    let mut tokens = lower.split_whitespace().peekable();
    let first = tokens.next().unwrap_or_default();
    let bare = first.strip_suffix('.').unwrap_or(first);
    if tokens.peek().is_some() && profile.honorifics.iter().any(|h| h == bare) {
        return tokens.next().unwrap_or_default().to_string();
    }
    first.to_string()
}
