//! Target resolution on pages that show other people next to the subject.

use outreach_pilot::heuristics::{
    Rejection, SiteProfile, canonical_subject, check_primary_control, find_labelled_action,
    find_text_action,
};
use outreach_pilot::page::fixture::{ElementSpec, PageBuilder};
use outreach_pilot::page::{NodeId, PageSnapshot};

const URL: &str = "https://www.linkedin.com/in/jane-doe/";

struct Layout {
    page: PageSnapshot,
    own: NodeId,
    decoy: NodeId,
}

/// Header card for Jane Doe plus a "People you may know" sidebar offering
/// John Smith, with the sidebar first in document order when `aside_first`.
fn layout(aside_first: bool) -> Layout {
    let mut b = PageBuilder::new(URL, "Jane Doe | LinkedIn");
    let body = b.root(ElementSpec::new("body"));

    let add_aside = |b: &mut PageBuilder| {
        let aside = b.child(body, ElementSpec::new("aside"));
        b.child(aside, ElementSpec::new("h2").text("People you may know"));
        b.child(
            aside,
            ElementSpec::button("Connect")
                .aria_label("Invite John Smith to connect")
                .at(120.0),
        )
    };

    let mut decoy = None;
    if aside_first {
        decoy = Some(add_aside(&mut b));
    }
    let main = b.child(body, ElementSpec::new("main"));
    let card = b.child(main, ElementSpec::new("section"));
    b.child(card, ElementSpec::new("h1").text("Jane Doe").at(80.0));
    let own = b.child(
        card,
        ElementSpec::button("Connect")
            .aria_label("Invite Jane Doe to connect")
            .at(150.0),
    );
    if !aside_first {
        decoy = Some(add_aside(&mut b));
    }

    Layout {
        page: b.build(),
        own,
        decoy: decoy.unwrap(),
    }
}

#[test]
fn header_subject_wins_in_either_order() {
    let profile = SiteProfile::default();
    for aside_first in [false, true] {
        let l = layout(aside_first);
        let subject = canonical_subject(&l.page, &profile).unwrap();
        assert_eq!(subject, "Jane Doe");

        let by_label = find_labelled_action(&l.page, &subject, &profile);
        assert_eq!(by_label.control, Some(l.own), "aside_first = {aside_first}");

        let by_text = find_text_action(&l.page, &subject, &profile);
        assert_eq!(by_text.control, Some(l.own), "aside_first = {aside_first}");
        if aside_first {
            assert_eq!(by_text.rejected, vec![(l.decoy, Rejection::InAside)]);
        }
    }
}

#[test]
fn decoy_is_rejected_even_outside_an_aside() {
    let profile = SiteProfile::default();
    let mut b = PageBuilder::new(URL, "Jane Doe | LinkedIn");
    let main = b.root(ElementSpec::new("main"));
    b.child(main, ElementSpec::new("h1").text("Jane Doe"));
    let section = b.child(main, ElementSpec::new("section"));
    let inner = b.child(section, ElementSpec::new("div"));
    b.child(inner, ElementSpec::new("h2").text("People also viewed"));
    let decoy = b.child(
        section,
        ElementSpec::button("Connect")
            .aria_label("Invite John Smith to connect")
            .at(300.0),
    );
    let page = b.build();

    match check_primary_control(&page, decoy, "Jane Doe", &profile) {
        Err(Rejection::DecoySection { heading }) => assert_eq!(heading, "People also viewed"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(find_text_action(&page, "Jane Doe", &profile).control, None);
    assert_eq!(find_labelled_action(&page, "Jane Doe", &profile).control, None);
}

#[test]
fn subject_skips_section_headings() {
    let profile = SiteProfile::default();
    let mut b = PageBuilder::new(URL, "");
    let main = b.root(ElementSpec::new("main"));
    for heading in ["Experience", "Skills", "Jane Doe"] {
        b.child(main, ElementSpec::new("h2").text(heading));
    }
    assert_eq!(
        canonical_subject(&b.build(), &profile).as_deref(),
        Some("Jane Doe")
    );
}

#[test]
fn subject_falls_back_to_title_then_url() {
    let profile = SiteProfile::default();

    let titled = PageBuilder::new(URL, "Jane Doe - Staff Engineer | LinkedIn").build();
    assert_eq!(
        canonical_subject(&titled, &profile).as_deref(),
        Some("Jane Doe")
    );

    let bare = PageBuilder::new("https://www.linkedin.com/in/john-q-public/", "").build();
    assert_eq!(
        canonical_subject(&bare, &profile).as_deref(),
        Some("john q public")
    );
}

#[test]
fn controls_below_the_header_are_not_primary() {
    let profile = SiteProfile::default();
    let mut b = PageBuilder::new(URL, "Jane Doe | LinkedIn");
    let main = b.root(ElementSpec::new("main"));
    b.child(main, ElementSpec::new("h1").text("Jane Doe"));
    let low = b.child(main, ElementSpec::button("Connect").at(900.0));
    let page = b.build();

    assert_eq!(
        check_primary_control(&page, low, "Jane Doe", &profile),
        Err(Rejection::BelowHeader { top: 900.0 })
    );
}

#[test]
fn a_longer_name_sharing_the_prefix_is_someone_else() {
    let profile = SiteProfile::default();
    let mut b = PageBuilder::new("https://www.linkedin.com/in/jan-doe/", "Jan Doe | LinkedIn");
    let main = b.root(ElementSpec::new("main"));
    b.child(main, ElementSpec::new("h1").text("Jan Doe").at(80.0));
    let janet = b.child(
        main,
        ElementSpec::button("Connect")
            .aria_label("Invite Janet Smith to connect")
            .at(300.0),
    );
    let page = b.build();

    let subject = canonical_subject(&page, &profile).unwrap();
    assert_eq!(subject, "Jan Doe");
    assert_eq!(find_labelled_action(&page, &subject, &profile).control, None);
    assert_eq!(
        check_primary_control(&page, janet, &subject, &profile),
        Err(Rejection::NamesOtherSubject {
            label: "Invite Janet Smith to connect".into()
        })
    );
    assert_eq!(find_text_action(&page, &subject, &profile).control, None);
}
