use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::dom::{clean_text, stripped_text};
use super::taxonomy::extract_taxonomy;

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static CONTENT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".elementor-widget-theme-post-content").unwrap());
static PARAGRAPH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
static BADGE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".jet-listing-dynamic-terms__link").unwrap());

const AGE_LABEL: &str = "Age";
const SUBJECT_LABEL: &str = "Subject";

/// Fields read off an item's detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRecord {
    pub title: Option<String>,
    pub description: Option<String>,
    pub resource_type: Option<String>,
    pub ages: Vec<String>,
    pub subjects: Vec<String>,
}

pub fn extract_detail(doc: &Html) -> DetailRecord {
    let title = doc.select(&TITLE_SEL).next().and_then(clean_text);

    let description = doc.select(&CONTENT_SEL).next().map(|content| {
        content
            .select(&PARAGRAPH_SEL)
            .map(stripped_text)
            .collect::<Vec<_>>()
            .join("\n")
    });

    let resource_type = doc.select(&BADGE_SEL).next().and_then(clean_text);

    DetailRecord {
        title,
        description,
        resource_type,
        ages: extract_taxonomy(doc, AGE_LABEL),
        subjects: extract_taxonomy(doc, SUBJECT_LABEL),
    }
}

// ── Tests ──
