use std::sync::LazyLock;

use scraper::{Html, Selector};

static CARD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".jet-listing-grid__item").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static HEADING_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2, h3, h4").unwrap());

/// One card from a listing page, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStub {
    pub title: Option<String>,
    pub url: String,
    pub html: String,
}

/// Cards in document order. Cards whose first link has no usable `href` are skipped.
pub fn parse_items(fragment: &str) -> Vec<ItemStub> {
    let doc = Html::parse_fragment(fragment);
    doc.select(&CARD_SEL)
        .filter_map(|card| {
            let url = card
                .select(&LINK_SEL)
                .next()
                .and_then(|a| a.value().attr("href"))
                .filter(|href| !href.is_empty())?;
            let title = card.select(&HEADING_SEL).next().map(|h| {
                h.text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect::<String>()
            });
            Some(ItemStub {
                title,
                url: url.to_string(),
                html: card.html(),
            })
        })
        .collect()
}
