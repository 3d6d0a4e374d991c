use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::Store;
use crate::error::Result;
use crate::listing::{ContentType, ListingFetcher};
use crate::net::Transport;
use crate::parser::parse_items;

pub struct CrawlOptions {
    pub delay: Duration,
    pub max_pages: Option<u32>,
}

/// Discovery counters for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages: usize,
    pub seen: usize,
    pub inserted: usize,
}

impl CrawlStats {
    fn add(&mut self, other: CrawlStats) {
        self.pages += other.pages;
        self.seen += other.seen;
        self.inserted += other.inserted;
    }
}

/// Discovery timestamp: naive ISO-8601, microseconds omitted when zero.
pub fn discovery_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    if at.timestamp_subsec_micros() == 0 {
        at.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// Crawl every given content type in order. The first fetch error ends the run.
pub fn crawl_all<T: Transport>(
    fetcher: &ListingFetcher<'_, T>,
    store: &Store,
    content_types: &[ContentType],
    opts: &CrawlOptions,
) -> Result<CrawlStats> {
    let mut total = CrawlStats::default();
    for &content_type in content_types {
        info!("Scraping type: {}", content_type);
        let stats = crawl_content_type(fetcher, store, content_type, opts)?;
        total.add(stats);
    }
    info!(
        "Discovery complete: {} pages, {} items seen, {} new",
        total.pages, total.seen, total.inserted
    );
    Ok(total)
}

/// Walk pages 1.. of one content type until the listing reports its last page.
pub fn crawl_content_type<T: Transport>(
    fetcher: &ListingFetcher<'_, T>,
    store: &Store,
    content_type: ContentType,
    opts: &CrawlOptions,
) -> Result<CrawlStats> {
    let mut stats = CrawlStats::default();
    let mut page = 1u32;

    loop {
        let listing = fetcher.fetch(page, content_type)?;
        let items = parse_items(&listing.content);
        stats.pages += 1;

        let mut new = 0;
        for item in &items {
            if store.insert_stub(item, content_type, &discovery_timestamp())? {
                new += 1;
            }
        }
        stats.seen += items.len();
        stats.inserted += new;
        info!(
            "  Page {}/{} -> {} items ({} new)",
            page,
            listing.max_num_pages,
            items.len(),
            new
        );

        if page >= listing.max_num_pages {
            break;
        }
        if opts.max_pages.is_some_and(|cap| page >= cap) {
            warn!(
                "{}: stopping at page cap {} (provider reports {} pages)",
                content_type, page, listing.max_num_pages
            );
            break;
        }

        page += 1;
        thread::sleep(opts.delay);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::error::ScrapeError;
    use crate::net::fake::FakeTransport;
    use crate::settings::Settings;

    #[test]
    fn timestamp_drops_zero_microseconds() {
        let whole = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(format_timestamp(whole), "2023-11-14T22:13:20");
        let frac = DateTime::from_timestamp(1_700_000_000, 1_500_000).unwrap();
        assert_eq!(format_timestamp(frac), "2023-11-14T22:13:20.001500");
    }

    fn store() -> Store {
        Store::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn opts(max_pages: Option<u32>) -> CrawlOptions {
        CrawlOptions {
            delay: Duration::ZERO,
            max_pages,
        }
    }

    fn form_value<'a>(form: &'a [(&str, String)], key: &str) -> &'a str {
        form.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    /// One card per (type, page), each page claiming `pages` in total.
    fn paged_listing(pages: u32) -> impl Fn(&[(&str, String)]) -> Result<String> {
        move |form: &[(&str, String)]| {
            let ct = form_value(form, "query[_meta_query_type]");
            let page = form_value(form, "defaults[paged]");
            let card = format!(
                r#"<div class="jet-listing-grid__item"><a href="https://x/{ct}/{page}"><h3>{ct} {page}</h3></a></div>"#
            );
            Ok(serde_json::json!({
                "content": card,
                "pagination": { "max_num_pages": pages }
            })
            .to_string())
        }
    }

    #[test]
    fn stops_after_reported_page_count() {
        let transport = FakeTransport::new(paged_listing(3));
        let fetcher = ListingFetcher::new(&transport, &Settings::default());
        let store = store();

        let stats = crawl_content_type(&fetcher, &store, ContentType::Video, &opts(None)).unwrap();

        let posts = transport.posts.borrow();
        assert_eq!(posts.len(), 3);
        let pages: Vec<&str> = posts
            .iter()
            .map(|f| f.iter().find(|(k, _)| k == "defaults[paged]").unwrap().1.as_str())
            .collect();
        assert_eq!(pages, vec!["1", "2", "3"]);
        assert_eq!(stats, CrawlStats { pages: 3, seen: 3, inserted: 3 });
    }

    #[test]
    fn every_type_gets_its_own_pages() {
        let transport = FakeTransport::new(paged_listing(2));
        let fetcher = ListingFetcher::new(&transport, &Settings::default());
        let store = store();

        let stats = crawl_all(&fetcher, &store, &ContentType::ALL, &opts(None)).unwrap();
        assert_eq!(transport.posts.borrow().len(), 16);
        assert_eq!(stats.inserted, 16);
        assert_eq!(store.stats().unwrap().total, 16);
    }

    #[test]
    fn missing_pagination_means_single_page() {
        let transport = FakeTransport::new(|_: &[(&str, String)]| Ok(r#"{"content":""}"#.to_string()));
        let fetcher = ListingFetcher::new(&transport, &Settings::default());
        let stats =
            crawl_content_type(&fetcher, &store(), ContentType::Image, &opts(None)).unwrap();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.seen, 0);
    }

    #[test]
    fn page_cap_bounds_runaway_pagination() {
        let transport = FakeTransport::new(paged_listing(u32::MAX));
        let fetcher = ListingFetcher::new(&transport, &Settings::default());
        let stats =
            crawl_content_type(&fetcher, &store(), ContentType::Website, &opts(Some(4))).unwrap();
        assert_eq!(stats.pages, 4);
        assert_eq!(transport.posts.borrow().len(), 4);
    }

    #[test]
    fn second_discovery_run_changes_nothing() {
        let store = store();
        for run in 0..2 {
            let transport = FakeTransport::new(paged_listing(2));
            let fetcher = ListingFetcher::new(&transport, &Settings::default());
            let stats =
                crawl_all(&fetcher, &store, &[ContentType::Article], &opts(None)).unwrap();
            assert_eq!(stats.seen, 2);
            assert_eq!(stats.inserted, if run == 0 { 2 } else { 0 });
        }

        let first = store.find_by_url("https://x/article/1").unwrap().unwrap();
        assert_eq!(first.title.as_deref(), Some("article 1"));
        assert_eq!(store.stats().unwrap().total, 2);
    }

    #[test]
    fn fetch_error_aborts_the_run() {
        let transport = FakeTransport::new(|form: &[(&str, String)]| {
            if form_value(form, "defaults[paged]") == "2" {
                Err(ScrapeError::Status {
                    url: "listing".to_string(),
                    status: 503,
                })
            } else {
                paged_listing(5)(form)
            }
        });
        let fetcher = ListingFetcher::new(&transport, &Settings::default());
        let store = store();

        let err = crawl_all(
            &fetcher,
            &store,
            &[ContentType::Video, ContentType::Toolkit],
            &opts(None),
        )
        .unwrap_err();
        assert!(matches!(err, ScrapeError::Status { status: 503, .. }));
        assert_eq!(transport.posts.borrow().len(), 2);
        assert_eq!(store.stats().unwrap().total, 1);
    }
}
