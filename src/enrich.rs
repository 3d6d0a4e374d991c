use std::thread;
use std::time::Duration;

use indicatif::ProgressBar;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::error::Result;
use crate::net::Transport;
use crate::parser::{extract_detail, DetailRecord};

pub struct EnrichOptions {
    pub timeout: Duration,
    pub delay: Duration,
    pub limit: Option<usize>,
}

/// Enrichment stats returned after completion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Fetch and parse one detail page.
pub fn scrape_detail<T: Transport>(transport: &T, url: &str, timeout: Duration) -> Result<DetailRecord> {
    let body = transport.get(url, timeout)?;
    let doc = Html::parse_document(&body);
    Ok(extract_detail(&doc))
}

/// Revisit every stored item. A failing item is logged and skipped; only reading
/// the item list can fail the batch.
pub fn enrich_all<T: Transport>(
    transport: &T,
    store: &Store,
    opts: &EnrichOptions,
    pb: &ProgressBar,
) -> Result<EnrichStats> {
    let rows = store.item_urls(opts.limit)?;
    let total = rows.len();
    pb.set_length(total as u64);

    let mut ok = 0usize;
    let mut errors = 0usize;

    for (i, (item_id, url)) in rows.iter().enumerate() {
        info!("Scraping {}", url);
        let result = scrape_detail(transport, url, opts.timeout)
            .and_then(|detail| {
                debug!(
                    ages = detail.ages.len(),
                    subjects = detail.subjects.len(),
                    "extracted {}",
                    url
                );
                store.apply_enrichment(*item_id, &detail)
            });

        match result {
            Ok(()) => ok += 1,
            Err(e) => {
                errors += 1;
                warn!("Failed {}: {}", url, e);
            }
        }
        pb.inc(1);

        if i + 1 < total {
            thread::sleep(opts.delay);
        }
    }

    pb.finish_and_clear();
    info!("Enriched {} items ({} ok, {} errors)", total, ok, errors);

    Ok(EnrichStats { total, ok, errors })
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::listing::ContentType;
    use crate::net::fake::{no_posts, FakeTransport};
    use crate::parser::ItemStub;

    fn opts() -> EnrichOptions {
        EnrichOptions {
            timeout: Duration::from_secs(20),
            delay: Duration::ZERO,
            limit: None,
        }
    }

    fn seeded_store(urls: &[&str]) -> Store {
        let store = Store::from_connection(Connection::open_in_memory().unwrap()).unwrap();
        for url in urls {
            let stub = ItemStub {
                title: Some("card".to_string()),
                url: url.to_string(),
                html: "<div></div>".to_string(),
            };
            store.insert_stub(&stub, ContentType::LessonPlan, "t").unwrap();
        }
        store
    }

    fn page(title: &str, ages: &[&str]) -> String {
        let pills: String = ages.iter().map(|a| format!("<a>{}</a>", a)).collect();
        format!(
            r#"<html><body>
                 <h1>{title}</h1>
                 <div class="elementor-widget-theme-post-content"><p>About {title}</p></div>
                 <section><div>Age Group</div>{pills}</section>
               </body></html>"#
        )
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn failing_item_does_not_stop_the_batch() {
        let store = seeded_store(&["https://x/1", "https://x/2", "https://x/3"]);
        let transport = FakeTransport::new(no_posts)
            .with_page("https://x/1", &page("One", &["Kids"]))
            .with_page("https://x/3", &page("Three", &["Teens"]));

        let stats = enrich_all(&transport, &store, &opts(), &ProgressBar::hidden()).unwrap();
        assert_eq!(stats, EnrichStats { total: 3, ok: 2, errors: 1 });
        assert_eq!(transport.gets.borrow().len(), 3);

        let one = store.find_by_url("https://x/1").unwrap().unwrap();
        assert_eq!(one.title.as_deref(), Some("One"));
        assert_eq!(one.description.as_deref(), Some("About One"));
        let two = store.find_by_url("https://x/2").unwrap().unwrap();
        assert_eq!(two.title.as_deref(), Some("card"));
        assert_eq!(two.description, None);
        let three = store.find_by_url("https://x/3").unwrap().unwrap();
        assert_eq!(store.ages_for(three.id).unwrap(), vec!["Teens"]);
    }

    #[test]
    fn rerun_keeps_only_latest_tags() {
        let store = seeded_store(&["https://x/1"]);

        let before = FakeTransport::new(no_posts).with_page("https://x/1", &page("One", &["Kids", "Teens"]));
        enrich_all(&before, &store, &opts(), &ProgressBar::hidden()).unwrap();
        assert_eq!(store.ages_for(1).unwrap(), vec!["Kids", "Teens"]);

        let after = FakeTransport::new(no_posts).with_page("https://x/1", &page("One", &["Adults"]));
        enrich_all(&after, &store, &opts(), &ProgressBar::hidden()).unwrap();
        assert_eq!(store.ages_for(1).unwrap(), vec!["Adults"]);
    }

    #[test]
    fn fixture_pages_round_into_store() {
        let store = seeded_store(&["https://x/full", "https://x/bare"]);
        let transport = FakeTransport::new(no_posts)
            .with_page("https://x/full", &fixture("detail_full"))
            .with_page("https://x/bare", &fixture("detail_no_content"));

        let stats = enrich_all(&transport, &store, &opts(), &ProgressBar::hidden()).unwrap();
        assert_eq!(stats.errors, 0);

        let full = store.find_by_url("https://x/full").unwrap().unwrap();
        assert_eq!(full.resource_type.as_deref(), Some("Lesson Plan"));
        assert_eq!(store.subjects_for(full.id).unwrap(), vec!["Science", "STEM"]);

        let bare = store.find_by_url("https://x/bare").unwrap().unwrap();
        assert_eq!(bare.description, None);
        assert_eq!(bare.title.as_deref(), Some("Family Reading Toolkit"));
        assert_eq!(store.subjects_for(bare.id).unwrap(), vec!["Literacy"]);
    }

    #[test]
    fn limit_bounds_the_scan() {
        let store = seeded_store(&["https://x/1", "https://x/2"]);
        let transport = FakeTransport::new(no_posts).with_page("https://x/1", &page("One", &[]));
        let stats = enrich_all(
            &transport,
            &store,
            &EnrichOptions { limit: Some(1), ..opts() },
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(stats, EnrichStats { total: 1, ok: 1, errors: 0 });
        assert_eq!(transport.gets.borrow().as_slice(), ["https://x/1".to_string()]);
    }
}
