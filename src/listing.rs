use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, ScrapeError};
use crate::net::Transport;
use crate::settings::Settings;

/// Listing categories exposed by the library's filter. Order is crawl order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ContentType {
    LessonPlan,
    Video,
    Toolkit,
    Infographic,
    Website,
    Article,
    Image,
    Activity,
}

impl ContentType {
    pub const ALL: [ContentType; 8] = [
        ContentType::LessonPlan,
        ContentType::Video,
        ContentType::Toolkit,
        ContentType::Infographic,
        ContentType::Website,
        ContentType::Article,
        ContentType::Image,
        ContentType::Activity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::LessonPlan => "lesson-plan",
            ContentType::Video => "video",
            ContentType::Toolkit => "toolkit",
            ContentType::Infographic => "infographic",
            ContentType::Website => "website",
            ContentType::Article => "article",
            ContentType::Image => "image",
            ContentType::Activity => "activity",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded page of the AJAX listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub content: String,
    pub max_num_pages: u32,
}

#[derive(Deserialize)]
struct RawListing {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    pagination: Value,
}

pub struct ListingFetcher<'t, T> {
    transport: &'t T,
    url: String,
    page_size: u32,
    listing_id: u32,
    timeout: Duration,
}

impl<'t, T: Transport> ListingFetcher<'t, T> {
    pub fn new(transport: &'t T, settings: &Settings) -> Self {
        ListingFetcher {
            transport,
            url: settings.listing_url.clone(),
            page_size: settings.page_size,
            listing_id: settings.listing_id,
            timeout: settings.listing_timeout(),
        }
    }

    pub fn fetch(&self, page: u32, content_type: ContentType) -> Result<ListingPage> {
        let form = build_payload(page, content_type, self.page_size, self.listing_id);
        let body = self.transport.post_form(&self.url, &form, self.timeout)?;
        decode_listing(&body).map_err(|source| ScrapeError::Decode {
            url: self.url.clone(),
            source,
        })
    }
}

/// Form body for the JetSmartFilters listing endpoint.
pub fn build_payload(
    page: u32,
    content_type: ContentType,
    page_size: u32,
    listing_id: u32,
) -> Vec<(&'static str, String)> {
    vec![
        ("action", "jet_smart_filters".to_string()),
        ("provider", "jet-engine/listing".to_string()),
        ("query[_meta_query_type]", content_type.as_str().to_string()),
        ("defaults[post_status][]", "publish".to_string()),
        ("defaults[post_type][]", "library".to_string()),
        ("defaults[posts_per_page]", page_size.to_string()),
        ("defaults[paged]", page.to_string()),
        ("defaults[ignore_sticky_posts]", "1".to_string()),
        // provider's spelling
        ("settings[lisitng_id]", listing_id.to_string()),
        ("settings[posts_num]", page_size.to_string()),
        ("settings[max_posts_num]", "9".to_string()),
        ("settings[use_custom_post_types]", "yes".to_string()),
        ("settings[custom_post_types][]", "library".to_string()),
    ]
}

/// Missing content reads as empty; a missing or unreadable page count reads as 1.
pub fn decode_listing(body: &str) -> std::result::Result<ListingPage, serde_json::Error> {
    let raw: RawListing = serde_json::from_str(body)?;
    let max_num_pages = raw
        .pagination
        .get("max_num_pages")
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(1);

    Ok(ListingPage {
        content: raw.content.unwrap_or_default(),
        max_num_pages,
    })
}
