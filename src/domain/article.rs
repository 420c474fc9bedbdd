use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Articles with a trimmed extract this short or shorter are dropped.
pub const MIN_EXTRACT_CHARS: usize = 30;

pub const DEFAULT_LANG: &str = "en";

/// Upstream page identifier. `Num(0)` is a real id, not an absent one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArticleId {
    Num(i64),
    Text(String),
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleId::Num(n) => write!(f, "{}", n),
            ArticleId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ArticleId {
    fn from(id: i64) -> Self {
        ArticleId::Num(id)
    }
}

impl From<&str> for ArticleId {
    fn from(id: &str) -> Self {
        ArticleId::Text(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub display_title: String,
    pub extract: String,
    pub extract_html: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub original_image: Option<String>,
    pub url: String,
    pub lang: String,
    pub timestamp: Option<String>,
}

impl Article {
    pub fn new(id: ArticleId, title: &str, extract: &str, url: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            display_title: title.to_string(),
            extract: extract.to_string(),
            extract_html: String::new(),
            description: String::new(),
            thumbnail: None,
            original_image: None,
            url: url.to_string(),
            lang: DEFAULT_LANG.to_string(),
            timestamp: None,
        }
    }

    /// Normalize a raw summary body. Returns `None` for payloads that carry
    /// no usable article; those are not errors.
    pub fn from_json(body: serde_json::Value, page_base: &str) -> Option<Self> {
        let summary: PageSummary = serde_json::from_value(body).ok()?;
        Self::from_summary(summary, page_base)
    }

    pub fn from_summary(summary: PageSummary, page_base: &str) -> Option<Self> {
        let id = summary.pageid?;
        let title = summary.title.filter(|t| !t.is_empty())?;
        let extract = summary.extract?;
        if !has_usable_extract(&extract) {
            return None;
        }

        let url = summary
            .content_urls
            .and_then(|u| u.desktop)
            .and_then(|d| d.page)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| fallback_url(page_base, &title));

        Some(Self {
            id,
            display_title: non_empty(summary.displaytitle).unwrap_or_else(|| title.clone()),
            title,
            extract,
            extract_html: non_empty(summary.extract_html).unwrap_or_default(),
            description: non_empty(summary.description).unwrap_or_default(),
            thumbnail: summary.thumbnail.and_then(|i| non_empty(i.source)),
            original_image: summary.originalimage.and_then(|i| non_empty(i.source)),
            url,
            lang: non_empty(summary.lang).unwrap_or_else(|| DEFAULT_LANG.to_string()),
            timestamp: non_empty(summary.timestamp),
        })
    }
}

pub fn has_usable_extract(extract: &str) -> bool {
    extract.trim().chars().count() > MIN_EXTRACT_CHARS
}

fn fallback_url(page_base: &str, title: &str) -> String {
    format!("{}{}", page_base, urlencoding::encode(title))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `GET /page/random/summary` response body. Only the fields we read.
///
/// Every field is read leniently: a value of the wrong type is treated as
/// absent instead of failing the whole body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSummary {
    #[serde(default, deserialize_with = "lenient")]
    pub pageid: Option<ArticleId>,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub displaytitle: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub extract: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub extract_html: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub thumbnail: Option<ImageRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub originalimage: Option<ImageRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub content_urls: Option<ContentUrls>,
    #[serde(default, deserialize_with = "lenient")]
    pub lang: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageRef {
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentUrls {
    #[serde(default, deserialize_with = "lenient")]
    pub desktop: Option<PageUrl>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageUrl {
    #[serde(default, deserialize_with = "lenient")]
    pub page: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
