use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use url::Url;

use crate::article::Article;
use crate::config::{FetchConfig, ProviderConfig, ProviderKind};
use crate::error::FetchError;
use crate::partition::{Category, Partition};

pub const DEFAULT_SOURCE_NAME: &str = "Unknown source";
pub const GUARDIAN_SOURCE_NAME: &str = "The Guardian";

/// A news provider: how to ask it for one partition and how to read its answer.
pub trait Upstream: Send + Sync {
    fn name(&self) -> &'static str;

    fn request_url(&self, partition: &Partition, now: DateTime<Utc>) -> Result<Url, FetchError>;

    /// Turns a 2xx body into canonical articles, or reports the provider's own error field.
    fn normalize(
        &self,
        body: &[u8],
        partition: &Partition,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>, FetchError>;
}

/// Paging and time-range settings shared by every provider.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub page_size: u32,
    pub lookback_days: i64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            lookback_days: 2,
        }
    }
}

impl From<&FetchConfig> for QueryOptions {
    fn from(cfg: &FetchConfig) -> Self {
        Self {
            page_size: cfg.page_size,
            lookback_days: cfg.lookback_days,
        }
    }
}

pub fn upstream_from_config(provider: &ProviderConfig, fetch: &FetchConfig) -> Box<dyn Upstream> {
    let options = QueryOptions::from(fetch);
    let api_key = provider.api_key.clone();
    match provider.kind {
        ProviderKind::Guardian => {
            let mut src = GuardianSource::new(api_key, options);
            if let Some(base) = &provider.base_url {
                src.base_url = base.clone();
            }
            Box::new(src)
        }
        ProviderKind::NewsApi => {
            let mut src = NewsApiSource::new(api_key, options);
            if let Some(base) = &provider.base_url {
                src.base_url = base.clone();
            }
            Box::new(src)
        }
        ProviderKind::GNews => {
            let mut src = GNewsSource::new(api_key, options);
            if let Some(base) = &provider.base_url {
                src.base_url = base.clone();
            }
            Box::new(src)
        }
    }
}

/// Loosely-typed record every provider shape is first mapped into.
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    source_name: Option<String>,
    image_url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}

fn canonicalize(
    raw: Vec<RawArticle>,
    partition: &Partition,
    fallback_source: &str,
    now: DateTime<Utc>,
) -> Vec<Article> {
    let category_tag = partition.category().map(|c| c.as_str().to_owned());
    raw.into_iter()
        .filter_map(|r| {
            let title = non_blank(r.title)?;
            let published_at = r
                .published_at
                .as_deref()
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);
            Some(Article {
                title,
                description: non_blank(r.description).unwrap_or_default(),
                url: non_blank(r.url).unwrap_or_default(),
                published_at,
                source_name: non_blank(r.source_name)
                    .unwrap_or_else(|| fallback_source.to_owned()),
                image_url: non_blank(r.image_url),
                category_tag: category_tag.clone(),
            })
        })
        .collect()
}

fn build_url(base: &str, path: &str, params: &[(&str, String)]) -> Result<Url, FetchError> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path);
    Ok(Url::parse_with_params(&raw, params)?)
}

fn from_date(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

// ---------------------------------------------------------------------------
// The Guardian: {"response": {"status", "message"?, "results": [...]}}

#[derive(Debug, Clone)]
pub struct GuardianSource {
    pub base_url: String,
    pub api_key: String,
    pub options: QueryOptions,
}

impl GuardianSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://content.guardianapis.com";

    pub fn new(api_key: impl Into<String>, options: QueryOptions) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            options,
        }
    }

    fn section(category: Category) -> &'static str {
        match category {
            Category::World => "world",
            Category::Technology => "technology",
            Category::Business => "business",
            Category::Sports => "sport",
            Category::Science => "science",
            Category::Entertainment => "culture",
            Category::Health => "society",
        }
    }
}

#[derive(Deserialize)]
struct GuardianEnvelope {
    response: GuardianResponse,
}

#[derive(Deserialize)]
struct GuardianResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    results: Vec<GuardianResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuardianResult {
    web_title: Option<String>,
    web_url: Option<String>,
    web_publication_date: Option<String>,
    section_name: Option<String>,
    fields: Option<GuardianFields>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuardianFields {
    headline: Option<String>,
    trail_text: Option<String>,
    thumbnail: Option<String>,
}

impl Upstream for GuardianSource {
    fn name(&self) -> &'static str {
        "guardian"
    }

    fn request_url(&self, partition: &Partition, now: DateTime<Utc>) -> Result<Url, FetchError> {
        let mut params = vec![
            ("page-size", self.options.page_size.to_string()),
            (
                "show-fields",
                "headline,thumbnail,trailText,shortUrl".to_owned(),
            ),
            ("order-by", "newest".to_owned()),
            ("api-key", self.api_key.clone()),
        ];
        match partition {
            Partition::Location(loc) => {
                params.push(("q", loc.clone()));
                let from = from_date(now, self.options.lookback_days);
                params.push(("from-date", from.format("%Y-%m-%d").to_string()));
            }
            Partition::Category(cat) => params.push(("section", Self::section(*cat).to_owned())),
        }
        build_url(&self.base_url, "search", &params)
    }

    fn normalize(
        &self,
        body: &[u8],
        partition: &Partition,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>, FetchError> {
        let envelope: GuardianEnvelope = serde_json::from_slice(body)?;
        let response = envelope.response;
        if response.status.as_deref() == Some("error") {
            return Err(FetchError::Upstream(
                response.message.unwrap_or_else(|| "API Error".to_owned()),
            ));
        }
        let raw = response
            .results
            .into_iter()
            .map(|r| {
                let (headline, trail, thumb) = match r.fields {
                    Some(f) => (f.headline, f.trail_text, f.thumbnail),
                    None => (None, None, None),
                };
                RawArticle {
                    title: non_blank(r.web_title).or(headline),
                    description: trail,
                    url: r.web_url,
                    published_at: r.web_publication_date,
                    source_name: r.section_name,
                    image_url: thumb,
                }
            })
            .collect();
        Ok(canonicalize(raw, partition, GUARDIAN_SOURCE_NAME, now))
    }
}

// ---------------------------------------------------------------------------
// NewsAPI: {"status", "message"?, "articles": [...]}

#[derive(Debug, Clone)]
pub struct NewsApiSource {
    pub base_url: String,
    pub api_key: String,
    pub options: QueryOptions,
}

impl NewsApiSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://newsapi.org/v2";

    pub fn new(api_key: impl Into<String>, options: QueryOptions) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            options,
        }
    }

    fn category(category: Category) -> &'static str {
        match category {
            Category::World => "general",
            other => other.as_str(),
        }
    }
}

#[derive(Deserialize)]
struct StatusEnvelope {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<SourcedArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourcedArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    source: Option<SourceRef>,
    #[serde(alias = "image")]
    url_to_image: Option<String>,
}

#[derive(Deserialize)]
struct SourceRef {
    name: Option<String>,
}

impl From<SourcedArticle> for RawArticle {
    fn from(a: SourcedArticle) -> Self {
        RawArticle {
            title: a.title,
            description: a.description,
            url: a.url,
            published_at: a.published_at,
            source_name: a.source.and_then(|s| s.name),
            image_url: a.url_to_image,
        }
    }
}

impl Upstream for NewsApiSource {
    fn name(&self) -> &'static str {
        "newsapi"
    }

    fn request_url(&self, partition: &Partition, now: DateTime<Utc>) -> Result<Url, FetchError> {
        let page_size = ("pageSize", self.options.page_size.to_string());
        let api_key = ("apiKey", self.api_key.clone());
        match partition {
            Partition::Location(loc) => {
                let from = from_date(now, self.options.lookback_days);
                let params = [
                    ("q", loc.clone()),
                    ("from", from.format("%Y-%m-%d").to_string()),
                    ("sortBy", "publishedAt".to_owned()),
                    ("language", "en".to_owned()),
                    page_size,
                    api_key,
                ];
                build_url(&self.base_url, "everything", &params)
            }
            Partition::Category(cat) => {
                let params = [
                    ("category", Self::category(*cat).to_owned()),
                    ("language", "en".to_owned()),
                    page_size,
                    api_key,
                ];
                build_url(&self.base_url, "top-headlines", &params)
            }
        }
    }

    fn normalize(
        &self,
        body: &[u8],
        partition: &Partition,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>, FetchError> {
        let envelope: StatusEnvelope = serde_json::from_slice(body)?;
        if envelope.status.as_deref() == Some("error") {
            return Err(FetchError::Upstream(
                envelope.message.unwrap_or_else(|| "API Error".to_owned()),
            ));
        }
        let raw = envelope.articles.into_iter().map(RawArticle::from).collect();
        Ok(canonicalize(raw, partition, DEFAULT_SOURCE_NAME, now))
    }
}

// ---------------------------------------------------------------------------
// GNews: {"articles": [...]} or {"errors": [...] | {...}}

#[derive(Debug, Clone)]
pub struct GNewsSource {
    pub base_url: String,
    pub api_key: String,
    pub options: QueryOptions,
}

impl GNewsSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://gnews.io/api/v4";

    pub fn new(api_key: impl Into<String>, options: QueryOptions) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            options,
        }
    }
}

#[derive(Deserialize)]
struct ArticlesEnvelope {
    #[serde(default)]
    articles: Vec<SourcedArticle>,
    errors: Option<serde_json::Value>,
}

fn describe_errors(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(describe_errors)
            .collect::<Vec<_>>()
            .join("; "),
        serde_json::Value::Object(map) => map
            .values()
            .map(describe_errors)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

impl Upstream for GNewsSource {
    fn name(&self) -> &'static str {
        "gnews"
    }

    fn request_url(&self, partition: &Partition, now: DateTime<Utc>) -> Result<Url, FetchError> {
        let max = ("max", self.options.page_size.to_string());
        let api_key = ("apikey", self.api_key.clone());
        match partition {
            Partition::Location(loc) => {
                let from = from_date(now, self.options.lookback_days);
                let params = [
                    ("q", loc.clone()),
                    ("lang", "en".to_owned()),
                    ("from", from.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                    ("sortby", "publishedAt".to_owned()),
                    max,
                    api_key,
                ];
                build_url(&self.base_url, "search", &params)
            }
            Partition::Category(cat) => {
                let params = [
                    ("category", cat.as_str().to_owned()),
                    ("lang", "en".to_owned()),
                    max,
                    api_key,
                ];
                build_url(&self.base_url, "top-headlines", &params)
            }
        }
    }

    fn normalize(
        &self,
        body: &[u8],
        partition: &Partition,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>, FetchError> {
        let envelope: ArticlesEnvelope = serde_json::from_slice(body)?;
        if let Some(errors) = envelope.errors.as_ref().filter(|e| !e.is_null()) {
            let message = describe_errors(errors);
            return Err(FetchError::Upstream(if message.is_empty() {
                "API Error".to_owned()
            } else {
                message
            }));
        }
        let raw = envelope.articles.into_iter().map(RawArticle::from).collect();
        Ok(canonicalize(raw, partition, DEFAULT_SOURCE_NAME, now))
    }
}
