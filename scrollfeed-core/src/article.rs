use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical article shape shared by every upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source_name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category_tag: Option<String>,
}

impl Article {
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}
