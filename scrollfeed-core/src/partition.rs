use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    World,
    Technology,
    Business,
    Sports,
    Science,
    Entertainment,
    Health,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::World,
        Category::Technology,
        Category::Business,
        Category::Sports,
        Category::Science,
        Category::Entertainment,
        Category::Health,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::World => "world",
            Category::Technology => "technology",
            Category::Business => "business",
            Category::Sports => "sports",
            Category::Science => "science",
            Category::Entertainment => "entertainment",
            Category::Health => "health",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::World => "World",
            Category::Technology => "Technology",
            Category::Business => "Business",
            Category::Sports => "Sports",
            Category::Science => "Science",
            Category::Entertainment => "Entertainment",
            Category::Health => "Health",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

const LOCATION_KEY_PREFIX: &str = "location:";
const CATEGORY_KEY_PREFIX: &str = "category:";

/// The query dimension that scopes both the upstream request and the cache entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Partition {
    Location(String),
    Category(Category),
}

impl Partition {
    /// Builds a location partition from user input; blank input yields `None`.
    pub fn location(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Partition::Location(trimmed.to_owned()))
        }
    }

    /// Cache key namespaced by kind: `location:<lower-cased>` or `category:<name>`.
    pub fn cache_key(&self) -> String {
        match self {
            Partition::Location(loc) => format!("{LOCATION_KEY_PREFIX}{}", loc.to_lowercase()),
            Partition::Category(cat) => format!("{CATEGORY_KEY_PREFIX}{}", cat.as_str()),
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            Partition::Category(cat) => Some(*cat),
            Partition::Location(_) => None,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Location(loc) => f.write_str(loc),
            Partition::Category(cat) => f.write_str(cat.label()),
        }
    }
}
