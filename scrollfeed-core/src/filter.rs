use crate::article::Article;

/// Case-insensitive substring match over title, description and source name.
/// Articles without a title never match.
pub fn matches(article: &Article, term: &str) -> bool {
    if !article.has_title() {
        return false;
    }
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    article.title.to_lowercase().contains(&needle)
        || article.description.to_lowercase().contains(&needle)
        || article.source_name.to_lowercase().contains(&needle)
}

pub fn filter_articles<'a>(articles: &'a [Article], term: &str) -> Vec<&'a Article> {
    articles.iter().filter(|a| matches(a, term)).collect()
}
