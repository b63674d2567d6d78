use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::trace;
use url::Url;

use super::provider::{EnrichmentContext, EnrichmentItemError, EnrichmentPayload, EnrichmentProvider};
use crate::network::{NetworkError, NetworkResult, UpstreamClient};
use crate::poi::Poi;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    extract: String,
    thumbnail: Option<Thumbnail>,
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    source: String,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

#[derive(Debug, Clone, PartialEq)]
struct ArticleRef {
    language: String,
    title: String,
}

pub struct WikipediaEnricher {
    client: Arc<UpstreamClient>,
    base_url_template: String,
    language: String,
}

impl WikipediaEnricher {
    pub fn new(
        client: Arc<UpstreamClient>,
        base_url_template: impl Into<String>,
        language: impl Into<String>,
    ) -> NetworkResult<Self> {
        let enricher = Self {
            client,
            base_url_template: base_url_template.into(),
            language: language.into(),
        };
        enricher.base_url(&enricher.language)?;
        Ok(enricher)
    }

    fn base_url(&self, language: &str) -> NetworkResult<Url> {
        let raw = self.base_url_template.replace("{lang}", language);
        Url::parse(&raw).map_err(|err| NetworkError::Configuration(format!("wikipedia base url {raw}: {err}")))
    }

    pub fn search_url(&self, language: &str, terms: &str) -> NetworkResult<Url> {
        let mut url = self.base_url(language)?.join("w/api.php").map_err(|err| {
            NetworkError::Configuration(format!("wikipedia search url: {err}"))
        })?;
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("list", "search")
            .append_pair("srsearch", terms)
            .append_pair("srlimit", "1")
            .append_pair("format", "json");
        Ok(url)
    }

    pub fn summary_url(&self, language: &str, title: &str) -> NetworkResult<Url> {
        let mut url = self.base_url(language)?;
        url.path_segments_mut()
            .map_err(|_| NetworkError::Configuration("wikipedia base url cannot hold a path".into()))?
            .pop_if_empty()
            .extend(["api", "rest_v1", "page", "summary"])
            .push(&title.replace(' ', "_"));
        Ok(url)
    }

    async fn resolve_article(
        &self,
        poi: &Poi,
        context: &EnrichmentContext,
    ) -> Result<ArticleRef, EnrichmentItemError> {
        if let Some(article) = poi.wikipedia.as_deref().and_then(|tag| parse_wikipedia_tag(tag, &self.language)) {
            return Ok(article);
        }
        let terms = match context.city.as_deref() {
            Some(city) if !city.is_empty() => format!("{} {}", poi.name, city),
            _ => poi.name.clone(),
        };
        let url = self.search_url(&self.language, &terms)?;
        let response: Option<SearchResponse> = self.client.get_json(url).await?;
        let title = response
            .and_then(|r| r.query)
            .and_then(|q| q.search.into_iter().next())
            .map(|hit| hit.title)
            .ok_or(EnrichmentItemError::NotFound)?;
        trace!(poi = %poi.name, title = %title, "wikipedia search hit");
        Ok(ArticleRef {
            language: self.language.clone(),
            title,
        })
    }
}

#[async_trait]
impl EnrichmentProvider for WikipediaEnricher {
    async fn enrich(
        &self,
        poi: &Poi,
        context: &EnrichmentContext,
    ) -> Result<EnrichmentPayload, EnrichmentItemError> {
        let article = self.resolve_article(poi, context).await?;
        let url = self.summary_url(&article.language, &article.title)?;
        let summary: PageSummary = self
            .client
            .get_json(url)
            .await?
            .ok_or(EnrichmentItemError::NotFound)?;
        payload_from_summary(summary)
    }
}

/// OSM `wikipedia` tags look like `de:Kaiserburg Nürnberg`.
fn parse_wikipedia_tag(tag: &str, default_language: &str) -> Option<ArticleRef> {
    let tag = tag.trim();
    if tag.is_empty() {
        return None;
    }
    match tag.split_once(':') {
        Some((language, title))
            if (2..=3).contains(&language.len())
                && language.chars().all(|c| c.is_ascii_lowercase())
                && !title.trim().is_empty() =>
        {
            Some(ArticleRef {
                language: language.to_string(),
                title: title.trim().to_string(),
            })
        }
        _ => Some(ArticleRef {
            language: default_language.to_string(),
            title: tag.to_string(),
        }),
    }
}

fn payload_from_summary(summary: PageSummary) -> Result<EnrichmentPayload, EnrichmentItemError> {
    if summary.kind == "disambiguation" {
        return Err(EnrichmentItemError::NotFound);
    }
    let extract = summary.extract.trim();
    let payload = EnrichmentPayload {
        summary: (!extract.is_empty()).then(|| extract.to_string()),
        image_url: summary.thumbnail.map(|thumbnail| thumbnail.source),
        link: summary
            .content_urls
            .and_then(|urls| urls.desktop)
            .map(|desktop| desktop.page),
    };
    if payload.summary.is_none() && payload.image_url.is_none() {
        return Err(EnrichmentItemError::NotFound);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wikipedia_tags_split_language() {
        assert_eq!(
            parse_wikipedia_tag("de:Kaiserburg Nürnberg", "en"),
            Some(ArticleRef {
                language: "de".into(),
                title: "Kaiserburg Nürnberg".into()
            })
        );
        assert_eq!(
            parse_wikipedia_tag("Star Trek: Voyager", "en").map(|a| a.language),
            Some("en".into())
        );
        assert_eq!(parse_wikipedia_tag("  ", "en"), None);
    }

    #[test]
    fn summary_payload_maps_fields() {
        let raw = r#"{
            "type": "standard",
            "title": "Kaiserburg Nürnberg",
            "extract": "Die Kaiserburg ist das Wahrzeichen Nürnbergs.",
            "thumbnail": {"source": "https://upload.wikimedia.org/k.jpg", "width": 320},
            "content_urls": {"desktop": {"page": "https://de.wikipedia.org/wiki/Kaiserburg_N%C3%BCrnberg"}}
        }"#;
        let payload = payload_from_summary(serde_json::from_str(raw).unwrap()).unwrap();
        assert!(payload.summary.unwrap().starts_with("Die Kaiserburg"));
        assert_eq!(payload.image_url.as_deref(), Some("https://upload.wikimedia.org/k.jpg"));
        assert!(payload.link.unwrap().contains("Kaiserburg"));
    }

    #[test]
    fn disambiguation_pages_are_not_found() {
        let raw = r#"{"type": "disambiguation", "extract": "Kaiserburg steht für:"}"#;
        let result = payload_from_summary(serde_json::from_str(raw).unwrap());
        assert!(matches!(result, Err(EnrichmentItemError::NotFound)));
    }
}
