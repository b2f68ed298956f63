use crate::config::ExtractorConfig;
use crate::enhancer::quality_score;
use crate::fetcher::{FetchedPage, Fetcher};
use crate::security::UrlValidator;
use crate::utils::{host_matches_domain, non_empty};
use crate::{ExtractOptions, MetadataSource, PreviewError, PreviewRecord};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, instrument};
use url::Url;

/// One way of reading a field out of a parsed document.
#[derive(Debug, Clone, Copy)]
enum Rule {
    /// `<meta property=X content=...>`
    MetaProperty(&'static str),
    /// `<meta name=X content=...>`
    MetaName(&'static str),
    /// Text of the first element matching a selector
    Text(&'static str),
    /// Attribute of the first element matching a selector
    Attr(&'static str, &'static str),
}

impl Rule {
    fn apply(&self, document: &Html) -> Option<String> {
        match *self {
            Rule::MetaProperty(property) => {
                attr_of_first(document, &format!("meta[property='{property}']"), "content")
            }
            Rule::MetaName(name) => {
                attr_of_first(document, &format!("meta[name='{name}']"), "content")
            }
            Rule::Text(selector) => {
                let selector = Selector::parse(selector).ok()?;
                document
                    .select(&selector)
                    .next()
                    .and_then(|el| non_empty(Some(&el.text().collect::<String>())))
            }
            Rule::Attr(selector, attr) => attr_of_first(document, selector, attr),
        }
    }

    fn label(&self) -> &'static str {
        match *self {
            Rule::MetaProperty(p) | Rule::MetaName(p) => p,
            Rule::Text(s) | Rule::Attr(s, _) => s,
        }
    }
}

fn attr_of_first(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| non_empty(el.value().attr(attr)))
}

// Per field: Open Graph, then Twitter Card, then plain HTML
const TITLE_RULES: &[Rule] = &[
    Rule::MetaProperty("og:title"),
    Rule::MetaName("twitter:title"),
    Rule::MetaProperty("twitter:title"),
    Rule::Text("title"),
];

const DESCRIPTION_RULES: &[Rule] = &[
    Rule::MetaProperty("og:description"),
    Rule::MetaName("twitter:description"),
    Rule::MetaProperty("twitter:description"),
    Rule::MetaName("description"),
];

const IMAGE_RULES: &[Rule] = &[
    Rule::MetaProperty("og:image"),
    Rule::MetaProperty("og:image:url"),
    Rule::MetaProperty("og:image:secure_url"),
    Rule::MetaName("twitter:image"),
    Rule::MetaName("twitter:image:src"),
    Rule::MetaProperty("twitter:image"),
    Rule::Attr("link[rel='image_src']", "href"),
];

const SITE_NAME_RULES: &[Rule] = &[
    Rule::MetaProperty("og:site_name"),
    Rule::MetaName("application-name"),
];

const FAVICON_RULES: &[Rule] = &[
    Rule::Attr("link[rel='icon']", "href"),
    Rule::Attr("link[rel='shortcut icon']", "href"),
    Rule::Attr("link[rel='apple-touch-icon']", "href"),
];

const CANONICAL_RULES: &[Rule] = &[
    Rule::MetaProperty("og:url"),
    Rule::Attr("link[rel='canonical']", "href"),
];

const CONTENT_TYPE_RULES: &[Rule] = &[Rule::MetaProperty("og:type")];

/// First non-empty match wins; returns the value and the rule that produced it.
fn first_match(document: &Html, rules: &[Rule]) -> Option<(String, &'static str)> {
    rules
        .iter()
        .find_map(|rule| rule.apply(document).map(|value| (value, rule.label())))
}

/// Resolve a possibly relative reference to an absolute URL, dropping anything unresolvable.
fn resolve(base: &Url, reference: &str) -> Option<String> {
    base.join(reference).ok().map(|u| u.to_string())
}

/// Marks URLs on first-party hosts and derives the service name from the first path segment.
pub fn classify_first_party(url: &Url, domains: &[String]) -> (bool, Option<String>) {
    let Some(host) = url.host_str() else {
        return (false, None);
    };
    if !domains.iter().any(|d| host_matches_domain(host, d)) {
        return (false, None);
    }

    let service = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .map(|segment| segment.to_ascii_uppercase());
    (true, service)
}

/// Metadata extractor, responsible for extracting preview information from webpage content
#[derive(Clone)]
pub struct MetadataExtractor {
    fetcher: Fetcher,
    validator: UrlValidator,
    first_party_domains: Vec<String>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default(), UrlValidator::default())
    }
}

impl MetadataExtractor {
    pub fn new(config: &ExtractorConfig, validator: UrlValidator) -> Self {
        Self::with_fetcher(Fetcher::new(config), config, validator)
    }

    pub fn with_fetcher(fetcher: Fetcher, config: &ExtractorConfig, validator: UrlValidator) -> Self {
        Self {
            fetcher,
            validator,
            first_party_domains: config.first_party_domains.clone(),
        }
    }

    /// Validate, fetch once and parse. No network call happens for an invalid URL.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn extract(
        &self,
        url: &str,
        options: ExtractOptions,
    ) -> Result<PreviewRecord, PreviewError> {
        let parsed = self.validator.validate(url)?;

        let started = Instant::now();
        let page = self.fetcher.fetch(parsed.as_str(), options).await?;
        check_content_type(&page)?;

        let mut record = self.parse(url, &page)?;
        record.fetch_duration_ms = Some(started.elapsed().as_millis() as u64);
        debug!(url = %url, title = ?record.title, "Extracted metadata");
        Ok(record)
    }

    fn parse(&self, url: &str, page: &FetchedPage) -> Result<PreviewRecord, PreviewError> {
        let page_url = Url::parse(&page.final_url)
            .map_err(|e| PreviewError::ParseError(format!("unusable final URL: {e}")))?;
        let mut record = self.extract_from_html(&page.body, url, &page_url);
        record.dynamic = page.is_dynamic();
        Ok(record)
    }

    /// Parse an already fetched document. `page_url` is where the body was served from.
    pub fn extract_from_html(&self, html: &str, url: &str, page_url: &Url) -> PreviewRecord {
        let document = Html::parse_document(html);
        let mut sources = BTreeMap::new();
        let mut field = |name: &str, rules: &[Rule]| {
            first_match(&document, rules).map(|(value, label)| {
                sources.insert(name.to_string(), label.to_string());
                value
            })
        };

        let title = field("title", TITLE_RULES);
        let description = field("description", DESCRIPTION_RULES);
        let raw_image = field("imageUrl", IMAGE_RULES);
        let site_name = field("siteName", SITE_NAME_RULES);
        let raw_favicon = field("favicon", FAVICON_RULES);
        let raw_canonical = field("canonicalUrl", CANONICAL_RULES);
        let content_type = field("contentType", CONTENT_TYPE_RULES);

        let canonical_url = raw_canonical
            .and_then(|c| resolve(page_url, &c))
            .filter(|c| c.starts_with("http://") || c.starts_with("https://"));
        // Relative resources resolve against the canonical URL when the page declares one
        let base = canonical_url
            .as_deref()
            .and_then(|c| Url::parse(c).ok())
            .unwrap_or_else(|| page_url.clone());

        let mut record = PreviewRecord::new(url);
        record.title = title;
        record.description = description;
        record.image_url = raw_image.and_then(|i| resolve(&base, &i));
        record.favicon = raw_favicon.and_then(|f| resolve(&base, &f));
        record.site_name = site_name;
        record.canonical_url = canonical_url;
        if let Some(content_type) = content_type {
            record.content_type = content_type.to_ascii_lowercase();
        }

        let subject = Url::parse(url).unwrap_or_else(|_| page_url.clone());
        let (official, service) = classify_first_party(&subject, &self.first_party_domains);
        record.is_first_party_official = official;
        record.official_service_name = service;

        record.extraction_sources = Some(sources);
        record.refresh_content_hash();
        record.quality_score = quality_score(&record);
        record
    }
}

fn check_content_type(page: &FetchedPage) -> Result<(), PreviewError> {
    match page.content_type.as_deref() {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            if ct.contains("text/html") || ct.contains("application/xhtml+xml") {
                Ok(())
            } else {
                Err(PreviewError::ParseError(format!("unsupported content type '{ct}'")))
            }
        }
        None => Ok(()),
    }
}

#[async_trait]
impl MetadataSource for MetadataExtractor {
    async fn extract(
        &self,
        url: &str,
        options: ExtractOptions,
    ) -> Result<PreviewRecord, PreviewError> {
        MetadataExtractor::extract(self, url, options).await
    }
}
