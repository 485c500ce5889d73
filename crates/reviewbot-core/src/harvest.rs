//! Review harvesting, either through the reviews endpoint or by scraping the
//! paginated review pages of each restaurant.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::browser::random_user_agent;
use crate::error::ReviewBotError;
use crate::model::{AggregateEntry, Restaurant, Review, ReviewAggregate};
use crate::search::YelpClient;
use crate::snapshot::{SnapshotWriter, TRUE_REVIEWS_FILE_NAME};

/// Reviews shown per result page; page `i` starts at offset `i * REVIEWS_PER_PAGE`.
pub const REVIEWS_PER_PAGE: usize = 10;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Strategy for retrieving the reviews of one restaurant.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn fetch_reviews(
        &self,
        restaurant: &Restaurant,
        page_count: usize,
    ) -> Result<Vec<Review>, ReviewBotError>;
}

#[async_trait]
impl<T: ReviewSource + ?Sized> ReviewSource for Box<T> {
    async fn fetch_reviews(
        &self,
        restaurant: &Restaurant,
        page_count: usize,
    ) -> Result<Vec<Review>, ReviewBotError> {
        (**self).fetch_reviews(restaurant, page_count).await
    }
}

/// Reads reviews from the business reviews endpoint. The endpoint is not
/// paginated, so `page_count` is ignored.
#[derive(Debug, Clone)]
pub struct ApiReviewSource {
    client: YelpClient,
}

impl ApiReviewSource {
    pub fn new(client: YelpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReviewSource for ApiReviewSource {
    async fn fetch_reviews(
        &self,
        restaurant: &Restaurant,
        _page_count: usize,
    ) -> Result<Vec<Review>, ReviewBotError> {
        self.client.business_reviews(&restaurant.id).await
    }
}

/// Fetches the HTML of one result page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<String, ReviewBotError>;
}

#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    http: Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, ReviewBotError> {
        let http = Client::builder().user_agent(random_user_agent()).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, ReviewBotError> {
        let response = self.http.get(url.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(ReviewBotError::status(
                format!("review page {url}"),
                response.status(),
            ));
        }
        Ok(response.text().await?)
    }
}

/// CSS selectors locating reviews in a result page.
///
/// `review` matches one container per review; `text` and `rating` are looked up
/// inside it. The rating element's `aria-label` starts with the star count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSelectors {
    pub review: String,
    pub text: String,
    pub rating: String,
}

impl Default for ScrapeSelectors {
    fn default() -> Self {
        Self {
            review: "#reviews li".to_string(),
            text: "p[class*=\"comment\"] span[lang]".to_string(),
            rating: "div[aria-label$=\"star rating\"]".to_string(),
        }
    }
}

struct CompiledSelectors {
    review: Selector,
    text: Selector,
    rating: Selector,
}

impl ScrapeSelectors {
    fn compile(&self) -> Result<CompiledSelectors, ReviewBotError> {
        Ok(CompiledSelectors {
            review: parse_selector(&self.review)?,
            text: parse_selector(&self.text)?,
            rating: parse_selector(&self.rating)?,
        })
    }
}

fn parse_selector(raw: &str) -> Result<Selector, ReviewBotError> {
    Selector::parse(raw)
        .map_err(|err| ReviewBotError::message(format!("invalid selector '{raw}': {err}")))
}

/// Scrapes `page_count` consecutive result pages per restaurant.
pub struct ScrapeReviewSource<F> {
    fetcher: F,
    selectors: CompiledSelectors,
}

impl<F: PageFetcher> ScrapeReviewSource<F> {
    /// Fails when any of the selectors does not parse.
    pub fn new(fetcher: F, selectors: ScrapeSelectors) -> Result<Self, ReviewBotError> {
        Ok(Self {
            fetcher,
            selectors: selectors.compile()?,
        })
    }
}

#[async_trait]
impl<F: PageFetcher> ReviewSource for ScrapeReviewSource<F> {
    async fn fetch_reviews(
        &self,
        restaurant: &Restaurant,
        page_count: usize,
    ) -> Result<Vec<Review>, ReviewBotError> {
        let mut reviews = Vec::new();
        for page in 0..page_count {
            let url = page_url(&restaurant.url, page)?;
            debug!(restaurant = %restaurant.name, %url, "Fetching review page");
            let html = self.fetcher.fetch_page(&url).await?;
            let page_reviews = parse_compiled(&html, &self.selectors)?;
            debug!(
                restaurant = %restaurant.name,
                page,
                count = page_reviews.len(),
                "Parsed review page"
            );
            reviews.extend(page_reviews);
        }
        Ok(reviews)
    }
}

/// URL of result page `page` (zero based) for a restaurant.
pub fn page_url(restaurant_url: &str, page: usize) -> Result<Url, ReviewBotError> {
    let mut url = Url::parse(restaurant_url)?;
    let offset = page * REVIEWS_PER_PAGE;
    url.query_pairs_mut()
        .append_pair("start", &offset.to_string());
    Ok(url)
}

/// Extract up to [`REVIEWS_PER_PAGE`] reviews from one result page.
pub fn parse_review_page(
    html: &str,
    selectors: &ScrapeSelectors,
) -> Result<Vec<Review>, ReviewBotError> {
    parse_compiled(html, &selectors.compile()?)
}

fn parse_compiled(html: &str, compiled: &CompiledSelectors) -> Result<Vec<Review>, ReviewBotError> {
    let document = Html::parse_document(html);
    let mut reviews = Vec::new();

    for container in document.select(&compiled.review) {
        if reviews.len() == REVIEWS_PER_PAGE {
            break;
        }
        let Some(text_node) = container.select(&compiled.text).next() else {
            continue;
        };
        let text = normalize_text(&element_text(text_node));
        let rating_node = container.select(&compiled.rating).next().ok_or_else(|| {
            ReviewBotError::MarkupDrift(format!(
                "no rating element next to review text '{}'",
                truncate(&text, 40)
            ))
        })?;
        let label = rating_node.value().attr("aria-label").unwrap_or_default();
        reviews.push(Review::new(text, parse_rating_label(label)?));
    }

    Ok(reviews)
}

/// Star count from an accessibility label such as `"4 star rating"`.
///
/// Only the first character is read.
pub fn parse_rating_label(label: &str) -> Result<i32, ReviewBotError> {
    label
        .chars()
        .next()
        .and_then(|ch| ch.to_digit(10))
        .map(|digit| digit as i32)
        .ok_or_else(|| ReviewBotError::MarkupDrift(format!("unreadable rating label '{label}'")))
}

/// Replace non-breaking spaces and collapse whitespace runs.
pub fn normalize_text(raw: &str) -> String {
    let replaced = raw.replace('\u{a0}', " ");
    WHITESPACE.replace_all(&replaced, " ").trim().to_string()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Builds review aggregates from a [`ReviewSource`].
pub struct Harvester<S> {
    source: S,
}

impl<S: ReviewSource> Harvester<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Aggregate holding the single entry for `restaurant`.
    pub async fn harvest_one(
        &self,
        restaurant: &Restaurant,
        page_count: usize,
    ) -> Result<ReviewAggregate, ReviewBotError> {
        let reviews = self.source.fetch_reviews(restaurant, page_count).await?;
        info!(
            restaurant = %restaurant.name,
            reviews = reviews.len(),
            "Harvested reviews"
        );
        Ok(ReviewAggregate::single(
            restaurant.name.clone(),
            AggregateEntry::with_reviews(restaurant.url.clone(), reviews),
        ))
    }

    /// Harvest every restaurant in order and merge the results by name.
    ///
    /// The snapshot, when requested, is written once after the whole batch.
    pub async fn harvest_many(
        &self,
        restaurants: &[Restaurant],
        page_count: usize,
        snapshot: Option<&SnapshotWriter>,
    ) -> Result<ReviewAggregate, ReviewBotError> {
        let mut aggregate = ReviewAggregate::new();
        for (index, restaurant) in restaurants.iter().enumerate() {
            info!(
                "Harvesting {}/{}: {}",
                index + 1,
                restaurants.len(),
                restaurant.name
            );
            aggregate.merge(self.harvest_one(restaurant, page_count).await?);
        }

        if let Some(writer) = snapshot {
            writer.write(TRUE_REVIEWS_FILE_NAME, &aggregate)?;
        }
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn review_li(text: &str, label: &str) -> String {
        format!(
            r#"<li><div class="user"><div aria-label="{label}" role="img"></div></div>
               <p class="comment__09f24__D0cxf"><span class="raw__09f24__T4Ezm" lang="en">{text}</span></p></li>"#
        )
    }

    fn review_page(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(text, label)| review_li(text, label))
            .collect();
        format!(
            r#"<html><body><div id="reviews"><ul><li class="filter">Sort by</li>{body}</ul></div></body></html>"#
        )
    }

    fn restaurant(name: &str, url: &str) -> Restaurant {
        Restaurant {
            id: format!("{name}-id"),
            name: name.to_string(),
            url: url.to_string(),
            location: "Oakland".to_string(),
        }
    }

    struct RecordingFetcher {
        pages: Vec<String>,
        requested: Mutex<Vec<Url>>,
    }

    impl RecordingFetcher {
        fn new(pages: Vec<String>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn offsets(&self) -> Vec<String> {
            self.requested
                .lock()
                .unwrap()
                .iter()
                .map(|url| {
                    url.query_pairs()
                        .find(|(key, _)| key == "start")
                        .map(|(_, value)| value.into_owned())
                        .unwrap_or_default()
                })
                .collect()
        }
    }

    #[async_trait]
    impl PageFetcher for RecordingFetcher {
        async fn fetch_page(&self, url: &Url) -> Result<String, ReviewBotError> {
            let mut requested = self.requested.lock().unwrap();
            let page = self.pages[requested.len() % self.pages.len()].clone();
            requested.push(url.clone());
            Ok(page)
        }
    }

    #[async_trait]
    impl<'a> PageFetcher for &'a RecordingFetcher {
        async fn fetch_page(&self, url: &Url) -> Result<String, ReviewBotError> {
            (**self).fetch_page(url).await
        }
    }

    #[test]
    fn test_normalize_text_collapses_whitespace() {
        assert_eq!(
            normalize_text("  Great\u{a0}pasta,\n\n   friendly\tstaff "),
            "Great pasta, friendly staff"
        );
    }

    #[test]
    fn test_parse_rating_label_reads_first_character() {
        assert_eq!(parse_rating_label("4 star rating").unwrap(), 4);
        assert!(matches!(
            parse_rating_label("star rating"),
            Err(ReviewBotError::MarkupDrift(_))
        ));
        assert!(parse_rating_label("").is_err());
    }

    #[test]
    fn test_page_url_appends_offset() {
        let url = page_url("https://www.yelp.com/biz/luigis?adjust_creative=abc", 2).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.yelp.com/biz/luigis?adjust_creative=abc&start=20"
        );
    }

    #[test]
    fn test_parse_review_page_pairs_text_and_rating() {
        let html = review_page(&[
            ("Great\u{a0}pasta,   huge portions", "5 star rating"),
            ("Slow service", "2 star rating"),
        ]);
        let reviews = parse_review_page(&html, &ScrapeSelectors::default()).unwrap();
        assert_eq!(
            reviews,
            vec![
                Review::new("Great pasta, huge portions", 5),
                Review::new("Slow service", 2),
            ]
        );
    }

    #[test]
    fn test_parse_review_page_caps_at_page_size() {
        let items: Vec<(String, &str)> = (0..12)
            .map(|i| (format!("review {i}"), "3 star rating"))
            .collect();
        let borrowed: Vec<(&str, &str)> = items.iter().map(|(t, l)| (t.as_str(), *l)).collect();
        let reviews =
            parse_review_page(&review_page(&borrowed), &ScrapeSelectors::default()).unwrap();
        assert_eq!(reviews.len(), REVIEWS_PER_PAGE);
        assert_eq!(reviews[9].text, "review 9");
    }

    #[test]
    fn test_parse_review_page_missing_rating_is_markup_drift() {
        let html = r#"<div id="reviews"><ul><li><p class="comment"><span lang="en">No stars here</span></p></li></ul></div>"#;
        let err = parse_review_page(html, &ScrapeSelectors::default()).unwrap_err();
        assert!(matches!(err, ReviewBotError::MarkupDrift(_)));
    }

    #[test]
    fn test_scrape_source_rejects_invalid_selector_up_front() {
        let fetcher = RecordingFetcher::new(vec![review_page(&[("Nice", "4 star rating")])]);
        let selectors = ScrapeSelectors {
            rating: "div[aria-label".to_string(),
            ..ScrapeSelectors::default()
        };
        assert!(ScrapeReviewSource::new(&fetcher, selectors).is_err());
        assert!(fetcher.offsets().is_empty());
    }

    #[tokio::test]
    async fn test_harvest_one_fetches_each_page_with_offsets() {
        let fetcher = RecordingFetcher::new(vec![review_page(&[("Nice", "4 star rating")])]);
        let source = ScrapeReviewSource::new(&fetcher, ScrapeSelectors::default()).unwrap();
        let harvester = Harvester::new(source);

        let aggregate = harvester
            .harvest_one(&restaurant("Luigi's", "https://www.yelp.com/biz/luigis?osq=x"), 2)
            .await
            .unwrap();

        assert_eq!(fetcher.offsets(), vec!["0", "10"]);
        let entry = aggregate.get("Luigi's").unwrap();
        assert_eq!(entry.url, "https://www.yelp.com/biz/luigis?osq=x");
        assert_eq!(entry.reviews.len(), 2);
    }

    #[tokio::test]
    async fn test_harvest_many_bounded_by_pages_and_page_size() {
        let full: Vec<(String, &str)> = (0..15)
            .map(|i| (format!("dish {i}"), "5 star rating"))
            .collect();
        let full: Vec<(&str, &str)> = full.iter().map(|(t, l)| (t.as_str(), *l)).collect();
        let short = review_page(&[("only one", "1 star rating")]);
        let fetcher = RecordingFetcher::new(vec![review_page(&full), short]);
        let harvester =
            Harvester::new(ScrapeReviewSource::new(&fetcher, ScrapeSelectors::default()).unwrap());

        let restaurants = vec![
            restaurant("A", "https://www.yelp.com/biz/a?x=1"),
            restaurant("B", "https://www.yelp.com/biz/b?x=1"),
        ];
        let aggregate = harvester.harvest_many(&restaurants, 2, None).await.unwrap();

        assert_eq!(fetcher.offsets().len(), 4);
        assert!(aggregate.review_count() <= restaurants.len() * 2 * REVIEWS_PER_PAGE);
        assert_eq!(aggregate.review_count(), 2 * (REVIEWS_PER_PAGE + 1));
    }

    struct FixedSource;

    #[async_trait]
    impl ReviewSource for FixedSource {
        async fn fetch_reviews(
            &self,
            restaurant: &Restaurant,
            _page_count: usize,
        ) -> Result<Vec<Review>, ReviewBotError> {
            Ok(vec![Review::new(format!("from {}", restaurant.url), 3)])
        }
    }

    #[tokio::test]
    async fn test_harvest_many_duplicate_names_last_write_wins() {
        let harvester = Harvester::new(Box::new(FixedSource) as Box<dyn ReviewSource>);
        let restaurants = vec![
            restaurant("Luigi's", "https://one"),
            restaurant("Other", "https://two"),
            restaurant("Luigi's", "https://three"),
        ];

        let aggregate = harvester.harvest_many(&restaurants, 1, None).await.unwrap();

        assert_eq!(aggregate.len(), 2);
        assert_eq!(aggregate.names().collect::<Vec<_>>(), vec!["Luigi's", "Other"]);
        let luigi = aggregate.get("Luigi's").unwrap();
        assert_eq!(luigi.url, "https://three");
        assert_eq!(luigi.reviews[0].text, "from https://three");
    }

    #[tokio::test]
    async fn test_harvest_many_writes_snapshot_after_batch() {
        let temp = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp.path());
        let harvester = Harvester::new(FixedSource);

        harvester
            .harvest_many(&[restaurant("Luigi's", "https://one")], 1, Some(&writer))
            .await
            .unwrap();

        let stored = crate::snapshot::load_aggregate(&writer.path_for(TRUE_REVIEWS_FILE_NAME))
            .unwrap();
        assert_eq!(stored.review_count(), 1);
    }
}
