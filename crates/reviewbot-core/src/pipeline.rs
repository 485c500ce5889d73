//! Stage orchestration: search, harvest, generate, post.

use std::time::{Duration, Instant};

use tracing::info;

use crate::browser::{BrowserSession, Driver, LoginFlow, ReviewForm, SessionState};
use crate::completion::{ChatCompletionClient, CompletionBackend};
use crate::config::{ApiKeys, Settings};
use crate::error::ReviewBotError;
use crate::harvest::{
    ApiReviewSource, Harvester, HttpPageFetcher, ReviewSource, ScrapeReviewSource,
    ScrapeSelectors,
};
use crate::model::{Restaurant, ReviewAggregate};
use crate::search::YelpClient;
use crate::snapshot::SnapshotWriter;
use crate::synth::Synthesizer;

/// Where harvested reviews come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarvestStrategy {
    #[default]
    Api,
    Scrape,
}

/// Reports stage boundaries with elapsed time since the run started.
#[derive(Debug)]
pub struct StageLogger {
    program_start: Instant,
    stage_start: Instant,
    current_stage: Option<&'static str>,
}

impl Default for StageLogger {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl StageLogger {
    pub fn new(start: Instant) -> Self {
        Self {
            program_start: start,
            stage_start: start,
            current_stage: None,
        }
    }

    pub fn begin(&mut self, name: &'static str) {
        info!(
            stage = name,
            elapsed_ms = format_ms(self.program_start.elapsed()),
            "BEGIN"
        );
        self.stage_start = Instant::now();
        self.current_stage = Some(name);
    }

    pub fn end(&mut self, name: &'static str) {
        info!(
            stage = name,
            elapsed_ms = format_ms(self.program_start.elapsed()),
            stage_ms = format_ms(self.stage_start.elapsed()),
            "END"
        );
        self.current_stage = None;
    }

    pub fn current_stage(&self) -> Option<&'static str> {
        self.current_stage
    }
}

fn format_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Parameters of a search-harvest-generate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub location: String,
    pub page_count: usize,
    /// Harvest only the first `limit` search results.
    pub limit: Option<usize>,
    pub input_sample_limit: Option<usize>,
    pub per_restaurant: usize,
}

impl RunOptions {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            page_count: 1,
            limit: None,
            input_sample_limit: None,
            per_restaurant: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub restaurants: Vec<Restaurant>,
    pub true_reviews: ReviewAggregate,
    pub new_reviews: ReviewAggregate,
}

/// Owns the clients of one run. Each stage writes its snapshot when a
/// [`SnapshotWriter`] is configured.
pub struct ReviewBot<S, B> {
    search: YelpClient,
    harvester: Harvester<S>,
    synthesizer: Synthesizer<B>,
    snapshot: Option<SnapshotWriter>,
    logger: StageLogger,
}

impl ReviewBot<Box<dyn ReviewSource>, ChatCompletionClient> {
    pub fn from_settings(
        settings: &Settings,
        keys: &ApiKeys,
        strategy: HarvestStrategy,
        snapshot: Option<SnapshotWriter>,
    ) -> Result<Self, ReviewBotError> {
        let search = YelpClient::new(keys.yelp_api_key.clone(), settings.search_base_url.clone())?;
        let source: Box<dyn ReviewSource> = match strategy {
            HarvestStrategy::Api => Box::new(ApiReviewSource::new(search.clone())),
            HarvestStrategy::Scrape => Box::new(ScrapeReviewSource::new(
                HttpPageFetcher::new()?,
                ScrapeSelectors::default(),
            )?),
        };
        let backend = ChatCompletionClient::new(
            keys.openai_api_key.clone(),
            &settings.completion_base_url,
            settings.model.clone(),
            settings.max_tokens,
        );
        Ok(Self::new(search, source, backend, snapshot))
    }
}

impl<S: ReviewSource, B: CompletionBackend> ReviewBot<S, B> {
    pub fn new(
        search: YelpClient,
        source: S,
        backend: B,
        snapshot: Option<SnapshotWriter>,
    ) -> Self {
        Self::with_synthesizer(search, source, Synthesizer::new(backend), snapshot)
    }

    pub fn with_synthesizer(
        search: YelpClient,
        source: S,
        synthesizer: Synthesizer<B>,
        snapshot: Option<SnapshotWriter>,
    ) -> Self {
        Self {
            search,
            harvester: Harvester::new(source),
            synthesizer,
            snapshot,
            logger: StageLogger::default(),
        }
    }

    pub fn snapshot(&self) -> Option<&SnapshotWriter> {
        self.snapshot.as_ref()
    }

    pub async fn search(
        &mut self,
        location: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Restaurant>, ReviewBotError> {
        self.logger.begin("search");
        let mut restaurants = self
            .search
            .search_and_store(location, self.snapshot.as_ref())
            .await?;
        if let Some(limit) = limit {
            restaurants.truncate(limit);
        }
        self.logger.end("search");
        Ok(restaurants)
    }

    pub async fn harvest(
        &mut self,
        restaurants: &[Restaurant],
        page_count: usize,
    ) -> Result<ReviewAggregate, ReviewBotError> {
        self.logger.begin("harvest");
        let aggregate = self
            .harvester
            .harvest_many(restaurants, page_count, self.snapshot.as_ref())
            .await?;
        self.logger.end("harvest");
        Ok(aggregate)
    }

    pub async fn generate(
        &mut self,
        aggregate: &ReviewAggregate,
        input_sample_limit: Option<usize>,
        per_restaurant: usize,
    ) -> Result<ReviewAggregate, ReviewBotError> {
        self.logger.begin("generate");
        let generated = self
            .synthesizer
            .generate_batch(
                aggregate,
                input_sample_limit,
                per_restaurant,
                self.snapshot.as_ref(),
            )
            .await?;
        self.logger.end("generate");
        Ok(generated)
    }

    /// Search, harvest and generate in sequence.
    pub async fn run(&mut self, options: &RunOptions) -> Result<RunOutcome, ReviewBotError> {
        let restaurants = self.search(&options.location, options.limit).await?;
        let true_reviews = self.harvest(&restaurants, options.page_count).await?;
        let new_reviews = self
            .generate(
                &true_reviews,
                options.input_sample_limit,
                options.per_restaurant,
            )
            .await?;
        Ok(RunOutcome {
            restaurants,
            true_reviews,
            new_reviews,
        })
    }

    /// Post every review of `generated` through `session`, opening it first
    /// if needed. Returns the number of reviews submitted.
    pub async fn post<D, L>(
        &mut self,
        session: &mut BrowserSession<D, L>,
        generated: &ReviewAggregate,
    ) -> Result<usize, ReviewBotError>
    where
        D: Driver,
        L: LoginFlow + ReviewForm,
    {
        post_reviews(&mut self.logger, session, generated).await
    }
}

/// Post without a [`ReviewBot`]; used when reviews come from a snapshot file.
pub async fn post_reviews<D, L>(
    logger: &mut StageLogger,
    session: &mut BrowserSession<D, L>,
    generated: &ReviewAggregate,
) -> Result<usize, ReviewBotError>
where
    D: Driver,
    L: LoginFlow + ReviewForm,
{
    logger.begin("post");
    if session.state() == SessionState::Uninitialized {
        session.open().await?;
    }
    let mut posted = 0;
    for (name, entry) in generated.iter() {
        for review in &entry.reviews {
            info!(restaurant = name, rating = review.rating, "Posting review");
            session.post(&entry.url, review).await?;
            posted += 1;
        }
    }
    logger.end("post");
    Ok(posted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeDriver;
    use crate::browser::yelp::{
        EMAIL_FIELD, LOGIN_BUTTON, PASSWORD_FIELD, RATING_CONTROLS, REVIEW_TEXT,
        WRITE_REVIEW_LINK,
    };
    use crate::browser::{LaunchOptions, Waits, YelpLayout};
    use crate::config::LoginCredentials;
    use crate::model::{AggregateEntry, Review};
    use async_trait::async_trait;
    use reqwest::Client;

    struct StaticSource;

    #[async_trait]
    impl ReviewSource for StaticSource {
        async fn fetch_reviews(
            &self,
            restaurant: &Restaurant,
            _page_count: usize,
        ) -> Result<Vec<Review>, ReviewBotError> {
            Ok(vec![
                Review::new(format!("{} had great pasta", restaurant.name), 5),
                Review::new("good service", 4),
            ])
        }
    }

    struct CannedBackend;

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn complete(&self, _prompt: &str) -> Result<String, ReviewBotError> {
            Ok("The lasagna was rich.".to_string())
        }
    }

    fn bot() -> ReviewBot<StaticSource, CannedBackend> {
        ReviewBot::with_synthesizer(
            YelpClient::with_client(Client::new(), "key", "http://127.0.0.1:9/"),
            StaticSource,
            Synthesizer::with_seed(CannedBackend, 3),
            None,
        )
    }

    fn restaurant(name: &str) -> Restaurant {
        Restaurant {
            id: name.to_lowercase(),
            name: name.to_string(),
            url: format!("https://www.yelp.com/biz/{}", name.to_lowercase()),
            location: "Oakland".to_string(),
        }
    }

    #[test]
    fn test_stage_logger_tracks_current_stage() {
        let mut logger = StageLogger::default();
        logger.begin("harvest");
        assert_eq!(logger.current_stage(), Some("harvest"));
        logger.end("harvest");
        assert_eq!(logger.current_stage(), None);
    }

    #[tokio::test]
    async fn test_harvest_then_generate() {
        let mut bot = bot();
        let restaurants = vec![restaurant("Luigis"), restaurant("Sushi")];
        let harvested = bot.harvest(&restaurants, 2).await.unwrap();
        assert_eq!(harvested.len(), 2);
        assert_eq!(harvested.review_count(), 4);

        let generated = bot.generate(&harvested, Some(1), 3).await.unwrap();
        assert_eq!(generated.review_count(), 6);
        let entry = generated.get("Sushi").unwrap();
        assert_eq!(entry.url, "https://www.yelp.com/biz/sushi");
        assert!(entry.reviews.iter().all(|r| (3..=5).contains(&r.rating)));
    }

    #[tokio::test]
    async fn test_post_submits_every_review() {
        let mut generated = ReviewAggregate::new();
        generated.insert(
            "Luigis",
            AggregateEntry::with_reviews(
                "https://www.yelp.com/biz/luigis",
                vec![Review::new("one", 4), Review::new("two", 5)],
            ),
        );
        generated.insert(
            "Sushi",
            AggregateEntry::with_reviews(
                "https://www.yelp.com/biz/sushi",
                vec![Review::new("three", 3)],
            ),
        );

        let driver = FakeDriver::default()
            .with(LOGIN_BUTTON, 1)
            .with(EMAIL_FIELD, 1)
            .with(PASSWORD_FIELD, 1)
            .with(WRITE_REVIEW_LINK, 1)
            .with(REVIEW_TEXT, 1)
            .with(RATING_CONTROLS, 5);
        let mut session = BrowserSession::new(
            driver,
            YelpLayout,
            LoginCredentials {
                email: "me@example.com".to_string(),
                password: "pw".to_string(),
            },
            LaunchOptions::with_user_agent("TestAgent/1.0", true),
            Waits::from_millis(5, 10),
        );

        let posted = bot().post(&mut session, &generated).await.unwrap();
        assert_eq!(posted, 3);
        assert_eq!(session.state(), SessionState::Submitted);
    }
}
