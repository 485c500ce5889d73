//! Core library for the review bot: search, harvest, synthesize and post.

pub mod browser;
pub mod completion;
pub mod config;
pub mod error;
pub mod harvest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod search;
pub mod snapshot;
pub mod synth;

pub use browser::{
    BrowserError, BrowserSession, Driver, DriverError, LaunchOptions, SessionState, Waits,
    WebDriverClient, YelpLayout,
};
pub use completion::{ChatCompletionClient, CompletionBackend};
pub use config::{
    ApiKeys, ConfigError, LoginCredentials, Settings, SettingsLoadResult, SettingsSource,
    config_directory, config_path, load_api_keys, load_login_credentials, load_settings,
    load_settings_with,
};
pub use error::ReviewBotError;
pub use harvest::{
    ApiReviewSource, Harvester, HttpPageFetcher, PageFetcher, ReviewSource, ScrapeReviewSource,
    ScrapeSelectors,
};
pub use logging::{LoggingDestination, LoggingError, init_logging};
pub use model::{AggregateEntry, GeneratedReview, Restaurant, Review, ReviewAggregate};
pub use pipeline::{HarvestStrategy, ReviewBot, RunOptions, RunOutcome, StageLogger, post_reviews};
pub use search::YelpClient;
pub use snapshot::{
    NEW_REVIEWS_FILE_NAME, RESTAURANTS_FILE_NAME, SnapshotWriter, TRUE_REVIEWS_FILE_NAME,
    load_aggregate,
};
pub use synth::Synthesizer;
