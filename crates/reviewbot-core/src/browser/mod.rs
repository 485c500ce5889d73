//! Browser automation for posting reviews.
//!
//! [`BrowserSession`] walks a fixed sequence of states over a [`Driver`]. The
//! page-specific locators live behind [`LoginFlow`] and [`ReviewForm`], so a
//! layout change on the site only touches one implementation.

mod launch;
pub mod webdriver;
pub mod yelp;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::config::{LoginCredentials, Settings};
use crate::model::Review;

pub use launch::{LaunchOptions, USER_AGENTS, random_user_agent};
pub use webdriver::WebDriverClient;
pub use yelp::YelpLayout;

/// Key code sent to confirm a form field.
pub const ENTER_KEY: &str = "\u{E007}";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How an element is located on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    XPath(&'static str),
    Css(&'static str),
    LinkText(&'static str),
}

impl Locator {
    /// Strategy name used by the WebDriver protocol.
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::XPath(_) => "xpath",
            Locator::Css(_) => "css selector",
            Locator::LinkText(_) => "link text",
        }
    }

    pub fn value(&self) -> &'static str {
        match self {
            Locator::XPath(value) | Locator::Css(value) | Locator::LinkText(value) => value,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.strategy(), self.value())
    }
}

/// Opaque handle to an element of the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

#[derive(Debug, Error)]
pub enum DriverError {
    /// Another element would receive the click, e.g. an overlay is already open.
    #[error("element click intercepted: {0}")]
    ClickIntercepted(String),
    #[error("no such element: {0}")]
    NoSuchElement(String),
    #[error("timed out after {waited:?} waiting for {locator}")]
    Timeout { locator: String, waited: Duration },
    #[error("webdriver error '{error}': {message}")]
    Protocol { error: String, message: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no browser session is open")]
    MissingSession,
}

/// Low-level browser capability.
#[async_trait]
pub trait Driver: Send {
    async fn start(&mut self, options: &LaunchOptions) -> Result<(), DriverError>;
    async fn goto(&mut self, url: &str) -> Result<(), DriverError>;
    /// Single lookup attempt; `None` when nothing matches yet.
    async fn find(&mut self, locator: &Locator) -> Result<Option<ElementId>, DriverError>;
    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementId>, DriverError>;
    async fn click(&mut self, element: &ElementId) -> Result<(), DriverError>;
    async fn send_keys(&mut self, element: &ElementId, text: &str) -> Result<(), DriverError>;
    async fn quit(&mut self) -> Result<(), DriverError>;

    /// Poll [`find`](Self::find) until an element matches or `timeout` elapses.
    async fn wait_for(
        &mut self,
        locator: &Locator,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<ElementId, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.find(locator).await? {
                return Ok(element);
            }
            pause_or_timeout(locator, deadline, timeout, poll_interval).await?;
        }
    }

    /// Poll [`find_all`](Self::find_all) until at least one element matches.
    async fn wait_for_all(
        &mut self,
        locator: &Locator,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<ElementId>, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = self.find_all(locator).await?;
            if !found.is_empty() {
                return Ok(found);
            }
            pause_or_timeout(locator, deadline, timeout, poll_interval).await?;
        }
    }
}

async fn pause_or_timeout(
    locator: &Locator,
    deadline: Instant,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), DriverError> {
    let now = Instant::now();
    if now >= deadline {
        return Err(DriverError::Timeout {
            locator: locator.to_string(),
            waited: timeout,
        });
    }
    sleep(poll_interval.min(deadline - now)).await;
    Ok(())
}

/// Short and long wait bounds used while locating elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waits {
    pub short: Duration,
    pub long: Duration,
    pub poll_interval: Duration,
}

impl Default for Waits {
    fn default() -> Self {
        Self::from_millis(
            crate::config::DEFAULT_SHORT_WAIT_MS,
            crate::config::DEFAULT_LONG_WAIT_MS,
        )
    }
}

impl Waits {
    pub fn from_millis(short_ms: u64, long_ms: u64) -> Self {
        Self {
            short: Duration::from_millis(short_ms),
            long: Duration::from_millis(long_ms),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::from_millis(settings.short_wait_ms, settings.long_wait_ms)
    }

    pub async fn short(
        &self,
        driver: &mut dyn Driver,
        locator: &Locator,
    ) -> Result<ElementId, DriverError> {
        driver
            .wait_for(locator, self.short, self.poll_interval)
            .await
    }

    pub async fn long(
        &self,
        driver: &mut dyn Driver,
        locator: &Locator,
    ) -> Result<ElementId, DriverError> {
        driver.wait_for(locator, self.long, self.poll_interval).await
    }

    pub async fn all_long(
        &self,
        driver: &mut dyn Driver,
        locator: &Locator,
    ) -> Result<Vec<ElementId>, DriverError> {
        driver
            .wait_for_all(locator, self.long, self.poll_interval)
            .await
    }
}

/// Treat an intercepted click as success; every other outcome passes through.
///
/// Used for the login button only: when the login panel is already open the
/// button sits under it.
pub fn tolerate_intercepted_click(result: Result<(), DriverError>) -> Result<(), DriverError> {
    match result {
        Err(DriverError::ClickIntercepted(detail)) => {
            warn!(%detail, "Login click intercepted; assuming the login panel is open");
            Ok(())
        }
        other => other,
    }
}

/// Site-specific login steps.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn authenticate(
        &self,
        driver: &mut dyn Driver,
        waits: &Waits,
        login: &LoginCredentials,
    ) -> Result<(), BrowserError>;
}

/// Site-specific review form steps.
#[async_trait]
pub trait ReviewForm: Send + Sync {
    async fn open(&self, driver: &mut dyn Driver, waits: &Waits) -> Result<(), BrowserError>;
    async fn fill(
        &self,
        driver: &mut dyn Driver,
        waits: &Waits,
        review: &Review,
    ) -> Result<(), BrowserError>;
}

/// The control for a 1-based `rating` among the rating controls of the form.
pub fn select_rating_control(
    controls: &[ElementId],
    rating: i32,
) -> Result<&ElementId, BrowserError> {
    usize::try_from(rating)
        .ok()
        .and_then(|position| position.checked_sub(1))
        .and_then(|index| controls.get(index))
        .ok_or(BrowserError::RatingOutOfRange {
            rating,
            available: controls.len(),
        })
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("rating {rating} has no matching control ({available} available)")]
    RatingOutOfRange { rating: i32, available: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    SessionOpen,
    Authenticated,
    OnReviewForm,
    Submitted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::SessionOpen => "open",
            SessionState::Authenticated => "authenticated",
            SessionState::OnReviewForm => "on the review form",
            SessionState::Submitted => "submitted",
        };
        f.write_str(label)
    }
}

/// One browser, logged in as one user, posting reviews.
///
/// Uninitialized -> SessionOpen -> Authenticated -> OnReviewForm -> Submitted.
/// A submitted session can authenticate against the next restaurant page.
pub struct BrowserSession<D, L> {
    driver: D,
    layout: L,
    login: LoginCredentials,
    launch: LaunchOptions,
    waits: Waits,
    state: SessionState,
}

impl<D, L> BrowserSession<D, L>
where
    D: Driver,
    L: LoginFlow + ReviewForm,
{
    pub fn new(
        driver: D,
        layout: L,
        login: LoginCredentials,
        launch: LaunchOptions,
        waits: Waits,
    ) -> Self {
        Self {
            driver,
            layout,
            login,
            launch,
            waits,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub async fn open(&mut self) -> Result<(), BrowserError> {
        self.expect_state("open a browser", &[SessionState::Uninitialized])?;
        info!(user_agent = %self.launch.user_agent, "Launching browser");
        self.driver.start(&self.launch).await?;
        self.state = SessionState::SessionOpen;
        Ok(())
    }

    pub async fn navigate_and_authenticate(
        &mut self,
        restaurant_url: &str,
    ) -> Result<(), BrowserError> {
        self.expect_state(
            "authenticate",
            &[SessionState::SessionOpen, SessionState::Submitted],
        )?;
        info!(url = restaurant_url, "Loading restaurant page");
        self.driver.goto(restaurant_url).await?;
        self.layout
            .authenticate(&mut self.driver, &self.waits, &self.login)
            .await?;
        self.state = SessionState::Authenticated;
        Ok(())
    }

    pub async fn open_review_form(&mut self) -> Result<(), BrowserError> {
        self.expect_state("open the review form", &[SessionState::Authenticated])?;
        self.layout.open(&mut self.driver, &self.waits).await?;
        self.state = SessionState::OnReviewForm;
        Ok(())
    }

    pub async fn submit_review(&mut self, review: &Review) -> Result<(), BrowserError> {
        self.expect_state("submit a review", &[SessionState::OnReviewForm])?;
        self.layout.fill(&mut self.driver, &self.waits, review).await?;
        self.state = SessionState::Submitted;
        info!(rating = review.rating, "Review submitted");
        Ok(())
    }

    /// Authenticate on `restaurant_url`, open its form and submit `review`.
    pub async fn post(
        &mut self,
        restaurant_url: &str,
        review: &Review,
    ) -> Result<(), BrowserError> {
        self.navigate_and_authenticate(restaurant_url).await?;
        self.open_review_form().await?;
        self.submit_review(review).await
    }

    /// Shut the browser down.
    pub async fn close(mut self) -> Result<(), BrowserError> {
        if self.state != SessionState::Uninitialized {
            self.driver.quit().await?;
        }
        Ok(())
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), BrowserError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BrowserError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}
