use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ReviewBotError;
use crate::model::{Restaurant, Review};
use crate::snapshot::{RESTAURANTS_FILE_NAME, SnapshotWriter};

const USER_AGENT: &str = "reviewbot/0.1";

/// Bearer-authenticated client for the business search and reviews endpoints.
#[derive(Debug, Clone)]
pub struct YelpClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl YelpClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ReviewBotError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(http, api_key, base_url))
    }

    pub fn with_client(
        http: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    pub fn search_url(&self, location: &str) -> String {
        format!(
            "{}search?term=restaurants&location={}",
            self.base_url,
            urlencoding::encode(location)
        )
    }

    pub fn reviews_url(&self, business_id: &str) -> String {
        format!("{}{}/reviews", self.base_url, urlencoding::encode(business_id))
    }

    /// Restaurants matching `location`. The location is sent as given.
    pub async fn search(&self, location: &str) -> Result<Vec<Restaurant>, ReviewBotError> {
        self.search_and_store(location, None).await
    }

    /// Like [`search`](Self::search), also writing the raw response when a writer is given.
    pub async fn search_and_store(
        &self,
        location: &str,
        snapshot: Option<&SnapshotWriter>,
    ) -> Result<Vec<Restaurant>, ReviewBotError> {
        let raw: Value = self.get_json(&self.search_url(location), "search").await?;
        let restaurants = parse_search_response(location, &raw)?;
        info!(location, count = restaurants.len(), "Search returned restaurants");

        if let Some(writer) = snapshot {
            writer.write(RESTAURANTS_FILE_NAME, &raw)?;
        }
        Ok(restaurants)
    }

    /// Reviews published for one business through the reviews endpoint.
    pub async fn business_reviews(
        &self,
        business_id: &str,
    ) -> Result<Vec<Review>, ReviewBotError> {
        let payload: ReviewsResponse = self
            .get_json(&self.reviews_url(business_id), "reviews")
            .await?;
        Ok(payload.reviews.into_iter().map(Review::from).collect())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        context: &str,
    ) -> Result<T, ReviewBotError> {
        debug!(url, "GET");
        let response = self.http.get(url).bearer_auth(&self.api_key).send().await?;
        if !response.status().is_success() {
            return Err(ReviewBotError::status(
                format!("{context} endpoint"),
                response.status(),
            ));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    businesses: Vec<BusinessPayload>,
}

#[derive(Debug, Deserialize)]
struct BusinessPayload {
    id: String,
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ReviewsResponse {
    reviews: Vec<ReviewPayload>,
}

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    text: String,
    rating: i32,
}

impl From<ReviewPayload> for Review {
    fn from(payload: ReviewPayload) -> Self {
        Review::new(payload.text, payload.rating)
    }
}

/// Extract restaurants from a raw search response.
pub fn parse_search_response(
    location: &str,
    raw: &Value,
) -> Result<Vec<Restaurant>, ReviewBotError> {
    let payload = SearchResponse::deserialize(raw)?;
    Ok(payload
        .businesses
        .into_iter()
        .map(|business| Restaurant {
            id: business.id,
            name: business.name,
            url: business.url,
            location: location.to_string(),
        })
        .collect())
}
