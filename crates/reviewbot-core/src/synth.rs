//! Synthetic review generation from harvested examples.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::{debug, info};

use crate::completion::CompletionBackend;
use crate::error::ReviewBotError;
use crate::model::{AggregateEntry, GeneratedReview, Review, ReviewAggregate};
use crate::snapshot::{NEW_REVIEWS_FILE_NAME, SnapshotWriter};

/// Offsets applied to the averaged rating of each batch-generated review.
pub const RATING_PERTURBATIONS: [i32; 3] = [-1, 0, 1];

/// Prompt asking for a new review in the style of the first `sample_limit`
/// reviews of `entry` (all of them when `None`).
pub fn build_prompt(name: &str, entry: &AggregateEntry, sample_limit: Option<usize>) -> String {
    let limit = sample_limit.unwrap_or(entry.reviews.len());
    let mut prompt = format!("Generate a new review for {name} based on the following reviews:\n");
    for review in entry.reviews.iter().take(limit) {
        prompt.push_str("- ");
        prompt.push_str(&review.text);
        prompt.push('\n');
    }
    prompt.push_str(
        "Make the new review about a specific dish that was mentioned in the given reviews. \
         Include one statement about the ambiance and one about the service, \
         and write it in the same style as the given reviews.\n",
    );
    prompt.push_str("New review:");
    prompt
}

/// Mean of all ratings in `entry`, truncated toward zero.
pub fn generate_rating(name: &str, entry: &AggregateEntry) -> Result<i32, ReviewBotError> {
    if entry.reviews.is_empty() {
        return Err(ReviewBotError::EmptyReviews {
            restaurant: name.to_string(),
        });
    }
    let sum: i64 = entry.reviews.iter().map(|review| i64::from(review.rating)).sum();
    let mean = sum / entry.reviews.len() as i64;
    Ok(mean as i32)
}

pub struct Synthesizer<B> {
    backend: B,
    rng: StdRng,
}

impl<B: CompletionBackend> Synthesizer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Deterministic perturbations, for reproducible runs.
    pub fn with_seed(backend: B, seed: u64) -> Self {
        Self {
            backend,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub async fn generate_text(
        &self,
        name: &str,
        entry: &AggregateEntry,
        sample_limit: Option<usize>,
    ) -> Result<String, ReviewBotError> {
        let prompt = build_prompt(name, entry, sample_limit);
        let response = self.backend.complete(&prompt).await?;
        Ok(response.trim().to_string())
    }

    /// One review with the unperturbed average rating.
    pub async fn generate_one(
        &self,
        name: &str,
        entry: &AggregateEntry,
        sample_limit: Option<usize>,
    ) -> Result<GeneratedReview, ReviewBotError> {
        let rating = generate_rating(name, entry)?;
        let text = self.generate_text(name, entry, sample_limit).await?;
        Ok(GeneratedReview {
            name: name.to_string(),
            url: entry.url.clone(),
            review: Review::new(text, rating),
        })
    }

    /// `output_count` reviews per restaurant, each rated at the truncated mean
    /// plus a random offset from [`RATING_PERTURBATIONS`]. Ratings are not clamped.
    ///
    /// Every entry is rated before the first completion request, so an entry
    /// without reviews fails the batch without any generation.
    pub async fn generate_batch(
        &mut self,
        aggregate: &ReviewAggregate,
        input_sample_limit: Option<usize>,
        output_count: usize,
        snapshot: Option<&SnapshotWriter>,
    ) -> Result<ReviewAggregate, ReviewBotError> {
        let rated = aggregate
            .iter()
            .map(|(name, entry)| Ok((name, entry, generate_rating(name, entry)?)))
            .collect::<Result<Vec<_>, ReviewBotError>>()?;

        let mut generated = ReviewAggregate::new();
        for (name, entry, base_rating) in rated {
            info!(
                restaurant = name,
                count = output_count,
                base_rating,
                "Generating reviews"
            );

            let mut reviews = Vec::with_capacity(output_count);
            for index in 0..output_count {
                let text = self.generate_text(name, entry, input_sample_limit).await?;
                let rating = base_rating + self.perturbation();
                debug!(restaurant = name, index, rating, "Generated review");
                reviews.push(Review::new(text, rating));
            }
            generated.insert(name, AggregateEntry::with_reviews(entry.url.clone(), reviews));
        }

        if let Some(writer) = snapshot {
            writer.write(NEW_REVIEWS_FILE_NAME, &generated)?;
        }
        Ok(generated)
    }

    fn perturbation(&mut self) -> i32 {
        RATING_PERTURBATIONS
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(0)
    }
}
