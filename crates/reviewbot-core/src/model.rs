//! Record types shared by the harvester, the synthesizer and the browser session.

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A business returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Location string of the search that produced this restaurant.
    pub location: String,
}

/// A single review body with its star rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub text: String,
    pub rating: i32,
}

impl Review {
    pub fn new(text: impl Into<String>, rating: i32) -> Self {
        Self {
            text: text.into(),
            rating,
        }
    }
}

/// Reviews collected for one restaurant, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub url: String,
    #[serde(with = "indexed_reviews")]
    pub reviews: Vec<Review>,
}

impl AggregateEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reviews: Vec::new(),
        }
    }

    pub fn with_reviews(url: impl Into<String>, reviews: Vec<Review>) -> Self {
        Self {
            url: url.into(),
            reviews,
        }
    }
}

/// Restaurant name to [`AggregateEntry`], preserving insertion order.
///
/// Entries are keyed by display name; two distinct businesses sharing a name
/// collapse into one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewAggregate {
    entries: IndexMap<String, AggregateEntry>,
}

impl ReviewAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(name: impl Into<String>, entry: AggregateEntry) -> Self {
        let mut aggregate = Self::new();
        aggregate.insert(name, entry);
        aggregate
    }

    /// Insert an entry. An existing entry with the same name is replaced in place.
    pub fn insert(&mut self, name: impl Into<String>, entry: AggregateEntry) {
        match self.entries.entry(name.into()) {
            Entry::Occupied(mut slot) => {
                warn!(
                    restaurant = %slot.key(),
                    previous_reviews = slot.get().reviews.len(),
                    "replacing existing aggregate entry with the same name"
                );
                slot.insert(entry);
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
    }

    /// Union with `other`; on duplicate names the entry from `other` wins.
    pub fn merge(&mut self, other: ReviewAggregate) {
        for (name, entry) in other.entries {
            self.insert(name, entry);
        }
    }

    pub fn get(&self, name: &str) -> Option<&AggregateEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregateEntry)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn review_count(&self) -> usize {
        self.entries.values().map(|entry| entry.reviews.len()).sum()
    }
}

impl IntoIterator for ReviewAggregate {
    type Item = (String, AggregateEntry);
    type IntoIter = indexmap::map::IntoIter<String, AggregateEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, AggregateEntry)> for ReviewAggregate {
    fn from_iter<I: IntoIterator<Item = (String, AggregateEntry)>>(iter: I) -> Self {
        let mut aggregate = Self::new();
        for (name, entry) in iter {
            aggregate.insert(name, entry);
        }
        aggregate
    }
}

/// One synthetic review bound to the restaurant it was generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReview {
    pub name: String,
    pub url: String,
    #[serde(flatten)]
    pub review: Review,
}

/// Reviews are stored on disk as `{"0": {...}, "1": {...}}`.
mod indexed_reviews {
    use indexmap::IndexMap;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Review;

    pub fn serialize<S>(reviews: &[Review], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(
            reviews
                .iter()
                .enumerate()
                .map(|(index, review)| (index.to_string(), review)),
        )
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Review>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let indexed = IndexMap::<String, Review>::deserialize(deserializer)?;
        let mut reviews = Vec::with_capacity(indexed.len());
        for (position, (key, review)) in indexed.into_iter().enumerate() {
            match key.parse::<usize>() {
                Ok(index) if index == position => reviews.push(review),
                _ => {
                    return Err(D::Error::custom(format!(
                        "review index '{key}' out of sequence, expected {position}"
                    )));
                }
            }
        }
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(url: &str, reviews: &[(&str, i32)]) -> AggregateEntry {
        AggregateEntry::with_reviews(
            url,
            reviews
                .iter()
                .map(|(text, rating)| Review::new(*text, *rating))
                .collect(),
        )
    }

    #[test]
    fn test_merge_duplicate_name_last_write_wins() {
        let mut first = ReviewAggregate::new();
        first.insert("Luigi's", entry("https://a", &[("old", 2)]));
        first.insert("Sushi Bar", entry("https://b", &[("fresh", 5)]));

        let mut second = ReviewAggregate::new();
        second.insert("Luigi's", entry("https://c", &[("new", 4)]));

        first.merge(second);

        assert_eq!(first.len(), 2);
        let luigi = first.get("Luigi's").expect("entry present");
        assert_eq!(luigi.url, "https://c");
        assert_eq!(luigi.reviews, vec![Review::new("new", 4)]);
        assert_eq!(first.names().collect::<Vec<_>>(), vec!["Luigi's", "Sushi Bar"]);
    }

    #[test]
    fn test_serializes_reviews_with_index_keys() {
        let aggregate = ReviewAggregate::single(
            "Luigi's",
            entry("https://a", &[("great pasta", 5), ("good service", 4)]),
        );

        let value = serde_json::to_value(&aggregate).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "Luigi's": {
                    "url": "https://a",
                    "reviews": {
                        "0": {"text": "great pasta", "rating": 5},
                        "1": {"text": "good service", "rating": 4}
                    }
                }
            })
        );
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let mut aggregate = ReviewAggregate::new();
        aggregate.insert("Zeta", entry("https://z", &[("z1", 3), ("z2", 1)]));
        aggregate.insert("Alpha", entry("https://a", &[("a1", 5)]));
        aggregate.insert("Mid", entry("https://m", &[]));

        let json = serde_json::to_string_pretty(&aggregate).expect("serialize");
        let restored: ReviewAggregate = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(
            restored.names().collect::<Vec<_>>(),
            vec!["Zeta", "Alpha", "Mid"]
        );
        for ((name, left), (other, right)) in aggregate.iter().zip(restored.iter()) {
            assert_eq!(name, other);
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_rejects_non_contiguous_indices() {
        let raw = r#"{"Luigi's": {"url": "u", "reviews": {"0": {"text": "a", "rating": 1}, "2": {"text": "b", "rating": 2}}}}"#;
        let err = serde_json::from_str::<ReviewAggregate>(raw).unwrap_err();
        assert!(err.to_string().contains("out of sequence"));
    }

    #[test]
    fn test_generated_review_flattens_review_fields() {
        let generated = GeneratedReview {
            name: "Luigi's".to_string(),
            url: "https://a".to_string(),
            review: Review::new("tasty", 4),
        };
        let value = serde_json::to_value(&generated).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"name": "Luigi's", "url": "https://a", "text": "tasty", "rating": 4})
        );
    }
}
