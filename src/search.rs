//! Client-side free-text filtering over fetched reviews.

use crate::api::types::Review;

/// Whether `query` is a case-insensitive substring of the guest name, the
/// listing name or the public comment. An empty query matches everything.
pub fn matches(review: &Review, query: &str) -> bool {
  let needle = query.to_lowercase();
  needle.is_empty()
    || [&review.guest_name, &review.listing_name, &review.public_review]
      .iter()
      .any(|field| field.to_lowercase().contains(&needle))
}

/// Reviews matching `query`, in their original order.
pub fn filter_reviews<'a>(reviews: &'a [Review], query: &str) -> Vec<&'a Review> {
  let needle = query.trim();
  reviews.iter().filter(|r| matches(r, needle)).collect()
}
