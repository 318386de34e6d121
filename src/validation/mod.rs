//! Validation (spec.md §4.9): fact verification plus schema checks. Never
//! fatal — results only ever populate `PipelineContext::validation_errors`.

pub mod verifier;

use crate::types::context::FeaturedItem;

/// Schema checks (spec.md §4.9 item 2): `digest_html` must be non-empty, and
/// every featured item must carry identification — `source_email_id` for
/// entity variants, `id` or `thread_id` for raw-email variants.
pub fn schema_errors(digest_html: &str, featured_items: &[FeaturedItem]) -> Vec<String> {
    let mut errors = Vec::new();

    if digest_html.trim().is_empty() {
        errors.push("digest_html is empty".to_string());
    }

    for (index, item) in featured_items.iter().enumerate() {
        if item.identification().is_none() {
            errors.push(format!("featured item at index {index} has no identification"));
        }
    }

    errors
}
