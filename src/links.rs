//! Mail-client link builders. Shapes are bit-exact per spec.md §6 and are
//! grounded on `gmail_link_builder.py`'s classmethods of the same names.

const BASE: &str = "https://mail.google.com/mail/u/0/#inbox/";
const SEARCH_BASE: &str = "https://mail.google.com/mail/u/0/#search/";
const LABEL_BASE: &str = "https://mail.google.com/mail/u/0/#label/";

/// `urlencoding::encode` already percent-encodes `/` as `%2F`, matching the
/// label link's requirement; `NON_ALPHANUMERIC`-style space-as-`+` behaviour
/// is not needed here since none of these ids/queries rely on it.
fn encode(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

pub fn thread_link(thread_id: &str) -> String {
    format!("{BASE}{}", encode(thread_id))
}

pub fn message_link(message_id: &str) -> String {
    format!("{BASE}{}", encode(message_id))
}

pub fn search_link(query: &str) -> String {
    format!("{SEARCH_BASE}{}", encode(query))
}

pub fn label_link(label: &str) -> String {
    format!("{LABEL_BASE}{}", encode(label))
}

/// Given a thread id, message id, or bare subject (in priority order per
/// spec.md §4.8), build the best available mail-client link.
pub fn best_link(thread_id: Option<&str>, message_id: Option<&str>, subject_fallback: &str) -> String {
    if let Some(id) = thread_id.filter(|s| !s.is_empty()) {
        return thread_link(id);
    }
    if let Some(id) = message_id.filter(|s| !s.is_empty()) {
        return message_link(id);
    }
    search_link(subject_fallback)
}
