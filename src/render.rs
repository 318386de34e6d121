//! Deterministic HTML rendering (spec.md §4.8 fallback path). Grounded on
//! `synthesis_stage.py`'s `wrap_digest_html`/`_render_item`/`_render_deterministic`
//! — same CSS block, same section grouping, same global item numbering. The
//! footer brand line is this crate's own name rather than the original's
//! product name.

use std::collections::HashMap;

use crate::friendly_names::{friendly_type_name, friendly_type_name_singular};
use crate::links;
use crate::types::context::{FeaturedItem, Section};
#[cfg(test)]
use crate::types::email::Email;

const DIGEST_CSS: &str = r#"
        body {
            font-family: "Charter", "Bitstream Charter", "Sitka Text", Cambria, serif;
            font-size: 16px;
            line-height: 1.15;
            color: #2c2c2c;
            max-width: 680px;
            margin: 0 auto;
            padding: 40px 20px;
            background-color: #ffffff;
        }
        .greeting {
            margin-bottom: 32px;
            color: #4a4a4a;
        }
        .section {
            margin-bottom: 28px;
        }
        .section-content {
            margin-bottom: 14px;
        }
        .section h2 {
            font-size: 17px;
            margin: 0 0 10px 0;
        }
        .item-number {
            display: inline;
        }
        a {
            color: #0066cc;
            text-decoration: underline;
            text-decoration-thickness: 1px;
            text-underline-offset: 2px;
        }
        a:hover {
            color: #0052a3;
        }
        .footer {
            margin-top: 48px;
            padding-top: 24px;
            border-top: 1px solid #e0e0e0;
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            font-size: 13px;
            color: #999;
            text-align: center;
        }
        .label-counts {
            margin-bottom: 12px;
            font-size: 14px;
            color: #666;
        }
        .label-counts a {
            color: #666;
            text-decoration: none;
        }
        .label-counts a:hover {
            color: #333;
            text-decoration: underline;
        }
        .footer-brand {
            color: #999;
        }
"#;

/// Matches Python's `html.escape`: `&`, `<`, `>`, `"`, `'`, in that order so
/// ampersands inserted by later replacements are never re-escaped.
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn render_type_counts_line(type_counts: &HashMap<String, u32>) -> String {
    let mut entries: Vec<(&String, &u32)> = type_counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    entries
        .into_iter()
        .map(|(coarse_type, count)| {
            let label = if *count == 1 {
                friendly_type_name_singular(coarse_type)
            } else {
                friendly_type_name(coarse_type)
            };
            let link = links::label_link(coarse_type);
            format!(r#"<a href="{link}">{count} {label}</a>"#)
        })
        .collect::<Vec<_>>()
        .join(" &middot; ")
}

/// Wraps rendered body content parts in the full HTML document, with the
/// type-count footer line (spec.md §4.8 "Footer").
pub fn wrap_digest_html(content_parts: &[String], type_counts: &HashMap<String, u32>) -> String {
    let content = content_parts.join("\n");

    let type_counts_html = if type_counts.is_empty() {
        String::new()
    } else {
        let counts_line = render_type_counts_line(type_counts);
        if counts_line.is_empty() {
            String::new()
        } else {
            format!(r#"<div class="label-counts">{counts_line}</div>"#)
        }
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>{DIGEST_CSS}
    </style>
</head>
<body>
{content}
<div class="footer">
    {type_counts_html}
    <div class="footer-brand">Digest &middot; <a href="#">Settings</a></div>
</div>
</body>
</html>"#
    )
}

pub(crate) fn item_title(item: &FeaturedItem) -> String {
    match item {
        FeaturedItem::Entity(entity) => entity
            .kind
            .display_title()
            .unwrap_or_else(|| entity.header.source_subject.clone()),
        FeaturedItem::RawEmail(email) => {
            if email.subject.is_empty() {
                "Untitled".to_string()
            } else {
                email.subject.clone()
            }
        }
    }
}

pub(crate) fn item_link(item: &FeaturedItem) -> String {
    match item {
        FeaturedItem::Entity(entity) => links::best_link(
            Some(&entity.header.source_thread_id).filter(|s| !s.is_empty()),
            Some(&entity.header.source_email_id).filter(|s| !s.is_empty()),
            &entity.header.source_subject,
        ),
        FeaturedItem::RawEmail(email) => links::best_link(
            Some(&email.thread_id).filter(|s| !s.is_empty()),
            Some(&email.id).filter(|s| !s.is_empty()),
            &email.subject,
        ),
    }
}

/// Renders one list item: `(N) <a href="...">Title</a>`.
pub(crate) fn render_item(item: &FeaturedItem, item_number: usize) -> String {
    let title = escape_html(&item_title(item));
    let link = item_link(item);
    format!(
        r#"<div class="section-content"><span class="item-number">({item_number})</span> <a href="{link}">{title}</a></div>"#
    )
}

/// Deterministic fallback body (spec.md §4.8 "Deterministic fallback").
/// Combines `critical`+`today` into a single header; numbers items globally
/// across sections.
pub fn render_deterministic(
    greeting: Option<&str>,
    items_by_section: &HashMap<Section, Vec<FeaturedItem>>,
    noise_summary: &HashMap<String, u32>,
) -> Vec<String> {
    let mut parts = Vec::new();

    if let Some(greeting) = greeting.filter(|g| !g.is_empty()) {
        parts.push(format!(r#"<div class="greeting">{}</div>"#, escape_html(greeting)));
    }

    let combined_sections: &[(&[Section], &str)] = &[
        (&[Section::Critical, Section::Today], "Today/Urgent"),
        (&[Section::ComingUp], "Coming Up"),
        (&[Section::WorthKnowing], "Worth Knowing"),
    ];

    let mut item_number = 1usize;
    let mut any_content = false;
    for (keys, header) in combined_sections {
        let items: Vec<&FeaturedItem> = keys
            .iter()
            .filter_map(|k| items_by_section.get(k))
            .flatten()
            .collect();
        if items.is_empty() {
            continue;
        }

        any_content = true;
        parts.push(r#"<div class="section">"#.to_string());
        parts.push(format!("<h2>{header}</h2>"));
        for item in items {
            parts.push(render_item(item, item_number));
            item_number += 1;
        }
        parts.push("</div>".to_string());
    }

    if !noise_summary.is_empty() {
        any_content = true;
        let mut entries: Vec<(&String, &u32)> = noise_summary.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let noise_text = entries
            .into_iter()
            .map(|(cat, count)| format!("{count} {}", friendly_type_name(cat)))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push("<br>".to_string());
        parts.push(r#"<div class="section">"#.to_string());
        parts.push(format!(r#"<div class="section-content">You also have: {}.</div>"#, escape_html(&noise_text)));
        parts.push("</div>".to_string());
    }

    if !any_content {
        parts.push(
            r#"<div class="section"><div class="section-content">Your inbox is clear.</div></div>"#
                .to_string(),
        );
    }

    parts
}

/// Plain-text rendering used alongside `digest_html` in the response (spec.md
/// §6 `text` field). Strips the presentation entirely: one line per item,
/// grouped the same way as the HTML fallback.
pub fn render_text(
    greeting: Option<&str>,
    items_by_section: &HashMap<Section, Vec<FeaturedItem>>,
    noise_summary: &HashMap<String, u32>,
) -> String {
    let mut lines = Vec::new();
    if let Some(greeting) = greeting.filter(|g| !g.is_empty()) {
        lines.push(greeting.to_string());
        lines.push(String::new());
    }

    let combined_sections: &[(&[Section], &str)] = &[
        (&[Section::Critical, Section::Today], "Today/Urgent"),
        (&[Section::ComingUp], "Coming Up"),
        (&[Section::WorthKnowing], "Worth Knowing"),
    ];

    let mut any_content = false;
    for (keys, header) in combined_sections {
        let items: Vec<&FeaturedItem> = keys
            .iter()
            .filter_map(|k| items_by_section.get(k))
            .flatten()
            .collect();
        if items.is_empty() {
            continue;
        }
        any_content = true;
        lines.push(format!("{header}:"));
        for item in items {
            lines.push(format!("- {}", item_title(item)));
        }
        lines.push(String::new());
    }

    if !noise_summary.is_empty() {
        any_content = true;
        let total: u32 = noise_summary.values().sum();
        lines.push(format!("You also have {total} other item(s)."));
    }

    if !any_content {
        lines.push("Your inbox is clear.".to_string());
    }

    lines.join("\n").trim().to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::email::EmailType;

    fn raw_email(id: &str, subject: &str) -> FeaturedItem {
        FeaturedItem::RawEmail(Email {
            id: id.into(),
            thread_id: format!("{id}-t"),
            subject: subject.into(),
            snippet: String::new(),
            from: "a@example.com".into(),
            date: "Mon, 10 Nov 2025 12:00:00 +0000".into(),
            email_type: EmailType::Message,
            importance: None,
        })
    }

    #[test]
    fn escapes_script_tags() {
        assert_eq!(escape_html("<script>alert(1)</script>"), "&lt;script&gt;alert(1)&lt;/script&gt;");
    }

    #[test]
    fn numbers_items_globally_across_sections() {
        let mut items_by_section = HashMap::new();
        items_by_section.insert(Section::Today, vec![raw_email("e1", "First")]);
        items_by_section.insert(Section::ComingUp, vec![raw_email("e2", "Second")]);

        let parts = render_deterministic(None, &items_by_section, &HashMap::new());
        let joined = parts.join("\n");
        assert!(joined.contains("(1)"));
        assert!(joined.contains("(2)"));
    }

    #[test]
    fn critical_and_today_combine_into_one_header() {
        let mut items_by_section = HashMap::new();
        items_by_section.insert(Section::Critical, vec![raw_email("e1", "Urgent")]);
        items_by_section.insert(Section::Today, vec![raw_email("e2", "Also today")]);

        let parts = render_deterministic(None, &items_by_section, &HashMap::new());
        let header_count = parts.iter().filter(|p| p.contains("Today/Urgent")).count();
        assert_eq!(header_count, 1);
    }

    #[test]
    fn wrap_digest_html_includes_footer_counts() {
        let mut counts = HashMap::new();
        counts.insert("newsletter".to_string(), 3u32);
        let html = wrap_digest_html(&["<p>hi</p>".to_string()], &counts);
        assert!(html.contains("3 newsletters"));
        assert!(html.contains("<!DOCTYPE html>"));
    }

    #[test]
    fn footer_count_of_one_is_singular() {
        let mut counts = HashMap::new();
        counts.insert("newsletter".to_string(), 1u32);
        let html = wrap_digest_html(&["<p>hi</p>".to_string()], &counts);
        assert!(html.contains("1 newsletter"));
        assert!(!html.contains("1 newsletters"));
    }

    #[test]
    fn no_featured_items_and_no_noise_renders_inbox_is_clear() {
        let parts = render_deterministic(None, &HashMap::new(), &HashMap::new());
        assert!(parts.iter().any(|p| p.contains("inbox is clear")));
    }

    #[test]
    fn word_count_counts_whitespace_separated_tokens() {
        assert_eq!(word_count("hello   world\nfoo"), 3);
    }
}
