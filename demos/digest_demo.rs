//! Runnable demonstration of the digest pipeline end to end. Reduced from
//! the teacher's Lambda entrypoint (`src/main.rs`) to a local binary: no
//! DynamoDB snapshot, no SES send, no strategy fan-out — just a handful of
//! sample emails run through [`context_digest::Digest::generate`] with no
//! external collaborators wired in, so every graceful-degradation path runs.

use chrono::Utc;
use context_digest::types::email::{Email, EmailType};
use context_digest::Digest;
use tracing::info;

fn sample_emails() -> Vec<Email> {
    vec![
        Email {
            id: "msg-1".to_string(),
            thread_id: "thread-1".to_string(),
            subject: "Your flight UA 2418 is confirmed".to_string(),
            snippet: "Departs tomorrow at 6:45 AM from SFO to JFK. Confirmation ABC123.".to_string(),
            from: "noreply@united.com".to_string(),
            date: Utc::now().to_rfc2822(),
            email_type: EmailType::Event,
            importance: None,
        },
        Email {
            id: "msg-2".to_string(),
            thread_id: "thread-2".to_string(),
            subject: "Invoice due Friday".to_string(),
            snippet: "Your payment of $42.50 is due this Friday.".to_string(),
            from: "billing@example.com".to_string(),
            date: Utc::now().to_rfc2822(),
            email_type: EmailType::Notification,
            importance: None,
        },
        Email {
            id: "msg-3".to_string(),
            thread_id: "thread-3".to_string(),
            subject: "This week in tech".to_string(),
            snippet: "Our weekly roundup of the stories you missed.".to_string(),
            from: "digest@newsletter.example.com".to_string(),
            date: Utc::now().to_rfc2822(),
            email_type: EmailType::Newsletter,
            importance: None,
        },
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Building digest pipeline with no external collaborators configured");
    let digest = Digest::builder().build()?;

    let response = digest
        .generate(
            sample_emails(),
            Utc::now(),
            "America/New_York",
            Some("Sam".to_string()),
            Some("New York".to_string()),
            Some("NY".to_string()),
            false,
        )
        .await;

    println!("{}", response.html);
    println!("---");
    println!(
        "entities={} featured={} verified={} fallback={}",
        response.entities_count, response.featured_count, response.verified, response.fallback
    );

    Ok(())
}
