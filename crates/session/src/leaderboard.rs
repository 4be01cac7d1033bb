//! Global leaderboard client.
//!
//! Same external-service posture as the room directory: best effort, short
//! timeout, errors surfaced to the caller who decides whether to mention it.
//! A submission that fails is gone; there is no retry queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// How many entries a top-scores fetch asks for.
pub const TOP_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    /// Furthest delivery distance reached, in world units.
    pub distance: u32,
    /// Run length in whole seconds.
    pub time: u32,
    /// Run date, formatted by the submitter.
    pub date: String,
    pub persona: String,
    pub difficulty: u32,
    pub is_mobile: bool,
    pub seed: String,
}

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("failed to start http runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("leaderboard request failed: {0}")]
    Request(#[from] reqwest::Error),
}

fn block_on<F, T>(future: F) -> Result<T, LeaderboardError>
where
    F: std::future::Future<Output = Result<T, reqwest::Error>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(LeaderboardError::Runtime)?;
    runtime.block_on(future).map_err(LeaderboardError::from)
}

pub fn fetch_top(base_url: &str) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
    let url = format!(
        "{}/leaderboard?limit={}",
        base_url.trim_end_matches('/'),
        TOP_LIMIT
    );
    block_on(async move {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<LeaderboardEntry>>()
            .await
    })
}

pub fn submit(base_url: &str, entry: &LeaderboardEntry) -> Result<(), LeaderboardError> {
    let url = format!("{}/leaderboard", base_url.trim_end_matches('/'));
    let body = entry.clone();
    let result = block_on(async move {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    });
    if result.is_ok() {
        info!(name = %entry.name, distance = entry.distance, "score_submitted");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_wire_shape() {
        let entry = LeaderboardEntry {
            name: "bob".into(),
            distance: 12_400,
            time: 310,
            date: "2026-08-29".into(),
            persona: "courier".into(),
            difficulty: 3,
            is_mobile: false,
            seed: "ABC123".into(),
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains(r#""isMobile":false"#));
        assert!(json.contains(r#""difficulty":3"#));
        let back: LeaderboardEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, entry);
    }

    #[test]
    fn dead_endpoint_reports_error() {
        assert!(fetch_top("http://127.0.0.1:1").is_err());
    }
}
