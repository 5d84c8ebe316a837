//! Ranked-candidate fallback.
//!
//! Candidates are tried strictly in order, each at most once, and resolution
//! stops at the first success. There is no parallel probing: a later
//! candidate is only contacted once every earlier one has failed.

use std::fmt::Display;
use std::future::Future;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::source::{DataSource, SourceQuery, SourceResponse};

/// Result of a single attempt against one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(String),
}

/// The candidate that succeeded and what it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<C, T> {
    pub candidate: C,
    pub payload: T,
    /// Number of candidates attempted, including the successful one.
    pub attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub candidate: String,
    pub reason: String,
}

/// Every candidate failed. Carries one reason per attempted candidate, in
/// attempt order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("all {} candidates failed{}", .failures.len(), summarize(.failures))]
pub struct ExhaustedError {
    pub failures: Vec<CandidateFailure>,
}

fn summarize(failures: &[CandidateFailure]) -> String {
    if failures.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = failures
        .iter()
        .map(|f| format!("{} ({})", f.candidate, f.reason))
        .collect();
    format!(": {}", parts.join("; "))
}

/// Try `attempt` on each candidate in order until one succeeds.
///
/// # Errors
/// [`ExhaustedError`] when every candidate failed or the list is empty.
pub async fn resolve<C, T, F, Fut>(
    candidates: &[C],
    mut attempt: F,
) -> Result<Resolved<C, T>, ExhaustedError>
where
    C: Clone + Display,
    F: FnMut(&C) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let mut failures = Vec::with_capacity(candidates.len());

    for (index, candidate) in candidates.iter().enumerate() {
        debug!(candidate = %candidate, attempt = index + 1, "trying candidate");

        match attempt(candidate).await {
            Outcome::Success(payload) => {
                return Ok(Resolved {
                    candidate: candidate.clone(),
                    payload,
                    attempts: index + 1,
                });
            }
            Outcome::Failure(reason) => {
                warn!(
                    candidate = %candidate,
                    attempt = index + 1,
                    total = candidates.len(),
                    reason = %reason,
                    "candidate failed"
                );
                failures.push(CandidateFailure {
                    candidate: candidate.to_string(),
                    reason,
                });
            }
        }
    }

    Err(ExhaustedError { failures })
}

/// Fetch from `source` for each candidate until a response passes
/// `is_success`.
pub async fn resolve_source_with<C, Q, P>(
    source: &dyn DataSource,
    candidates: &[C],
    mut query_for: Q,
    is_success: P,
) -> Result<Resolved<C, Value>, ExhaustedError>
where
    C: Clone + Display,
    Q: FnMut(&C) -> SourceQuery,
    P: Fn(&SourceResponse) -> bool,
{
    let is_success = &is_success;

    resolve(candidates, |candidate| {
        let query = query_for(candidate);
        async move {
            match source.fetch(&query).await {
                Ok(response) if is_success(&response) => Outcome::Success(response.payload),
                Ok(response) => Outcome::Failure(format!("status {}", response.status)),
                Err(e) => Outcome::Failure(e.to_string()),
            }
        }
    })
    .await
}

/// [`resolve_source_with`] using HTTP 200 as the success predicate.
pub async fn resolve_source<C, Q>(
    source: &dyn DataSource,
    candidates: &[C],
    query_for: Q,
) -> Result<Resolved<C, Value>, ExhaustedError>
where
    C: Clone + Display,
    Q: FnMut(&C) -> SourceQuery,
{
    resolve_source_with(source, candidates, query_for, SourceResponse::is_success).await
}
