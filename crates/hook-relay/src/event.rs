//! Decoding of inbound event payloads into a small set of event kinds.
//!
//! Only the fields that routing looks at are decoded. Every level of the
//! nested paths is optional, and `null` is treated the same as absent.

use serde::Deserialize;

use crate::error::RelayError;

/// Header carrying the event-type discriminator.
pub const EVENT_TYPE_HEADER: &str = "x-github-event";

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// A decoded webhook delivery, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEnvelope {
    Push { git_ref: Option<String> },
    /// Any `pull_request` action, not only `opened`.
    PullRequest { base_branch: Option<String> },
    PullRequestReview { base_branch: Option<String> },
    PullRequestReviewComment { base_branch: Option<String> },
    Issues { labels: Vec<String> },
    IssueEvent { labels: Vec<String> },
    IssueComment { labels: Vec<String> },
    Other { event_type: String },
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref", default)]
    git_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    #[serde(default)]
    pull_request: Option<PullRequest>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    #[serde(default)]
    base: Option<BranchRef>,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    #[serde(rename = "ref", default)]
    git_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    #[serde(default)]
    issue: Option<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    #[serde(default)]
    labels: Option<Vec<Label>>,
}

#[derive(Debug, Deserialize)]
struct Label {
    #[serde(default)]
    name: Option<String>,
}

impl PullRequestPayload {
    fn base_branch(self) -> Option<String> {
        self.pull_request?.base?.git_ref
    }
}

impl IssuePayload {
    /// Label names in payload order. Labels without a name are skipped.
    fn label_names(self) -> Vec<String> {
        self.issue
            .and_then(|issue| issue.labels)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| label.name)
            .collect()
    }
}

impl EventEnvelope {
    /// Decode `body` as the event kind named by `event_type`.
    ///
    /// Unrecognized event types decode to [`EventEnvelope::Other`] as long as
    /// the body is a JSON object.
    pub fn decode(event_type: &str, body: &[u8]) -> Result<Self, RelayError> {
        let undecodable = |source: serde_json::Error| RelayError::UndecodablePayload {
            event_type: event_type.to_string(),
            source,
        };

        let envelope = match event_type {
            "push" => {
                let payload: PushPayload = serde_json::from_slice(body).map_err(undecodable)?;
                EventEnvelope::Push {
                    git_ref: payload.git_ref,
                }
            }
            "pull_request" => EventEnvelope::PullRequest {
                base_branch: decode_pull_request(body).map_err(undecodable)?,
            },
            "pull_request_review" => EventEnvelope::PullRequestReview {
                base_branch: decode_pull_request(body).map_err(undecodable)?,
            },
            "pull_request_review_comment" => EventEnvelope::PullRequestReviewComment {
                base_branch: decode_pull_request(body).map_err(undecodable)?,
            },
            "issues" => EventEnvelope::Issues {
                labels: decode_issue(body).map_err(undecodable)?,
            },
            "issue_event" => EventEnvelope::IssueEvent {
                labels: decode_issue(body).map_err(undecodable)?,
            },
            "issue_comment" => EventEnvelope::IssueComment {
                labels: decode_issue(body).map_err(undecodable)?,
            },
            other => {
                serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(body)
                    .map_err(undecodable)?;
                EventEnvelope::Other {
                    event_type: other.to_string(),
                }
            }
        };

        Ok(envelope)
    }

    /// The short kind name used in logs.
    pub fn kind(&self) -> &str {
        match self {
            EventEnvelope::Push { .. } => "push",
            EventEnvelope::PullRequest { .. } => "pull_request",
            EventEnvelope::PullRequestReview { .. } => "pull_request_review",
            EventEnvelope::PullRequestReviewComment { .. } => "pull_request_review_comment",
            EventEnvelope::Issues { .. } => "issues",
            EventEnvelope::IssueEvent { .. } => "issue_event",
            EventEnvelope::IssueComment { .. } => "issue_comment",
            EventEnvelope::Other { event_type } => event_type.as_str(),
        }
    }
}

fn decode_pull_request(body: &[u8]) -> Result<Option<String>, serde_json::Error> {
    serde_json::from_slice::<PullRequestPayload>(body).map(PullRequestPayload::base_branch)
}

fn decode_issue(body: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_slice::<IssuePayload>(body).map(IssuePayload::label_names)
}

/// Branch name of a push ref. Tags and other non-branch refs yield `None`.
pub fn branch_of_ref(git_ref: &str) -> Option<&str> {
    git_ref.strip_prefix(BRANCH_REF_PREFIX)
}
