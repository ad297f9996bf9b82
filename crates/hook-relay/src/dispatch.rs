//! Event classification and destination selection.
//!
//! Selection is a pure function of the decoded event and the request's rule
//! set. A specific match sends to exactly one destination; anything else
//! falls back to a broadcast over the selector kind the event carries.

use std::fmt;

use crate::error::RelayError;
use crate::event::{branch_of_ref, EventEnvelope, EVENT_TYPE_HEADER};
use crate::relay::forward::{Forwarder, InboundRequest};
use crate::rules::RuleSet;

/// How a destination set was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A branch rule matched.
    Branch(String),
    /// A label rule matched.
    Label(String),
    /// No branch matched: every branch destination.
    BranchBroadcast,
    /// No label matched: every label destination.
    LabelBroadcast,
    /// Unhandled event kind: every label and branch destination.
    Everything,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Branch(name) => write!(f, "branch:{name}"),
            Route::Label(name) => write!(f, "label:{name}"),
            Route::BranchBroadcast => f.write_str("broadcast:branches"),
            Route::LabelBroadcast => f.write_str("broadcast:labels"),
            Route::Everything => f.write_str("broadcast:all"),
        }
    }
}

/// Destinations chosen for one relay, in forwarding order. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSet {
    pub route: Route,
    pub destinations: Vec<String>,
}

impl DestinationSet {
    fn single(route: Route, destination: &str) -> Self {
        Self {
            route,
            destinations: vec![destination.to_string()],
        }
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

/// Choose the destinations for `event` under `rules`.
pub fn select_destinations(event: &EventEnvelope, rules: &RuleSet) -> DestinationSet {
    match event {
        EventEnvelope::Push { git_ref } => {
            by_branch(rules, git_ref.as_deref().and_then(branch_of_ref))
        }
        EventEnvelope::PullRequest { base_branch }
        | EventEnvelope::PullRequestReview { base_branch }
        | EventEnvelope::PullRequestReviewComment { base_branch } => {
            by_branch(rules, base_branch.as_deref())
        }
        EventEnvelope::Issues { labels }
        | EventEnvelope::IssueEvent { labels }
        | EventEnvelope::IssueComment { labels } => by_labels(rules, labels),
        EventEnvelope::Other { .. } => {
            let mut destinations = rules.label_destinations();
            destinations.extend(rules.branch_destinations());
            DestinationSet {
                route: Route::Everything,
                destinations,
            }
        }
    }
}

fn by_branch(rules: &RuleSet, branch: Option<&str>) -> DestinationSet {
    match branch.and_then(|name| rules.branch(name).map(|dest| (name, dest))) {
        Some((name, destination)) => {
            DestinationSet::single(Route::Branch(name.to_string()), destination)
        }
        None => DestinationSet {
            route: Route::BranchBroadcast,
            destinations: rules.branch_destinations(),
        },
    }
}

/// First label (in event order) with a rule wins.
fn by_labels(rules: &RuleSet, labels: &[String]) -> DestinationSet {
    let matched = labels
        .iter()
        .find_map(|name| rules.label(name).map(|dest| (name, dest)));

    match matched {
        Some((name, destination)) => {
            DestinationSet::single(Route::Label(name.clone()), destination)
        }
        None => DestinationSet {
            route: Route::LabelBroadcast,
            destinations: rules.label_destinations(),
        },
    }
}

/// Decodes inbound deliveries, selects destinations, and hands them to the
/// forwarder.
#[derive(Clone)]
pub struct Dispatcher {
    forwarder: Forwarder,
}

impl Dispatcher {
    pub fn new(forwarder: Forwarder) -> Self {
        Self { forwarder }
    }

    /// Relay one delivery. Returns the destination set that was fully relayed.
    ///
    /// Nothing is forwarded when the event cannot be decoded.
    pub async fn dispatch(
        &self,
        request: &InboundRequest,
        rules: &RuleSet,
        correlation_id: &str,
    ) -> Result<DestinationSet, RelayError> {
        let event_type = request
            .headers
            .get(EVENT_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(RelayError::MissingEventType {
                header: EVENT_TYPE_HEADER,
            })?;

        let event = EventEnvelope::decode(event_type, &request.body)?;
        let selected = select_destinations(&event, rules);

        let span = tracing::Span::current();
        span.record("route", tracing::field::display(&selected.route));
        span.record("destinations", selected.len());

        tracing::debug!(
            kind = %event.kind(),
            route = %selected.route,
            destinations = ?selected.destinations,
            "Destinations selected"
        );
        if selected.is_empty() {
            tracing::debug!("No destinations selected, nothing to relay");
        }

        self.forwarder
            .relay(request, &selected.destinations, correlation_id)
            .await?;

        Ok(selected)
    }
}
