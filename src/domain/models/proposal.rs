//! Proposal / Vote domain models for the negotiation engine (spec §3 / §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Consensus strategy governing how a proposal resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsensusStrategy {
    Majority,
    Unanimous,
    Weighted,
    Veto,
}

/// Lifecycle status of a [`Proposal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalStatus {
    Open,
    Resolved,
    Rejected,
    Expired,
    Vetoed,
}

/// A choice cast by a voter: either an option string, a veto, or an abstain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Option(String),
    Veto,
    Abstain,
}

/// A single immutable vote cast against a [`Proposal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: Uuid,
    pub voter: String,
    pub role: String,
    pub choice: VoteChoice,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A decision put to the group for consensus (spec §3 / §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub proposer: String,
    pub proposer_role: String,
    pub description: String,
    pub options: Vec<String>,
    pub strategy: ConsensusStrategy,
    /// Empty means "all voters eligible".
    pub eligible_voters: Vec<String>,
    pub quorum: usize,
    pub timeout_ms: u64,
    pub status: ProposalStatus,
    pub context: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub votes: Vec<Vote>,
}

impl Proposal {
    pub fn is_eligible(&self, voter: &str) -> bool {
        self.eligible_voters.is_empty() || self.eligible_voters.iter().any(|v| v == voter)
    }

    pub fn has_voted(&self, voter: &str) -> bool {
        self.votes.iter().any(|v| v.voter == voter)
    }

    pub fn non_abstain_votes(&self) -> impl Iterator<Item = &Vote> {
        self.votes.iter().filter(|v| !matches!(v.choice, VoteChoice::Abstain))
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        let elapsed_ms = (now - self.created_at).num_milliseconds().max(0) as u64;
        elapsed_ms > self.timeout_ms
    }
}
