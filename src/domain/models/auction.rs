//! Auction / Bid domain models for task auctions (spec §3 / §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskKind;

/// A capability/load/duration bid for a task auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub auction_id: Uuid,
    pub bidder: String,
    pub role: String,
    pub capability_score: f64,
    pub current_load: f64,
    pub estimated_duration_ms: u64,
    pub justification: Option<String>,
}

/// Error raised validating an incoming [`Bid`] (spec §4.9).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BidError {
    #[error("bidder {0} has already placed a bid in this auction")]
    DuplicateBidder(String),
    #[error("capability_score must be in [0,100], got {0}")]
    CapabilityOutOfRange(String),
    #[error("current_load must be in [0,100], got {0}")]
    LoadOutOfRange(String),
    #[error("estimated_duration_ms must be > 0, got {0}")]
    NonPositiveDuration(u64),
}

impl Bid {
    pub fn validate(&self, existing: &[Bid]) -> Result<(), BidError> {
        if existing.iter().any(|b| b.bidder == self.bidder) {
            return Err(BidError::DuplicateBidder(self.bidder.clone()));
        }
        if !(0.0..=100.0).contains(&self.capability_score) {
            return Err(BidError::CapabilityOutOfRange(self.capability_score.to_string()));
        }
        if !(0.0..=100.0).contains(&self.current_load) {
            return Err(BidError::LoadOutOfRange(self.current_load.to_string()));
        }
        if self.estimated_duration_ms == 0 {
            return Err(BidError::NonPositiveDuration(self.estimated_duration_ms));
        }
        Ok(())
    }
}

/// Result of a closed auction: the winning bid and its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionResult {
    pub winner: String,
    pub winning_score: f64,
}

/// A task auction collecting bids within a bidding window (spec §3 / §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: Uuid,
    pub task_id: String,
    pub task_kind: TaskKind,
    pub initiator: String,
    pub bidding_window_ms: u64,
    pub bids: Vec<Bid>,
    pub open: bool,
    pub result: Option<AuctionResult>,
    pub opened_at: DateTime<Utc>,
}

impl Auction {
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        let elapsed_ms = (now - self.opened_at).num_milliseconds().max(0) as u64;
        elapsed_ms >= self.bidding_window_ms
    }
}

/// Role priority used to break scoring ties (spec §4.9): lower index wins.
pub const ROLE_PRIORITY: &[&str] = &["architect", "strategist", "builder", "auditor", "tester", "releaser", "guardian"];

pub fn role_priority_rank(role: &str) -> usize {
    ROLE_PRIORITY.iter().position(|r| *r == role).unwrap_or(ROLE_PRIORITY.len())
}
