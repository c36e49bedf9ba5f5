//! Capability-scored task auctions (spec §4.9, C10b).
//!
//! Grounded on the same `abathur::services::event_bus` id-keyed registry
//! idiom as [`crate::services::negotiation_engine`]; the scoring formula
//! and tie-breaking are new per spec §4.9.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::error::ProtocolError;
use crate::domain::models::{role_priority_rank, Auction, AuctionResult, Bid, TaskKind};
use crate::services::message_bus::MessageBus;

/// Task auction registry: opens auctions, validates bids, and scores
/// winners (spec §4.9).
pub struct AuctionEngine {
    auctions: std::sync::Mutex<HashMap<Uuid, Auction>>,
    bus: Option<Arc<MessageBus>>,
}

impl AuctionEngine {
    pub fn new(bus: Option<Arc<MessageBus>>) -> Self {
        Self { auctions: std::sync::Mutex::new(HashMap::new()), bus }
    }

    pub fn open(&self, task_id: impl Into<String>, task_kind: TaskKind, initiator: impl Into<String>, bidding_window_ms: u64) -> Auction {
        let auction = Auction {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            task_kind,
            initiator: initiator.into(),
            bidding_window_ms,
            bids: Vec::new(),
            open: true,
            result: None,
            opened_at: Utc::now(),
        };
        self.auctions.lock().expect("auctions mutex poisoned").insert(auction.id, auction.clone());
        auction
    }

    pub fn get(&self, id: Uuid) -> Option<Auction> {
        self.auctions.lock().expect("auctions mutex poisoned").get(&id).cloned()
    }

    pub fn place_bid(&self, auction_id: Uuid, bid: Bid) -> Result<(), ProtocolError> {
        let mut auctions = self.auctions.lock().expect("auctions mutex poisoned");
        let auction = auctions
            .get_mut(&auction_id)
            .filter(|a| a.open)
            .ok_or_else(|| ProtocolError::AuctionClosed(auction_id.to_string()))?;
        bid.validate(&auction.bids)?;
        auction.bids.push(bid);
        Ok(())
    }

    /// `score = 0.4*capability + 0.3*(100-load) + 0.3*speed`;
    /// `speed = 100*(maxDuration-estimatedDuration)/maxDuration`, 0 if all
    /// durations equal (spec §4.9).
    fn score(bid: &Bid, max_duration_ms: u64) -> f64 {
        let speed = if max_duration_ms == 0 {
            0.0
        } else {
            100.0 * (max_duration_ms as f64 - bid.estimated_duration_ms as f64) / max_duration_ms as f64
        };
        0.4 * bid.capability_score + 0.3 * (100.0 - bid.current_load) + 0.3 * speed
    }

    /// Closes the auction and selects the highest-scoring bid, breaking
    /// ties by role priority. Empty auction, or an already-closed/unknown
    /// auction, returns `None` (spec §4.9).
    pub fn close(&self, auction_id: Uuid) -> Option<AuctionResult> {
        let mut auctions = self.auctions.lock().expect("auctions mutex poisoned");
        let auction = auctions.get_mut(&auction_id)?;
        if !auction.open {
            return None;
        }
        if auction.bids.is_empty() {
            auction.open = false;
            return None;
        }

        let max_duration = auction.bids.iter().map(|b| b.estimated_duration_ms).max().unwrap_or(0);
        let mut scored: Vec<(f64, &Bid)> = auction.bids.iter().map(|b| (Self::score(b, max_duration), b)).collect();
        scored.sort_by(|(score_a, bid_a), (score_b, bid_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| role_priority_rank(&bid_a.role).cmp(&role_priority_rank(&bid_b.role)))
        });

        let (winning_score, winner_bid) = scored[0];
        let result = AuctionResult { winner: winner_bid.bidder.clone(), winning_score };
        auction.open = false;
        auction.result = Some(result.clone());

        if let Some(bus) = &self.bus {
            let bus = bus.clone();
            let payload = serde_json::json!({
                "auctionId": auction_id.to_string(),
                "winner": result.winner,
                "score": result.winning_score,
            });
            tokio::spawn(async move {
                bus.publish("auction.closed", "auction-engine", "system", payload, None).await;
            });
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BidError;

    fn bid(auction_id: Uuid, bidder: &str, role: &str, capability: f64, load: f64, duration_ms: u64) -> Bid {
        Bid {
            auction_id,
            bidder: bidder.to_string(),
            role: role.to_string(),
            capability_score: capability,
            current_load: load,
            estimated_duration_ms: duration_ms,
            justification: None,
        }
    }

    #[test]
    fn highest_scoring_bid_wins() {
        let engine = AuctionEngine::new(None);
        let auction = engine.open("t1", TaskKind::Code, "architect", 5_000);
        engine.place_bid(auction.id, bid(auction.id, "fast", "builder", 90.0, 10.0, 100)).unwrap();
        engine.place_bid(auction.id, bid(auction.id, "slow", "builder", 90.0, 10.0, 10_000)).unwrap();
        let result = engine.close(auction.id).unwrap();
        assert_eq!(result.winner, "fast");
    }

    #[test]
    fn ties_broken_by_role_priority() {
        let engine = AuctionEngine::new(None);
        let auction = engine.open("t1", TaskKind::Code, "architect", 5_000);
        engine.place_bid(auction.id, bid(auction.id, "a", "builder", 80.0, 20.0, 1_000)).unwrap();
        engine.place_bid(auction.id, bid(auction.id, "b", "architect", 80.0, 20.0, 1_000)).unwrap();
        let result = engine.close(auction.id).unwrap();
        assert_eq!(result.winner, "b");
    }

    #[test]
    fn duplicate_bidder_is_rejected() {
        let engine = AuctionEngine::new(None);
        let auction = engine.open("t1", TaskKind::Code, "architect", 5_000);
        engine.place_bid(auction.id, bid(auction.id, "a", "builder", 80.0, 20.0, 1_000)).unwrap();
        let err = engine.place_bid(auction.id, bid(auction.id, "a", "builder", 50.0, 50.0, 2_000)).unwrap_err();
        assert!(matches!(err, ProtocolError::Bid(BidError::DuplicateBidder(_))));
    }

    #[test]
    fn bidding_on_unknown_auction_is_rejected() {
        let engine = AuctionEngine::new(None);
        let err = engine.place_bid(Uuid::new_v4(), bid(Uuid::new_v4(), "a", "builder", 80.0, 20.0, 1_000)).unwrap_err();
        assert!(matches!(err, ProtocolError::AuctionClosed(_)));
    }

    #[test]
    fn bidding_on_closed_auction_is_rejected() {
        let engine = AuctionEngine::new(None);
        let auction = engine.open("t1", TaskKind::Code, "architect", 5_000);
        engine.place_bid(auction.id, bid(auction.id, "a", "builder", 80.0, 20.0, 1_000)).unwrap();
        engine.close(auction.id).unwrap();
        let err = engine.place_bid(auction.id, bid(auction.id, "b", "builder", 80.0, 20.0, 1_000)).unwrap_err();
        assert!(matches!(err, ProtocolError::AuctionClosed(_)));
    }

    #[test]
    fn empty_auction_closes_to_none() {
        let engine = AuctionEngine::new(None);
        let auction = engine.open("t1", TaskKind::Code, "architect", 5_000);
        assert!(engine.close(auction.id).is_none());
    }

    #[test]
    fn closing_already_closed_auction_returns_none() {
        let engine = AuctionEngine::new(None);
        let auction = engine.open("t1", TaskKind::Code, "architect", 5_000);
        engine.place_bid(auction.id, bid(auction.id, "a", "builder", 80.0, 20.0, 1_000)).unwrap();
        assert!(engine.close(auction.id).is_some());
        assert!(engine.close(auction.id).is_none());
    }
}
