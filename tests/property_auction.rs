//! Property test for auction monotonicity (P10): the winning bid's score
//! is greater than or equal to every other bid's score, with ties broken
//! by role priority.

use castellan::domain::models::{role_priority_rank, Bid, TaskKind};
use castellan::services::AuctionEngine;
use proptest::prelude::*;

fn bid(auction_id: uuid::Uuid, bidder: &str, role: &str, capability: f64, load: f64, duration_ms: u64) -> Bid {
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

fn score(bid: &Bid, max_duration_ms: u64) -> f64 {
    let speed = if max_duration_ms == 0 {
        0.0
    } else {
        100.0 * (max_duration_ms as f64 - bid.estimated_duration_ms as f64) / max_duration_ms as f64
    };
    0.4 * bid.capability_score + 0.3 * (100.0 - bid.current_load) + 0.3 * speed
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property P10: closing an auction with `bid_count` bids (each with
    /// an independently random capability/load/duration) always selects
    /// a bid whose score is >= every other bid's score; when two bids
    /// tie, the one with the lower role-priority rank wins.
    #[test]
    fn prop_auction_winner_has_maximal_score(
        capabilities in prop::collection::vec(0.0f64..100.0, 2..8),
        loads in prop::collection::vec(0.0f64..100.0, 2..8),
        durations in prop::collection::vec(1u64..10_000, 2..8),
    ) {
        let n = capabilities.len().min(loads.len()).min(durations.len());
        prop_assume!(n >= 2);

        let engine = AuctionEngine::new(None);
        let auction = engine.open("t1", TaskKind::Code, "architect", 5_000);

        let roles = ["architect", "strategist", "builder", "auditor", "tester", "releaser", "guardian"];
        for i in 0..n {
            let role = roles[i % roles.len()];
            let b = bid(auction.id, &format!("bidder{i}"), role, capabilities[i], loads[i], durations[i]);
            engine.place_bid(auction.id, b).unwrap();
        }

        let result = engine.close(auction.id).unwrap();

        let snapshot = engine.get(auction.id).unwrap();
        let max_duration = snapshot.bids.iter().map(|b| b.estimated_duration_ms).max().unwrap();
        let winner_bid = snapshot.bids.iter().find(|b| b.bidder == result.winner).unwrap();
        let winner_score = score(winner_bid, max_duration);

        for other in &snapshot.bids {
            let other_score = score(other, max_duration);
            prop_assert!(
                winner_score > other_score
                    || (winner_score == other_score
                        && role_priority_rank(&winner_bid.role) <= role_priority_rank(&other.role)),
                "winner score {winner_score} should be >= {other_score} (or tie-broken in its favor)"
            );
        }
    }
}
