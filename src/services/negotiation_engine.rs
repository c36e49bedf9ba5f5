//! Proposal lifecycle and the four consensus strategies (spec §4.9, C10a).
//!
//! Grounded on `abathur::services::event_bus`'s append-only, id-keyed
//! registry idiom (store by `Uuid`, mutate through a lock, publish a bus
//! event on state change); the consensus arithmetic is new per spec §4.9.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::ProtocolError;
use crate::domain::models::{is_veto_role, ConsensusStrategy, Proposal, ProposalStatus, Vote, VoteChoice};
use crate::services::message_bus::MessageBus;

/// Tally of non-abstain votes per option/role after resolution.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    pub counts: HashMap<String, usize>,
    pub weighted: HashMap<String, u64>,
}

/// Outcome of resolving a proposal.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: ProposalStatus,
    pub winning_option: Option<String>,
    pub vetoed_by: Option<String>,
    pub tally: Tally,
}

/// Per-role weights for the WEIGHTED strategy.
pub type RoleWeights = HashMap<String, u64>;

/// Manages proposals end-to-end: creation, voting, and resolution under
/// the four consensus strategies (spec §4.9).
pub struct NegotiationEngine {
    proposals: std::sync::Mutex<HashMap<Uuid, Proposal>>,
    role_weights: RoleWeights,
    bus: Option<std::sync::Arc<MessageBus>>,
}

impl NegotiationEngine {
    pub fn new(role_weights: RoleWeights, bus: Option<std::sync::Arc<MessageBus>>) -> Self {
        Self { proposals: std::sync::Mutex::new(HashMap::new()), role_weights, bus }
    }

    pub fn propose(
        &self,
        proposer: impl Into<String>,
        proposer_role: impl Into<String>,
        description: impl Into<String>,
        options: Vec<String>,
        strategy: ConsensusStrategy,
        eligible_voters: Vec<String>,
        quorum: usize,
        timeout_ms: u64,
        context: Value,
    ) -> Proposal {
        let proposal = Proposal {
            id: Uuid::new_v4(),
            proposer: proposer.into(),
            proposer_role: proposer_role.into(),
            description: description.into(),
            options,
            strategy,
            eligible_voters,
            quorum,
            timeout_ms,
            status: ProposalStatus::Open,
            context,
            created_at: Utc::now(),
            votes: Vec::new(),
        };
        self.proposals.lock().expect("proposals mutex poisoned").insert(proposal.id, proposal.clone());
        proposal
    }

    pub fn get(&self, id: Uuid) -> Option<Proposal> {
        self.proposals.lock().expect("proposals mutex poisoned").get(&id).cloned()
    }

    /// Validates and records a vote per spec §4.9's validation order;
    /// auto-resolves when quorum is reached.
    pub fn cast_vote(
        &self,
        proposal_id: Uuid,
        voter: impl Into<String>,
        role: impl Into<String>,
        choice: VoteChoice,
        reason: Option<String>,
    ) -> Result<Option<Resolution>, ProtocolError> {
        let voter = voter.into();
        let role = role.into();

        let mut proposals = self.proposals.lock().expect("proposals mutex poisoned");
        let proposal = proposals.get_mut(&proposal_id).ok_or_else(|| ProtocolError::ProposalNotFound(proposal_id.to_string()))?;

        if proposal.status != ProposalStatus::Open {
            return Err(ProtocolError::ProposalNotOpen(proposal_id.to_string()));
        }
        if !proposal.is_eligible(&voter) {
            return Err(ProtocolError::VoterNotEligible { proposal_id: proposal_id.to_string(), voter });
        }
        if proposal.has_voted(&voter) {
            return Err(ProtocolError::DuplicateVote { proposal_id: proposal_id.to_string(), voter });
        }
        match &choice {
            VoteChoice::Veto if !is_veto_role(&role) => {
                return Err(ProtocolError::VetoNotAuthorized { role });
            }
            VoteChoice::Option(opt) if !proposal.options.contains(opt) => {
                return Err(ProtocolError::InvalidChoice { choice: opt.clone() });
            }
            _ => {}
        }

        proposal.votes.push(Vote { proposal_id, voter, role, choice, reason, timestamp: Utc::now() });

        let non_abstain = proposal.non_abstain_votes().count();
        let resolution = if proposal.quorum > 0 && non_abstain >= proposal.quorum {
            Some(Self::resolve_locked(proposal, &self.role_weights))
        } else {
            None
        };

        let snapshot = proposal.clone();
        drop(proposals);
        if let (Some(bus), Some(resolution)) = (&self.bus, &resolution) {
            let bus = bus.clone();
            let payload = serde_json::json!({
                "proposalId": snapshot.id.to_string(),
                "status": format!("{:?}", resolution.status),
            });
            let bus_clone = bus.clone();
            tokio::spawn(async move {
                bus_clone.publish("negotiation.resolved", "negotiation-engine", "system", payload, None).await;
            });
        }

        Ok(resolution)
    }

    /// Forces resolution under the configured strategy regardless of
    /// quorum (used by `checkTimeout` and explicit close calls).
    pub fn resolve(&self, proposal_id: Uuid) -> Result<Resolution, ProtocolError> {
        let mut proposals = self.proposals.lock().expect("proposals mutex poisoned");
        let proposal = proposals.get_mut(&proposal_id).ok_or_else(|| ProtocolError::ProposalNotFound(proposal_id.to_string()))?;
        if proposal.status != ProposalStatus::Open {
            return Err(ProtocolError::ProposalNotOpen(proposal_id.to_string()));
        }
        Ok(Self::resolve_locked(proposal, &self.role_weights))
    }

    /// Past `timeoutMs` without resolution → EXPIRED with current tally
    /// (spec §4.9, `checkTimeout`).
    pub fn check_timeout(&self, proposal_id: Uuid) -> Result<Option<Resolution>, ProtocolError> {
        let mut proposals = self.proposals.lock().expect("proposals mutex poisoned");
        let proposal = proposals.get_mut(&proposal_id).ok_or_else(|| ProtocolError::ProposalNotFound(proposal_id.to_string()))?;
        if proposal.status != ProposalStatus::Open {
            return Ok(None);
        }
        if !proposal.is_past_deadline(Utc::now()) {
            return Ok(None);
        }
        let tally = Self::tally_votes(proposal, &HashMap::new());
        proposal.status = ProposalStatus::Expired;
        Ok(Some(Resolution { status: ProposalStatus::Expired, winning_option: None, vetoed_by: None, tally }))
    }

    fn tally_votes(proposal: &Proposal, weights: &RoleWeights) -> Tally {
        let mut tally = Tally::default();
        for vote in proposal.non_abstain_votes() {
            if let VoteChoice::Option(opt) = &vote.choice {
                *tally.counts.entry(opt.clone()).or_insert(0) += 1;
                let weight = weights.get(&vote.role).copied().unwrap_or(1);
                *tally.weighted.entry(opt.clone()).or_insert(0) += weight;
            }
        }
        tally
    }

    fn resolve_locked(proposal: &mut Proposal, weights: &RoleWeights) -> Resolution {
        if let Some(veto_vote) = proposal.votes.iter().find(|v| v.choice == VoteChoice::Veto) {
            let vetoer = veto_vote.voter.clone();
            proposal.status = ProposalStatus::Vetoed;
            let tally = Self::tally_votes(proposal, weights);
            return Resolution { status: ProposalStatus::Vetoed, winning_option: None, vetoed_by: Some(vetoer), tally };
        }

        let tally = Self::tally_votes(proposal, weights);
        let non_abstain_count = proposal.non_abstain_votes().count();

        let winning_option = match proposal.strategy {
            ConsensusStrategy::Majority => tally
                .counts
                .iter()
                .max_by_key(|(_, c)| **c)
                .filter(|(_, c)| **c * 2 > non_abstain_count)
                .map(|(opt, _)| opt.clone()),
            ConsensusStrategy::Unanimous => {
                if non_abstain_count > 0 && tally.counts.len() == 1 {
                    tally.counts.keys().next().cloned()
                } else {
                    None
                }
            }
            ConsensusStrategy::Weighted => {
                let mut sorted: Vec<(&String, &u64)> = tally.weighted.iter().collect();
                sorted.sort_by(|a, b| b.1.cmp(a.1));
                match sorted.as_slice() {
                    [(opt, top), rest, ..] if *top > rest.1 => Some((*opt).clone()),
                    [(opt, _top)] => Some((*opt).clone()),
                    _ => None,
                }
            }
            ConsensusStrategy::Veto => tally
                .counts
                .iter()
                .max_by_key(|(_, c)| **c)
                .filter(|(_, c)| **c * 2 > non_abstain_count)
                .map(|(opt, _)| opt.clone()),
        };

        proposal.status = if winning_option.is_some() { ProposalStatus::Resolved } else { ProposalStatus::Rejected };
        Resolution { status: proposal.status, winning_option, vetoed_by: None, tally }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> NegotiationEngine {
        NegotiationEngine::new(HashMap::new(), None)
    }

    #[test]
    fn majority_resolves_with_strict_majority() {
        let engine = engine();
        let p = engine.propose(
            "p1",
            "architect",
            "pick a color",
            vec!["red".to_string(), "blue".to_string()],
            ConsensusStrategy::Majority,
            vec![],
            0,
            60_000,
            Value::Null,
        );
        engine.cast_vote(p.id, "v1", "builder", VoteChoice::Option("red".to_string()), None).unwrap();
        engine.cast_vote(p.id, "v2", "builder", VoteChoice::Option("red".to_string()), None).unwrap();
        engine.cast_vote(p.id, "v3", "builder", VoteChoice::Option("blue".to_string()), None).unwrap();
        let resolution = engine.resolve(p.id).unwrap();
        assert_eq!(resolution.winning_option, Some("red".to_string()));
        assert_eq!(resolution.status, ProposalStatus::Resolved);
    }

    #[test]
    fn veto_immediately_resolves_as_vetoed() {
        let engine = engine();
        let p = engine.propose(
            "p1",
            "architect",
            "deploy now?",
            vec!["yes".to_string(), "no".to_string()],
            ConsensusStrategy::Veto,
            vec![],
            0,
            60_000,
            Value::Null,
        );
        engine.cast_vote(p.id, "v1", "builder", VoteChoice::Option("yes".to_string()), None).unwrap();
        engine.cast_vote(p.id, "guard1", "guardian", VoteChoice::Veto, Some("too risky".to_string())).unwrap();
        let resolution = engine.resolve(p.id).unwrap();
        assert_eq!(resolution.status, ProposalStatus::Vetoed);
        assert_eq!(resolution.vetoed_by, Some("guard1".to_string()));
    }

    #[test]
    fn non_veto_role_cannot_cast_veto() {
        let engine = engine();
        let p = engine.propose("p1", "architect", "x", vec!["a".to_string(), "b".to_string()], ConsensusStrategy::Veto, vec![], 0, 60_000, Value::Null);
        let err = engine.cast_vote(p.id, "v1", "builder", VoteChoice::Veto, None).unwrap_err();
        assert!(matches!(err, ProtocolError::VetoNotAuthorized { .. }));
    }

    #[test]
    fn duplicate_vote_is_rejected() {
        let engine = engine();
        let p = engine.propose("p1", "architect", "x", vec!["a".to_string(), "b".to_string()], ConsensusStrategy::Majority, vec![], 0, 60_000, Value::Null);
        engine.cast_vote(p.id, "v1", "builder", VoteChoice::Option("a".to_string()), None).unwrap();
        let err = engine.cast_vote(p.id, "v1", "builder", VoteChoice::Option("b".to_string()), None).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateVote { .. }));
    }

    #[test]
    fn unanimous_requires_all_same_option() {
        let engine = engine();
        let p = engine.propose("p1", "architect", "x", vec!["a".to_string(), "b".to_string()], ConsensusStrategy::Unanimous, vec![], 0, 60_000, Value::Null);
        engine.cast_vote(p.id, "v1", "builder", VoteChoice::Option("a".to_string()), None).unwrap();
        engine.cast_vote(p.id, "v2", "builder", VoteChoice::Option("b".to_string()), None).unwrap();
        let resolution = engine.resolve(p.id).unwrap();
        assert_eq!(resolution.status, ProposalStatus::Rejected);
    }

    #[test]
    fn weighted_strict_max_wins_ties_reject() {
        let mut weights = HashMap::new();
        weights.insert("architect".to_string(), 3);
        weights.insert("builder".to_string(), 1);
        let engine = NegotiationEngine::new(weights, None);
        let p = engine.propose("p1", "architect", "x", vec!["a".to_string(), "b".to_string()], ConsensusStrategy::Weighted, vec![], 0, 60_000, Value::Null);
        engine.cast_vote(p.id, "arch1", "architect", VoteChoice::Option("a".to_string()), None).unwrap();
        engine.cast_vote(p.id, "b1", "builder", VoteChoice::Option("b".to_string()), None).unwrap();
        let resolution = engine.resolve(p.id).unwrap();
        assert_eq!(resolution.winning_option, Some("a".to_string()));
    }

    #[test]
    fn quorum_auto_resolves_on_reaching_threshold() {
        let engine = engine();
        let p = engine.propose("p1", "architect", "x", vec!["a".to_string(), "b".to_string()], ConsensusStrategy::Majority, vec![], 2, 60_000, Value::Null);
        let first = engine.cast_vote(p.id, "v1", "builder", VoteChoice::Option("a".to_string()), None).unwrap();
        assert!(first.is_none());
        let second = engine.cast_vote(p.id, "v2", "builder", VoteChoice::Option("a".to_string()), None).unwrap();
        assert!(second.is_some());
    }
}
