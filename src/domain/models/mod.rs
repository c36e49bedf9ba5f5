//! Domain models.
//!
//! Pure domain entities with business logic and validation rules. These
//! models are framework-agnostic and contain no infrastructure concerns.

pub mod auction;
pub mod checkpoint;
pub mod graph;
pub mod message;
pub mod outcome;
pub mod proposal;
pub mod role;
pub mod task;
pub mod worker;

pub use auction::{Auction, AuctionResult, Bid, BidError, role_priority_rank};
pub use checkpoint::{
    canonical_serialize, Checkpoint, GraphSnapshot, MessageSnapshot, OutcomeSnapshot, Snapshot,
    TaskSnapshot, SNAPSHOT_VERSION,
};
pub use graph::{Graph, GraphError};
pub use message::{topic_matches, Message, PublishOptions};
pub use outcome::{AgentTaskKey, Outcome};
pub use proposal::{ConsensusStrategy, Proposal, ProposalStatus, Vote, VoteChoice};
pub use role::{is_veto_role, required_permission, Permission, RoleTable, VETO_ROLES};
pub use task::{
    Task, TaskKind, TaskResult, TaskStatus, TaskTransitionError, FEATURE_ID_KEY, PARENT_CONTEXT_KEY,
    REACTIVE_CONTEXT_KEY, RETRY_FEEDBACK_KEY,
};
pub use worker::{WorkerNode, WorkerStatus};
