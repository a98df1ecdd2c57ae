//! Fairstake - Provably-Fair Wagering Engine
//!
//! Settles real-money wagers on three chance-based games (plinko, mines,
//! blackjack) whose outcomes derive deterministically from a committed seed
//! pair the player can later audit. Transport, authentication and durable
//! storage are external collaborators; the engine owns the seed commitment
//! protocol, outcome derivation, game state machines, zero-sum settlement
//! and per-user admission control.

pub mod config;
pub mod engine;
pub mod errors;
pub mod fairness;
pub mod games;
pub mod guard;
pub mod ledger;
pub mod notify;
pub mod seeds;
pub mod store;
pub mod tables;

pub use config::EngineConfig;
pub use engine::{
    BlackjackBetRequest, CasinoEngine, DropBallRequest, DropOutcome, MinesBetRequest,
};
pub use errors::{EngineError, ErrorKind};
pub use games::{GameKind, RiskTier, SessionView};
pub use notify::{LogNotifier, WinNotifier};
pub use seeds::{RotatedSeed, SeedCommitment, SeedCommitmentView};
pub use store::{MemoryStore, PlayerStats, Store};
pub use tables::GameTables;
