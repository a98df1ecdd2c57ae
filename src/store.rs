//! Persistence boundary.
//!
//! The engine only needs point lookups, conditional upserts and an atomic
//! settlement commit; anything beyond that (indexes, replication, real
//! durability) belongs to the backing store. [`MemoryStore`] is the
//! reference implementation used by tests and embedders.

use crate::games::{GameKind, GameSession, SessionStatus};
use crate::seeds::SeedCommitment;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Per-player lifetime counters, updated only inside settlement commits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    pub total_played: u64,
    pub total_wagered: f64,
    pub total_won: u64,
    pub total_lost: u64,
    pub total_tied: u64,
    pub total_win_amount: f64,
}

/// Statistics increment applied alongside one settlement.
#[derive(Debug, Clone, Copy)]
pub struct StatsDelta {
    pub wagered: f64,
    pub won: bool,
    pub lost: bool,
    pub tied: bool,
    pub win_amount: f64,
}

impl StatsDelta {
    /// Classify one settled round: win above even money, tie at exactly
    /// even money, loss below.
    pub fn from_round(staked_total: f64, multiplier: f64, returned: f64) -> Self {
        Self {
            wagered: staked_total,
            won: multiplier > 1.0,
            lost: multiplier < 1.0,
            tied: multiplier == 1.0,
            win_amount: if multiplier > 1.0 { returned } else { 0.0 },
        }
    }
}

/// Store operations the engine depends on.
///
/// `debit_if_at_least` must be atomic per account. `commit_settlement`
/// must apply the session update, both balance deltas and the statistics
/// increment as one transaction so the two balances never observably
/// diverge.
#[async_trait]
pub trait Store: Send + Sync {
    async fn seed(&self, user_id: &str) -> Result<Option<SeedCommitment>, StoreError>;

    async fn put_seed(&self, seed: &SeedCommitment) -> Result<(), StoreError>;

    /// The single in-progress session for a (user, kind) pair, if any.
    async fn active_session(
        &self,
        user_id: &str,
        kind: GameKind,
    ) -> Result<Option<GameSession>, StoreError>;

    /// A session by id, scoped to its owner.
    async fn session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<GameSession>, StoreError>;

    async fn put_session(&self, session: &GameSession) -> Result<(), StoreError>;

    /// Whether any in-progress session exists for the user, across kinds.
    async fn has_active_sessions(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Attach a retired server seed to every *settled* session of the user
    /// that carries its hash, disclosing it for audit.
    async fn reveal_server_seed(
        &self,
        user_id: &str,
        server_seed_hash: &str,
        server_seed: &str,
    ) -> Result<(), StoreError>;

    async fn balance(&self, account: &str) -> Result<f64, StoreError>;

    async fn credit(&self, account: &str, amount: f64) -> Result<(), StoreError>;

    /// Conditional atomic debit: subtract `amount` only if the balance
    /// covers it. Returns whether the debit was applied.
    async fn debit_if_at_least(&self, account: &str, amount: f64) -> Result<bool, StoreError>;

    /// One settlement transaction: persist the settled session, credit the
    /// player, apply the house delta and bump the player's statistics.
    async fn commit_settlement(
        &self,
        session: &GameSession,
        house_account: &str,
        player_credit: f64,
        house_delta: f64,
        stats: StatsDelta,
    ) -> Result<(), StoreError>;

    async fn stats(&self, user_id: &str) -> Result<PlayerStats, StoreError>;
}

#[derive(Debug, Clone, Default)]
struct AccountRecord {
    balance: f64,
    stats: PlayerStats,
}

/// In-memory store backed by per-key concurrent maps.
///
/// Per-account operations are atomic under the map's entry lock; the
/// settlement commit spans two accounts and a session, so it serializes
/// through one mutex.
#[derive(Default)]
pub struct MemoryStore {
    seeds: DashMap<String, SeedCommitment>,
    sessions: DashMap<String, GameSession>,
    /// (owner, kind) -> in-progress session id.
    active: DashMap<(String, GameKind), String>,
    accounts: DashMap<String, AccountRecord>,
    settle_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_session(&self, session: &GameSession) {
        let key = (session.owner_id.clone(), session.kind);
        match session.status {
            SessionStatus::InProgress => {
                self.active.insert(key, session.id.clone());
            }
            SessionStatus::Settled => {
                self.active
                    .remove_if(&key, |_, active_id| active_id == &session.id);
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn seed(&self, user_id: &str) -> Result<Option<SeedCommitment>, StoreError> {
        Ok(self.seeds.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn put_seed(&self, seed: &SeedCommitment) -> Result<(), StoreError> {
        self.seeds.insert(seed.user_id.clone(), seed.clone());
        Ok(())
    }

    async fn active_session(
        &self,
        user_id: &str,
        kind: GameKind,
    ) -> Result<Option<GameSession>, StoreError> {
        let key = (user_id.to_string(), kind);
        let Some(id) = self.active.get(&key).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        Ok(self.sessions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<GameSession>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .filter(|session| session.owner_id == user_id)
            .map(|entry| entry.value().clone()))
    }

    async fn put_session(&self, session: &GameSession) -> Result<(), StoreError> {
        self.sessions.insert(session.id.clone(), session.clone());
        self.index_session(session);
        Ok(())
    }

    async fn has_active_sessions(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.active.iter().any(|entry| entry.key().0 == user_id))
    }

    async fn reveal_server_seed(
        &self,
        user_id: &str,
        server_seed_hash: &str,
        server_seed: &str,
    ) -> Result<(), StoreError> {
        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if session.owner_id == user_id
                && session.status == SessionStatus::Settled
                && session.proof.server_seed_hash == server_seed_hash
            {
                session.proof.server_seed = Some(server_seed.to_string());
            }
        }
        Ok(())
    }

    async fn balance(&self, account: &str) -> Result<f64, StoreError> {
        Ok(self
            .accounts
            .get(account)
            .map(|entry| entry.balance)
            .unwrap_or(0.0))
    }

    async fn credit(&self, account: &str, amount: f64) -> Result<(), StoreError> {
        self.accounts.entry(account.to_string()).or_default().balance += amount;
        Ok(())
    }

    async fn debit_if_at_least(&self, account: &str, amount: f64) -> Result<bool, StoreError> {
        let mut entry = self.accounts.entry(account.to_string()).or_default();
        if entry.balance < amount {
            return Ok(false);
        }
        entry.balance -= amount;
        Ok(true)
    }

    async fn commit_settlement(
        &self,
        session: &GameSession,
        house_account: &str,
        player_credit: f64,
        house_delta: f64,
        stats: StatsDelta,
    ) -> Result<(), StoreError> {
        let _commit = self
            .settle_lock
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        self.sessions.insert(session.id.clone(), session.clone());
        self.index_session(session);

        {
            let mut player = self
                .accounts
                .entry(session.owner_id.clone())
                .or_default();
            player.balance += player_credit;
            player.stats.total_played += 1;
            player.stats.total_wagered += stats.wagered;
            player.stats.total_won += stats.won as u64;
            player.stats.total_lost += stats.lost as u64;
            player.stats.total_tied += stats.tied as u64;
            player.stats.total_win_amount += stats.win_amount;
        }

        self.accounts
            .entry(house_account.to_string())
            .or_default()
            .balance += house_delta;

        Ok(())
    }

    async fn stats(&self, user_id: &str) -> Result<PlayerStats, StoreError> {
        Ok(self
            .accounts
            .get(user_id)
            .map(|entry| entry.stats.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::{plinko::PlinkoState, GameState, RiskTier, RoundProof};
    use chrono::Utc;

    fn session(id: &str, owner: &str, status: SessionStatus) -> GameSession {
        GameSession {
            id: id.to_string(),
            owner_id: owner.to_string(),
            kind: GameKind::Mines,
            stake: 1.0,
            staked_total: 1.0,
            status,
            multiplier: 0.0,
            state: GameState::Plinko(PlinkoState {
                rows: 8,
                risk: RiskTier::Low,
                path: vec![],
                slot: 0,
            }),
            proof: RoundProof {
                client_seed: "client".to_string(),
                server_seed_hash: "hash".to_string(),
                nonce: 1,
                server_seed: None,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_conditional_debit() {
        let store = MemoryStore::new();
        store.credit("alice", 10.0).await.unwrap();

        assert!(store.debit_if_at_least("alice", 4.0).await.unwrap());
        assert_eq!(store.balance("alice").await.unwrap(), 6.0);

        assert!(!store.debit_if_at_least("alice", 7.0).await.unwrap());
        assert_eq!(store.balance("alice").await.unwrap(), 6.0);

        assert!(!store.debit_if_at_least("nobody", 1.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_session_index_follows_status() {
        let store = MemoryStore::new();
        store
            .put_session(&session("s1", "alice", SessionStatus::InProgress))
            .await
            .unwrap();

        let active = store
            .active_session("alice", GameKind::Mines)
            .await
            .unwrap();
        assert_eq!(active.map(|s| s.id), Some("s1".to_string()));
        assert!(store.has_active_sessions("alice").await.unwrap());

        store
            .put_session(&session("s1", "alice", SessionStatus::Settled))
            .await
            .unwrap();
        assert!(store
            .active_session("alice", GameKind::Mines)
            .await
            .unwrap()
            .is_none());
        assert!(!store.has_active_sessions("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_session_lookup_is_owner_scoped() {
        let store = MemoryStore::new();
        store
            .put_session(&session("s1", "alice", SessionStatus::Settled))
            .await
            .unwrap();

        assert!(store.session("alice", "s1").await.unwrap().is_some());
        assert!(store.session("mallory", "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reveal_touches_only_settled_matching_sessions() {
        let store = MemoryStore::new();
        store
            .put_session(&session("settled", "alice", SessionStatus::Settled))
            .await
            .unwrap();
        store
            .put_session(&session("open", "alice", SessionStatus::InProgress))
            .await
            .unwrap();

        store
            .reveal_server_seed("alice", "hash", "secret")
            .await
            .unwrap();

        let settled = store.session("alice", "settled").await.unwrap().unwrap();
        assert_eq!(settled.proof.server_seed.as_deref(), Some("secret"));

        let open = store.session("alice", "open").await.unwrap().unwrap();
        assert!(open.proof.server_seed.is_none());
    }

    #[tokio::test]
    async fn test_settlement_commit_moves_both_balances_and_stats() {
        let store = MemoryStore::new();
        store.credit("alice", 10.0).await.unwrap();
        store.credit("house", 100.0).await.unwrap();

        let settled = session("s1", "alice", SessionStatus::Settled);
        let stats = StatsDelta::from_round(1.0, 2.0, 2.0);
        store
            .commit_settlement(&settled, "house", 2.0, -1.0, stats)
            .await
            .unwrap();

        assert_eq!(store.balance("alice").await.unwrap(), 12.0);
        assert_eq!(store.balance("house").await.unwrap(), 99.0);

        let stats = store.stats("alice").await.unwrap();
        assert_eq!(stats.total_played, 1);
        assert_eq!(stats.total_won, 1);
        assert_eq!(stats.total_win_amount, 2.0);
        assert_eq!(stats.total_wagered, 1.0);
    }
}
