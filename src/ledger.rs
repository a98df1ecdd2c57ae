//! Zero-sum balance settlement between a player and the house account.
//!
//! Stakes are debited atomically at bet time; settlement credits the payout
//! and applies the exact negated net to the house in one store transaction,
//! so the sum of all balances is conserved.

use crate::errors::EngineError;
use crate::games::GameSession;
use crate::store::{StatsDelta, Store};
use std::sync::Arc;

/// Applied balance movement of one settlement.
#[derive(Debug, Clone, Copy)]
pub struct Settlement {
    /// Amount credited to the player: `stake * multiplier`.
    pub returned: f64,
    /// Signed amount applied to the house: `staked_total - returned`.
    pub house_delta: f64,
}

pub struct Ledger {
    store: Arc<dyn Store>,
    house_account: String,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, house_account: &str) -> Self {
        Self {
            store,
            house_account: house_account.to_string(),
        }
    }

    pub fn house_account(&self) -> &str {
        &self.house_account
    }

    /// Debit a stake from the player, conditioned on a covering balance.
    ///
    /// The house exposure check comes first: a wager the house could not
    /// pay out on is rejected before the player is touched.
    pub async fn place_stake(&self, player: &str, amount: f64) -> Result<(), EngineError> {
        let house_balance = self.store.balance(&self.house_account).await?;
        if house_balance < amount {
            return Err(EngineError::InsufficientHouseBalance);
        }
        if !self.store.debit_if_at_least(player, amount).await? {
            return Err(EngineError::InsufficientBalance);
        }
        Ok(())
    }

    /// Undo a stake debit after a later step failed, so no request can
    /// leave money debited without a settlement.
    pub async fn refund_stake(&self, player: &str, amount: f64) -> Result<(), EngineError> {
        self.store.credit(player, amount).await?;
        Ok(())
    }

    /// Commit one settlement: the settled session record, the player
    /// credit, the house delta and the statistics increment land in a
    /// single store transaction.
    pub async fn settle(&self, session: &GameSession) -> Result<Settlement, EngineError> {
        let returned = session.stake * session.multiplier;
        let house_delta = session.staked_total - returned;
        let stats = StatsDelta::from_round(session.staked_total, session.multiplier, returned);

        self.store
            .commit_settlement(session, &self.house_account, returned, house_delta, stats)
            .await?;

        tracing::debug!(
            session = %session.id,
            player = %session.owner_id,
            multiplier = session.multiplier,
            returned,
            "settled session"
        );
        Ok(Settlement {
            returned,
            house_delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::{
        plinko::PlinkoState, GameKind, GameState, RiskTier, RoundProof, SessionStatus,
    };
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn settled_session(stake: f64, staked_total: f64, multiplier: f64) -> GameSession {
        GameSession {
            id: "s1".to_string(),
            owner_id: "alice".to_string(),
            kind: GameKind::Plinko,
            stake,
            staked_total,
            status: SessionStatus::Settled,
            multiplier,
            state: GameState::Plinko(PlinkoState {
                rows: 8,
                risk: RiskTier::Low,
                path: vec![],
                slot: 4,
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

    async fn fixture(player_balance: f64, house_balance: f64) -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        store.credit("alice", player_balance).await.unwrap();
        store.credit("house", house_balance).await.unwrap();
        let ledger = Ledger::new(store.clone(), "house");
        (store, ledger)
    }

    #[tokio::test]
    async fn test_stake_rejected_when_player_cannot_cover() {
        let (store, ledger) = fixture(1.0, 100.0).await;
        assert!(matches!(
            ledger.place_stake("alice", 2.0).await,
            Err(EngineError::InsufficientBalance)
        ));
        assert_eq!(store.balance("alice").await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_stake_rejected_when_house_cannot_cover() {
        let (store, ledger) = fixture(10.0, 0.5).await;
        assert!(matches!(
            ledger.place_stake("alice", 2.0).await,
            Err(EngineError::InsufficientHouseBalance)
        ));
        // Rejected before the player is debited.
        assert_eq!(store.balance("alice").await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_settlement_is_zero_sum() {
        for multiplier in [0.0, 0.5, 1.0, 2.5, 29.0] {
            let (store, ledger) = fixture(10.0, 100.0).await;
            ledger.place_stake("alice", 2.0).await.unwrap();

            let settlement = ledger
                .settle(&settled_session(2.0, 2.0, multiplier))
                .await
                .unwrap();

            let player_delta = store.balance("alice").await.unwrap() - 10.0;
            let house_delta = store.balance("house").await.unwrap() - 100.0;
            assert!(
                (player_delta + house_delta).abs() < 1e-9,
                "multiplier {}: player {} house {}",
                multiplier,
                player_delta,
                house_delta
            );
            assert!((settlement.returned - 2.0 * multiplier).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_extra_stakes_flow_to_the_house() {
        // Doubled hand lost: base 2 staked twice, nothing returned.
        let (store, ledger) = fixture(10.0, 100.0).await;
        ledger.place_stake("alice", 2.0).await.unwrap();
        ledger.place_stake("alice", 2.0).await.unwrap();

        ledger
            .settle(&settled_session(2.0, 4.0, 0.0))
            .await
            .unwrap();

        assert_eq!(store.balance("alice").await.unwrap(), 6.0);
        assert_eq!(store.balance("house").await.unwrap(), 104.0);
    }

    #[tokio::test]
    async fn test_push_returns_the_stake_exactly() {
        let (store, ledger) = fixture(10.0, 100.0).await;
        ledger.place_stake("alice", 3.0).await.unwrap();
        ledger
            .settle(&settled_session(3.0, 3.0, 1.0))
            .await
            .unwrap();

        assert_eq!(store.balance("alice").await.unwrap(), 10.0);
        assert_eq!(store.balance("house").await.unwrap(), 100.0);

        let stats = store.stats("alice").await.unwrap();
        assert_eq!(stats.total_tied, 1);
        assert_eq!(stats.total_won, 0);
        assert_eq!(stats.total_lost, 0);
    }

    #[tokio::test]
    async fn test_stats_accumulate_once_per_settlement() {
        let (store, ledger) = fixture(10.0, 100.0).await;
        ledger.place_stake("alice", 1.0).await.unwrap();
        ledger
            .settle(&settled_session(1.0, 1.0, 5.6))
            .await
            .unwrap();

        let stats = store.stats("alice").await.unwrap();
        assert_eq!(stats.total_played, 1);
        assert_eq!(stats.total_won, 1);
        assert_eq!(stats.total_wagered, 1.0);
        assert!((stats.total_win_amount - 5.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_refund_restores_the_stake() {
        let (store, ledger) = fixture(10.0, 100.0).await;
        ledger.place_stake("alice", 4.0).await.unwrap();
        ledger.refund_stake("alice", 4.0).await.unwrap();
        assert_eq!(store.balance("alice").await.unwrap(), 10.0);
    }
}
