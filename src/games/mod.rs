//! Game domain types and the three outcome generators.

pub mod blackjack;
pub mod mines;
pub mod plinko;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported game kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Plinko,
    Mines,
    Blackjack,
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameKind::Plinko => write!(f, "plinko"),
            GameKind::Mines => write!(f, "mines"),
            GameKind::Blackjack => write!(f, "blackjack"),
        }
    }
}

/// Plinko risk profile selecting the payout/weight curve.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// Session lifecycle: a wager is in progress until it settles exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    InProgress,
    Settled,
}

/// Fairness record attached to every session.
///
/// `server_seed` stays `None` until the backing commitment is rotated out;
/// only then is the secret disclosed for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundProof {
    pub client_seed: String,
    pub server_seed_hash: String,
    pub nonce: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_seed: Option<String>,
}

/// Kind-specific session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GameState {
    Plinko(plinko::PlinkoState),
    Mines(mines::MinesState),
    Blackjack(blackjack::BlackjackState),
}

/// One wager: a single drop for plinko, a whole board for mines, a whole
/// hand (possibly split) for blackjack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub owner_id: String,
    pub kind: GameKind,
    /// Base stake debited when the bet was placed.
    pub stake: f64,
    /// Base stake plus double/split/insurance additions.
    pub staked_total: f64,
    pub status: SessionStatus,
    /// Meaningful once settled; payout is `stake * multiplier`.
    pub multiplier: f64,
    pub state: GameState,
    pub proof: RoundProof,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    pub fn is_settled(&self) -> bool {
        self.status == SessionStatus::Settled
    }

    /// Player-visible projection: hidden outcome data (unrevealed mines,
    /// the dealer's hole card, the remaining deck) is stripped while the
    /// session is in progress, and the server seed is only carried once
    /// disclosed.
    pub fn view(&self) -> SessionView {
        let state = match &self.state {
            GameState::Plinko(s) => GameStateView::Plinko(s.clone()),
            GameState::Mines(s) => GameStateView::Mines(s.view(self.is_settled())),
            GameState::Blackjack(s) => GameStateView::Blackjack(s.view()),
        };
        SessionView {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            game: self.kind,
            active: self.status == SessionStatus::InProgress,
            amount: self.stake,
            staked_total: self.staked_total,
            multiplier: self.multiplier,
            state,
            proof: RoundProof {
                client_seed: self.proof.client_seed.clone(),
                server_seed_hash: self.proof.server_seed_hash.clone(),
                nonce: self.proof.nonce,
                server_seed: if self.is_settled() {
                    self.proof.server_seed.clone()
                } else {
                    None
                },
            },
            created_at: self.created_at,
        }
    }
}

/// Player-visible session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GameStateView {
    Plinko(plinko::PlinkoState),
    Mines(mines::MinesView),
    Blackjack(blackjack::BlackjackView),
}

/// Player-visible session projection returned by every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub owner_id: String,
    pub game: GameKind,
    pub active: bool,
    pub amount: f64,
    pub staked_total: f64,
    pub multiplier: f64,
    pub state: GameStateView,
    pub proof: RoundProof,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_proof(status: SessionStatus, server_seed: Option<String>) -> GameSession {
        GameSession {
            id: "s1".to_string(),
            owner_id: "u1".to_string(),
            kind: GameKind::Plinko,
            stake: 1.0,
            staked_total: 1.0,
            status,
            multiplier: 0.0,
            state: GameState::Plinko(plinko::PlinkoState {
                rows: 8,
                risk: RiskTier::Low,
                path: vec![],
                slot: 0,
            }),
            proof: RoundProof {
                client_seed: "client".to_string(),
                server_seed_hash: "hash".to_string(),
                nonce: 1,
                server_seed,
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_view_withholds_seed_while_in_progress() {
        let session =
            session_with_proof(SessionStatus::InProgress, Some("secret".to_string()));
        assert!(session.view().proof.server_seed.is_none());
    }

    #[test]
    fn test_view_carries_revealed_seed_once_settled() {
        let session = session_with_proof(SessionStatus::Settled, Some("secret".to_string()));
        assert_eq!(session.view().proof.server_seed.as_deref(), Some("secret"));
    }

    #[test]
    fn test_kind_display_names() {
        assert_eq!(GameKind::Plinko.to_string(), "plinko");
        assert_eq!(GameKind::Mines.to_string(), "mines");
        assert_eq!(GameKind::Blackjack.to_string(), "blackjack");
        assert_eq!(RiskTier::Medium.to_string(), "medium");
    }
}
