//! Engine facade: the operations a transport layer drives.
//!
//! Every mutating operation runs the same shape: cool-down check, admission
//! permit, validation, stake movement, outcome derivation, settlement. All
//! mutations return the resulting player-visible session state.

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::games::blackjack::{BlackjackState, StepOutcome};
use crate::games::mines::{MinesState, RevealOutcome};
use crate::games::plinko::{self, Direction, PlinkoState};
use crate::games::{GameKind, GameSession, GameState, RiskTier, RoundProof, SessionStatus, SessionView};
use crate::guard::{ActionClass, CooldownGate, SessionGuard};
use crate::ledger::Ledger;
use crate::notify::WinNotifier;
use crate::seeds::{RotatedSeed, SeedCommitment, SeedCommitmentView, SeedService};
use crate::store::{PlayerStats, Store};
use crate::tables::GameTables;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Plinko bet parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropBallRequest {
    pub stake: f64,
    pub risk: RiskTier,
    pub rows: u8,
}

/// Mines bet parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinesBetRequest {
    pub stake: f64,
    pub mines_count: u8,
}

/// Blackjack bet parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackjackBetRequest {
    pub stake: f64,
}

/// Settled result of one plinko drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOutcome {
    pub path: Vec<Direction>,
    pub slot: u8,
    pub multiplier: f64,
    pub session: SessionView,
}

/// The provably-fair game engine.
pub struct CasinoEngine {
    store: Arc<dyn Store>,
    tables: Arc<GameTables>,
    config: EngineConfig,
    seeds: SeedService,
    ledger: Ledger,
    guard: SessionGuard,
    cooldowns: CooldownGate,
    notifier: Arc<dyn WinNotifier>,
}

impl CasinoEngine {
    /// Build an engine over a store, validated tables and configuration.
    ///
    /// Spawns the seed-cache eviction timer, so this must run inside a
    /// tokio runtime.
    pub fn new(
        store: Arc<dyn Store>,
        tables: GameTables,
        config: EngineConfig,
        notifier: Arc<dyn WinNotifier>,
    ) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::InvalidParameters(e.to_string()))?;
        tables
            .validate()
            .map_err(|e| EngineError::InvalidParameters(e.to_string()))?;

        let seeds = SeedService::new(store.clone(), &config.seed_cache);
        Arc::clone(seeds.cache()).spawn_sweeper(config.seed_cache.sweep_interval());
        let ledger = Ledger::new(store.clone(), &config.house_account);
        let guard = SessionGuard::new(config.admission.queue_depth);
        let cooldowns = CooldownGate::new(
            config.admission.bet_cooldown(),
            config.admission.move_cooldown(),
        );

        Ok(Self {
            store,
            tables: Arc::new(tables),
            config,
            seeds,
            ledger,
            guard,
            cooldowns,
            notifier,
        })
    }

    // ---- reads ----

    /// Active seed commitment (public projection), created lazily.
    pub async fn active_seed(&self, user_id: &str) -> Result<SeedCommitmentView, EngineError> {
        Ok(self.seeds.get_or_create(user_id).await?.view())
    }

    /// Current balance of a player account.
    pub async fn balance(&self, user_id: &str) -> Result<f64, EngineError> {
        Ok(self.store.balance(user_id).await?)
    }

    /// Lifetime play statistics of a player.
    pub async fn stats(&self, user_id: &str) -> Result<PlayerStats, EngineError> {
        Ok(self.store.stats(user_id).await?)
    }

    /// In-progress session for a (user, kind) pair, if any.
    pub async fn active_bet(
        &self,
        user_id: &str,
        kind: GameKind,
    ) -> Result<Option<SessionView>, EngineError> {
        Ok(self
            .store
            .active_session(user_id, kind)
            .await?
            .map(|session| session.view()))
    }

    /// Fairness record of one finished session, for audit.
    pub async fn session_audit(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionView, EngineError> {
        self.store
            .session(user_id, session_id)
            .await?
            .map(|session| session.view())
            .ok_or(EngineError::GameNotFound)
    }

    // ---- seed rotation ----

    /// Rotate the user's commitment: the pre-committed successor becomes
    /// active and the retired seed is disclosed for audit.
    ///
    /// Rejected while any session is in progress; a live board or hand
    /// still derives from the active seed, and disclosing it would leak
    /// undisclosed outcome data.
    pub async fn rotate_seed(&self, user_id: &str) -> Result<RotatedSeed, EngineError> {
        if self.store.has_active_sessions(user_id).await? {
            return Err(EngineError::AlreadyPlaying);
        }
        self.seeds.rotate(user_id).await
    }

    // ---- plinko ----

    /// Drop a ball: derive the landing slot and path, settle immediately.
    ///
    /// Plinko requests queue behind each other per user (bounded) instead
    /// of fast-failing, so bursty clients keep their drop order.
    pub async fn drop_ball(
        &self,
        user_id: &str,
        request: DropBallRequest,
    ) -> Result<DropOutcome, EngineError> {
        self.cooldowns.check(user_id, ActionClass::PlaceBet)?;
        let _permit = self.guard.enter_queued(user_id, GameKind::Plinko).await?;

        self.validate_stake(request.stake)?;
        let row_table = self
            .tables
            .plinko_row(request.risk, request.rows)
            .ok_or_else(|| {
                EngineError::InvalidParameters(format!(
                    "no table for {} risk with {} rows",
                    request.risk, request.rows
                ))
            })?;

        self.ledger.place_stake(user_id, request.stake).await?;
        let seed = match self.consume_seed_round(user_id).await {
            Ok(seed) => seed,
            Err(e) => {
                self.ledger.refund_stake(user_id, request.stake).await?;
                return Err(e);
            }
        };

        let drop = plinko::generate_drop(
            &seed.server_seed,
            &seed.client_seed,
            seed.nonce,
            request.rows,
            row_table,
        );

        let mut session = self.new_session(
            user_id,
            GameKind::Plinko,
            request.stake,
            GameState::Plinko(PlinkoState {
                rows: request.rows,
                risk: request.risk,
                path: drop.path.clone(),
                slot: drop.slot,
            }),
            &seed,
        );
        session.status = SessionStatus::Settled;
        session.multiplier = drop.multiplier;

        if let Err(e) = self.ledger.settle(&session).await {
            self.ledger.refund_stake(user_id, request.stake).await?;
            return Err(e);
        }
        self.notify_win(user_id, GameKind::Plinko, request.stake, drop.multiplier);

        Ok(DropOutcome {
            path: drop.path,
            slot: drop.slot,
            multiplier: drop.multiplier,
            session: session.view(),
        })
    }

    // ---- mines ----

    /// Open a mines board. The mine layout is fixed here, from the round
    /// consumed at bet time, and stays hidden until settlement.
    pub async fn mines_create(
        &self,
        user_id: &str,
        request: MinesBetRequest,
    ) -> Result<SessionView, EngineError> {
        self.cooldowns.check(user_id, ActionClass::PlaceBet)?;
        let _permit = self.guard.try_enter(user_id, GameKind::Mines)?;

        self.validate_stake(request.stake)?;
        if !self.tables.mines.contains_key(&request.mines_count) {
            return Err(EngineError::InvalidParameters(format!(
                "invalid mine count {}",
                request.mines_count
            )));
        }
        if self
            .store
            .active_session(user_id, GameKind::Mines)
            .await?
            .is_some()
        {
            return Err(EngineError::AlreadyPlaying);
        }

        self.ledger.place_stake(user_id, request.stake).await?;
        let seed = match self.consume_seed_round(user_id).await {
            Ok(seed) => seed,
            Err(e) => {
                self.ledger.refund_stake(user_id, request.stake).await?;
                return Err(e);
            }
        };

        let state = MinesState::generate(
            &seed.server_seed,
            &seed.client_seed,
            seed.nonce,
            request.mines_count,
        );
        let session = self.new_session(
            user_id,
            GameKind::Mines,
            request.stake,
            GameState::Mines(state),
            &seed,
        );

        if let Err(e) = self.store.put_session(&session).await {
            self.ledger.refund_stake(user_id, request.stake).await?;
            return Err(e.into());
        }
        Ok(session.view())
    }

    /// Reveal an ordered batch of cells on the open board.
    pub async fn mines_reveal(
        &self,
        user_id: &str,
        picks: &[u8],
    ) -> Result<SessionView, EngineError> {
        self.cooldowns.check(user_id, ActionClass::Move)?;
        let _permit = self.guard.try_enter(user_id, GameKind::Mines)?;

        let mut session = self
            .store
            .active_session(user_id, GameKind::Mines)
            .await?
            .ok_or(EngineError::GameNotFound)?;
        let GameState::Mines(ref mut state) = session.state else {
            return Err(EngineError::Storage("session state mismatch".to_string()));
        };

        let outcome = state.apply_reveals(picks, &self.tables)?;
        match outcome {
            RevealOutcome::Open { .. } => {
                self.store.put_session(&session).await?;
                Ok(session.view())
            }
            RevealOutcome::Busted => self.settle_session(session, 0.0).await,
            RevealOutcome::Cleared { multiplier } => {
                self.settle_session(session, multiplier).await
            }
        }
    }

    /// Cash out the open board at the multiplier for the current reveal
    /// count. Requires at least one safe reveal.
    pub async fn mines_cashout(&self, user_id: &str) -> Result<SessionView, EngineError> {
        self.cooldowns.check(user_id, ActionClass::Move)?;
        let _permit = self.guard.try_enter(user_id, GameKind::Mines)?;

        let session = self
            .store
            .active_session(user_id, GameKind::Mines)
            .await?
            .ok_or(EngineError::GameNotFound)?;
        let GameState::Mines(ref state) = session.state else {
            return Err(EngineError::Storage("session state mismatch".to_string()));
        };

        let multiplier = state.cashout_multiplier(&self.tables)?;
        self.settle_session(session, multiplier).await
    }

    // ---- blackjack ----

    /// Deal a hand. Naturals may settle it immediately unless the dealer's
    /// ace up-card keeps the resolution ambiguous.
    pub async fn blackjack_deal(
        &self,
        user_id: &str,
        request: BlackjackBetRequest,
    ) -> Result<SessionView, EngineError> {
        self.cooldowns.check(user_id, ActionClass::PlaceBet)?;
        let _permit = self.guard.try_enter(user_id, GameKind::Blackjack)?;

        self.validate_stake(request.stake)?;
        if self
            .store
            .active_session(user_id, GameKind::Blackjack)
            .await?
            .is_some()
        {
            return Err(EngineError::AlreadyPlaying);
        }

        self.ledger.place_stake(user_id, request.stake).await?;
        let seed = match self.consume_seed_round(user_id).await {
            Ok(seed) => seed,
            Err(e) => {
                self.ledger.refund_stake(user_id, request.stake).await?;
                return Err(e);
            }
        };

        let (state, settled) =
            BlackjackState::deal(&seed.server_seed, &seed.client_seed, seed.nonce);
        let session = self.new_session(
            user_id,
            GameKind::Blackjack,
            request.stake,
            GameState::Blackjack(state),
            &seed,
        );

        match settled {
            Some(multiplier) => match self.settle_session(session, multiplier).await {
                Ok(view) => Ok(view),
                Err(e) => {
                    self.ledger.refund_stake(user_id, request.stake).await?;
                    Err(e)
                }
            },
            None => {
                if let Err(e) = self.store.put_session(&session).await {
                    self.ledger.refund_stake(user_id, request.stake).await?;
                    return Err(e.into());
                }
                Ok(session.view())
            }
        }
    }

    /// Draw one card for the acting hand.
    pub async fn blackjack_hit(&self, user_id: &str) -> Result<SessionView, EngineError> {
        self.blackjack_action(user_id, |_| Ok(()), |_| 0.0, |state| state.hit())
            .await
    }

    /// Commit the acting hand at its current value.
    pub async fn blackjack_stand(&self, user_id: &str) -> Result<SessionView, EngineError> {
        self.blackjack_action(user_id, |_| Ok(()), |_| 0.0, |state| state.stand())
            .await
    }

    /// Double the stake for one final card.
    pub async fn blackjack_double(&self, user_id: &str) -> Result<SessionView, EngineError> {
        self.blackjack_action(
            user_id,
            BlackjackState::validate_double,
            |session| session.stake,
            |state| state.double_down(),
        )
        .await
    }

    /// Split a two-card pair into two hands, re-staking the base amount.
    pub async fn blackjack_split(&self, user_id: &str) -> Result<SessionView, EngineError> {
        self.blackjack_action(
            user_id,
            BlackjackState::validate_split,
            |session| session.stake,
            |state| state.split_hand(),
        )
        .await
    }

    /// Resolve the insurance offer against a dealer ace. Accepting stakes
    /// half the base amount.
    pub async fn blackjack_insurance(
        &self,
        user_id: &str,
        accept: bool,
    ) -> Result<SessionView, EngineError> {
        self.blackjack_action(
            user_id,
            BlackjackState::validate_insurance,
            move |session| if accept { session.stake / 2.0 } else { 0.0 },
            move |state| state.resolve_insurance(accept),
        )
        .await
    }

    /// Shared blackjack action pipeline: admission, guard validation, the
    /// extra-stake debit, the state transition, then persistence or
    /// settlement. The extra stake is refunded if any later step fails, so
    /// no exit path leaves money debited without a settled or retryable
    /// session.
    async fn blackjack_action<V, S, A>(
        &self,
        user_id: &str,
        validate: V,
        extra_stake_of: S,
        act: A,
    ) -> Result<SessionView, EngineError>
    where
        V: FnOnce(&BlackjackState) -> Result<(), EngineError>,
        S: FnOnce(&GameSession) -> f64,
        A: FnOnce(&mut BlackjackState) -> Result<StepOutcome, EngineError>,
    {
        self.cooldowns.check(user_id, ActionClass::Move)?;
        let _permit = self.guard.try_enter(user_id, GameKind::Blackjack)?;

        let mut session = self
            .store
            .active_session(user_id, GameKind::Blackjack)
            .await?
            .ok_or(EngineError::GameNotFound)?;

        {
            let GameState::Blackjack(ref state) = session.state else {
                return Err(EngineError::Storage("session state mismatch".to_string()));
            };
            validate(state)?;
        }

        let extra_stake = extra_stake_of(&session);
        if extra_stake > 0.0 {
            self.ledger.place_stake(user_id, extra_stake).await?;
            session.staked_total += extra_stake;
        }

        let outcome = {
            let GameState::Blackjack(ref mut state) = session.state else {
                return Err(EngineError::Storage("session state mismatch".to_string()));
            };
            match act(state) {
                Ok(outcome) => outcome,
                Err(e) => {
                    if extra_stake > 0.0 {
                        self.ledger.refund_stake(user_id, extra_stake).await?;
                    }
                    return Err(e);
                }
            }
        };

        match outcome {
            StepOutcome::Continue => {
                if let Err(e) = self.store.put_session(&session).await {
                    if extra_stake > 0.0 {
                        self.ledger.refund_stake(user_id, extra_stake).await?;
                    }
                    return Err(e.into());
                }
                Ok(session.view())
            }
            StepOutcome::Settle(multiplier) => {
                match self.settle_session(session, multiplier).await {
                    Ok(view) => Ok(view),
                    Err(e) => {
                        if extra_stake > 0.0 {
                            self.ledger.refund_stake(user_id, extra_stake).await?;
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    // ---- shared helpers ----

    fn validate_stake(&self, stake: f64) -> Result<(), EngineError> {
        let limits = &self.config.wager;
        if !stake.is_finite() || stake < limits.min_wager {
            return Err(EngineError::WagerTooSmall {
                min: limits.min_wager,
            });
        }
        if stake > limits.max_wager {
            return Err(EngineError::WagerTooLarge {
                max: limits.max_wager,
            });
        }
        Ok(())
    }

    /// Fetch the commitment and consume one round from it, persisting the
    /// incremented counter before any outcome is derived.
    async fn consume_seed_round(&self, user_id: &str) -> Result<SeedCommitment, EngineError> {
        let mut seed = self.seeds.get_or_create(user_id).await?;
        self.seeds.consume_round(&mut seed).await?;
        Ok(seed)
    }

    fn new_session(
        &self,
        user_id: &str,
        kind: GameKind,
        stake: f64,
        state: GameState,
        seed: &SeedCommitment,
    ) -> GameSession {
        GameSession {
            id: Uuid::new_v4().to_string(),
            owner_id: user_id.to_string(),
            kind,
            stake,
            staked_total: stake,
            status: SessionStatus::InProgress,
            multiplier: 0.0,
            state,
            proof: RoundProof {
                client_seed: seed.client_seed.clone(),
                server_seed_hash: seed.server_seed_hash.clone(),
                nonce: seed.nonce,
                server_seed: None,
            },
            created_at: Utc::now(),
        }
    }

    /// Mark a session settled at `multiplier` and commit the settlement.
    /// On a commit failure the stored session is untouched, so the action
    /// can be retried.
    async fn settle_session(
        &self,
        mut session: GameSession,
        multiplier: f64,
    ) -> Result<SessionView, EngineError> {
        session.status = SessionStatus::Settled;
        session.multiplier = multiplier;
        self.ledger.settle(&session).await?;
        self.notify_win(&session.owner_id, session.kind, session.stake, multiplier);
        Ok(session.view())
    }

    /// Fire-and-forget win report; never blocks or fails settlement.
    fn notify_win(&self, user_id: &str, kind: GameKind, stake: f64, multiplier: f64) {
        if multiplier <= 1.0 {
            return;
        }
        let notifier = self.notifier.clone();
        let user = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.report_win(&user, kind, stake, multiplier).await {
                tracing::warn!(user = %user, error = %e, "win report failed");
            }
        });
    }
}
