//! Session admission control.
//!
//! At most one mutating request per (user, game kind) runs at a time. Game
//! kinds choose one of two disciplines: fast-fail (the second request is
//! rejected outright) or bounded queueing (requests wait behind the holder
//! FIFO up to a fixed depth). Permits are RAII guards, so the lock is
//! released on every exit path. Cool-down windows pace individual action
//! classes independently of the mutual exclusion.

use crate::errors::EngineError;
use crate::games::GameKind;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

struct Slot {
    lock: Arc<Mutex<()>>,
    waiting: AtomicUsize,
}

impl Slot {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            waiting: AtomicUsize::new(0),
        }
    }
}

/// Held admission for one (user, kind) pair; dropping it releases the slot.
pub struct Permit {
    _guard: OwnedMutexGuard<()>,
}

/// Per-(user, kind) mutual exclusion with an optional bounded queue.
pub struct SessionGuard {
    slots: DashMap<(String, GameKind), Arc<Slot>>,
    queue_depth: usize,
}

impl SessionGuard {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            slots: DashMap::new(),
            queue_depth,
        }
    }

    fn slot(&self, user_id: &str, kind: GameKind) -> Arc<Slot> {
        self.slots
            .entry((user_id.to_string(), kind))
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    /// Fast-fail admission: reject immediately while another request for
    /// the same (user, kind) is in flight.
    pub fn try_enter(&self, user_id: &str, kind: GameKind) -> Result<Permit, EngineError> {
        let slot = self.slot(user_id, kind);
        let guard = slot.lock.clone().try_lock_owned().map_err(|_| {
            tracing::debug!(user = user_id, %kind, "admission rejected: slot held");
            EngineError::Busy
        })?;
        Ok(Permit { _guard: guard })
    }

    /// Queued admission: wait behind the current holder, bounded by the
    /// configured queue depth. Every queued request is eventually admitted
    /// or rejected; none is silently dropped.
    pub async fn enter_queued(&self, user_id: &str, kind: GameKind) -> Result<Permit, EngineError> {
        let slot = self.slot(user_id, kind);
        let queued = slot.waiting.fetch_add(1, Ordering::SeqCst);
        if queued >= self.queue_depth {
            slot.waiting.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(user = user_id, %kind, queued, "admission rejected: queue full");
            return Err(EngineError::QueueFull);
        }

        let guard = slot.lock.clone().lock_owned().await;
        slot.waiting.fetch_sub(1, Ordering::SeqCst);
        Ok(Permit { _guard: guard })
    }
}

/// Action classes with distinct pacing deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    PlaceBet,
    Move,
}

/// Per-(user, action-class) cool-down windows.
pub struct CooldownGate {
    deadlines: DashMap<(String, ActionClass), Instant>,
    bet_window: Duration,
    move_window: Duration,
}

impl CooldownGate {
    pub fn new(bet_window: Duration, move_window: Duration) -> Self {
        Self {
            deadlines: DashMap::new(),
            bet_window,
            move_window,
        }
    }

    fn window(&self, class: ActionClass) -> Duration {
        match class {
            ActionClass::PlaceBet => self.bet_window,
            ActionClass::Move => self.move_window,
        }
    }

    /// Admit the action if its window has elapsed, arming the next
    /// deadline; otherwise reject with the remaining time.
    pub fn check(&self, user_id: &str, class: ActionClass) -> Result<(), EngineError> {
        let now = Instant::now();
        let mut entry = self
            .deadlines
            .entry((user_id.to_string(), class))
            .or_insert(now);

        if *entry > now {
            let retry_in = entry.duration_since(now).as_secs_f64();
            return Err(EngineError::CoolingDown { retry_in });
        }
        *entry = now + self.window(class);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_request_fast_fails_while_held() {
        let guard = SessionGuard::new(10);
        let permit = guard.try_enter("alice", GameKind::Mines).unwrap();
        assert!(matches!(
            guard.try_enter("alice", GameKind::Mines),
            Err(EngineError::Busy)
        ));
        drop(permit);
        assert!(guard.try_enter("alice", GameKind::Mines).is_ok());
    }

    #[tokio::test]
    async fn test_slots_are_per_user_and_kind() {
        let guard = SessionGuard::new(10);
        let _mines = guard.try_enter("alice", GameKind::Mines).unwrap();

        // A different kind or a different user is unaffected.
        assert!(guard.try_enter("alice", GameKind::Blackjack).is_ok());
        assert!(guard.try_enter("bob", GameKind::Mines).is_ok());
    }

    #[tokio::test]
    async fn test_queued_request_waits_for_release() {
        let guard = Arc::new(SessionGuard::new(10));
        let permit = guard.enter_queued("alice", GameKind::Plinko).await.unwrap();

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.enter_queued("alice", GameKind::Plinko).await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_queue_overflow_rejected() {
        let guard = Arc::new(SessionGuard::new(1));
        let _held = guard.enter_queued("alice", GameKind::Plinko).await.unwrap();

        // One waiter fits the queue; the next overflows.
        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move {
                let _ = guard.enter_queued("alice", GameKind::Plinko).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            guard.enter_queued("alice", GameKind::Plinko).await,
            Err(EngineError::QueueFull)
        ));
        waiter.abort();
    }

    #[tokio::test]
    async fn test_permit_released_when_dropped_on_error_path() {
        let guard = SessionGuard::new(10);
        let attempt: Result<(), EngineError> = (|| {
            let _permit = guard.try_enter("alice", GameKind::Blackjack)?;
            Err(EngineError::GameNotFound)
        })();
        assert!(attempt.is_err());
        // The failed request released its permit on unwind.
        assert!(guard.try_enter("alice", GameKind::Blackjack).is_ok());
    }

    #[test]
    fn test_cooldown_blocks_inside_window() {
        let gate = CooldownGate::new(Duration::from_secs(60), Duration::from_secs(60));
        assert!(gate.check("alice", ActionClass::PlaceBet).is_ok());

        match gate.check("alice", ActionClass::PlaceBet) {
            Err(EngineError::CoolingDown { retry_in }) => {
                assert!(retry_in > 0.0 && retry_in <= 60.0);
            }
            other => panic!("expected cool-down, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_cooldown_windows_are_independent_per_class() {
        let gate = CooldownGate::new(Duration::from_secs(60), Duration::from_secs(60));
        assert!(gate.check("alice", ActionClass::PlaceBet).is_ok());
        assert!(gate.check("alice", ActionClass::Move).is_ok());
        assert!(gate.check("bob", ActionClass::PlaceBet).is_ok());
    }

    #[test]
    fn test_cooldown_expires() {
        let gate = CooldownGate::new(Duration::from_millis(1), Duration::from_millis(1));
        assert!(gate.check("alice", ActionClass::Move).is_ok());
        std::thread::sleep(Duration::from_millis(5));
        assert!(gate.check("alice", ActionClass::Move).is_ok());
    }
}
