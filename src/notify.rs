//! Best-effort outbound win reports.
//!
//! Notification is fire-and-forget: the engine spawns the call off the
//! settlement path, and a failing notifier can never block or fail a
//! settlement.

use crate::games::GameKind;
use async_trait::async_trait;

/// Outbound reporting hook invoked after winning settlements.
#[async_trait]
pub trait WinNotifier: Send + Sync {
    /// Report a win. Errors are logged by the caller and otherwise ignored;
    /// implementations must not panic.
    async fn report_win(
        &self,
        user_id: &str,
        kind: GameKind,
        stake: f64,
        multiplier: f64,
    ) -> Result<(), String>;
}

/// Default notifier: a structured log line per win.
pub struct LogNotifier;

#[async_trait]
impl WinNotifier for LogNotifier {
    async fn report_win(
        &self,
        user_id: &str,
        kind: GameKind,
        stake: f64,
        multiplier: f64,
    ) -> Result<(), String> {
        tracing::info!(
            user = user_id,
            game = %kind,
            stake,
            multiplier,
            won = stake * multiplier,
            "win report"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_never_errors() {
        let notifier = LogNotifier;
        assert!(notifier
            .report_win("alice", GameKind::Plinko, 2.0, 5.6)
            .await
            .is_ok());
    }
}
