//! Mines board engine and session transitions.
//!
//! The board is fixed at bet time from the round digest; reveals only walk
//! the precomputed layout. Mine positions are disclosed to the player when
//! the session settles, never before.

use crate::errors::EngineError;
use crate::fairness;
use crate::tables::{GameTables, MINES_GRID};
use serde::{Deserialize, Serialize};

/// One revealed cell and the multiplier it carried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reveal {
    pub cell: u8,
    pub multiplier: f64,
}

/// Full session state, including the hidden board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinesState {
    pub mines_count: u8,
    /// Mined cells, ascending. Hidden from views until settlement.
    pub mines: Vec<u8>,
    /// Safe reveals so far, in pick order. A mine hit is appended with
    /// multiplier 0 as the final entry.
    pub reveals: Vec<Reveal>,
}

/// Player-visible projection of a mines session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinesView {
    pub mines_count: u8,
    /// Mined cells, present only once the session is settled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mines: Option<Vec<u8>>,
    pub reveals: Vec<Reveal>,
}

/// Outcome of walking one reveal batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RevealOutcome {
    /// Session stays open; the multiplier for the current reveal count.
    Open { current_multiplier: f64 },
    /// A mine ended the session: all stake lost.
    Busted,
    /// Every safe cell is revealed: auto-settled at the terminal multiplier.
    Cleared { multiplier: f64 },
}

impl MinesState {
    /// Place the board for one round.
    pub fn generate(server_seed: &str, client_seed: &str, nonce: u64, mines_count: u8) -> Self {
        let digest = fairness::round_digest(server_seed, client_seed, nonce);
        Self {
            mines_count,
            mines: place_mines(&digest, mines_count),
            reveals: Vec::new(),
        }
    }

    pub fn view(&self, settled: bool) -> MinesView {
        MinesView {
            mines_count: self.mines_count,
            mines: settled.then(|| self.mines.clone()),
            reveals: self.reveals.clone(),
        }
    }

    fn is_mine(&self, cell: u8) -> bool {
        self.mines.contains(&cell)
    }

    fn is_revealed(&self, cell: u8) -> bool {
        self.reveals.iter().any(|r| r.cell == cell)
    }

    fn safe_cells(&self) -> usize {
        MINES_GRID - self.mines_count as usize
    }

    /// Walk an ordered batch of picks against the board.
    ///
    /// Already-revealed cells are skipped idempotently. The walk stops at
    /// the first mine (session busts) or at a full clear (auto-settles);
    /// otherwise the session stays open at the multiplier for the reveal
    /// count reached.
    pub fn apply_reveals(
        &mut self,
        picks: &[u8],
        tables: &GameTables,
    ) -> Result<RevealOutcome, EngineError> {
        if picks.is_empty() {
            return Err(EngineError::InvalidParameters("no cells picked".to_string()));
        }
        if let Some(&cell) = picks.iter().find(|&&c| c as usize >= MINES_GRID) {
            return Err(EngineError::InvalidParameters(format!(
                "cell {} out of range",
                cell
            )));
        }

        for &cell in picks {
            if self.is_revealed(cell) {
                continue;
            }

            if self.is_mine(cell) {
                self.reveals.push(Reveal { cell, multiplier: 0.0 });
                return Ok(RevealOutcome::Busted);
            }

            let revealed = self.reveals.len() + 1;
            let multiplier = tables
                .mines_rate(self.mines_count, revealed)
                .ok_or_else(|| {
                    EngineError::InvalidParameters(format!(
                        "no win rate for {} mines / {} reveals",
                        self.mines_count, revealed
                    ))
                })?;
            self.reveals.push(Reveal { cell, multiplier });

            if self.reveals.len() == self.safe_cells() {
                return Ok(RevealOutcome::Cleared { multiplier });
            }
        }

        let current = self
            .reveals
            .last()
            .map(|r| r.multiplier)
            .unwrap_or(0.0);
        Ok(RevealOutcome::Open {
            current_multiplier: current,
        })
    }

    /// Multiplier for cashing out at the current reveal count.
    pub fn cashout_multiplier(&self, tables: &GameTables) -> Result<f64, EngineError> {
        if self.reveals.is_empty() {
            return Err(EngineError::InvalidAction("cannot cash out before any reveal"));
        }
        tables
            .mines_rate(self.mines_count, self.reveals.len())
            .ok_or_else(|| {
                EngineError::InvalidParameters(format!(
                    "no win rate for {} mines / {} reveals",
                    self.mines_count,
                    self.reveals.len()
                ))
            })
    }
}

/// Deterministic mine placement: slice the 128-hex round digest into
/// 3-hex-digit windows, reduce each modulo the remaining pool and remove
/// the chosen cell. Sampling without replacement, fully determined by the
/// digest and the window order.
fn place_mines(digest: &str, mines_count: u8) -> Vec<u8> {
    let mut available: Vec<u8> = (0..MINES_GRID as u8).collect();
    let mut mines = Vec::with_capacity(mines_count as usize);

    let mut i = 0;
    while i < digest.len() && mines.len() < mines_count as usize {
        let window = &digest[i..(i + 3).min(digest.len())];
        let value = u32::from_str_radix(window, 16).unwrap_or(0);
        let index = value as usize % available.len();
        mines.push(available.remove(index));
        i += 3;
    }

    mines.sort_unstable();
    mines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> &'static GameTables {
        GameTables::builtin()
    }

    fn board(mines_count: u8) -> MinesState {
        MinesState::generate("server", "client", 1, mines_count)
    }

    #[test]
    fn test_placement_exact_and_distinct() {
        for nonce in 0..50 {
            for count in [1u8, 3, 10, 24] {
                let digest = fairness::round_digest("server", "client", nonce);
                let mines = place_mines(&digest, count);
                assert_eq!(mines.len(), count as usize);
                let mut dedup = mines.clone();
                dedup.dedup();
                assert_eq!(dedup.len(), mines.len());
                assert!(mines.iter().all(|&c| (c as usize) < MINES_GRID));
            }
        }
    }

    #[test]
    fn test_placement_deterministic() {
        let a = board(5);
        let b = board(5);
        assert_eq!(a.mines, b.mines);
    }

    #[test]
    fn test_safe_reveal_keeps_session_open() {
        let mut state = board(3);
        let safe = (0..25).find(|&c| !state.is_mine(c)).unwrap();

        let outcome = state.apply_reveals(&[safe], tables()).unwrap();
        let expected = tables().mines_rate(3, 1).unwrap();
        assert_eq!(
            outcome,
            RevealOutcome::Open {
                current_multiplier: expected
            }
        );
        assert_eq!(state.reveals.len(), 1);
    }

    #[test]
    fn test_mine_hit_busts_and_stops_the_walk() {
        let mut state = board(3);
        let mine = state.mines[0];
        let safe = (0..25).find(|&c| !state.is_mine(c)).unwrap();

        // The safe pick after the mine must not be consumed.
        let outcome = state.apply_reveals(&[mine, safe], tables()).unwrap();
        assert_eq!(outcome, RevealOutcome::Busted);
        assert_eq!(state.reveals.len(), 1);
        assert_eq!(state.reveals[0].cell, mine);
        assert_eq!(state.reveals[0].multiplier, 0.0);
    }

    #[test]
    fn test_resubmitted_cells_are_skipped() {
        let mut state = board(3);
        let safe = (0..25).find(|&c| !state.is_mine(c)).unwrap();

        state.apply_reveals(&[safe], tables()).unwrap();
        let outcome = state.apply_reveals(&[safe], tables()).unwrap();

        // No progress: the duplicate is ignored and the multiplier reported
        // is still for one reveal.
        assert_eq!(state.reveals.len(), 1);
        assert_eq!(
            outcome,
            RevealOutcome::Open {
                current_multiplier: tables().mines_rate(3, 1).unwrap()
            }
        );
    }

    #[test]
    fn test_full_clear_auto_settles_at_terminal_multiplier() {
        let mut state = board(22);
        let safe: Vec<u8> = (0..25).filter(|&c| !state.is_mine(c)).collect();
        assert_eq!(safe.len(), 3);

        let outcome = state.apply_reveals(&safe, tables()).unwrap();
        assert_eq!(
            outcome,
            RevealOutcome::Cleared {
                multiplier: tables().mines_terminal(22).unwrap()
            }
        );
    }

    #[test]
    fn test_multiplier_grows_with_reveals() {
        let mut state = board(3);
        let safe: Vec<u8> = (0..25).filter(|&c| !state.is_mine(c)).take(4).collect();

        let mut last = 0.0;
        for &cell in &safe {
            match state.apply_reveals(&[cell], tables()).unwrap() {
                RevealOutcome::Open { current_multiplier } => {
                    assert!(current_multiplier > last);
                    last = current_multiplier;
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[test]
    fn test_cashout_requires_a_reveal() {
        let state = board(3);
        assert!(matches!(
            state.cashout_multiplier(tables()),
            Err(EngineError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_cashout_uses_current_reveal_count() {
        let mut state = board(3);
        let safe: Vec<u8> = (0..25).filter(|&c| !state.is_mine(c)).take(2).collect();
        state.apply_reveals(&safe, tables()).unwrap();

        assert_eq!(
            state.cashout_multiplier(tables()).unwrap(),
            tables().mines_rate(3, 2).unwrap()
        );
    }

    #[test]
    fn test_out_of_range_cell_rejected_before_mutation() {
        let mut state = board(3);
        let err = state.apply_reveals(&[25], tables()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
        assert!(state.reveals.is_empty());
    }

    #[test]
    fn test_view_hides_board_until_settled() {
        let state = board(3);
        assert!(state.view(false).mines.is_none());
        assert_eq!(state.view(true).mines.as_deref(), Some(&state.mines[..]));
    }
}
