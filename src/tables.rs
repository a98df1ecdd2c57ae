//! Static game tables: payout-by-slot, weight-by-slot, win-rate-by-reveal.
//!
//! Tables are loaded once at startup, validated, and treated as immutable
//! for the life of the engine. The width invariant (weights and payouts for
//! a row count must both have `rows + 1` entries) is enforced here so slot
//! lookups downstream can never fall outside the table.

use crate::games::RiskTier;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Cells on the mines board.
pub const MINES_GRID: usize = 25;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to load tables: {0}")]
    LoadFailed(String),

    #[error("plinko table {risk}/{rows}: {reason}")]
    InvalidPlinkoRow {
        risk: RiskTier,
        rows: u8,
        reason: String,
    },

    #[error("mines table for {mines} mines: {reason}")]
    InvalidMinesRow { mines: u8, reason: String },

    #[error("mines table is empty")]
    EmptyMinesTable,

    #[error("plinko table is empty")]
    EmptyPlinkoTable,
}

/// Payouts and sampling weights for one (risk, rows) plinko configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlinkoRow {
    /// Multiplier per landing slot, `rows + 1` entries.
    pub payouts: Vec<f64>,
    /// Sampling weight per landing slot, same width as `payouts`.
    pub weights: Vec<u32>,
}

/// All static tables consumed by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameTables {
    /// Plinko rows keyed by risk tier, then by row count.
    pub plinko: BTreeMap<RiskTier, BTreeMap<u8, PlinkoRow>>,
    /// Mines multipliers: `mines[mines_count][revealed - 1]`, covering
    /// 1..=25-mines_count reveals.
    pub mines: BTreeMap<u8, Vec<f64>>,
}

impl GameTables {
    /// Load tables from a JSON file and validate them.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let raw = std::fs::read_to_string(path).map_err(|e| TableError::LoadFailed(e.to_string()))?;
        Self::from_json(&raw)
    }

    /// Parse tables from a JSON string and validate them.
    pub fn from_json(raw: &str) -> Result<Self, TableError> {
        let tables: GameTables =
            serde_json::from_str(raw).map_err(|e| TableError::LoadFailed(e.to_string()))?;
        tables.validate()?;
        Ok(tables)
    }

    /// Built-in default tables: plinko rows 8/12/16 across the three risk
    /// tiers with binomial sampling weights, mines multipliers at a 1% edge.
    pub fn builtin() -> &'static GameTables {
        static BUILTIN: Lazy<GameTables> = Lazy::new(|| {
            let tables = GameTables {
                plinko: builtin_plinko(),
                mines: builtin_mines(),
            };
            tables.validate().expect("built-in tables are well-formed");
            tables
        });
        &BUILTIN
    }

    /// Payout and weight row for a (risk, rows) pair, if configured.
    pub fn plinko_row(&self, risk: RiskTier, rows: u8) -> Option<&PlinkoRow> {
        self.plinko.get(&risk)?.get(&rows)
    }

    /// Multiplier after `revealed` safe reveals with `mines_count` mines.
    pub fn mines_rate(&self, mines_count: u8, revealed: usize) -> Option<f64> {
        if revealed == 0 {
            return None;
        }
        self.mines
            .get(&mines_count)?
            .get(revealed - 1)
            .copied()
    }

    /// Terminal multiplier for a full clear with `mines_count` mines.
    pub fn mines_terminal(&self, mines_count: u8) -> Option<f64> {
        self.mines.get(&mines_count).and_then(|row| row.last().copied())
    }

    /// Enforce the structural invariants every lookup relies on.
    pub fn validate(&self) -> Result<(), TableError> {
        if self.plinko.values().all(|rows| rows.is_empty()) {
            return Err(TableError::EmptyPlinkoTable);
        }
        for (&risk, rows) in &self.plinko {
            for (&row_count, row) in rows {
                let width = row_count as usize + 1;
                if row.payouts.len() != width {
                    return Err(TableError::InvalidPlinkoRow {
                        risk,
                        rows: row_count,
                        reason: format!("expected {} payouts, got {}", width, row.payouts.len()),
                    });
                }
                if row.weights.len() != width {
                    return Err(TableError::InvalidPlinkoRow {
                        risk,
                        rows: row_count,
                        reason: format!("expected {} weights, got {}", width, row.weights.len()),
                    });
                }
                if row.weights.iter().map(|&w| w as u64).sum::<u64>() == 0 {
                    return Err(TableError::InvalidPlinkoRow {
                        risk,
                        rows: row_count,
                        reason: "weights sum to zero".to_string(),
                    });
                }
                if row.payouts.iter().any(|&p| p < 0.0) {
                    return Err(TableError::InvalidPlinkoRow {
                        risk,
                        rows: row_count,
                        reason: "negative payout".to_string(),
                    });
                }
            }
        }

        if self.mines.is_empty() {
            return Err(TableError::EmptyMinesTable);
        }
        for (&mines, rates) in &self.mines {
            if mines == 0 || mines as usize >= MINES_GRID {
                return Err(TableError::InvalidMinesRow {
                    mines,
                    reason: "mine count out of range".to_string(),
                });
            }
            let safe_cells = MINES_GRID - mines as usize;
            if rates.len() != safe_cells {
                return Err(TableError::InvalidMinesRow {
                    mines,
                    reason: format!("expected {} rates, got {}", safe_cells, rates.len()),
                });
            }
            if rates.windows(2).any(|pair| pair[1] <= pair[0]) {
                return Err(TableError::InvalidMinesRow {
                    mines,
                    reason: "rates must increase with reveals".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn plinko_row(payouts: &[f64]) -> PlinkoRow {
    let rows = payouts.len() - 1;
    PlinkoRow {
        payouts: payouts.to_vec(),
        weights: binomial_weights(rows),
    }
}

/// Binomial coefficients C(rows, k) as the default weight curve.
fn binomial_weights(rows: usize) -> Vec<u32> {
    let mut weights = vec![1u64];
    for _ in 0..rows {
        let mut next = vec![1u64];
        for pair in weights.windows(2) {
            next.push(pair[0] + pair[1]);
        }
        next.push(1);
        weights = next;
    }
    weights.into_iter().map(|w| w as u32).collect()
}

fn builtin_plinko() -> BTreeMap<RiskTier, BTreeMap<u8, PlinkoRow>> {
    let mut low = BTreeMap::new();
    low.insert(8, plinko_row(&[5.6, 2.1, 1.1, 1.0, 0.5, 1.0, 1.1, 2.1, 5.6]));
    low.insert(
        12,
        plinko_row(&[10.0, 3.0, 1.6, 1.4, 1.1, 1.0, 0.5, 1.0, 1.1, 1.4, 1.6, 3.0, 10.0]),
    );
    low.insert(
        16,
        plinko_row(&[
            16.0, 9.0, 2.0, 1.4, 1.4, 1.2, 1.1, 1.0, 0.5, 1.0, 1.1, 1.2, 1.4, 1.4, 2.0, 9.0, 16.0,
        ]),
    );

    let mut medium = BTreeMap::new();
    medium.insert(8, plinko_row(&[13.0, 3.0, 1.3, 0.7, 0.4, 0.7, 1.3, 3.0, 13.0]));
    medium.insert(
        12,
        plinko_row(&[33.0, 11.0, 4.0, 2.0, 1.1, 0.6, 0.3, 0.6, 1.1, 2.0, 4.0, 11.0, 33.0]),
    );
    medium.insert(
        16,
        plinko_row(&[
            110.0, 41.0, 10.0, 5.0, 3.0, 1.5, 1.0, 0.5, 0.3, 0.5, 1.0, 1.5, 3.0, 5.0, 10.0, 41.0,
            110.0,
        ]),
    );

    let mut high = BTreeMap::new();
    high.insert(8, plinko_row(&[29.0, 4.0, 1.5, 0.3, 0.2, 0.3, 1.5, 4.0, 29.0]));
    high.insert(
        12,
        plinko_row(&[170.0, 24.0, 8.1, 2.0, 0.7, 0.2, 0.2, 0.2, 0.7, 2.0, 8.1, 24.0, 170.0]),
    );
    high.insert(
        16,
        plinko_row(&[
            1000.0, 130.0, 26.0, 9.0, 4.0, 2.0, 0.2, 0.2, 0.2, 0.2, 0.2, 2.0, 4.0, 9.0, 26.0,
            130.0, 1000.0,
        ]),
    );

    let mut plinko = BTreeMap::new();
    plinko.insert(RiskTier::Low, low);
    plinko.insert(RiskTier::Medium, medium);
    plinko.insert(RiskTier::High, high);
    plinko
}

/// Mines multipliers at a 1% house edge: 0.99 times the inverse survival
/// probability of `revealed` safe picks, rounded to 2 decimals.
fn builtin_mines() -> BTreeMap<u8, Vec<f64>> {
    let mut table = BTreeMap::new();
    for mines in 1..MINES_GRID as u8 {
        let safe_cells = MINES_GRID - mines as usize;
        let mut rates = Vec::with_capacity(safe_cells);
        let mut fair = 1.0f64;
        for revealed in 0..safe_cells {
            fair *= (MINES_GRID - revealed) as f64 / (safe_cells - revealed) as f64;
            rates.push((fair * 0.99 * 100.0).round() / 100.0);
        }
        table.insert(mines, rates);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_validate() {
        let tables = GameTables::builtin();
        assert!(tables.validate().is_ok());
    }

    #[test]
    fn test_plinko_width_invariant() {
        let tables = GameTables::builtin();
        for risk in [RiskTier::Low, RiskTier::Medium, RiskTier::High] {
            for rows in [8u8, 12, 16] {
                let row = tables.plinko_row(risk, rows).expect("configured row");
                assert_eq!(row.payouts.len(), rows as usize + 1);
                assert_eq!(row.weights.len(), rows as usize + 1);
            }
        }
    }

    #[test]
    fn test_unconfigured_row_count_is_absent() {
        assert!(GameTables::builtin().plinko_row(RiskTier::Low, 9).is_none());
    }

    #[test]
    fn test_mines_rates_cover_every_reveal_count() {
        let tables = GameTables::builtin();
        for mines in 1..25u8 {
            let safe = 25 - mines as usize;
            for revealed in 1..=safe {
                assert!(tables.mines_rate(mines, revealed).is_some());
            }
            assert!(tables.mines_rate(mines, safe + 1).is_none());
            assert_eq!(
                tables.mines_terminal(mines),
                tables.mines_rate(mines, safe)
            );
        }
    }

    #[test]
    fn test_mines_rates_increase_with_reveals() {
        let rates = &GameTables::builtin().mines[&3];
        for pair in rates.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_zero_reveals_has_no_rate() {
        assert!(GameTables::builtin().mines_rate(3, 0).is_none());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let mut tables = GameTables::builtin().clone();
        tables
            .plinko
            .get_mut(&RiskTier::Low)
            .unwrap()
            .get_mut(&8)
            .unwrap()
            .payouts
            .pop();
        assert!(matches!(
            tables.validate(),
            Err(TableError::InvalidPlinkoRow { .. })
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let raw = serde_json::to_string(GameTables::builtin()).expect("serialize");
        let parsed = GameTables::from_json(&raw).expect("parse");
        assert_eq!(
            parsed.plinko_row(RiskTier::High, 16).unwrap().payouts,
            GameTables::builtin().plinko_row(RiskTier::High, 16).unwrap().payouts
        );
    }
}
