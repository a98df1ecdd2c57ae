//! Plinko path engine.
//!
//! Outcomes are produced in two stages: the landing slot is drawn first by
//! weighted sampling over the round digest, then a left/right move sequence
//! of exactly `rows` steps is synthesized to arrive at that slot. Decoupling
//! destination from path lets the payout table follow an arbitrary weight
//! curve instead of a binomial distribution.

use crate::fairness::{self, ByteStream};
use crate::tables::PlinkoRow;
use serde::{Deserialize, Serialize};

use super::RiskTier;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

/// Settled state of one drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlinkoState {
    pub rows: u8,
    pub risk: RiskTier,
    pub path: Vec<Direction>,
    pub slot: u8,
}

/// Result of a generated drop, before settlement.
#[derive(Debug, Clone)]
pub struct Drop {
    pub path: Vec<Direction>,
    pub slot: u8,
    pub multiplier: f64,
}

/// Generate the full outcome of a drop for one round.
///
/// The slot always has a payout entry: `table` is validated at load time to
/// be exactly `rows + 1` wide, and the sampled index is bounded by the
/// weight vector of the same width.
pub fn generate_drop(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    rows: u8,
    table: &PlinkoRow,
) -> Drop {
    let digest = fairness::round_digest(server_seed, client_seed, nonce);
    let target = fairness::weighted_index(&digest, &table.weights) as u8;

    let offset_digest = fairness::tagged_digest(server_seed, client_seed, nonce, "offset");
    let start_offset = (fairness::digest_prefix(&offset_digest) % 3) as i64 - 1;

    let path = synthesize_path(server_seed, client_seed, nonce, rows, target, start_offset);

    Drop {
        path,
        slot: target,
        multiplier: table.payouts[target as usize],
    }
}

/// Build a move sequence of length `rows` that lands on `target`.
///
/// A running cursor (tracked in half-steps) starts at `rows/2 + offset` and
/// walks toward the target; a direction is forced whenever the remaining
/// steps require it, and exact alignment is broken with a fresh byte from
/// the round's byte stream. The landing slot of a path is its count of
/// right moves, so forcing guarantees arrival.
fn synthesize_path(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    rows: u8,
    target: u8,
    start_offset: i64,
) -> Vec<Direction> {
    let mut stream = ByteStream::new(server_seed, client_seed, nonce);
    let mut path = Vec::with_capacity(rows as usize);

    // Half-step units: each move shifts the cursor by 1, slot centers sit
    // at even positions.
    let mut cursor = rows as i64 + 2 * start_offset;
    let target_pos = 2 * target as i64;
    let mut rights = 0u8;

    for step in 0..rows {
        let remaining = rows - step;
        let rights_needed = target - rights;

        let direction = if rights_needed == remaining {
            Direction::Right
        } else if rights_needed == 0 {
            Direction::Left
        } else if cursor < target_pos {
            Direction::Right
        } else if cursor > target_pos {
            Direction::Left
        } else if stream.next_byte() & 1 == 1 {
            Direction::Right
        } else {
            Direction::Left
        };

        match direction {
            Direction::Right => {
                cursor += 1;
                rights += 1;
            }
            Direction::Left => cursor -= 1,
        }
        path.push(direction);
    }

    path
}
