//! Ladder game (ghost leg) easter egg.
//!
//! Players start at the top of vertical lanes and walk down, crossing to the
//! neighbouring lane whenever a horizontal rung is met. Because two rungs never
//! touch the same lane in one row, every start lands on a distinct end.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_PLAYERS: usize = 26;
const ROWS_PER_LANE: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("at least 2 players are needed, got {0}")]
    TooFewPlayers(usize),

    #[error("at most 26 players are supported, got {0}")]
    TooManyPlayers(usize),

    #[error("{players} players but {prizes} prizes")]
    CountMismatch { players: usize, prizes: usize },

    #[error("row {row} has adjacent rungs at gap {gap}")]
    AdjacentRungs { row: usize, gap: usize },

    #[error("row {row} has {found} gaps, expected {expected}")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    lanes: usize,
    /// `rungs[row][gap]` connects lane `gap` with lane `gap + 1`
    rungs: Vec<Vec<bool>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub player: String,
    pub prize: String,
}

impl Ladder {
    pub fn generate<R: Rng + ?Sized>(lanes: usize, rows: usize, rng: &mut R) -> Result<Self, LadderError> {
        check_lanes(lanes)?;

        let rungs = (0..rows)
            .map(|_| {
                let mut row = vec![false; lanes - 1];
                for gap in 0..lanes - 1 {
                    let left_taken = gap > 0 && row[gap - 1];
                    row[gap] = !left_taken && rng.gen_bool(0.5);
                }
                row
            })
            .collect();

        Ok(Self { lanes, rungs })
    }

    pub fn from_rungs(lanes: usize, rungs: Vec<Vec<bool>>) -> Result<Self, LadderError> {
        check_lanes(lanes)?;
        for (row, gaps) in rungs.iter().enumerate() {
            if gaps.len() != lanes - 1 {
                return Err(LadderError::RowWidth {
                    row,
                    found: gaps.len(),
                    expected: lanes - 1,
                });
            }
            if let Some(gap) = gaps.windows(2).position(|pair| pair[0] && pair[1]) {
                return Err(LadderError::AdjacentRungs { row, gap: gap + 1 });
            }
        }
        Ok(Self { lanes, rungs })
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn rows(&self) -> usize {
        self.rungs.len()
    }

    pub fn has_rung(&self, row: usize, gap: usize) -> bool {
        self.rungs
            .get(row)
            .and_then(|gaps| gaps.get(gap))
            .copied()
            .unwrap_or(false)
    }

    /// Lane reached at the bottom when starting from lane `start`.
    pub fn trace(&self, start: usize) -> usize {
        let mut lane = start;
        for gaps in &self.rungs {
            if lane < gaps.len() && gaps[lane] {
                lane += 1;
            } else if lane > 0 && gaps[lane - 1] {
                lane -= 1;
            }
        }
        lane
    }
}

fn check_lanes(lanes: usize) -> Result<(), LadderError> {
    if lanes < 2 {
        return Err(LadderError::TooFewPlayers(lanes));
    }
    if lanes > MAX_PLAYERS {
        return Err(LadderError::TooManyPlayers(lanes));
    }
    Ok(())
}

/// Plays one round. The same seed always produces the same pairings.
pub fn play(players: &[String], prizes: &[String], seed: u64) -> Result<Vec<Pairing>, LadderError> {
    if players.len() != prizes.len() {
        return Err(LadderError::CountMismatch {
            players: players.len(),
            prizes: prizes.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let ladder = Ladder::generate(players.len(), players.len() * ROWS_PER_LANE, &mut rng)?;

    Ok(players
        .iter()
        .enumerate()
        .map(|(start, player)| Pairing {
            player: player.clone(),
            prize: prizes[ladder.trace(start)].clone(),
        })
        .collect())
}
