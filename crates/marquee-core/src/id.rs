//! Time-ordered candidate identifiers.
//!
//! # Design
//! - Snowflake layout: 41-bit millisecond timestamp, 5-bit datacenter, 5-bit worker,
//!   12-bit sequence.
//! - Sequence overflow borrows the next millisecond instead of spinning, so ids stay
//!   strictly increasing within one generator.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

const EPOCH_MS: i64 = 1_288_834_974_657;
const WORKER_ID_BITS: u32 = 5;
const DATACENTER_ID_BITS: u32 = 5;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

static GENERATOR: Lazy<SnowflakeGenerator> = Lazy::new(|| SnowflakeGenerator::new(0, 1));

/// Identifier of a search candidate; its decimal form is the selection token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(u64);

impl CandidateId {
    /// Draw a fresh id from the process-wide generator.
    #[must_use]
    pub fn generate() -> Self {
        GENERATOR.next_id()
    }

    #[must_use]
    /// Wrap a raw value.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    /// Raw numeric value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[must_use]
    /// Token handed to the chat transport.
    pub fn token(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CandidateId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_ms: i64,
    sequence: u64,
}

/// Snowflake id generator.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    datacenter_id: u64,
    worker_id: u64,
    state: Mutex<GeneratorState>,
}

impl SnowflakeGenerator {
    /// Build a generator; ids are masked into their bit widths.
    #[must_use]
    pub fn new(datacenter_id: u64, worker_id: u64) -> Self {
        Self {
            datacenter_id: datacenter_id & ((1 << DATACENTER_ID_BITS) - 1),
            worker_id: worker_id & ((1 << WORKER_ID_BITS) - 1),
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// Produce the next id.
    #[allow(clippy::cast_sign_loss)]
    pub fn next_id(&self) -> CandidateId {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut now = Utc::now().timestamp_millis().max(state.last_ms);
        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = state.last_ms + 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        let elapsed = (now - EPOCH_MS).max(0) as u64;
        CandidateId(
            (elapsed << TIMESTAMP_SHIFT)
                | (self.datacenter_id << DATACENTER_SHIFT)
                | (self.worker_id << WORKER_SHIFT)
                | state.sequence,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let generator = SnowflakeGenerator::new(0, 1);
        let mut previous = generator.next_id();
        for _ in 0..10_000 {
            let next = generator.next_id();
            assert!(next > previous, "{next} should follow {previous}");
            previous = next;
        }
    }

    #[test]
    fn worker_and_datacenter_bits_are_embedded() {
        let generator = SnowflakeGenerator::new(3, 7);
        let raw = generator.next_id().as_u64();
        assert_eq!((raw >> WORKER_SHIFT) & 0x1f, 7);
        assert_eq!((raw >> DATACENTER_SHIFT) & 0x1f, 3);
    }

    #[test]
    fn token_round_trips_through_from_str() {
        let id = CandidateId::generate();
        let parsed: CandidateId = id.token().parse().expect("token should parse");
        assert_eq!(parsed, id);
        assert!("not-a-number".parse::<CandidateId>().is_err());
    }
}
