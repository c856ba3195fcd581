//! Shared domain models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Simulation ticks per second of game time.
pub const TICKS_PER_SECOND: u64 = 60;

/// Identifier of an item prototype as used by the host game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a storage station taking part in the logistics network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub u32);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "station#{}", self.0)
    }
}

/// Stable per-player key shared by every peer of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl PlayerId {
    /// Derive the identifier from the local account name and world seed.
    ///
    /// Uses 64-bit FNV-1a so every peer computes the same value for the
    /// same player, independent of process or platform.
    pub fn compute(account: &str, seed: &str) -> Self {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = OFFSET;
        for byte in account
            .trim()
            .bytes()
            .chain(std::iter::once(0))
            .chain(seed.bytes())
        {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        }
        Self(hash)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Convert a tick span into whole seconds, rounding up.
pub fn ticks_to_seconds(ticks: u64) -> u64 {
    ticks.div_ceil(TICKS_PER_SECOND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_is_deterministic() {
        let first = PlayerId::compute("Icarus", "seed-1234");
        let again = PlayerId::compute(" Icarus ", "seed-1234");
        assert_eq!(first, again);
        assert_ne!(first, PlayerId::compute("Icarus", "seed-9999"));
        assert_ne!(first, PlayerId::compute("Daedalus", "seed-1234"));
    }

    #[test]
    fn ticks_round_up_to_seconds() {
        assert_eq!(ticks_to_seconds(0), 0);
        assert_eq!(ticks_to_seconds(1), 1);
        assert_eq!(ticks_to_seconds(120), 2);
        assert_eq!(ticks_to_seconds(121), 3);
    }
}
