use rand::Rng;
use std::time::Duration;

/// Draws a fresh election timeout from `min_ms..=max_ms`. Each candidacy
/// draws independently so simultaneous candidates drift apart.
pub fn random_election_timeout(min_ms: u64, max_ms: u64) -> Duration {
    if min_ms >= max_ms {
        return Duration::from_millis(min_ms);
    }
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(min_ms..=max_ms))
}
