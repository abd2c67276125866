use std::{collections::HashMap, sync::Arc, time::Duration};

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{config::CleanupConfig, domain::ChatId};

/// Pacing bounds for outbound platform calls.
#[derive(Clone, Copy, Debug)]
pub struct PacingConfig {
    /// Minimum spacing between *any* two platform calls (global flood control).
    pub global_spacing: Duration,
    /// Random extra delay added on top of the global spacing, up to this much.
    pub max_jitter: Duration,
    /// Minimum spacing between action starts against the same peer.
    pub min_peer_interval: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            global_spacing: Duration::from_millis(300),
            max_jitter: Duration::from_millis(150),
            min_peer_interval: Duration::from_millis(1500),
        }
    }
}

impl From<&CleanupConfig> for PacingConfig {
    fn from(cfg: &CleanupConfig) -> Self {
        Self {
            global_spacing: cfg.action_spacing,
            max_jitter: cfg.action_jitter,
            min_peer_interval: cfg.min_peer_interval,
        }
    }
}

/// Slot reservation for the global tier: each caller reserves the next free
/// slot and sleeps until it.
#[derive(Debug)]
struct IntervalLimiter {
    next: Instant,
}

impl IntervalLimiter {
    fn new() -> Self {
        Self {
            next: Instant::now(),
        }
    }

    fn reserve(&mut self, interval: Duration) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + interval;
        start.saturating_duration_since(now)
    }
}

/// Per-peer tier: tracks when the last action against the peer actually
/// started, so the interval holds between real starts even when the global
/// tier delayed that action past its reserved slot.
#[derive(Debug)]
struct PeerGate {
    last_start: Option<Instant>,
}

impl PeerGate {
    fn wait_needed(&self, interval: Duration, now: Instant) -> Duration {
        match self.last_start {
            Some(last) => (last + interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

/// Two-tier rate limiter: global spacing plus per-peer spacing.
///
/// Platform throttling penalizes both burstiness and repeated hammering of
/// one peer; satisfying only one bound is not enough. State is owned by the
/// job that created the limiter and discarded with it.
pub struct RateLimiter {
    cfg: PacingConfig,
    global: Mutex<IntervalLimiter>,
    per_peer: Mutex<HashMap<i64, Arc<Mutex<PeerGate>>>>,
}

impl RateLimiter {
    pub fn new(cfg: PacingConfig) -> Self {
        Self {
            cfg,
            global: Mutex::new(IntervalLimiter::new()),
            per_peer: Mutex::new(HashMap::new()),
        }
    }

    async fn gate_for_peer(&self, chat_id: i64) -> Arc<Mutex<PeerGate>> {
        let mut map = self.per_peer.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(PeerGate { last_start: None })))
            .clone()
    }

    /// Suspend until both the global and the per-peer spacing are satisfied.
    /// Returns immediately before the caller issues its platform call, which
    /// is the instant the peer gate records.
    pub async fn await_turn(&self, chat_id: ChatId) {
        let jitter = random_jitter(self.cfg.max_jitter);

        let gate = self.gate_for_peer(chat_id.0).await;
        let mut gate_guard = gate.lock().await;

        let global_wait = {
            let mut guard = self.global.lock().await;
            guard.reserve(self.cfg.global_spacing + jitter)
        };
        let peer_wait = gate_guard.wait_needed(self.cfg.min_peer_interval, Instant::now());

        let wait = global_wait.max(peer_wait);
        if wait > Duration::ZERO {
            sleep(wait).await;
        }

        gate_guard.last_start = Some(Instant::now());
    }
}

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let ms = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacing(global_ms: u64, peer_ms: u64) -> PacingConfig {
        PacingConfig {
            global_spacing: Duration::from_millis(global_ms),
            max_jitter: Duration::ZERO,
            min_peer_interval: Duration::from_millis(peer_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_peer_is_spaced_by_peer_interval() {
        let limiter = RateLimiter::new(pacing(300, 1500));

        let t0 = Instant::now();
        limiter.await_turn(ChatId(1)).await;
        limiter.await_turn(ChatId(1)).await;
        let elapsed = t0.elapsed();

        assert!(
            elapsed >= Duration::from_millis(1500),
            "second turn started after {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn different_peers_only_pay_global_spacing() {
        let limiter = RateLimiter::new(pacing(300, 1500));

        let t0 = Instant::now();
        limiter.await_turn(ChatId(1)).await;
        limiter.await_turn(ChatId(2)).await;
        let elapsed = t0.elapsed();

        assert!(elapsed >= Duration::from_millis(300));
        assert!(
            elapsed < Duration::from_millis(1500),
            "peer interval leaked across peers: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_turns_space_every_start() {
        let limiter = RateLimiter::new(pacing(100, 400));

        let mut starts = Vec::new();
        for _ in 0..4 {
            limiter.await_turn(ChatId(7)).await;
            starts.push(Instant::now());
        }
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(400));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn peer_interval_holds_even_after_a_global_delay() {
        let limiter = RateLimiter::new(pacing(1000, 1500));

        // Another peer consumes the first global slot, delaying peer 2's
        // first action past its (empty) gate.
        limiter.await_turn(ChatId(1)).await;
        limiter.await_turn(ChatId(2)).await;
        let first_start = Instant::now();
        limiter.await_turn(ChatId(2)).await;

        assert!(Instant::now() - first_start >= Duration::from_millis(1500));
    }

    #[test]
    fn jitter_is_bounded() {
        let max = Duration::from_millis(150);
        for _ in 0..32 {
            assert!(random_jitter(max) <= max);
        }
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
    }
}
