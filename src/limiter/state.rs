use rand::Rng;

use crate::limiter::window::Window;

/// Baseline blackout duration applied to every `note429`, before escalation
/// or `Retry-After` override.
pub const BASE_BLACKOUT_MS: u64 = 30_000;

/// Once a host has taken its 2nd 429 the blackout floor rises to 5 minutes.
const ESCALATED_BLACKOUT_2_MS: u64 = 5 * 60_000;

/// Once a host has taken its 3rd (or later) 429 the floor rises to 15 minutes.
const ESCALATED_BLACKOUT_3_MS: u64 = 15 * 60_000;

/// A success more than this long after the last 429 resets `err429Streak`.
pub const SUCCESS_GAP_MS: u64 = 10 * 60_000;

/// `noteSuccess` only probes the rpm cap if no 429 occurred in this window.
const PROBE_QUIET_WINDOW_MS: u64 = 30 * 60_000;

/// `noteSuccess` records `rpm` as `rpm_last_safe` once the host has gone this
/// long without a 429.
const SAFE_RECORD_WINDOW_MS: u64 = 10 * 60_000;

/// A probe (rpm *= 1.1) fires at most once per this interval.
const PROBE_INTERVAL_MS: u64 = 60_000;

/// Grace period applied to `nextRequestAt` right after a 429.
const POST_429_GRACE_MS: u64 = 500;

/// Lower/upper jitter fraction applied to blackout durations.
const BLACKOUT_JITTER_FRACTION: f64 = 0.10;

/// What an `acquire` should do before the caller is allowed to send a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOutcome {
    /// Absolute time (clock ms) the caller must wait until, if any.
    pub wait_until: Option<u64>,
}

/// Per-host adaptive pacing state: ramp / blackout / probe.
///
/// A host that has never been referenced behaves as uncapped: `rpm` stays
/// `None` and `acquire` never produces a wait, only window bookkeeping.
#[derive(Debug, Clone)]
pub struct HostLimitState {
    pub rpm: Option<u32>,
    pub rpm_last_safe: Option<u32>,
    pub next_request_at: u64,
    pub backoff_until: u64,
    pub is_limited: bool,
    pub err429_streak: u32,
    pub success_streak: u32,
    pub last_429_at: Option<u64>,
    pub last_success_at: Option<u64>,
    pub last_ramp_at: Option<u64>,
    pub window_started_at: u64,
    pub window_count: u32,
    pub rpm_floor_learned: Option<u32>,
    request_times: Window<u64>,
    jitter_min_ms: u64,
    jitter_max_ms: u64,
}

impl HostLimitState {
    #[must_use]
    pub fn new(now: u64, jitter_min_ms: u64, jitter_max_ms: u64) -> Self {
        Self {
            rpm: None,
            rpm_last_safe: None,
            next_request_at: 0,
            backoff_until: 0,
            is_limited: false,
            err429_streak: 0,
            success_streak: 0,
            last_429_at: None,
            last_success_at: None,
            last_ramp_at: None,
            window_started_at: now,
            window_count: 0,
            rpm_floor_learned: None,
            request_times: Window::default(),
            jitter_min_ms,
            jitter_max_ms,
        }
    }

    /// Whether the host is currently in blackout at the given time.
    #[must_use]
    pub fn in_blackout(&self, now: u64) -> bool {
        now < self.backoff_until
    }

    fn jitter(&self) -> u64 {
        if self.jitter_max_ms <= self.jitter_min_ms {
            return self.jitter_min_ms;
        }
        rand::rng().random_range(self.jitter_min_ms..=self.jitter_max_ms)
    }

    /// Plan an `acquire`: compute whether the caller must wait, and update
    /// scheduling/window state as if the request is about to be sent.
    ///
    /// Steps mirror the four-step `acquire` algorithm: blackout wait takes
    /// priority over the per-host spacing wait; otherwise the next slot is
    /// scheduled from `rpm` plus jitter.
    pub fn plan_acquire(&mut self, now: u64) -> AcquireOutcome {
        if now < self.backoff_until {
            return AcquireOutcome {
                wait_until: Some(self.backoff_until),
            };
        }
        if self.is_limited && now < self.next_request_at {
            return AcquireOutcome {
                wait_until: Some(self.next_request_at),
            };
        }

        if let Some(rpm) = self.rpm {
            let rpm = rpm.max(1);
            let interval_ms = 60_000 / u64::from(rpm);
            self.next_request_at = now + interval_ms + self.jitter();
        }

        if now.saturating_sub(self.window_started_at) >= 60_000 {
            self.window_started_at = now;
            self.window_count = 0;
        }
        self.window_count += 1;
        self.request_times.push(now);

        AcquireOutcome { wait_until: None }
    }

    /// Record a 429 response, entering or deepening blackout.
    pub fn note_429(&mut self, now: u64, retry_after_ms: Option<u64>) {
        self.is_limited = true;
        self.err429_streak += 1;
        self.success_streak = 0;
        self.last_429_at = Some(now);

        let base = BASE_BLACKOUT_MS.max(retry_after_ms.unwrap_or(0));
        let floor = if self.err429_streak >= 3 {
            ESCALATED_BLACKOUT_3_MS
        } else if self.err429_streak >= 2 {
            ESCALATED_BLACKOUT_2_MS
        } else {
            0
        };
        let duration = base.max(floor);
        let jittered = jitter_fraction(duration, BLACKOUT_JITTER_FRACTION);

        self.backoff_until = now + jittered;

        let last_safe = self.rpm_last_safe.unwrap_or(self.rpm.unwrap_or(1));
        let current = self.rpm.unwrap_or(1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let candidate = ((f64::from(current) * 0.25).min(f64::from(last_safe) * 0.5)) as u32;
        let new_rpm = candidate.max(1);
        self.rpm = Some(new_rpm);
        self.rpm_floor_learned = Some(new_rpm);

        self.next_request_at = now + POST_429_GRACE_MS;
    }

    /// Record a success, possibly resetting the 429 streak and probing the
    /// rpm cap upward.
    pub fn note_success(&mut self, now: u64) {
        if let Some(last429) = self.last_429_at {
            if now.saturating_sub(last429) > SUCCESS_GAP_MS {
                self.err429_streak = 0;
            }
        } else {
            self.err429_streak = 0;
        }

        self.last_success_at = Some(now);
        self.success_streak += 1;

        let no_429_in_30m = self
            .last_429_at
            .map_or(true, |t| now.saturating_sub(t) >= PROBE_QUIET_WINDOW_MS);
        let no_429_in_10m = self
            .last_429_at
            .map_or(true, |t| now.saturating_sub(t) >= SAFE_RECORD_WINDOW_MS);

        if no_429_in_10m {
            if let Some(rpm) = self.rpm {
                self.rpm_last_safe = Some(self.rpm_last_safe.map_or(rpm, |safe| safe.max(rpm)));
            }
        }

        let probe_due = self
            .last_ramp_at
            .map_or(true, |t| now.saturating_sub(t) >= PROBE_INTERVAL_MS);

        if no_429_in_30m && probe_due {
            if let Some(rpm) = self.rpm {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let probed = ((f64::from(rpm) * 1.1).ceil() as u32).max(rpm + 1);
                self.rpm = Some(probed);
                self.last_ramp_at = Some(now);
            }
        }
    }

    #[must_use]
    pub fn request_count_in_window(&self) -> usize {
        self.request_times.len()
    }
}

/// Additive-only jitter: the result is always `>= base_ms`, so a blackout
/// never drops below its floor. Adds up to `2 * fraction * base_ms` on top.
fn jitter_fraction(base_ms: u64, fraction: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let span = (base_ms as f64 * fraction) as u64;
    if span == 0 {
        return base_ms;
    }
    base_ms + rand::rng().random_range(0..=(2 * span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreferenced_host_never_waits() {
        let mut s = HostLimitState::new(0, 0, 0);
        let out = s.plan_acquire(1_000);
        assert_eq!(out.wait_until, None);
        assert_eq!(s.request_count_in_window(), 1);
    }

    #[test]
    fn note_429_backoff_is_at_least_30s() {
        let mut s = HostLimitState::new(0, 0, 0);
        s.note_429(10_000, None);
        assert!(s.backoff_until >= 10_000 + 30_000);
    }

    #[test]
    fn escalation_after_second_and_third_429() {
        let mut s = HostLimitState::new(0, 0, 0);
        s.note_429(0, None);
        assert!(s.backoff_until < 5 * 60_000);

        let second_start = s.backoff_until;
        s.note_429(second_start, None);
        let second_duration = s.backoff_until - second_start;
        assert!(second_duration >= 5 * 60_000);

        let third_start = s.backoff_until;
        s.note_429(third_start, None);
        let third_duration = s.backoff_until - third_start;
        assert!(third_duration >= 15 * 60_000);
    }

    #[test]
    fn acquire_waits_until_backoff_expires() {
        let mut s = HostLimitState::new(0, 0, 0);
        s.note_429(0, None);
        let out = s.plan_acquire(1);
        assert_eq!(out.wait_until, Some(s.backoff_until));
    }

    #[test]
    fn success_streak_resets_after_success_gap() {
        let mut s = HostLimitState::new(0, 0, 0);
        s.note_429(0, None);
        assert_eq!(s.err429_streak, 1);
        s.note_success(0 + SUCCESS_GAP_MS + 1);
        assert_eq!(s.err429_streak, 0);
    }

    #[test]
    fn retry_after_overrides_base_blackout_when_larger() {
        let mut s = HostLimitState::new(0, 0, 0);
        s.note_429(0, Some(60_000));
        assert!(s.backoff_until >= 60_000);
    }
}
