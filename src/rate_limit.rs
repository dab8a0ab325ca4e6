use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use url::Url;

use crate::error::ParseError;

/// Pause between a slot freeing and the queued caller re-entering, so a
/// burst of releases does not re-admit a stampede in the same instant.
pub const WAKE_DELAY: Duration = Duration::from_millis(100);

/// Origins untouched for this long get their limiter state dropped.
const IDLE_EVICTION: Duration = Duration::from_secs(3600);

/// Politeness envelope for one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginPolicy {
    /// Minimum spacing between successive request starts.
    pub min_delay: Duration,
    /// Maximum requests in flight at once.
    pub max_concurrent: usize,
    /// Maximum request starts within `burst_window`.
    pub burst_limit: usize,
    pub burst_window: Duration,
}

impl OriginPolicy {
    /// Large sites with aggressive bot defense get the strictest envelope.
    pub const HIGH_TRAFFIC: OriginPolicy = OriginPolicy {
        min_delay: Duration::from_millis(3000),
        max_concurrent: 1,
        burst_limit: 3,
        burst_window: Duration::from_secs(60),
    };

    pub const MEDIUM_TRAFFIC: OriginPolicy = OriginPolicy {
        min_delay: Duration::from_millis(2000),
        max_concurrent: 2,
        burst_limit: 5,
        burst_window: Duration::from_secs(60),
    };

    /// Default tier for everything not on a list.
    pub const SMALLER_SITES: OriginPolicy = OriginPolicy {
        min_delay: Duration::from_millis(1500),
        max_concurrent: 2,
        burst_limit: 7,
        burst_window: Duration::from_secs(60),
    };
}

const HIGH_TRAFFIC_DOMAINS: &[&str] = &[
    "allrecipes.com",
    "foodnetwork.com",
    "bonappetit.com",
    "epicurious.com",
    "seriouseats.com",
    "cooking.nytimes.com",
    "bbcgoodfood.com",
];

const MEDIUM_TRAFFIC_DOMAINS: &[&str] = &[
    "simplyrecipes.com",
    "food.com",
    "delish.com",
    "tasteofhome.com",
    "eatingwell.com",
    "thekitchn.com",
    "budgetbytes.com",
];

pub(crate) fn domain_matches(origin: &str, entry: &str) -> bool {
    origin == entry
        || (origin.len() > entry.len()
            && origin.ends_with(entry)
            && origin.as_bytes()[origin.len() - entry.len() - 1] == b'.')
}

/// Tier classification by static domain lists; unknown origins fall into
/// the smaller-sites tier.
pub fn policy_for(origin: &str) -> OriginPolicy {
    if HIGH_TRAFFIC_DOMAINS.iter().any(|d| domain_matches(origin, d)) {
        OriginPolicy::HIGH_TRAFFIC
    } else if MEDIUM_TRAFFIC_DOMAINS.iter().any(|d| domain_matches(origin, d)) {
        OriginPolicy::MEDIUM_TRAFFIC
    } else {
        OriginPolicy::SMALLER_SITES
    }
}

/// Extracts the rate-limiting origin from a URL: lowercased host with any
/// leading `www.` stripped. Only http(s) URLs are fetchable.
pub fn origin_of(url: &str) -> Result<String, ParseError> {
    let parsed = Url::parse(url).map_err(|e| ParseError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ParseError::UnsupportedScheme(other.to_string())),
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| ParseError::InvalidUrl(format!("{url}: no host")))?
        .to_lowercase();
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

struct TimingState {
    last_request_start: Option<Instant>,
    /// Request start times within the burst window, oldest first.
    window: VecDeque<Instant>,
}

struct OriginState {
    policy: OriginPolicy,
    /// Fair (FIFO) queue for the concurrency slots.
    slots: Arc<Semaphore>,
    timing: Arc<Mutex<TimingState>>,
    last_touched: Instant,
}

/// Per-origin admission control: concurrency cap, burst window, and
/// minimum inter-request delay, with FIFO queueing of blocked callers.
///
/// State is created lazily per origin and evicted after an hour of
/// inactivity. Admission is granted only when every constraint holds at
/// the moment of grant.
pub struct OriginRateLimiter {
    origins: Mutex<HashMap<String, OriginState>>,
    policy_override: Option<OriginPolicy>,
}

/// Proof of admission for one request. Dropping it releases the
/// concurrency slot and wakes the next queued caller for this origin.
pub struct Admission {
    origin: String,
    _permit: OwnedSemaphorePermit,
}

impl Admission {
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Default for OriginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginRateLimiter {
    pub fn new() -> Self {
        OriginRateLimiter {
            origins: Mutex::new(HashMap::new()),
            policy_override: None,
        }
    }

    /// One fixed policy for every origin, bypassing tier classification.
    pub fn with_policy(policy: OriginPolicy) -> Self {
        OriginRateLimiter {
            origins: Mutex::new(HashMap::new()),
            policy_override: Some(policy),
        }
    }

    /// Suspends until the origin's politeness constraints allow another
    /// request to start. Callers blocked on the concurrency cap are served
    /// strictly FIFO.
    pub async fn admit(&self, origin: &str) -> Admission {
        let (slots, timing, policy) = self.state_for(origin).await;

        // Concurrency cap first: take a slot or join the FIFO queue.
        let permit = match Arc::clone(&slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("rate limiter: {origin} at concurrency cap, queueing");
                let permit = Arc::clone(&slots)
                    .acquire_owned()
                    .await
                    .expect("origin semaphore is never closed");
                // Damp re-admission after a slot frees.
                tokio::time::sleep(WAKE_DELAY).await;
                permit
            }
        };

        // Burst window and min-delay, re-evaluated after every wait. The
        // slot stays held throughout so later arrivals cannot jump ahead.
        loop {
            let wait = {
                let mut t = timing.lock().await;
                let now = Instant::now();
                while t
                    .window
                    .front()
                    .is_some_and(|&ts| now.duration_since(ts) >= policy.burst_window)
                {
                    t.window.pop_front();
                }

                if t.window.len() >= policy.burst_limit {
                    let oldest = t.window[0];
                    let wait = policy
                        .burst_window
                        .checked_sub(now.duration_since(oldest))
                        .unwrap_or(Duration::ZERO);
                    debug!("rate limiter: {origin} burst limit reached, waiting {wait:?}");
                    Some(wait)
                } else {
                    let since_last = t
                        .last_request_start
                        .map(|last| now.duration_since(last));
                    match since_last {
                        Some(elapsed) if elapsed < policy.min_delay => {
                            let wait = policy.min_delay - elapsed;
                            debug!("rate limiter: {origin} min-delay spacing, waiting {wait:?}");
                            Some(wait)
                        }
                        _ => {
                            t.last_request_start = Some(now);
                            t.window.push_back(now);
                            None
                        }
                    }
                }
            };

            match wait {
                Some(duration) => tokio::time::sleep(duration).await,
                None => break,
            }
        }

        debug!("rate limiter: {origin} admitted");
        Admission {
            origin: origin.to_string(),
            _permit: permit,
        }
    }

    /// Number of origins currently tracked (post-eviction).
    pub async fn tracked_origins(&self) -> usize {
        self.origins.lock().await.len()
    }

    async fn state_for(
        &self,
        origin: &str,
    ) -> (Arc<Semaphore>, Arc<Mutex<TimingState>>, OriginPolicy) {
        let mut origins = self.origins.lock().await;
        let now = Instant::now();

        // Opportunistic TTL eviction; entries with requests in flight or
        // queued callers have permits out and are kept.
        origins.retain(|name, state| {
            let idle = now.duration_since(state.last_touched) >= IDLE_EVICTION;
            let quiescent = state.slots.available_permits() == state.policy.max_concurrent;
            if idle && quiescent {
                debug!("rate limiter: evicting idle origin {name}");
                false
            } else {
                true
            }
        });

        let policy_override = self.policy_override;
        let state = origins.entry(origin.to_string()).or_insert_with(|| {
            let policy = policy_override.unwrap_or_else(|| policy_for(origin));
            OriginState {
                policy,
                slots: Arc::new(Semaphore::new(policy.max_concurrent)),
                timing: Arc::new(Mutex::new(TimingState {
                    last_request_start: None,
                    window: VecDeque::new(),
                })),
                last_touched: now,
            }
        });
        state.last_touched = now;
        (
            Arc::clone(&state.slots),
            Arc::clone(&state.timing),
            state.policy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn wide_open(max_concurrent: usize) -> OriginPolicy {
        OriginPolicy {
            min_delay: Duration::ZERO,
            max_concurrent,
            burst_limit: 1000,
            burst_window: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_origin_of_normalizes_host() {
        assert_eq!(
            origin_of("https://www.allrecipes.com/recipe/12").unwrap(),
            "allrecipes.com"
        );
        assert_eq!(
            origin_of("http://Example.COM/path?q=1").unwrap(),
            "example.com"
        );
    }

    #[test]
    fn test_origin_of_rejects_bad_input() {
        assert!(matches!(
            origin_of("not a url"),
            Err(ParseError::InvalidUrl(_))
        ));
        assert!(matches!(
            origin_of("ftp://example.com/file"),
            Err(ParseError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_policy_tiers() {
        assert_eq!(policy_for("allrecipes.com"), OriginPolicy::HIGH_TRAFFIC);
        assert_eq!(policy_for("food.com"), OriginPolicy::MEDIUM_TRAFFIC);
        assert_eq!(policy_for("myfood.com"), OriginPolicy::SMALLER_SITES);
        assert_eq!(
            policy_for("sub.allrecipes.com"),
            OriginPolicy::HIGH_TRAFFIC
        );
        assert_eq!(policy_for("tinyblog.example"), OriginPolicy::SMALLER_SITES);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap_queues_excess_callers() {
        let limiter = Arc::new(OriginRateLimiter::with_policy(wide_open(2)));
        let admitted = Arc::new(AtomicU32::new(0));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            let admitted = Arc::clone(&admitted);
            let tx = tx.clone();
            tokio::spawn(async move {
                let admission = limiter.admit("example.com").await;
                admitted.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(admission);
            });
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            admitted.load(Ordering::SeqCst),
            2,
            "exactly two callers admitted immediately, three queued"
        );

        // Releasing one slot admits exactly one queued caller.
        let first = rx.recv().await.unwrap();
        drop(first);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_limit_delays_fourth_request() {
        let policy = OriginPolicy {
            min_delay: Duration::ZERO,
            max_concurrent: 10,
            burst_limit: 3,
            burst_window: Duration::from_secs(60),
        };
        let limiter = OriginRateLimiter::with_policy(policy);

        let start = Instant::now();
        for _ in 0..3 {
            drop(limiter.admit("example.com").await);
        }
        assert!(start.elapsed() < Duration::from_secs(1));

        // Fourth start must wait for the oldest window entry to age out.
        drop(limiter.admit("example.com").await);
        assert!(
            start.elapsed() >= Duration::from_secs(59),
            "fourth admission should wait out the burst window, waited {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_spaces_sequential_requests() {
        let policy = OriginPolicy {
            min_delay: Duration::from_millis(3000),
            max_concurrent: 1,
            burst_limit: 1000,
            burst_window: Duration::from_secs(60),
        };
        let limiter = OriginRateLimiter::with_policy(policy);

        let start = Instant::now();
        drop(limiter.admit("example.com").await);
        drop(limiter.admit("example.com").await);
        assert!(
            start.elapsed() >= Duration::from_millis(3000),
            "second admission should respect min delay"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_callers_served_fifo() {
        let limiter = Arc::new(OriginRateLimiter::with_policy(wide_open(1)));
        let holder = limiter.admit("example.com").await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for id in 0..3u32 {
            let limiter = Arc::clone(&limiter);
            let tx = tx.clone();
            tokio::spawn(async move {
                let admission = limiter.admit("example.com").await;
                let _ = tx.send((id, admission));
            });
            // Let the task reach the queue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        drop(holder);
        for expected in 0..3u32 {
            let (id, admission) = rx.recv().await.unwrap();
            assert_eq!(id, expected, "queued callers must be served in order");
            drop(admission);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_origins_are_independent() {
        let limiter = Arc::new(OriginRateLimiter::with_policy(wide_open(1)));
        let _held = limiter.admit("one.example").await;

        // A different origin is not affected by the held slot.
        let start = Instant::now();
        drop(limiter.admit("two.example").await);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_origins_are_evicted() {
        let limiter = OriginRateLimiter::with_policy(wide_open(2));
        drop(limiter.admit("stale.example").await);
        assert_eq!(limiter.tracked_origins().await, 1);

        tokio::time::sleep(Duration::from_secs(3601)).await;
        drop(limiter.admit("fresh.example").await);
        assert_eq!(
            limiter.tracked_origins().await,
            1,
            "stale origin state should have been evicted"
        );
    }
}
