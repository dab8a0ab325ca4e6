use rand::Rng;
use std::sync::Mutex;

/// One browser identity a fetch presents to the target site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserIdentity {
    pub user_agent: &'static str,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Realistic desktop identities. Versions should track current stable
/// Chrome/Firefox releases; stale pools get flagged by anti-bot vendors.
const IDENTITY_POOL: &[BrowserIdentity] = &[
    BrowserIdentity {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    BrowserIdentity {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        viewport_width: 1440,
        viewport_height: 900,
    },
    BrowserIdentity {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    BrowserIdentity {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        viewport_width: 1366,
        viewport_height: 768,
    },
    BrowserIdentity {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
        viewport_width: 1536,
        viewport_height: 864,
    },
    BrowserIdentity {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
        viewport_width: 1280,
        viewport_height: 720,
    },
];

/// Hands out a pseudo-random identity per rendering attempt, never the same
/// one twice in a row (given more than one pool entry).
pub struct IdentityRotator {
    pool: &'static [BrowserIdentity],
    last_issued: Mutex<Option<usize>>,
}

impl Default for IdentityRotator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRotator {
    pub fn new() -> Self {
        IdentityRotator {
            pool: IDENTITY_POOL,
            last_issued: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_pool(pool: &'static [BrowserIdentity]) -> Self {
        IdentityRotator {
            pool,
            last_issued: Mutex::new(None),
        }
    }

    pub fn next(&self) -> BrowserIdentity {
        let mut last = match self.last_issued.lock() {
            Ok(guard) => guard,
            // A poisoned lock only loses the no-repeat memory.
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut rng = rand::thread_rng();
        let index = match *last {
            // Sample from the pool minus the previous slot, then shift past
            // it, so an immediate repeat is impossible rather than unlikely.
            Some(prev) if self.pool.len() > 1 => {
                let mut i = rng.gen_range(0..self.pool.len() - 1);
                if i >= prev {
                    i += 1;
                }
                i
            }
            _ => rng.gen_range(0..self.pool.len()),
        };

        *last = Some(index);
        self.pool[index]
    }
}
