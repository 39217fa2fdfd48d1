//! Politeness spacing between requests to the same upstream.
//!
//! The fetch primitive tags every request with its [`Upstream`]; the
//! middleware reads that tag, so spacing follows the source a call belongs to
//! whatever base URL it was configured with. Untagged requests are spaced per
//! host. Requests are delayed, never repeated.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http::Extensions;
use reqwest::Url;
use reqwest_middleware::{Middleware, Next};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

const UNTAGGED_MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Upstream whose request budget a call counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Upstream {
    OpenFda,
    RxNav,
    PubChem,
    Chembl,
    Kegg,
}

impl Upstream {
    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::OpenFda => "OpenFDA",
            Self::RxNav => "RxNorm",
            Self::PubChem => "PubChem",
            Self::Chembl => "ChEMBL",
            Self::Kegg => "KEGG",
        }
    }

    pub(crate) const fn min_interval(self) -> Duration {
        match self {
            // 240 requests/minute without an API key.
            Self::OpenFda => Duration::from_millis(250),
            // 20 requests/second.
            Self::RxNav => Duration::from_millis(50),
            // PUG-REST: 5 requests/second.
            Self::PubChem => Duration::from_millis(200),
            Self::Chembl => Duration::from_millis(100),
            // 3 requests/second.
            Self::Kegg => Duration::from_millis(334),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Lane {
    Source(Upstream),
    Host(String),
}

impl Lane {
    fn for_request(upstream: Option<Upstream>, url: &Url) -> (Self, Duration) {
        match upstream {
            Some(upstream) => (Self::Source(upstream), upstream.min_interval()),
            None => (
                Self::Host(format!(
                    "{}://{}",
                    url.scheme(),
                    url.host_str().unwrap_or("unknown-host")
                )),
                UNTAGGED_MIN_INTERVAL,
            ),
        }
    }
}

/// Hands out send slots per lane. Each caller reserves the next free slot
/// under the lock and sleeps outside it, so concurrent callers queue in
/// arrival order.
#[derive(Debug, Default)]
pub(crate) struct RequestSpacer {
    next_free: Mutex<HashMap<Lane, Instant>>,
}

impl RequestSpacer {
    async fn reserve(&self, lane: Lane, interval: Duration) -> Instant {
        let mut next_free = self.next_free.lock().await;
        let now = Instant::now();
        let slot = next_free
            .get(&lane)
            .copied()
            .filter(|free| *free > now)
            .unwrap_or(now);
        next_free.insert(lane, slot + interval);
        slot
    }

    pub(crate) async fn pace(&self, upstream: Option<Upstream>, url: &Url) {
        let (lane, interval) = Lane::for_request(upstream, url);
        let slot = self.reserve(lane, interval).await;
        if slot > Instant::now() {
            debug!(
                source = upstream.map(Upstream::label),
                host = url.host_str(),
                "Spacing request"
            );
            sleep_until(slot).await;
        }
    }
}

fn shared_spacer() -> Arc<RequestSpacer> {
    static SPACER: OnceLock<Arc<RequestSpacer>> = OnceLock::new();
    SPACER.get_or_init(Arc::default).clone()
}

#[derive(Clone, Debug)]
pub(crate) struct RateLimitMiddleware {
    spacer: Arc<RequestSpacer>,
}

impl RateLimitMiddleware {
    pub(crate) fn new() -> Self {
        Self {
            spacer: shared_spacer(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let upstream = extensions.get::<Upstream>().copied();
        self.spacer.pace(upstream, req.url()).await;
        next.run(req, extensions).await
    }
}
