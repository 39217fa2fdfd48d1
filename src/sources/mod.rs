//! Source clients and the shared fetch primitive for upstream drug and disease APIs.

use std::borrow::Cow;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::{debug, warn};

use crate::error::MedlifeError;

pub(crate) use rate_limit::Upstream;

pub(crate) mod chembl;
pub(crate) mod kegg;
pub(crate) mod openfda;
pub(crate) mod pubchem;
pub(crate) mod rate_limit;
pub(crate) mod rxnorm;

pub(crate) const OPENFDA_BASE: &str = "https://api.fda.gov";
pub(crate) const OPENFDA_BASE_ENV: &str = "MEDLIFE_OPENFDA_BASE";
pub(crate) const RXNAV_BASE: &str = "https://rxnav.nlm.nih.gov/REST";
pub(crate) const RXNAV_BASE_ENV: &str = "MEDLIFE_RXNAV_BASE";
pub(crate) const PUBCHEM_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";
pub(crate) const PUBCHEM_BASE_ENV: &str = "MEDLIFE_PUBCHEM_BASE";
pub(crate) const CHEMBL_BASE: &str = "https://www.ebi.ac.uk/chembl/api/data";
pub(crate) const CHEMBL_BASE_ENV: &str = "MEDLIFE_CHEMBL_BASE";
pub(crate) const KEGG_BASE: &str = "https://rest.kegg.jp";
pub(crate) const KEGG_BASE_ENV: &str = "MEDLIFE_KEGG_BASE";

const PRIMARY_TIMEOUT_ENV: &str = "MEDLIFE_PRIMARY_TIMEOUT_SECS";
const AUX_TIMEOUT_ENV: &str = "MEDLIFE_AUX_TIMEOUT_SECS";
const DEFAULT_PRIMARY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_AUX_TIMEOUT: Duration = Duration::from_secs(5);

const ERROR_BODY_MAX_BYTES: usize = 2048;
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

static HTTP_CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

pub(crate) fn env_base(default: &'static str, env_var: &str) -> Cow<'static, str> {
    std::env::var(env_var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(Cow::Owned)
        .unwrap_or_else(|| Cow::Borrowed(default))
}

fn env_timeout(env_var: &str, default: Duration) -> Duration {
    match std::env::var(env_var) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(
                    env_var,
                    value = raw.as_str(),
                    "Ignoring invalid timeout override"
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Base URLs and per-class timeouts for every upstream source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub openfda_base: Cow<'static, str>,
    pub rxnav_base: Cow<'static, str>,
    pub pubchem_base: Cow<'static, str>,
    pub chembl_base: Cow<'static, str>,
    pub kegg_base: Cow<'static, str>,
    /// Label, RxNorm, PubChem, ChEMBL and KEGG lookups.
    pub primary_timeout: Duration,
    /// Resolver steps, drugs-for-disease and other supporting lookups.
    pub auxiliary_timeout: Duration,
}

impl SourceConfig {
    pub fn from_env() -> Self {
        Self {
            openfda_base: env_base(OPENFDA_BASE, OPENFDA_BASE_ENV),
            rxnav_base: env_base(RXNAV_BASE, RXNAV_BASE_ENV),
            pubchem_base: env_base(PUBCHEM_BASE, PUBCHEM_BASE_ENV),
            chembl_base: env_base(CHEMBL_BASE, CHEMBL_BASE_ENV),
            kegg_base: env_base(KEGG_BASE, KEGG_BASE_ENV),
            primary_timeout: env_timeout(PRIMARY_TIMEOUT_ENV, DEFAULT_PRIMARY_TIMEOUT),
            auxiliary_timeout: env_timeout(AUX_TIMEOUT_ENV, DEFAULT_AUX_TIMEOUT),
        }
    }

    /// Points every source at the same base, e.g. a local mock server.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            openfda_base: Cow::Owned(base.clone()),
            rxnav_base: Cow::Owned(base.clone()),
            pubchem_base: Cow::Owned(base.clone()),
            chembl_base: Cow::Owned(base.clone()),
            kegg_base: Cow::Owned(base),
            primary_timeout: DEFAULT_PRIMARY_TIMEOUT,
            auxiliary_timeout: DEFAULT_AUX_TIMEOUT,
        }
    }
}

pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Appends percent-encoded path segments to `base`.
pub(crate) fn segment_endpoint(base: &str, segments: &[&str]) -> Result<String, MedlifeError> {
    let mut url = reqwest::Url::parse(base.trim_end_matches('/'))
        .map_err(|err| MedlifeError::InvalidArgument(format!("Invalid base URL {base}: {err}")))?;
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            MedlifeError::InvalidArgument(format!("Base URL cannot carry a path: {base}"))
        })?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url.to_string())
}

/// Returns the shared HTTP client with rate-limit middleware.
///
/// No retry or cache layer: each call is one round trip, and timeouts are
/// applied per request by [`Fetcher`].
pub(crate) fn shared_client() -> Result<ClientWithMiddleware, MedlifeError> {
    if let Some(client) = HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let base_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("medlife-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(MedlifeError::HttpClientInit)?;

    let client = ClientBuilder::new(base_client)
        .with(rate_limit::RateLimitMiddleware::new())
        .build();

    match HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| MedlifeError::api("http-client", "Shared HTTP client initialization race")),
    }
}

/// Timeout class of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    Primary,
    Auxiliary,
}

/// How the response body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    Json(serde_json::Value),
    Text(String),
}

impl Payload {
    pub(crate) fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub(crate) fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// Single chokepoint for outbound calls.
///
/// Every call is exactly one GET bounded by the lookup's timeout and tagged
/// with its [`Upstream`] for rate-limit spacing. Transport
/// errors, non-2xx statuses and malformed bodies are logged with the source
/// name and collapsed to `None`.
#[derive(Clone)]
pub(crate) struct Fetcher {
    client: ClientWithMiddleware,
    primary_timeout: Duration,
    auxiliary_timeout: Duration,
}

impl Fetcher {
    pub(crate) fn new(config: &SourceConfig) -> Result<Self, MedlifeError> {
        Ok(Self {
            client: shared_client()?,
            primary_timeout: config.primary_timeout,
            auxiliary_timeout: config.auxiliary_timeout,
        })
    }

    fn timeout_for(&self, lookup: Lookup) -> Duration {
        match lookup {
            Lookup::Primary => self.primary_timeout,
            Lookup::Auxiliary => self.auxiliary_timeout,
        }
    }

    pub(crate) async fn fetch(
        &self,
        source: Upstream,
        url: &str,
        query: &[(&str, &str)],
        expect: Expect,
        lookup: Lookup,
    ) -> Option<Payload> {
        match self.try_fetch(source, url, query, expect, lookup).await {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(source = source.label(), url, "Upstream lookup failed, treating as absent: {err}");
                None
            }
        }
    }

    pub(crate) async fn json(
        &self,
        source: Upstream,
        url: &str,
        query: &[(&str, &str)],
        lookup: Lookup,
    ) -> Option<serde_json::Value> {
        self.fetch(source, url, query, Expect::Json, lookup)
            .await
            .and_then(Payload::into_json)
    }

    pub(crate) async fn text(
        &self,
        source: Upstream,
        url: &str,
        query: &[(&str, &str)],
        lookup: Lookup,
    ) -> Option<String> {
        self.fetch(source, url, query, Expect::Text, lookup)
            .await
            .and_then(Payload::into_text)
    }

    async fn try_fetch(
        &self,
        source: Upstream,
        url: &str,
        query: &[(&str, &str)],
        expect: Expect,
        lookup: Lookup,
    ) -> Result<Payload, MedlifeError> {
        let api = source.label();
        let timeout = self.timeout_for(lookup);
        debug!(source = api, url, timeout_ms = timeout.as_millis() as u64, "GET");

        let resp = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .with_extension(source)
            .send()
            .await?;
        let status = resp.status();
        let content_type = resp.headers().get(CONTENT_TYPE).cloned();
        let bytes = read_limited_body(resp, api).await?;

        if !status.is_success() {
            let excerpt = body_excerpt(&bytes);
            return Err(MedlifeError::api(api, format!("HTTP {status}: {excerpt}")));
        }

        match expect {
            Expect::Text => Ok(Payload::Text(String::from_utf8_lossy(&bytes).into_owned())),
            Expect::Json => {
                ensure_json_content_type(api, content_type.as_ref(), &bytes)?;
                serde_json::from_slice(&bytes)
                    .map(Payload::Json)
                    .map_err(|source| MedlifeError::ApiJson {
                        api: api.to_string(),
                        source,
                    })
            }
        }
    }
}

/// Runs `attempt` over `strategies` in order and returns the first `Some`.
///
/// Strategies after the first success are never attempted.
pub(crate) async fn first_success<S, T, F, Fut>(
    strategies: impl IntoIterator<Item = S>,
    mut attempt: F,
) -> Option<T>
where
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for strategy in strategies {
        if let Some(found) = attempt(strategy).await {
            return Some(found);
        }
    }
    None
}

pub(crate) fn body_excerpt(bytes: &[u8]) -> String {
    let full = String::from_utf8_lossy(bytes);

    let truncated: &str = if full.len() > ERROR_BODY_MAX_BYTES {
        let mut end = ERROR_BODY_MAX_BYTES;
        while end > 0 && !full.is_char_boundary(end) {
            end -= 1;
        }
        &full[..end]
    } else {
        full.as_ref()
    };

    let mut s = truncated.trim().replace(['\n', '\r', '\t'], " ");
    if full.len() > ERROR_BODY_MAX_BYTES {
        s.push_str(" …");
    }
    s
}

pub(crate) fn ensure_json_content_type(
    api: &str,
    content_type: Option<&HeaderValue>,
    body: &[u8],
) -> Result<(), MedlifeError> {
    let Some(content_type) = content_type else {
        return Ok(());
    };

    let raw = match content_type.to_str() {
        Ok(v) => v.trim(),
        Err(_) => return Ok(()),
    };
    if raw.is_empty() {
        return Ok(());
    }

    let media_type = raw
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(media_type.as_str(), "text/html" | "application/xhtml+xml") {
        return Err(MedlifeError::api(
            api,
            format!(
                "Unexpected HTML response (content-type: {raw}): {}",
                body_excerpt(body)
            ),
        ));
    }

    Ok(())
}

pub(crate) async fn read_limited_body(
    mut resp: reqwest::Response,
    api: &str,
) -> Result<Vec<u8>, MedlifeError> {
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = resp.chunk().await? {
        let next_len = body.len().saturating_add(chunk.len());
        if next_len > DEFAULT_MAX_BODY_BYTES {
            return Err(MedlifeError::api(
                api,
                format!("Response body exceeded {DEFAULT_MAX_BODY_BYTES} bytes"),
            ));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
