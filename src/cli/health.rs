use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::error::MedlifeError;
use crate::sources::{SourceConfig, endpoint};

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRow {
    pub api: String,
    pub status: String,
    pub latency: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
    pub rows: Vec<HealthRow>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.healthy == self.total
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Medlife Health Check\n\n");
        out.push_str("| API | Status | Latency |\n");
        out.push_str("|-----|--------|---------|\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                row.api, row.status, row.latency
            ));
        }
        out.push_str(&format!(
            "\nStatus: {}/{} APIs healthy\n",
            self.healthy, self.total
        ));
        out
    }
}

async fn check_one(
    client: reqwest::Client,
    timeout: Duration,
    api: &str,
    url: String,
) -> HealthRow {
    let start = Instant::now();
    let resp = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(timeout)
        .send()
        .await;

    match resp {
        Ok(resp) => {
            let status = resp.status();
            let elapsed = start.elapsed().as_millis();
            if status.is_success() {
                HealthRow {
                    api: api.to_string(),
                    status: "ok".into(),
                    latency: format!("{elapsed}ms"),
                }
            } else {
                HealthRow {
                    api: api.to_string(),
                    status: "error".into(),
                    latency: format!("{elapsed}ms (HTTP {})", status.as_u16()),
                }
            }
        }
        Err(err) => {
            let reason = if err.is_timeout() {
                "timeout"
            } else if err.is_connect() {
                "connect"
            } else {
                "error"
            };
            HealthRow {
                api: api.to_string(),
                status: "error".into(),
                latency: reason.into(),
            }
        }
    }
}

fn health_http_client() -> Result<reqwest::Client, MedlifeError> {
    static HEALTH_HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    if let Some(client) = HEALTH_HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("medlife-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(MedlifeError::HttpClientInit)?;

    match HEALTH_HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HEALTH_HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| MedlifeError::api("health", "Health HTTP client initialization race")),
    }
}

/// Probes each upstream with a minimal request bounded by the auxiliary
/// timeout.
///
/// # Errors
///
/// Returns an error when the health HTTP client cannot be created.
pub async fn check(config: &SourceConfig) -> Result<HealthReport, MedlifeError> {
    let client = health_http_client()?;
    let timeout = config.auxiliary_timeout;

    let (openfda, rxnorm, pubchem, chembl, kegg) = tokio::join!(
        check_one(
            client.clone(),
            timeout,
            "OpenFDA",
            endpoint(&config.openfda_base, "drug/label.json?limit=1")
        ),
        check_one(
            client.clone(),
            timeout,
            "RxNorm",
            endpoint(&config.rxnav_base, "rxcui.json?name=aspirin")
        ),
        check_one(
            client.clone(),
            timeout,
            "PubChem",
            endpoint(&config.pubchem_base, "compound/name/aspirin/cids/JSON")
        ),
        check_one(
            client.clone(),
            timeout,
            "ChEMBL",
            endpoint(&config.chembl_base, "status.json")
        ),
        check_one(client, timeout, "KEGG", endpoint(&config.kegg_base, "info/drug")),
    );

    let rows = vec![openfda, rxnorm, pubchem, chembl, kegg];
    let healthy = rows.iter().filter(|r| r.status == "ok").count();
    Ok(HealthReport {
        healthy,
        total: rows.len(),
        rows,
    })
}
