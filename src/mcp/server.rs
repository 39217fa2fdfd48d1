use rmcp::model::{Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, ServiceExt, tool};
use tokio_util::sync::CancellationToken;

use crate::entities::search::{self, Query, SearchMode};

#[derive(Debug, Clone)]
pub struct MedlifeServer;

const SEARCH_DESCRIPTION: &str = "Search OpenFDA, RxNorm, PubChem, ChEMBL and KEGG for one term. \
`mode` is `drug` (indications, alternatives, allergy summary and per-source records) or \
`disease` (recommended medications and label information). Returns the aggregate as JSON; \
sources with no data are omitted.";

/// Validates tool arguments, runs the search and renders JSON.
async fn search_json(query: &str, mode: &str) -> Result<String, String> {
    let mode: SearchMode = mode.parse().map_err(|e| format!("Error: {e}"))?;
    let query = Query::new(query, mode).map_err(|e| format!("Error: {e}"))?;
    let result = search::search(&query)
        .await
        .map_err(|e| format!("Error: {e}"))?;
    crate::render::json::to_pretty(&result).map_err(|e| format!("Error: {e}"))
}

#[tool(tool_box)]
impl MedlifeServer {
    #[tool(description = SEARCH_DESCRIPTION)]
    async fn search(
        &self,
        #[tool(param)] query: String,
        #[tool(param)] mode: String,
    ) -> Result<String, String> {
        search_json(&query, &mode).await
    }
}

#[tool(tool_box)]
impl ServerHandler for MedlifeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "medlife".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Medlife aggregates drug and disease information from OpenFDA, RxNorm, \
                 PubChem, ChEMBL and KEGG. Call the `search` tool with a drug name and \
                 mode `drug`, or a disease name and mode `disease`."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio() -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let cancel = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let running = MedlifeServer
        .serve_with_ct(rmcp::transport::stdio(), shutdown)
        .await?;
    let _reason = running.waiting().await?;
    Ok(())
}

pub async fn run_http(host: &str, port: u16) -> anyhow::Result<()> {
    use rmcp::transport::sse_server::SseServer;

    let ip: std::net::IpAddr = host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid host address: {e}"))?;
    let bind = std::net::SocketAddr::new(ip, port);

    tracing::info!("Medlife HTTP server listening on http://{bind}");
    tracing::info!("  SSE endpoint:  GET  http://{bind}/sse");
    tracing::info!("  Post endpoint: POST http://{bind}/message");

    let ct = SseServer::serve(bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP server: {e}"))?
        .with_service(|| MedlifeServer);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down…");
    ct.cancel();
    Ok(())
}
