//! Command-line interface: argument parsing and command dispatch.

use clap::{Parser, Subcommand};

use crate::entities::search::{self, Query, SearchMode};
use crate::render;
use crate::sources::SourceConfig;

pub mod health;

#[derive(Debug, Parser)]
#[command(
    name = "medlife",
    version,
    about = "Search OpenFDA, RxNorm, PubChem, ChEMBL and KEGG for a drug or disease"
)]
pub struct Cli {
    /// Print JSON instead of Markdown.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Search every source for a drug or disease.
    Search {
        #[arg(value_enum)]
        mode: SearchMode,
        /// Drug or disease name; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Check connectivity to each upstream API.
    Health,
    /// Run the MCP server over stdio.
    Mcp,
    /// Run the MCP server over HTTP (SSE transport).
    ServeHttp {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

/// Runs a one-shot command and returns its rendered output.
///
/// # Errors
///
/// Returns an error for invalid input, HTTP client setup failure or
/// rendering failure. Upstream source failures are not errors.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    match cli.command {
        Commands::Search { mode, query } => {
            let query = Query::new(&query.join(" "), mode)?;
            let result = search::search(&query).await?;
            if cli.json {
                Ok(render::json::to_pretty(&result)?)
            } else {
                Ok(render::markdown::search_markdown(&query, &result)?)
            }
        }
        Commands::Health => {
            let report = health::check(&SourceConfig::from_env()).await?;
            if cli.json {
                Ok(render::json::to_pretty(&report)?)
            } else {
                Ok(report.to_markdown())
            }
        }
        Commands::Mcp | Commands::ServeHttp { .. } => {
            anyhow::bail!("MCP servers are long-running; start them from the binary entry point")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_with_multi_word_query() {
        let cli = Cli::try_parse_from(["medlife", "search", "disease", "type", "2", "diabetes"])
            .expect("parse");
        match cli.command {
            Commands::Search { mode, query } => {
                assert_eq!(mode, SearchMode::Disease);
                assert_eq!(query.join(" "), "type 2 diabetes");
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(!cli.json);
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["medlife", "search", "drug", "ibuprofen", "--json"])
            .expect("parse");
        assert!(cli.json);
    }

    #[test]
    fn rejects_unknown_mode_and_missing_query() {
        assert!(Cli::try_parse_from(["medlife", "search", "gene", "BRAF"]).is_err());
        assert!(Cli::try_parse_from(["medlife", "search", "drug"]).is_err());
    }

    #[test]
    fn serve_http_defaults() {
        let cli = Cli::try_parse_from(["medlife", "serve-http"]).expect("parse");
        match cli.command {
            Commands::ServeHttp { host, port } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 8080);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_any_request() {
        let cli = Cli::try_parse_from(["medlife", "search", "drug", "  "]).expect("parse");
        let err = run(cli).await.expect_err("blank query");
        assert!(err.to_string().contains("Search term is required"));
    }
}
