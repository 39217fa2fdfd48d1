#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod cli;
pub mod error;
pub mod mcp;

mod entities;
mod render;
mod sources;
mod transform;
mod utils;

pub use entities::alternatives::AlternativeDrug;
pub use entities::disease::DiseaseMedication;
pub use entities::drug::AllergySummary;
pub use entities::search::{AggregateResult, Query, SearchMode, Sources, search, search_with};
pub use sources::SourceConfig;
