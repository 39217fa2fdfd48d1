use std::borrow::Cow;

use serde_json::json;
use tracing::debug;

use crate::error::MedlifeError;
use crate::sources::{Fetcher, Lookup, SourceConfig, Upstream, first_success};

pub(crate) const CHEMBL_API: &str = Upstream::Chembl.label();

/// Top-level keys that mark a usable ChEMBL listing.
const RECOGNIZED_KEYS: &[&str] = &["molecules", "mechanisms", "drug_mechanisms"];

/// One way of asking ChEMBL about a drug name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChemblStrategy {
    pub name: &'static str,
    pub path: &'static str,
    pub param: &'static str,
}

pub(crate) const STRATEGIES: &[ChemblStrategy] = &[
    ChemblStrategy {
        name: "structure flexmatch",
        path: "molecule.json",
        param: "molecule_structures__canonical_smiles__flexmatch",
    },
    ChemblStrategy {
        name: "free-text search",
        path: "molecule/search.json",
        param: "q",
    },
    ChemblStrategy {
        name: "mechanism by name",
        path: "mechanism.json",
        param: "mechanism_of_action__icontains",
    },
];

/// Issued once after every strategy misses; any JSON body is accepted.
pub(crate) const FALLBACK: ChemblStrategy = ChemblStrategy {
    name: "preferred-name fallback",
    path: "molecule.json",
    param: "pref_name__icontains",
};

pub struct ChemblClient {
    fetcher: Fetcher,
    base: Cow<'static, str>,
}

impl ChemblClient {
    pub(crate) fn new(fetcher: Fetcher, config: &SourceConfig) -> Self {
        Self {
            fetcher,
            base: config.chembl_base.clone(),
        }
    }

    async fn attempt(&self, strategy: &ChemblStrategy, term: &str) -> Option<serde_json::Value> {
        let url = crate::sources::endpoint(&self.base, strategy.path);
        self.fetcher
            .json(Upstream::Chembl, &url, &[(strategy.param, term)], Lookup::Primary)
            .await
    }

    /// Runs the strategies in order, then the fallback.
    ///
    /// When nothing answers, the result is a `{"error": ...}` diagnostic
    /// payload rather than `None`.
    pub(crate) async fn search(
        &self,
        drug_name: &str,
    ) -> Result<Option<serde_json::Value>, MedlifeError> {
        let term = drug_name.trim();

        let found = first_success(STRATEGIES, move |strategy| async move {
            let value = self.attempt(strategy, term).await?;
            if has_recognized_key(&value) {
                debug!(source = CHEMBL_API, strategy = strategy.name, "Strategy matched");
                Some(value)
            } else {
                debug!(source = CHEMBL_API, strategy = strategy.name, "No recognized listing");
                None
            }
        })
        .await;
        if found.is_some() {
            return Ok(found);
        }

        if let Some(value) = self.attempt(&FALLBACK, term).await {
            return Ok(Some(value));
        }

        Ok(Some(json!({
            "error": format!(
                "All {} ChEMBL query strategies and the fallback failed for {term}",
                STRATEGIES.len()
            )
        })))
    }
}

fn has_recognized_key(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| RECOGNIZED_KEYS.iter().any(|key| obj.contains_key(*key)))
}
