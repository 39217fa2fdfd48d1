//! Fan-out search across every source for one drug or disease term.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entities::alternatives::{AlternativeDrug, AlternativeResolver};
use crate::entities::disease::{self, DiseaseMedication};
use crate::entities::drug::{self, AllergySummary};
use crate::error::MedlifeError;
use crate::sources::chembl::{CHEMBL_API, ChemblClient};
use crate::sources::kegg::{KEGG_API, KeggClient};
use crate::sources::openfda::{OPENFDA_API, OpenFdaClient};
use crate::sources::pubchem::{PUBCHEM_API, PubChemClient};
use crate::sources::rxnorm::{RXNORM_API, RxNormClient};
use crate::sources::{Fetcher, SourceConfig};

pub(crate) const MAX_QUERY_CHARS: usize = 256;

const RECOMMENDED_MEDICATIONS: &str = "Recommended_Medications";
const DISEASE_INFORMATION: &str = "Disease_Information";
const ALTERNATIVES: &str = "Alternatives";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Drug,
    Disease,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drug => "drug",
            Self::Disease => "disease",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = MedlifeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drug" => Ok(Self::Drug),
            "disease" => Ok(Self::Disease),
            other => Err(MedlifeError::InvalidArgument(format!(
                "Unknown search mode '{other}'. Expected 'drug' or 'disease'."
            ))),
        }
    }
}

/// A validated search term and the mode to search it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    term: String,
    mode: SearchMode,
}

impl Query {
    pub fn new(term: &str, mode: SearchMode) -> Result<Self, MedlifeError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(MedlifeError::InvalidArgument(
                "Search term is required. Example: medlife search drug ibuprofen".into(),
            ));
        }
        if term.chars().count() > MAX_QUERY_CHARS {
            return Err(MedlifeError::InvalidArgument(format!(
                "Search term is too long (max {MAX_QUERY_CHARS} characters)"
            )));
        }
        Ok(Self {
            term: term.to_string(),
            mode,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }
}

/// One client per upstream, sharing the process-wide HTTP client.
pub struct Sources {
    pub(crate) openfda: OpenFdaClient,
    pub(crate) rxnorm: RxNormClient,
    pub(crate) pubchem: PubChemClient,
    pub(crate) chembl: ChemblClient,
    pub(crate) kegg: KeggClient,
}

impl Sources {
    pub fn new(config: &SourceConfig) -> Result<Self, MedlifeError> {
        let fetcher = Fetcher::new(config)?;
        Ok(Self {
            openfda: OpenFdaClient::new(fetcher.clone(), config),
            rxnorm: RxNormClient::new(fetcher.clone(), config),
            pubchem: PubChemClient::new(fetcher.clone(), config),
            chembl: ChemblClient::new(fetcher.clone(), config),
            kegg: KeggClient::new(fetcher, config),
        })
    }
}

/// The merged search result. Field order is presentation order; absent
/// entries are omitted when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    #[serde(
        rename = "Recommended_Medications",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recommended_medications: Option<Vec<DiseaseMedication>>,
    #[serde(
        rename = "Disease_Information",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub disease_information: Option<serde_json::Value>,
    #[serde(rename = "Indications", default, skip_serializing_if = "Option::is_none")]
    pub indications: Option<Vec<String>>,
    #[serde(rename = "Alternatives", default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<AlternativeDrug>>,
    #[serde(rename = "Allergies", default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<AllergySummary>,
    #[serde(rename = "OpenFDA", default, skip_serializing_if = "Option::is_none")]
    pub openfda: Option<serde_json::Value>,
    #[serde(rename = "RxNorm", default, skip_serializing_if = "Option::is_none")]
    pub rxnorm: Option<serde_json::Value>,
    #[serde(rename = "PubChem", default, skip_serializing_if = "Option::is_none")]
    pub pubchem: Option<serde_json::Value>,
    #[serde(rename = "ChEMBL", default, skip_serializing_if = "Option::is_none")]
    pub chembl: Option<serde_json::Value>,
    #[serde(rename = "KEGG", default, skip_serializing_if = "Option::is_none")]
    pub kegg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AggregateResult {
    pub(crate) fn no_data(term: &str) -> Self {
        Self {
            message: Some(format!("No data found for {term}.")),
            ..Self::default()
        }
    }

    /// Labels of the present source entries, in presentation order.
    pub fn labels(&self) -> Vec<&'static str> {
        [
            (RECOMMENDED_MEDICATIONS, self.recommended_medications.is_some()),
            (DISEASE_INFORMATION, self.disease_information.is_some()),
            ("Indications", self.indications.is_some()),
            (ALTERNATIVES, self.alternatives.is_some()),
            ("Allergies", self.allergies.is_some()),
            (OPENFDA_API, self.openfda.is_some()),
            (RXNORM_API, self.rxnorm.is_some()),
            (PUBCHEM_API, self.pubchem.is_some()),
            (CHEMBL_API, self.chembl.is_some()),
            (KEGG_API, self.kegg.is_some()),
        ]
        .into_iter()
        .filter_map(|(label, present)| present.then_some(label))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.labels().is_empty()
    }
}

/// Payloads that may carry an upstream-reported error instead of data.
trait SourcePayload {
    fn diagnostic(&self) -> Option<String> {
        None
    }
}

impl SourcePayload for serde_json::Value {
    fn diagnostic(&self) -> Option<String> {
        let err = self.as_object()?.get("error")?;
        Some(
            err.as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
        )
    }
}

impl SourcePayload for String {}
impl<T> SourcePayload for Vec<T> {}

/// Runs one source call; errors and diagnostic payloads are logged and
/// become absence.
async fn guarded<T, Fut>(source: &'static str, call: Fut) -> Option<T>
where
    T: SourcePayload,
    Fut: Future<Output = Result<Option<T>, MedlifeError>>,
{
    match call.await {
        Ok(Some(payload)) => match payload.diagnostic() {
            Some(message) => {
                warn!(source, message = message.as_str(), "Source reported an error; omitting");
                None
            }
            None => Some(payload),
        },
        Ok(None) => {
            debug!(source, "No data");
            None
        }
        Err(err) => {
            warn!(source, message = %err, "Source failed; omitting");
            None
        }
    }
}

/// Searches every relevant source for `query` using environment configuration.
pub async fn search(query: &Query) -> Result<AggregateResult, MedlifeError> {
    let sources = Sources::new(&SourceConfig::from_env())?;
    Ok(search_with(&sources, query).await)
}

/// Searches with caller-supplied clients. Upstream failures never surface
/// here; the worst outcome is the single `message` entry.
pub async fn search_with(sources: &Sources, query: &Query) -> AggregateResult {
    debug!(term = query.term(), mode = %query.mode(), "Search");
    let result = match query.mode() {
        SearchMode::Drug => search_drug(sources, query.term()).await,
        SearchMode::Disease => search_disease(sources, query.term()).await,
    };

    if result.is_empty() {
        return AggregateResult::no_data(query.term());
    }
    debug!(term = query.term(), labels = ?result.labels(), "Search complete");
    result
}

async fn search_disease(sources: &Sources, term: &str) -> AggregateResult {
    let (recommended_medications, disease_information) = tokio::join!(
        guarded(
            RECOMMENDED_MEDICATIONS,
            disease::drugs_for_disease(&sources.openfda, term)
        ),
        guarded(DISEASE_INFORMATION, sources.openfda.label(term)),
    );

    AggregateResult {
        recommended_medications,
        disease_information,
        ..AggregateResult::default()
    }
}

async fn search_drug(sources: &Sources, term: &str) -> AggregateResult {
    // The label feeds the OpenFDA entry, indications and allergies.
    let label = guarded(OPENFDA_API, sources.openfda.label(term)).await;

    let resolver = AlternativeResolver::new(&sources.rxnorm, &sources.openfda);
    let (alternatives, rxnorm, pubchem, chembl, kegg) = tokio::join!(
        guarded(ALTERNATIVES, async {
            let alternatives = resolver.resolve(term).await;
            Ok::<_, MedlifeError>((!alternatives.is_empty()).then_some(alternatives))
        }),
        guarded(RXNORM_API, sources.rxnorm.search(term)),
        guarded(PUBCHEM_API, sources.pubchem.compound_by_name(term)),
        guarded(CHEMBL_API, sources.chembl.search(term)),
        guarded(KEGG_API, sources.kegg.find_drug(term)),
    );

    AggregateResult {
        indications: Some(drug::indications(label.as_ref())),
        alternatives,
        allergies: Some(drug::allergies(label.as_ref())),
        openfda: label,
        rxnorm,
        pubchem,
        chembl,
        kegg,
        ..AggregateResult::default()
    }
}
