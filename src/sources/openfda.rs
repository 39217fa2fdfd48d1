use std::borrow::Cow;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::MedlifeError;
use crate::sources::{Fetcher, Lookup, SourceConfig, Upstream};
use crate::utils::serde::OneOrMany;

pub(crate) const OPENFDA_API: &str = Upstream::OpenFda.label();
const LABEL_PATH: &str = "drug/label.json";

/// Labels fetched for a drug name (`OpenFDA` entry, indications, allergies).
pub(crate) const LABEL_LIMIT: usize = 5;
/// Labels scanned for a disease mention.
pub(crate) const DISEASE_LABEL_LIMIT: usize = 20;
/// Labels scanned for drugs sharing a pharmacological class.
pub(crate) const CLASS_LABEL_LIMIT: usize = 20;

pub struct OpenFdaClient {
    fetcher: Fetcher,
    base: Cow<'static, str>,
}

impl OpenFdaClient {
    pub(crate) fn new(fetcher: Fetcher, config: &SourceConfig) -> Self {
        Self {
            fetcher,
            base: config.openfda_base.clone(),
        }
    }

    fn label_endpoint(&self) -> String {
        crate::sources::endpoint(&self.base, LABEL_PATH)
    }

    pub(crate) fn escape_query_value(value: &str) -> String {
        crate::utils::query::escape_lucene_value(value)
    }

    pub(crate) fn name_query(drug_name: &str) -> String {
        let escaped = Self::escape_query_value(drug_name.trim());
        format!("openfda.generic_name:\"{escaped}\" OR openfda.brand_name:\"{escaped}\"")
    }

    async fn label_query(
        &self,
        search: &str,
        limit: usize,
        lookup: Lookup,
    ) -> Option<serde_json::Value> {
        let limit = limit.to_string();
        self.fetcher
            .json(
                Upstream::OpenFda,
                &self.label_endpoint(),
                &[("search", search), ("limit", limit.as_str())],
                lookup,
            )
            .await
    }

    /// Raw label search matching generic or brand name.
    pub(crate) async fn label_search(
        &self,
        drug_name: &str,
        limit: usize,
        lookup: Lookup,
    ) -> Option<serde_json::Value> {
        self.label_query(&Self::name_query(drug_name), limit, lookup)
            .await
    }

    /// Adapter used for the `OpenFDA` and `Disease_Information` entries.
    pub(crate) async fn label(
        &self,
        term: &str,
    ) -> Result<Option<serde_json::Value>, MedlifeError> {
        Ok(self.label_search(term, LABEL_LIMIT, Lookup::Primary).await)
    }

    /// Labels whose `indications_and_usage` mention `disease`.
    pub(crate) async fn indication_search(
        &self,
        disease: &str,
    ) -> Result<Option<OpenFdaResponse<LabelResult>>, MedlifeError> {
        let escaped = Self::escape_query_value(disease.trim());
        let search = format!("indications_and_usage:\"{escaped}\"");
        let value = self
            .label_query(&search, DISEASE_LABEL_LIMIT, Lookup::Auxiliary)
            .await;
        decode_optional(value)
    }

    /// Labels tagged with the same pharmacological class.
    pub(crate) async fn pharm_class_search(
        &self,
        tag: &PharmClassTag,
    ) -> Result<Option<OpenFdaResponse<LabelResult>>, MedlifeError> {
        let escaped = Self::escape_query_value(&tag.value);
        let search = format!("{}:\"{escaped}\"", tag.field);
        let value = self
            .label_query(&search, CLASS_LABEL_LIMIT, Lookup::Auxiliary)
            .await;
        decode_optional(value)
    }
}

fn decode_optional<T: DeserializeOwned>(
    value: Option<serde_json::Value>,
) -> Result<Option<T>, MedlifeError> {
    let Some(value) = value else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| MedlifeError::ApiJson {
            api: OPENFDA_API.to_string(),
            source,
        })
}

/// First label result of a raw label response, if any parses.
pub(crate) fn first_label(label_response: &serde_json::Value) -> Option<LabelResult> {
    let first = label_response
        .get("results")
        .and_then(serde_json::Value::as_array)
        .and_then(|results| results.first())?;
    match serde_json::from_value(first.clone()) {
        Ok(label) => Some(label),
        Err(err) => {
            tracing::warn!(source = OPENFDA_API, "Unreadable label result: {err}");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenFdaResponse<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelResult {
    #[serde(default)]
    pub indications_and_usage: OneOrMany<String>,
    #[serde(default)]
    pub purpose: OneOrMany<String>,
    #[serde(default)]
    pub adverse_reactions: OneOrMany<String>,
    #[serde(default)]
    pub warnings: OneOrMany<String>,
    #[serde(default)]
    pub contraindications: OneOrMany<String>,
    #[serde(default)]
    pub boxed_warning: OneOrMany<String>,
    #[serde(default)]
    pub openfda: LabelOpenFda,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelOpenFda {
    #[serde(default)]
    pub brand_name: OneOrMany<String>,
    #[serde(default)]
    pub generic_name: OneOrMany<String>,
    #[serde(default)]
    pub manufacturer_name: OneOrMany<String>,
    #[serde(default)]
    pub pharm_class_epc: OneOrMany<String>,
    #[serde(default)]
    pub pharm_class_moa: OneOrMany<String>,
    #[serde(default)]
    pub pharm_class_cs: OneOrMany<String>,
    #[serde(default)]
    pub pharm_class_pe: OneOrMany<String>,
}

/// A pharmacological class tag and the label field it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PharmClassTag {
    pub field: &'static str,
    pub value: String,
}

impl LabelOpenFda {
    /// Class tags in preference order: established class, mechanism,
    /// chemical structure, physiologic effect.
    pub(crate) fn pharm_class_tags(&self) -> Vec<PharmClassTag> {
        [
            ("openfda.pharm_class_epc", &self.pharm_class_epc),
            ("openfda.pharm_class_moa", &self.pharm_class_moa),
            ("openfda.pharm_class_cs", &self.pharm_class_cs),
            ("openfda.pharm_class_pe", &self.pharm_class_pe),
        ]
        .into_iter()
        .flat_map(|(field, values)| {
            values
                .as_slice()
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(move |v| PharmClassTag {
                    field,
                    value: v.to_string(),
                })
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenFdaClient {
        let cfg = SourceConfig::with_base(&server.uri());
        OpenFdaClient::new(Fetcher::new(&cfg).unwrap(), &cfg)
    }

    #[test]
    fn name_query_matches_generic_or_brand() {
        assert_eq!(
            OpenFdaClient::name_query(" ibuprofen "),
            "openfda.generic_name:\"ibuprofen\" OR openfda.brand_name:\"ibuprofen\""
        );
    }

    #[tokio::test]
    async fn label_requests_name_search_with_limit_five() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .and(query_param(
                "search",
                "openfda.generic_name:\"aspirin\" OR openfda.brand_name:\"aspirin\"",
            ))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "meta": {"results": {"skip": 0, "limit": 5, "total": 1}},
                "results": [{"id": "x"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let label = client_for(&server).label("aspirin").await.unwrap();
        assert!(label.is_some());
    }

    #[tokio::test]
    async fn label_not_found_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": "NOT_FOUND", "message": "No matches found!"}
            })))
            .mount(&server)
            .await;

        assert!(client_for(&server).label("notadrug").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn indication_search_decodes_label_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .and(query_param("search", "indications_and_usage:\"asthma\""))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "indications_and_usage": ["For the treatment of asthma."],
                    "openfda": {"generic_name": ["ALBUTEROL"]}
                }]
            })))
            .mount(&server)
            .await;

        let resp = client_for(&server)
            .indication_search("asthma")
            .await
            .unwrap()
            .expect("labels");
        assert_eq!(resp.results.len(), 1);
        assert_eq!(
            resp.results[0].openfda.generic_name.first().map(String::as_str),
            Some("ALBUTEROL")
        );
    }

    #[test]
    fn first_label_reads_first_result_only() {
        let resp = serde_json::json!({
            "results": [
                {"purpose": "Pain reliever"},
                {"purpose": "Something else"}
            ]
        });
        let label = first_label(&resp).expect("label");
        assert_eq!(label.purpose.into_vec(), vec!["Pain reliever"]);
        assert!(first_label(&serde_json::json!({"results": []})).is_none());
    }

    #[test]
    fn pharm_class_tags_prefer_established_class() {
        let openfda: LabelOpenFda = serde_json::from_value(serde_json::json!({
            "pharm_class_moa": ["Cyclooxygenase Inhibitors [MoA]"],
            "pharm_class_epc": ["Nonsteroidal Anti-inflammatory Drug [EPC]"]
        }))
        .unwrap();
        let tags = openfda.pharm_class_tags();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].field, "openfda.pharm_class_epc");
        assert_eq!(tags[0].value, "Nonsteroidal Anti-inflammatory Drug [EPC]");
    }
}
