use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MedlifeError;
use crate::sources::openfda::OpenFdaClient;
use crate::transform;

/// A labelled product whose indications mention the disease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseMedication {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generic_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<String>,
}

/// Products whose label indications mention `disease`, in label order.
///
/// Labels without a brand or generic name are dropped; an empty list is
/// reported as absent.
pub(crate) async fn drugs_for_disease(
    openfda: &OpenFdaClient,
    disease: &str,
) -> Result<Option<Vec<DiseaseMedication>>, MedlifeError> {
    let Some(resp) = openfda.indication_search(disease).await? else {
        return Ok(None);
    };

    let medications: Vec<DiseaseMedication> = resp
        .results
        .iter()
        .filter_map(|label| transform::label::disease_medication(label, disease))
        .collect();
    debug!(
        disease,
        labels = resp.results.len(),
        kept = medications.len(),
        "Drugs for disease"
    );

    Ok((!medications.is_empty()).then_some(medications))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{Fetcher, SourceConfig};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn keeps_named_labels_with_excerpt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .and(query_param("search", "indications_and_usage:\"asthma\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {
                        "indications_and_usage": ["Indicated for the prevention of bronchospasm in patients with Asthma."],
                        "openfda": {
                            "brand_name": ["PROAIR"],
                            "generic_name": ["ALBUTEROL SULFATE"],
                            "manufacturer_name": ["Teva"]
                        }
                    },
                    {
                        "indications_and_usage": ["asthma"],
                        "openfda": {"manufacturer_name": ["Nameless Co"]}
                    }
                ]
            })))
            .mount(&server)
            .await;

        let cfg = SourceConfig::with_base(&server.uri());
        let client = OpenFdaClient::new(Fetcher::new(&cfg).unwrap(), &cfg);
        let meds = drugs_for_disease(&client, "asthma")
            .await
            .unwrap()
            .expect("medications");

        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].brand_name.as_deref(), Some("PROAIR"));
        assert_eq!(meds[0].manufacturer.as_deref(), Some("Teva"));
        let relevance = meds[0].relevance.as_deref().unwrap();
        assert!(relevance.starts_with("..."));
        assert!(relevance.contains("Asthma"));
    }

    #[tokio::test]
    async fn no_named_labels_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"indications_and_usage": ["gout"]}]
            })))
            .mount(&server)
            .await;

        let cfg = SourceConfig::with_base(&server.uri());
        let client = OpenFdaClient::new(Fetcher::new(&cfg).unwrap(), &cfg);
        assert!(drugs_for_disease(&client, "gout").await.unwrap().is_none());
    }
}
