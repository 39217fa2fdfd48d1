//! Alternative-drug resolution: same-class siblings via RxClass, direct
//! brand/ingredient links via RxNorm, and an OpenFDA pharmacological-class
//! fallback when RxNav has nothing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MedlifeError;
use crate::sources::openfda::{self, OpenFdaClient};
use crate::sources::rxnorm::{CLASS_RELATIONS, ClassRelation, RxClass, RxNormClient};
use crate::sources::{Lookup, first_success};
use crate::transform;

pub(crate) const MAX_ALTERNATIVES: usize = 15;

const BRAND_RELATION: &str = "Brand name";
const INGREDIENT_RELATION: &str = "Ingredient";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeDrug {
    pub name: String,
    pub class: String,
}

impl AlternativeDrug {
    fn new(name: &str, class: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            class: class.trim().to_string(),
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// First occurrence wins, compared case-insensitively; then capped.
pub(crate) fn dedupe_and_cap(candidates: Vec<AlternativeDrug>) -> Vec<AlternativeDrug> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for candidate in candidates {
        if candidate.name.is_empty() {
            continue;
        }
        if !seen.insert(candidate.name.to_lowercase()) {
            continue;
        }
        out.push(candidate);
        if out.len() >= MAX_ALTERNATIVES {
            break;
        }
    }
    out
}

pub(crate) struct AlternativeResolver<'a> {
    rxnorm: &'a RxNormClient,
    openfda: &'a OpenFdaClient,
}

impl<'a> AlternativeResolver<'a> {
    pub(crate) fn new(rxnorm: &'a RxNormClient, openfda: &'a OpenFdaClient) -> Self {
        Self { rxnorm, openfda }
    }

    pub(crate) async fn resolve(&self, drug_name: &str) -> Vec<AlternativeDrug> {
        let drug_name = drug_name.trim();
        let mut found: Vec<AlternativeDrug> = Vec::new();

        match self.rxnorm.rxcui(drug_name).await {
            Some(rxcui) => {
                found.extend(self.class_siblings(&rxcui, drug_name).await);
                found.extend(self.direct_relations(&rxcui, drug_name).await);
            }
            None => debug!(drug = drug_name, "No RxCUI; skipping RxClass lookups"),
        }

        if found.is_empty() {
            match self.label_class_siblings(drug_name).await {
                Ok(siblings) => found.extend(siblings),
                Err(err) => warn!(drug = drug_name, "Label class fallback unavailable: {err}"),
            }
        }

        dedupe_and_cap(found)
    }

    /// Members of the classes found under the first relation that yields any class.
    async fn class_siblings(&self, rxcui: &str, drug_name: &str) -> Vec<AlternativeDrug> {
        let rxnorm = self.rxnorm;
        let hit: Option<(&ClassRelation, Vec<RxClass>)> =
            first_success(CLASS_RELATIONS, move |relation| async move {
                let classes = rxnorm.classes_by_rxcui(rxcui, relation).await;
                (!classes.is_empty()).then_some((relation, classes))
            })
            .await;
        let Some((relation, classes)) = hit else {
            debug!(rxcui, "No class membership under any relation");
            return Vec::new();
        };

        let mut out = Vec::new();
        for class in &classes {
            for member in rxnorm.class_members(class, relation).await {
                if same_name(&member.name, drug_name) {
                    continue;
                }
                out.push(AlternativeDrug::new(&member.name, &class.class_name));
            }
        }
        debug!(
            rxcui,
            rela_source = relation.rela_source,
            classes = classes.len(),
            siblings = out.len(),
            "Class siblings"
        );
        out
    }

    async fn direct_relations(&self, rxcui: &str, drug_name: &str) -> Vec<AlternativeDrug> {
        self.rxnorm
            .related_by_tty(rxcui)
            .await
            .into_iter()
            .filter(|concept| !same_name(&concept.name, drug_name))
            .map(|concept| {
                let relation = match concept.tty.as_deref() {
                    Some(tty) if tty.eq_ignore_ascii_case("BN") => BRAND_RELATION,
                    _ => INGREDIENT_RELATION,
                };
                AlternativeDrug::new(&concept.name, relation)
            })
            .collect()
    }

    /// Other labelled products sharing the drug's first pharmacological-class tag.
    async fn label_class_siblings(
        &self,
        drug_name: &str,
    ) -> Result<Vec<AlternativeDrug>, MedlifeError> {
        let Some(response) = self
            .openfda
            .label_search(drug_name, 1, Lookup::Auxiliary)
            .await
        else {
            return Ok(Vec::new());
        };
        let Some(label) = openfda::first_label(&response) else {
            return Ok(Vec::new());
        };
        let Some(tag) = label.openfda.pharm_class_tags().into_iter().next() else {
            debug!(drug = drug_name, "Label carries no pharmacological class");
            return Ok(Vec::new());
        };

        let class = transform::label::clean_class_tag(&tag.value);
        let Some(resp) = self.openfda.pharm_class_search(&tag).await? else {
            return Ok(Vec::new());
        };

        let out: Vec<AlternativeDrug> = resp
            .results
            .iter()
            .filter_map(|label| {
                label
                    .openfda
                    .generic_name
                    .first()
                    .or_else(|| label.openfda.brand_name.first())
            })
            .filter(|name| !name.trim().is_empty() && !same_name(name, drug_name))
            .map(|name| AlternativeDrug::new(name, &class))
            .collect();
        debug!(
            drug = drug_name,
            class = class.as_str(),
            siblings = out.len(),
            "Label class fallback"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{Fetcher, SourceConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Clients {
        rxnorm: RxNormClient,
        openfda: OpenFdaClient,
    }

    fn clients_for(server: &MockServer) -> Clients {
        let cfg = SourceConfig::with_base(&server.uri());
        let fetcher = Fetcher::new(&cfg).unwrap();
        Clients {
            rxnorm: RxNormClient::new(fetcher.clone(), &cfg),
            openfda: OpenFdaClient::new(fetcher, &cfg),
        }
    }

    async fn mount_rxcui(server: &MockServer, name: &str, rxcui: &str) {
        Mock::given(method("GET"))
            .and(path("/rxcui.json"))
            .and(query_param("name", name))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"idGroup": {"rxnormId": [rxcui]}})),
            )
            .mount(server)
            .await;
    }

    fn alt(name: &str, class: &str) -> AlternativeDrug {
        AlternativeDrug::new(name, class)
    }

    #[test]
    fn dedupe_is_case_insensitive_first_wins_and_capped() {
        let mut candidates = vec![alt("Naproxen", "NSAID"), alt("NAPROXEN", "Other")];
        candidates.extend((0..30).map(|i| alt(&format!("drug{i}"), "NSAID")));
        let out = dedupe_and_cap(candidates);

        assert_eq!(out.len(), MAX_ALTERNATIVES);
        assert_eq!(out[0], alt("Naproxen", "NSAID"));
        assert_eq!(out[1].name, "drug0");
    }

    #[tokio::test]
    async fn stops_at_first_relation_with_classes() {
        let server = MockServer::start().await;
        mount_rxcui(&server, "ibuprofen", "5640").await;
        Mock::given(method("GET"))
            .and(path("/rxclass/class/byRxcui.json"))
            .and(query_param("relaSource", "ATC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rxclassDrugInfoList": {"rxclassDrugInfo": [
                    {"rxclassMinConceptItem": {"classId": "M01AE", "className": "Propionic acid derivatives", "classType": "ATC1-4"}}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rxclass/class/byRxcui.json"))
            .and(query_param("relaSource", "DAILYMED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rxclass/classMembers.json"))
            .and(query_param("classId", "M01AE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "drugMemberGroup": {"drugMember": [
                    {"minConcept": {"rxcui": "5640", "name": "Ibuprofen", "tty": "IN"}},
                    {"minConcept": {"rxcui": "7258", "name": "naproxen", "tty": "IN"}},
                    {"minConcept": {"rxcui": "4331", "name": "fenoprofen", "tty": "IN"}}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rxcui/5640/related.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "relatedGroup": {"conceptGroup": [
                    {"tty": "BN", "conceptProperties": [{"rxcui": "153008", "name": "Advil", "tty": "BN"}]},
                    {"tty": "IN", "conceptProperties": [{"rxcui": "5640", "name": "ibuprofen", "tty": "IN"}]}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(0)
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let out = AlternativeResolver::new(&clients.rxnorm, &clients.openfda)
            .resolve("ibuprofen")
            .await;

        assert_eq!(
            out,
            vec![
                alt("naproxen", "Propionic acid derivatives"),
                alt("fenoprofen", "Propionic acid derivatives"),
                alt("Advil", BRAND_RELATION),
            ]
        );
    }

    #[tokio::test]
    async fn falls_through_relations_in_order() {
        let server = MockServer::start().await;
        mount_rxcui(&server, "lisinopril", "29046").await;
        for source in ["ATC", "DAILYMED"] {
            Mock::given(method("GET"))
                .and(path("/rxclass/class/byRxcui.json"))
                .and(query_param("relaSource", source))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({"rxclassDrugInfoList": {}})),
                )
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/rxclass/class/byRxcui.json"))
            .and(query_param("relaSource", "MEDRT"))
            .and(query_param("relas", "has_moa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rxclassDrugInfoList": {"rxclassDrugInfo":
                    {"rxclassMinConceptItem": {"classId": "N0000000181", "className": "Angiotensin-converting Enzyme Inhibitors", "classType": "MOA"}}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rxclass/class/byRxcui.json"))
            .and(query_param("relaSource", "VA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rxclass/classMembers.json"))
            .and(query_param("classId", "N0000000181"))
            .and(query_param("rela", "has_moa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "drugMemberGroup": {"drugMember": {"minConcept": {"rxcui": "3827", "name": "enalapril", "tty": "IN"}}}
            })))
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let out = AlternativeResolver::new(&clients.rxnorm, &clients.openfda)
            .resolve("lisinopril")
            .await;

        assert_eq!(
            out,
            vec![alt("enalapril", "Angiotensin-converting Enzyme Inhibitors")]
        );
    }

    #[tokio::test]
    async fn label_class_fallback_runs_when_rxnav_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rxcui.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .and(query_param(
                "search",
                "openfda.generic_name:\"celecoxib\" OR openfda.brand_name:\"celecoxib\"",
            ))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"openfda": {
                    "generic_name": ["CELECOXIB"],
                    "pharm_class_epc": ["Nonsteroidal Anti-inflammatory Drug [EPC]"]
                }}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .and(query_param(
                "search",
                r#"openfda.pharm_class_epc:"Nonsteroidal Anti\-inflammatory Drug \[EPC\]""#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"openfda": {"generic_name": ["CELECOXIB"]}},
                    {"openfda": {"generic_name": ["MELOXICAM"]}},
                    {"openfda": {"brand_name": ["Mobic"]}},
                    {"openfda": {"generic_name": ["meloxicam"]}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let out = AlternativeResolver::new(&clients.rxnorm, &clients.openfda)
            .resolve("celecoxib")
            .await;

        let class = "Nonsteroidal Anti-inflammatory Drug";
        assert_eq!(out, vec![alt("MELOXICAM", class), alt("Mobic", class)]);
    }
}
