use std::borrow::Cow;

use serde::Deserialize;
use tracing::debug;

use crate::error::MedlifeError;
use crate::sources::{Fetcher, Lookup, SourceConfig, Upstream};
use crate::utils::serde::OneOrMany;

pub(crate) const RXNORM_API: &str = Upstream::RxNav.label();

/// A classification relation in RxClass: the relation source plus an optional
/// relationship filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClassRelation {
    pub rela_source: &'static str,
    pub rela: Option<&'static str>,
}

/// Tried in order; the first relation that yields a class wins.
pub(crate) const CLASS_RELATIONS: &[ClassRelation] = &[
    ClassRelation {
        rela_source: "ATC",
        rela: None,
    },
    ClassRelation {
        rela_source: "DAILYMED",
        rela: Some("has_epc"),
    },
    ClassRelation {
        rela_source: "MEDRT",
        rela: Some("has_moa"),
    },
    ClassRelation {
        rela_source: "VA",
        rela: None,
    },
];

/// Term types followed by the brand/generic linkage lookup.
pub(crate) const DIRECT_RELATION_TTYS: &str = "BN IN";

pub struct RxNormClient {
    fetcher: Fetcher,
    base: Cow<'static, str>,
}

impl RxNormClient {
    pub(crate) fn new(fetcher: Fetcher, config: &SourceConfig) -> Self {
        Self {
            fetcher,
            base: config.rxnav_base.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        crate::sources::endpoint(&self.base, path)
    }

    /// Adapter for the `RxNorm` entry: the raw name-lookup response.
    pub(crate) async fn search(
        &self,
        drug_name: &str,
    ) -> Result<Option<serde_json::Value>, MedlifeError> {
        Ok(self
            .fetcher
            .json(
                Upstream::RxNav,
                &self.endpoint("rxcui.json"),
                &[("name", drug_name.trim())],
                Lookup::Primary,
            )
            .await)
    }

    /// Resolves a drug name to its first RxCUI.
    pub(crate) async fn rxcui(&self, drug_name: &str) -> Option<String> {
        let value = self
            .fetcher
            .json(
                Upstream::RxNav,
                &self.endpoint("rxcui.json"),
                &[("name", drug_name.trim())],
                Lookup::Auxiliary,
            )
            .await?;
        let resp: RxcuiResponse = decode(value)?;
        resp.id_group
            .rxnorm_id
            .into_iter()
            .map(|id| id.trim().to_string())
            .find(|id| !id.is_empty())
    }

    /// Classes the concept belongs to under one relation, de-duplicated by class id.
    pub(crate) async fn classes_by_rxcui(
        &self,
        rxcui: &str,
        relation: &ClassRelation,
    ) -> Vec<RxClass> {
        let mut query = vec![("rxcui", rxcui), ("relaSource", relation.rela_source)];
        if let Some(rela) = relation.rela {
            query.push(("relas", rela));
        }
        let Some(value) = self
            .fetcher
            .json(
                Upstream::RxNav,
                &self.endpoint("rxclass/class/byRxcui.json"),
                &query,
                Lookup::Auxiliary,
            )
            .await
        else {
            return Vec::new();
        };
        let Some(resp) = decode::<ClassByRxcuiResponse>(value) else {
            return Vec::new();
        };

        let mut out: Vec<RxClass> = Vec::new();
        for info in resp
            .drug_info_list
            .map(|list| list.drug_info.into_vec())
            .unwrap_or_default()
        {
            let Some(class) = info.class_item else {
                continue;
            };
            if class.class_id.trim().is_empty() || out.iter().any(|c| c.class_id == class.class_id)
            {
                continue;
            }
            out.push(class);
        }
        debug!(
            rxcui,
            rela_source = relation.rela_source,
            classes = out.len(),
            "RxClass membership"
        );
        out
    }

    /// Member drugs of a class; single-member and multi-member shapes read the same.
    pub(crate) async fn class_members(
        &self,
        class: &RxClass,
        relation: &ClassRelation,
    ) -> Vec<RxConcept> {
        let mut query = vec![
            ("classId", class.class_id.as_str()),
            ("relaSource", relation.rela_source),
        ];
        if let Some(rela) = relation.rela {
            query.push(("rela", rela));
        }
        let Some(value) = self
            .fetcher
            .json(
                Upstream::RxNav,
                &self.endpoint("rxclass/classMembers.json"),
                &query,
                Lookup::Auxiliary,
            )
            .await
        else {
            return Vec::new();
        };

        decode::<ClassMembersResponse>(value)
            .and_then(|resp| resp.drug_member_group)
            .map(|group| {
                group
                    .drug_member
                    .into_vec()
                    .into_iter()
                    .filter_map(|member| member.min_concept)
                    .filter(|concept| !concept.name.trim().is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Concepts linked to `rxcui` by brand-name or ingredient relations.
    pub(crate) async fn related_by_tty(&self, rxcui: &str) -> Vec<RxConcept> {
        let url = self.endpoint(&format!("rxcui/{}/related.json", rxcui.trim()));
        let Some(value) = self
            .fetcher
            .json(
                Upstream::RxNav,
                &url,
                &[("tty", DIRECT_RELATION_TTYS)],
                Lookup::Auxiliary,
            )
            .await
        else {
            return Vec::new();
        };

        let Some(group) = decode::<RelatedResponse>(value).and_then(|resp| resp.related_group)
        else {
            return Vec::new();
        };
        group
            .concept_group
            .into_vec()
            .into_iter()
            .flat_map(|g| g.concept_properties.into_vec())
            .filter(|concept| !concept.name.trim().is_empty())
            .collect()
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(source = RXNORM_API, "Unexpected response shape: {err}");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct RxcuiResponse {
    #[serde(rename = "idGroup", default)]
    id_group: IdGroup,
}

#[derive(Debug, Default, Deserialize)]
struct IdGroup {
    #[serde(rename = "rxnormId", default)]
    rxnorm_id: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClassByRxcuiResponse {
    #[serde(rename = "rxclassDrugInfoList")]
    drug_info_list: Option<DrugInfoList>,
}

#[derive(Debug, Deserialize)]
struct DrugInfoList {
    #[serde(rename = "rxclassDrugInfo", default)]
    drug_info: OneOrMany<DrugInfo>,
}

#[derive(Debug, Deserialize)]
struct DrugInfo {
    #[serde(rename = "rxclassMinConceptItem")]
    class_item: Option<RxClass>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RxClass {
    #[serde(rename = "classId")]
    pub class_id: String,
    #[serde(rename = "className")]
    pub class_name: String,
}

#[derive(Debug, Deserialize)]
struct ClassMembersResponse {
    #[serde(rename = "drugMemberGroup")]
    drug_member_group: Option<DrugMemberGroup>,
}

#[derive(Debug, Deserialize)]
struct DrugMemberGroup {
    #[serde(rename = "drugMember", default)]
    drug_member: OneOrMany<DrugMember>,
}

#[derive(Debug, Deserialize)]
struct DrugMember {
    #[serde(rename = "minConcept")]
    min_concept: Option<RxConcept>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RxConcept {
    pub name: String,
    #[serde(default)]
    pub tty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelatedResponse {
    #[serde(rename = "relatedGroup")]
    related_group: Option<RelatedGroup>,
}

#[derive(Debug, Deserialize)]
struct RelatedGroup {
    #[serde(rename = "conceptGroup", default)]
    concept_group: OneOrMany<ConceptGroup>,
}

#[derive(Debug, Deserialize)]
struct ConceptGroup {
    #[serde(rename = "conceptProperties", default)]
    concept_properties: OneOrMany<RxConcept>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RxNormClient {
        let cfg = SourceConfig::with_base(&server.uri());
        RxNormClient::new(Fetcher::new(&cfg).unwrap(), &cfg)
    }

    #[tokio::test]
    async fn rxcui_reads_first_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rxcui.json"))
            .and(query_param("name", "ibuprofen"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "idGroup": {"name": "ibuprofen", "rxnormId": ["5640"]}
            })))
            .mount(&server)
            .await;

        assert_eq!(
            client_for(&server).rxcui("ibuprofen").await.as_deref(),
            Some("5640")
        );
    }

    #[tokio::test]
    async fn rxcui_missing_id_list_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rxcui.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"idGroup": {"name": "zzz"}})),
            )
            .mount(&server)
            .await;

        assert!(client_for(&server).rxcui("zzz").await.is_none());
    }

    #[tokio::test]
    async fn classes_by_rxcui_sends_relation_filter_and_dedupes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rxclass/class/byRxcui.json"))
            .and(query_param("rxcui", "5640"))
            .and(query_param("relaSource", "DAILYMED"))
            .and(query_param("relas", "has_epc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rxclassDrugInfoList": {"rxclassDrugInfo": [
                    {"rxclassMinConceptItem": {"classId": "N0000175722", "className": "Nonsteroidal Anti-inflammatory Drug", "classType": "EPC"}},
                    {"rxclassMinConceptItem": {"classId": "N0000175722", "className": "Nonsteroidal Anti-inflammatory Drug", "classType": "EPC"}}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let classes = client_for(&server)
            .classes_by_rxcui("5640", &CLASS_RELATIONS[1])
            .await;
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].class_name, "Nonsteroidal Anti-inflammatory Drug");
    }

    #[tokio::test]
    async fn class_members_accepts_single_member_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rxclass/classMembers.json"))
            .and(query_param("classId", "M01AE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "drugMemberGroup": {"drugMember": {
                    "minConcept": {"rxcui": "7258", "name": "naproxen", "tty": "IN"}
                }}
            })))
            .mount(&server)
            .await;

        let class = RxClass {
            class_id: "M01AE".into(),
            class_name: "Propionic acid derivatives".into(),
        };
        let members = client_for(&server)
            .class_members(&class, &CLASS_RELATIONS[0])
            .await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "naproxen");
    }

    #[tokio::test]
    async fn related_by_tty_flattens_concept_groups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rxcui/5640/related.json"))
            .and(query_param("tty", "BN IN"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "relatedGroup": {"conceptGroup": [
                    {"tty": "BN", "conceptProperties": [
                        {"rxcui": "153008", "name": "Advil", "tty": "BN"},
                        {"rxcui": "202488", "name": "Motrin", "tty": "BN"}
                    ]},
                    {"tty": "IN"}
                ]}
            })))
            .mount(&server)
            .await;

        let related = client_for(&server).related_by_tty("5640").await;
        let names: Vec<&str> = related.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Advil", "Motrin"]);
    }
}
