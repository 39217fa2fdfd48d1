use std::sync::OnceLock;

use minijinja::{Environment, context};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::entities::search::{AggregateResult, Query};
use crate::error::MedlifeError;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

const MAX_LISTED: usize = 10;

fn env() -> Result<&'static Environment<'static>, MedlifeError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_filter("truncate", |s: String, max_chars: usize| -> String {
        if s.chars().count() <= max_chars {
            return s;
        }
        if max_chars == 0 {
            return "…".to_string();
        }
        let mut out: String = s.chars().take(max_chars).collect();
        out = out.trim_end().to_string();
        out.push('…');
        out
    });
    env.add_filter("cell", |s: String| -> String {
        let flat = s.replace(['\n', '\r', '\t'], " ").replace('|', "\\|");
        let flat = flat.trim();
        if flat.is_empty() {
            "-".to_string()
        } else {
            flat.to_string()
        }
    });
    env.add_template("search.md.j2", include_str!("../../templates/search.md.j2"))?;

    let _ = ENV.set(env);
    ENV.get()
        .ok_or_else(|| MedlifeError::api("render", "Template environment initialization failed"))
}

#[derive(Debug, Serialize)]
struct Row {
    id: String,
    name: String,
}

fn str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn label_results(value: &serde_json::Value) -> &[serde_json::Value] {
    value
        .get("results")
        .and_then(serde_json::Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// One row per label: set id and first brand (or generic) name.
fn label_rows(value: &serde_json::Value) -> Vec<Row> {
    label_results(value)
        .iter()
        .take(MAX_LISTED)
        .map(|label| Row {
            id: str_at(label, "/set_id")
                .or_else(|| str_at(label, "/id"))
                .unwrap_or("-")
                .to_string(),
            name: str_at(label, "/openfda/brand_name/0")
                .or_else(|| str_at(label, "/openfda/generic_name/0"))
                .unwrap_or("-")
                .to_string(),
        })
        .collect()
}

fn rxnorm_ids(value: &serde_json::Value) -> Vec<String> {
    value
        .pointer("/idGroup/rxnormId")
        .and_then(serde_json::Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn pubchem_cids(value: &serde_json::Value) -> Vec<String> {
    value
        .get("PC_Compounds")
        .and_then(serde_json::Value::as_array)
        .map(|compounds| {
            compounds
                .iter()
                .filter_map(|c| c.pointer("/id/id/cid"))
                .map(|cid| match cid {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .take(MAX_LISTED)
                .collect()
        })
        .unwrap_or_default()
}

/// Molecules or mechanisms from whichever ChEMBL listing was returned.
fn chembl_rows(value: &serde_json::Value) -> Vec<Row> {
    if let Some(molecules) = value.get("molecules").and_then(serde_json::Value::as_array) {
        return molecules
            .iter()
            .take(MAX_LISTED)
            .map(|m| Row {
                id: str_at(m, "/molecule_chembl_id").unwrap_or("-").to_string(),
                name: str_at(m, "/pref_name").unwrap_or("-").to_string(),
            })
            .collect();
    }
    ["mechanisms", "drug_mechanisms"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(serde_json::Value::as_array))
        .flatten()
        .take(MAX_LISTED)
        .map(|m| Row {
            id: str_at(m, "/molecule_chembl_id").unwrap_or("-").to_string(),
            name: str_at(m, "/mechanism_of_action").unwrap_or("-").to_string(),
        })
        .collect()
}

/// `dr:D00109\tAspirin (JP18/USP); ...` lines from KEGG `find`.
fn kegg_rows(text: &str) -> Vec<Row> {
    text.lines()
        .filter_map(|line| {
            let (id, names) = line.split_once('\t')?;
            let id = id.trim();
            if id.is_empty() {
                return None;
            }
            Some(Row {
                id: id.to_string(),
                name: names.trim().to_string(),
            })
        })
        .take(MAX_LISTED)
        .collect()
}

fn generated_at() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn search_markdown(query: &Query, result: &AggregateResult) -> Result<String, MedlifeError> {
    let tmpl = env()?.get_template("search.md.j2")?;
    let body = tmpl.render(context! {
        term => query.term(),
        mode => query.mode().as_str(),
        message => &result.message,
        recommended_medications => &result.recommended_medications,
        disease_labels => result.disease_information.as_ref().map(label_rows),
        indications => &result.indications,
        alternatives => &result.alternatives,
        allergies => &result.allergies,
        openfda_labels => result.openfda.as_ref().map(label_rows),
        rxnorm_ids => result.rxnorm.as_ref().map(rxnorm_ids),
        pubchem_cids => result.pubchem.as_ref().map(pubchem_cids),
        chembl_rows => result.chembl.as_ref().map(chembl_rows),
        kegg_rows => result.kegg.as_deref().map(kegg_rows),
        sources => result.labels(),
        generated_at => generated_at(),
    })?;
    Ok(body)
}
