use serde::{Deserialize, Serialize};

use crate::sources::openfda::{self, LabelResult};
use crate::transform;

/// Allergy-relevant label sections, bucketed by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllergySummary {
    #[serde(default)]
    pub common_reactions: Vec<String>,
    #[serde(default)]
    pub severe_reactions: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl AllergySummary {
    pub fn is_empty(&self) -> bool {
        self.common_reactions.is_empty()
            && self.severe_reactions.is_empty()
            && self.warnings.is_empty()
    }
}

fn primary_label(label_response: Option<&serde_json::Value>) -> Option<LabelResult> {
    label_response.and_then(openfda::first_label)
}

/// Indications read from the drug's label; falls back to a placeholder.
pub(crate) fn indications(label_response: Option<&serde_json::Value>) -> Vec<String> {
    transform::label::indications(primary_label(label_response).as_ref())
}

/// Allergy summary read from the drug's label; missing sections give empty buckets.
pub(crate) fn allergies(label_response: Option<&serde_json::Value>) -> AllergySummary {
    transform::label::allergy_summary(primary_label(label_response).as_ref())
}
