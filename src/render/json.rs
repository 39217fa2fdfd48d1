use serde::Serialize;

use crate::error::MedlifeError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, MedlifeError> {
    Ok(serde_json::to_string_pretty(value)?)
}
