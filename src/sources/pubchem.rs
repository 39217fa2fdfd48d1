use std::borrow::Cow;

use crate::error::MedlifeError;
use crate::sources::{Fetcher, Lookup, SourceConfig, Upstream, segment_endpoint};

pub(crate) const PUBCHEM_API: &str = Upstream::PubChem.label();

pub struct PubChemClient {
    fetcher: Fetcher,
    base: Cow<'static, str>,
}

impl PubChemClient {
    pub(crate) fn new(fetcher: Fetcher, config: &SourceConfig) -> Self {
        Self {
            fetcher,
            base: config.pubchem_base.clone(),
        }
    }

    /// Compound record for a name, as returned by PUG REST.
    pub(crate) async fn compound_by_name(
        &self,
        name: &str,
    ) -> Result<Option<serde_json::Value>, MedlifeError> {
        let url = segment_endpoint(&self.base, &["compound", "name", name.trim(), "JSON"])?;
        Ok(self
            .fetcher
            .json(Upstream::PubChem, &url, &[], Lookup::Primary)
            .await)
    }
}
