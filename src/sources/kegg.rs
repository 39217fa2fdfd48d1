use std::borrow::Cow;

use crate::error::MedlifeError;
use crate::sources::{Fetcher, Lookup, SourceConfig, Upstream, segment_endpoint};

pub(crate) const KEGG_API: &str = Upstream::Kegg.label();

pub struct KeggClient {
    fetcher: Fetcher,
    base: Cow<'static, str>,
}

impl KeggClient {
    pub(crate) fn new(fetcher: Fetcher, config: &SourceConfig) -> Self {
        Self {
            fetcher,
            base: config.kegg_base.clone(),
        }
    }

    /// KEGG DRUG keyword search. The tab-separated listing is returned as-is;
    /// an empty listing means no match.
    pub(crate) async fn find_drug(&self, term: &str) -> Result<Option<String>, MedlifeError> {
        let term = term.trim().to_lowercase();
        let url = segment_endpoint(&self.base, &["find", "drug", &term])?;
        let text = self
            .fetcher
            .text(Upstream::Kegg, &url, &[], Lookup::Primary)
            .await;
        Ok(text.filter(|body| !body.trim().is_empty()))
    }
}
