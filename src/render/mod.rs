//! Output renderers for search results.

pub(crate) mod json;
pub(crate) mod markdown;
