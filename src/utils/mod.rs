//! Internal utility helpers for query escaping and tolerant serde shapes.

pub(crate) mod query;
pub(crate) mod serde;
