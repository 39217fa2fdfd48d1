//! Transform adapters from upstream API shapes into result models.

pub(crate) mod label;
