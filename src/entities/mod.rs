//! Entity-level workflows: drug and disease extraction, alternative-drug
//! resolution and the fan-out search.

pub(crate) mod alternatives;
pub(crate) mod disease;
pub(crate) mod drug;
pub(crate) mod search;
