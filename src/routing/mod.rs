//! Deterministic key -> partition -> replica-node mapping

pub mod hash;
pub mod router;

pub use hash::fnv_hash;
pub use router::{Router, CONSISTENT_ROUTING};
