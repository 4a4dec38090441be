//! The three deliberation stages plus the optional style normalizer,
//! each a thin function over [`crate::stage_runner::StageRunner`] rather
//! than a trait object — the council has exactly one pipeline shape, so
//! there is no polymorphism to buy with a `ConsensusStage`-style trait.

pub mod normalize;
pub mod peer_rank;
pub mod respond;
pub mod synthesize;
