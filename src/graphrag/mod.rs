//! Knowledge-graph consolidation and retrieval.
//!
//! Build path: [`extractor`] → [`normalizer`] → [`inferencer`] → [`partition`],
//! with artifacts written by [`persist`]. Query path: [`retrieval`], reading
//! those artifacts plus live graph-store traversals.

pub mod chunker;
pub mod extractor;
pub mod inferencer;
pub mod leiden;
pub mod normalizer;
pub mod parser;
pub mod partition;
pub mod persist;
pub mod pipeline;
pub mod retrieval;
pub mod triple;
pub mod vectors;

#[cfg(test)]
pub(crate) mod testing;

pub use chunker::{Chunk, Chunker};
pub use extractor::{ExtractionUnit, QaPair, TripleExtractor};
pub use inferencer::RelationshipInferencer;
pub use normalizer::EntityNormalizer;
pub use partition::{CommunityIndex, CommunityInfo, CommunityPartitioner, ISOLATED};
pub use pipeline::{BuildPipeline, BuildReport};
pub use retrieval::{QueryRequest, QueryResponse, RecallResult, RetrievalIndex};
pub use triple::Triple;
