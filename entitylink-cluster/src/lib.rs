//! Weakly connected components clusterer over the entitylink similarity
//! graph (§4E). Split out as its own workspace member since it only needs
//! the edge/cluster data model, not the rest of the pipeline, and keeping
//! it separate avoids a dependency cycle with the core crate.

pub mod wcc;

pub use wcc::WeaklyConnectedComponents;
