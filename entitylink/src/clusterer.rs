//! Clustering seam (§4E). The weakly-connected-components implementation
//! lives in the separate `entitylink-cluster` crate — it only depends on
//! the edge/cluster data model, so this crate only knows the trait, not
//! the algorithm. The pipeline coordinator (`crate::pipeline`) is injected
//! with an implementation at call time instead of depending on that crate
//! directly, which would otherwise create a dependency cycle
//! (`entitylink-cluster` depends on `entitylink` for the `Cluster` model
//! and `EdgeStore`/`ClusterStore` traits).

use crate::model::Cluster;
use crate::store::EdgeStore;
use crate::Result;
use async_trait::async_trait;

/// Groups records into weakly connected components over edges at or above
/// `min_similarity`, sized within `[min_cluster_size, max_cluster_size]`.
/// Implementations decide what happens to edges/components outside that
/// size window (§4E: singletons are dropped, oversized components may be
/// split or dropped per the implementation's own policy).
#[async_trait]
pub trait Clusterer: Send + Sync {
    async fn cluster(
        &self,
        edge_store: &dyn EdgeStore,
        min_similarity: f64,
        min_cluster_size: usize,
        max_cluster_size: usize,
    ) -> Result<Vec<Cluster>>;
}
