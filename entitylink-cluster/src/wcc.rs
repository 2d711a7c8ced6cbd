//! The weakly connected components algorithm itself (§4E canonical
//! algorithm): bounded-depth traversal over edges at or above a weight
//! threshold, treated as undirected.

use async_trait::async_trait;
use entitylink::clusterer::Clusterer;
use entitylink::model::{Cluster, ClusterQualityFlags};
use entitylink::record::RecordId;
use entitylink::store::EdgeStore;
use entitylink::Result;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{info, instrument};

/// Defends against pathological graphs (§5 resource limits): a component
/// traversal stops discovering new vertices past this many hops from its
/// start, even if the graph is still connected beyond that.
const DEFAULT_HOP_LIMIT: usize = 1_000;

pub struct WeaklyConnectedComponents {
    hop_limit: usize,
}

impl Default for WeaklyConnectedComponents {
    fn default() -> Self {
        Self {
            hop_limit: DEFAULT_HOP_LIMIT,
        }
    }
}

impl WeaklyConnectedComponents {
    pub fn new(hop_limit: usize) -> Self {
        Self { hop_limit }
    }
}

struct RetainedEdge {
    from: RecordId,
    to: RecordId,
    weight: f64,
}

#[async_trait]
impl Clusterer for WeaklyConnectedComponents {
    #[instrument(skip(self, edge_store))]
    async fn cluster(
        &self,
        edge_store: &dyn EdgeStore,
        min_similarity: f64,
        min_cluster_size: usize,
        max_cluster_size: usize,
    ) -> Result<Vec<Cluster>> {
        use futures::StreamExt;

        let mut retained = Vec::new();
        let mut stream = edge_store.scan_edges().await?;
        while let Some(edge) = stream.next().await {
            let edge = edge?;
            if edge.weight < min_similarity {
                continue;
            }
            retained.push(RetainedEdge {
                from: edge.from,
                to: edge.to,
                weight: edge.weight,
            });
        }
        // Sort by (from, to) so traversal order, and therefore the
        // resulting components, are stable across runs with the same
        // inputs (§4E determinism).
        retained.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &retained {
            adjacency.entry(&edge.from).or_default().push(&edge.to);
            adjacency.entry(&edge.to).or_default().push(&edge.from);
        }
        for neighbors in adjacency.values_mut() {
            neighbors.sort_unstable();
        }

        let mut vertices: Vec<&str> = adjacency.keys().copied().collect();
        vertices.sort_unstable();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut components: Vec<Vec<String>> = Vec::new();

        for start in &vertices {
            if visited.contains(start) {
                continue;
            }
            let component = self.traverse(start, &adjacency, &mut visited);
            components.push(component);
        }

        let mut clusters = Vec::new();
        for mut member_ids in components {
            if member_ids.len() < min_cluster_size || member_ids.len() > max_cluster_size {
                continue;
            }
            member_ids.sort();
            let members: HashSet<&str> = member_ids.iter().map(String::as_str).collect();

            let mut weights = Vec::new();
            for edge in &retained {
                if members.contains(edge.from.as_str()) && members.contains(edge.to.as_str()) {
                    weights.push(edge.weight);
                }
            }

            let size = member_ids.len();
            let edge_count = weights.len();
            let avg_weight = weights.iter().sum::<f64>() / edge_count.max(1) as f64;
            let min_weight = weights.iter().cloned().fold(f64::INFINITY, f64::min);
            let max_weight = weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let possible_edges = size * (size.saturating_sub(1)) / 2;
            let density = edge_count as f64 / possible_edges.max(1) as f64;

            clusters.push(Cluster {
                cluster_id: cluster_id(&member_ids),
                size,
                edge_count,
                avg_weight,
                min_weight: if edge_count == 0 { 0.0 } else { min_weight },
                max_weight: if edge_count == 0 { 0.0 } else { max_weight },
                density,
                member_ids,
                created_at: chrono::Utc::now(),
                quality: ClusterQualityFlags::default(),
                quality_score: 0.0,
                valid: false,
            });
        }

        info!(clusters = clusters.len(), edges_considered = retained.len(), "wcc clustering complete");
        metrics::histogram!("entitylink_wcc_edges_considered").record(retained.len() as f64);
        Ok(clusters)
    }
}

impl WeaklyConnectedComponents {
    /// Breadth-first traversal from `start`, bounded to `self.hop_limit`
    /// hops. Neighbors are visited in sorted order so the member set (and
    /// hence `cluster_id`) is identical across runs regardless of the
    /// HashMap's internal iteration order.
    fn traverse<'a>(
        &self,
        start: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
    ) -> Vec<String> {
        let mut component = Vec::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        queue.push_back((start, 0));
        visited.insert(start);

        while let Some((vertex, depth)) = queue.pop_front() {
            component.push(vertex.to_string());
            if depth >= self.hop_limit {
                continue;
            }
            if let Some(neighbors) = adjacency.get(vertex) {
                for &neighbor in neighbors {
                    if visited.insert(neighbor) {
                        queue.push_back((neighbor, depth + 1));
                    }
                }
            }
        }
        component
    }
}

/// Stable id for a component, derived from its sorted member list (§4E
/// "cluster_id is derived from the sorted member list").
fn cluster_id(sorted_members: &[String]) -> String {
    let mut hasher = Sha256::new();
    for member in sorted_members {
        hasher.update(member.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as async_trait_attr;
    use entitylink::model::SimilarityEdge;
    use entitylink::store::EdgeFilter;
    use futures::stream::{self, BoxStream};
    use parking_lot::Mutex;
    use std::collections::HashMap as StdMap;

    #[derive(Default)]
    struct FixedEdgeStore {
        edges: Vec<SimilarityEdge>,
    }

    fn edge(from: &str, to: &str, weight: f64) -> SimilarityEdge {
        SimilarityEdge {
            from: from.to_string(),
            to: to.to_string(),
            weight,
            per_field_scores: StdMap::new(),
            algorithm: "fellegi_sunter".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: None,
            update_count: 1,
        }
    }

    #[async_trait_attr]
    impl EdgeStore for FixedEdgeStore {
        async fn get_edge(&self, _from: &str, _to: &str) -> Result<Option<SimilarityEdge>> {
            Ok(None)
        }
        async fn upsert_edge(&self, _edge: SimilarityEdge) -> Result<()> {
            Ok(())
        }
        async fn bulk_upsert(&self, _edges: Vec<SimilarityEdge>) -> Result<()> {
            Ok(())
        }
        async fn delete_where(&self, _filter: &EdgeFilter) -> Result<usize> {
            Ok(0)
        }
        async fn scan_edges(&self) -> Result<BoxStream<'static, Result<SimilarityEdge>>> {
            let items: Vec<Result<SimilarityEdge>> = self.edges.clone().into_iter().map(Ok).collect();
            Ok(Box::pin(stream::iter(items)))
        }
        async fn truncate(&self) -> Result<()> {
            Ok(())
        }
        async fn edge_count(&self) -> Result<usize> {
            Ok(self.edges.len())
        }
    }

    #[tokio::test]
    async fn three_way_chain_forms_one_component() {
        let store = FixedEdgeStore {
            edges: vec![edge("a", "b", 0.9), edge("b", "c", 0.85)],
        };
        let clusterer = WeaklyConnectedComponents::default();
        let clusters = clusterer.cluster(&store, 0.8, 2, 100).await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_ids, vec!["a", "b", "c"]);
        assert_eq!(clusters[0].edge_count, 2);
    }

    #[tokio::test]
    async fn disconnected_pairs_form_separate_components() {
        let store = FixedEdgeStore {
            edges: vec![edge("a", "b", 0.9), edge("x", "y", 0.9)],
        };
        let clusterer = WeaklyConnectedComponents::default();
        let clusters = clusterer.cluster(&store, 0.8, 2, 100).await.unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[tokio::test]
    async fn edges_below_min_similarity_are_ignored() {
        let store = FixedEdgeStore {
            edges: vec![edge("a", "b", 0.5)],
        };
        let clusterer = WeaklyConnectedComponents::default();
        let clusters = clusterer.cluster(&store, 0.8, 2, 100).await.unwrap();
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn components_below_min_cluster_size_are_dropped() {
        let store = FixedEdgeStore {
            edges: vec![edge("a", "b", 0.9)],
        };
        let clusterer = WeaklyConnectedComponents::default();
        let clusters = clusterer.cluster(&store, 0.8, 3, 100).await.unwrap();
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn components_above_max_cluster_size_are_dropped() {
        let edges: Vec<SimilarityEdge> = (0..10)
            .map(|i| edge(&format!("n{i}"), &format!("n{}", i + 1), 0.9))
            .collect();
        let store = FixedEdgeStore { edges };
        let clusterer = WeaklyConnectedComponents::default();
        let clusters = clusterer.cluster(&store, 0.8, 2, 5).await.unwrap();
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn cluster_id_is_stable_across_runs() {
        let store = FixedEdgeStore {
            edges: vec![edge("b", "a", 0.9)],
        };
        let clusterer = WeaklyConnectedComponents::default();
        let first = clusterer.cluster(&store, 0.8, 2, 100).await.unwrap();
        let second = clusterer.cluster(&store, 0.8, 2, 100).await.unwrap();
        assert_eq!(first[0].cluster_id, second[0].cluster_id);
    }

    mod property {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// §8 testable property: every cluster emitted from an arbitrary
            /// edge set has a density in `[0, 1]` and a size within the
            /// requested `[min_cluster_size, max_cluster_size]` bounds,
            /// since density is a same-component edge count over the
            /// component's own upper bound of possible edges.
            #[test]
            fn cluster_density_stays_within_bounds(
                edges in prop::collection::vec(
                    (0usize..8, 0usize..8, 0.0f64..1.0),
                    0..30,
                ),
            ) {
                let store = FixedEdgeStore {
                    edges: edges
                        .into_iter()
                        .filter(|(a, b, _)| a != b)
                        .map(|(a, b, w)| edge(&format!("n{a}"), &format!("n{b}"), w))
                        .collect(),
                };
                let clusterer = WeaklyConnectedComponents::default();
                let rt = tokio::runtime::Runtime::new().unwrap();
                let clusters = rt.block_on(clusterer.cluster(&store, 0.3, 2, 100)).unwrap();

                for cluster in &clusters {
                    prop_assert!(cluster.density >= 0.0 && cluster.density <= 1.0);
                    prop_assert!(cluster.size >= 2 && cluster.size <= 100);
                    let possible_edges = cluster.size * (cluster.size - 1) / 2;
                    prop_assert!(cluster.edge_count <= possible_edges);
                }
            }
        }
    }

    #[tokio::test]
    async fn hop_limit_splits_a_long_chain_into_bounded_pieces() {
        let edges: Vec<SimilarityEdge> = (0..20)
            .map(|i| edge(&format!("n{i:02}"), &format!("n{:02}", i + 1), 0.9))
            .collect();
        let store = FixedEdgeStore { edges };
        let clusterer = WeaklyConnectedComponents::new(3);
        let clusters = clusterer.cluster(&store, 0.8, 2, 100).await.unwrap();
        // A 21-node chain with a hop limit of 3 (4 vertices per traversal)
        // splits into multiple bounded components instead of one giant one.
        assert!(clusters.len() > 1);
        assert!(clusters.iter().all(|c| c.size <= 4));
    }
}
