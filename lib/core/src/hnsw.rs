use crate::vector::{dot, Vector};
use crate::{Error, Result};
use ahash::AHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Fixed seed for level assignment so rebuilds of the same catalog produce the same graph
pub const DEFAULT_SEED: u64 = 0x1cd_10;

/// Fast bit vector for visited node tracking
/// Much faster than HashSet for dense integer sets
#[derive(Clone)]
struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    #[inline]
    fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; (capacity + 63) / 64],
        }
    }

    /// Mark `idx` visited; returns true if it was not visited before
    #[inline]
    fn insert(&mut self, idx: usize) -> bool {
        let word_idx = idx / 64;
        let mask = 1u64 << (idx % 64);
        if word_idx >= self.bits.len() {
            self.bits.resize(word_idx + 1, 0);
        }
        let was_set = (self.bits[word_idx] & mask) != 0;
        self.bits[word_idx] |= mask;
        !was_set
    }

    #[cfg(test)]
    fn contains(&self, idx: usize) -> bool {
        self.bits
            .get(idx / 64)
            .map(|w| (w & (1u64 << (idx % 64))) != 0)
            .unwrap_or(false)
    }
}

/// Candidate for search with distance
#[derive(Clone, Copy)]
struct Candidate {
    idx: usize,
    dist: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smaller distance (then smaller index) = higher priority
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reverse candidate for max-heap (furthest first)
#[derive(Clone, Copy)]
struct ReverseCandidate {
    idx: usize,
    dist: f32,
}

impl PartialEq for ReverseCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReverseCandidate {}

impl Ord for ReverseCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: larger distance (then larger index) = higher priority
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.idx.cmp(&other.idx))
    }
}

impl PartialOrd for ReverseCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    key: String,
    layers: Vec<Vec<usize>>,
}

/// HNSW graph parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    /// Links per node on upper layers; layer 0 keeps twice as many
    pub max_connections: usize,
    pub max_layers: usize,
    pub ef_construction: usize,
    /// Minimum beam width at query time
    pub ef_search: usize,
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            max_connections: 16,
            max_layers: 4,
            ef_construction: 200,
            ef_search: 64,
            seed: DEFAULT_SEED,
        }
    }
}

/// HNSW index over unit-length vectors with cosine distance (`1 - dot`).
///
/// Vectors live in one contiguous buffer for cache locality. Search takes
/// `&self` and keeps its visited set per query, so a built index can be
/// shared across threads without locking.
pub struct HnswIndex {
    nodes: Vec<HnswNode>,
    /// Contiguous storage for all vectors (cache-friendly)
    vectors: Vec<f32>,
    dim: usize,
    key_to_index: AHashMap<String, usize>,
    entry_point: Option<usize>,
    top_layer: usize,
    params: HnswParams,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(dim: usize, params: HnswParams) -> Self {
        Self {
            nodes: Vec::new(),
            vectors: Vec::new(),
            dim,
            key_to_index: AHashMap::new(),
            entry_point: None,
            top_layer: 0,
            params,
            rng: StdRng::seed_from_u64(params.seed),
        }
    }

    #[inline(always)]
    fn get_vector(&self, node_idx: usize) -> &[f32] {
        let start = node_idx * self.dim;
        &self.vectors[start..start + self.dim]
    }

    /// Select layer using exponential decay
    #[inline]
    fn select_layer(&mut self) -> usize {
        let mut layer = 0;
        while layer < self.params.max_layers.saturating_sub(1) && self.rng.random::<f32>() < 0.5 {
            layer += 1;
        }
        layer
    }

    #[inline(always)]
    fn distance_to_node(&self, query: &[f32], node_idx: usize) -> f32 {
        1.0 - dot(query, self.get_vector(node_idx))
    }

    #[inline]
    fn layer_capacity(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.max_connections * 2
        } else {
            self.params.max_connections
        }
    }

    /// Beam search on one layer, returns up to `ef` nodes sorted by distance
    fn search_layer(&self, query: &[f32], entry_points: &[usize], ef: usize, layer: usize) -> Vec<(usize, f32)> {
        let mut visited = VisitedSet::new(self.nodes.len());
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<ReverseCandidate> = BinaryHeap::with_capacity(ef + 1);

        for &ep in entry_points {
            if visited.insert(ep) {
                let dist = self.distance_to_node(query, ep);
                candidates.push(Candidate { idx: ep, dist });
                results.push(ReverseCandidate { idx: ep, dist });
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(Candidate { idx: current_idx, dist: current_dist }) = candidates.pop() {
            let worst_dist = results.peek().map(|w| w.dist).unwrap_or(f32::INFINITY);
            // Early termination: nothing left can improve the result set
            if results.len() >= ef && current_dist > worst_dist {
                break;
            }

            let Some(neighbors) = self.nodes[current_idx].layers.get(layer) else {
                continue;
            };

            for &neighbor_idx in neighbors {
                if !visited.insert(neighbor_idx) {
                    continue;
                }
                let dist = self.distance_to_node(query, neighbor_idx);
                let worst_dist = results.peek().map(|w| w.dist).unwrap_or(f32::INFINITY);
                if results.len() < ef || dist < worst_dist {
                    candidates.push(Candidate { idx: neighbor_idx, dist });
                    results.push(ReverseCandidate { idx: neighbor_idx, dist });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut result_vec: Vec<(usize, f32)> = results.into_iter().map(|c| (c.idx, c.dist)).collect();
        result_vec.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        result_vec
    }

    /// Greedy descent from the entry point down to (but excluding) `target_layer`
    fn descend(&self, query: &[f32], target_layer: usize) -> Option<usize> {
        let mut current = self.entry_point?;
        let mut layer = self.top_layer;
        while layer > target_layer {
            if let Some(&(closest, _)) = self.search_layer(query, &[current], 1, layer).first() {
                current = closest;
            }
            layer -= 1;
        }
        Some(current)
    }

    /// Insert a keyed, unit-length vector into the graph
    pub fn insert(&mut self, key: impl Into<String>, vector: &Vector) -> Result<()> {
        let key = key.into();
        if vector.dim() != self.dim {
            return Err(Error::InvalidDimension {
                expected: self.dim,
                actual: vector.dim(),
            });
        }
        if self.key_to_index.contains_key(&key) {
            return Err(Error::DuplicateCode(key));
        }

        let layer = self.select_layer();
        let node_idx = self.nodes.len();
        self.vectors.extend_from_slice(vector.as_slice());
        self.nodes.push(HnswNode {
            key: key.clone(),
            layers: vec![Vec::new(); layer + 1],
        });
        self.key_to_index.insert(key, node_idx);

        let Some(mut entry) = self.descend(vector.as_slice(), layer) else {
            self.entry_point = Some(node_idx);
            self.top_layer = layer;
            return Ok(());
        };

        let query = vector.as_slice().to_vec();
        for current_layer in (0..=layer.min(self.top_layer)).rev() {
            let candidates = self.search_layer(&query, &[entry], self.params.ef_construction, current_layer);
            let neighbors: Vec<usize> = candidates
                .iter()
                .map(|&(idx, _)| idx)
                .filter(|&idx| idx != node_idx)
                .take(self.layer_capacity(current_layer))
                .collect();

            if let Some(&(closest, _)) = candidates.first() {
                entry = closest;
            }
            self.nodes[node_idx].layers[current_layer] = neighbors.clone();

            for neighbor_idx in neighbors {
                self.link(neighbor_idx, node_idx, current_layer);
            }
        }

        if layer > self.top_layer {
            self.top_layer = layer;
            self.entry_point = Some(node_idx);
        }
        Ok(())
    }

    /// Add a backlink and prune the neighbor list to its closest nodes when over capacity
    fn link(&mut self, from: usize, to: usize, layer: usize) {
        let capacity = self.layer_capacity(layer);
        if layer >= self.nodes[from].layers.len() {
            return;
        }
        self.nodes[from].layers[layer].push(to);
        if self.nodes[from].layers[layer].len() <= capacity {
            return;
        }

        let base = self.get_vector(from).to_vec();
        let mut connections: Vec<(usize, f32)> = self.nodes[from].layers[layer]
            .iter()
            .map(|&n| (n, self.distance_to_node(&base, n)))
            .collect();
        connections.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        connections.truncate(capacity);
        self.nodes[from].layers[layer] = connections.into_iter().map(|(n, _)| n).collect();
    }

    /// Search for the `k` nearest keys; returns `(key, similarity)` with similarity = 1 - distance
    pub fn search(&self, query: &Vector, k: usize, ef: Option<usize>) -> Vec<(&str, f32)> {
        if k == 0 || query.dim() != self.dim {
            return Vec::new();
        }
        let Some(entry) = self.descend(query.as_slice(), 0) else {
            return Vec::new();
        };

        let ef = ef.unwrap_or(self.params.ef_search).max(k);
        self.search_layer(query.as_slice(), &[entry], ef, 0)
            .into_iter()
            .take(k)
            .map(|(idx, dist)| (self.nodes[idx].key.as_str(), (1.0 - dist).clamp(-1.0, 1.0)))
            .collect()
    }

    /// Exact nearest neighbors by scanning every vector
    pub fn search_exact(&self, query: &Vector, k: usize) -> Vec<(&str, f32)> {
        if k == 0 || query.dim() != self.dim {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = (0..self.nodes.len())
            .map(|idx| (idx, self.distance_to_node(query.as_slice(), idx)))
            .collect();
        scored.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(idx, dist)| (self.nodes[idx].key.as_str(), (1.0 - dist).clamp(-1.0, 1.0)))
            .collect()
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.key_to_index.contains_key(key)
    }

    #[inline]
    pub fn vector(&self, key: &str) -> Option<&[f32]> {
        self.key_to_index.get(key).map(|&idx| self.get_vector(idx))
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
