//! Grouping objects into size- and count-bounded scan batches.

use crate::core::ObjectSummary;

/// Default cumulative byte bound of a chunk.
pub const DEFAULT_CHUNK_MAX_BYTES: u64 = 500_000_000;

/// Default object-count bound of a chunk.
pub const DEFAULT_CHUNK_MAX_OBJECTS: usize = 20;

/// Bounds applied to every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Maximum cumulative size in bytes.
    pub max_bytes: u64,
    /// Maximum number of objects.
    pub max_objects: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_CHUNK_MAX_BYTES,
            max_objects: DEFAULT_CHUNK_MAX_OBJECTS,
        }
    }
}

/// Result of chunking a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunked {
    /// Chunks, each within both bounds.
    pub chunks: Vec<Vec<ObjectSummary>>,
    /// Objects that cannot be chunked: no size, or bigger than a whole chunk.
    pub oversized: Vec<ObjectSummary>,
}

/// Greedily packs `objects` into chunks, preserving order.
pub fn chunk_objects(objects: Vec<ObjectSummary>, limits: ChunkLimits) -> Chunked {
    let max_objects = limits.max_objects.max(1);
    let mut chunked = Chunked::default();
    let mut current: Vec<ObjectSummary> = Vec::new();
    let mut current_bytes = 0u64;

    for object in objects {
        let size = match object.size {
            Some(size) if size <= limits.max_bytes => size,
            _ => {
                chunked.oversized.push(object);
                continue;
            }
        };

        let full = current.len() >= max_objects || current_bytes + size > limits.max_bytes;
        if full && !current.is_empty() {
            chunked.chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(object);
    }

    if !current.is_empty() {
        chunked.chunks.push(current);
    }
    chunked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(sizes: &[u64]) -> Vec<ObjectSummary> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| ObjectSummary::new(format!("k{i}"), Some(s)))
            .collect()
    }

    fn assert_within(chunked: &Chunked, limits: ChunkLimits) {
        for chunk in &chunked.chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.len() <= limits.max_objects);
            let bytes: u64 = chunk.iter().filter_map(|o| o.size).sum();
            assert!(bytes <= limits.max_bytes, "chunk of {bytes} bytes");
        }
    }

    #[test]
    fn test_count_bound() {
        let limits = ChunkLimits::default();
        let chunked = chunk_objects(objects(&[1; 45]), limits);
        assert_eq!(
            chunked.chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![20, 20, 5]
        );
        assert_within(&chunked, limits);
    }

    #[test]
    fn test_size_bound() {
        let limits = ChunkLimits::default();
        let chunked = chunk_objects(
            objects(&[200_000_000, 200_000_000, 200_000_000, 100_000_000, 300_000_000]),
            limits,
        );
        assert_eq!(
            chunked.chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert_within(&chunked, limits);
    }

    #[test]
    fn test_oversized_object_is_never_merged() {
        let limits = ChunkLimits::default();
        let mut input = objects(&[10, 20]);
        input.insert(1, ObjectSummary::new("huge", Some(500_000_001)));
        input.push(ObjectSummary::new("sizeless", None));

        let chunked = chunk_objects(input, limits);

        assert_eq!(chunked.chunks.len(), 1);
        assert_eq!(chunked.chunks[0].len(), 2);
        let oversized: Vec<&str> = chunked.oversized.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(oversized, vec!["huge", "sizeless"]);
    }

    #[test]
    fn test_exact_bounds_fit() {
        let limits = ChunkLimits {
            max_bytes: 100,
            max_objects: 3,
        };
        let chunked = chunk_objects(objects(&[50, 50, 100, 0, 0, 0, 0]), limits);
        assert_eq!(
            chunked.chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 3, 2]
        );
        assert_within(&chunked, limits);
    }

    #[test]
    fn test_mixed_sizes_stay_within_bounds() {
        let limits = ChunkLimits::default();
        let sizes: Vec<u64> = (0..200u64).map(|i| (i * 7_919_993) % 260_000_000).collect();
        let total = sizes.len();
        let chunked = chunk_objects(objects(&sizes), limits);

        assert_within(&chunked, limits);
        let chunked_count: usize = chunked.chunks.iter().map(Vec::len).sum();
        assert_eq!(chunked_count + chunked.oversized.len(), total);
        assert!(chunked.oversized.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(chunk_objects(Vec::new(), ChunkLimits::default()), Chunked::default());
    }
}
