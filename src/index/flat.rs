//! Exact inner-product index over L2-normalized vectors.
//!
//! Binary layout (little-endian):
//!
//! | field     | type      |
//! |-----------|-----------|
//! | magic     | `b"DQIP"` |
//! | version   | `u16`     |
//! | dimension | `u32`     |
//! | count     | `u64`     |
//! | rows      | `count * dimension` × `f32` |

use std::cmp::Ordering;

use super::IndexError;

const MAGIC: &[u8; 4] = b"DQIP";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 8;

/// One slot of a search result.
///
/// `position` is `None` when fewer than `k` vectors exist; callers must skip those slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row of the matching vector, or `None` for an empty slot.
    pub position: Option<usize>,
    /// Inner product with the query.
    pub score: f32,
}

impl Neighbor {
    /// Placeholder returned for slots with no matching vector.
    pub const MISSING: Self = Self {
        position: None,
        score: f32::NEG_INFINITY,
    };
}

/// Dense, append-only-at-build index scored by inner product.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    /// Build an index from `embeddings`, one row per vector, in order.
    pub fn build(dimension: usize, embeddings: &[Vec<f32>]) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::Corrupt("dimension must be positive".into()));
        }
        let mut data = Vec::with_capacity(dimension * embeddings.len());
        for vector in embeddings {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }
        Ok(Self { dimension, data })
    }

    /// Width of every stored vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return exactly `k` slots ordered by descending score.
    ///
    /// Slots beyond the number of stored vectors are [`Neighbor::MISSING`]. Equal scores are
    /// ordered by position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position: Some(position),
                score: dot(row, query),
            })
            .collect();

        if scored.len() > k && k > 0 {
            scored.select_nth_unstable_by(k - 1, compare_neighbors);
            scored.truncate(k);
        }
        scored.sort_by(compare_neighbors);
        scored.truncate(k);
        scored.resize(k, Neighbor::MISSING);
        Ok(scored)
    }

    /// Serialize into the on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        buffer.extend_from_slice(MAGIC);
        buffer.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buffer.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buffer.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        buffer
    }

    /// Parse the on-disk format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::Corrupt("file too short".into()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(IndexError::Corrupt("invalid magic".into()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {version}"
            )));
        }
        let dimension = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[10..18]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        if dimension == 0 {
            return Err(IndexError::Corrupt("dimension must be positive".into()));
        }
        let expected_len = count
            .checked_mul(dimension)
            .and_then(|values| values.checked_mul(4))
            .and_then(|payload| payload.checked_add(HEADER_LEN))
            .ok_or_else(|| IndexError::Corrupt("header overflows".into()))?;
        if bytes.len() != expected_len {
            return Err(IndexError::Corrupt(format!(
                "expected {expected_len} bytes for {count} vectors of dimension {dimension}, found {}",
                bytes.len()
            )));
        }

        let data = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .collect();
        Ok(Self { dimension, data })
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

fn compare_neighbors(left: &Neighbor, right: &Neighbor) -> Ordering {
    right
        .score
        .total_cmp(&left.score)
        .then_with(|| left.position.cmp(&right.position))
}
