//! Probabilistic membership for duplicate suppression

pub mod bloom;

pub use bloom::BloomFilter;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("Expected insertions must be nonzero, got {0}")]
    InvalidCapacity(usize),
    #[error("False positive rate must be in (0, 1), got {0}")]
    InvalidFalsePositiveRate(f64),
}
