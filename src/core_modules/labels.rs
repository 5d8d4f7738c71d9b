//! One-hot label encoding and class histograms.

use crate::core_modules::sample::permute_chunks;
use crate::error::{PrepError, PrepResult};
use serde::{Deserialize, Serialize};

/// A dense `(N, num_classes)` matrix with exactly one `1.0` per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHot {
    num_classes: u32,
    data: Vec<f32>,
}

impl OneHot {
    pub fn num_classes(&self) -> u32 {
        self.num_classes
    }

    pub fn len(&self) -> usize {
        if self.num_classes == 0 {
            0
        } else {
            self.data.len() / self.num_classes as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.len(), self.num_classes as usize]
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let width = self.num_classes as usize;
        let start = index.checked_mul(width)?;
        self.data.get(start..start + width)
    }

    /// Recovers the class id stored in row `index`.
    pub fn class_of(&self, index: usize) -> Option<u32> {
        self.row(index)?
            .iter()
            .position(|&v| v == 1.0)
            .map(|c| c as u32)
    }

    /// All class ids, row by row.
    pub fn class_ids(&self) -> Vec<u32> {
        (0..self.len()).filter_map(|i| self.class_of(i)).collect()
    }

    /// Reorders rows in place so that new row `i` is old row `order[i]`.
    pub fn permute(&mut self, order: &[usize]) -> PrepResult<()> {
        permute_chunks(&mut self.data, self.num_classes as usize, order)
    }

    /// Gathers rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> PrepResult<Self> {
        let mut data = Vec::with_capacity(indices.len() * self.num_classes as usize);
        for &index in indices {
            let row = self.row(index).ok_or_else(|| {
                PrepError::Shape(format!(
                    "label row {index} out of range for {} rows",
                    self.len()
                ))
            })?;
            data.extend_from_slice(row);
        }
        Ok(Self {
            num_classes: self.num_classes,
            data,
        })
    }
}

/// Encodes `class_ids` as one-hot rows of width `num_classes`.
pub fn one_hot(class_ids: &[u32], num_classes: u32) -> PrepResult<OneHot> {
    let width = num_classes as usize;
    let mut data = vec![0.0f32; class_ids.len() * width];
    for (row, &class_id) in class_ids.iter().enumerate() {
        if class_id >= num_classes {
            return Err(PrepError::ClassOutOfRange {
                class_id,
                num_classes,
            });
        }
        data[row * width + class_id as usize] = 1.0;
    }
    Ok(OneHot { num_classes, data })
}

/// Number of samples per class id. Ids at or above `num_classes` are ignored.
pub fn class_histogram(class_ids: &[u32], num_classes: u32) -> Vec<usize> {
    let mut counts = vec![0usize; num_classes as usize];
    for &class_id in class_ids {
        if let Some(slot) = counts.get_mut(class_id as usize) {
            *slot += 1;
        }
    }
    counts
}
