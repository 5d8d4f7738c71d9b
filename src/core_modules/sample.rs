// THEORY:
// The `sample` module holds the one data structure every stage passes along: a
// dense batch of equally sized crops plus their class ids. It plays the part a
// 4-D array plays in a numeric toolkit, shaped `(N, H, W, C)` and stored
// row-major in a single `Vec`, so a sample is always one contiguous slice.
//
// Key architectural principles:
// 1.  **Shape Is Fixed At Birth**: A batch knows its `ImageDims` from the start.
//     Every `push` is checked against it, so no later stage has to re-validate
//     buffer lengths.
// 2.  **Pixel Type Is Generic**: Raw crops are `u8`; after equalization they are
//     `f32` in `[0, 1]`. The flip and shuffle logic never looks at pixel values,
//     so it works on either.
// 3.  **Labels Travel With Pixels**: `class_ids[i]` always describes sample `i`.
//     Every operation that reorders or gathers samples does so for both.

use crate::error::{PrepError, PrepResult};
use serde::{Deserialize, Serialize};

/// Width, height and channel count shared by every sample in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDims {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl ImageDims {
    /// Three-channel colour dimensions.
    pub fn color(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: 3,
        }
    }

    /// Number of values in one sample.
    pub fn sample_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Number of values in one row of one sample.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels as usize
    }
}

/// Order of the three colour channels inside each pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    /// Blue first, the layout produced by OpenCV's decoders.
    #[default]
    Bgr,
}

impl ChannelOrder {
    /// Reorders an RGB buffer in place into this channel order.
    pub fn arrange_from_rgb(&self, pixels: &mut [u8]) {
        if *self == ChannelOrder::Bgr {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }
    }

    /// Index of the (red, green, blue) channels within a pixel.
    pub fn rgb_indices(&self) -> (usize, usize, usize) {
        match self {
            ChannelOrder::Rgb => (0, 1, 2),
            ChannelOrder::Bgr => (2, 1, 0),
        }
    }
}

/// A dense `(N, H, W, C)` batch of samples with one class id per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch<T> {
    dims: ImageDims,
    data: Vec<T>,
    class_ids: Vec<u32>,
}

impl<T: Copy> SampleBatch<T> {
    pub fn new(dims: ImageDims) -> Self {
        Self {
            dims,
            data: Vec::new(),
            class_ids: Vec::new(),
        }
    }

    pub fn with_capacity(dims: ImageDims, samples: usize) -> Self {
        Self {
            dims,
            data: Vec::with_capacity(samples * dims.sample_len()),
            class_ids: Vec::with_capacity(samples),
        }
    }

    pub fn dims(&self) -> ImageDims {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.class_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_ids.is_empty()
    }

    /// `[N, H, W, C]`, the layout the downstream classifier expects.
    pub fn shape(&self) -> [usize; 4] {
        [
            self.len(),
            self.dims.height as usize,
            self.dims.width as usize,
            self.dims.channels as usize,
        ]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn class_ids(&self) -> &[u32] {
        &self.class_ids
    }

    pub fn sample(&self, index: usize) -> Option<&[T]> {
        let len = self.dims.sample_len();
        let start = index.checked_mul(len)?;
        self.data.get(start..start + len)
    }

    /// Iterates `(pixels, class_id)` pairs in batch order.
    pub fn samples(&self) -> impl Iterator<Item = (&[T], u32)> + '_ {
        self.data
            .chunks_exact(self.dims.sample_len())
            .zip(self.class_ids.iter().copied())
    }

    pub fn push(&mut self, pixels: &[T], class_id: u32) -> PrepResult<()> {
        let expected = self.dims.sample_len();
        if pixels.len() != expected {
            return Err(PrepError::SampleSize {
                expected,
                actual: pixels.len(),
            });
        }
        self.data.extend_from_slice(pixels);
        self.class_ids.push(class_id);
        Ok(())
    }

    /// Appends every sample of `other` after the samples already held.
    pub fn extend(&mut self, other: SampleBatch<T>) -> PrepResult<()> {
        if other.dims != self.dims {
            return Err(PrepError::Shape(format!(
                "cannot append {:?} samples to a {:?} batch",
                other.dims, self.dims
            )));
        }
        self.data.extend(other.data);
        self.class_ids.extend(other.class_ids);
        Ok(())
    }

    /// Reorders samples in place so that new sample `i` is old sample `order[i]`.
    /// `order` must be a permutation of `0..len()`.
    pub fn permute(&mut self, order: &[usize]) -> PrepResult<()> {
        permute_chunks(&mut self.data, self.dims.sample_len(), order)?;
        permute_chunks(&mut self.class_ids, 1, order)
    }

    /// Gathers the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> PrepResult<Self> {
        let mut out = Self::with_capacity(self.dims, indices.len());
        for &index in indices {
            let pixels = self.sample(index).ok_or_else(|| {
                PrepError::Shape(format!(
                    "index {index} out of range for batch of {}",
                    self.len()
                ))
            })?;
            out.push(pixels, self.class_ids[index])?;
        }
        Ok(out)
    }
}

/// Applies `order` to the fixed-size chunks of `data` by following cycles, so
/// only one chunk is ever held outside the buffer.
pub(crate) fn permute_chunks<T: Copy>(
    data: &mut [T],
    chunk: usize,
    order: &[usize],
) -> PrepResult<()> {
    let count = order.len();
    if chunk == 0 || data.len() != count * chunk {
        return Err(PrepError::Shape(format!(
            "permutation of {count} entries does not fit {} values in chunks of {chunk}",
            data.len()
        )));
    }
    let mut seen = vec![false; count];
    for &index in order {
        if index >= count || std::mem::replace(&mut seen[index], true) {
            return Err(PrepError::Shape(format!(
                "index {index} breaks a permutation of {count} entries"
            )));
        }
    }

    seen.fill(false);
    let mut held = Vec::with_capacity(chunk);
    for start in 0..count {
        if seen[start] || order[start] == start {
            seen[start] = true;
            continue;
        }
        held.clear();
        held.extend_from_slice(&data[start * chunk..(start + 1) * chunk]);
        let mut dst = start;
        loop {
            seen[dst] = true;
            let src = order[dst];
            if src == start {
                data[dst * chunk..(dst + 1) * chunk].copy_from_slice(&held);
                break;
            }
            data.copy_within(src * chunk..(src + 1) * chunk, dst * chunk);
            dst = src;
        }
    }
    Ok(())
}
