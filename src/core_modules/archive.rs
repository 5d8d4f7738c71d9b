// THEORY:
// The `archive` module is the exit layer. It packs one split's pixels and one-hot
// labels into a single gzip-compressed `bincode` blob that a training job can load
// in one read.
//
// Layout (serde, in field order):
//   version: u32            format version, checked on load
//   split:   Split          `train` or `test`
//   bboxes:  PixelData      `(N, H, W, C)` crops, `u8` raw or `f32` equalized
//   class_ids: OneHot       `(N, num_classes)` labels
//
// The field names `bboxes` / `class_ids` keep the vocabulary of the blobs the
// downstream classifier was first trained on (`train_bboxes`, `train_classIds`).
// An optional seeded shuffle permutes pixels and labels with the same index list
// before encoding.

use crate::core_modules::labels::OneHot;
use crate::core_modules::sample::SampleBatch;
use crate::error::{PrepError, PrepResult};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const ARCHIVE_VERSION: u32 = 1;

/// Which half of the dataset an archive holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }

    /// Key under which the pixel tensor is reported, e.g. `train_bboxes`.
    pub fn bboxes_key(&self) -> String {
        format!("{}_bboxes", self.as_str())
    }

    /// Key under which the label matrix is reported, e.g. `train_classIds`.
    pub fn class_ids_key(&self) -> String {
        format!("{}_classIds", self.as_str())
    }
}

/// Pixels of a split, raw or equalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PixelData {
    U8(SampleBatch<u8>),
    F32(SampleBatch<f32>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(b) => b.len(),
            PixelData::F32(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> [usize; 4] {
        match self {
            PixelData::U8(b) => b.shape(),
            PixelData::F32(b) => b.shape(),
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            PixelData::U8(_) => "u8",
            PixelData::F32(_) => "f32",
        }
    }

    pub fn class_ids(&self) -> &[u32] {
        match self {
            PixelData::U8(b) => b.class_ids(),
            PixelData::F32(b) => b.class_ids(),
        }
    }

    pub fn select(&self, indices: &[usize]) -> PrepResult<Self> {
        Ok(match self {
            PixelData::U8(b) => PixelData::U8(b.select(indices)?),
            PixelData::F32(b) => PixelData::F32(b.select(indices)?),
        })
    }

    pub fn permute(&mut self, order: &[usize]) -> PrepResult<()> {
        match self {
            PixelData::U8(b) => b.permute(order),
            PixelData::F32(b) => b.permute(order),
        }
    }
}

/// One split, ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    version: u32,
    pub split: Split,
    pub bboxes: PixelData,
    pub class_ids: OneHot,
}

impl Archive {
    pub fn new(split: Split, bboxes: PixelData, class_ids: OneHot) -> PrepResult<Self> {
        if bboxes.len() != class_ids.len() {
            return Err(PrepError::Shape(format!(
                "{} has {} samples but {} has {} rows",
                split.bboxes_key(),
                bboxes.len(),
                split.class_ids_key(),
                class_ids.len()
            )));
        }
        Ok(Self {
            version: ARCHIVE_VERSION,
            split,
            bboxes,
            class_ids,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }

    /// Applies one random permutation to pixels and labels. A `seed` makes the
    /// permutation reproducible.
    /// Samples are moved within their buffers, not copied.
    pub fn shuffled(mut self, seed: Option<u64>) -> PrepResult<Self> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut rng);
        self.bboxes.permute(&order)?;
        self.class_ids.permute(&order)?;
        Ok(self)
    }
}

/// Encodes `archive` to `path` with gzip at `level` (0-9). Returns bytes written.
pub fn save(path: &Path, archive: &Archive, level: u32) -> PrepResult<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PrepError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PrepError::io(path, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level));
    bincode::serialize_into(&mut encoder, archive).map_err(|source| PrepError::Codec {
        path: path.to_path_buf(),
        source,
    })?;
    encoder
        .finish()
        .and_then(|mut w| w.flush())
        .map_err(|e| PrepError::io(path, e))?;

    let bytes = fs::metadata(path)
        .map_err(|e| PrepError::io(path, e))?
        .len();
    info!(
        path = %path.display(),
        split = archive.split.as_str(),
        samples = archive.len(),
        bytes,
        "archive written"
    );
    Ok(bytes)
}

/// Reads an archive written by `save`.
pub fn load(path: &Path) -> PrepResult<Archive> {
    let file = File::open(path).map_err(|e| PrepError::io(path, e))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let archive: Archive =
        bincode::deserialize_from(decoder).map_err(|source| PrepError::Codec {
            path: path.to_path_buf(),
            source,
        })?;
    if archive.version != ARCHIVE_VERSION {
        return Err(PrepError::ArchiveVersion {
            path: path.to_path_buf(),
            found: archive.version,
            expected: ARCHIVE_VERSION,
        });
    }
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::labels::one_hot;
    use crate::core_modules::sample::ImageDims;

    fn small_archive() -> Archive {
        let dims = ImageDims::color(1, 1);
        let mut batch = SampleBatch::new(dims);
        for class_id in 0..6u32 {
            let v = class_id as u8 * 10;
            batch.push(&[v, v + 1, v + 2], class_id).unwrap();
        }
        let labels = one_hot(batch.class_ids(), 6).unwrap();
        Archive::new(Split::Train, PixelData::U8(batch), labels).unwrap()
    }

    #[test]
    fn save_then_load_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/train.bin.gz");
        let archive = small_archive();

        let bytes = save(&path, &archive, 5).unwrap();
        assert!(bytes > 0);
        assert_eq!(load(&path).unwrap(), archive);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let batch = SampleBatch::<u8>::new(ImageDims::color(1, 1));
        let labels = one_hot(&[1], 3).unwrap();
        assert!(Archive::new(Split::Test, PixelData::U8(batch), labels).is_err());
    }

    #[test]
    fn shuffle_keeps_pixels_and_labels_paired() {
        let shuffled = small_archive().shuffled(Some(7)).unwrap();
        let PixelData::U8(batch) = &shuffled.bboxes else {
            panic!("expected u8 pixels");
        };
        for (i, (pixels, class_id)) in batch.samples().enumerate() {
            assert_eq!(pixels[0], class_id as u8 * 10);
            assert_eq!(shuffled.class_ids.class_of(i), Some(class_id));
        }
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let a = small_archive().shuffled(Some(42)).unwrap();
        let b = small_archive().shuffled(Some(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_file_is_a_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin.gz");
        std::fs::write(&path, b"not gzip at all").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn report_keys_follow_split() {
        assert_eq!(Split::Train.bboxes_key(), "train_bboxes");
        assert_eq!(Split::Test.class_ids_key(), "test_classIds");
    }
}
