// THEORY:
// The `pipeline` module is the top-level API for the whole preparation job. It
// strings the stages together in a fixed order and hands back a `PrepReport`
// describing what each split looked like on the way through.
//
// Train split:  discover -> parse -> crop -> equalize -> flip-augment -> one-hot
//               -> shuffle -> write
// Test split:   discover -> parse -> crop -> (equalize, if enabled) -> one-hot -> write
//
// Every stage is a pure function of its input, so the pipeline holds no state
// beyond its settings, its flip table and its worker pool.

use crate::config::Settings;
use crate::core_modules::annotation::{self, Annotation};
use crate::core_modules::archive::{self, Archive, PixelData, Split};
use crate::core_modules::augment::{self, FlipRules, FlipSummary};
use crate::core_modules::crop;
use crate::core_modules::equalize;
use crate::core_modules::labels::{self, one_hot};
use crate::core_modules::utils::image_helper::image_helper;
use crate::core_modules::workers::WorkerPool;
use crate::error::{PrepError, PrepResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What happened to one split.
#[derive(Debug, Clone)]
pub struct SplitReport {
    pub split: Split,
    pub annotation_files: usize,
    /// Rows parsed from the annotation files.
    pub parsed: usize,
    /// `[N, H, W, C]` of the written pixel tensor.
    pub bboxes_shape: [usize; 4],
    /// `[N, num_classes]` of the written label matrix.
    pub class_ids_shape: [usize; 2],
    pub dtype: &'static str,
    /// Samples per class in the written archive.
    pub histogram: Vec<usize>,
    /// Present for the augmented split only.
    pub flips: Option<FlipSummary>,
    pub archive_path: PathBuf,
    pub archive_bytes: u64,
}

/// The primary output of a full run.
#[derive(Debug, Clone)]
pub struct PrepReport {
    pub train: SplitReport,
    pub test: SplitReport,
    pub previews: Vec<PathBuf>,
}

/// The main, top-level struct for the preparation job.
pub struct PrepPipeline {
    settings: Settings,
    rules: FlipRules,
    pool: WorkerPool,
}

impl PrepPipeline {
    pub fn new(settings: Settings) -> PrepResult<Self> {
        settings.validate()?;
        let pool = WorkerPool::new(settings.processing.workers)?;
        let pipeline = Self {
            settings,
            rules: FlipRules::traffic_signs(),
            pool,
        };
        pipeline.check_rules()?;
        Ok(pipeline)
    }

    /// Replaces the default traffic-sign flip table.
    pub fn with_flip_rules(mut self, rules: FlipRules) -> PrepResult<Self> {
        self.rules = rules;
        self.check_rules()?;
        Ok(self)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn check_rules(&self) -> PrepResult<()> {
        let num_classes = self.settings.dataset.num_classes;
        match self.rules.max_class() {
            Some(max) if max >= num_classes => Err(PrepError::Settings(format!(
                "flip table mentions class {max} but num_classes is {num_classes}"
            ))),
            _ => Ok(()),
        }
    }

    fn load_annotations(
        &self,
        split: Split,
        root: &Path,
        expected: Option<usize>,
    ) -> PrepResult<(usize, Vec<Annotation>)> {
        // --- 1. Discovery ---
        let files = annotation::discover_annotation_files(root)?;

        // --- 2. Parsing ---
        let annotations = annotation::read_all(&files, self.settings.dataset.num_classes)?;

        if let Some(expected) = expected {
            if expected != annotations.len() {
                warn!(
                    split = split.as_str(),
                    expected,
                    found = annotations.len(),
                    "annotation count differs from configured size"
                );
            }
        }
        Ok((files.len(), annotations))
    }

    /// Builds the training archive: crop, equalize, flip-augment, one-hot, shuffle.
    pub fn prepare_train(&self) -> PrepResult<(Archive, SplitReport)> {
        let dataset = &self.settings.dataset;
        let image = &self.settings.image;
        let (files, annotations) =
            self.load_annotations(Split::Train, &dataset.train_root, dataset.train_size)?;

        // --- 3. Crop & Resize ---
        let raw = crop::crop_all(&annotations, image.dims(), image.channel_order, &self.pool)?;
        info!(dataset = ?raw.shape(), labels = ?[raw.len(), 1], "train dataset");

        // --- 4. Histogram Equalization ---
        let equalized = equalize::equalize_batch(&raw, image.channel_order, &self.pool)?;
        drop(raw);
        info!(dataset = ?equalized.shape(), "train dataset (after preprocessing)");

        // --- 5. Flip Augmentation ---
        let (augmented, flips) =
            augment::augment_by_flip(equalized, &self.rules, dataset.num_classes)?;
        info!(
            samples = augmented.len(),
            added = flips.added,
            "train dataset (after data augmentation)"
        );

        // --- 6. One-Hot & Shuffle ---
        let labels = one_hot(augmented.class_ids(), dataset.num_classes)?;
        let mut archive = Archive::new(Split::Train, PixelData::F32(augmented), labels)?;
        if self.settings.output.shuffle_train {
            archive = archive.shuffled(self.settings.output.seed)?;
        }

        let report = self.report_for(&archive, files, annotations.len(), Some(flips));
        Ok((archive, report))
    }

    /// Builds the test archive: crop and one-hot, equalized only when configured.
    pub fn prepare_test(&self) -> PrepResult<(Archive, SplitReport)> {
        let dataset = &self.settings.dataset;
        let image = &self.settings.image;
        let (files, annotations) =
            self.load_annotations(Split::Test, &dataset.test_root, dataset.test_size)?;

        let raw = crop::crop_all(&annotations, image.dims(), image.channel_order, &self.pool)?;
        info!(dataset = ?raw.shape(), labels = ?[raw.len(), 1], "test dataset");

        let labels = one_hot(raw.class_ids(), dataset.num_classes)?;
        let pixels = if dataset.equalize_test {
            let equalized = equalize::equalize_batch(&raw, image.channel_order, &self.pool)?;
            info!(dataset = ?equalized.shape(), "test dataset (after preprocessing)");
            PixelData::F32(equalized)
        } else {
            PixelData::U8(raw)
        };
        let archive = Archive::new(Split::Test, pixels, labels)?;

        let report = self.report_for(&archive, files, annotations.len(), None);
        Ok((archive, report))
    }

    fn report_for(
        &self,
        archive: &Archive,
        annotation_files: usize,
        parsed: usize,
        flips: Option<FlipSummary>,
    ) -> SplitReport {
        let archive_path = match archive.split {
            Split::Train => self.settings.output.train_archive.clone(),
            Split::Test => self.settings.output.test_archive.clone(),
        };
        SplitReport {
            split: archive.split,
            annotation_files,
            parsed,
            bboxes_shape: archive.bboxes.shape(),
            class_ids_shape: archive.class_ids.shape(),
            dtype: archive.bboxes.dtype(),
            histogram: labels::class_histogram(
                archive.bboxes.class_ids(),
                self.settings.dataset.num_classes,
            ),
            flips,
            archive_path,
            archive_bytes: 0,
        }
    }

    /// Runs both splits and writes both archives (plus previews, if configured).
    pub fn run(&self) -> PrepResult<PrepReport> {
        let output = &self.settings.output;
        info!(workers = self.pool.workers(), "starting preparation run");

        let (train_archive, mut train) = self.prepare_train()?;
        let (test_archive, mut test) = self.prepare_test()?;

        // --- 7. Serialization ---
        train.archive_bytes =
            archive::save(&output.train_archive, &train_archive, output.compression_level)?;
        test.archive_bytes =
            archive::save(&output.test_archive, &test_archive, output.compression_level)?;

        let previews = match &output.preview_dir {
            Some(dir) => image_helper::write_previews(
                dir,
                &train_archive.bboxes,
                output.preview_count,
                self.settings.image.channel_order,
            )?,
            None => Vec::new(),
        };

        Ok(PrepReport {
            train,
            test,
            previews,
        })
    }
}
