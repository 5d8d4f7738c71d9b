// THEORY:
// The `augment` module grows the training set by mirroring signs whose meaning
// survives the mirror. It is the only stage that looks at class ids to decide
// what to do with pixels, so the decision table is data (`FlipRules`) rather
// than branches.
//
// Key architectural principles:
// 1.  **Symmetry Classes**: Some signs are left-right symmetric (a yield triangle),
//     some top-bottom symmetric (the digits "30" and "80"), some survive only a
//     half turn (the end-of-restriction diagonals). Each gets its own `FlipKind`.
// 2.  **Relabelling Mirrors**: A "keep left" sign mirrored left-right is a valid
//     "keep right" sign. Those rules carry a target class different from the source.
// 3.  **Stable Output Order**: Originals come first, untouched. Then, for each class
//     in ascending order, one flipped copy per matching rule (in table order) per
//     sample of that class (in input order). The same input always yields the same
//     output, which keeps archives reproducible before the optional shuffle.
// 4.  **Pixel-Type Agnostic**: Flips move values without reading them, so the same
//     code serves raw `u8` crops and equalized `f32` crops.

use crate::core_modules::sample::{ImageDims, SampleBatch};
use crate::error::PrepResult;
use std::collections::BTreeMap;
use tracing::debug;

/// The geometric transform applied by a rule.
///
/// Names follow what happens to the picture: `Horizontal` mirrors left-right,
/// `Vertical` mirrors top-bottom. The numpy script this job replaces reversed
/// `axis=1` in its `hflip` and `axis=0` in its `vflip`, which on an `(N, H, W, C)`
/// array is the other way round, so its "horizontal" copies were top-bottom mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlipKind {
    /// Mirror left-right (reverse each row).
    Horizontal,
    /// Mirror top-bottom (reverse row order).
    Vertical,
    /// Both mirrors, i.e. a half turn.
    Both,
}

impl FlipKind {
    /// Returns a flipped copy of one interleaved sample.
    pub fn apply<T: Copy>(&self, pixels: &[T], dims: ImageDims) -> Vec<T> {
        let width = dims.width as usize;
        let height = dims.height as usize;
        let channels = dims.channels as usize;
        let row_len = dims.row_len();
        let mut out = Vec::with_capacity(pixels.len());

        for y in 0..height {
            let src_y = match self {
                FlipKind::Horizontal => y,
                FlipKind::Vertical | FlipKind::Both => height - 1 - y,
            };
            let row = &pixels[src_y * row_len..(src_y + 1) * row_len];
            match self {
                FlipKind::Vertical => out.extend_from_slice(row),
                FlipKind::Horizontal | FlipKind::Both => {
                    for x in (0..width).rev() {
                        out.extend_from_slice(&row[x * channels..(x + 1) * channels]);
                    }
                }
            }
        }
        out
    }
}

/// Produce a `kind` mirror of every sample labelled `source`, labelled `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipRule {
    pub kind: FlipKind,
    pub source: u32,
    pub target: u32,
}

impl FlipRule {
    pub fn same_class(kind: FlipKind, class_id: u32) -> Self {
        Self {
            kind,
            source: class_id,
            target: class_id,
        }
    }

    pub fn relabels(&self) -> bool {
        self.source != self.target
    }
}

/// An ordered table of flip rules. For a given class, rules fire in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlipRules {
    rules: Vec<FlipRule>,
}

/// Left-right symmetric signs.
const HORIZONTAL: [u32; 10] = [11, 12, 13, 15, 17, 18, 22, 26, 30, 35];
/// Top-bottom symmetric signs.
const VERTICAL: [u32; 5] = [1, 5, 12, 15, 17];
/// Signs that only survive a half turn.
const HALF_TURN: [u32; 2] = [32, 40];
/// Mirror pairs: a left-right flip of `.0` is a valid `.1`.
const MIRROR_PAIRS: [(u32, u32); 8] = [
    (19, 20),
    (33, 34),
    (36, 37),
    (38, 39),
    (20, 19),
    (34, 33),
    (37, 36),
    (39, 38),
];

impl FlipRules {
    pub fn new(rules: Vec<FlipRule>) -> Self {
        Self { rules }
    }

    /// The symmetry table for the 43-class German traffic-sign benchmark.
    pub fn traffic_signs() -> Self {
        let mut rules = Vec::new();
        rules.extend(
            HORIZONTAL
                .iter()
                .map(|&c| FlipRule::same_class(FlipKind::Horizontal, c)),
        );
        rules.extend(
            VERTICAL
                .iter()
                .map(|&c| FlipRule::same_class(FlipKind::Vertical, c)),
        );
        rules.extend(
            HALF_TURN
                .iter()
                .map(|&c| FlipRule::same_class(FlipKind::Both, c)),
        );
        rules.extend(MIRROR_PAIRS.iter().map(|&(source, target)| FlipRule {
            kind: FlipKind::Horizontal,
            source,
            target,
        }));
        Self { rules }
    }

    pub fn rules(&self) -> &[FlipRule] {
        &self.rules
    }

    /// Rules whose source is `class_id`, in table order.
    pub fn rules_for(&self, class_id: u32) -> impl Iterator<Item = &FlipRule> + '_ {
        self.rules.iter().filter(move |r| r.source == class_id)
    }

    /// Largest class id mentioned anywhere in the table.
    pub fn max_class(&self) -> Option<u32> {
        self.rules
            .iter()
            .map(|r| r.source.max(r.target))
            .max()
    }
}

/// Counts of the copies produced by `augment_by_flip`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlipSummary {
    pub originals: usize,
    pub added: usize,
    pub by_kind: BTreeMap<FlipKind, usize>,
    /// Copies whose label differs from the source sample.
    pub relabelled: usize,
    /// Copies added per source class.
    pub by_class: BTreeMap<u32, usize>,
}

impl FlipSummary {
    pub fn total(&self) -> usize {
        self.originals + self.added
    }
}

/// Appends flipped copies of every sample whose class has a rule. Classes at or
/// above `num_classes` are never visited. The input batch is consumed and grown
/// in place.
pub fn augment_by_flip<T: Copy>(
    mut batch: SampleBatch<T>,
    rules: &FlipRules,
    num_classes: u32,
) -> PrepResult<(SampleBatch<T>, FlipSummary)> {
    let dims = batch.dims();
    let mut summary = FlipSummary {
        originals: batch.len(),
        ..Default::default()
    };

    let mut members: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (index, &class_id) in batch.class_ids().iter().enumerate() {
        members.entry(class_id).or_default().push(index);
    }

    let mut flipped = SampleBatch::new(dims);
    for class_id in 0..num_classes {
        let Some(indices) = members.get(&class_id) else {
            continue;
        };
        for rule in rules.rules_for(class_id) {
            for &index in indices {
                if let Some(pixels) = batch.sample(index) {
                    flipped.push(&rule.kind.apply(pixels, dims), rule.target)?;
                }
            }
            *summary.by_kind.entry(rule.kind).or_default() += indices.len();
            *summary.by_class.entry(class_id).or_default() += indices.len();
            if rule.relabels() {
                summary.relabelled += indices.len();
            }
            summary.added += indices.len();
        }
    }

    debug!(
        originals = summary.originals,
        added = summary.added,
        relabelled = summary.relabelled,
        "flip augmentation"
    );

    batch.extend(flipped)?;
    Ok((batch, summary))
}
