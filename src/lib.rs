// THEORY:
// This file is the entry point for the `signprep` library crate. It exposes the
// `PrepPipeline` and its `Settings` as the high-level interface for turning an
// annotated traffic-sign photo collection into training and test archives.
//
// The individual stages (`core_modules`) stay public so that tools and tests can
// run any one of them on its own: parse a CSV, crop a batch, equalize it, flip
// it, or open an archive written by an earlier run.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use crate::config::Settings;
pub use core_modules::archive::{Archive, PixelData, Split};
pub use core_modules::augment::{FlipKind, FlipRule, FlipRules, FlipSummary};
pub use core_modules::sample::{ChannelOrder, ImageDims, SampleBatch};
pub use error::{PrepError, PrepResult};
pub use pipeline::{PrepPipeline, PrepReport, SplitReport};
