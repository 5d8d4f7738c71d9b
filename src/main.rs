use anyhow::Context;
use clap::{Parser, Subcommand};
use signprep::core_modules::archive;
use signprep::core_modules::labels::class_histogram;
use signprep::{PrepPipeline, Settings, SplitReport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "signprep", version, about = "Prepare traffic-sign crops for classifier training")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Crop, equalize, augment and archive both dataset splits.
    Run {
        /// TOML settings file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Root of the training annotation tree.
        #[arg(long)]
        train_root: Option<PathBuf>,
        /// Root of the test annotation tree.
        #[arg(long)]
        test_root: Option<PathBuf>,
        /// Destination of the training archive.
        #[arg(long)]
        train_out: Option<PathBuf>,
        /// Destination of the test archive.
        #[arg(long)]
        test_out: Option<PathBuf>,
        /// Seed for the training shuffle.
        #[arg(long)]
        seed: Option<u64>,
        /// Worker threads (defaults to one per CPU).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print the shape and class histogram of an archive.
    Inspect {
        /// Archive written by `run`.
        archive: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            train_root,
            test_root,
            train_out,
            test_out,
            seed,
            workers,
        } => {
            let mut settings = Settings::load(config.as_deref()).context("loading settings")?;
            if let Some(root) = train_root {
                settings.dataset.train_root = root;
            }
            if let Some(root) = test_root {
                settings.dataset.test_root = root;
            }
            if let Some(out) = train_out {
                settings.output.train_archive = out;
            }
            if let Some(out) = test_out {
                settings.output.test_archive = out;
            }
            if seed.is_some() {
                settings.output.seed = seed;
            }
            if workers.is_some() {
                settings.processing.workers = workers;
            }

            let report = PrepPipeline::new(settings)?.run().context("preparation run failed")?;
            print_split(&report.train);
            print_split(&report.test);
            if !report.previews.is_empty() {
                println!("previews: {} files", report.previews.len());
            }
        }
        Command::Inspect { archive: path } => {
            let archive = archive::load(&path)
                .with_context(|| format!("reading archive {}", path.display()))?;
            println!("split: {}", archive.split.as_str());
            println!(
                "{} {:?} ({})",
                archive.split.bboxes_key(),
                archive.bboxes.shape(),
                archive.bboxes.dtype()
            );
            println!("{} {:?}", archive.split.class_ids_key(), archive.class_ids.shape());
            let histogram = class_histogram(archive.bboxes.class_ids(), archive.class_ids.num_classes());
            for (class_id, count) in histogram.iter().enumerate().filter(|(_, c)| **c > 0) {
                println!("  class {class_id:>2}: {count}");
            }
        }
    }
    Ok(())
}

fn print_split(report: &SplitReport) {
    println!(
        "{}: {} rows from {} files -> {:?} {} ({} bytes at {})",
        report.split.as_str(),
        report.parsed,
        report.annotation_files,
        report.bboxes_shape,
        report.dtype,
        report.archive_bytes,
        report.archive_path.display()
    );
    if let Some(flips) = &report.flips {
        println!(
            "  flip augmentation: +{} samples ({} relabelled)",
            flips.added, flips.relabelled
        );
    }
}
