//! Directory mode: every `.nii` / `.nii.gz` in the input directory.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use loci_metrics::{MetricResult, VolumeSource};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::runner::{nifti_stem, Backend, FileReport, Job, Runner};
use crate::settings::Settings;

/// Locations and provenance of one batch run.
pub struct BatchRequest<'a> {
    pub input_dir: &'a Path,
    pub output_dir: &'a Path,
    pub config_path: &'a Path,
    pub command_line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
}

fn is_nifti(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// NIfTI files directly inside `dir`, sorted by name.
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() && is_nifti(&entry.path()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn prepare_output(dir: &Path, quantify_only: bool) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            bail!("output path is not a directory: {}", dir.display());
        }
        // written volumes would overwrite earlier runs
        if !quantify_only && std::fs::read_dir(dir)?.next().is_some() {
            bail!("output directory must be empty when volumes are written: {}", dir.display());
        }
        Ok(())
    } else {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local wall-clock time for `batch_info.txt`.
fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `Filename,Metric,<value columns>,SUVr`; columns are the union of all value keys.
pub fn format_results(rows: &[(String, Vec<MetricResult>)]) -> String {
    let keys: BTreeSet<&str> = rows
        .iter()
        .flat_map(|(_, results)| results.iter())
        .flat_map(|r| r.values.keys().map(String::as_str))
        .collect();

    let mut csv = String::from("Filename,Metric");
    for key in &keys {
        let _ = write!(csv, ",{}", key);
    }
    csv.push_str(",SUVr\n");

    for (filename, results) in rows {
        for result in results {
            let _ = write!(csv, "{},{}", filename, result.metric_name);
            for key in &keys {
                match result.values.get(*key) {
                    Some(value) => {
                        let _ = write!(csv, ",{}", value);
                    }
                    None => csv.push(','),
                }
            }
            match result.ratio {
                Some(ratio) => {
                    let _ = writeln!(csv, ",{}", ratio);
                }
                None => csv.push_str(",\n"),
            }
        }
    }
    csv
}

/// Process the directory in parallel, one pipeline per worker thread.
pub fn run_batch(
    request: &BatchRequest<'_>,
    settings: &Settings,
    job: &Job,
    source: Arc<dyn VolumeSource<Backend>>,
) -> Result<BatchSummary> {
    if !request.input_dir.is_dir() {
        bail!("input directory does not exist: {}", request.input_dir.display());
    }
    prepare_output(request.output_dir, !job.writes_volumes())?;

    let inputs = collect_inputs(request.input_dir)?;
    if inputs.is_empty() {
        warn!(dir = %request.input_dir.display(), "no .nii or .nii.gz files found");
        return Ok(BatchSummary { processed: 0, failed: 0 });
    }
    info!(files = inputs.len(), "batch processing");

    let info_path = request.output_dir.join("batch_info.txt");
    let mut batch_info = File::create(&info_path).with_context(|| format!("failed to create {}", info_path.display()))?;
    writeln!(batch_info, "Software Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(batch_info, "Command: {}", request.command_line)?;
    writeln!(batch_info, "Start Time: {}", timestamp())?;
    writeln!(batch_info, "Config Path: {}", request.config_path.display())?;
    writeln!(batch_info, "Input Directory: {}", request.input_dir.display())?;
    writeln!(batch_info, "Output Directory: {}", request.output_dir.display())?;

    let progress = ProgressBar::new(inputs.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let started = Instant::now();
    let outcomes: Vec<(PathBuf, Result<FileReport>)> = inputs
        .par_iter()
        .map_init(
            || Runner::new(settings, job.clone(), source.clone()),
            |runner, input| {
                let output = job.writes_volumes().then(|| {
                    let stem = nifti_stem(Path::new(input.file_name().unwrap_or_default()));
                    let mut name = stem.into_os_string();
                    name.push("_processed.nii");
                    request.output_dir.join(name)
                });
                let outcome = match runner {
                    Ok(runner) => runner.process(input, output.as_deref()),
                    Err(e) => Err(anyhow::anyhow!("pipeline setup failed: {:#}", e)),
                };
                progress.set_message(display_name(input));
                progress.inc(1);
                (input.clone(), outcome)
            },
        )
        .collect();
    progress.finish_with_message("done");

    let mut rows = Vec::new();
    let mut summary = BatchSummary { processed: 0, failed: 0 };
    for (input, outcome) in outcomes {
        let name = display_name(&input);
        match outcome {
            Ok(report) => {
                for failure in &report.failures {
                    warn!(file = %name, failure = %failure, "metric failed");
                    writeln!(batch_info, "Failed: {} - {}", name, failure)?;
                }
                if report.failures.is_empty() {
                    summary.processed += 1;
                } else {
                    summary.failed += 1;
                }
                let mut results = report.results;
                results.extend(report.decoupled.as_ref().map(|d| d.to_metric_result()));
                rows.push((name, results));
            }
            Err(e) => {
                warn!(file = %name, error = %format!("{:#}", e), "file failed");
                writeln!(batch_info, "Failed: {} - {:#}", name, e)?;
                summary.failed += 1;
            }
        }
    }

    let csv_path = request.output_dir.join("results.csv");
    std::fs::write(&csv_path, format_results(&rows)).with_context(|| format!("failed to write {}", csv_path.display()))?;

    writeln!(batch_info, "End Time: {}", timestamp())?;
    writeln!(batch_info, "Elapsed: {:.1} s", started.elapsed().as_secs_f64())?;
    writeln!(batch_info, "Processed: {}, Failed: {}", summary.processed, summary.failed)?;

    info!(
        processed = summary.processed,
        failed = summary.failed,
        output = %request.output_dir.display(),
        "batch complete"
    );
    Ok(summary)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
