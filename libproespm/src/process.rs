use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use super::config::Config;
use super::dispatch::{import_files, Dispatcher};
use super::error::{DispatchError, ProcessorError};
use super::labjournal::{attach_labjournal, CsvLabjournal};
use super::measurement::{ErrorRecord, Measurement};
use super::render::{PlotRenderer, PngRenderer};
use super::report::{ReportTemplater, StaticHtmlReport};
use super::worker_status::{Stage, WorkerStatus};

/// Counts reported at the end of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub files: usize,
    pub measurements: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stopped: bool,
}

/// Dispatch every file in order.
///
/// Decode failures are logged and the batch continues. An EC4 continuation without a
/// primary aborts the batch.
pub fn create_measurements(
    files: &[PathBuf],
    tx: &Sender<WorkerStatus>,
    stop: &AtomicBool,
    summary: &mut BatchSummary,
) -> Result<Vec<Measurement>, ProcessorError> {
    let mut dispatcher = Dispatcher::new();
    let total = files.len().max(1) as f32;
    tx.send(WorkerStatus::new(0.0, Stage::Dispatch, ""))?;
    for (idx, path) in files.iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            spdlog::warn!("Stop requested, dispatched {idx} of {} files", files.len());
            summary.stopped = true;
            break;
        }
        summary.files += 1;
        match dispatcher.dispatch(path) {
            Ok(Some(_)) => (),
            Ok(None) => summary.skipped += 1,
            Err(DispatchError::Decode { path, source }) => {
                spdlog::error!("Could not decode {path:?}: {source}");
                summary.failed += 1;
            }
            Err(e) => return Err(e.into()),
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        tx.send(WorkerStatus::new(
            (idx + 1) as f32 / total,
            Stage::Dispatch,
            &name,
        ))?;
    }
    Ok(dispatcher.into_measurements())
}

/// Order the records by acquisition time, number the slides and process each record.
///
/// Slide numbers start at 1 and follow the time order. A record that fails to render is
/// replaced by an error record and counted as failed. Records left unprocessed by a
/// stop request are dropped. Returns the number of records kept.
pub fn process_loop(
    measurements: &mut Vec<Measurement>,
    config: &Config,
    renderer: &mut dyn PlotRenderer,
    tx: &Sender<WorkerStatus>,
    stop: &AtomicBool,
    summary: &mut BatchSummary,
) -> Result<usize, ProcessorError> {
    measurements.sort_by_key(|m| m.timestamp());

    let mut slide_num = 0;
    for measurement in measurements.iter_mut().filter(|m| m.is_slide()) {
        slide_num += 1;
        measurement.set_slide_num(slide_num);
    }

    let total = measurements.len().max(1) as f32;
    let mut processed = 0;
    for measurement in measurements.iter_mut() {
        if stop.load(Ordering::Relaxed) {
            spdlog::warn!("Stop requested after {processed} measurements");
            break;
        }
        match measurement.process(config, renderer) {
            Ok(()) => spdlog::info!("Processed {} ({})", measurement.id(), measurement.ident()),
            Err(e) => {
                spdlog::error!("Could not render {} ({}): {e}", measurement.id(), measurement.ident());
                summary.failed += 1;
                *measurement = Measurement::Error(ErrorRecord {
                    info: measurement.info().clone(),
                    reason: e.to_string(),
                });
            }
        }
        processed += 1;
        tx.send(WorkerStatus::new(
            processed as f32 / total,
            Stage::Process,
            measurement.id(),
        ))?;
    }
    measurements.truncate(processed);
    Ok(processed)
}

/// Run the whole pipeline for one data directory and write the report
pub fn process(
    config: &Config,
    tx: &Sender<WorkerStatus>,
    stop: &AtomicBool,
) -> Result<BatchSummary, ProcessorError> {
    config.validate()?;
    let mut summary = BatchSummary::default();

    let files = import_files(&config.data_path)?;
    let total_size: u64 = files
        .iter()
        .filter_map(|path| path.metadata().ok())
        .map(|meta| meta.len())
        .sum();
    spdlog::info!(
        "Found {} files in {:?} with total size: {}",
        files.len(),
        config.data_path,
        human_bytes::human_bytes(total_size as f64)
    );

    let mut measurements = create_measurements(&files, tx, stop, &mut summary)?;

    if let Some(journal_path) = &config.labjournal_path {
        let journal = CsvLabjournal::new(journal_path)?;
        attach_labjournal(&mut measurements, &journal);
    }

    let mut renderer = PngRenderer::new(&config.assets_directory())?;
    let processed = process_loop(
        &mut measurements,
        config,
        &mut renderer,
        tx,
        stop,
        &mut summary,
    )?;
    summary.measurements = processed;
    summary.stopped |= stop.load(Ordering::Relaxed);

    tx.send(WorkerStatus::new(0.0, Stage::Report, &config.report_title()))?;
    StaticHtmlReport.render(&config.report_title(), &measurements, &config.report_path())?;
    tx.send(WorkerStatus::new(1.0, Stage::Report, &config.report_title()))?;

    spdlog::info!(
        "Done: {} files, {} measurements, {} skipped, {} failed",
        summary.files,
        summary.measurements,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}
