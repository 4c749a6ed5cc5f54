//! # proespm_cli
//!
//! Part of the proespm crate family.
//!
//! Command line front end: decodes every measurement in a data directory and writes a
//! static HTML report next to it.
//!
//! ## Use
//!
//! ```bash
//! proespm_cli /path/to/data -c viridis -s 1 -e 99
//! proespm_cli -p config.yaml
//! proespm_cli new -p config.yaml
//! ```
//!
//! Command line arguments override the values read from a configuration file.
use clap::{value_parser, Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;

use libproespm::colormap::Colormap;
use libproespm::config::Config;
use libproespm::process::process;
use libproespm::worker_status::Stage;

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

/// Log everything the library reports into a file next to the report
fn init_file_logger(path: &Path) -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(path)
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn main() {
    let colormap_names: Vec<&str> = Colormap::ALL.iter().map(|map| map.name()).collect();
    // Create a cli
    let matches = Command::new("proespm_cli")
        .about("Process scanning probe, spectroscopy and electrochemistry data into a report")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(Arg::new("data").help("Directory containing the measurement files"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to a configuration yaml file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Path of the HTML report"),
        )
        .arg(
            Arg::new("colormap")
                .short('c')
                .long("colormap")
                .help(format!("Colormap for images, one of {}", colormap_names.join(", "))),
        )
        .arg(
            Arg::new("start")
                .short('s')
                .long("start")
                .value_parser(value_parser!(f64))
                .help("Lower percentile of the colour range"),
        )
        .arg(
            Arg::new("end")
                .short('e')
                .long("end")
                .value_parser(value_parser!(f64))
                .help("Upper percentile of the colour range"),
        )
        .arg(
            Arg::new("labjournal")
                .short('l')
                .long("labjournal")
                .help("CSV labjournal with an ID column"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    let config_path = matches.get_one::<String>("path").map(PathBuf::from);

    if let Some(("new", _)) = matches.subcommand() {
        match config_path {
            Some(path) => {
                log::info!("Making a template config at {}...", path.to_string_lossy());
                make_template_config(&path);
            }
            None => log::error!("The new subcommand needs a path given with -p"),
        }
        return;
    }

    // Load our config
    let mut config = match &config_path {
        Some(path) => {
            log::info!("Loading config from {}...", path.to_string_lossy());
            match Config::read_config_file(path) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("{e}");
                    std::process::exit(1);
                }
            }
        }
        None => Config::default(),
    };

    if let Some(data) = matches.get_one::<String>("data") {
        config.data_path = PathBuf::from(data);
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output_path = Some(PathBuf::from(output));
    }
    if let Some(colormap) = matches.get_one::<String>("colormap") {
        config.colormap = colormap.clone();
    }
    if let Some(start) = matches.get_one::<f64>("start") {
        config.colorrange.0 = *start;
    }
    if let Some(end) = matches.get_one::<f64>("end") {
        config.colorrange.1 = *end;
    }
    if let Some(labjournal) = matches.get_one::<String>("labjournal") {
        config.labjournal_path = Some(PathBuf::from(labjournal));
    }

    if let Err(e) = config.validate() {
        log::error!("{e}");
        std::process::exit(1);
    }
    log::info!("Data Path: {}", config.data_path.to_string_lossy());
    log::info!("Report Path: {}", config.report_path().to_string_lossy());
    log::info!("Colormap: {}", config.colormap);
    log::info!(
        "Colour range: {} - {}",
        config.colorrange.0,
        config.colorrange.1
    );

    let log_path = config.log_path();
    if let Err(e) = init_file_logger(&log_path) {
        log::warn!("Could not open log file {}: {e}", log_path.to_string_lossy());
    }
    spdlog::info!("Starting proespm on {:?}", config.data_path);

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template("{prefix:>9} [{bar:40}] {pos:>3}% {msg}") {
        pb.set_style(style);
    }
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = stop.clone();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(&config, &tx, &worker_stop));

    let mut failed = false;
    loop {
        std::thread::sleep(std::time::Duration::from_millis(100));
        for status in rx.try_iter() {
            let prefix = match status.stage {
                Stage::Dispatch => "Decoding",
                Stage::Process => "Rendering",
                Stage::Report => "Report",
            };
            pb.set_prefix(prefix);
            pb.set_position((status.progress * 100.0) as u64);
            pb.set_message(status.current);
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(summary) => log::info!(
                        "Processed {} measurements from {} files ({} skipped, {} failed)",
                        summary.measurements,
                        summary.files,
                        summary.skipped,
                        summary.failed
                    ),
                    Err(e) => {
                        failed = true;
                        log::error!("Processing failed with error: {e}");
                    }
                },
                Err(_) => {
                    failed = true;
                    log::error!("Failed to join processing task!");
                }
            }
            break;
        }
    }

    pb.finish();
    if failed {
        log::error!("See {} for details", log_path.to_string_lossy());
        std::process::exit(1);
    }
    log::info!("Done.");
}
