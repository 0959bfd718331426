//! Statgen CLI Binary
//!
//! Drives the statistics generator over synthetic images and ROIs and prints the
//! cached results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;
use statgen::config::{ConfigLoader, StatgenConfig};
use statgen::generation::{GeneratorEvent, GENERATION_STATUS_PROPERTY};
use statgen::logging::{init_logging, LoggingConfig};
use statgen::statistics::{Image, MaskImage, PlanarFigure, StatisticsContainer};
use statgen::store::{DataKind, Predicate};
use statgen::{Entry, EntryData, ImageStatisticsGenerator, ObjectStore};
use std::path::PathBuf;
use std::process;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "statgen", version, about = "Cached image statistics generation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate statistics for synthetic images and print the cached results
    Run {
        /// Number of synthetic images
        #[arg(long, default_value_t = 2)]
        images: usize,

        /// Edge length of each cubic image
        #[arg(long, default_value_t = 16)]
        size: usize,

        /// Histogram bins (overrides configuration)
        #[arg(long)]
        bins: Option<u32>,

        /// Exclude zero-valued voxels
        #[arg(long)]
        ignore_zero: bool,

        /// Skip the mask and planar figure ROIs
        #[arg(long)]
        no_rois: bool,

        /// Also compute whole-image statistics when ROIs are selected
        #[arg(long)]
        whole_image: bool,

        /// Modify the first image afterwards and regenerate
        #[arg(long)]
        touch: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    let logging_config = build_logging_config(&cli, &config);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Statgen CLI starting");

    let result = match &cli.command {
        Commands::Run {
            images,
            size,
            bins,
            ignore_zero,
            no_rois,
            whole_image,
            touch,
            json,
        } => run(
            &config,
            RunOptions {
                images: *images,
                size: *size,
                bins: *bins,
                ignore_zero: *ignore_zero,
                rois: !*no_rois,
                whole_image: *whole_image,
                touch: *touch,
                json: *json,
            },
        ),
        Commands::Config => toml::to_string_pretty(&config).context("Failed to render configuration"),
    };

    match result {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<StatgenConfig> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigLoader::load(&cli.workspace).context("Failed to load configuration")?,
    };
    Ok(config)
}

/// Logging configuration from the config file, overridden by CLI arguments
fn build_logging_config(cli: &Cli, config: &StatgenConfig) -> LoggingConfig {
    if !cli.verbose {
        return LoggingConfig {
            level: "off".to_string(),
            ..LoggingConfig::default()
        };
    }

    let mut logging = config.logging.clone();
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        logging.format = format.clone();
    }
    if let Some(output) = &cli.log_output {
        logging.output = output.clone();
    }
    if let Some(file) = &cli.log_file {
        logging.file = file.clone();
    }
    logging
}

struct RunOptions {
    images: usize,
    size: usize,
    bins: Option<u32>,
    ignore_zero: bool,
    rois: bool,
    whole_image: bool,
    touch: bool,
    json: bool,
}

fn run(config: &StatgenConfig, options: RunOptions) -> Result<String> {
    if options.images == 0 || options.size == 0 {
        bail!("--images and --size must be positive");
    }

    let store = Arc::new(ObjectStore::new());
    let dims = [options.size; 3];
    let center = options.size as f64 / 2.0;

    let images: Vec<_> = (0..options.images)
        .map(|i| {
            let scale = (i + 1) as f64;
            let image = Image::from_fn(dims, |x, y, z| {
                let r = ((x as f64 - center).powi(2) + (y as f64 - center).powi(2)).sqrt();
                ((r + z as f64) * scale).floor()
            });
            store.add(Entry::new(format!("image-{}", i + 1), EntryData::Image(Arc::new(image))))
        })
        .collect();

    let mut rois = Vec::new();
    if options.rois {
        let radius = center / 2.0;
        let mask = MaskImage::from_fn(dims, |x, y, z| {
            let d = (x as f64 - center).powi(2) + (y as f64 - center).powi(2) + (z as f64 - center).powi(2);
            d <= radius * radius
        });
        rois.push(Some(store.add(Entry::new("sphere", EntryData::Mask(Arc::new(mask))))));

        let figure = PlanarFigure::rectangle(options.size / 2, 0.0, 0.0, center, center);
        rois.push(Some(store.add(Entry::new(
            "quadrant",
            EntryData::PlanarFigure(Arc::new(figure)),
        ))));
        if options.whole_image {
            rois.push(None);
        }
    }

    let mut generator = ImageStatisticsGenerator::with_store(Some(Arc::clone(&store)), &config.generator)?;
    if let Some(bins) = options.bins {
        generator.set_histogram_bins(bins);
    }
    if options.ignore_zero {
        generator.set_ignore_zero_voxel(true);
    }
    let events = generator.subscribe();
    generator.set_image_nodes(images.clone());
    generator.set_roi_nodes(rois);

    let timeout = config.generator.wait_timeout();
    generator.generate()?;
    generator.wait_for_generation_finished(timeout)?;

    if options.touch {
        store.touch(images[0])?;
        generator.generate()?;
        generator.wait_for_generation_finished(timeout)?;
    }

    let event_log = describe_events(&events);
    let stats = generator.stats();
    info!(
        dispatched = stats.dispatched,
        completed = stats.completed,
        failed = stats.failed,
        "Generation done"
    );

    let results = final_statistics(&store);
    if options.json {
        let rows: Vec<_> = results
            .iter()
            .map(|(name, stats)| serde_json::json!({ "name": name, "statistics": stats.as_ref() }))
            .collect();
        return serde_json::to_string_pretty(&rows).context("Failed to render results");
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Artifact", "Voxels", "Min", "Max", "Mean", "Std dev"]);
    for (name, s) in &results {
        table.add_row(vec![
            name.clone(),
            s.voxel_count.to_string(),
            format!("{:.2}", s.min),
            format!("{:.2}", s.max),
            format!("{:.3}", s.mean),
            format!("{:.3}", s.std_dev),
        ]);
    }

    Ok(format!(
        "{}\n{}\n\n{}\n{}\n\n{} dispatched, {} completed, {} failed",
        "Events".bold(),
        event_log,
        "Statistics".bold(),
        table,
        stats.dispatched,
        stats.completed,
        stats.failed
    ))
}

fn describe_events(events: &Receiver<GeneratorEvent>) -> String {
    events
        .try_iter()
        .map(|event| match &event {
            GeneratorEvent::GenerationStarted { source, roi, job } => format!(
                "  {} {} source {} roi {}",
                event.name().cyan(),
                job,
                source,
                roi.map_or("-".to_string(), |r| r.to_string())
            ),
            GeneratorEvent::NewDataAvailable { entries } => {
                format!("  {} {} entries", event.name().green(), entries.len())
            }
            GeneratorEvent::GenerationFinished => format!("  {}", event.name().green().bold()),
            GeneratorEvent::JobError { message, job } => {
                format!("  {} {} {}", event.name().red(), job, message)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Final statistics artifacts by name
fn final_statistics(store: &ObjectStore) -> Vec<(String, Arc<StatisticsContainer>)> {
    let predicate = Predicate::and([
        Predicate::kind_is(DataKind::Statistics),
        Predicate::not(Predicate::has_property(GENERATION_STATUS_PROPERTY)),
    ]);
    let mut results: Vec<_> = store
        .query(&predicate)
        .into_iter()
        .filter_map(|entry| match entry.data {
            EntryData::Statistics(stats) => Some((entry.name, stats)),
            _ => None,
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}
