//! LULC CLI - land-cover classification and change detection

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lulc_algorithms::imagery::{changed_pixel_count, class_change, ndvi, CHANGE_NODATA};
use lulc_algorithms::statistics::{class_areas, AreaParams};
use lulc_core::io::{read_aoi, read_geotiff, write_geotiff, GeoTiffOptions};
use lulc_core::Raster;
use lulc_engine::{DirectoryAssetStore, DirectoryCatalog, ExportStatus, LocalEngine, Workflow, WorkflowConfig};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "lulc")]
#[command(author, version, about = "Land-cover classification and change detection", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the two-period classification workflow
    Run {
        /// Workflow configuration (TOML); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Scene catalog root
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Labelled asset root
        #[arg(long)]
        assets: Option<PathBuf>,
        /// Output root for rendered layers and exports
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Random forest seed
        #[arg(long)]
        seed: Option<u64>,
        /// Skip writing rendered layers
        #[arg(long)]
        no_render: bool,
        /// Skip export tasks
        #[arg(long)]
        no_export: bool,
    },
    /// Write the default workflow configuration
    Init {
        /// Output TOML file
        output: PathBuf,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// NDVI from near-infrared and red bands
    Ndvi {
        /// Near-infrared band
        #[arg(long)]
        nir: PathBuf,
        /// Red band
        #[arg(long)]
        red: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Change mask between two classified rasters
    Change {
        /// Earlier classification
        #[arg(long)]
        before: PathBuf,
        /// Later classification
        #[arg(long)]
        after: PathBuf,
        /// Output file (1 change, 0 no change, 255 nodata)
        output: PathBuf,
    },
    /// Area in hectares of each class of a classified raster
    Areas {
        /// Classified raster
        input: PathBuf,
        /// Class values to report, comma separated
        #[arg(long, value_delimiter = ',', default_value = "0,1,2,3")]
        classes: Vec<i32>,
        /// Region to restrict the sums to (GeoJSON polygons)
        #[arg(long)]
        aoi: Option<PathBuf>,
        /// Reduction scale in meters
        #[arg(short, long)]
        scale: Option<f64>,
        /// Maximum pixels visited
        #[arg(long, default_value = "1000000000")]
        max_pixels: u64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_f64(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> =
        read_geotiff(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_classes(path: &Path) -> Result<Raster<i32>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<i32> =
        read_geotiff(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    Ok(raster)
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn load_config(
    path: Option<PathBuf>,
    catalog: Option<PathBuf>,
    assets: Option<PathBuf>,
    output: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<WorkflowConfig> {
    let mut config = match path {
        Some(p) => WorkflowConfig::from_file(&p)
            .with_context(|| format!("Failed to load configuration {}", p.display()))?,
        None => WorkflowConfig::default(),
    }
    .apply_env();

    if let Some(c) = catalog {
        config.catalog_root = c;
    }
    if let Some(a) = assets {
        config.asset_root = a;
    }
    if let Some(o) = output {
        config.render.output = Some(o.join("render"));
        config.export.root = o.join("exports");
    }
    if let Some(s) = seed {
        config.classifier.seed = s;
    }
    Ok(config)
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            config,
            catalog,
            assets,
            output,
            seed,
            no_render,
            no_export,
        } => {
            let mut config = load_config(config, catalog, assets, output, seed)?;
            if no_render {
                config.render.output = None;
            }
            let start = Instant::now();
            let engine = LocalEngine::new(
                DirectoryCatalog::new(&config.catalog_root),
                DirectoryAssetStore::new(&config.asset_root),
            );
            let workflow = Workflow::new(config).context("Invalid workflow configuration")?;

            let pb = spinner("Evaluating workflow...");
            let report = workflow.evaluate(&engine);
            pb.finish_and_clear();
            let report = report.context("Workflow evaluation failed")?;
            println!("{report}");

            let pb = spinner("Rendering layers...");
            let rendered = workflow.write_render(&engine, &report);
            pb.finish_and_clear();
            let rendered = rendered.context("Rendering failed")?;
            if let Some(dir) = &workflow.config().render.output {
                println!("Rendered {} files to: {}", rendered.len(), dir.display());
            }

            let mut failed = 0;
            if !no_export {
                let pb = spinner("Running exports...");
                let outcomes = workflow.export(&engine);
                pb.finish_and_clear();
                for (description, status) in &outcomes {
                    match status {
                        ExportStatus::Completed(paths) => {
                            for p in paths {
                                println!("Export '{}' saved to: {}", description, p.display());
                            }
                        }
                        ExportStatus::Failed(reason) => {
                            failed += 1;
                            println!("Export '{}' failed: {}", description, reason);
                        }
                        ExportStatus::Pending => {}
                    }
                }
            }
            println!("  Processing time: {:.2?}", start.elapsed());
            if failed > 0 {
                anyhow::bail!("{} export task(s) failed", failed);
            }
        }

        Commands::Init { output } => {
            let text = WorkflowConfig::default().to_toml()?;
            std::fs::write(&output, text)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Configuration written to: {}", output.display());
        }

        Commands::Info { input } => {
            let raster = read_f64(&input)?;
            let (rows, cols) = raster.shape();
            let (min_x, min_y, max_x, max_y) = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!("Bounds: ({:.4}, {:.4}) - ({:.4}, {:.4})", min_x, min_y, max_x, max_y);
            match raster.crs() {
                Some(crs) => println!("CRS: {}", crs.identifier()),
                None => println!("CRS: unknown"),
            }
            println!(
                "Valid cells: {} (nodata: {})",
                stats.valid_count, stats.nodata_count
            );
            if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
                println!("Min: {:.4}  Max: {:.4}  Mean: {:.4}", min, max, mean);
            }
        }

        Commands::Ndvi { nir, red, output } => {
            let nir = read_f64(&nir)?;
            let red = read_f64(&red)?;
            let start = Instant::now();
            let result = ndvi(&nir, &red).context("NDVI failed")?;
            let elapsed = start.elapsed();
            write_geotiff(&result, &output, Some(GeoTiffOptions::default()))
                .context("Failed to write output")?;
            done("NDVI", &output, elapsed);
        }

        Commands::Change { before, after, output } => {
            let before = read_classes(&before)?;
            let after = read_classes(&after)?;
            let start = Instant::now();
            let mask = class_change(&before, &after).context("Change detection failed")?;
            let elapsed = start.elapsed();
            println!("Changed pixels: {}", changed_pixel_count(&mask));
            write_geotiff(
                &mask,
                &output,
                Some(GeoTiffOptions {
                    nodata: Some(f64::from(CHANGE_NODATA)),
                }),
            )
            .context("Failed to write output")?;
            done("Change mask", &output, elapsed);
        }

        Commands::Areas {
            input,
            classes,
            aoi,
            scale,
            max_pixels,
        } => {
            let raster = read_classes(&input)?;
            let region = aoi
                .map(|p| read_aoi(&p).with_context(|| format!("Failed to read {}", p.display())))
                .transpose()?;
            let report = class_areas(
                &raster,
                &classes,
                region.as_ref(),
                &AreaParams { scale, max_pixels },
            )
            .context("Area aggregation failed")?;
            println!("{:>8} {:>14}", "class", "hectares");
            for (class, ha) in report.table.iter() {
                println!("{:>8} {:>14.4}", class, ha);
            }
            println!("{:>8} {:>14.4}", "total", report.table.total());
            for w in &report.warnings {
                println!("warning: {}", w);
            }
        }
    }

    Ok(())
}
