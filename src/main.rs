//! Terrain erosion CLI.
//!
//! Loads a grayscale heightmap, erodes it with one of the droplet models,
//! and writes the result back out as PNG or RAW.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use terrain_erosion::export::{
    export_heightfield_png, export_heightfield_raw, load_heightfield_png, PngExportOptions,
    RawFormat,
};
use terrain_erosion::{
    BatchStatus, DeviceTier, ErosionModel, HeightField, ModelKind, OffloadCoordinator, Scheduler,
    SchedulerConfig, SchedulerState, TimeBudget,
};

/// Droplet-based hydraulic erosion for heightmaps.
#[derive(Parser)]
#[command(name = "terrain-erosion")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Erode a heightmap.
    Erode {
        /// Input grayscale PNG. Must be square.
        input: PathBuf,

        /// Output file path.
        #[arg(short, long, default_value = "eroded.png")]
        output: PathBuf,

        /// Erosion model. Ignored when --config is given.
        #[arg(short, long, default_value = "ridge")]
        model: ModelArg,

        /// JSON model record, as printed by `defaults`.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the droplet count.
        #[arg(short, long)]
        iterations: Option<u32>,

        /// Override the random seed.
        #[arg(short, long)]
        seed: Option<u64>,

        /// Run incrementally under a frame budget, or as one background pass.
        #[arg(long, default_value = "batch")]
        mode: RunMode,

        /// Device tier used to pick the per-tick budget.
        #[arg(long, default_value = "desktop")]
        tier: TierArg,

        /// Per-tick budget in milliseconds. Overrides --tier.
        #[arg(long)]
        time_budget_ms: Option<u64>,

        /// Export format.
        #[arg(short, long, default_value = "png")]
        format: ExportFormat,
    },

    /// Print a model's default parameters as JSON.
    Defaults {
        /// Erosion model.
        #[arg(default_value = "ridge")]
        model: ModelArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    /// Inertial droplets with radial brushes.
    Ridge,
    /// Force-integrated particles.
    Physics,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Ridge => ModelKind::RidgeFollower,
            ModelArg::Physics => ModelKind::PhysicsBased,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RunMode {
    Interactive,
    Batch,
}

#[derive(Clone, Copy, ValueEnum)]
enum TierArg {
    Desktop,
    Mobile,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    /// 16-bit grayscale PNG.
    Png,
    /// 16-bit RAW (little-endian).
    Raw,
    /// 32-bit float RAW.
    RawFloat,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Erode {
            input,
            output,
            model,
            config,
            iterations,
            seed,
            mode,
            tier,
            time_budget_ms,
            format,
        } => {
            let model = load_model(config.as_deref(), model, iterations, seed);
            let tier = match tier {
                TierArg::Desktop => DeviceTier::Desktop,
                TierArg::Mobile => DeviceTier::Mobile,
            };
            let budget =
                time_budget_ms.map_or_else(|| TimeBudget::for_tier(tier), TimeBudget::from_millis);
            run_erode(&input, &output, model, mode, budget, format);
        }
        Commands::Defaults { model } => {
            let record = ErosionModel::default_for(model.into());
            match record.to_json_pretty() {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error serializing defaults: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn load_model(
    config: Option<&Path>,
    model: ModelArg,
    iterations: Option<u32>,
    seed: Option<u64>,
) -> ErosionModel {
    let mut record = match config {
        Some(path) => {
            let json = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading config {}: {}", path.display(), e);
                std::process::exit(1);
            });
            ErosionModel::from_json(&json).unwrap_or_else(|e| {
                eprintln!("Error parsing config: {}", e);
                std::process::exit(1);
            })
        }
        None => ErosionModel::default_for(model.into()),
    };

    if let Some(iterations) = iterations {
        record.set_iterations(iterations);
    }
    if let Some(seed) = seed {
        record.set_seed(seed);
    }
    record
}

fn run_erode(
    input: &Path,
    output: &Path,
    model: ErosionModel,
    mode: RunMode,
    budget: TimeBudget,
    format: ExportFormat,
) {
    println!("Terrain Erosion");
    println!("===============");
    println!("Input: {}", input.display());
    println!("Model: {}", model.kind().name());
    println!("Iterations: {}", model.iterations());

    let mut field = load_heightfield_png(input).unwrap_or_else(|e| {
        eprintln!("Error loading heightmap: {}", e);
        std::process::exit(1);
    });
    if !field.is_square() {
        eprintln!(
            "Error: heightmap must be square, got {}x{}",
            field.width(),
            field.height()
        );
        std::process::exit(1);
    }
    println!("Size: {}x{}", field.width(), field.height());
    let mass_before = field.total_mass();

    let mut scheduler = Scheduler::new(model.build(), SchedulerConfig { budget });
    let start = Instant::now();

    match mode {
        RunMode::Interactive => run_interactive(&mut scheduler, &mut field),
        RunMode::Batch => run_offloaded(&mut scheduler, &mut field),
    }

    println!("Erosion completed in {:.2?}", start.elapsed());
    let (min_h, max_h) = field.height_range();
    println!("Height range: [{:.4}, {:.4}]", min_h, max_h);
    println!("Mass change: {:+.4}", field.total_mass() - mass_before);

    export(&field, output, format);
}

fn run_interactive(scheduler: &mut Scheduler, field: &mut HeightField) {
    println!(
        "\nRunning interactively ({:?} per tick)...",
        scheduler.config().budget.per_tick
    );
    scheduler.start();

    let mut ticks = 0u32;
    let mut last_reported = -1i32;
    while scheduler.state() == SchedulerState::Running {
        if let Err(e) = scheduler.tick(field) {
            eprintln!("Error during erosion: {}", e);
            std::process::exit(1);
        }
        ticks += 1;

        let percent = scheduler.progress() as i32;
        if percent / 10 > last_reported / 10 {
            println!(
                "  {:>3}% ({}/{} droplets)",
                percent,
                scheduler.iterations_completed(),
                scheduler.iterations()
            );
            last_reported = percent;
        }
    }
    println!("  {} ticks", ticks);
}

fn run_offloaded(scheduler: &mut Scheduler, field: &mut HeightField) {
    println!("\nRunning batch on a background worker...");
    let mut coordinator = OffloadCoordinator::new();

    let mut last_reported = 0u32;
    let on_progress = move |done: u32, total: u32| {
        let percent = if total == 0 { 100 } else { done * 100 / total };
        if percent / 10 > last_reported / 10 || done == total {
            println!("  {:>3}% ({}/{} droplets)", percent, done, total);
            last_reported = percent;
        }
    };
    let on_complete = |field: &HeightField| {
        println!("  Merged {}x{} result", field.width(), field.height());
    };

    coordinator
        .run_batch(field, scheduler, on_progress, on_complete)
        .unwrap_or_else(|e| {
            eprintln!("Error starting batch: {}", e);
            std::process::exit(1);
        });

    match coordinator.wait(field, scheduler) {
        Ok(BatchStatus::Completed) => {}
        Ok(status) => log::warn!("batch ended without a result: {:?}", status),
        Err(e) => {
            eprintln!("Error during erosion: {}", e);
            std::process::exit(1);
        }
    }
}

fn export(field: &HeightField, output: &Path, format: ExportFormat) {
    println!("\nExporting to {}...", output.display());
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).unwrap_or_else(|e| {
            eprintln!("Error creating output directory: {}", e);
            std::process::exit(1);
        });
    }

    let range = PngExportOptions::auto_range(field);
    let raw = |format: RawFormat| {
        export_heightfield_raw(field, output, format, range.min_height, range.max_height)
            .map_err(|e| e.to_string())
    };
    let result = match format {
        ExportFormat::Png => {
            export_heightfield_png(field, output, &range).map_err(|e| e.to_string())
        }
        ExportFormat::Raw => raw(RawFormat::R16LittleEndian),
        ExportFormat::RawFloat => raw(RawFormat::R32Float),
    };

    if let Err(e) = result {
        eprintln!("Error exporting: {}", e);
        std::process::exit(1);
    }
    println!("Done.");
}
