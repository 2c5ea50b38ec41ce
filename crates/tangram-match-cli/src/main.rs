//! Command-line replay of recorded observation streams through the
//! tangram-match validation engine.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use tangram_match::{Difficulty, Engine, EngineConfig, Puzzle, RawPose, ValidationOptions, ValidationResult};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "tangram-match")]
#[command(about = "Validate tangram assemblies from recorded touch or vision poses")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recording frame by frame and write every result.
    Replay(CliReplayArgs),

    /// Print the targets of a puzzle file (or the standard puzzle).
    PuzzleInfo {
        /// Puzzle JSON; the standard square when omitted.
        #[arg(long)]
        puzzle: Option<PathBuf>,

        /// Square side length for the standard puzzle.
        #[arg(long, default_value = "50.0")]
        unit: f64,
    },

    /// Write the standard seven-piece puzzle as JSON.
    StandardPuzzle {
        /// Square side length.
        #[arg(long, default_value = "50.0")]
        unit: f64,

        /// Output path; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct CliReplayArgs {
    /// Recording JSON: `{"frames": [[pose, ...], ...]}`.
    #[arg(long)]
    recording: PathBuf,

    /// Puzzle JSON; the standard square when omitted.
    #[arg(long)]
    puzzle: Option<PathBuf>,

    /// Engine configuration JSON. Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Square side length, overrides the config file.
    #[arg(long)]
    unit: Option<f64>,

    /// Tolerance tier.
    #[arg(long, value_enum, default_value_t = DifficultyArg::Medium)]
    difficulty: DifficultyArg,

    /// Path to write per-frame results (JSON array).
    #[arg(long)]
    out: PathBuf,

    /// Only write the last frame's result.
    #[arg(long)]
    last_only: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl DifficultyArg {
    fn to_core(self) -> Difficulty {
        match self {
            Self::Easy => Difficulty::Easy,
            Self::Medium => Difficulty::Medium,
            Self::Hard => Difficulty::Hard,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct Recording {
    frames: Vec<Vec<RawPose>>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay(args) => run_replay(&args),
        Commands::PuzzleInfo { puzzle, unit } => run_puzzle_info(puzzle.as_deref(), unit),
        Commands::StandardPuzzle { unit, out } => run_standard_puzzle(unit, out.as_deref()),
    }
}

fn load_puzzle(path: Option<&Path>, unit: f64) -> CliResult<Puzzle> {
    match path {
        Some(path) => Puzzle::from_json_file(path).map_err(|e| -> CliError {
            format!("failed to load puzzle {}: {}", path.display(), e).into()
        }),
        None => Ok(Puzzle::standard(unit)?),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data)
        .map_err(|e| -> CliError { format!("invalid config {}: {}", path.display(), e).into() })
}

// ── puzzle-info ────────────────────────────────────────────────────────

fn run_puzzle_info(path: Option<&Path>, unit: f64) -> CliResult<()> {
    let puzzle = load_puzzle(path, unit)?;

    println!("puzzle {}", puzzle.name());
    println!("  targets: {}", puzzle.n_targets());
    for t in puzzle.targets() {
        println!(
            "  #{:<2} {:<16} ({:8.2}, {:8.2})  rot {:7.2} deg{}",
            t.id.0,
            format!("{:?}", t.piece_type),
            t.position[0],
            t.position[1],
            t.rotation.to_degrees(),
            if t.is_mirrored { "  mirrored" } else { "" }
        );
    }

    Ok(())
}

// ── standard-puzzle ────────────────────────────────────────────────────

fn run_standard_puzzle(unit: f64, out: Option<&Path>) -> CliResult<()> {
    let json = Puzzle::standard(unit)?.to_json_string()?;
    match out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Puzzle written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ── replay ─────────────────────────────────────────────────────────────

fn run_replay(args: &CliReplayArgs) -> CliResult<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(unit) = args.unit {
        config.unit_length = unit;
    }
    let puzzle = load_puzzle(args.puzzle.as_deref(), config.unit_length)?;

    tracing::info!("Loading recording: {}", args.recording.display());
    let data = std::fs::read_to_string(&args.recording)?;
    let recording: Recording = serde_json::from_str(&data).map_err(|e| -> CliError {
        format!("invalid recording {}: {}", args.recording.display(), e).into()
    })?;
    tracing::info!("{} frames", recording.frames.len());

    let mut engine = Engine::with_config(puzzle, config);
    engine.set_options(ValidationOptions {
        difficulty: args.difficulty.to_core(),
        ..ValidationOptions::default()
    });

    let mut results: Vec<ValidationResult> = Vec::with_capacity(recording.frames.len());
    for frame in &recording.frames {
        let result = engine.process_frame(frame);
        if result.stats.n_dropped > 0 {
            tracing::warn!(
                "frame {}: dropped {} malformed records",
                result.frame_index,
                result.stats.n_dropped
            );
        }
        results.push(result);
    }

    if let Some(last) = results.last() {
        tracing::info!(
            "Final frame {}: {}/{} targets validated, {} groups{}",
            last.frame_index,
            last.validated_target_ids.len(),
            engine.puzzle().n_targets(),
            last.groups.len(),
            if last.is_complete { ", complete" } else { "" }
        );
        if let Some(hint) = engine.hint() {
            tracing::info!(
                "Next: target #{} ({:?}){}",
                hint.target.id.0,
                hint.target.piece_type,
                hint.failure_reason
                    .map(|r| format!(", closest piece fails with {:?}", r))
                    .unwrap_or_default()
            );
        }
    }

    let json = if args.last_only {
        serde_json::to_string_pretty(&results.last())?
    } else {
        serde_json::to_string_pretty(&results)?
    };
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());

    Ok(())
}
