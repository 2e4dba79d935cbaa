use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use threes::puzzle::{read_moves, Puzzle};
use threes::report::SolveReport;
use threes::search::{SearchProgress, Solver, SolverConfig, Threads, Weights};
use threes::serialization::{self, RunRecord};

#[derive(Parser, Debug)]
#[command(name = "threes", about = "Solve Threes! puzzles with a known tile sequence")]
struct Cli {
    /// More logging (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Search for the best finishing board
    Solve(SolveArgs),
    /// Replay a move list or run record against a puzzle and print the report
    Replay {
        input: PathBuf,
        /// Move list file (two header lines, then L/U/R/D)
        #[arg(long, conflicts_with = "record")]
        moves: Option<PathBuf>,
        /// Binary run record written by `solve --record`
        #[arg(long)]
        record: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SolveArgs {
    input: PathBuf,
    /// Also write the report here
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Write a checksummed binary run record here
    #[arg(long)]
    record: Option<PathBuf>,
    /// Run every lookahead on the main thread
    #[arg(long)]
    single_thread: bool,
    #[arg(long)]
    depth: Option<usize>,
    #[arg(long)]
    capacity: Option<usize>,
    #[arg(long)]
    width: Option<usize>,
    /// Starting heuristic weights as zeros,checkerboarding,smoothness,combinable
    #[arg(long)]
    weights: Option<Weights>,
    /// Keep the starting weights and never thin the frontier on a stall
    #[arg(short = 'n', long)]
    no_recovery: bool,
    /// No spinner
    #[arg(long)]
    quiet: bool,
}

impl SolveArgs {
    fn config(&self) -> SolverConfig {
        let mut cfg = SolverConfig::default();
        if self.single_thread {
            cfg.threads = Threads::Single;
        }
        if let Some(depth) = self.depth {
            cfg.depth = depth;
        }
        if let Some(capacity) = self.capacity {
            cfg.capacity = capacity;
        }
        if let Some(width) = self.width {
            cfg.width = width;
            cfg.wide_width = cfg.wide_width.max(width);
        }
        if let Some(weights) = self.weights {
            cfg.weights = weights;
        }
        if self.no_recovery {
            cfg.alternates.clear();
        }
        cfg
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Cmd::Solve(args) => solve(args),
        Cmd::Replay { input, moves, record } => replay(input, moves, record),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "warn,threes=debug",
        _ => "warn,threes=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn solve(args: SolveArgs) -> Result<()> {
    let puzzle = Puzzle::from_path(&args.input).with_context(|| format!("loading {}", args.input.display()))?;
    let progress = Arc::new(SearchProgress::new());
    let mut solver = Solver::with_config(&puzzle.sequence, args.config()).with_progress(progress.clone());

    // Status line polled from the solver's progress counters
    let stop = Arc::new(AtomicBool::new(false));
    let mut status = None;
    if !args.quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} | {msg}")
                .context("spinner template")?
                .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        let pb_bg = pb.clone();
        let stop_flag = stop.clone();
        let progress = progress.clone();
        let tiles = puzzle.sequence.len();
        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(250));
                let s = progress.snapshot();
                pb_bg.set_message(format!(
                    "iterations: {} | frontier: {} | best: {} ({}/{} moves) | {:?}",
                    s.iterations, s.frontier, s.best_score, s.best_moves, tiles, s.phase
                ));
            }
        });
        status = Some((pb, handle));
    }

    let start = Instant::now();
    let done = solver.solve(&puzzle.board);
    let elapsed = start.elapsed();

    stop.store(true, Ordering::Relaxed);
    if let Some((pb, handle)) = status {
        let _ = handle.join();
        pb.finish_and_clear();
    }

    let stats = solver.last_stats();
    tracing::info!(?stats, "search stats");
    let report = SolveReport::from_board(&done, puzzle.sequence.len(), elapsed);
    print!("{report}");
    if let Some(out) = &args.output {
        report.write_to_path(out).with_context(|| format!("writing {}", out.display()))?;
    }
    if let Some(path) = &args.record {
        let record = RunRecord::new(&puzzle.board, &puzzle.sequence, &done);
        serialization::write_to_path(path, &record).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn replay(input: PathBuf, moves: Option<PathBuf>, record: Option<PathBuf>) -> Result<()> {
    let puzzle = Puzzle::from_path(&input).with_context(|| format!("loading {}", input.display()))?;
    let start = Instant::now();
    let board = match (moves, record) {
        (Some(path), None) => {
            let moves = read_moves(&path).with_context(|| format!("loading {}", path.display()))?;
            let mut board = puzzle.board.clone();
            let applied = board.apply_moves(&puzzle.sequence, &moves);
            if applied < moves.len() {
                tracing::warn!(applied, total = moves.len(), "move list stopped early");
            }
            board
        }
        (None, Some(path)) => {
            let record = serialization::read_from_path(&path).with_context(|| format!("loading {}", path.display()))?;
            if record.board != *puzzle.board.cells() || record.sequence != puzzle.sequence {
                bail!("record {} was made for a different puzzle", path.display());
            }
            record.verify()?
        }
        _ => bail!("pass exactly one of --moves or --record"),
    };
    print!("{}", SolveReport::from_board(&board, puzzle.sequence.len(), start.elapsed()));
    Ok(())
}
