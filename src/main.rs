use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use sightread::{compile_piece, measure_range, merge_hands, parse_musicxml, schedule, score_events, validate, Piece};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "sightread", about = "Build, read and schedule two-handed piano sight-reading scores")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a MusicXML score from a YAML piece.
    Build {
        /// Path to the piece file.
        piece: PathBuf,

        /// Write the score here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the note ids starting at each beat to stderr.
        #[arg(long, default_value_t = false)]
        ids: bool,
    },
    /// Print the merged timing events of a score as JSON.
    Events {
        /// Path to the MusicXML score.
        score: PathBuf,

        /// First measure (1-based).
        #[arg(long)]
        first: Option<usize>,

        /// Last measure, inclusive.
        #[arg(long)]
        last: Option<usize>,
    },
    /// Print the playback schedule of a score as JSON.
    Schedule {
        /// Path to the MusicXML score.
        score: PathBuf,

        /// Tempo in quarter-note beats per minute.
        #[arg(long, default_value_t = sightread::config::DEFAULT_BPM)]
        bpm: f64,

        /// Count-off beats. Defaults to one measure.
        #[arg(long)]
        countoff: Option<f64>,
    },
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Error reading file '{}'", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Build { piece, output, ids } => {
            let source = read(&piece)?;
            let piece = Piece::from_yaml(&source).with_context(|| format!("Invalid piece '{}'", piece.display()))?;
            let built = compile_piece(&piece).context("Compilation error")?;

            if ids {
                for (beat, note_ids) in built.note_ids.iter() {
                    let names: Vec<String> = note_ids.iter().map(ToString::to_string).collect();
                    eprintln!("{:>8.3} {}", beat, names.join(" "));
                }
            }

            match output {
                Some(path) => {
                    fs::write(&path, &built.xml).with_context(|| format!("Error writing to '{}'", path.display()))?;
                    info!("Wrote {} measures of MusicXML to {}", built.measure_count, path.display());
                }
                None => println!("{}", built.xml),
            }
        }
        Command::Events { score, first, last } => {
            let xml = read(&score)?;
            let parsed = parse_musicxml(&xml).context("Parse error")?;
            validate(&parsed).context("Score does not add up")?;

            let streams = match (first, last) {
                (None, None) => parsed.streams(),
                (first, last) => measure_range(&parsed, first.unwrap_or(1), last.unwrap_or(usize::MAX))?,
            };
            let events = merge_hands(&streams.right_hand, &streams.left_hand);
            info!("{} timing events", events.len());
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        Command::Schedule { score, bpm, countoff } => {
            anyhow::ensure!(bpm > 0.0, "tempo must be positive, got {}", bpm);
            let xml = read(&score)?;
            let (parsed, events) = score_events(&xml).with_context(|| format!("Invalid score '{}'", score.display()))?;
            let countoff = countoff.unwrap_or_else(|| parsed.time_signature.beats_per_measure());
            let plan = schedule(&events, countoff, bpm);
            info!("{} events over {:.2}s", plan.notes.len(), plan.end_time);
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }

    Ok(())
}
