// NoteNet command-line driver.
//
// Trains the next-note perceptron on a directory of MIDI files, then grows
// new melodies from the opening notes of a MIDI file.
//
// Usage:
//   notenet train --data DIR [--pattern TEXT] [--train-files N] [--config FILE]
//     [--epochs N] [--learning-rate F] [--batch-size N] [--hidden N]
//     [--context N] [--seed N] [--out model.json] [--loss-out loss.json]
//   notenet generate --model model.json --seed-file piece.mid [--max-length N]
//     [--temperature T] [--seed N] [--out generated.mid] [--seed-out seed.mid]
//   notenet inspect FILE (.mid/.midi for notes, anything else as a checkpoint)
//
// Files in --data are sorted by name; the first --train-files of them train
// the model and the rest measure validation loss. Log verbosity follows
// RUST_LOG (default: info for the notenet crates).

use anyhow::{Context, Result, bail};
use notenet::checkpoint::Checkpoint;
use notenet::config::TrainConfig;
use notenet::decode::Sampled;
use notenet::generator::{generate, generate_with};
use notenet::model::Model;
use notenet::trainer::train;
use notenet_midi::{
    MidiError, collect_midi_files, is_midi_path, load_dataset, read_notes, split_files, write_notes,
};
use notenet_prng::NotePrng;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_TRAIN_FILES: usize = 30;
const DEFAULT_MAX_LENGTH: usize = 100;
const DEFAULT_LOG_FILTER: &str = "notenet=info,notenet_midi=info,notenet_cli=info";
const USAGE: &str = "usage: notenet <train|generate|inspect> [options]";

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("train") => cmd_train(&args[2..]),
        Some("generate") => cmd_generate(&args[2..]),
        Some("inspect") => cmd_inspect(&args[2..]),
        Some(other) => bail!("unknown command '{other}'\n{USAGE}"),
        None => bail!("{USAGE}"),
    }
}

// ---------------------------------------------------------------------------
// train
// ---------------------------------------------------------------------------

fn cmd_train(args: &[String]) -> Result<()> {
    let data_dir: PathBuf = required_flag(args, "--data")?;
    let pattern: Option<String> = parse_flag(args, "--pattern")?;
    let train_files = flag_or(args, "--train-files", DEFAULT_TRAIN_FILES)?;
    let out = flag_or(args, "--out", PathBuf::from("model.json"))?;
    let loss_out: Option<PathBuf> = parse_flag(args, "--loss-out")?;
    let seed: Option<u64> = parse_flag(args, "--seed")?;
    let config = load_config(args)?;

    println!("=== NoteNet training ===");
    println!("Data: {}", data_dir.display());
    println!(
        "Context {} notes, {} hidden units, lr {}, batch {}, {} epochs",
        config.context_length,
        config.hidden_size,
        config.learning_rate,
        config.batch_size,
        config.epochs
    );
    if let Some(s) = seed {
        println!("Seed: {s}");
    }
    println!();

    println!("[1/4] Finding MIDI files...");
    let files = collect_midi_files(&data_dir, pattern.as_deref())
        .with_context(|| format!("listing {}", data_dir.display()))?;
    if files.is_empty() {
        bail!("no .mid/.midi files found in {}", data_dir.display());
    }
    let (train_paths, valid_paths) = split_files(files, train_files);
    println!(
        "  {} training files, {} validation files.",
        train_paths.len(),
        valid_paths.len()
    );

    println!("[2/4] Building datasets...");
    let train_report =
        load_dataset(&train_paths, config.context_length).context("loading training files")?;
    println!(
        "  Training: {} examples from {} files ({} skipped).",
        train_report.dataset.len(),
        train_report.used.len(),
        train_report.skipped.len()
    );
    let valid_report = if valid_paths.is_empty() {
        None
    } else {
        match load_dataset(&valid_paths, config.context_length) {
            Ok(report) => {
                println!(
                    "  Validation: {} examples from {} files ({} skipped).",
                    report.dataset.len(),
                    report.used.len(),
                    report.skipped.len()
                );
                Some(report)
            }
            Err(MidiError::NoUsableFiles { attempted }) => {
                println!("  Validation: none of {attempted} files usable.");
                None
            }
            Err(e) => return Err(e).context("loading validation files"),
        }
    };

    println!("[3/4] Training...");
    let mut rng = match seed {
        Some(s) => NotePrng::new(s),
        None => NotePrng::from_entropy(),
    };
    let mut model = Model::for_config(&config, &mut rng)?;
    let history = train(
        &mut model,
        &train_report.dataset,
        valid_report.as_ref().map(|r| &r.dataset),
        &config,
        &mut rng,
    )?;
    println!("  Iterations: {}", history.iterations);
    if let Some(loss) = history.final_train() {
        println!("  Final training loss: {loss:.4}");
    }
    if let Some(loss) = history.final_valid() {
        println!("  Final validation loss: {loss:.4}");
    }

    println!("[4/4] Saving model to {}...", out.display());
    Checkpoint::new(config, model.into_network())
        .save(&out)
        .with_context(|| format!("writing {}", out.display()))?;
    if let Some(path) = loss_out {
        let json = serde_json::to_string_pretty(&history)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("  Loss curves written to {}.", path.display());
    }
    println!("  Done!");
    Ok(())
}

/// Start from `--config` (or the defaults), apply individual overrides, then
/// validate the result. A file value an override replaces is never checked.
fn load_config(args: &[String]) -> Result<TrainConfig> {
    let mut config = TrainConfig::default();
    if let Some(path) = parse_flag::<PathBuf>(args, "--config")? {
        let context = || format!("reading config {}", path.display());
        config = TrainConfig::read(&path).with_context(context)?;
    }
    if let Some(v) = parse_flag::<usize>(args, "--epochs")? {
        config.epochs = v;
    }
    if let Some(v) = parse_flag::<f64>(args, "--learning-rate")? {
        config.learning_rate = v;
    }
    if let Some(v) = parse_flag::<usize>(args, "--batch-size")? {
        config.batch_size = v;
    }
    if let Some(v) = parse_flag::<usize>(args, "--hidden")? {
        config.hidden_size = v;
    }
    if let Some(v) = parse_flag::<usize>(args, "--context")? {
        config.context_length = v;
    }
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

fn cmd_generate(args: &[String]) -> Result<()> {
    let model_path: PathBuf = required_flag(args, "--model")?;
    let seed_file: PathBuf = required_flag(args, "--seed-file")?;
    let max_length = flag_or(args, "--max-length", DEFAULT_MAX_LENGTH)?;
    let temperature: Option<f64> = parse_flag(args, "--temperature")?;
    let rng_seed: Option<u64> = parse_flag(args, "--seed")?;
    let out = flag_or(args, "--out", PathBuf::from("generated.mid"))?;
    let seed_out: Option<PathBuf> = parse_flag(args, "--seed-out")?;

    println!("[1/3] Loading model from {}...", model_path.display());
    let checkpoint = load_checkpoint(&model_path)?;
    let context_length = checkpoint.config.context_length;
    println!(
        "  Context {} notes, {} hidden units.",
        context_length,
        checkpoint.mlp.num_hidden()
    );

    println!("[2/3] Generating from {}...", seed_file.display());
    let notes = read_notes(&seed_file)?;
    if notes.len() < context_length {
        bail!(
            "{} has {} notes, the model needs a seed of {}",
            seed_file.display(),
            notes.len(),
            context_length
        );
    }
    let seed = &notes[..context_length];
    let melody = match temperature {
        Some(t) => {
            let rng = match rng_seed {
                Some(s) => NotePrng::new(s),
                None => NotePrng::from_entropy(),
            };
            println!("  Sampling at temperature {t}.");
            generate_with(&checkpoint.mlp, seed, max_length, &mut Sampled::new(t, rng))?
        }
        None => generate(&checkpoint.mlp, seed, max_length)?,
    };
    let new_notes = melody.len() - seed.len();
    println!("  {} notes, {new_notes} generated.", melody.len());
    if melody.len() < max_length {
        println!("  Stopped early on the end marker.");
    }

    println!("[3/3] Writing {}...", out.display());
    write_notes(&melody, &out)?;
    if let Some(path) = seed_out {
        write_notes(seed, &path)?;
        println!("  Seed written to {}.", path.display());
    }
    println!("  Done!");
    Ok(())
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

fn cmd_inspect(args: &[String]) -> Result<()> {
    let Some(path) = args.first().filter(|a| !a.starts_with("--")) else {
        bail!("usage: notenet inspect FILE");
    };
    let path = Path::new(path);

    if is_midi_path(path) {
        let notes = read_notes(path)?;
        println!("{}: {} notes", path.display(), notes.len());
        if let (Some(low), Some(high)) = (notes.iter().min(), notes.iter().max()) {
            let (low, high) = (pitch_name(*low), pitch_name(*high));
            println!("  Range: {low} to {high}");
        }
        let preview: Vec<String> = notes.iter().take(24).map(|n| pitch_name(*n)).collect();
        println!("  Opening: {}", preview.join(" "));
    } else {
        let checkpoint = load_checkpoint(path)?;
        let mlp = &checkpoint.mlp;
        println!("{}: checkpoint", path.display());
        println!(
            "  Layers: {} -> {} -> {}",
            mlp.num_features(),
            mlp.num_hidden(),
            mlp.num_classes()
        );
        println!("  Config: {}", serde_json::to_string(&checkpoint.config)?);
    }
    Ok(())
}

fn load_checkpoint(path: &Path) -> Result<Checkpoint> {
    Checkpoint::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Scientific pitch name of a MIDI key, with middle C (60) as C4.
fn pitch_name(note: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = i32::from(note / 12) - 1;
    format!("{}{}", NAMES[usize::from(note % 12)], octave)
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// Value following `flag`, parsed. A present flag with a bad value is an error.
fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    let Some(raw) = args.get(i + 1) else {
        bail!("{flag} needs a value");
    };
    match raw.parse() {
        Ok(v) => Ok(Some(v)),
        Err(_) => bail!("invalid value '{raw}' for {flag}"),
    }
}

fn flag_or<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> Result<T> {
    Ok(parse_flag(args, flag)?.unwrap_or(default))
}

fn required_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<T> {
    let value: Option<T> = parse_flag(args, flag)?;
    value.with_context(|| format!("missing required {flag}"))
}
