//! tonestack: apply a filter list to images from the command line.
//!
//! Loads an `.ifl` filter list, runs it over each input image on the
//! pipeline's background worker and writes the results, printing
//! per-stage diagnostics.
//!
//! # Usage
//!
//! ```text
//! tonestack -i in.png -o out.png -l grade.ifl [--format "JPEG (*.jpg)"] [--json]
//! tonestack -i a.png b.png c.jpg --output-dir out/ -l grade.ifl
//! tonestack --list-filters
//! ```
//!
//! In batch mode each output is named `<input stem>_<list stem>.<ext>`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tonestack_io::{ImageFileCodec, format_from_hint};
use tonestack_pipeline::ifl::FILE_EXTENSION;
use tonestack_pipeline::{FilterList, FilterRegistry, ImageCodec, RunDiagnostics, RunOutcome};

/// Apply a tonestack filter list to images.
///
/// Without `--list` the images pass through unchanged, which converts
/// between formats.
#[derive(Parser)]
#[command(name = "tonestack", version)]
struct Cli {
    /// Input images (PNG, JPEG, BMP, WebP).
    #[arg(short, long, num_args = 1.., required_unless_present = "list_filters")]
    input: Vec<PathBuf>,

    /// Output image for a single input. The extension picks the format
    /// unless `--format` is given.
    #[arg(short, long, conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Directory for batch outputs, one per input.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Filter list file (`.ifl`).
    #[arg(short, long)]
    list: Option<PathBuf>,

    /// Output format: a name (`png`) or a filter string (`"JPEG (*.jpg *.jpeg)"`).
    #[arg(long)]
    format: Option<String>,

    /// Print diagnostics as JSON instead of a report.
    #[arg(long)]
    json: bool,

    /// Print the available filters and exit.
    #[arg(long)]
    list_filters: bool,

    /// Randomize every stage's parameters from this seed before running.
    #[arg(long, value_name = "SEED")]
    randomize: Option<u64>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

/// One input and where its result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Job {
    input: PathBuf,
    output: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let registry = Arc::new(tonestack_filters::registry());

    if cli.list_filters {
        print_filters(&registry);
        return ExitCode::SUCCESS;
    }

    match run(&cli, registry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn print_filters(registry: &FilterRegistry) {
    println!("{:<32} {:<16} Description", "Id", "Name");
    println!("{}", "-".repeat(80));
    for id in registry.ids() {
        if let Some(info) = registry.info(id) {
            println!("{id:<32} {:<16} {}", info.name, info.description);
        }
    }
}

/// Pair every input with its output path.
fn plan_jobs(cli: &Cli) -> Result<Vec<Job>, String> {
    match (&cli.output, &cli.output_dir, cli.input.as_slice()) {
        (Some(output), None, [input]) => Ok(vec![Job {
            input: input.clone(),
            output: output.clone(),
        }]),
        (Some(_), None, _) => Err("--output takes a single --input; use --output-dir".to_owned()),
        (None, Some(dir), inputs) => {
            let extension = cli
                .format
                .as_deref()
                .and_then(format_from_hint)
                .and_then(|format| format.extensions_str().first().copied());
            Ok(inputs
                .iter()
                .map(|input| Job {
                    input: input.clone(),
                    output: batch_output_path(input, dir, cli.list.as_deref(), extension),
                })
                .collect())
        }
        _ => Err("one of --output or --output-dir is required".to_owned()),
    }
}

/// `<dir>/<input stem>[_<list stem>].<ext>`, keeping the input's extension
/// when no `extension` is given.
fn batch_output_path(
    input: &Path,
    dir: &Path,
    list: Option<&Path>,
    extension: Option<&str>,
) -> PathBuf {
    let stem = input.file_stem().and_then(OsStr::to_str).unwrap_or("image");
    let name = match list.and_then(Path::file_stem).and_then(OsStr::to_str) {
        Some(list) => format!("{stem}_{list}"),
        None => stem.to_owned(),
    };
    let extension = extension
        .or_else(|| input.extension().and_then(OsStr::to_str))
        .unwrap_or("png");
    dir.join(name).with_extension(extension)
}

fn run(cli: &Cli, registry: Arc<FilterRegistry>) -> Result<(), String> {
    let jobs = plan_jobs(cli)?;
    if let Some(dir) = &cli.output_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    }

    let mut list =
        FilterList::new(registry).map_err(|e| format!("Error starting pipeline: {e}"))?;
    list.set_auto_run(false);

    if let Some(path) = &cli.list {
        load_list(&mut list, path)?;
    }

    if let Some(seed) = cli.randomize {
        randomize(&mut list, seed);
    }

    let codec = ImageFileCodec::new();
    let mut all_diagnostics = Vec::with_capacity(jobs.len());
    let mut failed = 0usize;
    for job in &jobs {
        match apply(&mut list, &codec, job, cli.format.as_deref()) {
            Ok(diagnostics) => all_diagnostics.push(diagnostics),
            Err(msg) if jobs.len() == 1 => return Err(msg),
            Err(msg) => {
                eprintln!("{msg}");
                failed += 1;
            }
        }
    }

    if cli.json {
        let json = match all_diagnostics.as_slice() {
            [single] if jobs.len() == 1 => serde_json::to_string_pretty(single),
            many => serde_json::to_string_pretty(many),
        }
        .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{json}");
    } else {
        for diagnostics in &all_diagnostics {
            println!("{}\n", diagnostics.report());
        }
    }

    if jobs.len() > 1 {
        eprintln!("Processed {}/{} images", jobs.len() - failed, jobs.len());
    }
    if failed > 0 {
        return Err(format!("{failed} of {} images failed", jobs.len()));
    }
    Ok(())
}

/// Run the list over one image and save the result.
fn apply(
    list: &mut FilterList,
    codec: &ImageFileCodec,
    job: &Job,
    format: Option<&str>,
) -> Result<RunDiagnostics, String> {
    let Job { input, output } = job;
    let image = codec
        .load(input)
        .map_err(|e| format!("Error reading {}: {e}", input.display()))?;
    eprintln!(
        "Image: {} ({}x{})",
        input.display(),
        image.width(),
        image.height()
    );
    list.set_input_image(image);

    let handle = list
        .request_recompute()
        .map_err(|e| format!("Pipeline error: {e}"))?;
    let (image, diagnostics) = match handle.wait() {
        RunOutcome::Completed { image, diagnostics } => (image, diagnostics),
        RunOutcome::Failed {
            stage,
            filter_id,
            reason,
        } => {
            return Err(format!(
                "{}: stage {stage} ({filter_id}) failed: {reason}",
                input.display()
            ));
        }
        RunOutcome::Cancelled => return Err(format!("{}: run was cancelled", input.display())),
    };

    codec
        .save(&image, output, format)
        .map_err(|e| format!("Error writing {}: {e}", output.display()))?;
    eprintln!("Output written to {}", output.display());
    Ok(diagnostics)
}

fn load_list(list: &mut FilterList, path: &Path) -> Result<(), String> {
    if path.extension().and_then(OsStr::to_str) != Some(FILE_EXTENSION) {
        warn!(
            "{} does not have the .{FILE_EXTENSION} extension",
            path.display()
        );
    }
    list.load(path)
        .map_err(|e| format!("Error loading {}: {e}", path.display()))?;
    eprintln!(
        "Filter list: {} ({} stages)",
        if list.name().is_empty() {
            "[unnamed]"
        } else {
            list.name()
        },
        list.len()
    );
    for stage in list.stages() {
        if let Some(reason) = &stage.broken_reason {
            warn!(
                "stage {} ({}) passes its input through: {reason}",
                stage.index, stage.filter_id
            );
        }
    }
    Ok(())
}

fn randomize(list: &mut FilterList, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for index in 0..list.len() {
        match list.edit_filter(index, |filter| filter.randomize_parameters(&mut rng)) {
            Ok(()) => debug!("randomized stage {index}"),
            Err(e) => warn!("not randomizing stage {index}: {e}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tonestack").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn single_input_writes_named_output() {
        let jobs = plan_jobs(&cli(&["-i", "in.png", "-o", "out.jpg"])).unwrap();
        assert_eq!(
            jobs,
            vec![Job {
                input: "in.png".into(),
                output: "out.jpg".into()
            }]
        );
    }

    #[test]
    fn batch_names_outputs_after_input_and_list() {
        let jobs = plan_jobs(&cli(&[
            "-i",
            "shots/a.png",
            "shots/b.jpg",
            "--output-dir",
            "out",
            "-l",
            "lists/warm.ifl",
        ]))
        .unwrap();
        let outputs: Vec<_> = jobs.iter().map(|j| j.output.clone()).collect();
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("out/a_warm.png"),
                PathBuf::from("out/b_warm.jpg")
            ]
        );
    }

    #[test]
    fn batch_format_hint_sets_extension() {
        let jobs = plan_jobs(&cli(&[
            "-i",
            "a.png",
            "--output-dir",
            "out",
            "--format",
            "JPEG (*.jpg *.jpeg)",
        ]))
        .unwrap();
        assert_eq!(jobs[0].output, PathBuf::from("out/a.jpg"));
    }

    #[test]
    fn several_inputs_need_output_dir() {
        assert!(plan_jobs(&cli(&["-i", "a.png", "b.png", "-o", "out.png"])).is_err());
        assert!(plan_jobs(&cli(&["-i", "a.png"])).is_err());
    }

    #[test]
    fn output_and_output_dir_conflict() {
        let result = Cli::try_parse_from([
            "tonestack",
            "-i",
            "a.png",
            "-o",
            "b.png",
            "--output-dir",
            "out",
        ]);
        assert!(result.is_err());
    }
}
