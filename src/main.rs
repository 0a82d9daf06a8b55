mod config;
mod density;
mod diag;
mod dipole;
mod emit;
mod error;
mod hamiltonian;
mod pipeline;
mod source;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};

use config::load_config;
use emit::{CommandSubmitter, DryRunSubmitter, Submitter};
use error::PipelineError;
use pipeline::run_batch;

/// Prepares optimal-control inputs from quantum-chemistry outputs and submits
/// one solver job per target state.
#[derive(Debug, Parser)]
#[command(name = "control_launcher", version)]
struct Cli {
  /// YAML run configuration.
  #[arg(short, long)]
  config: PathBuf,

  /// Root of the per-molecule output folders.
  #[arg(short, long)]
  out_dir: PathBuf,

  /// Write every file but only log the submissions.
  #[arg(long)]
  dry_run: bool,

  /// Raise the log level to debug.
  #[arg(short, long, action = ArgAction::Count)]
  verbose: u8,

  /// Electronic-structure output files, one molecule each.
  #[arg(required = true)]
  sources: Vec<PathBuf>,
}

/// Core CLI logic. Returns the summary line to print on stdout, or the error
/// message to print on stderr (without the "error: " prefix).
fn run(cli: &Cli) -> Result<String, String> {
  let cfg = load_config(&cli.config).map_err(|e| PipelineError::from(e).to_string())?;
  std::fs::create_dir_all(&cli.out_dir)
    .map_err(|e| format!("cannot create {}: {}", cli.out_dir.display(), e))?;

  let submitter: Box<dyn Submitter> = if cli.dry_run {
    Box::new(DryRunSubmitter)
  } else {
    Box::new(CommandSubmitter { command: cfg.job.submit_command.clone() })
  };

  let batch = run_batch(&cli.sources, &cfg, &cli.out_dir, submitter.as_ref());
  if batch.all_succeeded() {
    Ok(batch.summary())
  } else {
    Err(batch.summary())
  }
}

fn main() {
  let cli = Cli::parse();
  let level = if cli.verbose > 0 { "debug" } else { "info" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

  match run(&cli) {
    Ok(msg) => println!("{}", msg),
    Err(e) => {
      eprintln!("error: {}", e);
      process::exit(1);
    }
  }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  use crate::config::tests::MINIMAL;

  fn temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f
  }

  const TWO_TRIPLETS: &str = "\
TDDFT/TDA Excitation Energies
--------------------------------------------------------------
Excited state   1: excitation energy (eV) =    2.0000
Multiplicity: Triplet
Excited state   2: excitation energy (eV) =    2.2000
Multiplicity: Triplet
--------------------------------------------------------------
";

  fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("control_launcher").chain(args.iter().copied())).unwrap()
  }

  // ── Argument parsing ────────────────────────────────────────────────────────

  /// Scenario: All options are recognised
  #[test]
  fn test_parse_full_command_line() {
    let c = cli(&["-c", "run.yaml", "--out-dir", "out", "--dry-run", "-vv", "a.out", "b.out"]);
    assert_eq!(c.config, PathBuf::from("run.yaml"));
    assert_eq!(c.out_dir, PathBuf::from("out"));
    assert!(c.dry_run);
    assert_eq!(c.verbose, 2);
    assert_eq!(c.sources, vec![PathBuf::from("a.out"), PathBuf::from("b.out")]);
  }

  /// Scenario: At least one source file is required
  #[test]
  fn test_no_sources() {
    let r = Cli::try_parse_from(["control_launcher", "-c", "run.yaml", "-o", "out"]);
    assert!(r.is_err());
  }

  // ── Runs ────────────────────────────────────────────────────────────────────

  /// Scenario: A dry run over one molecule succeeds and prints the summary
  #[test]
  fn test_dry_run_summary() {
    let cfg = temp_file(MINIMAL);
    let src = temp_file(TWO_TRIPLETS);
    let out = tempfile::tempdir().unwrap();
    let c = Cli {
      config: cfg.path().to_path_buf(),
      out_dir: out.path().to_path_buf(),
      dry_run: true,
      verbose: 0,
      sources: vec![src.path().to_path_buf()],
    };
    assert_eq!(
      run(&c).unwrap(),
      "1 molecule(s) processed, 0 failed, 0 skipped, 2 job(s) submitted"
    );
  }

  /// Scenario: A failing molecule turns the run into an error
  #[test]
  fn test_failed_molecule_is_an_error() {
    let cfg = temp_file(MINIMAL);
    let out = tempfile::tempdir().unwrap();
    let c = Cli {
      config: cfg.path().to_path_buf(),
      out_dir: out.path().to_path_buf(),
      dry_run: true,
      verbose: 0,
      sources: vec![out.path().join("missing.out")],
    };
    assert_eq!(
      run(&c).unwrap_err(),
      "0 molecule(s) processed, 1 failed, 0 skipped, 0 job(s) submitted"
    );
  }

  /// Scenario: Configuration file does not exist
  #[test]
  fn test_missing_config() {
    let out = tempfile::tempdir().unwrap();
    let c = Cli {
      config: PathBuf::from("/tmp/nonexistent_control_launcher_cli.yaml"),
      out_dir: out.path().to_path_buf(),
      dry_run: true,
      verbose: 0,
      sources: vec![PathBuf::from("a.out")],
    };
    assert!(run(&c).unwrap_err().starts_with("configuration error: I/O error"));
  }

  /// Scenario: Configuration names an unsupported source format
  #[test]
  fn test_unknown_source_format() {
    let cfg = temp_file(&MINIMAL.replace("source_format: qchem", "source_format: molpro"));
    let out = tempfile::tempdir().unwrap();
    let c = Cli {
      config: cfg.path().to_path_buf(),
      out_dir: out.path().to_path_buf(),
      dry_run: true,
      verbose: 0,
      sources: vec![PathBuf::from("a.out")],
    };
    assert!(run(&c).unwrap_err().contains("molpro"));
  }
}
