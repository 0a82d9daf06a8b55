//! Text formats understood by the control solver, the renderers for its
//! parameter, guess-pulse and job files, and the job-submission seam.

use std::path::{Path, PathBuf};
use std::process::Command;

use faer::Mat;
use faer::complex_native::c64;

use crate::config::{FileNames, JobParams, PulseParams, SolverParams};
use crate::density::Projector;
use crate::diag::{EnergyUnits, Eigensystem};
use crate::error::{PipelineError, SubmissionError};
use crate::source::State;

// ── Number formats ────────────────────────────────────────────────────────────

/// Scientific notation with a signed, at-least-two-digit exponent
/// (`1.5000000000e+03`). Non-finite values print as `inf`, `-inf`, `nan`.
pub fn format_sci(x: f64, precision: usize) -> String {
  if x.is_nan() {
    return "nan".to_string();
  }
  if x.is_infinite() {
    return if x > 0.0 { "inf".to_string() } else { "-inf".to_string() };
  }
  let raw = format!("{:.*e}", precision, x);
  match raw.split_once('e') {
    Some((mantissa, exp)) => {
      let exp: i32 = exp.parse().unwrap_or(0);
      let sign = if exp < 0 { '-' } else { '+' };
      format!("{}e{}{:02}", mantissa, sign, exp.abs())
    }
    None => raw,
  }
}

/// One row per line, each entry in a sign slot of width 18 with ten decimals.
pub fn format_real_matrix(m: &Mat<f64>) -> String {
  let mut out = String::new();
  for i in 0..m.nrows() {
    let row: Vec<String> = (0..m.ncols())
      .map(|j| {
        let x = m.read(i, j);
        let body = format_sci(x, 10);
        let signed = if x.is_sign_negative() && !x.is_nan() { body } else { format!(" {}", body) };
        format!("{:>18}", signed)
      })
      .collect();
    out.push_str(&row.join(" "));
    out.push('\n');
  }
  out
}

/// One value per line.
pub fn format_vector(v: &[f64]) -> String {
  v.iter().map(|&x| format_sci(x, 10) + "\n").collect()
}

/// Complex grid: every entry rendered as `( re , im )` with two decimals.
pub fn format_complex_matrix(m: &Mat<c64>) -> String {
  let mut out = String::new();
  for i in 0..m.nrows() {
    let row: Vec<String> = (0..m.ncols())
      .map(|j| {
        let z = m.read(i, j);
        format!("( {:.2} , {:.2} )", z.re, z.im)
      })
      .collect();
    out.push_str(&row.join(" "));
    out.push('\n');
  }
  out
}

/// `index;multiplicity;energy;label`, one state per line after a header.
pub fn format_states(states: &[State]) -> String {
  let mut out = String::from("Index;Multiplicity;Energy (cm-1);Label\n");
  for s in states {
    out.push_str(&format!("{};{};{:.6};{}\n", s.index, s.multiplicity.name(), s.energy, s.label));
  }
  out
}

// ── Data files ────────────────────────────────────────────────────────────────

/// Everything computed for one molecule that ends up in its data folder.
pub struct DataProducts<'a> {
  pub states: &'a [State],
  pub mime: &'a Mat<f64>,
  pub eigen: &'a Eigensystem,
  pub units: &'a EnergyUnits,
  pub momdip_zero: &'a Mat<f64>,
  pub momdip_eigen: &'a Mat<f64>,
  pub init_density: &'a Mat<c64>,
  pub final_density: &'a Mat<c64>,
  pub projectors: &'a [Projector],
}

/// Writes `content` to `dir/name`.
pub fn write_file(dir: &Path, name: &str, content: &str) -> Result<PathBuf, PipelineError> {
  let path = dir.join(name);
  std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
  log::debug!("wrote {}", path.display());
  Ok(path)
}

/// Writes every data file of a molecule into `dir` and returns their paths.
pub fn write_data(dir: &Path, names: &FileNames, d: &DataProducts) -> Result<Vec<PathBuf>, PipelineError> {
  let mut written = vec![
    write_file(dir, &names.mime, &format_real_matrix(d.mime))?,
    write_file(dir, &names.states, &format_states(d.states))?,
    write_file(dir, &names.energies("cm-1"), &format_vector(&d.units.cm1))?,
    write_file(dir, &names.energies("ua"), &format_vector(&d.units.ua))?,
    write_file(dir, &names.energies("nm"), &format_vector(&d.units.nm))?,
    write_file(dir, &names.energies("ev"), &format_vector(&d.units.ev))?,
    write_file(dir, &names.eigenvectors, &format_real_matrix(&d.eigen.vectors))?,
    write_file(dir, &names.transpose, &format_real_matrix(&d.eigen.transpose))?,
    write_file(dir, &names.momdip_zero, &format_real_matrix(d.momdip_zero))?,
    write_file(dir, &names.momdip_eigen, &format_real_matrix(d.momdip_eigen))?,
    write_file(dir, &names.init_density, &format_complex_matrix(d.init_density))?,
    write_file(dir, &names.final_density, &format_complex_matrix(d.final_density))?,
  ];
  for p in d.projectors {
    written.push(write_file(dir, &names.projector(&p.label), &format_complex_matrix(&p.matrix))?);
  }
  Ok(written)
}

// ── Renderers ─────────────────────────────────────────────────────────────────

/// Guess-pulse description, rendered once per molecule.
#[derive(Debug, PartialEq)]
pub struct GuessPulse<'a> {
  pub pulse: &'a PulseParams,
  /// Mean eigenvalue, in cm⁻¹.
  pub central_frequency: f64,
}

impl GuessPulse<'_> {
  pub fn render(&self) -> String {
    format!(
      "&guess_pulse\n\
       \x20 shape = '{}'\n\
       \x20 pixels = {}\n\
       \x20 energy = {}\n\
       \x20 width = {}\n\
       \x20 central_frequency = {}\n\
       /\n",
      self.pulse.shape,
      self.pulse.pixels,
      format_sci(self.pulse.energy, 6),
      format_sci(self.pulse.width, 6),
      format_sci(self.central_frequency, 10),
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamVariant {
  /// Optimise the pulse, starting from the guess pulse.
  Optimization,
  /// Propagate again with the pulse produced by the optimisation.
  Replay,
}

impl ParamVariant {
  fn mode(self) -> &'static str {
    match self {
      ParamVariant::Optimization => "opc",
      ParamVariant::Replay => "pcp",
    }
  }
}

/// Relative path, from a job folder, of the pulse written by the optimisation.
pub const FINAL_PULSE: &str = "Pulse/Pulse";

/// Solver parameter file for one target state. Paths are relative to the
/// job folder.
#[derive(Debug, PartialEq)]
pub struct ParamFile<'a> {
  pub variant: ParamVariant,
  pub target: &'a str,
  pub energies: String,
  pub momdip: String,
  pub init_density: String,
  pub final_density: String,
  pub projector: String,
  pub eigenvectors: String,
  pub pulse_source: String,
  pub solver: &'a SolverParams,
}

impl<'a> ParamFile<'a> {
  /// Both files reference the shared data folder one level up; only the
  /// pulse source differs between the variants.
  pub fn new(
    variant: ParamVariant,
    target: &'a str,
    names: &FileNames,
    solver: &'a SolverParams,
  ) -> ParamFile<'a> {
    let data = |name: &str| format!("../{}/{}", names.data_dir, name);
    let pulse_source = match variant {
      ParamVariant::Optimization => data(&names.guess_pulse),
      ParamVariant::Replay => FINAL_PULSE.to_string(),
    };
    ParamFile {
      variant,
      target,
      energies: data(&names.energies("cm-1")),
      momdip: data(&names.momdip_eigen),
      init_density: data(&names.init_density),
      final_density: data(&names.final_density),
      projector: data(&names.projector(target)),
      eigenvectors: data(&names.eigenvectors),
      pulse_source,
      solver,
    }
  }

  pub fn render(&self) -> String {
    format!(
      "&control\n\
       \x20 mode = '{}'\n\
       \x20 target = '{}'\n\
       \x20 niter = {}\n\
       \x20 threshold = {}\n\
       \x20 time_step = {}\n\
       \x20 initial_step = {}\n\
       \x20 nstep = {}\n\
       /\n\
       &files\n\
       \x20 energies = '{}'\n\
       \x20 momdip = '{}'\n\
       \x20 init_density = '{}'\n\
       \x20 final_density = '{}'\n\
       \x20 projector = '{}'\n\
       \x20 eigenvectors = '{}'\n\
       \x20 pulse = '{}'\n\
       /\n",
      self.variant.mode(),
      self.target,
      self.solver.niter,
      format_sci(self.solver.threshold, 6),
      format_sci(self.solver.time_step, 6),
      format_sci(self.solver.initial_step, 6),
      self.solver.nstep,
      self.energies,
      self.momdip,
      self.init_density,
      self.final_density,
      self.projector,
      self.eigenvectors,
      self.pulse_source,
    )
  }
}

/// Batch script that runs the solver on each parameter file in turn.
#[derive(Debug, PartialEq)]
pub struct JobManifest<'a> {
  pub job_name: String,
  pub job: &'a JobParams,
  pub param_files: Vec<&'a str>,
}

impl JobManifest<'_> {
  pub fn render(&self) -> String {
    let mut out = format!(
      "#!/bin/bash\n\
       #SBATCH --job-name={name}\n\
       #SBATCH --partition={}\n\
       #SBATCH --time={}\n\
       #SBATCH --mem={}M\n\
       #SBATCH --output={name}.log\n\
       \n\
       set -e\n",
      self.job.partition,
      self.job.walltime,
      self.job.memory_mb,
      name = self.job_name,
    );
    for p in &self.param_files {
      out.push_str(&format!("{} {}\n", self.job.solver_command, p));
    }
    out
  }
}

// ── Submission ────────────────────────────────────────────────────────────────

/// Hands a rendered job manifest to the batch scheduler. Submission is
/// fire-and-forget: success means the scheduler accepted the job.
pub trait Submitter {
  fn submit(&self, job_dir: &Path, manifest: &str) -> Result<(), SubmissionError>;
}

/// Runs `<command> <manifest>` inside the job folder.
pub struct CommandSubmitter {
  /// Program followed by its fixed arguments, whitespace separated.
  pub command: String,
}

impl Submitter for CommandSubmitter {
  fn submit(&self, job_dir: &Path, manifest: &str) -> Result<(), SubmissionError> {
    let full = format!("{} {}", self.command, manifest);
    let mut words = self.command.split_whitespace();
    let program = words.next().ok_or_else(|| SubmissionError::Spawn {
      command: full.clone(),
      reason: "empty submit command".to_string(),
    })?;
    let status = Command::new(program)
      .args(words)
      .arg(manifest)
      .current_dir(job_dir)
      .status()
      .map_err(|e| SubmissionError::Spawn { command: full.clone(), reason: e.to_string() })?;
    if !status.success() {
      return Err(SubmissionError::ExitStatus { command: full, code: status.code() });
    }
    log::info!("submitted {} in {}", manifest, job_dir.display());
    Ok(())
  }
}

/// Logs what would be submitted without running anything.
pub struct DryRunSubmitter;

impl Submitter for DryRunSubmitter {
  fn submit(&self, job_dir: &Path, manifest: &str) -> Result<(), SubmissionError> {
    log::info!("dry run: would submit {} in {}", manifest, job_dir.display());
    Ok(())
  }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
