//! Per-molecule orchestration: parse, build, diagonalise, transform, write,
//! submit. The pipeline owns all file-system effects and error recovery; the
//! stages it calls are pure.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use faer::Mat;
use faer::complex_native::c64;

use crate::config::Config;
use crate::density::{final_density, initial_density, projectors, target_states, Projector};
use crate::diag::{diagonalize, Eigensystem, EnergyUnits};
use crate::dipole::{to_eigenbasis, zero_order_matrix};
use crate::emit::{
  write_data, write_file, DataProducts, GuessPulse, JobManifest, ParamFile, ParamVariant, Submitter,
};
use crate::error::PipelineError;
use crate::hamiltonian::build_mime;
use crate::source::{prepare_lines, State};

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub struct MoleculeReport {
  pub name: String,
  pub states: usize,
  /// Labels of the target states, in state order.
  pub targets: Vec<String>,
  /// Job folders whose manifest was accepted by the submitter.
  pub submitted: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
  pub succeeded: Vec<MoleculeReport>,
  pub failed: Vec<(PathBuf, PipelineError)>,
  /// Sources never attempted because an earlier failure stopped the batch.
  pub skipped: Vec<PathBuf>,
}

impl BatchReport {
  pub fn all_succeeded(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  pub fn summary(&self) -> String {
    let jobs: usize = self.succeeded.iter().map(|r| r.submitted.len()).sum();
    format!(
      "{} molecule(s) processed, {} failed, {} skipped, {} job(s) submitted",
      self.succeeded.len(),
      self.failed.len(),
      self.skipped.len(),
      jobs
    )
  }
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Processes one source file into `out_root/<file stem>`.
///
/// Nothing on disk changes until the source has been parsed and every matrix
/// computed. Only then is the molecule folder recreated from scratch. When a
/// later step fails before any job has been submitted the folder is removed
/// again; once a job is in the scheduler's hands the folder is left in place.
pub fn process_molecule(
  source: &Path,
  cfg: &Config,
  out_root: &Path,
  submitter: &dyn Submitter,
) -> Result<MoleculeReport, PipelineError> {
  let name = molecule_name(source)?;
  let mol_dir = out_root.join(&name);
  if is_inside(&mol_dir, source) {
    return Err(PipelineError::OutputClash {
      path: mol_dir,
      reason: format!("the source {} lies inside it", source.display()),
    });
  }
  log::info!("processing {} into {}", source.display(), mol_dir.display());

  let mut report = MoleculeReport { name, states: 0, targets: Vec::new(), submitted: Vec::new() };
  let computed = compute(source, cfg, &mut report)?;
  let result = write_molecule(cfg, &mol_dir, &computed)
    .and_then(|()| submit_targets(cfg, &mol_dir, submitter, &mut report));

  match result {
    Ok(()) => Ok(report),
    Err(e) => {
      if report.submitted.is_empty() {
        if let Err(rm) = fs::remove_dir_all(&mol_dir) {
          log::debug!("could not remove {}: {}", mol_dir.display(), rm);
        }
      } else {
        log::warn!(
          "{}: keeping {} after {} submitted job(s)",
          report.name,
          mol_dir.display(),
          report.submitted.len()
        );
      }
      Err(e)
    }
  }
}

/// Runs every source in turn. A failed molecule does not stop the batch
/// unless [`PipelineError::is_fatal_for_batch`] says so. A source whose file
/// stem was already used in this batch is refused, since its folder holds
/// the data of jobs submitted for the earlier one.
pub fn run_batch(
  sources: &[PathBuf],
  cfg: &Config,
  out_root: &Path,
  submitter: &dyn Submitter,
) -> BatchReport {
  let mut batch = BatchReport::default();
  let mut claimed: HashMap<String, &Path> = HashMap::new();
  for (i, source) in sources.iter().enumerate() {
    if let Ok(name) = molecule_name(source) {
      if let Some(first) = claimed.get(&name) {
        let e = PipelineError::OutputClash {
          path: out_root.join(&name),
          reason: format!("already used for {}", first.display()),
        };
        log::error!("{}: {}", source.display(), e);
        batch.failed.push((source.clone(), e));
        continue;
      }
      claimed.insert(name, source.as_path());
    }

    match process_molecule(source, cfg, out_root, submitter) {
      Ok(report) => batch.succeeded.push(report),
      Err(e) => {
        log::error!("{}: {}", source.display(), e);
        let fatal = e.is_fatal_for_batch(cfg.abort_batch_on_submission_error);
        batch.failed.push((source.clone(), e));
        if fatal {
          log::error!("submission failed, aborting the remaining molecules");
          batch.skipped.extend(sources[i + 1..].iter().cloned());
          break;
        }
      }
    }
  }
  batch
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Everything a molecule writes to its data folder.
struct Computed {
  states: Vec<State>,
  mime: Mat<f64>,
  eigen: Eigensystem,
  units: EnergyUnits,
  momdip_zero: Mat<f64>,
  momdip_eigen: Mat<f64>,
  init_density: Mat<c64>,
  final_density: Mat<c64>,
  projectors: Vec<Projector>,
}

fn molecule_name(source: &Path) -> Result<String, PipelineError> {
  source
    .file_stem()
    .and_then(|s| s.to_str())
    .map(str::to_string)
    .ok_or_else(|| PipelineError::Io {
      path: source.to_path_buf(),
      reason: "cannot derive a molecule name from this path".to_string(),
    })
}

/// Whether `path` resolves to somewhere below the existing folder `dir`.
fn is_inside(dir: &Path, path: &Path) -> bool {
  match (dir.canonicalize(), path.canonicalize()) {
    (Ok(dir), Ok(path)) => path.starts_with(dir),
    _ => false,
  }
}

fn recreate_dir(dir: &Path) -> Result<(), PipelineError> {
  if dir.exists() {
    fs::remove_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
  }
  fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
}

/// Parses the source and runs every numerical stage, without touching disk.
fn compute(
  source: &Path,
  cfg: &Config,
  report: &mut MoleculeReport,
) -> Result<Computed, PipelineError> {
  let text = fs::read_to_string(source).map_err(|e| PipelineError::io(source, e))?;
  log::debug!("{}: parsing as {}", report.name, cfg.source_format.key());
  let parsed = cfg.source_format.parse(&prepare_lines(&text))?;
  for (section, marker) in parsed.missing_sections() {
    log::warn!(
      "{}: no {} section found (marker {:?} never matched), treating it as empty",
      report.name,
      section,
      marker
    );
  }
  let n = parsed.states.len();
  report.states = n;
  log::info!(
    "{}: {} states, {} couplings, {} dipole moments",
    report.name,
    n,
    parsed.couplings.entries().len(),
    parsed.dipoles.entries().len()
  );

  let mime = build_mime(&parsed.states, parsed.couplings.entries())?;
  let eigen = diagonalize(&mime)?;
  let units = EnergyUnits::from_cm1(&eigen.values);
  for (i, &cm1) in units.cm1.iter().enumerate() {
    log::info!(
      "eigenvalue {}: {:.4} cm-1, {:.6e} ua, {:.4} nm, {:.6} eV",
      i,
      cm1,
      units.ua[i],
      units.nm[i],
      units.ev[i]
    );
    if !units.nm[i].is_finite() {
      log::warn!("{}: eigenvalue {} is zero, its wavelength is not finite", report.name, i);
    }
  }

  let momdip_zero = zero_order_matrix(n, parsed.dipoles.entries())?;
  let momdip_eigen = to_eigenbasis(&momdip_zero, &eigen.transpose)?;

  let targets = target_states(&parsed.states, cfg.target_multiplicity);
  if targets.is_empty() {
    log::warn!(
      "{}: no {} state found, no job will be submitted",
      report.name,
      cfg.target_multiplicity.name()
    );
  }
  report.targets = targets.iter().map(|s| s.label.clone()).collect();

  Ok(Computed {
    init_density: initial_density(n),
    final_density: final_density(n, cfg.final_density),
    projectors: projectors(&parsed.states, cfg.target_multiplicity),
    states: parsed.states,
    mime,
    eigen,
    units,
    momdip_zero,
    momdip_eigen,
  })
}

/// Recreates the molecule folder and fills its data folder.
fn write_molecule(cfg: &Config, mol_dir: &Path, c: &Computed) -> Result<(), PipelineError> {
  recreate_dir(mol_dir)?;
  let data_dir = mol_dir.join(&cfg.files.data_dir);
  fs::create_dir_all(&data_dir).map_err(|e| PipelineError::io(&data_dir, e))?;

  write_data(
    &data_dir,
    &cfg.files,
    &DataProducts {
      states: &c.states,
      mime: &c.mime,
      eigen: &c.eigen,
      units: &c.units,
      momdip_zero: &c.momdip_zero,
      momdip_eigen: &c.momdip_eigen,
      init_density: &c.init_density,
      final_density: &c.final_density,
      projectors: &c.projectors,
    },
  )?;

  let guess = GuessPulse { pulse: &cfg.pulse, central_frequency: c.eigen.mean_value() };
  write_file(&data_dir, &cfg.files.guess_pulse, &guess.render())?;
  Ok(())
}

/// One job folder per target; the first failed submission stops the rest.
fn submit_targets(
  cfg: &Config,
  mol_dir: &Path,
  submitter: &dyn Submitter,
  report: &mut MoleculeReport,
) -> Result<(), PipelineError> {
  for label in report.targets.clone() {
    let job_dir = mol_dir.join(&label);
    recreate_dir(&job_dir)?;

    let mut param_files = vec![cfg.files.param_opt.as_str()];
    let opt = ParamFile::new(ParamVariant::Optimization, &label, &cfg.files, &cfg.solver);
    write_file(&job_dir, &cfg.files.param_opt, &opt.render())?;
    if cfg.replay_variant {
      let replay = ParamFile::new(ParamVariant::Replay, &label, &cfg.files, &cfg.solver);
      write_file(&job_dir, &cfg.files.param_replay, &replay.render())?;
      param_files.push(cfg.files.param_replay.as_str());
    }

    let manifest = JobManifest {
      job_name: format!("{}_{}", report.name, label),
      job: &cfg.job,
      param_files,
    };
    write_file(&job_dir, &cfg.files.job_manifest, &manifest.render())?;

    submitter.submit(&job_dir, &cfg.files.job_manifest)?;
    report.submitted.push(job_dir);
  }
  Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
