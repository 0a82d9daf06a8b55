use std::path::Path;

use crate::density::FinalDensity;
use crate::source::{Multiplicity, SourceFormat};

// ── Error type ────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum ConfigError {
  IoError(String),
  InvalidYaml(String),
  MissingField(String),
  InvalidValue { field: String, reason: String },
  UnknownField(String),
  UnknownSourceFormat { key: String, supported: Vec<&'static str> },
}

impl std::fmt::Display for ConfigError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConfigError::IoError(s) =>
        write!(f, "I/O error: {}", s),
      ConfigError::InvalidYaml(s) =>
        write!(f, "invalid YAML: {}", s),
      ConfigError::MissingField(s) =>
        write!(f, "missing required field: {}", s),
      ConfigError::InvalidValue { field, reason } =>
        write!(f, "invalid value for {}: {}", field, reason),
      ConfigError::UnknownField(s) =>
        write!(f, "unknown field: {:?}", s),
      ConfigError::UnknownSourceFormat { key, supported } =>
        write!(f, "unknown source format {:?} (supported: {})", key, supported.join(", ")),
    }
  }
}

// ── Public types ──────────────────────────────────────────────────────────────

/// Knobs handed to the optimal-control solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
  pub niter: usize,
  pub threshold: f64,
  pub time_step: f64,
  pub initial_step: f64,
  pub nstep: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PulseParams {
  pub shape: String,
  pub pixels: usize,
  pub energy: f64,
  /// Spectral width in cm⁻¹.
  pub width: f64,
}

/// Names of every file written for a molecule. All have defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNames {
  pub data_dir: String,
  pub mime: String,
  pub states: String,
  pub energies_prefix: String,
  pub eigenvectors: String,
  pub transpose: String,
  pub momdip_zero: String,
  pub momdip_eigen: String,
  pub init_density: String,
  pub final_density: String,
  pub projector_prefix: String,
  pub guess_pulse: String,
  pub param_opt: String,
  pub param_replay: String,
  pub job_manifest: String,
}

impl Default for FileNames {
  fn default() -> Self {
    FileNames {
      data_dir: "data".to_string(),
      mime: "mime".to_string(),
      states: "states.csv".to_string(),
      energies_prefix: "energies".to_string(),
      eigenvectors: "mat_et0".to_string(),
      transpose: "mat_0te".to_string(),
      momdip_zero: "momdip_0".to_string(),
      momdip_eigen: "momdip_e".to_string(),
      init_density: "fondamental_1".to_string(),
      final_density: "final_1".to_string(),
      projector_prefix: "projector".to_string(),
      guess_pulse: "guess_pulse_param".to_string(),
      param_opt: "param.nml".to_string(),
      param_replay: "param_pcp.nml".to_string(),
      job_manifest: "job.sh".to_string(),
    }
  }
}

impl FileNames {
  /// `energies_cm-1`, `energies_ua`, ... for the given unit suffix.
  pub fn energies(&self, unit: &str) -> String {
    format!("{}_{}", self.energies_prefix, unit)
  }

  /// `projectorT1_1` for the state labelled `T1`.
  pub fn projector(&self, label: &str) -> String {
    format!("{}{}_1", self.projector_prefix, label)
  }
}

/// Batch-scheduler settings shared by every job of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobParams {
  pub partition: String,
  pub walltime: String,
  pub memory_mb: usize,
  pub solver_command: String,
  pub submit_command: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  pub source_format: SourceFormat,
  pub target_multiplicity: Multiplicity,
  pub final_density: FinalDensity,
  /// Also render the "replay with final pulse" parameter file.
  pub replay_variant: bool,
  pub abort_batch_on_submission_error: bool,
  pub solver: SolverParams,
  pub pulse: PulseParams,
  pub files: FileNames,
  pub job: JobParams,
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Reads the file at `path` and delegates to [`parse_config_str`].
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
  let yaml = std::fs::read_to_string(path)
    .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
  parse_config_str(&yaml)
}

/// Parses and fully validates a YAML run configuration.
pub fn parse_config_str(yaml: &str) -> Result<Config, ConfigError> {
  let value: serde_yaml::Value = serde_yaml::from_str(yaml)
    .map_err(|e| ConfigError::InvalidYaml(e.to_string()))?;

  let m = match &value {
    serde_yaml::Value::Mapping(m) => m,
    _ => return Err(ConfigError::InvalidYaml(
      "expected a mapping at top level".to_string()
    )),
  };

  check_keys(m, "", &[
    "source_format",
    "target_multiplicity",
    "final_density",
    "replay_variant",
    "abort_batch_on_submission_error",
    "solver",
    "pulse",
    "files",
    "job",
  ])?;

  let key = req_str(m, "", "source_format")?;
  let source_format = SourceFormat::from_key(&key).ok_or_else(|| {
    ConfigError::UnknownSourceFormat { key: key.clone(), supported: SourceFormat::supported() }
  })?;

  let target_multiplicity = {
    let s = req_str(m, "", "target_multiplicity")?;
    Multiplicity::from_name(&s).ok_or_else(|| ConfigError::InvalidValue {
      field: "target_multiplicity".to_string(),
      reason: format!("unrecognised multiplicity {:?}", s),
    })?
  };

  let final_density = match opt_str(m, "", "final_density")?.as_deref() {
    None | Some("ground") => FinalDensity::Ground,
    Some("zero") => FinalDensity::Zero,
    Some(other) => return Err(ConfigError::InvalidValue {
      field: "final_density".to_string(),
      reason: format!("expected \"ground\" or \"zero\", got {:?}", other),
    }),
  };

  let replay_variant = opt_bool(m, "", "replay_variant")?.unwrap_or(true);
  let abort_batch_on_submission_error =
    opt_bool(m, "", "abort_batch_on_submission_error")?.unwrap_or(true);

  Ok(Config {
    source_format,
    target_multiplicity,
    final_density,
    replay_variant,
    abort_batch_on_submission_error,
    solver: parse_solver(m)?,
    pulse: parse_pulse(m)?,
    files: parse_files(m)?,
    job: parse_job(m)?,
  })
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Look up a string key in a YAML mapping.
fn map_get<'a>(
  m: &'a serde_yaml::Mapping,
  key: &str,
) -> Option<&'a serde_yaml::Value> {
  m.iter()
   .find(|(k, _)| k.as_str() == Some(key))
   .map(|(_, v)| v)
}

/// Dotted field name for error messages.
fn field(prefix: &str, key: &str) -> String {
  if prefix.is_empty() { key.to_string() } else { format!("{}.{}", prefix, key) }
}

fn invalid(prefix: &str, key: &str, reason: impl Into<String>) -> ConfigError {
  ConfigError::InvalidValue { field: field(prefix, key), reason: reason.into() }
}

/// Reject keys outside `known`.
fn check_keys(m: &serde_yaml::Mapping, prefix: &str, known: &[&str]) -> Result<(), ConfigError> {
  for (key, _) in m.iter() {
    let k = key.as_str().unwrap_or("");
    if !known.contains(&k) {
      return Err(ConfigError::UnknownField(field(prefix, k)));
    }
  }
  Ok(())
}

fn sub_mapping<'a>(
  m: &'a serde_yaml::Mapping,
  key: &str,
) -> Result<Option<&'a serde_yaml::Mapping>, ConfigError> {
  match map_get(m, key) {
    None => Ok(None),
    Some(v) => v.as_mapping().map(Some).ok_or_else(|| invalid("", key, "expected a mapping")),
  }
}

fn opt_str(m: &serde_yaml::Mapping, prefix: &str, key: &str) -> Result<Option<String>, ConfigError> {
  match map_get(m, key) {
    None => Ok(None),
    Some(v) => {
      let s = v.as_str().ok_or_else(|| invalid(prefix, key, "expected a string"))?;
      if s.is_empty() {
        return Err(invalid(prefix, key, "must not be empty"));
      }
      Ok(Some(s.to_string()))
    }
  }
}

fn req_str(m: &serde_yaml::Mapping, prefix: &str, key: &str) -> Result<String, ConfigError> {
  opt_str(m, prefix, key)?.ok_or_else(|| ConfigError::MissingField(field(prefix, key)))
}

fn opt_bool(m: &serde_yaml::Mapping, prefix: &str, key: &str) -> Result<Option<bool>, ConfigError> {
  match map_get(m, key) {
    None => Ok(None),
    Some(v) => v.as_bool().map(Some).ok_or_else(|| invalid(prefix, key, "expected a boolean")),
  }
}

fn positive_f64(m: &serde_yaml::Mapping, prefix: &str, key: &str) -> Result<f64, ConfigError> {
  let v = map_get(m, key).ok_or_else(|| ConfigError::MissingField(field(prefix, key)))?;
  let x = v.as_f64().ok_or_else(|| invalid(prefix, key, "expected a number"))?;
  if x <= 0.0 || !x.is_finite() {
    return Err(invalid(prefix, key, format!("must be > 0, got {}", x)));
  }
  Ok(x)
}

fn positive_usize(
  m: &serde_yaml::Mapping,
  prefix: &str,
  key: &str,
  default: Option<usize>,
) -> Result<usize, ConfigError> {
  let v = match (map_get(m, key), default) {
    (Some(v), _) => v,
    (None, Some(d)) => return Ok(d),
    (None, None) => return Err(ConfigError::MissingField(field(prefix, key))),
  };
  let n = v.as_i64().ok_or_else(|| invalid(prefix, key, "expected an integer"))?;
  if n <= 0 {
    return Err(invalid(prefix, key, format!("must be > 0, got {}", n)));
  }
  Ok(n as usize)
}

fn parse_solver(m: &serde_yaml::Mapping) -> Result<SolverParams, ConfigError> {
  let s = sub_mapping(m, "solver")?
    .ok_or_else(|| ConfigError::MissingField("solver".to_string()))?;
  check_keys(s, "solver", &["niter", "threshold", "time_step", "initial_step", "nstep"])?;
  Ok(SolverParams {
    niter: positive_usize(s, "solver", "niter", None)?,
    threshold: positive_f64(s, "solver", "threshold")?,
    time_step: positive_f64(s, "solver", "time_step")?,
    initial_step: positive_f64(s, "solver", "initial_step")?,
    nstep: positive_usize(s, "solver", "nstep", Some(10000))?,
  })
}

fn parse_pulse(m: &serde_yaml::Mapping) -> Result<PulseParams, ConfigError> {
  let p = sub_mapping(m, "pulse")?
    .ok_or_else(|| ConfigError::MissingField("pulse".to_string()))?;
  check_keys(p, "pulse", &["shape", "pixels", "energy", "width"])?;
  Ok(PulseParams {
    shape: req_str(p, "pulse", "shape")?,
    pixels: positive_usize(p, "pulse", "pixels", None)?,
    energy: positive_f64(p, "pulse", "energy")?,
    width: positive_f64(p, "pulse", "width")?,
  })
}

fn parse_files(m: &serde_yaml::Mapping) -> Result<FileNames, ConfigError> {
  let mut files = FileNames::default();
  let Some(f) = sub_mapping(m, "files")? else {
    return Ok(files);
  };
  let slots: [(&str, &mut String); 15] = [
    ("data_dir", &mut files.data_dir),
    ("mime", &mut files.mime),
    ("states", &mut files.states),
    ("energies_prefix", &mut files.energies_prefix),
    ("eigenvectors", &mut files.eigenvectors),
    ("transpose", &mut files.transpose),
    ("momdip_zero", &mut files.momdip_zero),
    ("momdip_eigen", &mut files.momdip_eigen),
    ("init_density", &mut files.init_density),
    ("final_density", &mut files.final_density),
    ("projector_prefix", &mut files.projector_prefix),
    ("guess_pulse", &mut files.guess_pulse),
    ("param_opt", &mut files.param_opt),
    ("param_replay", &mut files.param_replay),
    ("job_manifest", &mut files.job_manifest),
  ];
  let known: Vec<&str> = slots.iter().map(|(k, _)| *k).collect();
  check_keys(f, "files", &known)?;
  for (key, slot) in slots {
    if let Some(name) = opt_str(f, "files", key)? {
      if name.contains('/') {
        return Err(invalid("files", key, "must be a bare file name"));
      }
      *slot = name;
    }
  }
  if looks_like_state_label(&files.data_dir) {
    return Err(invalid(
      "files",
      "data_dir",
      format!("{:?} would clash with the job folder of that state", files.data_dir),
    ));
  }
  Ok(files)
}

/// Job folders are named after state labels (`S1`, `T2`, ...).
fn looks_like_state_label(name: &str) -> bool {
  let mut chars = name.chars();
  matches!(chars.next(), Some('S' | 'D' | 'T' | 'Q'))
    && !chars.as_str().is_empty()
    && chars.all(|c| c.is_ascii_digit())
}

fn parse_job(m: &serde_yaml::Mapping) -> Result<JobParams, ConfigError> {
  let j = sub_mapping(m, "job")?
    .ok_or_else(|| ConfigError::MissingField("job".to_string()))?;
  check_keys(j, "job", &["partition", "walltime", "memory_mb", "solver_command", "submit_command"])?;
  Ok(JobParams {
    partition: req_str(j, "job", "partition")?,
    walltime: req_str(j, "job", "walltime")?,
    memory_mb: positive_usize(j, "job", "memory_mb", None)?,
    solver_command: req_str(j, "job", "solver_command")?,
    submit_command: opt_str(j, "job", "submit_command")?.unwrap_or_else(|| "sbatch".to_string()),
  })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
