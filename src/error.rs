use std::path::PathBuf;

use crate::config::ConfigError;

// ── Stage errors ──────────────────────────────────────────────────────────────

/// Malformed or unrecognised content inside a recognised section of the
/// source file. `line` is the 1-based position in the trimmed, non-empty line
/// sequence handed to the parser.
#[derive(Debug, PartialEq)]
pub enum ParseError {
  InvalidMultiplicity { line: usize, value: String },
  NegativeExcitationIndex { line: usize, index: i64 },
  NegativeEnergy { line: usize, energy: f64 },
  InvalidNumber { line: usize, text: String },
  /// Excited states must be numbered 1, 2, 3, ... in order of appearance.
  NonContiguousState { line: usize, expected: usize, found: usize },
  /// An excitation-energy line not followed by its multiplicity line.
  MissingMultiplicity { line: usize, state: usize },
}

impl std::fmt::Display for ParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ParseError::InvalidMultiplicity { line, value } =>
        write!(f, "line {}: unknown multiplicity {:?}", line, value),
      ParseError::NegativeExcitationIndex { line, index } =>
        write!(f, "line {}: excited state index must be >= 0, got {}", line, index),
      ParseError::NegativeEnergy { line, energy } =>
        write!(f, "line {}: excitation energy must be >= 0, got {}", line, energy),
      ParseError::InvalidNumber { line, text } =>
        write!(f, "line {}: cannot parse {:?} as a number", line, text),
      ParseError::NonContiguousState { line, expected, found } =>
        write!(f, "line {}: expected excited state {}, found {}", line, expected, found),
      ParseError::MissingMultiplicity { line, state } =>
        write!(f, "line {}: excited state {} has no multiplicity line", line, state),
    }
  }
}

#[derive(Debug, PartialEq)]
pub enum DimensionError {
  /// `kind` names the relation holding the bad index ("coupling", "dipole", ...).
  IndexOutOfRange { kind: &'static str, index: usize, n: usize },
  UnknownLabel(String),
  AmbiguousLabel { label: String, matches: usize },
  ShapeMismatch { expected: (usize, usize), found: (usize, usize) },
}

impl std::fmt::Display for DimensionError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DimensionError::IndexOutOfRange { kind, index, n } =>
        write!(f, "{} index {} is outside [0, {})", kind, index, n),
      DimensionError::UnknownLabel(s) =>
        write!(f, "no state is labelled {:?}", s),
      DimensionError::AmbiguousLabel { label, matches } =>
        write!(f, "label {:?} matches {} states", label, matches),
      DimensionError::ShapeMismatch { expected, found } =>
        write!(f, "expected a {}×{} matrix, found {}×{}",
          expected.0, expected.1, found.0, found.1),
    }
  }
}

#[derive(Debug, PartialEq)]
pub enum NumericalError {
  NonFiniteInput { row: usize, col: usize },
  NonFiniteEigenvalue(usize),
  NonFiniteEigenvector { row: usize, col: usize },
}

impl std::fmt::Display for NumericalError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      NumericalError::NonFiniteInput { row, col } =>
        write!(f, "Hamiltonian entry [{}][{}] is not finite", row, col),
      NumericalError::NonFiniteEigenvalue(i) =>
        write!(f, "eigenvalue {} is not finite", i),
      NumericalError::NonFiniteEigenvector { row, col } =>
        write!(f, "eigenvector entry [{}][{}] is not finite", row, col),
    }
  }
}

#[derive(Debug, PartialEq)]
pub enum SubmissionError {
  Spawn { command: String, reason: String },
  /// `code` is `None` when the process was terminated by a signal.
  ExitStatus { command: String, code: Option<i32> },
}

impl std::fmt::Display for SubmissionError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SubmissionError::Spawn { command, reason } =>
        write!(f, "could not run {:?}: {}", command, reason),
      SubmissionError::ExitStatus { command, code: Some(c) } =>
        write!(f, "{:?} exited with status {}", command, c),
      SubmissionError::ExitStatus { command, code: None } =>
        write!(f, "{:?} was terminated by a signal", command),
    }
  }
}

/// Anything a source parser can reject: the text itself, or a label that does
/// not resolve against the state list built so far.
#[derive(Debug, PartialEq)]
pub enum SourceError {
  Parse(ParseError),
  Dimension(DimensionError),
}

impl std::fmt::Display for SourceError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SourceError::Parse(e) => write!(f, "parse error: {}", e),
      SourceError::Dimension(e) => write!(f, "dimension error: {}", e),
    }
  }
}

impl From<ParseError> for SourceError {
  fn from(e: ParseError) -> Self {
    SourceError::Parse(e)
  }
}

impl From<DimensionError> for SourceError {
  fn from(e: DimensionError) -> Self {
    SourceError::Dimension(e)
  }
}

// ── Run-level error ───────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum PipelineError {
  Config(ConfigError),
  Parse(ParseError),
  Dimension(DimensionError),
  Numerical(NumericalError),
  Submission(SubmissionError),
  Io { path: PathBuf, reason: String },
  /// The output folder of a molecule cannot be used without destroying
  /// something that must survive (its own source, another molecule's data).
  OutputClash { path: PathBuf, reason: String },
}

impl PipelineError {
  /// Wraps an I/O failure together with the path it happened on.
  pub fn io(path: impl Into<PathBuf>, e: std::io::Error) -> Self {
    PipelineError::Io { path: path.into(), reason: e.to_string() }
  }

  /// Whether this error stops the remaining molecules of a batch. Only a
  /// failed submission does, and only when the configuration asks for it.
  pub fn is_fatal_for_batch(&self, abort_on_submission: bool) -> bool {
    matches!(self, PipelineError::Submission(_)) && abort_on_submission
  }
}

impl std::fmt::Display for PipelineError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PipelineError::Config(e) => write!(f, "configuration error: {}", e),
      PipelineError::Parse(e) => write!(f, "parse error: {}", e),
      PipelineError::Dimension(e) => write!(f, "dimension error: {}", e),
      PipelineError::Numerical(e) => write!(f, "numerical error: {}", e),
      PipelineError::Submission(e) => write!(f, "submission error: {}", e),
      PipelineError::Io { path, reason } =>
        write!(f, "I/O error on {}: {}", path.display(), reason),
      PipelineError::OutputClash { path, reason } =>
        write!(f, "cannot write {}: {}", path.display(), reason),
    }
  }
}

impl std::error::Error for PipelineError {}

impl From<ConfigError> for PipelineError {
  fn from(e: ConfigError) -> Self {
    PipelineError::Config(e)
  }
}

impl From<SourceError> for PipelineError {
  fn from(e: SourceError) -> Self {
    match e {
      SourceError::Parse(p) => PipelineError::Parse(p),
      SourceError::Dimension(d) => PipelineError::Dimension(d),
    }
  }
}

impl From<DimensionError> for PipelineError {
  fn from(e: DimensionError) -> Self {
    PipelineError::Dimension(e)
  }
}

impl From<NumericalError> for PipelineError {
  fn from(e: NumericalError) -> Self {
    PipelineError::Numerical(e)
  }
}

impl From<SubmissionError> for PipelineError {
  fn from(e: SubmissionError) -> Self {
    PipelineError::Submission(e)
  }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
