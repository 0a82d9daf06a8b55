//! Canonical electronic-structure model shared by every source format, and the
//! registry that maps a format key to its parser.

pub mod qchem;

use crate::error::{DimensionError, SourceError};

/// eV → cm⁻¹.
pub const EV_TO_CM1: f64 = 8065.6;

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
  Singlet,
  Doublet,
  Triplet,
  Quartet,
}

impl Multiplicity {
  /// Accepts the spelled-out name as printed by the upstream programs.
  pub fn from_name(name: &str) -> Option<Multiplicity> {
    match name {
      "Singlet" => Some(Multiplicity::Singlet),
      "Doublet" => Some(Multiplicity::Doublet),
      "Triplet" => Some(Multiplicity::Triplet),
      "Quartet" => Some(Multiplicity::Quartet),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Multiplicity::Singlet => "Singlet",
      Multiplicity::Doublet => "Doublet",
      Multiplicity::Triplet => "Triplet",
      Multiplicity::Quartet => "Quartet",
    }
  }

  /// First letter of the state labels (`S1`, `T2`, ...).
  pub fn letter(self) -> char {
    match self {
      Multiplicity::Singlet => 'S',
      Multiplicity::Doublet => 'D',
      Multiplicity::Triplet => 'T',
      Multiplicity::Quartet => 'Q',
    }
  }
}

/// One electronic state. `index` equals the position in the state list and
/// `energy` is in cm⁻¹.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
  pub index: usize,
  pub multiplicity: Multiplicity,
  pub energy: f64,
  pub label: String,
}

impl State {
  pub fn ground() -> State {
    State {
      index: 0,
      multiplicity: Multiplicity::Singlet,
      energy: 0.0,
      label: "S0".to_string(),
    }
  }
}

/// Symmetric relation between two states; a self-coupling is a diagonal energy.
#[derive(Debug, Clone, PartialEq)]
pub struct Coupling {
  pub state_a: usize,
  pub state_b: usize,
  pub value: f64,
}

/// Transition dipole moment in the zero-order basis (atomic units).
#[derive(Debug, Clone, PartialEq)]
pub struct DipoleMoment {
  pub state_a: usize,
  pub state_b: usize,
  pub value: f64,
}

/// Outcome of scanning for one section: either the entries found between its
/// markers (possibly none), or the start marker that never matched.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
  Found(Vec<T>),
  Missing { marker: &'static str },
}

impl<T> Section<T> {
  /// Entries of the section; a missing section reads as empty.
  pub fn entries(&self) -> &[T] {
    match self {
      Section::Found(v) => v,
      Section::Missing { .. } => &[],
    }
  }

  pub fn missing_marker(&self) -> Option<&'static str> {
    match self {
      Section::Found(_) => None,
      Section::Missing { marker } => Some(*marker),
    }
  }
}

#[derive(Debug, PartialEq)]
pub struct ParsedSource {
  /// Ground state first, then the excited states in source order.
  pub states: Vec<State>,
  /// Start marker of the state table, when the table was not found.
  pub states_missing: Option<&'static str>,
  pub couplings: Section<Coupling>,
  pub dipoles: Section<DipoleMoment>,
}

impl ParsedSource {
  /// `(section, marker)` for every section whose start marker never matched.
  pub fn missing_sections(&self) -> Vec<(&'static str, &'static str)> {
    let mut out = Vec::new();
    if let Some(m) = self.states_missing {
      out.push(("states", m));
    }
    if let Some(m) = self.couplings.missing_marker() {
      out.push(("couplings", m));
    }
    if let Some(m) = self.dipoles.missing_marker() {
      out.push(("dipole moments", m));
    }
    out
  }
}

// ── Format registry ───────────────────────────────────────────────────────────

type ParseFn = fn(&[&str]) -> Result<ParsedSource, SourceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
  QChem,
}

const REGISTRY: &[(&str, SourceFormat)] = &[("qchem", SourceFormat::QChem)];

impl SourceFormat {
  /// Case-insensitive lookup of a configured format key.
  pub fn from_key(key: &str) -> Option<SourceFormat> {
    let key = key.to_lowercase();
    REGISTRY.iter().find(|(k, _)| *k == key).map(|(_, f)| *f)
  }

  pub fn key(self) -> &'static str {
    REGISTRY
      .iter()
      .find(|(_, f)| *f == self)
      .map(|(k, _)| *k)
      .unwrap_or("unknown")
  }

  pub fn supported() -> Vec<&'static str> {
    REGISTRY.iter().map(|(k, _)| *k).collect()
  }

  fn parser(self) -> ParseFn {
    match self {
      SourceFormat::QChem => qchem::parse,
    }
  }

  /// Parses the prepared line sequence (see [`prepare_lines`]).
  pub fn parse(self, lines: &[&str]) -> Result<ParsedSource, SourceError> {
    (self.parser())(lines)
  }
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Trims every line and drops the blank ones.
pub fn prepare_lines(text: &str) -> Vec<&str> {
  text.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// Looks up the 0-based index of the unique state carrying `label`.
pub fn resolve_label(states: &[State], label: &str) -> Result<usize, DimensionError> {
  let mut matches = states.iter().filter(|s| s.label == label);
  match (matches.next(), matches.count()) {
    (None, _) => Err(DimensionError::UnknownLabel(label.to_string())),
    (Some(s), 0) => Ok(s.index),
    (Some(_), rest) => Err(DimensionError::AmbiguousLabel {
      label: label.to_string(),
      matches: rest + 1,
    }),
  }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn state(index: usize, m: Multiplicity, label: &str) -> State {
    State { index, multiplicity: m, energy: 0.0, label: label.to_string() }
  }

  #[test]
  fn registry_is_case_insensitive() {
    assert_eq!(SourceFormat::from_key("qchem"), Some(SourceFormat::QChem));
    assert_eq!(SourceFormat::from_key("QChem"), Some(SourceFormat::QChem));
    assert_eq!(SourceFormat::from_key("orca"), None);
    assert_eq!(SourceFormat::QChem.key(), "qchem");
    assert_eq!(SourceFormat::supported(), vec!["qchem"]);
  }

  #[test]
  fn prepare_lines_trims_and_drops_blanks() {
    let text = "  first  \n\n\t\n second\n";
    assert_eq!(prepare_lines(text), vec!["first", "second"]);
  }

  #[test]
  fn resolve_label_finds_unique_state() {
    let states = vec![
      state(0, Multiplicity::Singlet, "S0"),
      state(1, Multiplicity::Triplet, "T1"),
    ];
    assert_eq!(resolve_label(&states, "T1"), Ok(1));
  }

  #[test]
  fn resolve_label_rejects_unknown_label() {
    let states = vec![state(0, Multiplicity::Singlet, "S0")];
    assert_eq!(
      resolve_label(&states, "T4"),
      Err(DimensionError::UnknownLabel("T4".to_string()))
    );
  }

  #[test]
  fn resolve_label_rejects_duplicates() {
    let states = vec![
      state(0, Multiplicity::Singlet, "S0"),
      state(1, Multiplicity::Triplet, "T1"),
      state(2, Multiplicity::Triplet, "T1"),
    ];
    assert_eq!(
      resolve_label(&states, "T1"),
      Err(DimensionError::AmbiguousLabel { label: "T1".to_string(), matches: 2 })
    );
  }

  #[test]
  fn missing_section_reads_as_empty() {
    let s: Section<Coupling> = Section::Missing { marker: "SOC" };
    assert!(s.entries().is_empty());
    assert_eq!(s.missing_marker(), Some("SOC"));
  }

  #[test]
  fn multiplicity_letters() {
    assert_eq!(Multiplicity::Triplet.letter(), 'T');
    assert_eq!(Multiplicity::from_name("Singlet"), Some(Multiplicity::Singlet));
    assert_eq!(Multiplicity::from_name("singlet"), None);
  }
}
