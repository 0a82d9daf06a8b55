//! Parser for Q-CHEM TDDFT/TDA outputs with spin-orbit coupling and
//! state-to-state transition moment jobs.

use std::sync::LazyLock;

use regex::Regex;

use super::{
  resolve_label, Coupling, DipoleMoment, Multiplicity, ParsedSource, Section, State, EV_TO_CM1,
};
use crate::error::{ParseError, SourceError};

const STATES_START: &str = "TDDFT/TDA Excitation Energies";
const SOC_START: &str = "SPIN-ORBIT COUPLING JOB BEGINS HERE";
const MOMENTS_START: &str = "STATE-TO-STATE TRANSITION MOMENTS";

static DASHES: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^-{40}").expect("valid regex"));
static STATE_ENERGY: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^Excited state\s+(?P<state>-?\d+): excitation energy \(eV\) =\s+(?P<energy>[-+]?(?:\d*\.\d+|\d+))$",
  )
  .expect("valid regex")
});
static STATE_MULTIPLICITY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^Multiplicity: (?P<mult>\w+)$").expect("valid regex"));

static SOC_BEGIN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^\*+SPIN-ORBIT COUPLING JOB BEGINS HERE\*+$").expect("valid regex")
});
static SOC_END: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\*+SOC CODE ENDS HERE\*+$").expect("valid regex"));
static SOC_FROM_GROUND: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^Total SOC between the singlet ground state and excited triplet states:$")
    .expect("valid regex")
});
static SOC_FROM_STATE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^Total SOC between the (?P<label>[SDTQ]\d+) state and excited triplet states:$")
    .expect("valid regex")
});
static SOC_VALUE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?P<label>[SDTQ]\d+)\s+(?P<value>[-+]?\d+\.?\d*)\s+cm-1$").expect("valid regex")
});

static MOMENTS_BEGIN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^STATE-TO-STATE TRANSITION MOMENTS$").expect("valid regex"));
// Upstream spelling.
static MOMENTS_END: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^END OF TRANSITION MOMEMT CALCULATION$").expect("valid regex")
});
static MOMENT: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^(?P<a>\d+)\s+(?P<b>\d+)(?:\s+-?\d+\.\d+){3}\s+(?P<strength>\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)$",
  )
  .expect("valid regex")
});

// ── Public functions ──────────────────────────────────────────────────────────

/// Extracts states, spin-orbit couplings and transition dipole moments.
///
/// Energies are converted from eV to cm⁻¹. The ground state `S0` is always
/// the first state. A section whose start marker never appears comes back as
/// [`Section::Missing`].
pub fn parse(lines: &[&str]) -> Result<ParsedSource, SourceError> {
  let (states, states_missing) = match parse_states(lines)? {
    Section::Found(states) => (states, None),
    Section::Missing { marker } => (vec![State::ground()], Some(marker)),
  };
  let couplings = parse_couplings(lines, &states)?;
  let dipoles = parse_moments(lines)?;
  Ok(ParsedSource { states, states_missing, couplings, dipoles })
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Lines strictly between the first `start` match and the following `end`
/// match (or the end of input), with the offset of the first body line.
fn section_body<'a, 'b>(
  lines: &'b [&'a str],
  start: &Regex,
  end: &Regex,
) -> Option<(usize, &'b [&'a str])> {
  let begin = lines.iter().position(|l| start.is_match(l))? + 1;
  let len = lines[begin..]
    .iter()
    .position(|l| end.is_match(l))
    .unwrap_or(lines.len() - begin);
  Some((begin, &lines[begin..begin + len]))
}

fn parse_f64(text: &str, line: usize) -> Result<f64, ParseError> {
  text.parse::<f64>().map_err(|_| ParseError::InvalidNumber { line, text: text.to_string() })
}

fn parse_states(lines: &[&str]) -> Result<Section<State>, ParseError> {
  let Some(begin) = lines.iter().position(|l| l.starts_with(STATES_START)) else {
    return Ok(Section::Missing { marker: STATES_START });
  };

  let mut states = vec![State::ground()];
  // Per-multiplicity ordinal; the ground state already holds S0.
  let mut ordinals = [0usize; 4];
  let mut pending: Option<(usize, f64)> = None;
  let mut in_table = false;

  for (offset, line) in lines[begin + 1..].iter().enumerate() {
    let lineno = begin + offset + 2;
    if DASHES.is_match(line) {
      if in_table {
        if let Some((state, _)) = pending {
          return Err(ParseError::MissingMultiplicity { line: lineno, state });
        }
        break;
      }
      in_table = true;
      continue;
    }
    if !in_table {
      continue;
    }

    match pending {
      None => {
        let Some(caps) = STATE_ENERGY.captures(line) else { continue };
        let index: i64 = caps["state"].parse().map_err(|_| ParseError::InvalidNumber {
          line: lineno,
          text: caps["state"].to_string(),
        })?;
        if index < 0 {
          return Err(ParseError::NegativeExcitationIndex { line: lineno, index });
        }
        let energy_ev = parse_f64(&caps["energy"], lineno)?;
        if energy_ev < 0.0 {
          return Err(ParseError::NegativeEnergy { line: lineno, energy: energy_ev });
        }
        if energy_ev == 0.0 {
          log::warn!("line {}: excited state {} has zero excitation energy", lineno, index);
        }
        let expected = states.len();
        if index as usize != expected {
          return Err(ParseError::NonContiguousState {
            line: lineno,
            expected,
            found: index as usize,
          });
        }
        pending = Some((expected, energy_ev * EV_TO_CM1));
      }
      Some((index, energy)) => {
        if STATE_ENERGY.is_match(line) {
          return Err(ParseError::MissingMultiplicity { line: lineno, state: index });
        }
        let Some(caps) = STATE_MULTIPLICITY.captures(line) else { continue };
        let multiplicity = Multiplicity::from_name(&caps["mult"]).ok_or_else(|| {
          ParseError::InvalidMultiplicity { line: lineno, value: caps["mult"].to_string() }
        })?;
        let slot = &mut ordinals[multiplicity as usize];
        *slot += 1;
        states.push(State {
          index,
          multiplicity,
          energy,
          label: format!("{}{}", multiplicity.letter(), slot),
        });
        pending = None;
      }
    }
  }

  if let Some((state, _)) = pending {
    return Err(ParseError::MissingMultiplicity { line: lines.len(), state });
  }
  Ok(Section::Found(states))
}

fn parse_couplings(lines: &[&str], states: &[State]) -> Result<Section<Coupling>, SourceError> {
  let Some((begin, body)) = section_body(lines, &SOC_BEGIN, &SOC_END) else {
    return Ok(Section::Missing { marker: SOC_START });
  };

  let mut couplings = Vec::new();
  let mut primary: Option<usize> = None;

  for (offset, line) in body.iter().enumerate() {
    if SOC_FROM_GROUND.is_match(line) {
      primary = Some(resolve_label(states, "S0")?);
    } else if let Some(caps) = SOC_FROM_STATE.captures(line) {
      primary = Some(resolve_label(states, &caps["label"])?);
    } else if let Some(caps) = SOC_VALUE.captures(line) {
      // Values before the first header have no primary state.
      let Some(state_a) = primary else { continue };
      let state_b = resolve_label(states, &caps["label"])?;
      let value = parse_f64(&caps["value"], begin + offset + 1)?;
      couplings.push(Coupling { state_a, state_b, value });
    }
  }

  Ok(Section::Found(couplings))
}

fn parse_moments(lines: &[&str]) -> Result<Section<DipoleMoment>, ParseError> {
  let Some((begin, body)) = section_body(lines, &MOMENTS_BEGIN, &MOMENTS_END) else {
    return Ok(Section::Missing { marker: MOMENTS_START });
  };

  let mut moments = Vec::new();
  for (offset, line) in body.iter().enumerate() {
    let Some(caps) = MOMENT.captures(line) else { continue };
    let lineno = begin + offset + 1;
    let state_a = caps["a"].parse::<usize>().map_err(|_| ParseError::InvalidNumber {
      line: lineno,
      text: caps["a"].to_string(),
    })?;
    let state_b = caps["b"].parse::<usize>().map_err(|_| ParseError::InvalidNumber {
      line: lineno,
      text: caps["b"].to_string(),
    })?;
    let value = parse_f64(&caps["strength"], lineno)?;
    moments.push(DipoleMoment { state_a, state_b, value });
  }

  Ok(Section::Found(moments))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::DimensionError;
  use crate::source::prepare_lines;

  const OUTPUT: &str = "\
 Welcome to Q-Chem
 ---------------------------------------------------
         TDDFT/TDA Excitation Energies
 ---------------------------------------------------------------------

 Excited state   1: excitation energy (eV) =    2.5000
 Total energy for state   1:                 -400.123456 au
    Multiplicity: Triplet
    Trans. Mom.:  0.0000 X   0.0000 Y   0.0000 Z
    Strength   :     0.0000000000

 Excited state   2: excitation energy (eV) =    3.0000
 Total energy for state   2:                 -400.100000 au
    Multiplicity: Singlet
    Trans. Mom.:  0.1000 X   0.2000 Y   0.0000 Z
    Strength   :     0.0123000000

 Excited state   3: excitation energy (eV) =    3.1000
 Total energy for state   3:                 -400.090000 au
    Multiplicity: Triplet
 ---------------------------------------------------------------------

 *********SPIN-ORBIT COUPLING JOB BEGINS HERE*********
 Total SOC between the singlet ground state and excited triplet states:
 T1      12.500000    cm-1
 T2      30.000000    cm-1

 Total SOC between the S1 state and excited triplet states:
 T1      4.250000    cm-1
 T2      1.000000    cm-1

 Total SOC between the T1 state and excited triplet states:
 T2      0.750000    cm-1
 *********SOC CODE ENDS HERE*********

 STATE-TO-STATE TRANSITION MOMENTS
 --------------------------------------------------------------------------------
 States   X          Y          Z         Strength(a.u.)
 --------------------------------------------------------------------------------
 0     2    0.100000   0.200000  -0.000000  1.234000E-02
 1     3    0.010000  -0.020000   0.000000  3.000000E-04
 END OF TRANSITION MOMEMT CALCULATION
";

  fn parse_text(text: &str) -> Result<ParsedSource, SourceError> {
    parse(&prepare_lines(text))
  }

  fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
  }

  // ── States ──────────────────────────────────────────────────────────────────

  #[test]
  fn states_are_labelled_per_multiplicity() {
    let p = parse_text(OUTPUT).unwrap();
    let labels: Vec<&str> = p.states.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["S0", "T1", "S1", "T2"]);
    assert_eq!(p.states_missing, None);
    for (i, s) in p.states.iter().enumerate() {
      assert_eq!(s.index, i);
    }
  }

  #[test]
  fn energies_are_converted_to_wavenumbers() {
    let p = parse_text(OUTPUT).unwrap();
    assert!(approx(p.states[0].energy, 0.0));
    assert!(approx(p.states[1].energy, 2.5 * 8065.6));
    assert!(approx(p.states[3].energy, 3.1 * 8065.6));
    assert_eq!(p.states.iter().filter(|s| s.energy == 0.0).count(), 1);
  }

  #[test]
  fn negative_energy_is_rejected() {
    let text = OUTPUT.replace("=    2.5000", "=   -2.5000");
    assert!(matches!(
      parse_text(&text),
      Err(SourceError::Parse(ParseError::NegativeEnergy { energy, .. })) if energy == -2.5
    ));
  }

  #[test]
  fn negative_index_is_rejected() {
    let text = OUTPUT.replace("Excited state   1:", "Excited state  -1:");
    assert!(matches!(
      parse_text(&text),
      Err(SourceError::Parse(ParseError::NegativeExcitationIndex { index: -1, .. }))
    ));
  }

  #[test]
  fn unknown_multiplicity_is_rejected() {
    let text = OUTPUT.replacen("Multiplicity: Singlet", "Multiplicity: Quintet", 1);
    assert!(matches!(
      parse_text(&text),
      Err(SourceError::Parse(ParseError::InvalidMultiplicity { ref value, .. })) if value == "Quintet"
    ));
  }

  #[test]
  fn skipped_state_number_is_rejected() {
    let text = OUTPUT.replace("Excited state   3:", "Excited state   4:");
    assert!(matches!(
      parse_text(&text),
      Err(SourceError::Parse(ParseError::NonContiguousState { expected: 3, found: 4, .. }))
    ));
  }

  #[test]
  fn state_without_multiplicity_before_table_end_is_rejected() {
    let text = "\
TDDFT/TDA Excitation Energies
----------------------------------------
Excited state   1: excitation energy (eV) =    2.0000
Multiplicity: Triplet
Excited state   2: excitation energy (eV) =    2.2000
----------------------------------------
";
    assert_eq!(
      parse_text(text),
      Err(SourceError::Parse(ParseError::MissingMultiplicity { line: 6, state: 2 }))
    );
  }

  #[test]
  fn state_without_multiplicity_before_next_state_is_rejected() {
    let text = "\
TDDFT/TDA Excitation Energies
----------------------------------------
Excited state   1: excitation energy (eV) =    2.0000
Excited state   2: excitation energy (eV) =    2.2000
Multiplicity: Triplet
----------------------------------------
";
    assert_eq!(
      parse_text(text),
      Err(SourceError::Parse(ParseError::MissingMultiplicity { line: 4, state: 1 }))
    );
  }

  #[test]
  fn unterminated_state_record_is_rejected() {
    let text = "\
TDDFT/TDA Excitation Energies
----------------------------------------
Excited state   1: excitation energy (eV) =    2.0000
";
    assert!(matches!(
      parse_text(text),
      Err(SourceError::Parse(ParseError::MissingMultiplicity { state: 1, .. }))
    ));
  }

  #[test]
  fn zero_excitation_energy_is_kept() {
    let text = OUTPUT.replace("=    2.5000", "=    0.0000");
    let p = parse_text(&text).unwrap();
    assert_eq!(p.states[1].energy, 0.0);
    assert_eq!(p.states[1].label, "T1");
  }

  #[test]
  fn missing_state_table_keeps_ground_state_only() {
    let p = parse_text("nothing to see\nhere").unwrap();
    assert_eq!(p.states, vec![State::ground()]);
    assert_eq!(p.states_missing, Some(STATES_START));
    assert_eq!(p.missing_sections().len(), 3);
  }

  // ── Couplings ───────────────────────────────────────────────────────────────

  #[test]
  fn couplings_attach_to_current_primary_state() {
    let p = parse_text(OUTPUT).unwrap();
    let c = p.couplings.entries();
    assert_eq!(c.len(), 5);
    // S0-T1, S0-T2
    assert_eq!((c[0].state_a, c[0].state_b), (0, 1));
    assert!(approx(c[0].value, 12.5));
    assert_eq!((c[1].state_a, c[1].state_b), (0, 3));
    // S1 is state 2
    assert_eq!((c[2].state_a, c[2].state_b), (2, 1));
    assert!(approx(c[2].value, 4.25));
    // T1-T2
    assert_eq!((c[4].state_a, c[4].state_b), (1, 3));
    assert!(approx(c[4].value, 0.75));
  }

  #[test]
  fn missing_coupling_markers_yield_missing_section() {
    let start = OUTPUT.find(" *********SPIN-ORBIT").unwrap();
    let end = OUTPUT.find(" STATE-TO-STATE").unwrap();
    let text = format!("{}{}", &OUTPUT[..start], &OUTPUT[end..]);
    let p = parse_text(&text).unwrap();
    assert!(p.couplings.entries().is_empty());
    assert_eq!(p.couplings.missing_marker(), Some(SOC_START));
  }

  #[test]
  fn coupling_to_unknown_label_is_a_dimension_error() {
    let text = OUTPUT.replace("T2      0.750000", "T7      0.750000");
    assert_eq!(
      parse_text(&text),
      Err(SourceError::Dimension(DimensionError::UnknownLabel("T7".to_string())))
    );
  }

  // ── Dipole moments ──────────────────────────────────────────────────────────

  #[test]
  fn transition_moments_are_extracted() {
    let p = parse_text(OUTPUT).unwrap();
    let m = p.dipoles.entries();
    assert_eq!(m.len(), 2);
    assert_eq!((m[0].state_a, m[0].state_b), (0, 2));
    assert!(approx(m[0].value, 1.234e-2));
    assert_eq!((m[1].state_a, m[1].state_b), (1, 3));
    assert!(approx(m[1].value, 3.0e-4));
  }

  #[test]
  fn empty_moment_section_is_found_not_missing() {
    let text = "STATE-TO-STATE TRANSITION MOMENTS\nEND OF TRANSITION MOMEMT CALCULATION\n";
    let p = parse_text(text).unwrap();
    assert_eq!(p.dipoles, Section::Found(vec![]));
  }
}
