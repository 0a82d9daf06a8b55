use faer::Mat;
use faer::complex_native::c64;

use crate::source::{Multiplicity, State};

/// What goes in the solver's "final density" slot. It is only a required
/// input of the solver and is never used to compute a fidelity here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalDensity {
  /// Copy of the initial (ground-state) density.
  Ground,
  /// All-zero matrix.
  Zero,
}

/// Projector onto a single target state.
#[derive(Debug)]
pub struct Projector {
  pub label: String,
  pub index: usize,
  pub matrix: Mat<c64>,
}

const ONE: c64 = c64 { re: 1.0, im: 0.0 };

/// n × n density with the whole population in the ground state.
pub fn initial_density(n: usize) -> Mat<c64> {
  let mut rho = Mat::<c64>::zeros(n, n);
  if n > 0 {
    rho.write(0, 0, ONE);
  }
  rho
}

pub fn final_density(n: usize, variant: FinalDensity) -> Mat<c64> {
  match variant {
    FinalDensity::Ground => initial_density(n),
    FinalDensity::Zero => Mat::<c64>::zeros(n, n),
  }
}

/// States addressable as control targets, in state order.
pub fn target_states(states: &[State], multiplicity: Multiplicity) -> Vec<&State> {
  states.iter().filter(|s| s.multiplicity == multiplicity).collect()
}

/// One projector per state of the target multiplicity, sized to the full
/// state list.
pub fn projectors(states: &[State], multiplicity: Multiplicity) -> Vec<Projector> {
  let n = states.len();
  target_states(states, multiplicity)
    .into_iter()
    .map(|s| {
      let mut matrix = Mat::<c64>::zeros(n, n);
      matrix.write(s.index, s.index, ONE);
      Projector { label: s.label.clone(), index: s.index, matrix }
    })
    .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
