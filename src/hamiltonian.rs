use faer::Mat;

use crate::error::DimensionError;
use crate::source::{Coupling, State};

/// Assembles the MIME: state energies on the diagonal, couplings mirrored to
/// both triangles.
///
/// A synthetic self-coupling `(index, index, energy)` is appended for every
/// state after the parsed couplings, so the diagonal is always populated and
/// a parsed self-coupling is overridden by the state's own energy.
pub fn build_mime(states: &[State], couplings: &[Coupling]) -> Result<Mat<f64>, DimensionError> {
  let n = states.len();
  let diagonal = states.iter().map(|s| Coupling {
    state_a: s.index,
    state_b: s.index,
    value: s.energy,
  });
  let all: Vec<Coupling> = couplings.iter().cloned().chain(diagonal).collect();

  let mut mime = Mat::<f64>::zeros(n, n);
  for c in &all {
    for index in [c.state_a, c.state_b] {
      if index >= n {
        return Err(DimensionError::IndexOutOfRange { kind: "coupling", index, n });
      }
    }
    mime.write(c.state_a, c.state_b, c.value);
    mime.write(c.state_b, c.state_a, c.value);
  }
  Ok(mime)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
