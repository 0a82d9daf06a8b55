use faer::Mat;

use crate::error::DimensionError;
use crate::source::DipoleMoment;

/// Zero-order dipole matrix: each moment is written to `[a][b]` and `[b][a]`.
pub fn zero_order_matrix(n: usize, moments: &[DipoleMoment]) -> Result<Mat<f64>, DimensionError> {
  let mut m = Mat::<f64>::zeros(n, n);
  for d in moments {
    for index in [d.state_a, d.state_b] {
      if index >= n {
        return Err(DimensionError::IndexOutOfRange { kind: "dipole", index, n });
      }
    }
    m.write(d.state_a, d.state_b, d.value);
    m.write(d.state_b, d.state_a, d.value);
  }
  Ok(m)
}

/// Projects the zero-order dipole matrix with the eigenvector transpose
/// (`transpose · dipole`), then copies the lower triangle onto the upper one.
///
/// The one-sided product is not symmetric in general; the mirroring keeps the
/// files compatible with what the control solver has always been given.
pub fn to_eigenbasis(dipole: &Mat<f64>, transpose: &Mat<f64>) -> Result<Mat<f64>, DimensionError> {
  let n = transpose.nrows();
  for shape in [(dipole.nrows(), dipole.ncols()), (transpose.nrows(), transpose.ncols())] {
    if shape != (n, n) {
      return Err(DimensionError::ShapeMismatch { expected: (n, n), found: shape });
    }
  }

  let mut out: Mat<f64> = transpose * dipole;
  for row in 0..n {
    for col in 0..row {
      out.write(col, row, out.read(row, col));
    }
  }
  Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
