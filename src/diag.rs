use faer::{Mat, Side};

use crate::error::{DimensionError, NumericalError, PipelineError};
use crate::source::EV_TO_CM1;

/// cm⁻¹ per hartree.
pub const HARTREE_TO_CM1: f64 = 219474.6313705;

// ── Public types ──────────────────────────────────────────────────────────────

/// Eigendecomposition of the MIME.
#[derive(Debug)]
pub struct Eigensystem {
  /// Eigenvalues in cm⁻¹, ascending.
  pub values: Vec<f64>,
  /// Columns are eigenvectors (eigenbasis → zero-order basis).
  pub vectors: Mat<f64>,
  /// Transpose of `vectors` (zero-order basis → eigenbasis).
  pub transpose: Mat<f64>,
}

impl Eigensystem {
  /// Arithmetic mean of the eigenvalues, in cm⁻¹.
  pub fn mean_value(&self) -> f64 {
    if self.values.is_empty() {
      return 0.0;
    }
    self.values.iter().sum::<f64>() / self.values.len() as f64
  }
}

/// The eigenvalues expressed in the four unit systems written to disk.
#[derive(Debug, PartialEq)]
pub struct EnergyUnits {
  pub cm1: Vec<f64>,
  pub ua: Vec<f64>,
  pub nm: Vec<f64>,
  pub ev: Vec<f64>,
}

impl EnergyUnits {
  /// A zero eigenvalue gives an infinite wavelength; that value is kept as is.
  pub fn from_cm1(values: &[f64]) -> EnergyUnits {
    EnergyUnits {
      cm1: values.to_vec(),
      ua: values.iter().map(|&v| cm1_to_ua(v)).collect(),
      nm: values.iter().map(|&v| cm1_to_nm(v)).collect(),
      ev: values.iter().map(|&v| cm1_to_ev(v)).collect(),
    }
  }
}

// ── Public functions ──────────────────────────────────────────────────────────

pub fn cm1_to_ua(cm1: f64) -> f64 {
  cm1 / HARTREE_TO_CM1
}

pub fn cm1_to_nm(cm1: f64) -> f64 {
  1.0e7 / cm1
}

pub fn cm1_to_ev(cm1: f64) -> f64 {
  cm1 / EV_TO_CM1
}

/// Diagonalises the (symmetric) MIME with the self-adjoint solver.
///
/// Only the lower triangle is read. Non-finite entries in the input or in the
/// result are reported instead of being passed on.
pub fn diagonalize(mime: &Mat<f64>) -> Result<Eigensystem, PipelineError> {
  let n = mime.nrows();
  if mime.ncols() != n {
    return Err(DimensionError::ShapeMismatch {
      expected: (n, n),
      found: (n, mime.ncols()),
    }
    .into());
  }
  for j in 0..n {
    for i in j..n {
      if !mime.read(i, j).is_finite() {
        return Err(NumericalError::NonFiniteInput { row: i, col: j }.into());
      }
    }
  }

  let evd = mime.selfadjoint_eigendecomposition(Side::Lower);
  let values: Vec<f64> = (0..n).map(|i| evd.s().column_vector().read(i)).collect();
  if let Some(i) = values.iter().position(|v| !v.is_finite()) {
    return Err(NumericalError::NonFiniteEigenvalue(i).into());
  }

  let vectors = evd.u().to_owned();
  for j in 0..n {
    for i in 0..n {
      if !vectors.read(i, j).is_finite() {
        return Err(NumericalError::NonFiniteEigenvector { row: i, col: j }.into());
      }
    }
  }
  let transpose = vectors.transpose().to_owned();

  log::debug!("diagonalised {n}×{n} MIME");
  Ok(Eigensystem { values, vectors, transpose })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn mat3(data: [f64; 9]) -> Mat<f64> {
    Mat::from_fn(3, 3, |i, j| data[i * 3 + j])
  }

  fn scenario_a() -> Mat<f64> {
    mat3([0.0, 50.0, 30.0, 50.0, 1000.0, 10.0, 30.0, 10.0, 1200.0])
  }

  fn approx(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol * (1.0 + b.abs())
  }

  // ── Decomposition ───────────────────────────────────────────────────────────

  /// Scenario A: three real eigenvalues summing to the trace.
  #[test]
  fn eigenvalues_sum_to_trace() {
    let e = diagonalize(&scenario_a()).unwrap();
    assert_eq!(e.values.len(), 3);
    let sum: f64 = e.values.iter().sum();
    assert!(approx(sum, 2200.0, 1e-10), "sum = {sum}");
  }

  #[test]
  fn decomposition_reconstructs_the_matrix() {
    let m = scenario_a();
    let e = diagonalize(&m).unwrap();
    let d = Mat::from_fn(3, 3, |i, j| if i == j { e.values[i] } else { 0.0 });
    let vd: Mat<f64> = &e.vectors * &d;
    // V is orthonormal, so V⁻¹ = Vᵀ.
    let back: Mat<f64> = &vd * &e.transpose;
    for i in 0..3 {
      for j in 0..3 {
        assert!((back[(i, j)] - m[(i, j)]).abs() < 1e-8, "[{i}][{j}] = {}", back[(i, j)]);
      }
    }
  }

  #[test]
  fn transpose_is_the_transpose() {
    let e = diagonalize(&scenario_a()).unwrap();
    for i in 0..3 {
      for j in 0..3 {
        assert_eq!(e.transpose[(i, j)], e.vectors[(j, i)]);
      }
    }
  }

  #[test]
  fn mean_value_is_the_average_eigenvalue() {
    let e = diagonalize(&scenario_a()).unwrap();
    assert!(approx(e.mean_value(), 2200.0 / 3.0, 1e-10));
  }

  #[test]
  fn non_finite_input_is_rejected() {
    let mut m = scenario_a();
    m.write(2, 1, f64::NAN);
    assert!(matches!(
      diagonalize(&m),
      Err(PipelineError::Numerical(NumericalError::NonFiniteInput { row: 2, col: 1 }))
    ));
  }

  #[test]
  fn non_square_input_is_rejected() {
    let m = Mat::<f64>::zeros(2, 3);
    assert!(matches!(
      diagonalize(&m),
      Err(PipelineError::Dimension(DimensionError::ShapeMismatch { .. }))
    ));
  }

  // ── Units ───────────────────────────────────────────────────────────────────

  #[test]
  fn unit_conversions_round_trip() {
    for &cm in &[1.0, 1234.5678, 25000.0, -150.0] {
      assert!(approx(cm1_to_ev(cm) * EV_TO_CM1, cm, 1e-12));
      assert!(approx(cm1_to_ua(cm) * HARTREE_TO_CM1, cm, 1e-12));
      assert!(approx(1.0e7 / cm1_to_nm(cm), cm, 1e-12));
    }
  }

  #[test]
  fn zero_eigenvalue_gives_infinite_wavelength_without_failing() {
    let e = diagonalize(&Mat::<f64>::zeros(2, 2)).unwrap();
    let units = EnergyUnits::from_cm1(&e.values);
    assert!(units.nm.iter().all(|v| v.is_infinite()));
    assert_eq!(units.ev, vec![0.0, 0.0]);
  }

  #[test]
  fn units_hold_one_entry_per_eigenvalue() {
    let units = EnergyUnits::from_cm1(&[8065.6, 16131.2]);
    assert_eq!(units.cm1.len(), 2);
    assert!(approx(units.ev[0], 1.0, 1e-12));
    assert!(approx(units.ev[1], 2.0, 1e-12));
    assert!(approx(units.nm[0], 1.0e7 / 8065.6, 1e-12));
  }
}
