//! Rating buckets: a pure, total mapping from a composite score to a label.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The inclusive lower bound of a rating bucket. A bucket covers
/// `[min, next higher min)`; the top bucket extends to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
  pub min:   f64,
  pub label: String,
}

impl Breakpoint {
  pub fn new(min: f64, label: impl Into<String>) -> Self {
    Self { min, label: label.into() }
  }
}

/// A validated, contiguous set of breakpoints covering `[0, 100]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketScale {
  /// Sorted by descending `min`; the last entry always has `min == 0`.
  breakpoints: Vec<Breakpoint>,
}

impl BucketScale {
  /// Validate and order `breakpoints`.
  ///
  /// Fails with [`Error::Configuration`] if the list is empty, a bound lies
  /// outside `[0, 100]` or is not finite, two buckets share a bound, a label
  /// is blank, or nothing starts at 0 (which would leave a gap at the bottom).
  pub fn new(mut breakpoints: Vec<Breakpoint>) -> Result<Self> {
    if breakpoints.is_empty() {
      return Err(Error::Configuration("bucket breakpoints are empty".into()));
    }
    for bp in &breakpoints {
      if !bp.min.is_finite() || !(0.0..=100.0).contains(&bp.min) {
        return Err(Error::Configuration(format!(
          "bucket {:?} has lower bound {} outside [0, 100]",
          bp.label, bp.min
        )));
      }
      if bp.label.trim().is_empty() {
        return Err(Error::Configuration("bucket label is blank".into()));
      }
    }

    breakpoints.sort_by(|a, b| b.min.total_cmp(&a.min));

    if breakpoints.windows(2).any(|w| w[0].min == w[1].min) {
      return Err(Error::Configuration(
        "two buckets share the same lower bound".into(),
      ));
    }
    if breakpoints.last().map(|bp| bp.min) != Some(0.0) {
      return Err(Error::Configuration(
        "lowest bucket must start at 0 so the scale has no gaps".into(),
      ));
    }

    Ok(Self { breakpoints })
  }

  /// AAA ≥ 90, AA ≥ 80, A ≥ 70, BBB ≥ 60, BB ≥ 50, B ≥ 40, otherwise CCC.
  pub fn default_breakpoints() -> Vec<Breakpoint> {
    vec![
      Breakpoint::new(90.0, "AAA"),
      Breakpoint::new(80.0, "AA"),
      Breakpoint::new(70.0, "A"),
      Breakpoint::new(60.0, "BBB"),
      Breakpoint::new(50.0, "BB"),
      Breakpoint::new(40.0, "B"),
      Breakpoint::new(0.0, "CCC"),
    ]
  }

  /// The label for `score`. A score exactly on a boundary belongs to the
  /// higher bucket. Out-of-range input is clamped first.
  pub fn bucket_for(&self, score: f64) -> &str {
    let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) };
    self
      .breakpoints
      .iter()
      .find(|bp| score >= bp.min)
      .or(self.breakpoints.last())
      .map(|bp| bp.label.as_str())
      .unwrap_or_default()
  }

  pub fn breakpoints(&self) -> &[Breakpoint] { &self.breakpoints }
}

impl Default for BucketScale {
  fn default() -> Self {
    Self {
      breakpoints: Self::default_breakpoints(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_scale_maps_ranges() {
    let scale = BucketScale::default();
    assert_eq!(scale.bucket_for(95.0), "AAA");
    assert_eq!(scale.bucket_for(87.2), "AA");
    assert_eq!(scale.bucket_for(76.0), "A");
    assert_eq!(scale.bucket_for(67.0), "BBB");
    assert_eq!(scale.bucket_for(55.0), "BB");
    assert_eq!(scale.bucket_for(41.0), "B");
    assert_eq!(scale.bucket_for(12.0), "CCC");
  }

  #[test]
  fn boundary_goes_to_higher_bucket() {
    let scale = BucketScale::default();
    assert_eq!(scale.bucket_for(90.0), "AAA");
    assert_eq!(scale.bucket_for(89.999_999), "AA");
    assert_eq!(scale.bucket_for(40.0), "B");
    assert_eq!(scale.bucket_for(0.0), "CCC");
    assert_eq!(scale.bucket_for(100.0), "AAA");
  }

  #[test]
  fn unordered_input_is_sorted() {
    let scale = BucketScale::new(vec![
      Breakpoint::new(0.0, "LOW"),
      Breakpoint::new(75.0, "HIGH"),
      Breakpoint::new(40.0, "MID"),
    ])
    .unwrap();
    assert_eq!(scale.bucket_for(80.0), "HIGH");
    assert_eq!(scale.bucket_for(50.0), "MID");
    assert_eq!(scale.bucket_for(10.0), "LOW");
  }

  #[test]
  fn scale_without_zero_floor_is_rejected() {
    let err = BucketScale::new(vec![
      Breakpoint::new(50.0, "A"),
      Breakpoint::new(10.0, "B"),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
  }

  #[test]
  fn duplicate_and_out_of_range_bounds_are_rejected() {
    assert!(
      BucketScale::new(vec![
        Breakpoint::new(50.0, "A"),
        Breakpoint::new(50.0, "B"),
        Breakpoint::new(0.0, "C"),
      ])
      .is_err()
    );
    assert!(
      BucketScale::new(vec![
        Breakpoint::new(120.0, "A"),
        Breakpoint::new(0.0, "C"),
      ])
      .is_err()
    );
    assert!(BucketScale::new(vec![]).is_err());
  }
}
