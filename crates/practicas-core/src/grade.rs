//! Final-grade computation.
//!
//! All arithmetic is done in fixed point so the same inputs always give the
//! same output on every platform. A grade is read as the shortest decimal
//! that round-trips its `f64` (5.549 is 5549 thousandths), weights are
//! integer percentages, and the exact result is rounded once, half-up, to one
//! decimal with integer division.

use serde::{Deserialize, Serialize};

use crate::domain::{CoreError, CoreResult};
use crate::weights::WeightConfig;

/// Lowest grade on the Chilean 1.0–7.0 scale.
pub const MIN_GRADE: f64 = 1.0;
/// Highest grade on the Chilean 1.0–7.0 scale.
pub const MAX_GRADE: f64 = 7.0;

/// Reject grades outside [1.0, 7.0] (NaN included).
pub fn validate_grade(value: f64) -> CoreResult<f64> {
    if value.is_finite() && (MIN_GRADE..=MAX_GRADE).contains(&value) {
        Ok(value)
    } else {
        Err(CoreError::InvalidGrade { value })
    }
}

/// Exact decimal value of a grade: `units / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decimal {
    units: i128,
    scale: u32,
}

impl Decimal {
    /// `f64` display is the shortest round-trip form and never uses an
    /// exponent, so its digits are the grade as written.
    fn from_grade(grade: f64) -> Self {
        let text = grade.to_string();
        let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
        let units = int
            .chars()
            .chain(frac.chars())
            .filter_map(|c| c.to_digit(10))
            .fold(0i128, |acc, d| acc * 10 + i128::from(d));
        Self {
            units,
            scale: frac.len() as u32,
        }
    }

    /// Units at a larger `scale`.
    fn units_at(self, scale: u32) -> i128 {
        self.units * 10i128.pow(scale - self.scale)
    }
}

/// Round a non-negative fixed-point value, expressed in `units_per_tenth`
/// units per tenth, half-up and return it as a one-decimal float.
fn round_half_up_tenths(value: i128, units_per_tenth: i128) -> f64 {
    let tenths = (value + units_per_tenth / 2) / units_per_tenth;
    tenths as f64 / 10.0
}

/// Validate both grades and bring them to a common scale of at least one
/// decimal.
fn common_scale(informe_grade: f64, empleador_grade: f64) -> CoreResult<(i128, i128, u32)> {
    let informe = Decimal::from_grade(validate_grade(informe_grade)?);
    let empleador = Decimal::from_grade(validate_grade(empleador_grade)?);
    let scale = informe.scale.max(empleador.scale).max(1);
    Ok((informe.units_at(scale), empleador.units_at(scale), scale))
}

/// `informe * wI/100 + empleador * wE/100`, rounded half-up to one decimal.
///
/// ```
/// use practicas_core::grade::compute_final_grade;
/// use practicas_core::weights::WeightConfig;
///
/// let weights = WeightConfig::new(60, 40).unwrap();
/// assert_eq!(compute_final_grade(6.0, 5.0, &weights).unwrap(), 5.6);
/// ```
pub fn compute_final_grade(
    informe_grade: f64,
    empleador_grade: f64,
    weights: &WeightConfig,
) -> CoreResult<f64> {
    let (informe, empleador, scale) = common_scale(informe_grade, empleador_grade)?;

    // units * percent: 10^(scale + 2) per grade point, 10^(scale + 1) per tenth
    let weighted = informe * i128::from(weights.informe_weight())
        + empleador * i128::from(weights.empleador_weight());
    Ok(round_half_up_tenths(weighted, 10i128.pow(scale + 1)))
}

/// Arithmetic mean of both grades, rounded half-up to one decimal.
pub fn compute_base_grade(informe_grade: f64, empleador_grade: f64) -> CoreResult<f64> {
    let (informe, empleador, scale) = common_scale(informe_grade, empleador_grade)?;

    // the sum is twice the mean
    Ok(round_half_up_tenths(
        informe + empleador,
        2 * 10i128.pow(scale - 1),
    ))
}

/// Both acta grades plus the weights they were computed with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActaGrades {
    pub nota_base: f64,
    pub nota_ponderada: f64,
    pub weights: WeightConfig,
}

pub fn compute_acta_grades(
    informe_grade: f64,
    empleador_grade: f64,
    weights: &WeightConfig,
) -> CoreResult<ActaGrades> {
    Ok(ActaGrades {
        nota_base: compute_base_grade(informe_grade, empleador_grade)?,
        nota_ponderada: compute_final_grade(informe_grade, empleador_grade, weights)?,
        weights: *weights,
    })
}
