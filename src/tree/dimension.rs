//! Numeric values with units.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};
use crate::tree::unit::{Unit, UnitGroup};

/// Number of decimals kept when serializing numbers.
const NUM_PRECISION: i32 = 8;

/// A number plus a [`Unit`], e.g. `42`, `1.5em` or `96px/in`.
#[derive(Debug, Clone)]
pub struct Dimension {
    pub node: NodeCommon,
    pub value: f64,
    pub unit: Unit,
}

impl Dimension {
    /// Fails on NaN; a dimension always holds an actual number.
    pub fn new(value: f64, unit: Unit) -> Result<Dimension, LessError> {
        if value.is_nan() {
            return Err(LessError::dimension("dimension is not a number"));
        }

        Ok(Dimension {
            node: NodeCommon::default(),
            value,
            unit,
        })
    }

    pub fn number(value: f64) -> Result<Dimension, LessError> {
        Dimension::new(value, Unit::empty())
    }

    pub fn with_unit(value: f64, unit: &str) -> Result<Dimension, LessError> {
        Dimension::new(value, Unit::single(unit))
    }

    pub fn eval(&self, _context: &mut EvalContext) -> Result<Node, LessError> {
        Ok(Node::Dimension(self.clone()))
    }

    /// Applies a binary arithmetic operator.
    ///
    /// For `+` and `-` the right operand is converted to the left operand's
    /// units first; under strict units a leftover mismatch is an error,
    /// otherwise the left operand's unit wins.  For `*` and `/` the unit
    /// vectors combine and cancel.
    pub fn operate(
        &self,
        op: char,
        other: &Dimension,
        strict_units: bool,
    ) -> Result<Dimension, LessError> {
        let mut value = apply_op(op, self.value, other.value);
        let mut unit = self.unit.clone();

        match op {
            '+' | '-' => {
                if unit.is_empty() {
                    unit = other.unit.clone();
                    if self.unit.backup_unit.is_some() {
                        unit.backup_unit = self.unit.backup_unit.clone();
                    }
                } else if other.unit.is_empty() {
                    // left unit wins
                } else {
                    let converted = other.convert_to_units(&self.unit.used_units());

                    if strict_units && !converted.unit.same_as(&unit) {
                        return Err(LessError::operation(format!(
                            "incompatible units; change the units or use the unit function; \
                             bad units: '{}' and '{}'",
                            unit, converted.unit
                        )));
                    }

                    value = apply_op(op, self.value, converted.value);
                }
            }

            '*' => {
                unit.numerator.extend(other.unit.numerator.iter().cloned());
                unit.denominator
                    .extend(other.unit.denominator.iter().cloned());
                unit.cancel();
            }

            '/' => {
                unit.numerator.extend(other.unit.denominator.iter().cloned());
                unit.denominator
                    .extend(other.unit.numerator.iter().cloned());
                unit.cancel();
            }

            _ => return Err(LessError::operation(format!("unknown operator '{op}'"))),
        }

        Dimension::new(value, unit)
    }

    /// Converts to the target unit of each dimension group in `targets`.
    pub fn convert_to_units(&self, targets: &HashMap<UnitGroup, String>) -> Dimension {
        let mut value = self.value;
        let mut unit = self.unit.clone();

        for (&group, target) in targets {
            let conversions = group.conversions();
            let Some(&target_factor) = conversions.get(target.as_str()) else {
                continue;
            };

            unit.map_units(|atomic, is_denominator| {
                if let Some(&factor) = conversions.get(atomic) {
                    if is_denominator {
                        value /= factor / target_factor;
                    } else {
                        value *= factor / target_factor;
                    }
                    target.clone()
                } else {
                    atomic.to_string()
                }
            });
        }

        unit.cancel();

        Dimension {
            node: self.node.clone(),
            value,
            unit,
        }
    }

    /// Converts to canonical units (`px`, `s`, `rad`) for comparisons.
    pub fn unify(&self) -> Dimension {
        let targets = HashMap::from([
            (UnitGroup::Length, "px".to_string()),
            (UnitGroup::Duration, "s".to_string()),
            (UnitGroup::Angle, "rad".to_string()),
        ]);

        self.convert_to_units(&targets)
    }

    pub fn compare(&self, other: &Dimension) -> Option<Ordering> {
        let (a, b) = if self.unit.is_empty() || other.unit.is_empty() {
            (self.clone(), other.clone())
        } else {
            let a = self.unify();
            let b = other.unify();

            if !a.unit.same_as(&b.unit) {
                return None;
            }

            (a, b)
        };

        a.value.partial_cmp(&b.value)
    }

}

impl GenCss for Dimension {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        if output.strict_units && !self.unit.is_singular() {
            return Err(LessError::dimension(format!(
                "multiple units in dimension; correct the units or use the unit function; \
                 bad unit: {}",
                self.unit
            )));
        }

        let value = fround(self.value);
        let mut str_value = format_number(value);

        if value != 0.0 && value.abs() < 0.000001 {
            // Keep tiny magnitudes out of exponent notation; anything below
            // the printable precision collapses to 0.
            str_value = format_small(value);
        }

        if output.compress {
            // Zero lengths do not need a unit.
            if value == 0.0 && self.unit.is_length() {
                output.add(&str_value);
                return Ok(());
            }

            if value > 0.0 && value < 1.0 && str_value.starts_with('0') {
                str_value.remove(0);
            }
        }

        output.add(&str_value);
        self.unit.gen_css(output)
    }
}

/// Rounds to the output precision.
pub fn fround(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let scale = 10f64.powi(NUM_PRECISION);
    (value * scale).round() / scale
}

/// Serializes a number the way the output expects: integers without a decimal
/// point, everything else with trailing zeros trimmed.  Non-finite values
/// (division by zero) collapse to `0`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }

    if value == 0.0 {
        // Avoid "-0".
        return "0".to_string();
    }

    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }

    format!("{value}")
}

fn format_small(value: f64) -> String {
    let mut s = format!("{value:.20}");

    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }

    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn dim(value: f64, unit: &str) -> Dimension {
        Dimension::with_unit(value, unit).unwrap()
    }

    #[test]
    fn rejects_nan() {
        assert!(Dimension::number(f64::NAN).is_err());
    }

    #[test]
    fn addition_converts_right_operand() {
        let a = dim(1.0, "cm");
        let b = dim(5.0, "mm");
        let r = a.operate('+', &b, false).unwrap();

        assert!(approx_eq!(f64, r.value, 1.5));
        assert_eq!(r.unit, Unit::single("cm"));
    }

    #[test]
    fn addition_with_unitless_operand_keeps_unit() {
        let a = dim(2.0, "px");
        let b = Dimension::number(3.0).unwrap();
        let r = a.operate('+', &b, true).unwrap();

        assert!(approx_eq!(f64, r.value, 5.0));
        assert_eq!(r.unit, Unit::single("px"));
    }

    #[test]
    fn strict_units_rejects_incompatible_addition() {
        let a = dim(1.0, "px");
        let b = dim(1.0, "s");
        assert!(a.operate('+', &b, true).is_err());
    }

    #[test]
    fn loose_units_first_operand_wins() {
        let a = dim(1.0, "px");
        let b = dim(1.0, "s");
        let r = a.operate('+', &b, false).unwrap();
        assert_eq!(r.unit, Unit::single("px"));
    }

    #[test]
    fn multiplication_combines_and_cancels() {
        let a = dim(4.0, "px");
        let b = Dimension::new(2.0, Unit::new(vec![], vec!["px".to_string()])).unwrap();
        let r = a.operate('*', &b, true).unwrap();

        assert!(approx_eq!(f64, r.value, 8.0));
        assert!(r.unit.is_empty());
    }

    #[test]
    fn division_swaps_units() {
        let a = dim(10.0, "px");
        let b = dim(5.0, "px");
        let r = a.operate('/', &b, true).unwrap();

        assert!(approx_eq!(f64, r.value, 2.0));
        assert!(r.unit.is_empty());
        // the backup unit remembers what was cancelled
        assert_eq!(r.unit.backup_unit.as_deref(), Some("px"));
    }

    #[test]
    fn operate_keeps_vectors_sorted_and_cancelled() {
        let a = Dimension::new(
            1.0,
            Unit::new(vec!["s".to_string(), "px".to_string()], vec![]),
        )
        .unwrap();
        let b = Dimension::new(
            1.0,
            Unit::new(vec!["em".to_string()], vec!["s".to_string()]),
        )
        .unwrap();
        let r = a.operate('*', &b, false).unwrap();

        assert_eq!(r.unit.numerator, ["em", "px"]);
        assert!(r.unit.denominator.is_empty());
    }

    #[test]
    fn compare_unifies() {
        let a = dim(1.0, "cm");
        let b = dim(10.0, "mm");
        assert_eq!(a.compare(&b), Some(Ordering::Equal));

        let c = dim(1.0, "s");
        assert_eq!(a.compare(&c), None);
    }

    #[test]
    fn division_by_zero_serializes_as_zero() {
        let r = dim(1.0, "px").operate('/', &Dimension::number(0.0).unwrap(), false).unwrap();
        assert!(r.value.is_infinite());

        let mut out = Output::new(false, false);
        r.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), "0px");
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn compressed_output_drops_leading_zero() {
        let d = Dimension::number(0.5).unwrap();
        let mut out = Output::new(true, false);
        d.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), ".5");
    }

    #[test]
    fn compressed_zero_length_drops_unit() {
        let d = dim(0.0, "px");
        let mut out = Output::new(true, false);
        d.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), "0");
    }

    #[test]
    fn strict_output_rejects_compound_units() {
        let d = Dimension::new(
            1.0,
            Unit::new(vec!["px".to_string()], vec!["s".to_string()]),
        )
        .unwrap();
        let mut out = Output::new(false, true);
        assert!(d.gen_css(&mut out).is_err());
    }

    #[test]
    fn tiny_magnitudes_avoid_exponents() {
        let d = Dimension::number(0.0000002).unwrap();
        let mut out = Output::new(false, false);
        d.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), "0.0000002");
    }
}

fn apply_op(op: char, a: f64, b: f64) -> f64 {
    match op {
        '+' => a + b,
        '-' => a - b,
        '*' => a * b,
        '/' => a / b,
        _ => f64::NAN,
    }
}
