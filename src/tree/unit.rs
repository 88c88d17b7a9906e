//! Unit vectors for dimension arithmetic.
//!
//! A [`Unit`] is a pair of sorted vectors of atomic units: `px` is
//! `{numerator: [px]}`, `px/s` is `{numerator: [px], denominator: [s]}`, and
//! `px*px` after `1px * 1px` is `{numerator: [px, px]}`.  Multiplication and
//! division concatenate and swap the vectors; [`Unit::cancel`] then removes
//! matching pairs so `(1px * 2em) / 1px` ends up as plain `em`.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::error::LessError;
use crate::output::{GenCss, Output};

/// A dimension group with known conversion factors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnitGroup {
    Length,
    Duration,
    Angle,
}

pub const UNIT_GROUPS: [UnitGroup; 3] = [UnitGroup::Length, UnitGroup::Duration, UnitGroup::Angle];

static LENGTH_CONVERSIONS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("m", 1.0),
        ("cm", 0.01),
        ("mm", 0.001),
        ("in", 0.0254),
        ("px", 0.0254 / 96.0),
        ("pt", 0.0254 / 72.0),
        ("pc", 0.0254 / 72.0 * 12.0),
    ])
});

static DURATION_CONVERSIONS: Lazy<HashMap<&'static str, f64>> =
    Lazy::new(|| HashMap::from([("s", 1.0), ("ms", 0.001)]));

static ANGLE_CONVERSIONS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("rad", 1.0 / (2.0 * std::f64::consts::PI)),
        ("deg", 1.0 / 360.0),
        ("grad", 1.0 / 400.0),
        ("turn", 1.0),
    ])
});

/// Units that make a zero length collapsible to plain `0` in minified output.
const LENGTH_UNITS: [&str; 14] = [
    "px", "em", "ex", "ch", "rem", "in", "cm", "mm", "pc", "pt", "vw", "vh", "vmin", "vmax",
];

impl UnitGroup {
    pub fn conversions(self) -> &'static HashMap<&'static str, f64> {
        match self {
            UnitGroup::Length => &LENGTH_CONVERSIONS,
            UnitGroup::Duration => &DURATION_CONVERSIONS,
            UnitGroup::Angle => &ANGLE_CONVERSIONS,
        }
    }

    /// The group an atomic unit belongs to, if it is convertible at all.
    pub fn for_unit(unit: &str) -> Option<UnitGroup> {
        UNIT_GROUPS
            .into_iter()
            .find(|g| g.conversions().contains_key(unit))
    }
}

/// The unit part of a dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unit {
    /// Sorted ascending.
    pub numerator: Vec<String>,

    /// Sorted ascending.
    pub denominator: Vec<String>,

    /// Display fallback used when cancellation empties the vectors, so
    /// `(3em / 1em) * 1` still prints a sensible unit-less value while
    /// `10px / 5px * 2px` remembers it was talking about `px`.
    pub backup_unit: Option<String>,
}

impl Unit {
    pub fn new(mut numerator: Vec<String>, mut denominator: Vec<String>) -> Unit {
        numerator.sort();
        denominator.sort();

        let backup_unit = numerator.first().cloned();

        Unit {
            numerator,
            denominator,
            backup_unit,
        }
    }

    pub fn single(unit: &str) -> Unit {
        Unit::new(vec![unit.to_string()], Vec::new())
    }

    pub fn empty() -> Unit {
        Unit::default()
    }

    pub fn is_empty(&self) -> bool {
        self.numerator.is_empty() && self.denominator.is_empty()
    }

    /// Exactly one atomic unit, in the numerator.
    pub fn is_singular(&self) -> bool {
        self.numerator.len() <= 1 && self.denominator.is_empty()
    }

    /// Whether two units are interchangeable without conversion.
    pub fn same_as(&self, other: &Unit) -> bool {
        self.numerator == other.numerator && self.denominator == other.denominator
    }

    pub fn is_length(&self) -> bool {
        self.numerator
            .first()
            .is_some_and(|u| LENGTH_UNITS.contains(&u.as_str()))
    }

    /// Applies `f` to every atomic unit; the `bool` argument tells the
    /// callback whether it is looking at a denominator entry.
    pub fn map_units(&mut self, mut f: impl FnMut(&str, bool) -> String) {
        for u in &mut self.numerator {
            *u = f(u, false);
        }
        for u in &mut self.denominator {
            *u = f(u, true);
        }
    }

    /// The first atomic unit of each dimension group present in this unit.
    pub fn used_units(&self) -> HashMap<UnitGroup, String> {
        let mut result = HashMap::new();

        for group in UNIT_GROUPS {
            let conversions = group.conversions();

            for u in self.numerator.iter().chain(&self.denominator) {
                if conversions.contains_key(u.as_str()) {
                    result.entry(group).or_insert_with(|| u.clone());
                    break;
                }
            }
        }

        result
    }

    /// Removes matching numerator/denominator pairs and re-sorts.
    pub fn cancel(&mut self) {
        let mut counter: HashMap<String, i32> = HashMap::new();

        for u in self.numerator.drain(..) {
            *counter.entry(u).or_insert(0) += 1;
        }
        for u in self.denominator.drain(..) {
            *counter.entry(u).or_insert(0) -= 1;
        }

        for (unit, count) in counter {
            if count > 0 {
                for _ in 0..count {
                    self.numerator.push(unit.clone());
                }
            } else {
                for _ in 0..-count {
                    self.denominator.push(unit.clone());
                }
            }
        }

        self.numerator.sort();
        self.denominator.sort();
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.numerator.join("*"))?;
        for d in &self.denominator {
            write!(f, "/{d}")?;
        }
        Ok(())
    }
}

impl GenCss for Unit {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        if self.numerator.len() == 1 {
            output.add(&self.numerator[0]);
        } else if !output.strict_units {
            if let Some(ref backup) = self.backup_unit {
                output.add(backup);
            } else if let Some(first) = self.denominator.first() {
                output.add(first);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_are_sorted_at_construction() {
        let u = Unit::new(
            vec!["s".to_string(), "px".to_string()],
            vec!["em".to_string(), "deg".to_string()],
        );
        assert_eq!(u.numerator, ["px", "s"]);
        assert_eq!(u.denominator, ["deg", "em"]);
    }

    #[test]
    fn cancel_removes_matching_pairs() {
        let mut u = Unit::new(
            vec!["px".to_string(), "em".to_string()],
            vec!["px".to_string()],
        );
        u.cancel();
        assert_eq!(u.numerator, ["em"]);
        assert!(u.denominator.is_empty());
    }

    #[test]
    fn cancel_keeps_excess_denominators() {
        let mut u = Unit::new(
            vec!["px".to_string()],
            vec!["s".to_string(), "s".to_string()],
        );
        u.cancel();
        assert_eq!(u.numerator, ["px"]);
        assert_eq!(u.denominator, ["s", "s"]);
    }

    #[test]
    fn singular_and_empty() {
        assert!(Unit::empty().is_empty());
        assert!(Unit::empty().is_singular());
        assert!(Unit::single("px").is_singular());
        assert!(!Unit::new(
            vec!["px".to_string()],
            vec!["s".to_string()]
        )
        .is_singular());
    }

    #[test]
    fn used_units_picks_first_of_each_group() {
        let u = Unit::new(
            vec!["cm".to_string(), "s".to_string()],
            vec!["deg".to_string()],
        );
        let used = u.used_units();
        assert_eq!(used[&UnitGroup::Length], "cm");
        assert_eq!(used[&UnitGroup::Duration], "s");
        assert_eq!(used[&UnitGroup::Angle], "deg");
    }

    #[test]
    fn length_detection() {
        assert!(Unit::single("px").is_length());
        assert!(Unit::single("rem").is_length());
        assert!(!Unit::single("s").is_length());
        assert!(!Unit::empty().is_length());
    }

    #[test]
    fn display_joins_with_slash() {
        let u = Unit::new(vec!["px".to_string()], vec!["s".to_string()]);
        assert_eq!(u.to_string(), "px/s");
    }
}
