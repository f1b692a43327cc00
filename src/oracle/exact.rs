use crate::oracle::{EquivalenceOracle, OracleError};
use once_cell::sync::Lazy;
use regex::Regex;

/// Relative tolerance for numeric answers
pub const DEFAULT_REL_TOL: f64 = 1e-4;

static THOUSANDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?\d{1,3}(,\d{3})+(\.\d+)?%?$").unwrap_or_else(|e| panic!("thousands pattern: {e}"))
});

/// Built-in oracle: normalized text comparison with a numeric fallback.
///
/// Strips `$`, `\boxed{..}`, whitespace and thousands separators, then
/// compares numerically (fractions `a/b`, percentages) with a relative
/// tolerance, else as text.
#[derive(Clone, Debug)]
pub struct ExactMatchOracle {
    pub rel_tol: f64,
}

impl Default for ExactMatchOracle {
    fn default() -> Self {
        Self {
            rel_tol: DEFAULT_REL_TOL,
        }
    }
}

impl EquivalenceOracle for ExactMatchOracle {
    fn equal(&self, output: &str, answer: &str) -> Result<bool, OracleError> {
        let left = canonical(output);
        let right = canonical(answer);
        if left == right {
            return Ok(true);
        }

        match (parse_number(&left), parse_number(&right)) {
            (Some(a), Some(b)) => Ok(a
                .candidates()
                .iter()
                .any(|x| b.candidates().iter().any(|y| self.close(*x, *y)))),
            _ => Ok(false),
        }
    }
}

impl ExactMatchOracle {
    fn close(&self, a: f64, b: f64) -> bool {
        a == b || (a - b).abs() <= self.rel_tol * a.abs().max(b.abs())
    }
}

#[derive(Clone, Copy, Debug)]
struct Parsed {
    value: f64,
    percent: bool,
}

impl Parsed {
    fn candidates(&self) -> Vec<f64> {
        if self.percent {
            vec![self.value / 100.0, self.value]
        } else {
            vec![self.value]
        }
    }
}

pub fn canonical(text: &str) -> String {
    let mut s = text.trim().to_string();
    loop {
        let unwrapped = unwrap_boxed(s.trim());
        if unwrapped == s {
            break;
        }
        s = unwrapped;
    }

    let s: String = s
        .chars()
        .filter(|c| *c != '$' && !c.is_whitespace())
        .collect();
    if THOUSANDS.is_match(&s) {
        s.replace(',', "")
    } else {
        s
    }
}

fn unwrap_boxed(s: &str) -> String {
    let inner = s
        .strip_prefix("\\boxed{")
        .or_else(|| s.strip_prefix("\\boxed {"))
        .and_then(|rest| rest.strip_suffix('}'));
    match inner {
        Some(inner) => inner.trim().to_string(),
        None => s.to_string(),
    }
}

fn parse_number(s: &str) -> Option<Parsed> {
    let (body, percent) = match s.strip_suffix("\\%").or_else(|| s.strip_suffix('%')) {
        Some(body) => (body, true),
        None => (s, false),
    };

    let value = match body.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => body.parse().ok()?,
    };
    value.is_finite().then_some(Parsed { value, percent })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(a: &str, b: &str) -> bool {
        ExactMatchOracle::default().equal(a, b).unwrap()
    }

    #[test]
    fn strips_latex_wrappers() {
        assert!(eq("42", "\\boxed{42}"));
        assert!(eq("$x+1$", "x + 1"));
    }

    #[test]
    fn numeric_forms_compare_by_value() {
        assert!(eq("4", "4.0"));
        assert!(eq("0.5", "1/2"));
        assert!(eq("1,234,567", "1234567"));
        assert!(eq("3.14159", "3.1416"));
        assert!(!eq("3.14", "3.15"));
    }

    #[test]
    fn percentages_match_either_scale() {
        assert!(eq("25%", "0.25"));
        assert!(eq("25", "25\\%"));
    }

    #[test]
    fn tuples_keep_their_commas() {
        assert!(eq("(1, 2)", "(1,2)"));
        assert!(!eq("(1, 2)", "12"));
    }

    #[test]
    fn non_numeric_text_must_match() {
        assert!(!eq("yes", "no"));
        assert!(!eq("1/0", "inf"));
    }
}
