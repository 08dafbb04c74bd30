//! Per-attribute value normalization.
//!
//! Some readings (pump power, speed, flow) jitter constantly. Rounding them to
//! a declared step before comparison keeps insignificant fluctuations from
//! turning into change events. The rule belongs to the attribute, so it is
//! configured here and the synchronizer's diff logic stays generic.
//!
//! | Attribute | Default step |
//! |-----------|--------------|
//! | `PWR` | 25 |
//! | `RPM` | 10 |
//! | `GPM` | 1 |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use rustc_hash::FxHashMap;

// ============================================================================
// AttributePolicy
// ============================================================================

/// Rounding rules keyed by attribute name.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePolicy {
    steps: FxHashMap<String, u32>,
}

impl Default for AttributePolicy {
    fn default() -> Self {
        Self::empty()
            .with_rounding("PWR", 25)
            .with_rounding("RPM", 10)
            .with_rounding("GPM", 1)
    }
}

impl AttributePolicy {
    /// Creates a policy with no rules; every value passes through unchanged.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            steps: FxHashMap::default(),
        }
    }

    /// Rounds numeric values of `attribute` to the nearest multiple of `step`.
    ///
    /// A step of zero removes the rule.
    #[must_use]
    pub fn with_rounding(mut self, attribute: impl Into<String>, step: u32) -> Self {
        let attribute = attribute.into();
        if step == 0 {
            self.steps.remove(&attribute);
        } else {
            self.steps.insert(attribute, step);
        }
        self
    }

    /// Returns the rounding step for `attribute`, if any.
    #[inline]
    #[must_use]
    pub fn step(&self, attribute: &str) -> Option<u32> {
        self.steps.get(attribute).copied()
    }

    /// Normalizes a raw device value.
    ///
    /// Values that do not parse as numbers are returned unchanged.
    #[must_use]
    pub fn normalize<'a>(&self, attribute: &str, value: &'a str) -> Cow<'a, str> {
        let Some(step) = self.step(attribute) else {
            return Cow::Borrowed(value);
        };

        match value.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => {
                let step = f64::from(step);
                let rounded = (number / step).round() * step;
                Cow::Owned(format!("{rounded:.0}"))
            }
            _ => Cow::Borrowed(value),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
