//! Named settings/constants.
//!
//! A setting's value is a string: a decimal literal, a scaled reference to
//! another setting (`"0.94usdRate"`), or an opaque string such as an ISO date
//! or a view keyword. Numeric interpretation is parsed once at load time into
//! a [`SettingExpr`]; resolution happens lazily against a per-setting
//! revaluation history (see `crate::settings`).

use serde::{Deserialize, Serialize};

/// Reporting window start (ISO date).
pub const SETTING_VIEW_START: &str = "viewStart";
/// Reporting window end (ISO date).
pub const SETTING_VIEW_END: &str = "viewEnd";
/// Flat annual inflation rate, percent.
pub const SETTING_CPI: &str = "cpi";
/// Chart bucketing: `monthly` or `annual`.
pub const SETTING_VIEW_FREQUENCY: &str = "viewFrequency";
/// Focus date for "today's values" snapshots (ISO date).
pub const SETTING_FOCUS_DATE: &str = "focusDate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingKind {
    /// Controls how results are viewed (window, bucketing, focus date).
    View,
    /// A model constant (rates, prices).
    Constant,
    /// A constant the surrounding application lets the user vary.
    Adjustable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub value: String,
    pub kind: SettingKind,
}

impl Setting {
    pub fn new(name: impl Into<String>, value: impl Into<String>, kind: SettingKind) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind,
        }
    }

    pub fn constant(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, SettingKind::Constant)
    }

    pub fn view(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, SettingKind::View)
    }
}

/// Parsed numeric interpretation of a setting's value string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingExpr {
    Literal(f64),
    /// `<multiplier><refName>`; the multiplier defaults to 1.
    Ref { scale: f64, name: String },
}

impl SettingExpr {
    /// Parse a value string. Returns `None` for strings with no numeric
    /// interpretation (dates, view keywords); those settings simply cannot be
    /// resolved as numbers.
    ///
    /// A reference name must start with an alphabetic character, so ISO dates
    /// like `2020-01-01` do not parse as `2020` times a `-01-01` setting.
    pub fn parse(raw: &str) -> Option<SettingExpr> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return Some(SettingExpr::Literal(v));
        }

        let split = trimmed
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+'))
            .map(|(i, _)| i)
            .unwrap_or(trimmed.len());
        let (head, tail) = trimmed.split_at(split);
        let name = tail.trim();
        if name.is_empty() || !name.chars().next().is_some_and(|c| c.is_alphabetic()) {
            return None;
        }
        let scale = if head.is_empty() {
            1.0
        } else {
            head.parse::<f64>().ok()?
        };
        Some(SettingExpr::Ref {
            scale,
            name: name.to_string(),
        })
    }

    /// The referenced setting name, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            SettingExpr::Literal(_) => None,
            SettingExpr::Ref { name, .. } => Some(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(SettingExpr::parse("12.5"), Some(SettingExpr::Literal(12.5)));
        assert_eq!(SettingExpr::parse(" -3 "), Some(SettingExpr::Literal(-3.0)));
        assert_eq!(SettingExpr::parse("0"), Some(SettingExpr::Literal(0.0)));
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            SettingExpr::parse("2.5usdRate"),
            Some(SettingExpr::Ref {
                scale: 2.5,
                name: "usdRate".to_string()
            })
        );
        assert_eq!(
            SettingExpr::parse("usdRate"),
            Some(SettingExpr::Ref {
                scale: 1.0,
                name: "usdRate".to_string()
            })
        );
        assert_eq!(
            SettingExpr::parse("0.5 share price"),
            Some(SettingExpr::Ref {
                scale: 0.5,
                name: "share price".to_string()
            })
        );
    }

    #[test]
    fn test_parse_opaque_strings() {
        // Dates and keywords have no numeric interpretation
        assert_eq!(SettingExpr::parse("2020-01-01"), None);
        assert_eq!(SettingExpr::parse("monthly"), None);
        assert_eq!(SettingExpr::parse(""), None);
    }
}
