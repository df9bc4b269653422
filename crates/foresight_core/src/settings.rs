//! Setting resolution.
//!
//! Value strings are parsed once at load time ([`SettingExpr`]); resolution is
//! lazy against a date-indexed revaluation history per setting, so
//! `resolve(name, as_of)` always reflects the latest revaluation at or before
//! `as_of`. Reference cycles and dangling scaled references are load-time
//! errors: the run fails closed before any evaluation is produced.

use jiff::civil::Date;
use rustc_hash::FxHashMap;

use crate::error::SettingError;
use crate::model::{Setting, SettingExpr};

/// A revaluation event: replace the effective value, or scale it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Revaluation {
    Set(f64),
    Scale(f64),
}

#[derive(Debug, Clone)]
pub struct SettingsResolver {
    raw: FxHashMap<String, String>,
    exprs: FxHashMap<String, Option<SettingExpr>>,
    /// Per-setting revaluations, kept date-ordered.
    history: FxHashMap<String, Vec<(Date, Revaluation)>>,
}

impl SettingsResolver {
    pub fn from_settings(settings: &[Setting]) -> Result<Self, SettingError> {
        let mut raw = FxHashMap::default();
        let mut exprs: FxHashMap<String, Option<SettingExpr>> = FxHashMap::default();

        for setting in settings {
            raw.insert(setting.name.clone(), setting.value.clone());
            exprs.insert(setting.name.clone(), SettingExpr::parse(&setting.value));
        }

        // A reference to a name that is not a setting is fatal when the value
        // carried an explicit multiplier; a bare name that matches no setting
        // is an opaque string (dates, view keywords), not a reference.
        for (name, expr) in exprs.iter_mut() {
            if let Some(SettingExpr::Ref { name: target, .. }) = expr
                && !raw.contains_key(target.as_str())
            {
                let value = &raw[name.as_str()];
                if value
                    .trim_start()
                    .starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
                {
                    return Err(SettingError::DanglingReference {
                        setting: name.clone(),
                        reference: target.clone(),
                    });
                }
                *expr = None;
            }
        }

        let resolver = Self {
            raw,
            exprs,
            history: FxHashMap::default(),
        };
        resolver.check_cycles()?;
        Ok(resolver)
    }

    /// Static cycle check over the reference graph.
    fn check_cycles(&self) -> Result<(), SettingError> {
        const UNVISITED: u8 = 0;
        const VISITING: u8 = 1;
        const DONE: u8 = 2;

        let mut state: FxHashMap<&str, u8> = FxHashMap::default();

        fn visit<'a>(
            name: &'a str,
            exprs: &'a FxHashMap<String, Option<SettingExpr>>,
            state: &mut FxHashMap<&'a str, u8>,
        ) -> Result<(), SettingError> {
            match state.get(name).copied().unwrap_or(UNVISITED) {
                DONE => return Ok(()),
                VISITING => return Err(SettingError::ReferenceCycle(name.to_string())),
                _ => {}
            }
            state.insert(name, VISITING);
            if let Some(Some(expr)) = exprs.get(name)
                && let Some(target) = expr.reference()
                && let Some(key) = exprs.get_key_value(target).map(|(k, _)| k.as_str())
            {
                visit(key, exprs, state)?;
            }
            state.insert(name, DONE);
            Ok(())
        }

        for name in self.exprs.keys() {
            visit(name, &self.exprs, &mut state)?;
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.raw.contains_key(name)
    }

    pub fn raw(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.raw.keys().map(String::as_str)
    }

    /// Resolve a setting to a number as of a date.
    pub fn resolve(&self, name: &str, as_of: Date) -> Result<f64, SettingError> {
        let mut visiting = Vec::new();
        self.resolve_inner(name, as_of, &mut visiting)
    }

    fn resolve_inner<'a>(
        &'a self,
        name: &str,
        as_of: Date,
        visiting: &mut Vec<&'a str>,
    ) -> Result<f64, SettingError> {
        let (key, raw) = self
            .raw
            .get_key_value(name)
            .ok_or_else(|| SettingError::UnknownSetting(name.to_string()))?;
        if visiting.contains(&key.as_str()) {
            return Err(SettingError::ReferenceCycle(name.to_string()));
        }
        visiting.push(key.as_str());

        let mut current = match self.exprs.get(key.as_str()).and_then(Option::as_ref) {
            Some(SettingExpr::Literal(v)) => Ok(*v),
            Some(SettingExpr::Ref { scale, name: r }) => self
                .resolve_inner(r, as_of, visiting)
                .map(|v| scale * v),
            None => Err(SettingError::NotNumeric {
                setting: key.clone(),
                value: raw.clone(),
            }),
        };

        // Revaluations at or before as_of, in date order: Set replaces the
        // effective value (and rescues a non-numeric base), Scale multiplies.
        if let Some(history) = self.history.get(key.as_str()) {
            for (_, revaluation) in history.iter().take_while(|(d, _)| *d <= as_of) {
                match revaluation {
                    Revaluation::Set(v) => current = Ok(*v),
                    Revaluation::Scale(f) => current = current.map(|v| v * f),
                }
            }
        }

        visiting.pop();
        current
    }

    /// Resolve a date-valued setting (ISO format).
    pub fn resolve_date(&self, name: &str) -> Result<Date, SettingError> {
        let raw = self
            .raw
            .get(name)
            .ok_or_else(|| SettingError::UnknownSetting(name.to_string()))?;
        raw.trim()
            .parse::<Date>()
            .map_err(|_| SettingError::NotADate {
                setting: name.to_string(),
                value: raw.clone(),
            })
    }

    /// Record a revaluation taking effect at `date`.
    pub fn revalue(
        &mut self,
        name: &str,
        date: Date,
        revaluation: Revaluation,
    ) -> Result<(), SettingError> {
        if !self.raw.contains_key(name) {
            return Err(SettingError::UnknownSetting(name.to_string()));
        }
        let history = self.history.entry(name.to_string()).or_default();
        // Keep date order; same-date entries apply in arrival order.
        let at = history.partition_point(|(d, _)| *d <= date);
        history.insert(at, (date, revaluation));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Setting;
    use jiff::civil::date;

    fn resolver(settings: &[Setting]) -> SettingsResolver {
        SettingsResolver::from_settings(settings).unwrap()
    }

    #[test]
    fn test_literal_and_reference_chain() {
        let r = resolver(&[
            Setting::constant("base", "100"),
            Setting::constant("half", "0.5base"),
            Setting::constant("quarter", "0.5half"),
        ]);
        let d = date(2020, 1, 1);
        assert_eq!(r.resolve("base", d).unwrap(), 100.0);
        assert_eq!(r.resolve("half", d).unwrap(), 50.0);
        assert_eq!(r.resolve("quarter", d).unwrap(), 25.0);
    }

    #[test]
    fn test_cycle_is_fatal_at_load() {
        let err = SettingsResolver::from_settings(&[
            Setting::constant("a", "2b"),
            Setting::constant("b", "3a"),
        ])
        .unwrap_err();
        assert!(matches!(err, SettingError::ReferenceCycle(_)));
    }

    #[test]
    fn test_scaled_dangling_reference_is_fatal() {
        let err =
            SettingsResolver::from_settings(&[Setting::constant("a", "2missing")]).unwrap_err();
        assert_eq!(
            err,
            SettingError::DanglingReference {
                setting: "a".to_string(),
                reference: "missing".to_string(),
            }
        );
    }

    #[test]
    fn test_bare_keyword_is_opaque_not_reference() {
        let r = resolver(&[Setting::view("viewFrequency", "monthly")]);
        let err = r.resolve("viewFrequency", date(2020, 1, 1)).unwrap_err();
        assert!(matches!(err, SettingError::NotNumeric { .. }));
    }

    #[test]
    fn test_revaluation_history() {
        let mut r = resolver(&[Setting::constant("price", "100")]);
        r.revalue("price", date(2020, 6, 1), Revaluation::Set(120.0))
            .unwrap();
        r.revalue("price", date(2021, 6, 1), Revaluation::Scale(2.0))
            .unwrap();

        assert_eq!(r.resolve("price", date(2020, 1, 1)).unwrap(), 100.0);
        assert_eq!(r.resolve("price", date(2020, 6, 1)).unwrap(), 120.0);
        assert_eq!(r.resolve("price", date(2021, 5, 31)).unwrap(), 120.0);
        assert_eq!(r.resolve("price", date(2022, 1, 1)).unwrap(), 240.0);
    }

    #[test]
    fn test_revaluation_flows_through_references() {
        let mut r = resolver(&[
            Setting::constant("price", "100"),
            Setting::constant("discounted", "0.9price"),
        ]);
        r.revalue("price", date(2020, 6, 1), Revaluation::Set(200.0))
            .unwrap();
        assert_eq!(r.resolve("discounted", date(2020, 7, 1)).unwrap(), 180.0);
    }

    #[test]
    fn test_resolve_date() {
        let r = resolver(&[Setting::view("viewStart", "2020-01-01")]);
        assert_eq!(r.resolve_date("viewStart").unwrap(), date(2020, 1, 1));
        assert!(matches!(
            resolver(&[Setting::view("viewStart", "soon")]).resolve_date("viewStart"),
            Err(SettingError::NotADate { .. })
        ));
    }
}
