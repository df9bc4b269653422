//! Named date triggers.
//!
//! Anywhere the model takes a date (item starts/ends, transaction dates) it
//! accepts either a literal date or the name of a trigger, so a whole plan can
//! pivot around "retirement" by editing one entry.

use jiff::civil::Date;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A named date. Names are unique within a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub date: Date,
}

impl Trigger {
    pub fn new(name: impl Into<String>, date: Date) -> Self {
        Self {
            name: name.into(),
            date,
        }
    }
}

/// A literal date or a trigger name, resolved against the trigger table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DateSpec {
    Date(Date),
    Named(String),
}

impl DateSpec {
    pub fn named(name: impl Into<String>) -> Self {
        DateSpec::Named(name.into())
    }

    pub fn resolve(&self, triggers: &FxHashMap<String, Date>) -> Result<Date, ModelError> {
        match self {
            DateSpec::Date(d) => Ok(*d),
            DateSpec::Named(name) => triggers
                .get(name)
                .copied()
                .ok_or_else(|| ModelError::UnknownTrigger(name.clone())),
        }
    }
}

impl From<Date> for DateSpec {
    fn from(d: Date) -> Self {
        DateSpec::Date(d)
    }
}
