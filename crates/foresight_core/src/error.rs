use std::fmt;

/// Errors raised while resolving setting values.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingError {
    UnknownSetting(String),
    DanglingReference { setting: String, reference: String },
    ReferenceCycle(String),
    NotNumeric { setting: String, value: String },
    NotADate { setting: String, value: String },
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownSetting(name) => write!(f, "setting {name:?} not found"),
            SettingError::DanglingReference { setting, reference } => {
                write!(f, "setting {setting:?} references unknown setting {reference:?}")
            }
            SettingError::ReferenceCycle(name) => {
                write!(f, "setting {name:?} participates in a reference cycle")
            }
            SettingError::NotNumeric { setting, value } => {
                write!(f, "setting {setting:?} has non-numeric value {value:?}")
            }
            SettingError::NotADate { setting, value } => {
                write!(f, "setting {setting:?} has non-date value {value:?}")
            }
        }
    }
}

impl std::error::Error for SettingError {}

/// Errors detected while preparing a model for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    DuplicateName(String),
    UnknownTrigger(String),
    UnknownItem { transaction: String, item: String },
    MissingCashItem,
    EmptyTransferSide { transaction: String },
    PensionSourceNotIncome { transaction: String, source: String },
    PensionTargetRole { transaction: String, target: String },
    NotADebt { transaction: String, target: String },
    MalformedRsu { asset: String },
    Setting(SettingError),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::DuplicateName(name) => write!(f, "duplicate name {name:?} in model"),
            ModelError::UnknownTrigger(name) => write!(f, "trigger {name:?} not found"),
            ModelError::UnknownItem { transaction, item } => {
                write!(f, "transaction {transaction:?} names unknown item {item:?}")
            }
            ModelError::MissingCashItem => {
                write!(f, "model has no cash item")
            }
            ModelError::EmptyTransferSide { transaction } => {
                write!(f, "transaction {transaction:?} has a side that expands to no items")
            }
            ModelError::PensionSourceNotIncome { transaction, source } => {
                write!(
                    f,
                    "pension contribution {transaction:?} must draw from an income, got {source:?}"
                )
            }
            ModelError::PensionTargetRole { transaction, target } => {
                write!(
                    f,
                    "transaction {transaction:?} targets {target:?}, which lacks the required pension role"
                )
            }
            ModelError::NotADebt { transaction, target } => {
                write!(f, "transaction {transaction:?} pays off {target:?}, which is not a debt")
            }
            ModelError::MalformedRsu { asset } => {
                write!(
                    f,
                    "RSU grant {asset:?} must be unit-priced via a setting and carry an income tax liability"
                )
            }
            ModelError::Setting(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Setting(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SettingError> for ModelError {
    fn from(e: SettingError) -> Self {
        ModelError::Setting(e)
    }
}

/// Errors that abort an evaluation run.
///
/// Any of these is a configuration failure: the run fails closed and the
/// public entry point returns an empty result (§ error handling).
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    Model(ModelError),
    Setting(SettingError),
    NegativeNotAllowed { item: String, value: f64 },
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationError::Model(e) => write!(f, "{e}"),
            EvaluationError::Setting(e) => write!(f, "{e}"),
            EvaluationError::NegativeNotAllowed { item, value } => {
                write!(f, "item {item:?} may not go negative (got {value})")
            }
        }
    }
}

impl std::error::Error for EvaluationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvaluationError::Model(e) => Some(e),
            EvaluationError::Setting(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModelError> for EvaluationError {
    fn from(e: ModelError) -> Self {
        EvaluationError::Model(e)
    }
}

impl From<SettingError> for EvaluationError {
    fn from(e: SettingError) -> Self {
        EvaluationError::Setting(e)
    }
}
