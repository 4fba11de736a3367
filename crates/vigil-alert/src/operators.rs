//! Closed operator sets used by rule conditions.
//!
//! Both enums serialize as single-digit string codes (`"1"`, `"2"`, ...).
//! Previously stored rules depend on those codes and on the `Display`
//! text, so neither may change.

use crate::error::RuleError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    None,
    ValueIsAbove,
    ValueIsBelow,
    ValueIsEq,
    ValueIsNotEq,
    ValueAboveOrEq,
    ValueBelowOrEq,
    ValueOutsideBounds,
}

impl CompareOp {
    pub const ALL: [CompareOp; 8] = [
        CompareOp::None,
        CompareOp::ValueIsAbove,
        CompareOp::ValueIsBelow,
        CompareOp::ValueIsEq,
        CompareOp::ValueIsNotEq,
        CompareOp::ValueAboveOrEq,
        CompareOp::ValueBelowOrEq,
        CompareOp::ValueOutsideBounds,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            CompareOp::None => "0",
            CompareOp::ValueIsAbove => "1",
            CompareOp::ValueIsBelow => "2",
            CompareOp::ValueIsEq => "3",
            CompareOp::ValueIsNotEq => "4",
            CompareOp::ValueAboveOrEq => "5",
            CompareOp::ValueBelowOrEq => "6",
            CompareOp::ValueOutsideBounds => "7",
        }
    }

    /// Short phrase for log lines and alert summaries.
    pub fn phrase(&self) -> &'static str {
        match self {
            CompareOp::None => "none",
            CompareOp::ValueIsAbove => "above",
            CompareOp::ValueIsBelow => "below",
            CompareOp::ValueIsEq => "equal to",
            CompareOp::ValueIsNotEq => "not equal to",
            CompareOp::ValueAboveOrEq => "above or equal to",
            CompareOp::ValueBelowOrEq => "below or equal to",
            CompareOp::ValueOutsideBounds => "outside the bounds of",
        }
    }

    /// Only `None` is rejected; every other member is valid for an active rule.
    pub fn validate(&self) -> Result<(), RuleError> {
        match self {
            CompareOp::None => Err(Self::invalid(&self.to_string())),
            _ => Ok(()),
        }
    }

    /// Applies the relational semantics of the operator to `value`.
    ///
    /// `ValueOutsideBounds` holds when `value` lies outside the symmetric
    /// range `(-target, target)`.
    pub fn compare(&self, value: f64, target: f64) -> bool {
        match self {
            CompareOp::None => false,
            CompareOp::ValueIsAbove => value > target,
            CompareOp::ValueIsBelow => value < target,
            CompareOp::ValueIsEq => value == target,
            CompareOp::ValueIsNotEq => value != target,
            CompareOp::ValueAboveOrEq => value >= target,
            CompareOp::ValueBelowOrEq => value <= target,
            CompareOp::ValueOutsideBounds => value.abs() >= target.abs(),
        }
    }

    fn invalid(op: &str) -> RuleError {
        RuleError::InvalidCompareOp {
            op: op.to_string(),
            supported: supported_list(&Self::ALL),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CompareOp::None => "None",
            CompareOp::ValueIsAbove => "ValueIsAbove",
            CompareOp::ValueIsBelow => "ValueIsBelow",
            CompareOp::ValueIsEq => "ValueIsEq",
            CompareOp::ValueIsNotEq => "ValueIsNotEq",
            CompareOp::ValueAboveOrEq => "ValueAboveOrEq",
            CompareOp::ValueBelowOrEq => "ValueBelowOrEq",
            CompareOp::ValueOutsideBounds => "ValueOutsideBounds",
        };
        write!(f, "{name}: Enum value {}", self.code())
    }
}

impl FromStr for CompareOp {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.code() == s)
            .ok_or_else(|| Self::invalid(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    None,
    AtLeastOnce,
    AllTheTimes,
    OnAverage,
    InTotal,
    Last,
}

impl MatchType {
    pub const ALL: [MatchType; 6] = [
        MatchType::None,
        MatchType::AtLeastOnce,
        MatchType::AllTheTimes,
        MatchType::OnAverage,
        MatchType::InTotal,
        MatchType::Last,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            MatchType::None => "0",
            MatchType::AtLeastOnce => "1",
            MatchType::AllTheTimes => "2",
            MatchType::OnAverage => "3",
            MatchType::InTotal => "4",
            MatchType::Last => "5",
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            MatchType::None => "none",
            MatchType::AtLeastOnce => "at least once",
            MatchType::AllTheTimes => "all the times",
            MatchType::OnAverage => "on average",
            MatchType::InTotal => "in total",
            MatchType::Last => "last",
        }
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        match self {
            MatchType::None => Err(Self::invalid(&self.to_string())),
            _ => Ok(()),
        }
    }

    fn invalid(match_type: &str) -> RuleError {
        RuleError::InvalidMatchType {
            match_type: match_type.to_string(),
            supported: supported_list(&Self::ALL),
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchType::None => "None",
            MatchType::AtLeastOnce => "AtleastOnce",
            MatchType::AllTheTimes => "AllTheTimes",
            MatchType::OnAverage => "OnAverage",
            MatchType::InTotal => "InTotal",
            MatchType::Last => "Last",
        };
        write!(f, "{name}: Enum value {}", self.code())
    }
}

impl FromStr for MatchType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mt| mt.code() == s)
            .ok_or_else(|| Self::invalid(s))
    }
}

fn supported_list<T: std::fmt::Display>(values: &[T]) -> String {
    values.iter().map(|v| format!("{v}, ")).collect()
}

macro_rules! code_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let code = String::deserialize(deserializer)?;
                code.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

code_serde!(CompareOp);
code_serde!(MatchType);

/// Deserializes an optional code field where both a missing value and the
/// empty string mean "not set".
pub(crate) fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
