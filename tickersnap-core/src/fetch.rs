//! Fetch outcomes that keep provider failures visible.
//!
//! A failed provider call never aborts an export, but it should not vanish
//! either. `Fetched` carries the value that was used together with the
//! reason a fallback was needed, if any.

use crate::provider::ProviderError;

/// Result of asking a provider for one section of the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// The provider answered.
    Data(T),
    /// The provider failed and `value` is the empty stand-in.
    Fallback { value: T, reason: ProviderError },
}

impl<T: Default> Fetched<T> {
    pub fn from_result(result: Result<T, ProviderError>) -> Self {
        Self::from_result_or_else(result, T::default)
    }
}

impl<T> Fetched<T> {
    pub fn from_result_or_else(
        result: Result<T, ProviderError>,
        fallback: impl FnOnce() -> T,
    ) -> Self {
        match result {
            Ok(value) => Fetched::Data(value),
            Err(reason) => Fetched::Fallback {
                value: fallback(),
                reason,
            },
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Fetched::Data(v) | Fetched::Fallback { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Fetched::Data(v) | Fetched::Fallback { value: v, .. } => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Fetched::Fallback { .. })
    }

    pub fn reason(&self) -> Option<&ProviderError> {
        match self {
            Fetched::Data(_) => None,
            Fetched::Fallback { reason, .. } => Some(reason),
        }
    }

    /// Transform the carried value, keeping the outcome.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Data(v) => Fetched::Data(f(v)),
            Fetched::Fallback { value, reason } => Fetched::Fallback {
                value: f(value),
                reason,
            },
        }
    }

    /// Summarize for the export report. `entries` counts keys or rows.
    pub fn status(&self, entries: impl FnOnce(&T) -> usize) -> SectionStatus {
        match self {
            Fetched::Data(v) => SectionStatus::Fetched {
                entries: entries(v),
            },
            Fetched::Fallback { reason, .. } => SectionStatus::Fallback {
                reason: reason.clone(),
            },
        }
    }
}

/// What happened to one section of an export.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionStatus {
    Fetched { entries: usize },
    Fallback { reason: ProviderError },
}

impl SectionStatus {
    pub fn is_fallback(&self) -> bool {
        matches!(self, SectionStatus::Fallback { .. })
    }
}
