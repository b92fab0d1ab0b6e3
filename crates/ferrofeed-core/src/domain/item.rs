use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{SourceId, UtcDateTime, ValidationError};

/// Coarse market-impact classification attached to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    High,
    Medium,
    Low,
}

impl ImpactLevel {
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl Display for ImpactLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImpactLevel {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ValidationError::InvalidImpactLevel {
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactAnnotation {
    pub level: ImpactLevel,
    pub description: String,
}

/// Source-agnostic result record produced by adapters.
///
/// Items are value objects: the aggregator copies them while merging and
/// never mutates one after an adapter hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: String,
    pub source: SourceId,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub published_at: UtcDateTime,
    pub categories: Vec<String>,
    pub impact: Option<ImpactAnnotation>,
}

impl NormalizedItem {
    pub fn has_category(&self, category: &str) -> bool {
        let needle = category.trim();
        self.categories
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(needle))
    }

    pub fn impact_level(&self) -> Option<ImpactLevel> {
        self.impact.as_ref().map(|impact| impact.level)
    }
}

/// Inclusive publish-time window used by date-range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: UtcDateTime,
    end: UtcDateTime,
}

impl DateRange {
    pub fn new(start: UtcDateTime, end: UtcDateTime) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedRange {
                start: start.format_rfc3339(),
                end: end.format_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    pub const fn start(self) -> UtcDateTime {
        self.start
    }

    pub const fn end(self) -> UtcDateTime {
        self.end
    }

    pub fn contains(self, value: UtcDateTime) -> bool {
        self.start <= value && value <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> UtcDateTime {
        UtcDateTime::parse(value).expect("valid timestamp")
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let err = DateRange::new(ts("2024-02-01T00:00:00Z"), ts("2024-01-01T00:00:00Z"))
            .expect_err("must fail");
        assert!(matches!(err, ValidationError::InvertedRange { .. }));
    }

    #[test]
    fn range_is_inclusive() {
        let range = DateRange::new(ts("2024-01-01T00:00:00Z"), ts("2024-01-02T00:00:00Z"))
            .expect("valid range");
        assert!(range.contains(ts("2024-01-01T00:00:00Z")));
        assert!(range.contains(ts("2024-01-02T00:00:00Z")));
        assert!(!range.contains(ts("2024-01-02T00:00:01Z")));
    }

    #[test]
    fn impact_level_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<ImpactLevel>(), Ok(ImpactLevel::High));
        assert!("severe".parse::<ImpactLevel>().is_err());
    }
}
