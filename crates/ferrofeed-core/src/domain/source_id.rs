use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Stable identifier of an upstream source.
///
/// Built-in adapters use the constants below; embedders may register their
/// own adapters under any non-empty lowercase id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub const NEWSAPI: &'static str = "newsapi";
    pub const FINNHUB: &'static str = "finnhub";
    pub const GNEWS: &'static str = "gnews";

    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let value = value.as_ref().trim().to_ascii_lowercase();
        if value.is_empty() {
            return Err(ValidationError::EmptySourceId);
        }
        Ok(Self(value))
    }

    pub fn newsapi() -> Self {
        Self(String::from(Self::NEWSAPI))
    }

    pub fn finnhub() -> Self {
        Self(String::from(Self::FINNHUB))
    }

    pub fn gnews() -> Self {
        Self(String::from(Self::GNEWS))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let id = SourceId::new("  NewsAPI ").expect("valid id");
        assert_eq!(id, SourceId::newsapi());
    }

    #[test]
    fn rejects_blank_id() {
        assert_eq!(SourceId::new("   "), Err(ValidationError::EmptySourceId));
    }
}
