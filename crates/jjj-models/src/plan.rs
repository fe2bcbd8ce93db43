//! Plan tiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Subscription tier. Selects the quota family and the limits that apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
}

/// Rejected plan value from an admin request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid plan '{0}', expected 'free' or 'pro'")]
pub struct InvalidPlan(pub String);

impl PlanTier {
    /// Parse from string (case-insensitive). Unknown values fall back to free,
    /// which is how stored records with stale plan ids are read.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pro" => PlanTier::Pro,
            _ => PlanTier::Free,
        }
    }

    /// Parse from string, rejecting anything other than `free` / `pro`.
    pub fn parse(s: &str) -> Result<Self, InvalidPlan> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            other => Err(InvalidPlan(other.to_string())),
        }
    }

    /// Get the plan name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
        }
    }

    /// Name shown in user-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            PlanTier::Free => "Free",
            PlanTier::Pro => "Pro",
        }
    }

    pub fn is_pro(&self) -> bool {
        matches!(self, PlanTier::Pro)
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_lossy_parse() {
        assert_eq!(PlanTier::from_str_lossy("free"), PlanTier::Free);
        assert_eq!(PlanTier::from_str_lossy("pro"), PlanTier::Pro);
        assert_eq!(PlanTier::from_str_lossy("PRO"), PlanTier::Pro);
        assert_eq!(PlanTier::from_str_lossy("studio"), PlanTier::Free);
        assert_eq!(PlanTier::from_str_lossy(""), PlanTier::Free);
    }

    #[test]
    fn test_plan_tier_strict_parse() {
        assert_eq!(PlanTier::parse(" Pro "), Ok(PlanTier::Pro));
        assert_eq!(PlanTier::parse("free"), Ok(PlanTier::Free));
        assert_eq!(
            PlanTier::parse("enterprise"),
            Err(InvalidPlan("enterprise".to_string()))
        );
    }

    #[test]
    fn test_plan_tier_serde_lowercase() {
        assert_eq!(serde_json::to_string(&PlanTier::Pro).unwrap(), "\"pro\"");
        let plan: PlanTier = serde_json::from_str("\"free\"").unwrap();
        assert_eq!(plan, PlanTier::Free);
    }
}
