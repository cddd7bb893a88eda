//! Usage record for the daily credit quota.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use studio_core::error::AppError;

/// A user's entitlement and quota state.
///
/// `credits_used_today` is only meaningful for `last_reset_date`; the quota
/// gate rolls it over before every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Exempt from the daily limit.
    pub is_entitled: bool,

    /// Gated actions performed on `last_reset_date`.
    pub credits_used_today: u32,

    /// Calendar day the counter belongs to, serialized as `YYYY-MM-DD`.
    pub last_reset_date: NaiveDate,

    #[serde(default)]
    pub tier: TierMetadata,

    #[serde(default)]
    pub is_authenticated: bool,

    #[serde(default)]
    pub language: Language,
}

/// Interface language of the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    /// Zomi
    Zo,
    /// Burmese
    My,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zo => "zo",
            Language::My => "my",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zo" => Ok(Language::Zo),
            "my" => Ok(Language::My),
            other => Err(AppError::InvalidRequest(format!(
                "Unsupported language: {}",
                other
            ))),
        }
    }
}

/// Partial profile edit. Absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub language: Option<Language>,
}

/// Opaque account details shown next to the entitlement tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
}

/// Result of an entitlement service query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitlementStatus {
    pub is_entitled: bool,
    pub subscription_status: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub email: Option<String>,
}

impl UsageRecord {
    /// Fresh record for first launch.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            is_entitled: false,
            credits_used_today: 0,
            last_reset_date: today,
            tier: TierMetadata::default(),
            is_authenticated: false,
            language: Language::default(),
        }
    }

    /// The record as it should be read on `today`.
    pub fn rolled_over(&self, today: NaiveDate) -> Self {
        if self.last_reset_date == today {
            return self.clone();
        }
        Self {
            credits_used_today: 0,
            last_reset_date: today,
            ..self.clone()
        }
    }

    /// Apply an entitlement change. Known account fields are merged, never
    /// cleared by an absent value.
    pub fn apply_entitlement(&self, status: &EntitlementStatus) -> Self {
        let mut next = self.clone();
        next.is_entitled = status.is_entitled;

        let tier = &mut next.tier;
        if status.subscription_status.is_some() {
            tier.subscription_status = status.subscription_status.clone();
        }
        if status.customer_id.is_some() {
            tier.customer_id = status.customer_id.clone();
        }
        if status.subscription_id.is_some() {
            tier.subscription_id = status.subscription_id.clone();
        }
        if status.email.is_some() {
            tier.email = status.email.clone();
        }
        next
    }

    pub fn signed_in(&self, email: &str, display_name: &str) -> Self {
        let mut next = self.clone();
        next.is_authenticated = true;
        next.tier.email = Some(email.to_string());
        next.tier.display_name = Some(display_name.to_string());
        next
    }

    /// Forget the account identity. Quota, entitlement and language stay.
    pub fn signed_out(&self) -> Self {
        let mut next = self.clone();
        next.is_authenticated = false;
        next.tier.email = None;
        next.tier.display_name = None;
        next
    }

    pub fn with_profile(&self, update: &ProfileUpdate) -> Self {
        let mut next = self.clone();
        if let Some(name) = &update.display_name {
            next.tier.display_name = Some(name.clone());
        }
        if let Some(email) = &update.email {
            next.tier.email = Some(email.clone());
        }
        if let Some(language) = update.language {
            next.language = language;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn serializes_with_camel_case_and_iso_date() {
        let record = UsageRecord {
            credits_used_today: 2,
            ..UsageRecord::new(day(4))
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["creditsUsedToday"], 2);
        assert_eq!(json["lastResetDate"], "2026-03-04");
        assert_eq!(json["isEntitled"], false);
    }

    #[test]
    fn deserializes_without_tier() {
        let json = r#"{"isEntitled":true,"creditsUsedToday":1,"lastResetDate":"2026-03-01"}"#;
        let record: UsageRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_entitled);
        assert_eq!(record.tier, TierMetadata::default());
    }

    #[test]
    fn rollover_keeps_same_day_untouched() {
        let record = UsageRecord {
            credits_used_today: 3,
            ..UsageRecord::new(day(2))
        };
        assert_eq!(record.rolled_over(day(2)), record);

        let next = record.rolled_over(day(3));
        assert_eq!(next.credits_used_today, 0);
        assert_eq!(next.last_reset_date, day(3));
    }

    #[test]
    fn sign_out_keeps_quota_and_entitlement() {
        let mut record = UsageRecord::new(day(5));
        record.credits_used_today = 3;
        record.is_entitled = true;
        record.language = Language::My;

        let signed_in = record.signed_in("ada@example.com", "Ada");
        assert!(signed_in.is_authenticated);
        assert_eq!(signed_in.tier.display_name.as_deref(), Some("Ada"));

        let signed_out = signed_in.signed_out();
        assert!(!signed_out.is_authenticated);
        assert!(signed_out.tier.email.is_none());
        assert!(signed_out.tier.display_name.is_none());
        assert_eq!(signed_out.credits_used_today, 3);
        assert!(signed_out.is_entitled);
        assert_eq!(signed_out.language, Language::My);
    }

    #[test]
    fn profile_update_touches_only_given_fields() {
        let record = UsageRecord::new(day(5)).signed_in("ada@example.com", "Ada");
        let updated = record.with_profile(&ProfileUpdate {
            display_name: Some("Ada L.".to_string()),
            language: Some(Language::Zo),
            ..Default::default()
        });

        assert_eq!(updated.tier.display_name.as_deref(), Some("Ada L."));
        assert_eq!(updated.tier.email.as_deref(), Some("ada@example.com"));
        assert_eq!(updated.language, Language::Zo);
        assert!(updated.is_authenticated);
    }

    #[test]
    fn language_parses_codes_and_serializes_lowercase() {
        assert_eq!(" MY ".parse::<Language>().unwrap(), Language::My);
        assert!(matches!(
            "fr".parse::<Language>(),
            Err(AppError::InvalidRequest(_))
        ));

        let json = serde_json::to_value(UsageRecord::new(day(1))).unwrap();
        assert_eq!(json["language"], "en");
        assert_eq!(json["isAuthenticated"], false);
    }

    #[test]
    fn entitlement_merges_account_fields() {
        let mut record = UsageRecord::new(day(1));
        record.tier.email = Some("old@example.com".to_string());

        let upgraded = record.apply_entitlement(&EntitlementStatus {
            is_entitled: true,
            subscription_status: Some("active".to_string()),
            customer_id: Some("cus_123".to_string()),
            ..Default::default()
        });

        assert!(upgraded.is_entitled);
        assert_eq!(upgraded.tier.customer_id.as_deref(), Some("cus_123"));
        assert_eq!(upgraded.tier.email.as_deref(), Some("old@example.com"));
        assert_eq!(upgraded.credits_used_today, record.credits_used_today);
    }
}
