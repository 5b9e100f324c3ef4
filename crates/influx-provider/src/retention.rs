//! Retention encoding shared by the bucket and its DBRP mapping
//!
//! A bucket carries its retention as a rule in seconds; the DBRP mapping
//! carries it as a label (`inf` or `<N>days`). Both are derived from the
//! same day count so they cannot drift apart.

use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Label used for buckets without a retention rule
pub const INFINITE_LABEL: &str = "inf";

const EXPIRE_RULE: &str = "expire";

/// Bucket retention rule as sent to and returned by the Buckets API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRule {
    #[serde(rename = "type", default = "expire_rule")]
    pub rule_type: String,

    pub every_seconds: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_group_duration_seconds: Option<i64>,
}

fn expire_rule() -> String {
    EXPIRE_RULE.to_string()
}

impl RetentionRule {
    pub fn expire_after(every_seconds: i64) -> Self {
        Self {
            rule_type: expire_rule(),
            every_seconds,
            shard_group_duration_seconds: None,
        }
    }
}

/// Retention expressed in whole days; zero means infinite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Retention {
    days: u32,
}

impl Retention {
    pub fn from_days(days: u32) -> Self {
        Self { days }
    }

    /// Recover the day count from a bucket's rules (first rule wins)
    pub fn from_rules(rules: &[RetentionRule]) -> Self {
        let days = rules
            .first()
            .map(|rule| rule.every_seconds.max(0) / SECONDS_PER_DAY)
            .map(|days| u32::try_from(days).unwrap_or(u32::MAX))
            .unwrap_or(0);
        Self { days }
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn is_infinite(&self) -> bool {
        self.days == 0
    }

    pub fn seconds(&self) -> i64 {
        i64::from(self.days) * SECONDS_PER_DAY
    }

    /// Rule list for the Buckets API: empty or exactly one expire rule
    pub fn rules(&self) -> Vec<RetentionRule> {
        if self.is_infinite() {
            Vec::new()
        } else {
            vec![RetentionRule::expire_after(self.seconds())]
        }
    }

    /// Retention policy label for the DBRP mapping
    pub fn label(&self) -> String {
        if self.is_infinite() {
            INFINITE_LABEL.to_string()
        } else {
            format!("{}days", self.days)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_days_is_infinite() {
        let retention = Retention::from_days(0);
        assert!(retention.rules().is_empty());
        assert_eq!(retention.label(), "inf");
    }

    #[test]
    fn test_days_to_seconds_and_label() {
        for days in [1u32, 7, 30, 365, 3650] {
            let retention = Retention::from_days(days);
            let rules = retention.rules();
            assert_eq!(rules.len(), 1);
            assert_eq!(rules[0].every_seconds, i64::from(days) * 86400);
            assert_eq!(rules[0].rule_type, "expire");
            assert_eq!(retention.label(), format!("{}days", days));
        }

        assert_eq!(Retention::from_days(30).rules()[0].every_seconds, 2_592_000);
    }

    #[test]
    fn test_from_rules() {
        assert_eq!(Retention::from_rules(&[]).days(), 0);
        assert_eq!(
            Retention::from_rules(&[RetentionRule::expire_after(2_592_000)]).days(),
            30
        );
        // sub-day rules collapse to zero days
        assert_eq!(
            Retention::from_rules(&[RetentionRule::expire_after(3600)]).days(),
            0
        );
    }

    #[test]
    fn test_rule_wire_format() {
        let json = serde_json::to_value(RetentionRule::expire_after(86400)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "expire", "everySeconds": 86400 })
        );

        let parsed: RetentionRule = serde_json::from_str(r#"{"everySeconds": 604800}"#).unwrap();
        assert_eq!(parsed.rule_type, "expire");
    }
}
