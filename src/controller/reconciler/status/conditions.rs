//! # Conditions
//!
//! Upsert of conditions by type. The transition time only moves when the
//! condition's status flips; reason and message are always refreshed.

use crate::crd::{Condition, ConditionStatus};

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_DEGRADED: &str = "Degraded";
pub const CONDITION_STALE: &str = "Stale";
pub const CONDITION_CONFIGURATION_WARNING: &str = "ConfigurationWarning";

/// Insert or update `condition_type`, keeping the list sorted by type
pub fn upsert_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    message: String,
    now: &str,
) {
    match conditions.iter_mut().find(|c| c.r#type == condition_type) {
        Some(existing) => {
            if existing.status != status || existing.last_transition_time.is_none() {
                existing.last_transition_time = Some(now.to_string());
            }
            existing.status = status;
            existing.reason = Some(reason.to_string());
            existing.message = Some(message);
        }
        None => conditions.push(Condition {
            r#type: condition_type.to_string(),
            status,
            last_transition_time: Some(now.to_string()),
            reason: Some(reason.to_string()),
            message: Some(message),
        }),
    }
    conditions.sort_by(|a, b| a.r#type.cmp(&b.r#type));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_time_kept_while_status_unchanged() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, CONDITION_READY, ConditionStatus::True, "AllRendered", "ok".into(), "t1");
        upsert_condition(&mut conditions, CONDITION_READY, ConditionStatus::True, "AllRendered", "still ok".into(), "t2");

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time.as_deref(), Some("t1"));
        assert_eq!(conditions[0].message.as_deref(), Some("still ok"));

        upsert_condition(&mut conditions, CONDITION_READY, ConditionStatus::False, "RenderFailed", "broken".into(), "t3");
        assert_eq!(conditions[0].last_transition_time.as_deref(), Some("t3"));
        assert_eq!(conditions[0].status, ConditionStatus::False);
    }

    #[test]
    fn test_conditions_sorted_by_type() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, CONDITION_STALE, ConditionStatus::False, "NoStaleFiles", String::new(), "t");
        upsert_condition(&mut conditions, CONDITION_READY, ConditionStatus::True, "AllRendered", String::new(), "t");
        upsert_condition(&mut conditions, CONDITION_DEGRADED, ConditionStatus::False, "NoFailures", String::new(), "t");

        let types: Vec<_> = conditions.iter().map(|c| c.r#type.as_str()).collect();
        assert_eq!(types, vec!["Degraded", "Ready", "Stale"]);
    }
}
