//! # Trigger Detection
//!
//! The controller sees every watch event for a template, including the ones
//! caused by its own status writes. A pass only runs when one of the trigger
//! sources applies; everything else is skipped and requeued for the time left
//! until the next scheduled pass.

use super::types::TriggerSource;
use crate::constants::RECONCILE_ANNOTATION;
use crate::crd::{ApplicationTemplate, Phase};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Facts about a template that live outside the object itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerState {
    pub registry_changed: bool,
    pub retry_at: Option<DateTime<Utc>>,
}

/// Value of the manual reconcile annotation, if set
pub fn manual_trigger_value(template: &ApplicationTemplate) -> Option<&str> {
    template
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(RECONCILE_ANNOTATION))
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Decide whether a pass should run now and why
pub fn detect_trigger(
    template: &ApplicationTemplate,
    now: DateTime<Utc>,
    state: TriggerState,
) -> Option<TriggerSource> {
    let status = template.status.as_ref();
    let generation = template.metadata.generation;
    let observed = status.and_then(|s| s.observed_generation);

    if observed.is_none() || generation != observed {
        return Some(TriggerSource::SpecChange);
    }

    if let Some(requested) = manual_trigger_value(template) {
        if status.and_then(|s| s.last_handled_reconcile_at.as_deref()) != Some(requested) {
            return Some(TriggerSource::ManualCli);
        }
    }

    if state.retry_at.is_some_and(|at| now >= at) {
        return Some(TriggerSource::RetryAfterFailure);
    }

    if state.registry_changed {
        return Some(TriggerSource::RegistryChange);
    }

    match parse_time(status.and_then(|s| s.next_reconcile_time.as_deref())) {
        Some(next) if now < next => None,
        _ => {
            if status.and_then(|s| s.phase) == Some(Phase::Failed) {
                Some(TriggerSource::RetryAfterFailure)
            } else {
                Some(TriggerSource::Periodic)
            }
        }
    }
}

/// Time left until the next scheduled pass, or `fallback` if none is scheduled
pub fn time_until_next_pass(
    template: &ApplicationTemplate,
    now: DateTime<Utc>,
    retry_at: Option<DateTime<Utc>>,
    fallback: Duration,
) -> Duration {
    let scheduled = parse_time(
        template
            .status
            .as_ref()
            .and_then(|s| s.next_reconcile_time.as_deref()),
    );
    let earliest = match (scheduled, retry_at) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    earliest.map_or(fallback, |at| {
        (at - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_secs(1))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ApplicationTemplateSpec, ApplicationTemplateStatus};
    use std::collections::BTreeMap;

    fn template(generation: i64, status: Option<ApplicationTemplateStatus>) -> ApplicationTemplate {
        let mut template = ApplicationTemplate::new(
            "web",
            ApplicationTemplateSpec {
                name: "web".into(),
                repo_url: "https://example.com/repo.git".into(),
                target_revision: "main".into(),
                helm: None,
                kustomize: None,
            },
        );
        template.metadata.generation = Some(generation);
        template.status = status;
        template
    }

    fn settled(next: DateTime<Utc>) -> ApplicationTemplateStatus {
        ApplicationTemplateStatus {
            phase: Some(Phase::Ready),
            observed_generation: Some(1),
            next_reconcile_time: Some(next.to_rfc3339()),
            ..ApplicationTemplateStatus::default()
        }
    }

    #[test]
    fn test_new_template_is_spec_change() {
        let now = Utc::now();
        assert_eq!(
            detect_trigger(&template(1, None), now, TriggerState::default()),
            Some(TriggerSource::SpecChange)
        );
    }

    #[test]
    fn test_status_only_event_is_skipped() {
        let now = Utc::now();
        let t = template(1, Some(settled(now + chrono::Duration::minutes(5))));
        assert_eq!(detect_trigger(&t, now, TriggerState::default()), None);
    }

    #[test]
    fn test_generation_bump_is_spec_change() {
        let now = Utc::now();
        let t = template(2, Some(settled(now + chrono::Duration::minutes(5))));
        assert_eq!(
            detect_trigger(&t, now, TriggerState::default()),
            Some(TriggerSource::SpecChange)
        );
    }

    #[test]
    fn test_manual_annotation_runs_once() {
        let now = Utc::now();
        let mut t = template(1, Some(settled(now + chrono::Duration::minutes(5))));
        t.metadata.annotations = Some(BTreeMap::from([(
            RECONCILE_ANNOTATION.to_string(),
            "2024-05-01T10:00:00Z".to_string(),
        )]));
        assert_eq!(
            detect_trigger(&t, now, TriggerState::default()),
            Some(TriggerSource::ManualCli)
        );

        if let Some(status) = t.status.as_mut() {
            status.last_handled_reconcile_at = Some("2024-05-01T10:00:00Z".to_string());
        }
        assert_eq!(detect_trigger(&t, now, TriggerState::default()), None);
    }

    #[test]
    fn test_registry_change_and_periodic() {
        let now = Utc::now();
        let t = template(1, Some(settled(now + chrono::Duration::minutes(5))));
        let state = TriggerState {
            registry_changed: true,
            retry_at: None,
        };
        assert_eq!(detect_trigger(&t, now, state), Some(TriggerSource::RegistryChange));

        let due = template(1, Some(settled(now - chrono::Duration::seconds(1))));
        assert_eq!(
            detect_trigger(&due, now, TriggerState::default()),
            Some(TriggerSource::Periodic)
        );
    }

    #[test]
    fn test_retry_after_failure() {
        let now = Utc::now();
        let t = template(1, Some(settled(now + chrono::Duration::minutes(5))));
        let waiting = TriggerState {
            registry_changed: false,
            retry_at: Some(now + chrono::Duration::seconds(30)),
        };
        assert_eq!(detect_trigger(&t, now, waiting), None);

        let elapsed = TriggerState {
            registry_changed: false,
            retry_at: Some(now - chrono::Duration::seconds(1)),
        };
        assert_eq!(
            detect_trigger(&t, now, elapsed),
            Some(TriggerSource::RetryAfterFailure)
        );

        let mut failed = settled(now - chrono::Duration::seconds(1));
        failed.phase = Some(Phase::Failed);
        assert_eq!(
            detect_trigger(&template(1, Some(failed)), now, TriggerState::default()),
            Some(TriggerSource::RetryAfterFailure)
        );
    }

    #[test]
    fn test_time_until_next_pass() {
        let now = Utc::now();
        let t = template(1, Some(settled(now + chrono::Duration::seconds(90))));
        let remaining = time_until_next_pass(&t, now, None, Duration::from_secs(300));
        assert!(remaining <= Duration::from_secs(90) && remaining >= Duration::from_secs(89));

        let retry = time_until_next_pass(&t, now, Some(now + chrono::Duration::seconds(10)), Duration::from_secs(300));
        assert!(retry <= Duration::from_secs(10));

        let unscheduled = template(1, None);
        assert_eq!(
            time_until_next_pass(&unscheduled, now, None, Duration::from_secs(300)),
            Duration::from_secs(300)
        );
    }
}
