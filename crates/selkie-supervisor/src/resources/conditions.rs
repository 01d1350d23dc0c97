//! Status conditions for FederationDomain objects.
//!
//! Conditions follow the Kubernetes convention: a typed list where each
//! entry carries a status, a machine-readable reason, and a human-readable
//! message. `lastTransitionTime` only moves when the observable part of a
//! condition actually changes, so repeated reconciles with no configuration
//! change produce byte-identical status objects.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Status of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition could not be evaluated.
    Unknown,
}

/// One entry in a resource's `status.conditions` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `IssuerURLValid`.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Whether the condition holds.
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition.
    pub reason: String,

    /// Human-readable message for operators.
    pub message: String,

    /// The spec generation this condition was computed against.
    pub observed_generation: i64,

    /// When the condition last changed status, reason, or message.
    #[serde(with = "time::serde::rfc3339")]
    pub last_transition_time: OffsetDateTime,
}

impl Condition {
    /// Create a condition stamped with the given time.
    #[must_use]
    pub fn new(
        type_name: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.to_string(),
            status,
            reason: reason.to_string(),
            message: message.into(),
            observed_generation: 0,
            last_transition_time: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` when status, reason, and message all match `other`.
    ///
    /// Timestamps and observed generation are deliberately excluded: two
    /// conditions that agree on the observable fields are the same
    /// condition, just observed at different times.
    #[must_use]
    pub fn same_state_as(&self, other: &Condition) -> bool {
        self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Returns `true` when any condition is not `True`.
///
/// A FederationDomain with any such condition is not loaded into the
/// published federation domain set.
#[must_use]
pub fn had_error_condition(conditions: &[Condition]) -> bool {
    conditions.iter().any(|c| c.status != ConditionStatus::True)
}

/// Merge freshly computed conditions into an existing condition list.
///
/// Every computed condition is stamped with `observed_generation`; its
/// `lastTransitionTime` is preserved from the existing list when the
/// observable state is unchanged. Conditions whose type is no longer
/// computed are dropped. The result is sorted by type so that repeated
/// merges are byte-stable.
#[must_use]
pub fn merge_conditions(
    computed: Vec<Condition>,
    existing: &[Condition],
    observed_generation: i64,
    now: OffsetDateTime,
) -> Vec<Condition> {
    let mut merged: Vec<Condition> = computed
        .into_iter()
        .map(|mut condition| {
            condition.observed_generation = observed_generation;
            condition.last_transition_time = existing
                .iter()
                .find(|old| old.type_name == condition.type_name)
                .filter(|old| old.same_state_as(&condition))
                .map_or(now, |old| old.last_transition_time);
            condition
        })
        .collect();
    merged.sort_by(|a, b| a.type_name.cmp(&b.type_name));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn condition(type_name: &str, status: ConditionStatus) -> Condition {
        Condition::new(type_name, status, "Success", "message")
    }

    #[test]
    fn test_had_error_condition() {
        assert!(!had_error_condition(&[]));
        assert!(!had_error_condition(&[condition("A", ConditionStatus::True)]));
        assert!(had_error_condition(&[
            condition("A", ConditionStatus::True),
            condition("B", ConditionStatus::False),
        ]));
        assert!(had_error_condition(&[condition(
            "A",
            ConditionStatus::Unknown
        )]));
    }

    #[test]
    fn test_merge_preserves_transition_time_when_state_unchanged() {
        let old_time = datetime!(2025-06-01 12:00 UTC);
        let now = datetime!(2025-06-02 12:00 UTC);

        let mut existing = condition("Ready", ConditionStatus::True);
        existing.last_transition_time = old_time;

        let merged = merge_conditions(
            vec![condition("Ready", ConditionStatus::True)],
            &[existing],
            3,
            now,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].last_transition_time, old_time);
        assert_eq!(merged[0].observed_generation, 3);
    }

    #[test]
    fn test_merge_bumps_transition_time_on_state_change() {
        let old_time = datetime!(2025-06-01 12:00 UTC);
        let now = datetime!(2025-06-02 12:00 UTC);

        let mut existing = condition("Ready", ConditionStatus::True);
        existing.last_transition_time = old_time;

        let merged = merge_conditions(
            vec![condition("Ready", ConditionStatus::False)],
            &[existing],
            3,
            now,
        );

        assert_eq!(merged[0].last_transition_time, now);
    }

    #[test]
    fn test_merge_sorts_by_type_and_drops_stale_types() {
        let now = datetime!(2025-06-02 12:00 UTC);
        let existing = vec![condition("Obsolete", ConditionStatus::True)];

        let merged = merge_conditions(
            vec![
                condition("Zeta", ConditionStatus::True),
                condition("Alpha", ConditionStatus::True),
            ],
            &existing,
            1,
            now,
        );

        let types: Vec<&str> = merged.iter().map(|c| c.type_name.as_str()).collect();
        assert_eq!(types, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_same_state_ignores_timestamps() {
        let mut a = condition("Ready", ConditionStatus::True);
        let mut b = condition("Ready", ConditionStatus::True);
        a.last_transition_time = datetime!(2025-01-01 0:00 UTC);
        b.last_transition_time = datetime!(2025-02-02 0:00 UTC);
        a.observed_generation = 1;
        b.observed_generation = 9;
        assert!(a.same_state_as(&b));

        b.message = "different".to_string();
        assert!(!a.same_state_as(&b));
    }
}
