use std::fmt::{Display, Formatter};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tenure_core::{AppError, AppResult, NonEmptyString};

/// Namespaced name of one shared lock record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockName {
    namespace: NonEmptyString,
    name: NonEmptyString,
}

impl LockName {
    /// Creates a validated lock name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> AppResult<Self> {
        let namespace = NonEmptyString::new(namespace)
            .map_err(|_| AppError::Validation("lock namespace must not be empty".to_owned()))?;
        let name = NonEmptyString::new(name)
            .map_err(|_| AppError::Validation("lock name must not be empty".to_owned()))?;

        if namespace.as_str().contains('/') || name.as_str().contains('/') {
            return Err(AppError::Validation(format!(
                "lock namespace and name must not contain '/': '{}/{}'",
                namespace, name
            )));
        }

        Ok(Self { namespace, name })
    }

    /// Returns the lock namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Returns the lock name inside its namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl Display for LockName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.namespace, self.name)
    }
}

/// Opaque optimistic-concurrency token assigned by the store on every write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wraps a store-issued version value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for VersionToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Contents of the shared lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    holder_identity: String,
    acquire_time: DateTime<Utc>,
    renew_time: DateTime<Utc>,
    lease_duration_seconds: u32,
    leader_transitions: u32,
}

/// Raw stored fields used by store adapters to rebuild a [`LockRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecordFields {
    /// Current or most recent holder.
    pub holder_identity: String,
    /// When the current holder first took ownership.
    pub acquire_time: DateTime<Utc>,
    /// Latest successful renewal.
    pub renew_time: DateTime<Utc>,
    /// Lease declared by the holder.
    pub lease_duration_seconds: u32,
    /// Number of holder changes so far.
    pub leader_transitions: u32,
}

impl LockRecord {
    /// Creates the record written by the very first claimant.
    #[must_use]
    pub fn first_claim(
        holder_identity: &NonEmptyString,
        now: DateTime<Utc>,
        lease_duration_seconds: u32,
    ) -> Self {
        Self {
            holder_identity: holder_identity.as_str().to_owned(),
            acquire_time: now,
            renew_time: now,
            lease_duration_seconds,
            leader_transitions: 0,
        }
    }

    /// Rebuilds a record from persisted fields.
    pub fn from_fields(fields: LockRecordFields) -> AppResult<Self> {
        if fields.renew_time < fields.acquire_time {
            return Err(AppError::Validation(format!(
                "lock record renew_time {} precedes acquire_time {}",
                fields.renew_time, fields.acquire_time
            )));
        }

        Ok(Self {
            holder_identity: fields.holder_identity,
            acquire_time: fields.acquire_time,
            renew_time: fields.renew_time,
            lease_duration_seconds: fields.lease_duration_seconds,
            leader_transitions: fields.leader_transitions,
        })
    }

    /// Returns the record a claimant writes to take over or keep this lock.
    ///
    /// `acquire_time` and `leader_transitions` only move when the holder changes.
    #[must_use]
    pub fn claimed_by(
        &self,
        holder_identity: &NonEmptyString,
        now: DateTime<Utc>,
        lease_duration_seconds: u32,
    ) -> Self {
        if self.is_held_by(holder_identity.as_str()) {
            return Self {
                renew_time: now,
                lease_duration_seconds,
                ..self.clone()
            };
        }

        Self {
            holder_identity: holder_identity.as_str().to_owned(),
            acquire_time: now,
            renew_time: now,
            lease_duration_seconds,
            leader_transitions: self.leader_transitions.saturating_add(1),
        }
    }

    /// Returns the holder's renewal of this record.
    #[must_use]
    pub fn renewed(&self, now: DateTime<Utc>, lease_duration_seconds: u32) -> Self {
        Self {
            renew_time: now,
            lease_duration_seconds,
            ..self.clone()
        }
    }

    /// Returns true when the given identity is the recorded holder.
    #[must_use]
    pub fn is_held_by(&self, identity: &str) -> bool {
        self.holder_identity == identity
    }

    /// Returns the instant after which other processes may claim the lock.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.renew_time + TimeDelta::seconds(i64::from(self.lease_duration_seconds))
    }

    /// Returns true once more than the declared lease has passed since renewal.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Returns the current or most recent holder.
    #[must_use]
    pub fn holder_identity(&self) -> &str {
        self.holder_identity.as_str()
    }

    /// Returns when the current holder first took ownership.
    #[must_use]
    pub fn acquire_time(&self) -> DateTime<Utc> {
        self.acquire_time
    }

    /// Returns the latest successful renewal.
    #[must_use]
    pub fn renew_time(&self) -> DateTime<Utc> {
        self.renew_time
    }

    /// Returns the lease declared by the holder.
    #[must_use]
    pub fn lease_duration_seconds(&self) -> u32 {
        self.lease_duration_seconds
    }

    /// Returns how many times the holder has changed.
    #[must_use]
    pub fn leader_transitions(&self) -> u32 {
        self.leader_transitions
    }
}

/// A record together with the version token it was read or written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecordSnapshot {
    /// Record contents.
    pub record: LockRecord,
    /// Store version of these contents.
    pub version: VersionToken,
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use proptest::prelude::*;
    use tenure_core::NonEmptyString;

    use super::{LockName, LockRecord, LockRecordFields};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    fn identity(value: &str) -> NonEmptyString {
        NonEmptyString::new(value).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn lock_name_rejects_blank_parts() {
        assert!(LockName::new("", "controller-lock").is_err());
        assert!(LockName::new("default", "  ").is_err());
        assert!(LockName::new("default", "a/b").is_err());
    }

    #[test]
    fn lock_name_formats_as_namespace_and_name() {
        let lock = LockName::new("kube-system", "controller-lock");
        assert!(lock.is_ok());
        assert_eq!(
            lock.unwrap_or_else(|_| unreachable!()).to_string(),
            "kube-system/controller-lock"
        );
    }

    #[test]
    fn record_expires_strictly_after_lease() {
        let record = LockRecord::first_claim(&identity("a"), at(0), 60);

        assert!(!record.is_expired_at(at(59)));
        assert!(!record.is_expired_at(at(60)));
        assert!(record.is_expired_at(at(60) + TimeDelta::milliseconds(1)));
    }

    #[test]
    fn takeover_resets_acquire_time_and_counts_transition() {
        let record = LockRecord::first_claim(&identity("a"), at(0), 60);
        let taken = record.claimed_by(&identity("b"), at(100), 60);

        assert!(taken.is_held_by("b"));
        assert_eq!(taken.acquire_time(), at(100));
        assert_eq!(taken.renew_time(), at(100));
        assert_eq!(taken.leader_transitions(), 1);
    }

    #[test]
    fn reclaim_by_same_holder_keeps_acquire_time() {
        let record = LockRecord::first_claim(&identity("a"), at(0), 60);
        let reclaimed = record.claimed_by(&identity("a"), at(20), 45);

        assert_eq!(reclaimed.acquire_time(), at(0));
        assert_eq!(reclaimed.renew_time(), at(20));
        assert_eq!(reclaimed.lease_duration_seconds(), 45);
        assert_eq!(reclaimed.leader_transitions(), 0);
    }

    #[test]
    fn from_fields_rejects_renewal_before_acquisition() {
        let result = LockRecord::from_fields(LockRecordFields {
            holder_identity: "a".to_owned(),
            acquire_time: at(10),
            renew_time: at(5),
            lease_duration_seconds: 60,
            leader_transitions: 0,
        });

        assert!(result.is_err());
    }

    #[test]
    fn record_serializes_with_stable_field_names() {
        let record = LockRecord::first_claim(&identity("a"), at(0), 60);
        let value = serde_json::to_value(&record).unwrap_or_default();

        assert_eq!(value["holder_identity"], "a");
        assert_eq!(value["lease_duration_seconds"], 60);
        assert_eq!(value["leader_transitions"], 0);
    }

    proptest! {
        #[test]
        fn acquire_time_changes_only_with_holder(
            first in "[a-c]",
            second in "[a-c]",
            claim_offset in 1_i64..10_000,
            lease in 1_u32..600,
        ) {
            let record = LockRecord::first_claim(&identity(first.as_str()), at(0), lease);
            let next = record.claimed_by(&identity(second.as_str()), at(claim_offset), lease);

            let holder_changed = first != second;
            prop_assert_eq!(next.acquire_time() != record.acquire_time(), holder_changed);
            prop_assert_eq!(
                next.leader_transitions() != record.leader_transitions(),
                holder_changed
            );
            prop_assert_eq!(next.renew_time(), at(claim_offset));
        }

        #[test]
        fn renewal_never_changes_holder_or_acquire_time(
            renew_offsets in proptest::collection::vec(1_i64..100, 1..20),
        ) {
            let original = LockRecord::first_claim(&identity("leader"), at(0), 60);
            let mut record = original.clone();
            let mut now = 0_i64;
            for offset in renew_offsets {
                now += offset;
                record = record.renewed(at(now), 60);
            }

            prop_assert!(record.is_held_by("leader"));
            prop_assert_eq!(record.acquire_time(), original.acquire_time());
            prop_assert_eq!(record.renew_time(), at(now));
        }
    }
}
