//! Whole-record conflict detection and resolution.

use crate::ids::LocalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a conflict between a local and a remote copy of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The local copy survives and is uploaded.
    KeepLocal,
    /// The remote copy survives; nothing is uploaded.
    AcceptRemote,
}

/// A conflict between local and remote copies of the same record.
///
/// Conflicts are recorded for observability. They never block a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Record the copies belong to.
    pub local_id: LocalId,
    /// Conflict timestamp of the local copy.
    pub local_timestamp: DateTime<Utc>,
    /// Conflict timestamp of the remote copy.
    pub remote_timestamp: DateTime<Utc>,
    /// Which copy survived.
    pub resolution: Resolution,
}

impl Conflict {
    /// Detects and resolves a conflict under `policy`.
    pub fn resolve(
        policy: ConflictPolicy,
        local_id: LocalId,
        local_timestamp: DateTime<Utc>,
        remote_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id,
            local_timestamp,
            remote_timestamp,
            resolution: policy.decide(local_timestamp, remote_timestamp),
        }
    }

    /// Returns true if the local copy won.
    pub fn local_won(&self) -> bool {
        self.resolution == Resolution::KeepLocal
    }
}

/// Policy for automatic conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The copy with the strictly greater timestamp wins; ties go to remote.
    #[default]
    LastWriteWins,
    /// The remote copy always wins.
    RemoteWins,
    /// The local copy always wins.
    LocalWins,
}

impl ConflictPolicy {
    /// Decides which copy survives.
    pub fn decide(&self, local: DateTime<Utc>, remote: DateTime<Utc>) -> Resolution {
        match self {
            ConflictPolicy::LastWriteWins if local > remote => Resolution::KeepLocal,
            ConflictPolicy::LastWriteWins => Resolution::AcceptRemote,
            ConflictPolicy::RemoteWins => Resolution::AcceptRemote,
            ConflictPolicy::LocalWins => Resolution::KeepLocal,
        }
    }

    /// Returns the policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::LastWriteWins => "last-write-wins",
            ConflictPolicy::RemoteWins => "remote-wins",
            ConflictPolicy::LocalWins => "local-wins",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-write-wins" | "lww" => Ok(ConflictPolicy::LastWriteWins),
            "remote-wins" => Ok(ConflictPolicy::RemoteWins),
            "local-wins" => Ok(ConflictPolicy::LocalWins),
            other => Err(format!("unknown conflict policy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn last_write_wins_is_strict() {
        let policy = ConflictPolicy::LastWriteWins;
        assert_eq!(policy.decide(ts(10), ts(7)), Resolution::KeepLocal);
        assert_eq!(policy.decide(ts(7), ts(10)), Resolution::AcceptRemote);
        assert_eq!(policy.decide(ts(7), ts(7)), Resolution::AcceptRemote);
    }

    #[test]
    fn fixed_policies() {
        assert_eq!(
            ConflictPolicy::RemoteWins.decide(ts(10), ts(1)),
            Resolution::AcceptRemote
        );
        assert_eq!(
            ConflictPolicy::LocalWins.decide(ts(1), ts(10)),
            Resolution::KeepLocal
        );
    }

    #[test]
    fn conflict_records_outcome() {
        let conflict = Conflict::resolve(
            ConflictPolicy::default(),
            LocalId::from("1"),
            ts(10),
            ts(7),
        );
        assert!(conflict.local_won());
        assert_eq!(conflict.local_id.as_str(), "1");
    }

    #[test]
    fn policy_names_parse_back() {
        for policy in [
            ConflictPolicy::LastWriteWins,
            ConflictPolicy::RemoteWins,
            ConflictPolicy::LocalWins,
        ] {
            assert_eq!(policy.to_string().parse::<ConflictPolicy>(), Ok(policy));
        }
        assert!("newest".parse::<ConflictPolicy>().is_err());
    }

    proptest! {
        #[test]
        fn last_write_wins_picks_greater(a in 0i64..1_000_000, b in 0i64..1_000_000) {
            let resolution = ConflictPolicy::LastWriteWins.decide(ts(a), ts(b));
            prop_assert_eq!(resolution == Resolution::KeepLocal, a > b);
        }
    }
}
