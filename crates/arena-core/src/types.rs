//! Shared types between the arena server and its clients

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::CoreError;

/// Role carried in the verified identity of every authenticated request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Creator,
    Admin,
}

/// Things a caller may attempt; a role either permits them or not.
/// Ownership of the touched record is checked separately by the domain services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Request and confirm payment intents
    Pay,
    /// Turn a completed payment into a participation
    JoinContest,
    /// Edit the caller's own submission
    EditSubmission,
    /// Create contests and edit the caller's own contests
    AuthorContest,
    /// Declare the winner of the caller's own contest
    DeclareWinner,
    /// Read the submissions sent to the caller's own contest
    ReviewSubmissions,
    /// Approve or return contests to pending
    ModerateContest,
}

impl Role {
    pub fn permits(&self, capability: Capability) -> bool {
        match capability {
            Capability::Pay | Capability::EditSubmission => true,
            Capability::JoinContest => matches!(self, Role::User),
            Capability::AuthorContest
            | Capability::DeclareWinner
            | Capability::ReviewSubmissions => {
                matches!(self, Role::Creator)
            }
            Capability::ModerateContest => matches!(self, Role::Admin),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Creator => "creator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "creator" => Ok(Role::Creator),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Payment ledger state. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(CoreError::UnknownVariant {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// What a payment is for. A user pays one entry fee per contest and any number
/// of flat update fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    #[default]
    Entry,
    Update,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Entry => "entry",
            PaymentType::Update => "update",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(PaymentType::Entry),
            "update" => Ok(PaymentType::Update),
            other => Err(CoreError::UnknownVariant {
                kind: "payment type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestStatus {
    Pending,
    Confirmed,
}

impl ContestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContestStatus::Pending => "pending",
            ContestStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for ContestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ContestStatus::Pending),
            "confirmed" => Ok(ContestStatus::Confirmed),
            other => Err(CoreError::UnknownVariant {
                kind: "contest status",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_capabilities() {
        assert!(Role::User.permits(Capability::JoinContest));
        assert!(!Role::Creator.permits(Capability::JoinContest));
        assert!(!Role::Admin.permits(Capability::JoinContest));

        assert!(Role::Creator.permits(Capability::DeclareWinner));
        assert!(!Role::User.permits(Capability::DeclareWinner));
        assert!(Role::Creator.permits(Capability::ReviewSubmissions));
        assert!(!Role::User.permits(Capability::ReviewSubmissions));
        assert!(!Role::Admin.permits(Capability::ReviewSubmissions));

        assert!(Role::Admin.permits(Capability::ModerateContest));
        assert!(!Role::Creator.permits(Capability::ModerateContest));

        for role in [Role::User, Role::Creator, Role::Admin] {
            assert!(role.permits(Capability::Pay));
            assert!(role.permits(Capability::EditSubmission));
        }
    }

    #[test]
    fn test_status_strings_match_serde() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
        assert_eq!(
            "update".parse::<PaymentType>().unwrap(),
            PaymentType::Update
        );
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }
}
