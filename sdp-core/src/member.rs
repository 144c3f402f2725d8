//! Network members and the credential expiry rule.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a member in the perimeter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberType {
    /// A host that reaches services through gateways.
    Client,
    /// A host that guards services and admits clients.
    Gateway,
}

impl MemberType {
    /// Directory representation of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::Client => "client",
            MemberType::Gateway => "gateway",
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The directory held a member type this controller does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown member type: {0}")]
pub struct UnknownMemberType(pub String);

impl FromStr for MemberType {
    type Err = UnknownMemberType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(MemberType::Client),
            "gateway" => Ok(MemberType::Gateway),
            other => Err(UnknownMemberType(other.to_string())),
        }
    }
}

/// One provisioned member of the network.
///
/// `id` is the common name the member presents in its TLS client
/// certificate. Rows are created out-of-band and only the credential fields
/// are ever rewritten by the controller.
#[derive(Clone, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: String,
    pub member_type: MemberType,
    /// Base64 encryption key currently held by the member.
    pub encryption_key: Option<String>,
    /// Base64 HMAC key currently held by the member.
    pub hmac_key: Option<String>,
    pub last_cred_update: Option<DateTime<Utc>>,
    /// Always a midnight boundary once credentials have been issued.
    pub cred_update_due: Option<DateTime<Utc>>,
}

impl MemberRecord {
    /// Whether the member must be offered fresh credentials.
    ///
    /// A member that has never been issued credentials is always due.
    pub fn credentials_due(&self, now: DateTime<Utc>) -> bool {
        self.cred_update_due.map_or(true, |due| now > due)
    }

    pub fn is_client(&self) -> bool {
        self.member_type == MemberType::Client
    }
}

impl fmt::Debug for MemberRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberRecord")
            .field("id", &self.id)
            .field("member_type", &self.member_type)
            .field("has_encryption_key", &self.encryption_key.is_some())
            .field("has_hmac_key", &self.hmac_key.is_some())
            .field("last_cred_update", &self.last_cred_update)
            .field("cred_update_due", &self.cred_update_due)
            .finish()
    }
}

/// Compute when credentials issued at `now` must next be rotated.
///
/// The result is midnight UTC of the calendar day `days` after `now`.
pub fn credential_expiry(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let date = (now + Duration::days(i64::from(days))).date_naive();
    date.and_time(NaiveTime::MIN).and_utc()
}
