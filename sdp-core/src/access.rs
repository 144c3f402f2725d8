//! Access policy aggregation.
//!
//! The directory answers an access query with one row per reachable
//! (member, port) pair, sorted by member id. Gateways expect one entry per
//! member with all of its ports joined together.

use serde::{Deserialize, Serialize};

/// Source scope sent with every entry.
pub const ANY_SOURCE: &str = "ANY";

/// One joined row from the directory's access query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRow {
    pub member_id: String,
    pub port: String,
    pub encrypt_key: Option<String>,
    pub hmac_key: Option<String>,
}

/// Access granted to one member, as sent in `access_refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    #[serde(rename = "sdp_client_id")]
    pub member_id: String,
    pub source: String,
    /// Ports in row order, separated by `", "`.
    pub open_ports: String,
    pub key_base64: Option<String>,
    pub hmac_key_base64: Option<String>,
}

impl AccessEntry {
    fn from_row(row: &AccessRow) -> Self {
        Self {
            member_id: row.member_id.clone(),
            source: ANY_SOURCE.to_string(),
            open_ports: row.port.clone(),
            key_base64: row.encrypt_key.clone(),
            hmac_key_base64: row.hmac_key.clone(),
        }
    }
}

/// Group rows into entries in a single pass.
///
/// Only consecutive rows are merged: a member id that reappears after a
/// different one starts a second entry. Input must already be sorted by
/// member id for the result to hold one entry per member.
pub fn aggregate(rows: &[AccessRow]) -> Vec<AccessEntry> {
    let mut entries: Vec<AccessEntry> = Vec::new();

    for row in rows {
        match entries.last_mut() {
            Some(current) if current.member_id == row.member_id => {
                current.open_ports.push_str(", ");
                current.open_ports.push_str(&row.port);
            }
            _ => entries.push(AccessEntry::from_row(row)),
        }
    }

    entries
}
