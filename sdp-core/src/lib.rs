//! # SDP Core
//!
//! Pure domain types and business logic for the SDP controller.
//!
//! ## Design Principles
//!
//! This crate is intentionally **IO-free**:
//! - No filesystem operations
//! - No network calls
//! - No database interactions
//! - No logging
//!
//! The TLS listener, the member directory and the credential generator live
//! in `sdp-controller`. Everything here is plain data plus the rules that
//! operate on it, so the session engine can be tested without any of them.
//!
//! ## Modules
//!
//! - [`member`] - Member records and the credential expiry rule
//! - [`credential`] - Key material and pending rotation records
//! - [`message`] - Wire messages exchanged with members
//! - [`access`] - Aggregation of access-policy rows into wire entries

pub mod access;
pub mod credential;
pub mod member;
pub mod message;

pub use access::{aggregate, AccessEntry, AccessRow, ANY_SOURCE};
pub use credential::{CredentialRotation, Credentials};
pub use member::{credential_expiry, MemberRecord, MemberType, UnknownMemberType};
pub use message::{DecodeError, Inbound, InboundAction, Outbound};
