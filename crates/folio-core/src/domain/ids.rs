//! Domain identifiers (strongly-typed IDs).
//!
//! ULID-backed so identifiers sort by creation time and can be generated on
//! any node without coordination. A phantom-type `Id<T>` provides one
//! implementation for all entity IDs while keeping them distinct types:
//! an `IssueId` can never be passed where a `TradeId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for each ID type.
///
/// Provides the prefix used by `Display` ("issue-", "trade-", ...).
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ID type.
///
/// `T` is `PhantomData`: zero bytes at runtime, full type safety at compile
/// time.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Generate a fresh ID.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Parse from the bare ULID string (no prefix).
    ///
    /// Used when members come back out of the shared store, which only holds
    /// strings.
    pub fn parse(s: &str) -> Option<Self> {
        Ulid::from_string(s).ok().map(Self::from_ulid)
    }

    /// The bare ULID string (no prefix) — the form stored as a queue member.
    pub fn key(&self) -> String {
        self.ulid.to_string()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IssueMarker {}

impl IdMarker for IssueMarker {
    fn prefix() -> &'static str {
        "issue-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserMarker {}

impl IdMarker for UserMarker {
    fn prefix() -> &'static str {
        "user-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TradeMarker {}

impl IdMarker for TradeMarker {
    fn prefix() -> &'static str {
        "trade-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TxnMarker {}

impl IdMarker for TxnMarker {
    fn prefix() -> &'static str {
        "txn-"
    }
}

/// Identifier of an Issue (one limited-run sale event).
pub type IssueId = Id<IssueMarker>;

/// Identifier of a User (buyer, seller or author).
pub type UserId = Id<UserMarker>;

/// Identifier of a Trade (a standing sell listing).
pub type TradeId = Id<TradeMarker>;

/// Identifier of a Transaction (one buy attempt).
pub type TxnId = Id<TxnMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid = Ulid::new();
        let issue = IssueId::from_ulid(ulid);
        let trade = TradeId::from_ulid(ulid);

        assert_eq!(issue.as_ulid(), trade.as_ulid());
        assert!(issue.to_string().starts_with("issue-"));
        assert!(trade.to_string().starts_with("trade-"));

        // The whole point: you can't accidentally mix these types.
        // let _: IssueId = trade; // <- does not compile
    }

    #[test]
    fn key_round_trips_through_the_store() {
        let id = IssueId::generate();
        let parsed = IssueId::parse(&id.key()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(IssueId::parse("not-a-ulid").is_none());
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TxnId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TxnId::generate();

        assert!(id1 < id2);
    }

    #[test]
    fn ids_serialize_as_ulids() {
        let id = UserId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
