//! Domain library for the member registry.
//!
//! This crate is dependency-light (serde_json for the raw-field codec) and
//! holds the domain types, ports (traits), and error definitions. Keep
//! adapters and IO concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// An individual registered member.
///
/// Immutable once embedded in a group's member list; the only lifecycle
/// operation is registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    /// Unique identifier within the Members collection.
    pub name: String,
    pub region: String,
    pub email: String,
    /// String-typed numeral, stored verbatim. No numeric validation.
    pub age: String,
    /// Name of the group this member belongs to (foreign key by name).
    pub group: String,
}

/// A group of members.
///
/// `region` is set once, from the first member that creates the group.
/// `users` is append-only and keeps insertion order; the same member name
/// can appear more than once if registered repeatedly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    /// Unique identifier within the Groups collection.
    pub name: String,
    pub region: String,
    pub users: Vec<Member>,
}

/// Storage port for the Members collection.
///
/// `put` is an unconditional upsert: a duplicate name silently replaces the
/// prior record (last-write-wins, preserved source behavior).
pub trait MemberStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<Member>, CoreError>;
    fn put(&self, member: &Member) -> Result<(), CoreError>;
    /// Return every member, unordered, in one logical pass. The adapter is
    /// responsible for exhausting any underlying pagination.
    fn scan_all(&self) -> Result<Vec<Member>, CoreError>;
}

/// Storage port for the Groups collection.
pub trait GroupStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<Group>, CoreError>;
    fn put(&self, group: &Group) -> Result<(), CoreError>;
    /// Store-side atomic append onto the group's `users` list.
    /// Fails with `NotFound` when the group does not exist.
    fn append_members(&self, group_name: &str, members: &[Member]) -> Result<(), CoreError>;
    fn scan_all(&self) -> Result<Vec<Group>, CoreError>;
}

/// Core domain errors (no external error crates to keep deps light).
#[derive(Debug)]
pub enum CoreError {
    /// A required registration field is absent, not a string, or (for
    /// `name`) empty. Client error; nothing was written.
    MissingField(&'static str),
    /// Requested entity absent on a point lookup or append target.
    NotFound,
    /// A stored item failed to decode into the expected shape. Indicates
    /// data corruption or schema drift, not user error.
    Malformed(String),
    /// Transient failure talking to the storage engine, timeouts included.
    Backend(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::MissingField(name) => write!(f, "missing field: {}", name),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::Malformed(msg) => write!(f, "malformed stored item: {}", msg),
            CoreError::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl Error for CoreError {}

pub mod adapters;
pub mod codec;
pub mod service;
