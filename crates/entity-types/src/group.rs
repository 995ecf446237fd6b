//! Group domain types.
//!
//! A group is a named set of accounts and subgroups, identified by a
//! stable UUID that never changes when the group is renamed.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Characters that separate the searchable parts of a group name.
const NAME_PART_SEPARATORS: &[char] = &['@', '.', '-', ' ', '/', '_'];

/// Stable, globally unique identifier of a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupUuid(String);

impl GroupUuid {
    /// Wrap an existing UUID string.
    ///
    /// Rejects empty values and values containing whitespace, since the
    /// UUID is used verbatim as an index term.
    pub fn new(uuid: impl Into<String>) -> Result<Self, TypesError> {
        let uuid = uuid.into();
        if uuid.is_empty() {
            return Err(TypesError::InvalidInput("group uuid is empty".to_string()));
        }
        if uuid.chars().any(char::is_whitespace) {
            return Err(TypesError::InvalidInput(format!(
                "group uuid contains whitespace: {:?}",
                uuid
            )));
        }
        Ok(Self(uuid))
    }

    /// Generate a fresh UUID.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GroupUuid {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GroupUuid {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupUuid> for String {
    fn from(uuid: GroupUuid) -> Self {
        uuid.0
    }
}

/// Numeric account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i32>()
            .map(AccountId)
            .map_err(|e| TypesError::InvalidInput(format!("invalid account id {:?}: {}", s, e)))
    }
}

/// Fully loaded group, as served by the group cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalGroup {
    /// Legacy numeric id
    pub id: i32,
    pub uuid: GroupUuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Group whose members administer this group
    pub owner_group_uuid: GroupUuid,
    #[serde(default)]
    pub visible_to_all: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub members: Vec<AccountId>,
    #[serde(default)]
    pub subgroups: Vec<GroupUuid>,
}

impl InternalGroup {
    /// Create a group that owns itself, with no members.
    pub fn new(id: i32, uuid: GroupUuid, name: impl Into<String>) -> Self {
        Self {
            id,
            owner_group_uuid: uuid.clone(),
            uuid,
            name: name.into(),
            description: None,
            visible_to_all: false,
            created_on: Utc::now(),
            members: Vec::new(),
            subgroups: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_owner(mut self, owner: GroupUuid) -> Self {
        self.owner_group_uuid = owner;
        self
    }

    pub fn with_visible_to_all(mut self, visible: bool) -> Self {
        self.visible_to_all = visible;
        self
    }

    pub fn with_created_on(mut self, created_on: DateTime<Utc>) -> Self {
        self.created_on = created_on;
        self
    }

    pub fn with_members(mut self, members: Vec<AccountId>) -> Self {
        self.members = members;
        self
    }

    pub fn with_subgroups(mut self, subgroups: Vec<GroupUuid>) -> Self {
        self.subgroups = subgroups;
        self
    }

    /// Lower-cased parts of the group name, split on `@ . - / _` and spaces.
    ///
    /// Parts are deduplicated and returned in sorted order.
    pub fn name_parts(&self) -> Vec<String> {
        self.name
            .to_lowercase()
            .split(NAME_PART_SEPARATORS)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
