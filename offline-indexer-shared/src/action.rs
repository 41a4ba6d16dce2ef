//! Index actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The mutation a submission asks the index to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexAction {
    /// Add a new object to the index.
    Create,
    /// Replace an object that is already indexed.
    Update,
    /// Remove an object from the index.
    Delete,
    /// Add the object, replacing it if it is already indexed.
    CreateOrUpdate,
}

impl IndexAction {
    /// All actions, in declaration order.
    pub const ALL: [IndexAction; 4] = [
        IndexAction::Create,
        IndexAction::Update,
        IndexAction::Delete,
        IndexAction::CreateOrUpdate,
    ];

    /// The wire tag of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexAction::Create => "CREATE",
            IndexAction::Update => "UPDATE",
            IndexAction::Delete => "DELETE",
            IndexAction::CreateOrUpdate => "CREATE_OR_UPDATE",
        }
    }
}

impl fmt::Display for IndexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown index action: {}", s))
    }
}
