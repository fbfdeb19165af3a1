use serde::{Serialize, Deserialize};

/// Cardinality of a relationship, read from the owning table's side.
///
/// On table A, `OneToMany` toward B means one A row relates to many B rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    OneToOne,
    OneToMany,
    ManyToOne,
}

impl JoinType {
    pub fn inverse(self) -> JoinType {
        match self {
            JoinType::OneToOne => JoinType::OneToOne,
            JoinType::OneToMany => JoinType::ManyToOne,
            JoinType::ManyToOne => JoinType::OneToMany,
        }
    }

    /// Whether rows of the owning table map to a group of peer rows.
    pub fn is_grouped(self) -> bool {
        matches!(self, JoinType::ManyToOne)
    }
}

/// Relationship from one table to a peer table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConnection {
    pub join_key: String,
    pub join_type: JoinType,
}

impl TableConnection {
    pub fn new(join_key: impl Into<String>, join_type: JoinType) -> Self {
        TableConnection {
            join_key: join_key.into(),
            join_type,
        }
    }

    /// The same relationship seen from the peer.
    pub fn inverse(&self) -> TableConnection {
        TableConnection {
            join_key: self.join_key.clone(),
            join_type: self.join_type.inverse(),
        }
    }
}
