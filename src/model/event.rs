//! Live stream commit events

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commit operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown commit operation: {}", other)),
        }
    }
}

/// One decoded commit from the live stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub repository_id: String,
    pub collection: String,
    /// `$type` of the record; absent for deletes
    pub shape_id: Option<String>,
    pub operation: Operation,
    /// Absent when `operation` is `Delete`
    pub record_value: Option<Value>,
    pub uri: String,
    pub received_at_micros: i64,
}

impl StreamEvent {
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_round_trip_strings() {
        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            let parsed: Operation = op.to_string().parse().unwrap();
            assert_eq!(parsed, op);
        }
        assert!("upsert".parse::<Operation>().is_err());
    }
}
