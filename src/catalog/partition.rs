use crate::error::MdError;
use serde::{Deserialize, Serialize};

/// Rows with this namespace and keytype are partition records; all other
/// combinations belong to caller metadata.
pub const PARTITION_NAMESPACE: &str = "Partition";
pub const PARTITION_KEYTYPE: &str = "name";

/// Partition identifiers are assigned by the caller, never by the store.
pub type PartitionId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    pub id: PartitionId,
    pub name: String,
}

impl Partition {
    pub fn new(id: PartitionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage form of the identifier.
    pub fn encoded_id(&self) -> String {
        self.id.to_string()
    }

    pub(crate) fn decode(name: &str, value: &str) -> Result<Self, MdError> {
        Ok(Self::new(decode_id(name, value)?, name))
    }
}

pub(crate) fn decode_id(name: &str, value: &str) -> Result<PartitionId, MdError> {
    value.parse::<PartitionId>().map_err(|e| {
        MdError::Decode(format!(
            "partition '{name}' has non-numeric identifier '{value}': {e}"
        ))
    })
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_stored_as_decimal_text() {
        let p = Partition::new(42, "evidence");
        assert_eq!(p.encoded_id(), "42");
        assert_eq!(Partition::decode("evidence", "42").expect("decode"), p);
    }

    #[test]
    fn decode_rejects_non_decimal_and_negative_values() {
        for bad in ["", "abc", "-1", "1.5", " 7", "4294967296"] {
            let err = Partition::decode("p", bad).expect_err(bad);
            assert_eq!(err.code_str(), "decode", "{bad}");
        }
    }

    #[test]
    fn serializes_as_plain_record() {
        let json = serde_json::to_string(&Partition::new(3, "truth")).expect("encode");
        assert_eq!(json, r#"{"id":3,"name":"truth"}"#);
    }
}
