//! Continuation tokens.
//!
//! A token is URL-safe base64 (no padding) over a small JSON document naming the folded
//! query, the match mode and the next offset of every partition that may still have hits.

use super::types::{MatchMode, SearchError};
use crate::catalog::partitioner::partition_index;
use crate::catalog::types::PartitionKey;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCursor {
    pub partition: PartitionKey,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub query: String,
    pub mode: MatchMode,
    pub cursors: Vec<PartitionCursor>,
}

impl ContinuationToken {
    pub fn encode(&self) -> Result<String, SearchError> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(raw: &str) -> Result<Self, SearchError> {
        let malformed = || SearchError::InvalidQuery("malformed continuation token".to_string());

        let json = URL_SAFE_NO_PAD.decode(raw.trim()).map_err(|_| malformed())?;
        let token: ContinuationToken = serde_json::from_slice(&json).map_err(|_| malformed())?;

        if token.cursors.is_empty()
            || token
                .cursors
                .iter()
                .any(|cursor| partition_index(cursor.partition.as_str()).is_none())
        {
            return Err(malformed());
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> ContinuationToken {
        ContinuationToken {
            query: "dragon".to_string(),
            mode: MatchMode::Anywhere,
            cursors: vec![PartitionCursor {
                partition: PartitionKey("d".to_string()),
                offset: 7,
            }],
        }
    }

    #[test]
    fn test_token_is_url_safe() {
        let encoded = token().encode().unwrap();
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(ContinuationToken::decode(&encoded).unwrap(), token());
    }

    #[test]
    fn test_decode_rejects_garbage_and_unknown_partitions() {
        assert!(ContinuationToken::decode("not a token!").is_err());
        assert!(ContinuationToken::decode(&URL_SAFE_NO_PAD.encode(b"[1,2]")).is_err());

        let mut bad = token();
        bad.cursors[0].partition = PartitionKey("dd".to_string());
        let encoded = bad.encode().unwrap();
        assert!(matches!(
            ContinuationToken::decode(&encoded),
            Err(SearchError::InvalidQuery(_))
        ));
    }
}
