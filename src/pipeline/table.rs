//! In-memory current Token table
//!
//! Each record is published as a whole `Arc<Token>`. Readers clone the Arc
//! and never observe a half-written merge; the aggregator replaces the Arc
//! after persisting the new state.

use super::types::{Token, TokenStatus};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct TokenTable {
    tokens: DashMap<String, Arc<Token>>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warm the table from stored rows
    pub fn from_tokens(tokens: impl IntoIterator<Item = Token>) -> Self {
        let table = Self::new();
        for token in tokens {
            table.publish(token);
        }
        table
    }

    pub fn get(&self, address: &str) -> Option<Arc<Token>> {
        self.tokens.get(address).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.tokens.contains_key(address)
    }

    /// Replace the record for `token.address`
    pub fn publish(&self, token: Token) -> Arc<Token> {
        let record = Arc::new(token);
        self.tokens.insert(record.address.clone(), Arc::clone(&record));
        record
    }

    /// Point-in-time copy of every record
    pub fn all(&self) -> Vec<Arc<Token>> {
        self.tokens.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Addresses still worth polling (everything not archived)
    pub fn pollable_addresses(&self) -> Vec<String> {
        self.tokens
            .iter()
            .filter(|entry| entry.value().status != TokenStatus::Archived)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_publish_replaces_whole_record() {
        let table = TokenTable::new();
        let mut token = Token::new("mint-a", Utc::now());
        table.publish(token.clone());

        let before = table.get("mint-a").unwrap();
        token.invest_score = 55.0;
        token.symbol = Some("ABC".to_string());
        table.publish(token);

        // Earlier readers keep their consistent copy
        assert_eq!(before.invest_score, 0.0);
        assert_eq!(before.symbol, None);

        let after = table.get("mint-a").unwrap();
        assert_eq!(after.invest_score, 55.0);
        assert_eq!(after.symbol.as_deref(), Some("ABC"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_archived_not_pollable() {
        let mut archived = Token::new("mint-old", Utc::now());
        archived.status = TokenStatus::Archived;
        let table = TokenTable::from_tokens([archived, Token::new("mint-new", Utc::now())]);

        assert_eq!(table.pollable_addresses(), vec!["mint-new".to_string()]);
        assert!(table.contains("mint-old"));
    }
}
