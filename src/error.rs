use std::time::Duration;

use crate::models::CardId;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("card {card_id} not found")]
    NotFound { card_id: CardId },

    #[error("{op}: query failed: {source}")]
    Query {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("card delete: {card_id}: query failed: {source}")]
    DeleteFailed {
        card_id: CardId,
        #[source]
        source: sqlx::Error,
    },

    #[error("{op}: timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("{op}: card {card_id} kept changing underneath the write")]
    Conflict { op: &'static str, card_id: CardId },

    #[error("index {name} not created: {source}")]
    IndexProvisionFailed {
        name: String,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    pub fn query(op: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
        move |source| StoreError::Query { op, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_operation_context() {
        let e = StoreError::NotFound { card_id: "c9".into() };
        assert_eq!(e.to_string(), "card c9 not found");
        assert!(e.is_not_found());

        let e = StoreError::query("cards save")(sqlx::Error::RowNotFound);
        assert!(e.to_string().starts_with("cards save: query failed"));
        assert!(!e.is_not_found());

        let e = StoreError::DeleteFailed {
            card_id: "c42".into(),
            source: sqlx::Error::PoolTimedOut,
        };
        assert!(e.to_string().starts_with("card delete: c42: query failed"));
        assert!(!e.is_not_found());

        let e = StoreError::Timeout { op: "cards count", after: Duration::from_secs(5) };
        assert_eq!(e.to_string(), "cards count: timed out after 5s");
    }
}
