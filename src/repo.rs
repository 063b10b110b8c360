use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::models::*;

const OP_SAVE: &str = "cards save";

/// Persistence contract consumed by the request layer.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn save(&self, card: Card) -> StoreResult<()> {
        self.save_many(vec![card]).await
    }

    /// Applies every mutation as one batched write. A failure anywhere fails the call.
    async fn save_many(&self, cards: Vec<Card>) -> StoreResult<()>;

    async fn delete(&self, card_id: &str) -> StoreResult<()>;

    /// Cards matching `filter`, ordered by position then creation time,
    /// starting at `index * size`. A `size` of zero reads without a limit.
    async fn find(&self, filter: &Filter, index: u64, size: u32) -> StoreResult<Vec<Card>>;

    async fn count(&self, filter: &Filter) -> StoreResult<u64>;
}

/// Runs a store call under the hard per-operation timeout.
#[cfg_attr(not(feature = "postgres-store"), allow(dead_code))]
pub(crate) async fn bounded<T, F>(op: &'static str, after: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| StoreError::Timeout { op, after })?
}


#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::cmp::Ordering;
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
    use std::sync::Arc;

    use dashmap::mapref::entry::Entry;
    use dashmap::DashMap;
    use tracing::{debug, info, warn};

    use crate::filter;
    use crate::mutation::{self, WriteOp};
    use crate::paging::Page;

    /// Read-modify-write attempts per record before giving up on a busy card.
    pub const MAX_CAS_ATTEMPTS: u32 = 64;

    #[derive(Clone)]
    struct Doc {
        version: u64,
        card: Card,
    }

    /// Document map keyed by card id. A record's ops are folded over one
    /// snapshot off-lock and land only if the document version is unchanged.
    ///
    /// Versions come from a store-wide counter, so a card re-created after a
    /// delete never reuses a version an older snapshot could match.
    ///
    /// Every call completes without yielding, so no hard timeout applies here.
    #[derive(Clone)]
    pub struct InMemCardStore {
        docs: Arc<DashMap<CardId, Doc>>,
        clock: Arc<AtomicU64>,
        max_attempts: u32,
    }

    impl InMemCardStore {
        pub fn new() -> Self {
            Self {
                docs: Arc::new(DashMap::new()),
                clock: Arc::new(AtomicU64::new(0)),
                max_attempts: MAX_CAS_ATTEMPTS,
            }
        }

        pub fn with_max_attempts(mut self, attempts: u32) -> Self {
            self.max_attempts = attempts;
            self
        }

        pub fn len(&self) -> usize {
            self.docs.len()
        }

        pub fn is_empty(&self) -> bool {
            self.docs.is_empty()
        }

        fn next_version(&self) -> u64 {
            self.clock.fetch_add(1, AtomicOrdering::Relaxed) + 1
        }

        /// Commits all ops of one record against a single snapshot.
        fn commit(&self, card_id: &str, ops: &[WriteOp]) -> StoreResult<()> {
            for attempt in 1..=self.max_attempts {
                // snapshot guard must be released before taking the entry lock
                let snapshot = self.docs.get(card_id).map(|d| d.value().clone());
                let seen = snapshot.as_ref().map(|d| d.version);
                let next = ops.iter().fold(snapshot.map(|d| d.card), |doc, op| op.apply(doc));

                match self.docs.entry(card_id.to_string()) {
                    Entry::Occupied(mut e) if Some(e.get().version) == seen => {
                        if let Some(card) = next {
                            e.insert(Doc { version: self.next_version(), card });
                        }
                        return Ok(());
                    }
                    Entry::Vacant(e) if seen.is_none() => {
                        if let Some(card) = next {
                            e.insert(Doc { version: self.next_version(), card });
                        }
                        return Ok(());
                    }
                    _ => warn!(card_id, attempt, "card changed during write, retrying"),
                }
            }
            Err(StoreError::Conflict { op: OP_SAVE, card_id: card_id.to_string() })
        }
    }

    impl Default for InMemCardStore {
        fn default() -> Self {
            Self::new()
        }
    }

    fn listing_order(a: &Card, b: &Card) -> Ordering {
        a.position
            .cmp(&b.position)
            .then(a.created_at.cmp(&b.created_at))
            .then_with(|| a.card_id.cmp(&b.card_id))
    }

    #[async_trait]
    impl CardStore for InMemCardStore {
        async fn save_many(&self, cards: Vec<Card>) -> StoreResult<()> {
            debug!(records = cards.len(), "cards save");
            for card in &cards {
                self.commit(&card.card_id, &mutation::plan_one(card))?;
            }
            info!(records = cards.len(), "cards saved");
            Ok(())
        }

        async fn delete(&self, card_id: &str) -> StoreResult<()> {
            debug!(card_id, "card delete");
            if self.docs.remove(card_id).is_none() {
                return Err(StoreError::NotFound { card_id: card_id.to_string() });
            }
            info!(card_id, "card deleted");
            Ok(())
        }

        async fn find(&self, filter: &Filter, index: u64, size: u32) -> StoreResult<Vec<Card>> {
            let predicate = filter::build(filter);
            let page = Page::new(index, size);
            let mut hits: Vec<Card> = self
                .docs
                .iter()
                .filter(|d| predicate.matches(&d.card))
                .map(|d| d.card.clone())
                .collect();
            hits.sort_by(listing_order);
            let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let take = page
                .limit()
                .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
            Ok(hits.into_iter().skip(skip).take(take).collect())
        }

        async fn count(&self, filter: &Filter) -> StoreResult<u64> {
            let predicate = filter::build(filter);
            Ok(self.docs.iter().filter(|d| predicate.matches(&d.card)).count() as u64)
        }
    }

}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::types::Json;
    use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
    use tracing::{debug, error, info};

    use crate::config::StoreConfig;
    use crate::filter::{self, Predicate};
    use crate::mutation::{self, WriteOp};
    use crate::paging::{Page, SORT_COLUMNS};

    const OP_DELETE: &str = "card delete";
    const OP_FIND: &str = "cards find";
    const OP_COUNT: &str = "cards count";
    const OP_PROVISION: &str = "cards provision";
    const COLUMNS: &str = r#"card_id, owner_id, board_id, category_id, name, "type", content,
        "position", created_at, tags, attachments"#;

    #[derive(sqlx::FromRow)]
    struct CardRow {
        card_id: String,
        owner_id: String,
        board_id: String,
        category_id: String,
        name: String,
        #[sqlx(rename = "type")]
        card_type: String,
        content: String,
        position: i32,
        created_at: DateTime<Utc>,
        tags: Vec<String>,
        attachments: Json<Vec<Attachment>>,
    }

    impl From<CardRow> for Card {
        fn from(r: CardRow) -> Self {
            Card {
                card_id: r.card_id,
                owner_id: r.owner_id,
                board_id: r.board_id,
                category_id: r.category_id,
                name: r.name,
                card_type: CardType::parse(&r.card_type).unwrap_or_default(),
                content: r.content,
                position: r.position,
                created_at: r.created_at,
                tags: r.tags,
                attachments: r.attachments.0,
            }
        }
    }

    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
        for (i, c) in predicate.constraints().iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            qb.push(quote_ident(c.field.column()));
            if c.field.is_multi_valued() {
                // array overlap: any element listed
                qb.push(" && ").push_bind(c.values.clone());
            } else {
                qb.push(" = ANY(").push_bind(c.values.clone()).push(")");
            }
        }
    }

    /// Cards table with a JSONB attachment array; one row per card document.
    #[derive(Clone)]
    pub struct PgCardStore {
        pool: PgPool,
        table: String,
        op_timeout: Duration,
    }

    impl PgCardStore {
        pub fn new(pool: PgPool, cfg: &StoreConfig) -> Self {
            Self { pool, table: quote_ident(&cfg.table), op_timeout: cfg.op_timeout }
        }

        pub fn index_name(&self) -> String {
            format!("{}_index_01", self.table.trim_matches('"'))
        }

        /// Creates the table and the compound listing index. Callers must not
        /// serve traffic if this fails.
        pub async fn provision(&self) -> StoreResult<()> {
            let t = &self.table;
            let create_table = format!(
                r#"CREATE TABLE IF NOT EXISTS {t} (
                    card_id     TEXT PRIMARY KEY,
                    owner_id    TEXT NOT NULL DEFAULT '',
                    board_id    TEXT NOT NULL DEFAULT '',
                    category_id TEXT NOT NULL DEFAULT '',
                    name        TEXT NOT NULL DEFAULT '',
                    "type"      TEXT NOT NULL DEFAULT '',
                    content     TEXT NOT NULL DEFAULT '',
                    "position"  INTEGER NOT NULL DEFAULT 0,
                    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                    tags        TEXT[] NOT NULL DEFAULT '{{}}',
                    attachments JSONB NOT NULL DEFAULT '[]'::jsonb
                )"#
            );
            bounded(OP_PROVISION, self.op_timeout, async {
                sqlx::query(&create_table)
                    .execute(&self.pool)
                    .await
                    .map_err(StoreError::query(OP_PROVISION))?;
                Ok(())
            })
            .await?;

            let name = self.index_name();
            let create_index = format!(
                r#"CREATE INDEX IF NOT EXISTS {} ON {t}
                   (owner_id, board_id, category_id, "type", "position", created_at, tags)"#,
                quote_ident(&name)
            );
            let created = bounded(OP_PROVISION, self.op_timeout, async {
                sqlx::query(&create_index)
                    .execute(&self.pool)
                    .await
                    .map_err(|source| StoreError::IndexProvisionFailed {
                        name: name.clone(),
                        source,
                    })?;
                Ok(())
            })
            .await;
            match created {
                Ok(()) => {
                    info!(table = %t, index = %name, "index created");
                    Ok(())
                }
                Err(e) => {
                    error!(table = %t, index = %name, error = %e, "index not created");
                    Err(e)
                }
            }
        }

        async fn execute(
            &self,
            tx: &mut Transaction<'_, Postgres>,
            op: &WriteOp,
        ) -> StoreResult<()> {
            let t = &self.table;
            match op {
                WriteOp::PullAttachments { card_id, attachment_ids } => {
                    debug!(card_id = %card_id, attachments = ?attachment_ids, "delete attachments");
                    let sql = format!(
                        r#"UPDATE {t} SET attachments = COALESCE(
                               (SELECT jsonb_agg(e.value ORDER BY e.ord)
                                  FROM jsonb_array_elements(attachments) WITH ORDINALITY AS e(value, ord)
                                 WHERE NOT (e.value->>'attachment_id' = ANY($2))),
                               '[]'::jsonb)
                           WHERE card_id = $1"#
                    );
                    sqlx::query(&sql)
                        .bind(card_id)
                        .bind(attachment_ids)
                        .execute(&mut **tx)
                        .await
                        .map_err(StoreError::query(OP_SAVE))?;
                }
                WriteOp::Upsert { card_id, set, set_on_insert, add_to_set } => {
                    // existing ids keep their slot and take incoming metadata; new ids append
                    let sql = format!(
                        r#"INSERT INTO {t} AS cur ({COLUMNS})
                           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                           ON CONFLICT (card_id) DO UPDATE SET
                               board_id    = EXCLUDED.board_id,
                               category_id = EXCLUDED.category_id,
                               name        = EXCLUDED.name,
                               content     = EXCLUDED.content,
                               "position"  = EXCLUDED."position",
                               tags        = EXCLUDED.tags,
                               attachments = (
                                   SELECT COALESCE(jsonb_agg(m.value ORDER BY m.src, m.ord), '[]'::jsonb)
                                   FROM (
                                       SELECT 0 AS src, s.ord,
                                              COALESCE(
                                                  (SELECT i.value
                                                     FROM jsonb_array_elements(EXCLUDED.attachments) AS i(value)
                                                    WHERE i.value->>'attachment_id' = s.value->>'attachment_id'
                                                    LIMIT 1),
                                                  s.value) AS value
                                         FROM jsonb_array_elements(cur.attachments) WITH ORDINALITY AS s(value, ord)
                                       UNION ALL
                                       SELECT 1 AS src, i.ord, i.value
                                         FROM jsonb_array_elements(EXCLUDED.attachments) WITH ORDINALITY AS i(value, ord)
                                        WHERE NOT EXISTS (
                                            SELECT 1 FROM jsonb_array_elements(cur.attachments) AS s(value)
                                             WHERE s.value->>'attachment_id' = i.value->>'attachment_id')
                                   ) m
                               )"#
                    );
                    sqlx::query(&sql)
                        .bind(card_id)
                        .bind(&set_on_insert.owner_id)
                        .bind(&set.board_id)
                        .bind(&set.category_id)
                        .bind(&set.name)
                        .bind(set_on_insert.card_type.as_str())
                        .bind(&set.content)
                        .bind(set.position)
                        .bind(set_on_insert.created_at)
                        .bind(&set.tags)
                        .bind(Json(add_to_set))
                        .execute(&mut **tx)
                        .await
                        .map_err(StoreError::query(OP_SAVE))?;
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CardStore for PgCardStore {
        async fn save_many(&self, cards: Vec<Card>) -> StoreResult<()> {
            let plan = mutation::plan(&cards);
            if plan.is_empty() {
                return Ok(());
            }
            debug!(records = plan.records, ops = plan.ops.len(), "cards save");
            bounded(OP_SAVE, self.op_timeout, async {
                let mut tx = self.pool.begin().await.map_err(StoreError::query(OP_SAVE))?;
                for op in &plan.ops {
                    self.execute(&mut tx, op).await?;
                }
                tx.commit().await.map_err(StoreError::query(OP_SAVE))?;
                Ok(())
            })
            .await?;
            info!(records = plan.records, "cards saved");
            Ok(())
        }

        async fn delete(&self, card_id: &str) -> StoreResult<()> {
            debug!(card_id, "card delete");
            let sql = format!("DELETE FROM {} WHERE card_id = $1", self.table);
            let result = bounded(OP_DELETE, self.op_timeout, async {
                sqlx::query(&sql)
                    .bind(card_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|source| StoreError::DeleteFailed {
                        card_id: card_id.to_string(),
                        source,
                    })
            })
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound { card_id: card_id.to_string() });
            }
            info!(card_id, "card deleted");
            Ok(())
        }

        async fn find(&self, filter: &Filter, index: u64, size: u32) -> StoreResult<Vec<Card>> {
            let predicate = filter::build(filter);
            let page = Page::new(index, size);
            let mut qb =
                QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM {}", self.table));
            push_predicate(&mut qb, &predicate);
            let order: Vec<String> =
                SORT_COLUMNS.iter().map(|c| format!("{} ASC", quote_ident(c))).collect();
            qb.push(" ORDER BY ").push(order.join(", "));
            if let Some(limit) = page.limit() {
                qb.push(" LIMIT ").push_bind(limit as i64);
            }
            qb.push(" OFFSET ").push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

            bounded(OP_FIND, self.op_timeout, async {
                let rows = qb
                    .build_query_as::<CardRow>()
                    .fetch_all(&self.pool)
                    .await
                    .map_err(StoreError::query(OP_FIND))?;
                Ok(rows.into_iter().map(Card::from).collect())
            })
            .await
        }

        async fn count(&self, filter: &Filter) -> StoreResult<u64> {
            let predicate = filter::build(filter);
            let mut qb =
                QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {}", self.table));
            push_predicate(&mut qb, &predicate);
            bounded(OP_COUNT, self.op_timeout, async {
                let total: i64 = qb
                    .build_query_scalar()
                    .fetch_one(&self.pool)
                    .await
                    .map_err(StoreError::query(OP_COUNT))?;
                Ok(total.max(0) as u64)
            })
            .await
        }
    }
}
