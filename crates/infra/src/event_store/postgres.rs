//! Postgres-backed event store implementation.
//!
//! Events and snapshots are stored with their full camelCase JSON document in a
//! `doc` column, so [`Filter`] paths resolve the same way they do in memory
//! (`doc #> '{body,datetime}'`). Key columns are kept alongside for indexing.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | EventStoreError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `DuplicateEvent` (on append) |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use std::sync::Arc;
use tracing::{Span, instrument};

use eventide_core::EntityId;
use eventide_events::RecordedEvent;

use super::query::{Condition, Filter, Op, SortOrder};
use super::r#trait::{EventStore, EventStoreError, SnapshotDocument, SnapshotRef};
use crate::config::PostgresConfig;

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS eventide_events (
        seq BIGSERIAL,
        event_id UUID PRIMARY KEY,
        event_name TEXT NOT NULL,
        event_created_at TIMESTAMPTZ NOT NULL,
        entity_name TEXT NOT NULL,
        entity_id UUID NOT NULL,
        revision INTEGER,
        doc JSONB NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS eventide_events_stream_idx
        ON eventide_events (entity_name, entity_id, event_created_at, seq)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eventide_snapshots (
        entity_name TEXT NOT NULL,
        entity_id UUID NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        doc JSONB NOT NULL,
        PRIMARY KEY (entity_name, entity_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS eventide_snapshots_doc_idx
        ON eventide_snapshots USING GIN (doc)
    "#,
];

/// Postgres-backed append-only event store with a snapshot table.
///
/// ## Thread Safety
///
/// Uses SQLx connection pool which is thread-safe (Arc + Send + Sync).
///
/// The event insert and the snapshot upsert are separate statements; the
/// engine issues them in that order and a failure between them leaves the
/// snapshot stale, never the log.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    #[instrument(
        skip(self, event),
        fields(
            event_id = %event.event_id,
            entity_id = %event.entity_id,
            event_name = %event.event_name
        ),
        err
    )]
    async fn insert_event(&self, event: &RecordedEvent) -> Result<(), EventStoreError> {
        let doc = serde_json::to_value(event)
            .map_err(|e| EventStoreError::Serialization(format!("event {}: {e}", event.event_id)))?;
        let revision = revision_column(event)?;

        sqlx::query(
            r#"
            INSERT INTO eventide_events (
                event_id,
                event_name,
                event_created_at,
                entity_name,
                entity_id,
                revision,
                doc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*event.event_id.as_uuid())
        .bind(&event.event_name)
        .bind(event.event_created_at)
        .bind(&event.entity_name)
        .bind(*event.entity_id.as_uuid())
        .bind(revision)
        .bind(doc)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                EventStoreError::DuplicateEvent(event.event_id)
            } else {
                map_sqlx_error("insert_event", e)
            }
        })?;

        Ok(())
    }

    #[instrument(
        skip(self, filter),
        fields(conditions = filter.conditions.len(), event_count = tracing::field::Empty),
        err
    )]
    async fn select_events(
        &self,
        entity_name: &str,
        filter: &Filter,
        sort: Option<SortOrder>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let mut sql = SqlBuilder::new("SELECT doc FROM eventide_events WHERE entity_name = $1", 1);
        sql.push_filter(filter);
        sql.push_str(match sort {
            Some(SortOrder::Ascending) => " ORDER BY event_created_at ASC, seq ASC",
            Some(SortOrder::Descending) => " ORDER BY event_created_at DESC, seq ASC",
            None => " ORDER BY seq ASC",
        });
        sql.push_limit(limit);

        let query = sql.bind_all(sqlx::query(&sql.text).bind(entity_name));
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("select_events", e))?;

        Span::current().record("event_count", rows.len());
        rows.iter().map(decode_event_row).collect()
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()), err)]
    async fn select_streams(
        &self,
        entity_name: &str,
        ids: &[EntityId],
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let rows = sqlx::query(
            r#"
            SELECT doc
            FROM eventide_events
            WHERE entity_name = $1 AND entity_id = ANY($2)
            ORDER BY seq ASC
            "#,
        )
        .bind(entity_name)
        .bind(uuids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("select_streams", e))?;

        rows.iter().map(decode_event_row).collect()
    }

    #[instrument(skip(self, doc), fields(entity_id = %doc.entity_id), err)]
    async fn write_snapshot(&self, doc: &SnapshotDocument) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            INSERT INTO eventide_snapshots (entity_name, entity_id, updated_at, doc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (entity_name, entity_id)
            DO UPDATE SET
                updated_at = EXCLUDED.updated_at,
                doc = EXCLUDED.doc
            "#,
        )
        .bind(&doc.entity_name)
        .bind(*doc.entity_id.as_uuid())
        .bind(doc.updated_at)
        .bind(doc.to_json()?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_snapshot", e))?;

        Ok(())
    }

    #[instrument(skip(self, filter), fields(conditions = filter.conditions.len()), err)]
    async fn select_snapshots(
        &self,
        entity_name: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotRef>, EventStoreError> {
        let mut sql = SqlBuilder::new(
            "SELECT entity_id FROM eventide_snapshots WHERE entity_name = $1",
            1,
        );
        sql.push_filter(filter);
        sql.push_str(" ORDER BY updated_at ASC, entity_id ASC");
        sql.push_limit(limit);

        let query = sql.bind_all(sqlx::query(&sql.text).bind(entity_name));
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("select_snapshots", e))?;

        rows.iter()
            .map(|row| {
                let id: uuid::Uuid = row
                    .try_get("entity_id")
                    .map_err(|e| EventStoreError::Serialization(format!("snapshot row: {e}")))?;
                Ok(SnapshotRef {
                    entity_id: EntityId::from_uuid(id),
                })
            })
            .collect()
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append_event(&self, event: &RecordedEvent) -> Result<(), EventStoreError> {
        self.insert_event(event).await
    }

    async fn find_events(
        &self,
        entity_name: &str,
        filter: &Filter,
        sort: Option<SortOrder>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        self.select_events(entity_name, filter, sort, limit).await
    }

    async fn find_events_by_entity_ids(
        &self,
        entity_name: &str,
        ids: &[EntityId],
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        self.select_streams(entity_name, ids).await
    }

    async fn upsert_snapshot(&self, doc: &SnapshotDocument) -> Result<(), EventStoreError> {
        self.write_snapshot(doc).await
    }

    async fn query_snapshot_docs(
        &self,
        entity_name: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotRef>, EventStoreError> {
        self.select_snapshots(entity_name, filter, limit).await
    }
}

/// The indexed `revision` column is an `INTEGER`; larger tags are rejected.
fn revision_column(event: &RecordedEvent) -> Result<Option<i32>, EventStoreError> {
    event
        .revision
        .map(i32::try_from)
        .transpose()
        .map_err(|_| {
            EventStoreError::Serialization(format!(
                "event {}: revision {:?} exceeds the integer column",
                event.event_id, event.revision
            ))
        })
}

fn decode_event_row(row: &sqlx::postgres::PgRow) -> Result<RecordedEvent, EventStoreError> {
    let doc: JsonValue = row
        .try_get("doc")
        .map_err(|e| EventStoreError::Serialization(format!("event row: {e}")))?;
    serde_json::from_value(doc).map_err(|e| EventStoreError::Serialization(format!("event doc: {e}")))
}

/// A bound query parameter, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
enum SqlArg {
    Path(Vec<String>),
    Json(JsonValue),
    Text(String),
    Int(i64),
}

/// Appends `AND ...` predicates over the `doc` column with numbered placeholders.
#[derive(Debug)]
struct SqlBuilder {
    text: String,
    args: Vec<SqlArg>,
    next_placeholder: usize,
}

impl SqlBuilder {
    fn new(base: &str, used_placeholders: usize) -> Self {
        Self {
            text: base.to_string(),
            args: Vec::new(),
            next_placeholder: used_placeholders + 1,
        }
    }

    fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn arg(&mut self, arg: SqlArg) -> String {
        let placeholder = format!("${}", self.next_placeholder);
        self.next_placeholder += 1;
        self.args.push(arg);
        placeholder
    }

    fn push_filter(&mut self, filter: &Filter) {
        for condition in &filter.conditions {
            let predicate = self.predicate(condition);
            self.text.push_str(" AND ");
            self.text.push_str(&predicate);
        }
    }

    fn push_limit(&mut self, limit: Option<usize>) {
        if let Some(limit) = limit {
            let p = self.arg(SqlArg::Int(limit as i64));
            self.text.push_str(&format!(" LIMIT {p}"));
        }
    }

    fn predicate(&mut self, c: &Condition) -> String {
        let path = self.arg(SqlArg::Path(c.path.split('.').map(str::to_string).collect()));
        let field = format!("(doc #> {path}::text[])");
        let text = format!("(doc #>> {path}::text[])");
        let present = format!("({field} IS NOT NULL AND {field} <> 'null'::jsonb)");

        match c.op {
            Op::Exists => {
                if c.value.as_bool().unwrap_or(true) {
                    present
                } else {
                    format!("NOT {present}")
                }
            }
            Op::In => {
                let v = self.arg(SqlArg::Json(c.value.clone()));
                format!("({present} AND {field} = ANY(SELECT jsonb_array_elements({v}::jsonb)))")
            }
            Op::Eq => {
                let cmp = self.comparison(&field, &text, "=", &c.value);
                format!("({present} AND {cmp})")
            }
            Op::Ne => {
                let cmp = self.comparison(&field, &text, "=", &c.value);
                format!("(NOT {present} OR NOT {cmp})")
            }
            Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
                let sql_op = match c.op {
                    Op::Gt => ">",
                    Op::Gte => ">=",
                    Op::Lt => "<",
                    _ => "<=",
                };
                let cmp = self.comparison(&field, &text, sql_op, &c.value);
                format!("({present} AND {cmp})")
            }
        }
    }

    /// Typed comparison that mirrors the in-memory semantics: numbers compare
    /// numerically, RFC 3339 strings as instants, other strings bytewise.
    /// Values of another JSON kind never match.
    fn comparison(&mut self, field: &str, text: &str, sql_op: &str, value: &JsonValue) -> String {
        match value {
            JsonValue::Number(n) => {
                let v = self.arg(SqlArg::Text(n.to_string()));
                format!(
                    "(CASE WHEN jsonb_typeof({field}) = 'number' \
                     THEN {text}::numeric {sql_op} {v}::numeric ELSE FALSE END)"
                )
            }
            JsonValue::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => {
                let v = self.arg(SqlArg::Text(s.clone()));
                format!(
                    "(CASE WHEN jsonb_typeof({field}) = 'string' \
                     AND {text} ~ '^\\d{{4}}-\\d{{2}}-\\d{{2}}[Tt ]\\d{{2}}:\\d{{2}}' \
                     THEN {text}::timestamptz {sql_op} {v}::timestamptz ELSE FALSE END)"
                )
            }
            JsonValue::String(s) => {
                let v = self.arg(SqlArg::Text(s.clone()));
                format!(
                    "(CASE WHEN jsonb_typeof({field}) = 'string' \
                     THEN {text} COLLATE \"C\" {sql_op} {v} COLLATE \"C\" ELSE FALSE END)"
                )
            }
            JsonValue::Bool(_) if sql_op != "=" => {
                let v = self.arg(SqlArg::Json(value.clone()));
                format!(
                    "(CASE WHEN jsonb_typeof({field}) = 'boolean' \
                     THEN {field} {sql_op} {v}::jsonb ELSE FALSE END)"
                )
            }
            _ => {
                let v = self.arg(SqlArg::Json(value.clone()));
                format!("({field} {sql_op} {v}::jsonb)")
            }
        }
    }

    fn bind_all<'q>(
        &self,
        mut query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        for arg in &self.args {
            query = match arg.clone() {
                SqlArg::Path(p) => query.bind(p),
                SqlArg::Json(v) => query.bind(v),
                SqlArg::Text(t) => query.bind(t),
                SqlArg::Int(i) => query.bind(i),
            };
        }
        query
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => EventStoreError::Backend(format!(
            "database error in {}: {} (code {:?})",
            operation,
            db_err.message(),
            db_err.code()
        )),
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            EventStoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => EventStoreError::Unavailable(format!("io error in {operation}: {e}")),
        _ => EventStoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(filter: &Filter) -> SqlBuilder {
        let mut sql = SqlBuilder::new("SELECT doc FROM eventide_events WHERE entity_name = $1", 1);
        sql.push_filter(filter);
        sql
    }

    #[test]
    fn match_all_adds_no_predicates() {
        let sql = render(&Filter::all());
        assert_eq!(sql.text, "SELECT doc FROM eventide_events WHERE entity_name = $1");
        assert!(sql.args.is_empty());
    }

    #[test]
    fn placeholders_follow_the_base_query() {
        let mut sql = render(&Filter::all().equals("eventName", "init").gt("body.n", 2));
        sql.push_limit(Some(10));

        assert!(sql.text.contains("doc #> $2::text[]"));
        assert!(sql.text.contains("$3 COLLATE"));
        assert!(sql.text.contains("doc #> $4::text[]"));
        assert!(sql.text.contains("$5::numeric"));
        assert!(sql.text.ends_with(" LIMIT $6"));
        assert_eq!(
            sql.args,
            vec![
                SqlArg::Path(vec!["eventName".into()]),
                SqlArg::Text("init".into()),
                SqlArg::Path(vec!["body".into(), "n".into()]),
                SqlArg::Text("2".into()),
                SqlArg::Int(10),
            ]
        );
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let sql = render(&Filter::all().gte("state.updatedDatetime", "2024-01-01T00:00:00Z"));
        assert!(sql.text.contains("::timestamptz >= $3::timestamptz"));
    }

    #[test]
    fn not_equal_matches_absent_fields() {
        let sql = render(&Filter::all().not_equals("state.flag", true));
        assert!(sql.text.contains("(NOT (("));
    }

    #[test]
    fn membership_compares_whole_elements() {
        let sql = render(&Filter::all().is_in("eventName", vec![json!("a"), json!("b")]));
        assert!(sql.text.contains("(doc #> $2::text[]) = ANY(SELECT jsonb_array_elements($3::jsonb))"));
        assert!(!sql.text.contains("@>"));
    }

    fn with_revision(revision: Option<u32>) -> RecordedEvent {
        RecordedEvent {
            event_id: eventide_core::EventId::new(),
            event_name: "init".into(),
            event_created_at: chrono::Utc::now(),
            entity_name: "timestamp".into(),
            entity_id: EntityId::new(),
            revision,
            body: json!({}),
        }
    }

    #[test]
    fn revisions_beyond_the_integer_column_are_rejected() {
        assert_eq!(revision_column(&with_revision(None)).unwrap(), None);
        assert_eq!(revision_column(&with_revision(Some(7))).unwrap(), Some(7));
        assert_eq!(
            revision_column(&with_revision(Some(i32::MAX as u32))).unwrap(),
            Some(i32::MAX)
        );

        let err = revision_column(&with_revision(Some(u32::MAX))).unwrap_err();
        assert!(matches!(err, EventStoreError::Serialization(_)));
    }
}
