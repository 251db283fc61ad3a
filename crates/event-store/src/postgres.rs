use async_trait::async_trait;
use common::{ActorId, BalanceKey, EquipmentTypeId, SiteId};
use futures_util::stream;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventEnvelope, EventId, EventQuery, EventStoreError, LedgerEvent, Movement, Result, Sequence,
    Version,
    store::{AppendOptions, EventStore, EventStream},
};

const SELECT_COLUMNS: &str = "SELECT sequence, event_id, equipment_type_id, quantity, occurred_at, recorded_at, recorded_by, movement FROM ledger_events";

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_envelope(row: PgRow) -> Result<EventEnvelope> {
        let movement: Movement =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("movement")?)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            sequence: Sequence::new(row.try_get("sequence")?),
            recorded_at: row.try_get("recorded_at")?,
            event: LedgerEvent {
                equipment_type: EquipmentTypeId::from_uuid(
                    row.try_get::<Uuid, _>("equipment_type_id")?,
                ),
                quantity: row.try_get("quantity")?,
                occurred_at: row.try_get("occurred_at")?,
                recorded_by: ActorId::new(row.try_get::<String, _>("recorded_by")?),
                movement,
            },
        })
    }

    /// Locks the key's version row, checks it, and bumps it.
    async fn bump_version(
        tx: &mut Transaction<'_, Postgres>,
        key: BalanceKey,
        expected: Option<Version>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_key_versions (site_id, equipment_type_id, version)
            VALUES ($1, $2, 0)
            ON CONFLICT (site_id, equipment_type_id) DO NOTHING
            "#,
        )
        .bind(key.site.as_uuid())
        .bind(key.equipment_type.as_uuid())
        .execute(&mut **tx)
        .await?;

        let current: i64 = sqlx::query_scalar(
            "SELECT version FROM ledger_key_versions WHERE site_id = $1 AND equipment_type_id = $2 FOR UPDATE",
        )
        .bind(key.site.as_uuid())
        .bind(key.equipment_type.as_uuid())
        .fetch_one(&mut **tx)
        .await?;

        let actual = Version::new(current);
        if let Some(expected) = expected
            && actual != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                key,
                expected,
                actual,
            });
        }

        sqlx::query(
            "UPDATE ledger_key_versions SET version = version + 1 WHERE site_id = $1 AND equipment_type_id = $2",
        )
        .bind(key.site.as_uuid())
        .bind(key.equipment_type.as_uuid())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, event, options), fields(kind = %event.kind()))]
    async fn append(&self, event: LedgerEvent, options: AppendOptions) -> Result<EventEnvelope> {
        event.validate()?;

        let mut tx = self.pool.begin().await?;

        // Row locks are taken in key order so opposing transfers cannot deadlock
        let mut keys = event.balance_keys();
        keys.sort();
        for key in keys {
            let expected = options
                .expected_versions
                .iter()
                .find_map(|(k, v)| (*k == key).then_some(*v));
            Self::bump_version(&mut tx, key, expected).await?;
        }

        let sites = event.sites();
        let event_id = EventId::new();
        let movement = serde_json::to_value(&event.movement)?;

        let row = sqlx::query(
            r#"
            INSERT INTO ledger_events
                (event_id, kind, equipment_type_id, quantity, occurred_at, recorded_by, site_id, counterpart_site_id, movement)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING sequence, recorded_at
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(event.kind().as_str())
        .bind(event.equipment_type.as_uuid())
        .bind(event.quantity)
        .bind(event.occurred_at)
        .bind(event.recorded_by.as_str())
        .bind(sites[0].as_uuid())
        .bind(sites.get(1).map(SiteId::as_uuid))
        .bind(movement)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(EventEnvelope {
            event_id,
            sequence: Sequence::new(row.try_get("sequence")?),
            recorded_at: row.try_get("recorded_at")?,
            event,
        })
    }

    async fn query_events(&self, query: EventQuery) -> Result<EventStream> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.site.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND (site_id = ${param_count} OR counterpart_site_id = ${param_count})"
            ));
        }
        if query.equipment_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND equipment_type_id = ${param_count}"));
        }
        if query.kinds.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND kind = ANY(${param_count})"));
        }
        if query.from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at >= ${param_count}"));
        }
        if query.until.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at <= ${param_count}"));
        }
        if query.before.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at < ${param_count}"));
        }

        sql.push_str(" ORDER BY occurred_at ASC, sequence ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(site) = query.site {
            sqlx_query = sqlx_query.bind(site.as_uuid());
        }
        if let Some(equipment_type) = query.equipment_type {
            sqlx_query = sqlx_query.bind(equipment_type.as_uuid());
        }
        if let Some(ref kinds) = query.kinds {
            let kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(kinds);
        }
        if let Some(from) = query.from {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(until) = query.until {
            sqlx_query = sqlx_query.bind(until);
        }
        if let Some(before) = query.before {
            sqlx_query = sqlx_query.bind(before);
        }
        if let Some(limit) = query.sql_limit()? {
            sqlx_query = sqlx_query.bind(limit);
        }
        if let Some(offset) = query.sql_offset()? {
            sqlx_query = sqlx_query.bind(offset);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let events: Vec<_> = rows.into_iter().map(Self::row_to_envelope).collect();
        Ok(Box::pin(stream::iter(events)))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        self.query_events(EventQuery::new()).await
    }

    async fn key_version(&self, key: BalanceKey) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM ledger_key_versions WHERE site_id = $1 AND equipment_type_id = $2",
        )
        .bind(key.site.as_uuid())
        .bind(key.equipment_type.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(Version::new(version.unwrap_or(0)))
    }
}
