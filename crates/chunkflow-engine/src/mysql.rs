//! MySQL implementations of the pipeline's database seams.

use async_trait::async_trait;
use chunkflow_core::{KeyTuple, KeyValue, ScalarKind, ScalarValue, UniqueKeySpec};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Executor, MySql, MySqlPool, Row, Transaction};
use tracing::debug;

use crate::config::RunConfig;
use crate::db::{DmlSink, DmlTxn, KeysetSource, ReplicaHost, ReplicaProbe, ReplicaTopology};
use crate::error::EngineError;
use crate::lag::{vocabulary_for, Vocabulary};

const TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?";

fn connect_options(cfg: &RunConfig, database: Option<&str>) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(&cfg.user)
        .password(&cfg.password);
    if let Some(db) = database {
        options = options.database(db);
    }
    options
}

/// Opens a small pool against the source server.
///
/// With `no_log_bin` set, every session in the pool disables binary logging
/// before it is handed out.
pub async fn connect(cfg: &RunConfig, database: Option<&str>) -> Result<MySqlPool, EngineError> {
    let mut pool_options = MySqlPoolOptions::new().max_connections(4);
    if cfg.no_log_bin {
        pool_options = pool_options.after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET sql_log_bin = 0").await?;
                Ok(())
            })
        });
    }
    pool_options
        .connect_with(connect_options(cfg, database))
        .await
        .map_err(|e| EngineError::Connection {
            msg: format!("cannot connect to {}:{}: {}", cfg.host, cfg.port, e),
        })
}

/// Whether the table exists in the given schema.
pub async fn table_exists(
    pool: &MySqlPool,
    database: &str,
    table: &str,
) -> Result<bool, EngineError> {
    let row = sqlx::query(TABLE_EXISTS_SQL)
        .bind(database)
        .bind(table)
        .fetch_one(pool)
        .await
        .map_err(|e| EngineError::Introspection {
            msg: format!("cannot check table {}.{}: {}", database, table, e),
        })?;
    let count: i64 = row.try_get(0).map_err(|e| EngineError::Introspection {
        msg: format!("cannot decode table count: {}", e),
    })?;
    Ok(count > 0)
}

/// The table's `SHOW CREATE TABLE` DDL.
pub async fn show_create_table(
    pool: &MySqlPool,
    database: &str,
    table: &str,
) -> Result<String, EngineError> {
    let sql = format!("SHOW CREATE TABLE `{}`.`{}`", database, table);
    let row = sqlx::query(&sql)
        .fetch_one(pool)
        .await
        .map_err(|e| EngineError::Introspection {
            msg: format!("cannot read DDL for {}.{}: {}", database, table, e),
        })?;
    row.try_get::<String, _>(1)
        .map_err(|e| EngineError::Introspection {
            msg: format!("cannot decode DDL for {}.{}: {}", database, table, e),
        })
}

/// The server's version string.
pub async fn server_version(pool: &MySqlPool) -> Result<String, EngineError> {
    let row = sqlx::query("SELECT VERSION()")
        .fetch_one(pool)
        .await
        .map_err(|e| EngineError::Connection {
            msg: format!("cannot read server version: {}", e),
        })?;
    row.try_get(0).map_err(|e| EngineError::Connection {
        msg: format!("cannot decode server version: {}", e),
    })
}

fn bind_scalar<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &ScalarValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        ScalarValue::Null => query.bind(Option::<i64>::None),
        ScalarValue::Int64(v) => query.bind(*v),
        ScalarValue::UInt64(v) => query.bind(*v),
        ScalarValue::Float64(v) => query.bind(*v),
        ScalarValue::Text(v) => query.bind(v.clone()),
    }
}

fn decode_scalar(row: &MySqlRow, name: &str, kind: ScalarKind) -> Result<ScalarValue, sqlx::Error> {
    let value = match kind {
        ScalarKind::Int64 => row
            .try_get::<Option<i64>, _>(name)?
            .map_or(ScalarValue::Null, ScalarValue::Int64),
        ScalarKind::UInt64 => row
            .try_get::<Option<u64>, _>(name)?
            .map_or(ScalarValue::Null, ScalarValue::UInt64),
        ScalarKind::Float64 => row
            .try_get::<Option<f64>, _>(name)?
            .map_or(ScalarValue::Null, ScalarValue::Float64),
        ScalarKind::Text => row
            .try_get::<Option<String>, _>(name)?
            .map_or(ScalarValue::Null, ScalarValue::Text),
    };
    Ok(value)
}

/// Boundary fetches over a dedicated pool.
pub struct MySqlKeysetSource {
    pool: MySqlPool,
}

impl MySqlKeysetSource {
    /// Wraps a pool for keyset reads.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeysetSource for MySqlKeysetSource {
    async fn fetch_key_rows(
        &self,
        sql: &str,
        args: &[ScalarValue],
        spec: &UniqueKeySpec,
    ) -> Result<Vec<KeyTuple>, EngineError> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = bind_scalar(query, arg);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Read {
                msg: format!("keyset fetch failed: {}", e),
            })?;

        let mut tuples = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut entries = Vec::with_capacity(spec.columns.len());
            for column in &spec.columns {
                let value =
                    decode_scalar(row, &column.name, column.kind).map_err(|e| {
                        EngineError::Read {
                            msg: format!("cannot decode key column `{}`: {}", column.name, e),
                        }
                    })?;
                entries.push(KeyValue {
                    column: column.name.clone(),
                    value,
                });
            }
            tuples.push(KeyTuple { entries });
        }
        Ok(tuples)
    }
}

/// Chunk execution over a dedicated pool.
pub struct MySqlDmlSink {
    pool: MySqlPool,
}

impl MySqlDmlSink {
    /// Wraps a pool for chunked DML.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

struct MySqlDmlTxn {
    txn: Transaction<'static, MySql>,
}

#[async_trait]
impl DmlTxn for MySqlDmlTxn {
    async fn execute(&mut self, sql: &str, args: &[ScalarValue]) -> Result<u64, EngineError> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = bind_scalar(query, arg);
        }
        let result = query
            .execute(&mut *self.txn)
            .await
            .map_err(|e| EngineError::Write {
                msg: e.to_string(),
            })?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        self.txn.commit().await.map_err(|e| EngineError::Write {
            msg: format!("commit failed: {}", e),
        })
    }
}

#[async_trait]
impl DmlSink for MySqlDmlSink {
    async fn begin(&self) -> Result<Box<dyn DmlTxn>, EngineError> {
        let txn = self.pool.begin().await.map_err(|e| EngineError::Write {
            msg: format!("cannot open transaction: {}", e),
        })?;
        Ok(Box::new(MySqlDmlTxn { txn }))
    }
}

/// Replica discovery against the source server.
pub struct MySqlTopology {
    pool: MySqlPool,
    cfg: RunConfig,
}

impl MySqlTopology {
    /// Wraps the source pool plus the credentials used to reach replicas.
    pub fn new(pool: MySqlPool, cfg: RunConfig) -> Self {
        Self { pool, cfg }
    }
}

#[async_trait]
impl ReplicaTopology for MySqlTopology {
    async fn replica_hosts(&self) -> Result<Vec<ReplicaHost>, EngineError> {
        let version = server_version(&self.pool).await?;
        let vocabulary = vocabulary_for(&version);
        debug!(%version, sql = vocabulary.hosts_sql(), "listing replicas");

        let rows = sqlx::query(vocabulary.hosts_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Connection {
                msg: format!("cannot list replicas: {}", e),
            })?;

        let mut hosts = Vec::with_capacity(rows.len());
        for row in &rows {
            let host: String = row.try_get("Host").map_err(|e| EngineError::Connection {
                msg: format!("cannot decode replica host: {}", e),
            })?;
            // SHOW ... HOSTS reports these as unsigned, be lenient anyway
            let server_id = row
                .try_get::<u32, _>("Server_id")
                .map(i64::from)
                .or_else(|_| row.try_get::<i64, _>("Server_id"))
                .unwrap_or(0);
            let port = row
                .try_get::<u32, _>("Port")
                .map(|p| p as u16)
                .or_else(|_| row.try_get::<i64, _>("Port").map(|p| p as u16))
                .unwrap_or(0);
            hosts.push(ReplicaHost {
                server_id,
                host,
                port,
            });
        }
        Ok(hosts)
    }

    async fn connect_probe(
        &self,
        host: &ReplicaHost,
    ) -> Result<Box<dyn ReplicaProbe>, EngineError> {
        let port = if host.port > 0 { host.port } else { self.cfg.port };
        let options = MySqlConnectOptions::new()
            .host(&host.host)
            .port(port)
            .username(&self.cfg.user)
            .password(&self.cfg.password);
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| EngineError::ReplicaPoll {
                host: host.host.clone(),
                msg: format!("cannot connect: {}", e),
            })?;

        // each replica answers with its own vocabulary
        let version = server_version(&pool).await.map_err(|e| EngineError::ReplicaPoll {
            host: host.host.clone(),
            msg: e.to_string(),
        })?;
        Ok(Box::new(MySqlReplicaProbe {
            pool,
            host: host.host.clone(),
            vocabulary: vocabulary_for(&version),
        }))
    }
}

struct MySqlReplicaProbe {
    pool: MySqlPool,
    host: String,
    vocabulary: Vocabulary,
}

impl MySqlReplicaProbe {
    fn poll_error(&self, msg: String) -> EngineError {
        EngineError::ReplicaPoll {
            host: self.host.clone(),
            msg,
        }
    }
}

#[async_trait]
impl ReplicaProbe for MySqlReplicaProbe {
    fn host(&self) -> &str {
        &self.host
    }

    async fn lag_seconds(&self) -> Result<i64, EngineError> {
        let rows = sqlx::query(self.vocabulary.status_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.poll_error(e.to_string()))?;

        // multi-source replicas report one row per channel, take the last
        let Some(row) = rows.last() else {
            return Err(self.poll_error("server is not a replica".to_string()));
        };

        let column = self.vocabulary.lag_column();
        let lag = row
            .try_get::<Option<i64>, _>(column)
            .or_else(|_| {
                row.try_get::<Option<u64>, _>(column)
                    .map(|v| v.map(|x| x as i64))
            })
            .map_err(|e| self.poll_error(format!("cannot decode {}: {}", column, e)))?;

        lag.ok_or_else(|| self.poll_error("replication is not running".to_string()))
    }
}
