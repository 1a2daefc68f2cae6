// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Database connection pool, TLS setup, migrations and chunked writes.

use diesel::{
    query_builder::{QueryFragment, QueryId},
    result::{DatabaseErrorKind, Error as DieselError},
    ConnectionError, ConnectionResult, QueryResult,
};
use diesel_async::{
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{
        bb8::{Pool, PooledConnection},
        AsyncDieselConnectionManager, ManagerConfig,
    },
    AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use field_count::FieldCount;
use futures_util::{future::BoxFuture, FutureExt};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub type Backend = diesel::pg::Pg;

pub type MyDbConnection = AsyncPgConnection;
pub type DbPool = Pool<MyDbConnection>;
pub type ArcDbPool = Arc<DbPool>;
pub type DbPoolConnection<'a> = PooledConnection<'a, MyDbConnection>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/postgres/migrations");

/// Postgres caps bind parameters per statement at `u16::MAX`; stay well under.
pub const MAX_DIESEL_PARAM_SIZE: usize = u16::MAX as usize / 2;

/// Rows per insert for a model with `T::field_count()` columns.
pub fn chunk_size<T: FieldCount>() -> usize {
    (MAX_DIESEL_PARAM_SIZE / T::field_count().max(1)).max(1)
}

/// How database TLS connections verify the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsVerification {
    /// Verify the certificate chain against the system roots
    #[default]
    Verify,
    /// Accept any certificate, for poolers with self-signed certs
    AcceptInvalid,
}

impl TlsVerification {
    pub fn from_accept_invalid(accept_invalid_certs: bool) -> Self {
        if accept_invalid_certs {
            Self::AcceptInvalid
        } else {
            Self::Verify
        }
    }
}

fn tls_connector(verification: TlsVerification) -> Result<native_tls::TlsConnector, native_tls::Error> {
    native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(verification == TlsVerification::AcceptInvalid)
        .build()
}

/// Open one connection over TLS (Supabase requires it).
fn establish_connection(
    database_url: &str,
    verification: TlsVerification,
) -> BoxFuture<'static, ConnectionResult<AsyncPgConnection>> {
    let database_url = database_url.to_string();
    async move {
        let connector = tls_connector(verification).map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
        let tls = postgres_native_tls::MakeTlsConnector::new(connector);
        let (client, connection) = tokio_postgres::connect(&database_url, tls)
            .await
            .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Database connection: {}", e);
            }
        });
        AsyncPgConnection::try_from(client).await
    }
    .boxed()
}

pub async fn new_db_pool(
    database_url: &str,
    max_pool_size: u32,
    verification: TlsVerification,
) -> anyhow::Result<ArcDbPool> {
    let mut config = ManagerConfig::default();
    config.custom_setup = Box::new(move |url| establish_connection(url, verification));

    let manager = AsyncDieselConnectionManager::<MyDbConnection>::new_with_config(database_url, config);
    let pool = Pool::builder()
        .max_size(max_pool_size)
        .connection_timeout(Duration::from_secs(30))
        .build(manager)
        .await?;
    info!("🗄️ Database pool ready (max {} connections)", max_pool_size);
    Ok(Arc::new(pool))
}

/// Apply pending embedded migrations on a dedicated connection.
pub async fn run_migrations(database_url: &str, verification: TlsVerification) -> anyhow::Result<()> {
    let conn = establish_connection(database_url, verification).await?;
    let mut wrapper: AsyncConnectionWrapper<MyDbConnection> = AsyncConnectionWrapper::from(conn);
    let applied = tokio::task::spawn_blocking(move || {
        wrapper
            .run_pending_migrations(MIGRATIONS)
            .map(|versions| versions.len())
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))
    })
    .await??;
    info!("🗄️ Applied {} pending migrations", applied);
    Ok(())
}

/// Execute a query, logging the SQL on failure.
pub async fn execute_with_better_error<U>(pool: &ArcDbPool, query: U) -> QueryResult<usize>
where
    U: QueryFragment<Backend> + QueryId + Send,
{
    let debug_string = diesel::debug_query::<Backend, _>(&query).to_string();
    let mut conn = pool.get().await.map_err(|e| {
        DieselError::DatabaseError(DatabaseErrorKind::UnableToSendCommand, Box::new(e.to_string()))
    })?;
    let res = query.execute(&mut conn).await;
    if let Err(ref e) = res {
        warn!("Error running query: {:?}\n{}", e, debug_string);
    }
    res
}

/// Build and run one statement per chunk of `items`, in order.
pub async fn execute_in_chunks<U, T>(
    pool: &ArcDbPool,
    build_query: fn(Vec<T>) -> U,
    items: &[T],
    chunk_size: usize,
) -> QueryResult<usize>
where
    U: QueryFragment<Backend> + QueryId + Send,
    T: Clone,
{
    let mut affected = 0;
    for chunk in items.chunks(chunk_size.max(1)) {
        affected += execute_with_better_error(pool, build_query(chunk.to_vec())).await?;
    }
    Ok(affected)
}
