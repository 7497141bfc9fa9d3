use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

use super::StoreError;

pub type DbPool = Pool<AsyncPgConnection>;

/// Build a pool sized for `workers` concurrent writers and verify the
/// database is reachable.
pub async fn connect(database_url: &str, workers: usize) -> Result<DbPool, StoreError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager)
        .max_size(workers.max(1))
        .build()
        .expect("failed to build connection pool");

    drop(pool.get().await?);
    Ok(pool)
}
