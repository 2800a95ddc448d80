//! JSON record storage on top of the migrated SQLite schema.

use crate::db::DbPool;
use crate::error::{CoreError, CoreResult};
use crate::schema::{collections, validate_identifier};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// A record type persisted in one named collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;
}

/// Handle to the local document database.
///
/// Cheap to clone; all clones share the same pool.
#[derive(Clone)]
pub struct LocalDb {
    pool: DbPool,
    collections: Arc<BTreeSet<String>>,
}

impl LocalDb {
    pub fn new(pool: DbPool, collections: BTreeSet<String>) -> Self {
        Self {
            pool,
            collections: Arc::new(collections),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains(name)
    }

    /// Fails with `MissingDependency` if `name` is not part of the migrated schema.
    pub fn ensure_collection(&self, name: &str) -> CoreResult<()> {
        if self.has_collection(name) {
            Ok(())
        } else {
            Err(CoreError::MissingDependency(format!(
                "collection '{name}' is not part of the database schema"
            )))
        }
    }

    /// Every record of `T`'s collection, ordered by id.
    pub async fn all<T: Entity>(&self) -> CoreResult<Vec<T>> {
        self.ensure_collection(T::COLLECTION)?;
        let mut conn = self.pool.acquire().await?;
        all_in(&mut conn).await
    }

    pub async fn get<T: Entity>(&self, id: Uuid) -> CoreResult<Option<T>> {
        self.ensure_collection(T::COLLECTION)?;
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, id).await
    }

    /// Like [`LocalDb::get`] but a missing record is an error.
    pub async fn require<T: Entity>(&self, id: Uuid) -> CoreResult<T> {
        self.get(id).await?.ok_or_else(|| {
            CoreError::NotFound(format!("{} record {}", T::COLLECTION, id))
        })
    }

    pub async fn insert<T: Entity>(&self, record: &T) -> CoreResult<()> {
        self.ensure_collection(T::COLLECTION)?;
        let mut conn = self.pool.acquire().await?;
        insert_in(&mut conn, record).await
    }

    /// Insert or replace.
    pub async fn put<T: Entity>(&self, record: &T) -> CoreResult<()> {
        self.ensure_collection(T::COLLECTION)?;
        let mut conn = self.pool.acquire().await?;
        put_in(&mut conn, record).await
    }

    /// Returns `false` when there was nothing to delete.
    pub async fn delete<T: Entity>(&self, id: Uuid) -> CoreResult<bool> {
        self.ensure_collection(T::COLLECTION)?;
        let mut conn = self.pool.acquire().await?;
        Ok(delete_in::<T>(&mut conn, id).await? > 0)
    }

    /// Records whose top-level string `field` equals `value`.
    pub async fn find_by_field<T: Entity>(&self, field: &str, value: &str) -> CoreResult<Vec<T>> {
        self.ensure_collection(T::COLLECTION)?;
        let mut conn = self.pool.acquire().await?;
        find_by_field_in(&mut conn, field, value).await
    }

    /// Untyped read of a whole collection, exactly as stored.
    pub async fn raw_records(&self, collection: &str) -> CoreResult<Vec<Value>> {
        self.ensure_collection(collection)?;
        let bodies: Vec<String> =
            sqlx::query_scalar(&format!("SELECT body FROM \"{collection}\" ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(CoreError::from))
            .collect()
    }

    /// Untyped upsert. Used for imports and for seeding legacy data.
    pub async fn put_raw(&self, collection: &str, id: &str, body: &Value) -> CoreResult<()> {
        self.ensure_collection(collection)?;
        sqlx::query(&format!(
            "INSERT INTO \"{collection}\" (id, body) VALUES ($1, $2) \
             ON CONFLICT(id) DO UPDATE SET body = excluded.body"
        ))
        .bind(id)
        .bind(serde_json::to_string(body)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads a singleton value from the `app_state` collection.
    pub async fn get_app_state<V: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<V>> {
        self.ensure_collection(collections::APP_STATE)?;
        let body: Option<String> = sqlx::query_scalar(&format!(
            "SELECT body FROM \"{}\" WHERE id = $1",
            collections::APP_STATE
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match body {
            Some(body) => {
                let mut wrapper: serde_json::Map<String, Value> = serde_json::from_str(&body)?;
                let value = wrapper.remove("value").unwrap_or(Value::Null);
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    pub async fn set_app_state<V: Serialize>(&self, key: &str, value: &V) -> CoreResult<()> {
        self.ensure_collection(collections::APP_STATE)?;
        let mut conn = self.pool.acquire().await?;
        set_app_state_in(&mut conn, key, value).await
    }
}

// Connection-scoped variants. Callers pass `&mut tx` to run them inside a
// transaction.

pub(crate) async fn all_in<T: Entity>(conn: &mut SqliteConnection) -> CoreResult<Vec<T>> {
    let bodies: Vec<String> =
        sqlx::query_scalar(&format!("SELECT body FROM \"{}\" ORDER BY id", T::COLLECTION))
            .fetch_all(&mut *conn)
            .await?;
    decode_all(&bodies)
}

pub(crate) async fn get_in<T: Entity>(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> CoreResult<Option<T>> {
    let body: Option<String> =
        sqlx::query_scalar(&format!("SELECT body FROM \"{}\" WHERE id = $1", T::COLLECTION))
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;
    body.map(|b| serde_json::from_str(&b).map_err(CoreError::from))
        .transpose()
}

pub(crate) async fn insert_in<T: Entity>(conn: &mut SqliteConnection, record: &T) -> CoreResult<()> {
    let result = sqlx::query(&format!(
        "INSERT INTO \"{}\" (id, body) VALUES ($1, $2)",
        T::COLLECTION
    ))
    .bind(record.id().to_string())
    .bind(serde_json::to_string(record)?)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(CoreError::Duplicate(format!(
                "{} record conflicts with an existing one",
                T::COLLECTION
            )))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn put_in<T: Entity>(conn: &mut SqliteConnection, record: &T) -> CoreResult<()> {
    let result = sqlx::query(&format!(
        "INSERT INTO \"{}\" (id, body) VALUES ($1, $2) \
         ON CONFLICT(id) DO UPDATE SET body = excluded.body",
        T::COLLECTION
    ))
    .bind(record.id().to_string())
    .bind(serde_json::to_string(record)?)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(CoreError::Duplicate(format!(
                "{} record conflicts with an existing one",
                T::COLLECTION
            )))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn delete_in<T: Entity>(conn: &mut SqliteConnection, id: Uuid) -> CoreResult<u64> {
    let result = sqlx::query(&format!("DELETE FROM \"{}\" WHERE id = $1", T::COLLECTION))
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_all_in<T: Entity>(conn: &mut SqliteConnection) -> CoreResult<u64> {
    let result = sqlx::query(&format!("DELETE FROM \"{}\"", T::COLLECTION))
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_by_field_in<T: Entity>(
    conn: &mut SqliteConnection,
    field: &str,
    value: &str,
) -> CoreResult<u64> {
    let result = sqlx::query(&format!(
        "DELETE FROM \"{}\" WHERE {} = $1",
        T::COLLECTION,
        field_expr(field)?
    ))
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn find_by_field_in<T: Entity>(
    conn: &mut SqliteConnection,
    field: &str,
    value: &str,
) -> CoreResult<Vec<T>> {
    let bodies: Vec<String> = sqlx::query_scalar(&find_by_field_sql(T::COLLECTION, field)?)
        .bind(value)
        .fetch_all(&mut *conn)
        .await?;
    decode_all(&bodies)
}

pub(crate) async fn set_app_state_in<V: Serialize>(
    conn: &mut SqliteConnection,
    key: &str,
    value: &V,
) -> CoreResult<()> {
    let body = serde_json::json!({ "key": key, "value": serde_json::to_value(value)? });
    sqlx::query(&format!(
        "INSERT INTO \"{}\" (id, body) VALUES ($1, $2) \
         ON CONFLICT(id) DO UPDATE SET body = excluded.body",
        collections::APP_STATE
    ))
    .bind(key)
    .bind(serde_json::to_string(&body)?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn find_by_field_sql(collection: &str, field: &str) -> CoreResult<String> {
    Ok(format!(
        "SELECT body FROM \"{collection}\" WHERE {} = $1 ORDER BY id",
        field_expr(field)?
    ))
}

/// The expression the schema indexes `field` by. It must match the index
/// definition text exactly or SQLite falls back to a table scan.
pub(crate) fn field_expr(field: &str) -> CoreResult<String> {
    validate_identifier(field)?;
    Ok(format!("json_extract(body, '$.{field}')"))
}

fn decode_all<T: Entity>(bodies: &[String]) -> CoreResult<Vec<T>> {
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(CoreError::from))
        .collect()
}
