use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::SqlitePool;

use crate::errors::AppError;

/// Reads a JSON setting. A stored value that no longer deserializes is treated as absent.
pub async fn get_setting<T: DeserializeOwned>(pool: &SqlitePool, key: &str) -> Result<Option<T>, AppError> {
    let raw: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring unreadable setting '{key}': {e}");
            None
        }
    }))
}

pub async fn put_setting<T: Serialize>(pool: &SqlitePool, key: &str, value: &T) -> Result<(), AppError> {
    let raw = serde_json::to_string(value).map_err(|e| AppError::Validation(e.to_string()))?;
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(raw)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    #[tokio::test]
    async fn test_put_then_overwrite() {
        let pool = memory_pool().await;
        assert_eq!(get_setting::<Vec<String>>(&pool, "k").await.unwrap(), None);

        put_setting(&pool, "k", &vec!["a".to_string()]).await.unwrap();
        put_setting(&pool, "k", &vec!["b".to_string(), "c".to_string()]).await.unwrap();
        assert_eq!(
            get_setting::<Vec<String>>(&pool, "k").await.unwrap(),
            Some(vec!["b".to_string(), "c".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unreadable_value_is_absent() {
        let pool = memory_pool().await;
        put_setting(&pool, "k", &"not a list").await.unwrap();
        assert_eq!(get_setting::<Vec<String>>(&pool, "k").await.unwrap(), None);
    }
}
