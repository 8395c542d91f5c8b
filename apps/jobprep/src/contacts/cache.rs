use chrono::{Duration, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::warn;

use super::Contact;
use crate::errors::AppError;

/// Cached contacts for (company, domain) younger than `max_age_days`.
pub async fn lookup(
    pool: &SqlitePool,
    company: &str,
    domain: &str,
    max_age_days: i64,
) -> Result<Option<Vec<Contact>>, AppError> {
    let cutoff = Utc::now() - Duration::days(max_age_days);
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT contacts FROM contact_cache WHERE company = ? AND domain = ? AND created_at > ?",
    )
    .bind(company)
    .bind(domain)
    .bind(cutoff)
    .fetch_optional(pool)
    .await?;

    let Some((raw,)) = row else {
        return Ok(None);
    };
    match serde_json::from_str::<Vec<Contact>>(&raw) {
        Ok(contacts) if !contacts.is_empty() => Ok(Some(contacts)),
        Ok(_) => Ok(None),
        Err(e) => {
            warn!("Ignoring unreadable contact cache entry for {domain}: {e}");
            Ok(None)
        }
    }
}

pub async fn store(
    pool: &SqlitePool,
    company: &str,
    domain: &str,
    contacts: &[Contact],
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO contact_cache (company, domain, contacts, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(company, domain) DO UPDATE SET
            contacts = excluded.contacts,
            created_at = excluded.created_at
        "#,
    )
    .bind(company)
    .bind(domain)
    .bind(Json(contacts))
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Removes entries older than `max_age_days`.
pub async fn purge_expired(pool: &SqlitePool, max_age_days: i64) -> Result<u64, AppError> {
    let cutoff = Utc::now() - Duration::days(max_age_days);
    let result = sqlx::query("DELETE FROM contact_cache WHERE created_at <= ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::tests::contact;
    use crate::test_support::memory_pool;

    #[tokio::test]
    async fn test_store_and_lookup() {
        let pool = memory_pool().await;
        assert!(lookup(&pool, "Acme", "acme.com", 30).await.unwrap().is_none());

        store(&pool, "Acme", "acme.com", &[contact("a@acme.com", 0.9, "hunter.io")]).await.unwrap();
        store(&pool, "Acme", "acme.com", &[contact("b@acme.com", 0.8, "apollo.io")]).await.unwrap();

        let cached = lookup(&pool, "Acme", "acme.com", 30).await.unwrap().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].email, "b@acme.com");
        assert!(lookup(&pool, "Acme", "acme.io", 30).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_ignored_and_purged() {
        let pool = memory_pool().await;
        store(&pool, "Acme", "acme.com", &[contact("a@acme.com", 0.9, "hunter.io")]).await.unwrap();
        sqlx::query("UPDATE contact_cache SET created_at = ?")
            .bind(Utc::now() - Duration::days(31))
            .execute(&pool)
            .await
            .unwrap();

        assert!(lookup(&pool, "Acme", "acme.com", 30).await.unwrap().is_none());
        assert_eq!(purge_expired(&pool, 30).await.unwrap(), 1);
    }
}
