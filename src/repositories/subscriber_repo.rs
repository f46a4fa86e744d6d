use sqlx::SqlitePool;

use crate::models::{Subscriber, SubscriberRecord};

pub struct SubscriberRepository;

impl SubscriberRepository {
    /// Subscribers currently offered new signals. Inactive profiles are
    /// excluded here and only here; monitoring paths never filter on the flag.
    pub async fn active(pool: &SqlitePool) -> Result<Vec<Subscriber>, sqlx::Error> {
        let records = sqlx::query_as::<_, SubscriberRecord>(
            "SELECT * FROM subscribers WHERE is_active = 1",
        )
        .fetch_all(pool)
        .await?;

        Ok(records.into_iter().map(Subscriber::from).collect())
    }

    /// Lookup by internal id. `None` when the profile was deleted between
    /// ticks; callers skip the related Trade for the cycle.
    pub async fn find_by_id(
        pool: &SqlitePool,
        id: i64,
    ) -> Result<Option<Subscriber>, sqlx::Error> {
        let record =
            sqlx::query_as::<_, SubscriberRecord>("SELECT * FROM subscribers WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?;

        Ok(record.map(Subscriber::from))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::SubscriberSeed;
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn active_skips_inactive_profiles() {
        let pool = db::memory_pool().await;
        SubscriberSeed::default().insert(&pool).await;
        SubscriberSeed {
            is_active: false,
            ..Default::default()
        }
        .insert(&pool)
        .await;

        let active = SubscriberRepository::active(&pool).await.unwrap();
        assert_eq!(active.len(), 1);
        assert!(active[0].is_active);
    }

    #[tokio::test]
    async fn find_by_id_returns_none_for_deleted_profiles() {
        let pool = db::memory_pool().await;
        let id = SubscriberSeed::default().insert(&pool).await;

        assert!(SubscriberRepository::find_by_id(&pool, id)
            .await
            .unwrap()
            .is_some());
        assert!(SubscriberRepository::find_by_id(&pool, id + 99)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn json_columns_decode_into_typed_sets() {
        let pool = db::memory_pool().await;
        let id = SubscriberSeed::default().insert(&pool).await;

        let sub = SubscriberRepository::find_by_id(&pool, id)
            .await
            .unwrap()
            .unwrap();
        assert!(sub.allowed_coins.contains("BTC"));
        assert_eq!(sub.buy_amount("USDT"), Some(20.0));
        assert_eq!(sub.frozen_ceiling("USDT"), 100.0);
    }
}
