use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{NewPin, Pin};

/// Article IDs per `IN (...)` query, well under SQLite's 999 parameter limit
const PIN_LOOKUP_BATCH_SIZE: usize = 500;

impl Database {
    // ========================================================================
    // Pin Operations
    // ========================================================================

    /// Get every pin referencing one of `article_ids`.
    ///
    /// IDs are queried in chunks of [`PIN_LOOKUP_BATCH_SIZE`].
    pub async fn find_pins(&self, article_ids: &[i64]) -> Result<Vec<Pin>> {
        let mut pins = Vec::new();

        for chunk in article_ids.chunks(PIN_LOOKUP_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "SELECT id, user_id, article_id, created_at FROM pins WHERE article_id IN (",
            );
            let mut separated = builder.separated(", ");
            for article_id in chunk {
                separated.push_bind(*article_id);
            }
            separated.push_unseparated(") ORDER BY id");

            let rows: Vec<Pin> = builder.build_query_as().fetch_all(&self.pool).await?;
            pins.extend(rows);
        }

        Ok(pins)
    }

    /// Get every pin a user has saved
    pub async fn find_pins_for_user(&self, user_id: i64) -> Result<Vec<Pin>> {
        let pins = sqlx::query_as::<_, Pin>(
            "SELECT id, user_id, article_id, created_at FROM pins WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(pins)
    }

    /// Create a pin with a caller-supplied creation time.
    ///
    /// A user pins an article at most once. Creating a pin that already
    /// exists keeps the row and moves its `created_at` to the earlier of the
    /// two times.
    pub async fn create_pin(&self, pin: NewPin) -> Result<Pin> {
        let created = sqlx::query_as::<_, Pin>(
            r#"
            INSERT INTO pins (user_id, article_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, article_id) DO UPDATE SET
                created_at = MIN(pins.created_at, excluded.created_at)
            RETURNING id, user_id, article_id, created_at
        "#,
        )
        .bind(pin.user_id)
        .bind(pin.article_id)
        .bind(pin.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Delete a single pin. Deleting a pin that is already gone is not an error.
    pub async fn delete_pin(&self, pin_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM pins WHERE id = ?")
            .bind(pin_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(pin_id = pin_id, "Pin already deleted");
        }
        Ok(())
    }
}
