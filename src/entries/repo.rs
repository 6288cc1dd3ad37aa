use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::{Date, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entries::repo_types::{
    EntryPatch, EntryRow, EntrySummary, JournalEntry, NewEntry, SummaryRow,
};

#[async_trait]
pub trait EntryRepo: Send + Sync {
    async fn create(&self, user_id: Uuid, entry: NewEntry) -> anyhow::Result<JournalEntry>;
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<JournalEntry>>;
    /// Newest date first; same-day entries newest `created_at` first.
    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<JournalEntry>>;
    /// Same order as `list_for_user`, without text bodies or media.
    async fn summaries_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<EntrySummary>>;
    async fn find_by_date(&self, user_id: Uuid, date: Date) -> anyhow::Result<Option<JournalEntry>>;
    async fn update(&self, id: Uuid, patch: EntryPatch) -> anyhow::Result<Option<JournalEntry>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Inserts `create` and patches `fill` as one unit; on error nothing is
    /// written. Every patched entry must belong to `user_id`.
    async fn write_batch(
        &self,
        user_id: Uuid,
        create: Vec<NewEntry>,
        fill: Vec<(Uuid, EntryPatch)>,
    ) -> anyhow::Result<()>;
}

const ENTRY_COLUMNS: &str = "id, user_id, date, target_plan, reflection, gym_status, gym_notes, \
                             food, mood, target_met, images, videos, created_at";

#[derive(Clone)]
pub struct PgEntryRepo {
    db: PgPool,
}

impl PgEntryRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn convert(rows: Vec<EntryRow>) -> anyhow::Result<Vec<JournalEntry>> {
    rows.into_iter().map(JournalEntry::try_from).collect()
}

async fn insert_entry(
    conn: &mut PgConnection,
    user_id: Uuid,
    e: NewEntry,
) -> anyhow::Result<JournalEntry> {
    let row = sqlx::query_as::<_, EntryRow>(&format!(
        r#"
        INSERT INTO journal_entries
            (user_id, date, target_plan, reflection, gym_status, gym_notes,
             food, mood, target_met, images, videos)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(e.date)
    .bind(e.target_plan)
    .bind(e.reflection)
    .bind(e.gym_status.map(|g| g.as_str()))
    .bind(e.gym_notes)
    .bind(e.food)
    .bind(e.mood.map(|m| m.as_str()))
    .bind(e.target_met)
    .bind(e.images)
    .bind(e.videos)
    .fetch_one(&mut *conn)
    .await
    .context("insert journal entry")?;
    JournalEntry::try_from(row)
}

/// Locks the row, applies `patch` and writes every column back. Run inside a
/// transaction.
async fn patch_locked(
    conn: &mut PgConnection,
    id: Uuid,
    patch: EntryPatch,
) -> anyhow::Result<Option<JournalEntry>> {
    let current = sqlx::query_as::<_, EntryRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .context("lock journal entry")?;
    let Some(current) = current else {
        return Ok(None);
    };

    let mut e = JournalEntry::try_from(current)?;
    patch.apply(&mut e);

    let row = sqlx::query_as::<_, EntryRow>(&format!(
        r#"
        UPDATE journal_entries
           SET date = $2, target_plan = $3, reflection = $4, gym_status = $5,
               gym_notes = $6, food = $7, mood = $8, target_met = $9,
               images = $10, videos = $11
         WHERE id = $1
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(e.date)
    .bind(e.target_plan)
    .bind(e.reflection)
    .bind(e.gym_status.map(|g| g.as_str()))
    .bind(e.gym_notes)
    .bind(e.food)
    .bind(e.mood.map(|m| m.as_str()))
    .bind(e.target_met)
    .bind(e.images)
    .bind(e.videos)
    .fetch_one(&mut *conn)
    .await
    .context("update journal entry")?;
    JournalEntry::try_from(row).map(Some)
}

#[async_trait]
impl EntryRepo for PgEntryRepo {
    async fn create(&self, user_id: Uuid, e: NewEntry) -> anyhow::Result<JournalEntry> {
        let mut conn = self.db.acquire().await.context("acquire connection")?;
        insert_entry(&mut conn, user_id, e).await
    }

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<JournalEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get journal entry")?;
        row.map(JournalEntry::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<JournalEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
              FROM journal_entries
             WHERE user_id = $1
             ORDER BY date DESC, created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list journal entries")?;
        convert(rows)
    }

    async fn summaries_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<EntrySummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT id, date, mood, gym_status, target_met,
                   (reflection IS NOT NULL AND btrim(reflection) <> '') AS has_reflection,
                   created_at
              FROM journal_entries
             WHERE user_id = $1
             ORDER BY date DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list journal entry summaries")?;
        rows.into_iter().map(EntrySummary::try_from).collect()
    }

    async fn find_by_date(&self, user_id: Uuid, date: Date) -> anyhow::Result<Option<JournalEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
              FROM journal_entries
             WHERE user_id = $1 AND date = $2
             ORDER BY created_at DESC
             LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.db)
        .await
        .context("find journal entry by date")?;
        row.map(JournalEntry::try_from).transpose()
    }

    async fn update(&self, id: Uuid, patch: EntryPatch) -> anyhow::Result<Option<JournalEntry>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let updated = patch_locked(&mut tx, id, patch).await?;
        tx.commit().await.context("commit tx")?;
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM journal_entries WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete journal entry")?;
        Ok(res.rows_affected() > 0)
    }

    async fn write_batch(
        &self,
        user_id: Uuid,
        create: Vec<NewEntry>,
        fill: Vec<(Uuid, EntryPatch)>,
    ) -> anyhow::Result<()> {
        // dropping the transaction on an early return rolls it back
        let mut tx = self.db.begin().await.context("begin tx")?;
        for e in create {
            insert_entry(&mut tx, user_id, e).await?;
        }
        for (id, patch) in fill {
            match patch_locked(&mut tx, id, patch).await? {
                Some(e) if e.user_id == user_id => {}
                _ => anyhow::bail!("entry {id} is not available for this batch"),
            }
        }
        tx.commit().await.context("commit tx")?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEntryRepo {
    entries: RwLock<HashMap<Uuid, JournalEntry>>,
}

impl MemoryEntryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &JournalEntry, b: &JournalEntry) -> std::cmp::Ordering {
    b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at))
}

#[async_trait]
impl EntryRepo for MemoryEntryRepo {
    async fn create(&self, user_id: Uuid, entry: NewEntry) -> anyhow::Result<JournalEntry> {
        let entry = entry.into_entry(Uuid::new_v4(), user_id, OffsetDateTime::now_utc());
        self.entries.write().await.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<JournalEntry>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<JournalEntry>> {
        let mut out: Vec<JournalEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(newest_first);
        Ok(out)
    }

    async fn summaries_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<EntrySummary>> {
        let entries = self.entries.read().await;
        let mut owned: Vec<&JournalEntry> =
            entries.values().filter(|e| e.user_id == user_id).collect();
        owned.sort_by(|a, b| newest_first(a, b));
        Ok(owned.into_iter().map(EntrySummary::from).collect())
    }

    async fn find_by_date(&self, user_id: Uuid, date: Date) -> anyhow::Result<Option<JournalEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| e.user_id == user_id && e.date == date)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn update(&self, id: Uuid, patch: EntryPatch) -> anyhow::Result<Option<JournalEntry>> {
        let mut entries = self.entries.write().await;
        Ok(entries.get_mut(&id).map(|e| {
            patch.apply(e);
            e.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.entries.write().await.remove(&id).is_some())
    }

    async fn write_batch(
        &self,
        user_id: Uuid,
        create: Vec<NewEntry>,
        fill: Vec<(Uuid, EntryPatch)>,
    ) -> anyhow::Result<()> {
        let mut entries = self.entries.write().await;
        for (id, _) in &fill {
            match entries.get(id) {
                Some(e) if e.user_id == user_id => {}
                _ => anyhow::bail!("entry {id} is not available for this batch"),
            }
        }

        let now = OffsetDateTime::now_utc();
        for e in create {
            let entry = e.into_entry(Uuid::new_v4(), user_id, now);
            entries.insert(entry.id, entry);
        }
        for (id, patch) in fill {
            if let Some(e) = entries.get_mut(&id) {
                patch.apply(e);
            }
        }
        Ok(())
    }
}
