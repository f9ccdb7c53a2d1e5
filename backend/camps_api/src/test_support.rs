use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use sqlx::SqlitePool;

use crate::db;

static DB_SEQ: AtomicU32 = AtomicU32::new(0);

/// A migrated database in its own temp directory, removed on drop together
/// with the `-wal` and `-shm` files.
pub struct ScratchDb {
    pub pool: SqlitePool,
    dir: PathBuf,
}

impl Drop for ScratchDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub async fn scratch_db() -> ScratchDb {
    let dir = std::env::temp_dir().join(format!(
        "camps-test-{}-{}-{}",
        std::process::id(),
        DB_SEQ.fetch_add(1, Ordering::SeqCst),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    std::fs::create_dir_all(&dir).unwrap();

    let path = dir.join("camps.db");
    let pool = db::init_pool(&path.to_string_lossy(), Duration::from_secs(5))
        .await
        .unwrap();
    ScratchDb { pool, dir }
}

#[tokio::test]
async fn scratch_db_is_removed_on_drop() {
    let scratch = scratch_db().await;
    sqlx::query("INSERT INTO users (email, balance) VALUES ('a@example.org', 1)")
        .execute(&scratch.pool)
        .await
        .unwrap();
    let dir = scratch.dir.clone();
    assert!(dir.join("camps.db").exists());

    scratch.pool.close().await;
    drop(scratch);
    assert!(!dir.exists());
}
