use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Transaction};

const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Brings the images table up to the current schema. With `reset`, the table
/// and its version marker are dropped first so the schema is rebuilt empty.
pub fn ensure_schema(conn: &mut Connection, reset: bool) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to open schema transaction")?;

    if reset {
        tx.execute_batch("DROP TABLE IF EXISTS images;")
            .context("failed to drop images table")?;
        tx.pragma_update(None, "user_version", 0)
            .context("failed to reset user_version pragma")?;
    }

    let mut version: i32 = tx
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit schema")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => {
            tx.execute_batch(include_str!("schemas/schema_v1.sql"))
                .context("failed to execute schema_v1.sql")?;
            Ok(())
        }
        _ => bail!("unknown migration target version: {version}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))
            .unwrap()
    }

    fn insert_dummy(conn: &Connection) {
        conn.execute(
            "INSERT INTO images (image_uuid, image_start_time, image_filename, image_valid)
             VALUES ('a', '2024-01-01T00:00:00.000000Z', '/tmp/a.jpg', 0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn, false).unwrap();
        insert_dummy(&conn);
        ensure_schema(&mut conn, false).unwrap();
        assert_eq!(row_count(&conn), 1);
    }

    #[test]
    fn reset_drops_existing_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn, false).unwrap();
        insert_dummy(&conn);
        ensure_schema(&mut conn, true).unwrap();
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn newer_database_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)
            .unwrap();
        assert!(ensure_schema(&mut conn, false).is_err());
    }
}
