use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema steps in order; entry `n` moves `user_version` from `n` to `n + 1`.
const SCHEMA_STEPS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

const CURRENT_SCHEMA_VERSION: i32 = SCHEMA_STEPS.len() as i32;

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("cannot read user_version")?;
    if found > CURRENT_SCHEMA_VERSION {
        bail!("store schema v{found} is newer than this build (v{CURRENT_SCHEMA_VERSION})");
    }

    for (index, step) in SCHEMA_STEPS.iter().enumerate().skip(found as usize) {
        let target = index as i32 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(step)
            .with_context(|| format!("schema step to v{target} failed"))?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)
            .unwrap();
        assert!(run_migrations(&mut conn).is_err());
    }
}
