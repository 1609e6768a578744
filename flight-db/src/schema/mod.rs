use anyhow::{Context as _, Result};
use turso::Connection;

const SCHEMA: &str = include_str!("schema.sql");

/// Apply the schema to the database.
///
/// The DDL uses `IF NOT EXISTS`, so this is safe to call on every run,
/// whether or not the database file existed beforehand.
///
/// Really we want a proper migration format, but a single-table loader doesn't justify one.
pub async fn apply_schema(connection: &Connection) -> Result<()> {
    connection
        .execute(SCHEMA, ())
        .await
        .context("applying schema")?;
    Ok(())
}
