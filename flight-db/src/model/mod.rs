mod flight;

pub use flight::{Flight, FlightId};

use anyhow::{Context as _, Result};
use turso::Row;

fn parse_id<Id>(row: &Row, column: usize) -> Result<Id>
where
    Id: From<u32>,
{
    let id = row
        .get::<u32>(column)
        .context("parse_id: getting value from row")?;
    Ok(id.into())
}
