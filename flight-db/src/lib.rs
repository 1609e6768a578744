//! Load flight-listing CSV data into a local SQLite-format database.
//!
//! The whole program is one linear sequence over a single connection:
//! open the store, ensure the `flights` table exists, insert the file's
//! rows one by one, wipe the table, then load the same rows again as one
//! batch. The batched load is the authoritative one; the row-by-row pass
//! exists to mirror the original loading procedure.

mod loader;
mod model;
mod schema;

pub use loader::Loader;
pub use model::{Flight, FlightId};
pub use schema::apply_schema;
