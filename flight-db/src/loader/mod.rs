use std::{fs::File, path::Path};

use anyhow::{Context as _, Result, anyhow};
use log::debug;
use turso::Connection;

use crate::{Flight, schema};

/// Brings the contents of a flight-listing CSV file into the `flights` table.
///
/// Owns the single connection to the store for the lifetime of the program.
/// Each operation commits independently, so a failure between operations
/// leaves the table in whatever state the last committed operation produced.
#[derive(Debug)]
pub struct Loader {
    connection: Connection,
}

impl Loader {
    /// Open (creating if necessary) the database file at `db_path`.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = std::path::absolute(db_path).context("absolutizing path")?;

        // ensure parent path exists
        let parent = db_path
            .parent()
            .ok_or(anyhow!("cannot use `/` as the db"))?;
        std::fs::create_dir_all(parent).context("creating db parent dir")?;

        let db_path = db_path
            .to_str()
            .context("db_path could not be represented as unicode")?;
        let database = turso::Builder::new_local(db_path)
            .build()
            .await
            .context("building database")?;
        let connection = database.connect().context("connecting to database")?;

        Ok(Self { connection })
    }

    /// Create the `flights` table if it does not already exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        schema::apply_schema(&self.connection)
            .await
            .context("Loader::ensure_schema: applying schema")
    }

    /// Insert the rows of the CSV file at `path` one statement at a time.
    ///
    /// The header line is skipped. All rows go into a single transaction
    /// which commits after the last row, so a malformed row or an id
    /// collision fails the whole operation and leaves the table untouched
    /// by this pass.
    ///
    /// Returns the number of rows inserted.
    pub async fn load_rows_individually(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut reader = open_csv(path.as_ref())?;

        self.begin().await?;
        let result = self.insert_one_by_one(&mut reader).await;
        let inserted = self.commit_or_rollback(result).await?;

        debug!("count" = inserted; "loaded flights row by row");

        Ok(inserted)
    }

    async fn insert_one_by_one(&self, reader: &mut csv::Reader<File>) -> Result<usize> {
        let mut inserted = 0;
        for record in reader.records() {
            let record = record.context("reading csv record")?;
            // line 1 is the header, so data line n is file line n + 1
            let flight = Flight::from_record(&record)
                .with_context(|| format!("parsing csv line {}", inserted + 2))?;
            flight
                .insert(&self.connection)
                .await
                .context("inserting flight row")?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Remove every row from the table unconditionally.
    ///
    /// A single autocommitted statement, so the deletion is durable as soon
    /// as this returns. Returns the number of rows removed.
    pub async fn clear_table(&self) -> Result<usize> {
        let deleted = Flight::delete_all(&self.connection)
            .await
            .context("Loader::clear_table: deleting rows")?;

        debug!("count" = deleted; "cleared the flights table");

        Ok(deleted)
    }

    /// Read the whole CSV file at `path` into memory, then submit every row
    /// as one batched insertion committed as a single transaction.
    ///
    /// Returns the number of rows inserted.
    pub async fn load_rows_batched(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut reader = open_csv(path.as_ref())?;

        let mut flights = Vec::new();
        for record in reader.records() {
            let record = record.context("reading csv record")?;
            let flight = Flight::from_record(&record)
                .with_context(|| format!("parsing csv line {}", flights.len() + 2))?;
            flights.push(flight);
        }

        self.begin().await?;
        let result = Flight::insert_all(&self.connection, &flights).await;
        let inserted = self.commit_or_rollback(result).await?;

        debug!("count" = inserted; "bulk loaded flights");

        Ok(inserted)
    }

    /// Release the connection to the store.
    pub fn close(self) {
        drop(self.connection);
    }

    async fn begin(&self) -> Result<()> {
        self.connection
            .execute("BEGIN", ())
            .await
            .context("beginning transaction")?;
        Ok(())
    }

    /// Commit on success; on failure roll back best-effort and surface the
    /// original error.
    async fn commit_or_rollback<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.connection
                    .execute("COMMIT", ())
                    .await
                    .context("committing transaction")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.connection.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }
}

fn open_csv(path: &Path) -> Result<csv::Reader<File>> {
    // the csv reader treats the first line as a header and skips it by default
    csv::Reader::from_path(path).with_context(|| format!("opening csv file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::FlightId;

    const SAMPLE_CSV: &str = "\
id,airline,flight,source_city,departure_time,stops,arrival_time,destination_city,class,duration,days_left,price
1,AI,AI101,Delhi,Morning,0,Afternoon,Mumbai,Economy,2.5,10,4500
2,AI,AI102,Mumbai,Evening,1,Night,Delhi,Economy,3.0,5,5200
3,AI,AI103,Delhi,Night,0,Morning,Bangalore,Business,2.0,20,12000
";

    struct Fixture {
        // tempdir removes itself on drop, so hold it for the test's lifetime
        _dir: TempDir,
        loader: Loader,
        csv_path: PathBuf,
    }

    fn fixture(csv: &str) -> Fixture {
        let dir = tempfile::tempdir().expect("creating temp dir");
        let csv_path = dir.path().join("flights.csv");
        std::fs::write(&csv_path, csv).expect("writing csv fixture");

        let loader =
            smol::block_on(Loader::open(dir.path().join("flights.db"))).expect("opening loader");
        smol::block_on(loader.ensure_schema()).expect("applying schema");

        Fixture {
            _dir: dir,
            loader,
            csv_path,
        }
    }

    impl Fixture {
        /// Run the whole program sequence: individual pass, wipe, batched pass.
        fn full_run(&self) {
            smol::block_on(async {
                self.loader
                    .load_rows_individually(&self.csv_path)
                    .await
                    .expect("row-by-row load");
                self.loader.clear_table().await.expect("clearing table");
                self.loader
                    .load_rows_batched(&self.csv_path)
                    .await
                    .expect("batched load");
            });
        }

        fn count(&self) -> usize {
            smol::block_on(Flight::count(self.loader.connection())).expect("counting rows")
        }
    }

    impl Loader {
        fn connection(&self) -> &Connection {
            &self.connection
        }
    }

    #[test]
    fn full_run_loads_one_row_per_data_line() {
        let fixture = fixture(SAMPLE_CSV);
        fixture.full_run();

        assert_eq!(fixture.count(), 3);

        let flight = smol::block_on(Flight::load(
            fixture.loader.connection(),
            FlightId::from(1),
        ))
        .expect("row 1 exists");
        assert_eq!(flight.airline(), "AI");
        assert_eq!(flight.flight(), "AI101");
        assert_eq!(flight.source_city(), "Delhi");
        assert_eq!(flight.departure_time(), "Morning");
        assert_eq!(flight.stops(), "0");
        assert_eq!(flight.arrival_time(), "Afternoon");
        assert_eq!(flight.destination_city(), "Mumbai");
        assert_eq!(flight.class(), "Economy");
        assert_eq!(flight.duration(), 2.5);
        assert_eq!(flight.days_left(), 10);
        assert_eq!(flight.price(), 4500);

        let ids: Vec<_> = smol::block_on(Flight::load_all(fixture.loader.connection()))
            .expect("loading all rows")
            .into_keys()
            .collect();
        assert_eq!(ids, vec![1.into(), 2.into(), 3.into()]);
    }

    #[test]
    fn table_is_empty_between_clear_and_batched_load() {
        let fixture = fixture(SAMPLE_CSV);

        smol::block_on(async {
            let inserted = fixture
                .loader
                .load_rows_individually(&fixture.csv_path)
                .await
                .expect("row-by-row load");
            assert_eq!(inserted, 3);

            let deleted = fixture.loader.clear_table().await.expect("clearing table");
            assert_eq!(deleted, 3);
        });

        assert_eq!(fixture.count(), 0);
    }

    #[test]
    fn rerunning_replaces_prior_contents() {
        let fixture = fixture(SAMPLE_CSV);
        fixture.full_run();

        // row 1 is gone from the new file; row 4 is new
        let second_csv = "\
id,airline,flight,source_city,departure_time,stops,arrival_time,destination_city,class,duration,days_left,price
2,AI,AI102,Mumbai,Evening,1,Night,Delhi,Economy,3.0,5,5200
4,6E,6E204,Chennai,Morning,0,Afternoon,Kolkata,Economy,2.2,7,3900
";
        std::fs::write(&fixture.csv_path, second_csv).expect("rewriting csv fixture");
        fixture.full_run();

        let ids: Vec<_> = smol::block_on(Flight::load_all(fixture.loader.connection()))
            .expect("loading all rows")
            .into_keys()
            .collect();
        assert_eq!(ids, vec![2.into(), 4.into()]);
    }

    #[test]
    fn full_runs_are_idempotent() {
        let fixture = fixture(SAMPLE_CSV);
        fixture.full_run();
        let first = smol::block_on(Flight::load_all(fixture.loader.connection()))
            .expect("loading all rows");

        fixture.full_run();
        let second = smol::block_on(Flight::load_all(fixture.loader.connection()))
            .expect("loading all rows");

        assert_eq!(first, second);
    }

    #[test]
    fn non_numeric_price_fails_the_pass_and_rolls_back() {
        let bad_csv = "\
id,airline,flight,source_city,departure_time,stops,arrival_time,destination_city,class,duration,days_left,price
1,AI,AI101,Delhi,Morning,0,Afternoon,Mumbai,Economy,2.5,10,4500
2,AI,AI102,Mumbai,Evening,1,Night,Delhi,Economy,3.0,5,cheap
";
        let fixture = fixture(bad_csv);

        let err = smol::block_on(fixture.loader.load_rows_individually(&fixture.csv_path))
            .expect_err("a non-numeric price must fail the pass");
        assert!(format!("{err:#}").contains("price"));

        // row 1 was inserted before the failure; the rollback must discard it
        assert_eq!(fixture.count(), 0);

        smol::block_on(fixture.loader.load_rows_batched(&fixture.csv_path))
            .expect_err("the batched pass must fail on the same row");
        assert_eq!(fixture.count(), 0);
    }

    #[test]
    fn short_row_fails_the_pass() {
        let bad_csv = "\
id,airline,flight,source_city,departure_time,stops,arrival_time,destination_city,class,duration,days_left,price
1,AI,AI101,Delhi,Morning,0,Afternoon,Mumbai,Economy,2.5,10
";
        let fixture = fixture(bad_csv);

        smol::block_on(fixture.loader.load_rows_individually(&fixture.csv_path))
            .expect_err("a row with a missing field must fail the pass");
        assert_eq!(fixture.count(), 0);
    }

    #[test]
    fn duplicate_id_is_a_constraint_error() {
        let bad_csv = "\
id,airline,flight,source_city,departure_time,stops,arrival_time,destination_city,class,duration,days_left,price
1,AI,AI101,Delhi,Morning,0,Afternoon,Mumbai,Economy,2.5,10,4500
1,AI,AI102,Mumbai,Evening,1,Night,Delhi,Economy,3.0,5,5200
";
        let fixture = fixture(bad_csv);

        smol::block_on(fixture.loader.load_rows_individually(&fixture.csv_path))
            .expect_err("a colliding primary key must fail the pass");
        assert_eq!(fixture.count(), 0);
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let fixture = fixture(SAMPLE_CSV);

        smol::block_on(fixture.loader.ensure_schema()).expect("reapplying schema");
        smol::block_on(fixture.loader.load_rows_batched(&fixture.csv_path))
            .expect("loading after reapplying schema");
        assert_eq!(fixture.count(), 3);
    }

    #[test]
    fn missing_csv_file_fails_before_any_mutation() {
        let fixture = fixture(SAMPLE_CSV);
        let missing = fixture._dir.path().join("no-such-file.csv");

        smol::block_on(fixture.loader.load_rows_individually(&missing))
            .expect_err("a missing input file must fail");
        assert_eq!(fixture.count(), 0);
    }
}
