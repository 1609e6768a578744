use std::collections::BTreeMap;

use anyhow::{Context as _, Result, ensure};
use csv::StringRecord;
use log::debug;
use turso::{Connection, named_params};

/// Number of fields in one flight listing record.
pub const FIELD_COUNT: usize = 12;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From, derive_more::Into,
)]
pub struct FlightId(u32);

impl turso::params::IntoValue for FlightId {
    fn into_value(self) -> turso::Result<turso::Value> {
        Ok(turso::Value::Integer(self.0.into()))
    }
}

impl log::kv::ToValue for FlightId {
    fn to_value(&self) -> log::kv::Value<'_> {
        self.0.to_value()
    }
}

/// One flight listing, corresponding to one non-header line of the CSV input.
#[derive(Debug, Clone, PartialEq, accessory::Accessors)]
#[access(get, defaults(all(cp)))]
pub struct Flight {
    /// ID of this listing
    id: FlightId,
    /// Carrier name
    #[access(get(cp = false))]
    airline: String,
    /// Flight number/code
    #[access(get(cp = false))]
    flight: String,
    /// Origin city
    #[access(get(cp = false))]
    source_city: String,
    /// Free-form departure time label (e.g. "Morning")
    #[access(get(cp = false))]
    departure_time: String,
    /// Free-form stop count/description
    #[access(get(cp = false))]
    stops: String,
    /// Free-form arrival time label
    #[access(get(cp = false))]
    arrival_time: String,
    /// Destination city
    #[access(get(cp = false))]
    destination_city: String,
    /// Fare class
    #[access(get(cp = false))]
    class: String,
    /// Flight duration in hours
    duration: f64,
    /// Days between booking and departure
    days_left: u32,
    /// Ticket price
    price: u32,
}

// csv impls
impl Flight {
    /// Build a flight from one CSV data record.
    ///
    /// Fields map positionally onto the table columns. Numeric fields are
    /// parsed here rather than handed to the store as text: SQLite's type
    /// affinity would otherwise store a malformed value verbatim instead of
    /// rejecting it.
    pub fn from_record(record: &StringRecord) -> Result<Self> {
        ensure!(
            record.len() == FIELD_COUNT,
            "expected {FIELD_COUNT} fields, got {}",
            record.len()
        );

        let id = record[0]
            .parse::<u32>()
            .with_context(|| format!("Flight::from_record: parsing id ({:?})", &record[0]))?
            .into();
        let duration = record[9]
            .parse()
            .with_context(|| format!("Flight::from_record: parsing duration ({:?})", &record[9]))?;
        let days_left = record[10].parse().with_context(|| {
            format!("Flight::from_record: parsing days_left ({:?})", &record[10])
        })?;
        let price = record[11]
            .parse()
            .with_context(|| format!("Flight::from_record: parsing price ({:?})", &record[11]))?;

        Ok(Self {
            id,
            airline: record[1].to_owned(),
            flight: record[2].to_owned(),
            source_city: record[3].to_owned(),
            departure_time: record[4].to_owned(),
            stops: record[5].to_owned(),
            arrival_time: record[6].to_owned(),
            destination_city: record[7].to_owned(),
            class: record[8].to_owned(),
            duration,
            days_left,
            price,
        })
    }
}

// db impls
impl Flight {
    /// Insert this flight into the DB.
    ///
    /// Not for public use; end-users should use the `Loader` interface instead.
    /// But this implementation supports that one.
    pub(crate) async fn insert(&self, connection: &Connection) -> Result<()> {
        let mut stmt = connection
            .prepare_cached(
                "INSERT INTO flights (
                    id, airline, flight, source_city, departure_time, stops,
                    arrival_time, destination_city, class, duration, days_left, price
                ) VALUES (
                    :id, :airline, :flight, :source_city, :departure_time, :stops,
                    :arrival_time, :destination_city, :class, :duration, :days_left, :price
                )",
            )
            .await
            .context("Flight::insert: preparing statement")?;
        let affected_rows = stmt
            .execute(named_params! {
                ":id": self.id,
                ":airline": self.airline.as_str(),
                ":flight": self.flight.as_str(),
                ":source_city": self.source_city.as_str(),
                ":departure_time": self.departure_time.as_str(),
                ":stops": self.stops.as_str(),
                ":arrival_time": self.arrival_time.as_str(),
                ":destination_city": self.destination_city.as_str(),
                ":class": self.class.as_str(),
                ":duration": self.duration,
                ":days_left": self.days_left,
                ":price": self.price,
            })
            .await
            .context("Flight::insert: executing insert")?;

        debug!("id" = self.id; "inserted flight into the db");
        debug_assert_eq!(affected_rows, 1, "each insert should affect exactly one row");

        Ok(())
    }

    /// Insert a sequence of flights as one batch, reusing a single prepared statement.
    ///
    /// Not for public use; end-users should use the `Loader` interface instead.
    /// But this implementation supports that one.
    pub(crate) async fn insert_all(connection: &Connection, flights: &[Flight]) -> Result<usize> {
        for flight in flights {
            flight
                .insert(connection)
                .await
                .with_context(|| format!("Flight::insert_all: inserting flight {:?}", flight.id))?;
        }

        debug!("count" = flights.len(); "batch inserted flights into the db");

        Ok(flights.len())
    }

    /// Delete every flight row unconditionally.
    ///
    /// Not for public use; end-users should use the `Loader` interface instead.
    /// But this implementation supports that one.
    ///
    /// Returns the number of rows removed.
    pub(crate) async fn delete_all(connection: &Connection) -> Result<usize> {
        let mut stmt = connection
            .prepare_cached("DELETE FROM flights")
            .await
            .context("Flight::delete_all: preparing statement")?;
        let affected_rows = stmt
            .execute(())
            .await
            .context("Flight::delete_all: executing delete")?;

        debug!("count" = affected_rows; "deleted all flights");

        Ok(affected_rows as usize)
    }

    /// Load a flight by its id
    pub async fn load(connection: &Connection, id: FlightId) -> Result<Self> {
        let mut stmt = connection
            .prepare_cached(
                "SELECT airline, flight, source_city, departure_time, stops,
                    arrival_time, destination_city, class, duration, days_left, price
                FROM flights WHERE id = ?",
            )
            .await
            .context("Flight::load: preparing statement")?;
        let row = stmt
            .query_row((id,))
            .await
            .context("Flight::load: loading row")?;

        let flight = Self {
            id,
            airline: row.get(0).context("Flight::load: getting airline")?,
            flight: row.get(1).context("Flight::load: getting flight")?,
            source_city: row.get(2).context("Flight::load: getting source_city")?,
            departure_time: row.get(3).context("Flight::load: getting departure_time")?,
            stops: row.get(4).context("Flight::load: getting stops")?,
            arrival_time: row.get(5).context("Flight::load: getting arrival_time")?,
            destination_city: row
                .get(6)
                .context("Flight::load: getting destination_city")?,
            class: row.get(7).context("Flight::load: getting class")?,
            duration: row.get(8).context("Flight::load: getting duration")?,
            days_left: row.get(9).context("Flight::load: getting days_left")?,
            price: row.get(10).context("Flight::load: getting price")?,
        };

        debug!(id; "loaded a flight by its id");

        Ok(flight)
    }

    /// Load every flight in the table, keyed by id.
    pub async fn load_all(connection: &Connection) -> Result<BTreeMap<FlightId, Self>> {
        let mut stmt = connection
            .prepare_cached(
                "SELECT id, airline, flight, source_city, departure_time, stops,
                    arrival_time, destination_city, class, duration, days_left, price
                FROM flights",
            )
            .await
            .context("Flight::load_all: preparing statement")?;
        let mut rows = stmt
            .query(())
            .await
            .context("Flight::load_all: querying rows")?;

        let mut out = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .context("Flight::load_all: getting next row")?
        {
            let id = super::parse_id(&row, 0).context("Flight::load_all: getting id")?;
            let ejected = out.insert(
                id,
                Self {
                    id,
                    airline: row.get(1).context("Flight::load_all: getting airline")?,
                    flight: row.get(2).context("Flight::load_all: getting flight")?,
                    source_city: row.get(3).context("Flight::load_all: getting source_city")?,
                    departure_time: row
                        .get(4)
                        .context("Flight::load_all: getting departure_time")?,
                    stops: row.get(5).context("Flight::load_all: getting stops")?,
                    arrival_time: row
                        .get(6)
                        .context("Flight::load_all: getting arrival_time")?,
                    destination_city: row
                        .get(7)
                        .context("Flight::load_all: getting destination_city")?,
                    class: row.get(8).context("Flight::load_all: getting class")?,
                    duration: row.get(9).context("Flight::load_all: getting duration")?,
                    days_left: row.get(10).context("Flight::load_all: getting days_left")?,
                    price: row.get(11).context("Flight::load_all: getting price")?,
                },
            );
            debug_assert!(ejected.is_none(), "ids are unique by primary key");
        }

        debug!("count" = out.len(); "loaded all flights");

        Ok(out)
    }

    /// Count the rows currently in the table.
    pub async fn count(connection: &Connection) -> Result<usize> {
        let mut stmt = connection
            .prepare_cached("SELECT count(*) FROM flights")
            .await
            .context("Flight::count: preparing statement")?;
        let row = stmt
            .query_row(())
            .await
            .context("Flight::count: querying count")?;
        let count = row.get::<u32>(0).context("Flight::count: getting count")?;
        Ok(count as usize)
    }
}
