pub mod postgres;
pub mod venues;

pub use postgres::PgStore;
pub use venues::PgVenueDirectory;
