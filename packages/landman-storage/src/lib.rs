pub mod credentials;
pub mod db;
pub mod jobs;
pub mod models;
pub mod portals;
pub mod results;
pub mod reviews;
pub mod schema;
pub mod tasks;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
