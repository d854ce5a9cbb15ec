//! Domain types of the map storage subsystem.

mod country;
mod local_file;

pub use country::{
    CountryFile, CountryId, MapOptions, parse_file_name, MAP_FILE_EXTENSION,
    ROUTING_FILE_EXTENSION,
};
pub use local_file::LocalCountryFile;
