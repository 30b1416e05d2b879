mod links;
mod lookup;
mod osrm;

pub use links::{directions_url, upi_payment_url};
pub use lookup::FileLookup;
pub use osrm::{OsrmRouter, route_url};
