//! AERIS weather node for Bubbaloop.
//!
//! Polls the AERIS API and reports:
//! - Current conditions on the controller node (short poll)
//! - One daily summary per `forecast_<n>` node (long poll)
//!
//! Provider keys depend on the selected unit system and are resolved through
//! [`units::FieldTagMap`]. Missing or malformed fields only skip the affected
//! driver.

pub mod aggregate;
pub mod client;
pub mod config;
pub mod controller;
pub mod drivers;
pub mod error;
pub mod et0;
pub mod forecast;
pub mod observation;
pub mod params;
pub mod registry;
pub mod runner;
pub mod units;
pub mod weather_codes;

pub use client::{AerisClient, Endpoint, QueryParams, WeatherFetcher};
pub use config::{load_config, load_config_or_default, parse_config, NodeConfig};
pub use controller::{AerisController, Command};
pub use drivers::{DriverSink, DriverTable, DriverValue};
pub use error::{AerisError, Result};
pub use registry::{EntityRegistry, MemoryRegistry};
pub use units::{Field, FieldTagMap, UnitSystem};
