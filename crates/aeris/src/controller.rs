//! The controller node: owns configuration and drives the poll cycle.
//!
//! A short poll refreshes current conditions on the controller's own
//! drivers. A long poll fetches the forecast and hands one daily summary to
//! each `forecast_<n>` entity. Nothing is fetched while a required parameter
//! is unset.

use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::aggregate::{self, ForecastInterval};
use crate::client::{Endpoint, QueryParams, WeatherFetcher};
use crate::drivers::{DriverSink, DriverTable};
use crate::error::{AerisError, Result};
use crate::forecast::{self, DispatchContext};
use crate::observation::{self, ExtractionReport, PrecipSource};
use crate::params::{self, Parameters};
use crate::registry::{EntityRegistry, MemoryRegistry};
use crate::units::{display_units, FieldTagMap, NodeProfile, UnitSystem};

/// Address of the controller's own driver table.
pub const CONTROLLER_ADDRESS: &str = "controller";

/// Everything derived from the unit system. Replaced as a whole on change.
#[derive(Debug, Clone)]
pub struct UnitTables {
    pub tags: FieldTagMap,
    pub controller_uom: BTreeMap<&'static str, u32>,
    pub forecast_uom: BTreeMap<&'static str, u32>,
}

impl UnitTables {
    pub fn new(units: UnitSystem) -> Self {
        Self {
            tags: FieldTagMap::resolve(units),
            controller_uom: display_units(units, NodeProfile::Controller),
            forecast_uom: display_units(units, NodeProfile::Forecast),
        }
    }

    pub fn units(&self) -> UnitSystem {
        self.tags.units()
    }
}

/// Host commands accepted by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RemoveNoticesAll,
    /// Re-report every driver of every entity.
    Query,
}

impl FromStr for Command {
    type Err = AerisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remove_notices_all" => Ok(Command::RemoveNoticesAll),
            "query" => Ok(Command::Query),
            other => Err(AerisError::Parse(format!("unknown command '{}'", other))),
        }
    }
}

pub struct AerisController<F, R = MemoryRegistry> {
    fetcher: F,
    registry: R,
    params: Parameters,
    tables: UnitTables,
    drivers: DriverTable,
    interval: ForecastInterval,
    /// Last latitude reported by an observation. Kept across cycles until a
    /// newer one arrives.
    latitude: Option<f64>,
    /// Set until the first full update after start has been dispatched.
    force: bool,
    notices: Vec<String>,
}

impl<F: WeatherFetcher, R: EntityRegistry> AerisController<F, R> {
    pub fn new(params: Parameters, fetcher: F, registry: R, interval: ForecastInterval) -> Self {
        let units = params.units().unwrap_or_default();
        Self {
            fetcher,
            registry,
            params,
            tables: UnitTables::new(units),
            drivers: DriverTable::new(),
            interval,
            latitude: None,
            force: true,
            notices: Vec::new(),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub async fn start(&mut self) {
        log::info!("Starting node server");
        self.check_params();
        if let Err(e) = self.install_units() {
            log::warn!("{}", e);
            self.notices.push(e.to_string());
        }
        self.drivers.set_value("ST", 1.0);

        self.discover();

        // initial query to get filled in as soon as possible
        if self.is_configured() {
            self.query_conditions().await;
            self.query_forecast().await;
            self.force = false;
        }
        log::info!("Node server started");
    }

    /// Long polls refresh the forecast, short polls the current conditions.
    pub async fn poll(&mut self, long: bool) {
        if long {
            self.query_forecast().await;
        } else {
            self.query_conditions().await;
        }
    }

    /// Reset notices from the current parameters and limit the horizon.
    pub fn check_params(&mut self) {
        self.notices.clear();
        if self.params.is_configured() {
            log::debug!("All required parameters are set");
            self.params.clamp_forecast_days();
        } else {
            log::info!("User configuration required");
            self.notices = self
                .params
                .active_notices()
                .into_iter()
                .map(str::to_string)
                .collect();
        }
    }

    /// Merge a parameter update from the host.
    pub fn on_parameters(&mut self, incoming: &BTreeMap<String, Value>) {
        let previous_units = self.params.get(params::UNITS).to_string();
        let previous_days = self.params.forecast_days();
        if !self.params.update(incoming) {
            log::debug!("Parameters unchanged");
            return;
        }

        let configured = self.params.is_configured();
        if configured {
            self.notices.clear();
        } else {
            self.check_params();
        }

        if self.params.get(params::UNITS) != previous_units {
            if let Err(e) = self.install_units() {
                log::warn!("{}", e);
                self.notices.push(e.to_string());
            }
        }

        let days_changed = self.params.forecast_days() != previous_days;
        if configured && (self.params.is_set(params::FORECAST_DAYS) || days_changed) {
            self.discover();
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::RemoveNoticesAll => self.notices.clear(),
            Command::Query => self.query(),
        }
    }

    /// Mark every driver of every entity for reporting.
    pub fn query(&mut self) {
        self.drivers.report_all();
        for address in self.registry.list_by_prefix("") {
            if let Some(sink) = self.registry.drivers(&address) {
                sink.report_all();
            }
        }
    }

    /// Create and delete forecast entities to match the horizon, then give
    /// every entity the active unit codes.
    pub fn discover(&mut self) {
        log::info!("In discovery...");
        forecast::apply_reconciliation(&mut self.registry, self.params.forecast_days());
        self.apply_uom();
    }

    /// Swap in the tables for the configured unit system.
    ///
    /// An unknown unit leaves the previous tables in place.
    fn install_units(&mut self) -> Result<()> {
        let units = self.params.units()?;
        log::info!("Configure driver units to {}", units);
        self.tables = UnitTables::new(units);
        self.apply_uom();
        Ok(())
    }

    fn apply_uom(&mut self) {
        self.drivers.set_uom(&self.tables.controller_uom);
        for address in self.registry.list_by_prefix(forecast::FORECAST_PREFIX) {
            if let Some(sink) = self.registry.drivers(&address) {
                sink.set_uom(&self.tables.forecast_uom);
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    fn query_params(&self) -> QueryParams {
        QueryParams {
            location: self.params.get(params::LOCATION).to_string(),
            client_id: self.params.get(params::CLIENT_ID).to_string(),
            client_secret: self.params.get(params::CLIENT_SECRET).to_string(),
            limit: forecast::effective_horizon(self.params.forecast_days()),
            interval: self.interval,
        }
    }

    /// Refresh current conditions and precipitation.
    ///
    /// The summary query runs even when the observation query failed.
    pub async fn query_conditions(&mut self) -> Option<ExtractionReport> {
        if !self.is_configured() {
            log::info!("Skipping connection because we aren't configured yet");
            return None;
        }
        let query = self.query_params();
        let tags = self.tables.tags;

        let report = match self.fetcher.fetch(Endpoint::Observations, &query).await {
            Ok(raw) => match observation::extract(&raw, &tags, &mut self.drivers) {
                Ok(report) => Some(report),
                Err(e) => {
                    log::error!("Current observation update failure: {}", e);
                    None
                }
            },
            Err(e) => {
                log::error!("Current condition query failed: {}", e);
                None
            }
        };

        if let Some(report) = &report {
            log::debug!(
                "Observation: {} fields updated, {} skipped",
                report.extracted.len(),
                report.failed.len()
            );
            if let Some(lat) = report.latitude {
                self.latitude = Some(lat);
            }
        }

        let summary = match self.fetcher.fetch(Endpoint::PrecipSummary, &query).await {
            Ok(raw) => Some(raw),
            Err(e) => {
                log::error!("Precipitation summary query failed: {}", e);
                None
            }
        };
        let fallback = report.as_ref().and_then(|r| r.precipitation);
        match observation::merge_precip_summary(summary.as_ref(), &tags, fallback, &mut self.drivers)
        {
            PrecipSource::Summary(v) => log::debug!("Precipitation from summary: {}", v),
            PrecipSource::Observation(v) => log::debug!("Precipitation from observation: {}", v),
            PrecipSource::Unavailable => {}
        }

        if self.force {
            self.drivers.report_all();
        }
        report
    }

    /// Fetch the forecast and dispatch one summary per forecast entity.
    ///
    /// Returns the number of days dispatched.
    pub async fn query_forecast(&mut self) -> usize {
        if !self.is_configured() {
            log::info!("Skipping connection because we aren't configured yet");
            return 0;
        }
        let horizon = forecast::effective_horizon(self.params.forecast_days());
        if horizon == 0 {
            log::debug!("Forecast disabled");
            return 0;
        }

        let raw = match self
            .fetcher
            .fetch(Endpoint::Forecasts, &self.query_params())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Forecast query failed: {}", e);
                return 0;
            }
        };
        let periods = match observation::response_envelope(&raw)
            .map(|r| r.get("periods").and_then(Value::as_array))
        {
            Ok(Some(periods)) => periods,
            Ok(None) => {
                log::error!("Forecast data failure: no periods in response");
                return 0;
            }
            Err(e) => {
                log::error!("Forecast data failure: {}", e);
                return 0;
            }
        };
        log::debug!("Processing periods: {}", periods.len());

        let summaries = aggregate::aggregate(periods, self.interval, &self.tables.tags);
        let ctx = DispatchContext {
            latitude: self.latitude,
            elevation: self.params.elevation(),
            plant_type: self.params.plant_type(),
            tags: &self.tables.tags,
            force: self.force,
        };

        let mut dispatched = 0;
        // surplus days beyond the horizon are dropped
        for (day, summary) in summaries.iter().enumerate().take(horizon) {
            let address = forecast::forecast_address(day);
            match self.registry.drivers(&address) {
                Some(sink) => {
                    forecast::dispatch(summary, &ctx, sink);
                    dispatched += 1;
                }
                None => log::warn!("No forecast node {}", address),
            }
        }
        dispatched
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Required parameters are all set. Checked at the start of every query.
    pub fn is_configured(&self) -> bool {
        self.params.is_configured()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    pub fn units(&self) -> UnitSystem {
        self.tables.units()
    }

    pub fn tables(&self) -> &UnitTables {
        &self.tables
    }

    pub fn drivers(&self) -> &DriverTable {
        &self.drivers
    }

    pub fn drivers_mut(&mut self) -> &mut DriverTable {
        &mut self.drivers
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockFetcher;
    use serde_json::json;

    fn mapping(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn configured_params(days: &str) -> Parameters {
        Parameters::from_map(&mapping(&[
            (params::CLIENT_ID, json!("id")),
            (params::CLIENT_SECRET, json!("secret")),
            (params::LOCATION, json!("minneapolis,mn")),
            (params::FORECAST_DAYS, json!(days)),
        ]))
    }

    fn controller(params: Parameters) -> AerisController<MockFetcher> {
        AerisController::new(
            params,
            MockFetcher::new(),
            MemoryRegistry::new(),
            ForecastInterval::Daily,
        )
    }

    #[tokio::test]
    async fn unconfigured_node_never_fetches() {
        let mut node = controller(Parameters::new());
        node.start().await;
        node.poll(false).await;
        node.poll(true).await;

        assert!(node.fetcher().calls().is_empty());
        assert_eq!(node.notices().len(), 3);
        assert!(node.registry().list_by_prefix("forecast_").is_empty());
    }

    #[tokio::test]
    async fn start_creates_forecast_nodes_and_clamps() {
        let mut node = controller(configured_params("9"));
        node.start().await;

        assert_eq!(node.params().get(params::FORECAST_DAYS), "6");
        assert_eq!(node.registry().list_by_prefix("forecast_").len(), 6);
        assert!(node.notices().is_empty());
        assert_eq!(node.drivers().get("ST"), Some(1.0));
    }

    #[tokio::test]
    async fn shrinking_horizon_removes_nodes() {
        let mut node = controller(configured_params("5"));
        node.start().await;
        node.on_parameters(&mapping(&[(params::FORECAST_DAYS, json!("2"))]));

        let remaining = node.registry().list_by_prefix("forecast_");
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains("forecast_1"));
    }

    #[tokio::test]
    async fn unit_change_swaps_tables() {
        let mut node = controller(configured_params("1"));
        node.start().await;
        assert_eq!(node.units(), UnitSystem::Imperial);
        assert_eq!(node.drivers().uom("CLITEMP"), Some(17));

        node.on_parameters(&mapping(&[(params::UNITS, json!("metric"))]));
        assert_eq!(node.units(), UnitSystem::Metric);
        assert_eq!(node.drivers().uom("CLITEMP"), Some(4));
        let day0 = node.registry().get("forecast_0").unwrap();
        assert_eq!(day0.drivers.uom("GV0"), Some(4));
    }

    #[tokio::test]
    async fn invalid_units_keep_previous_tables() {
        let mut node = controller(configured_params("1"));
        node.start().await;
        node.on_parameters(&mapping(&[(params::UNITS, json!("kelvin"))]));

        assert_eq!(node.units(), UnitSystem::Imperial);
        assert!(node.notices().iter().any(|n| n.contains("kelvin")));
    }

    #[tokio::test]
    async fn clearing_a_credential_stops_polling() {
        let mut node = controller(configured_params("0"));
        node.start().await;
        let before = node.fetcher().calls().len();

        node.on_parameters(&mapping(&[(params::CLIENT_SECRET, json!(""))]));
        node.poll(false).await;

        assert_eq!(node.fetcher().calls().len(), before);
        assert_eq!(node.notices(), ["AERIS Client Secret must be set"]);
    }

    #[test]
    fn commands_parse() {
        assert_eq!("QUERY".parse::<Command>().unwrap(), Command::Query);
        assert_eq!(
            "remove_notices_all".parse::<Command>().unwrap(),
            Command::RemoveNoticesAll
        );
        assert!("reboot".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn remove_notices_all_clears() {
        let mut node = controller(Parameters::new());
        node.start().await;
        assert!(!node.notices().is_empty());
        node.handle_command(Command::RemoveNoticesAll);
        assert!(node.notices().is_empty());
    }
}
