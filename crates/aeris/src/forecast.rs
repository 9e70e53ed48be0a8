//! Lifecycle of the per-day forecast entities and dispatch of daily summaries.

use chrono::Datelike;
use std::collections::BTreeSet;

use crate::aggregate::DailySummary;
use crate::drivers::DriverSink;
use crate::et0::{reference_et0, Et0Input};
use crate::registry::EntityRegistry;
use crate::units::FieldTagMap;
use crate::weather_codes;

/// Upper bound on the forecast horizon, in days.
pub const MAX_FORECAST_DAYS: usize = 6;

pub const FORECAST_PREFIX: &str = "forecast_";

pub fn forecast_address(day: usize) -> String {
    format!("{}{}", FORECAST_PREFIX, day)
}

fn forecast_title(day: usize) -> String {
    format!("Forecast {}", day)
}

/// Parse the day index out of a `forecast_<n>` address.
pub fn day_index(address: &str) -> Option<usize> {
    address.strip_prefix(FORECAST_PREFIX)?.parse().ok()
}

/// Clamp a configured horizon into `0..=MAX_FORECAST_DAYS`.
pub fn effective_horizon(configured: i64) -> usize {
    configured.clamp(0, MAX_FORECAST_DAYS as i64) as usize
}

/// Entities to create and delete to match a horizon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub to_create: BTreeSet<usize>,
    pub to_delete: BTreeSet<usize>,
}

/// Compare existing day indices with the valid range `[0, horizon)`.
pub fn reconcile(configured_days: i64, existing: &BTreeSet<usize>) -> Reconciliation {
    let horizon = effective_horizon(configured_days);
    Reconciliation {
        to_create: (0..horizon).filter(|d| !existing.contains(d)).collect(),
        to_delete: existing.iter().copied().filter(|d| *d >= horizon).collect(),
    }
}

/// Bring the registry in line with the horizon.
///
/// Failures on one index are logged and the remaining indices still processed.
pub fn apply_reconciliation(registry: &mut dyn EntityRegistry, configured_days: i64) -> Reconciliation {
    let existing: BTreeSet<usize> = registry
        .list_by_prefix(FORECAST_PREFIX)
        .iter()
        .filter_map(|a| day_index(a))
        .collect();
    let plan = reconcile(configured_days, &existing);

    for day in &plan.to_delete {
        let address = forecast_address(*day);
        if let Err(e) = registry.delete(&address) {
            log::debug!("Failed to delete node {}: {}", address, e);
        }
    }
    for day in &plan.to_create {
        let address = forecast_address(*day);
        if let Err(e) = registry.create(&address, &forecast_title(*day)) {
            log::error!("Failed to create forecast node {}: {}", address, e);
        }
    }
    plan
}

/// Per-cycle context handed to every forecast entity.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    /// Last latitude seen in an observation, if any.
    pub latitude: Option<f64>,
    pub elevation: f64,
    pub plant_type: f64,
    pub tags: &'a FieldTagMap,
    /// First update after start: report every driver.
    pub force: bool,
}

/// Write one day's summary to a forecast entity's drivers.
pub fn dispatch(summary: &DailySummary, ctx: &DispatchContext<'_>, sink: &mut dyn DriverSink) {
    let mut set = |driver: &str, value: Option<f64>| {
        if let Some(v) = value {
            sink.set_value(driver, v);
        }
    };

    // Sunday = 0
    set(
        "GV19",
        summary
            .date
            .map(|d| f64::from(d.weekday().num_days_from_sunday())),
    );
    set("GV0", summary.temp_max);
    set("GV1", summary.temp_min);
    set("GV2", summary.humidity_max);
    set("GV3", summary.humidity_min);
    set("BARPRES", summary.pressure);
    set("SPEED", summary.wind_speed);
    set("GV14", summary.cloud_cover);
    set("GV6", summary.precipitation);
    set("GV18", summary.pop);
    set("UV", summary.uv);

    if let Some(coded) = summary.weather_coded.as_deref() {
        match weather_codes::decode(coded) {
            Ok(codes) => {
                set("GV11", Some(f64::from(codes.coverage)));
                set("GV12", Some(f64::from(codes.intensity)));
                set("GV13", Some(f64::from(codes.condition)));
            }
            Err(e) => log::debug!("Forecast weather code skipped: {}", e),
        }
    }

    set("GV20", evapotranspiration(summary, ctx));

    if ctx.force {
        sink.report_all();
    }
}

fn evapotranspiration(summary: &DailySummary, ctx: &DispatchContext<'_>) -> Option<f64> {
    let Some(latitude) = ctx.latitude else {
        log::debug!("No latitude yet, skipping ET0");
        return None;
    };
    let input = Et0Input {
        temp_max: summary.temp_max?,
        temp_min: summary.temp_min?,
        humidity_max: summary.humidity_max?,
        humidity_min: summary.humidity_min?,
        wind_speed: summary.wind_speed?,
        latitude,
        elevation: ctx.elevation,
        day_of_year: summary.date?.ordinal(),
        albedo: ctx.plant_type,
        units: ctx.tags.units(),
    };
    Some(reference_et0(&input))
}
