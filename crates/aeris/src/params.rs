//! Host-supplied node parameters: credentials, location and preferences.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;
use crate::forecast::MAX_FORECAST_DAYS;
use crate::units::UnitSystem;

pub const CLIENT_ID: &str = "ClientID";
pub const CLIENT_SECRET: &str = "ClientSecret";
pub const LOCATION: &str = "Location";
pub const UNITS: &str = "Units";
pub const FORECAST_DAYS: &str = "Forecast Days";
pub const ELEVATION: &str = "Elevation";
pub const PLANT_TYPE: &str = "Plant Type";

const UNSET: &str = "set me";
const DEFAULT_PLANT_TYPE: f64 = 0.23;

/// Definition of a single parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamDef {
    pub name: &'static str,
    pub default: &'static str,
    pub required: bool,
    /// Shown to the user while a required parameter is unset.
    pub notice: &'static str,
}

pub const PARAMETERS: &[ParamDef] = &[
    ParamDef {
        name: CLIENT_ID,
        default: UNSET,
        required: true,
        notice: "AERIS Client ID must be set",
    },
    ParamDef {
        name: CLIENT_SECRET,
        default: UNSET,
        required: true,
        notice: "AERIS Client Secret must be set",
    },
    ParamDef {
        name: LOCATION,
        default: UNSET,
        required: true,
        notice: "AERIS location must be set",
    },
    ParamDef {
        name: UNITS,
        default: "imperial",
        required: false,
        notice: "",
    },
    ParamDef {
        name: FORECAST_DAYS,
        default: "0",
        required: false,
        notice: "",
    },
    ParamDef {
        name: ELEVATION,
        default: "0",
        required: false,
        notice: "",
    },
    ParamDef {
        name: PLANT_TYPE,
        default: "0.23",
        required: false,
        notice: "",
    },
];

fn definition(name: &str) -> Option<&'static ParamDef> {
    PARAMETERS.iter().find(|p| p.name == name)
}

/// Render a host value as parameter text. Numbers and booleans are accepted
/// alongside strings; null clears the parameter.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Current parameter values, always holding an entry for every known name.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    values: BTreeMap<&'static str, String>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            values: PARAMETERS
                .iter()
                .map(|p| (p.name, p.default.to_string()))
                .collect(),
        }
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a host mapping on top of the defaults.
    pub fn from_map(incoming: &BTreeMap<String, Value>) -> Self {
        let mut params = Self::default();
        params.update(incoming);
        params
    }

    /// Merge a host mapping. Unknown names are ignored.
    ///
    /// Returns true if any stored value changed.
    pub fn update(&mut self, incoming: &BTreeMap<String, Value>) -> bool {
        let mut changed = false;
        for (name, value) in incoming {
            let Some(def) = definition(name) else {
                log::debug!("Ignoring unknown parameter {}", name);
                continue;
            };
            let text = value_to_text(value);
            if self.values.get(def.name) != Some(&text) {
                self.values.insert(def.name, text);
                changed = true;
            }
        }
        changed
    }

    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        if let Some(def) = definition(name) {
            self.values.insert(def.name, value.into());
        }
    }

    /// A parameter is set when it is non-empty and differs from its default.
    pub fn is_set(&self, name: &str) -> bool {
        let Some(def) = definition(name) else {
            return false;
        };
        let value = self.get(name);
        !value.is_empty() && value != def.default
    }

    pub fn is_configured(&self) -> bool {
        PARAMETERS
            .iter()
            .filter(|p| p.required)
            .all(|p| self.is_set(p.name))
    }

    pub fn active_notices(&self) -> Vec<&'static str> {
        PARAMETERS
            .iter()
            .filter(|p| p.required && !self.is_set(p.name))
            .map(|p| p.notice)
            .collect()
    }

    pub fn units(&self) -> Result<UnitSystem> {
        self.get(UNITS).parse()
    }

    /// Configured horizon. Unparsable text counts as zero days.
    pub fn forecast_days(&self) -> i64 {
        self.get(FORECAST_DAYS).parse().unwrap_or(0)
    }

    /// Station elevation in metres.
    pub fn elevation(&self) -> f64 {
        self.get(ELEVATION).parse().unwrap_or(0.0)
    }

    pub fn plant_type(&self) -> f64 {
        self.get(PLANT_TYPE)
            .parse()
            .unwrap_or(DEFAULT_PLANT_TYPE)
    }

    /// Limit the stored horizon to what the provider serves.
    ///
    /// Returns true if the value was rewritten.
    pub fn clamp_forecast_days(&mut self) -> bool {
        if self.forecast_days() > MAX_FORECAST_DAYS as i64 {
            log::warn!(
                "Number of days of forecast data is limited to {} days",
                MAX_FORECAST_DAYS
            );
            self.set(FORECAST_DAYS, MAX_FORECAST_DAYS.to_string());
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn configured() -> Parameters {
        Parameters::from_map(&mapping(&[
            (CLIENT_ID, json!("abc")),
            (CLIENT_SECRET, json!("xyz")),
            (LOCATION, json!("44.9,-93.2")),
        ]))
    }

    #[test]
    fn defaults_are_not_configured() {
        let params = Parameters::new();
        assert!(!params.is_configured());
        assert_eq!(params.active_notices().len(), 3);
        assert_eq!(params.get(UNITS), "imperial");
    }

    #[test]
    fn configured_requires_all_three() {
        assert!(configured().is_configured());

        for missing in [CLIENT_ID, CLIENT_SECRET, LOCATION] {
            let mut params = configured();
            params.set(missing, "");
            assert!(!params.is_configured(), "{} empty", missing);
            params.set(missing, UNSET);
            assert!(!params.is_configured(), "{} default", missing);
            assert_eq!(params.active_notices().len(), 1);
        }
    }

    #[test]
    fn optional_parameters_do_not_affect_configured() {
        let mut params = configured();
        params.set(UNITS, "");
        params.set(FORECAST_DAYS, "junk");
        params.set(PLANT_TYPE, "");
        assert!(params.is_configured());
    }

    #[test]
    fn update_reports_changes() {
        let mut params = configured();
        assert!(!params.update(&mapping(&[(CLIENT_ID, json!("abc"))])));
        assert!(params.update(&mapping(&[(FORECAST_DAYS, json!(3))])));
        assert_eq!(params.forecast_days(), 3);
        assert!(!params.update(&mapping(&[("Bogus", json!("1"))])));
    }

    #[test]
    fn typed_accessors_fall_back() {
        let mut params = configured();
        params.set(FORECAST_DAYS, "many");
        params.set(PLANT_TYPE, "grass");
        params.set(ELEVATION, "312.5");
        assert_eq!(params.forecast_days(), 0);
        assert_eq!(params.plant_type(), 0.23);
        assert_eq!(params.elevation(), 312.5);
    }

    #[test]
    fn unknown_units_is_an_error() {
        let mut params = configured();
        params.set(UNITS, "kelvin");
        assert!(params.units().is_err());
        params.set(UNITS, "metric");
        assert_eq!(params.units().unwrap(), UnitSystem::Metric);
    }

    #[test]
    fn horizon_clamped_to_six() {
        let mut params = configured();
        params.set(FORECAST_DAYS, "10");
        assert!(params.clamp_forecast_days());
        assert_eq!(params.get(FORECAST_DAYS), "6");
        assert!(!params.clamp_forecast_days());
    }
}
