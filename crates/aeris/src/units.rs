//! Unit systems and the logical-field → provider-key mapping.
//!
//! The provider returns every quantity in both unit systems under different
//! keys (`tempC` / `tempF`, ...). The rest of the crate only talks about
//! logical [`Field`]s and resolves them through the active [`FieldTagMap`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AerisError;

/// User-selected unit system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    Metric,
    #[default]
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitSystem {
    type Err = AerisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            other => Err(AerisError::Configuration(format!(
                "unknown unit system '{}', expected 'metric' or 'imperial'",
                other
            ))),
        }
    }
}

/// Provider-independent name of a weather quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
    GustSpeed,
    WindDir,
    Visibility,
    Precipitation,
    Snow,
    SnowFall,
    Dewpoint,
    HeatIndex,
    WindChill,
    FeelsLike,
    SolarRad,
    Sky,
    TempMin,
    TempMax,
    HumidityMin,
    HumidityMax,
    WindMin,
    WindMax,
    WindDirMin,
    WindDirMax,
    Uv,
    Pop,
    Timestamp,
    PrecipSummary,
    WeatherCoded,
    ForecastWeatherCoded,
    DateTime,
}

impl Field {
    pub const ALL: [Field; 31] = [
        Field::Temperature,
        Field::Humidity,
        Field::Pressure,
        Field::WindSpeed,
        Field::GustSpeed,
        Field::WindDir,
        Field::Visibility,
        Field::Precipitation,
        Field::Snow,
        Field::SnowFall,
        Field::Dewpoint,
        Field::HeatIndex,
        Field::WindChill,
        Field::FeelsLike,
        Field::SolarRad,
        Field::Sky,
        Field::TempMin,
        Field::TempMax,
        Field::HumidityMin,
        Field::HumidityMax,
        Field::WindMin,
        Field::WindMax,
        Field::WindDirMin,
        Field::WindDirMax,
        Field::Uv,
        Field::Pop,
        Field::Timestamp,
        Field::PrecipSummary,
        Field::WeatherCoded,
        Field::ForecastWeatherCoded,
        Field::DateTime,
    ];

    /// Logical name as used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
            Field::Pressure => "pressure",
            Field::WindSpeed => "windspeed",
            Field::GustSpeed => "gustspeed",
            Field::WindDir => "winddir",
            Field::Visibility => "visibility",
            Field::Precipitation => "precipitation",
            Field::Snow => "snow",
            Field::SnowFall => "snowf",
            Field::Dewpoint => "dewpoint",
            Field::HeatIndex => "heatindex",
            Field::WindChill => "windchill",
            Field::FeelsLike => "feelslike",
            Field::SolarRad => "solarrad",
            Field::Sky => "sky",
            Field::TempMin => "temp_min",
            Field::TempMax => "temp_max",
            Field::HumidityMin => "humidity_min",
            Field::HumidityMax => "humidity_max",
            Field::WindMin => "wind_min",
            Field::WindMax => "wind_max",
            Field::WindDirMin => "winddir_min",
            Field::WindDirMax => "winddir_max",
            Field::Uv => "uv",
            Field::Pop => "pop",
            Field::Timestamp => "timestamp",
            Field::PrecipSummary => "precip_summary",
            Field::WeatherCoded => "weather_coded",
            Field::ForecastWeatherCoded => "forecast_weather_coded",
            Field::DateTime => "datetime",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable logical-field → provider-key table for one unit system.
///
/// Replaced as a whole when the unit parameter changes, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTagMap {
    units: UnitSystem,
}

impl FieldTagMap {
    pub fn resolve(units: UnitSystem) -> Self {
        Self { units }
    }

    /// Resolve from the raw parameter text.
    pub fn resolve_str(units: &str) -> Result<Self, AerisError> {
        Ok(Self::resolve(units.parse()?))
    }

    pub fn units(&self) -> UnitSystem {
        self.units
    }

    /// Provider JSON key for `field`.
    pub fn get(&self, field: Field) -> &'static str {
        provider_tag(field, self.units)
    }

    /// Every (field, key) pair of this table.
    pub fn entries(&self) -> Vec<(Field, &'static str)> {
        Field::ALL.iter().map(|f| (*f, self.get(*f))).collect()
    }
}

/// Provider key of `field` under `units`.
///
/// The match has no catch-all arm: every field must name its key.
fn provider_tag(field: Field, units: UnitSystem) -> &'static str {
    let by_units = |metric: &'static str, imperial: &'static str| match units {
        UnitSystem::Metric => metric,
        UnitSystem::Imperial => imperial,
    };
    match field {
        Field::Temperature => by_units("tempC", "tempF"),
        Field::Pressure => by_units("pressureMB", "pressureIN"),
        Field::WindSpeed => by_units("windSpeedKPH", "windSpeedMPH"),
        Field::GustSpeed => by_units("windGustKPH", "windGustMPH"),
        Field::Visibility => by_units("visibilityKM", "visibilityMI"),
        Field::Precipitation => by_units("precipMM", "precipIN"),
        Field::Snow => by_units("snowDepthCM", "snowDepthIN"),
        Field::SnowFall => by_units("snowCM", "snowIN"),
        Field::Dewpoint => by_units("dewpointC", "dewpointF"),
        Field::HeatIndex => by_units("heatindexC", "heatindexF"),
        Field::WindChill => by_units("windchillC", "windchillF"),
        Field::FeelsLike => by_units("feelslikeC", "feelslikeF"),
        Field::TempMin => by_units("minTempC", "minTempF"),
        Field::TempMax => by_units("maxTempC", "maxTempF"),
        Field::WindMin => by_units("windSpeedMinKPH", "windSpeedMinMPH"),
        Field::WindMax => by_units("windSpeedMaxKPH", "windSpeedMaxMPH"),
        Field::PrecipSummary => by_units("totalMM", "totalIN"),
        // same key in both systems
        Field::Humidity => "humidity",
        Field::WindDir => "windDirDEG",
        Field::SolarRad => "solradWM2",
        Field::Sky => "sky",
        Field::HumidityMin => "minHumidity",
        Field::HumidityMax => "maxHumidity",
        Field::WindDirMin => "windDirMinDEG",
        Field::WindDirMax => "windDirMaxDEG",
        Field::Uv => "uvi",
        Field::Pop => "pop",
        Field::Timestamp => "timestamp",
        Field::WeatherCoded => "weatherCoded",
        Field::ForecastWeatherCoded => "weatherPrimaryCoded",
        Field::DateTime => "dateTimeISO",
    }
}

/// Which kind of entity a display-unit table is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeProfile {
    Controller,
    Forecast,
}

// Host unit-of-measure codes
const UOM_INDEX: u32 = 25;
const UOM_PERCENT: u32 = 22;
const UOM_CELSIUS: u32 = 4;
const UOM_FAHRENHEIT: u32 = 17;

/// Driver-id → host unit code for the given unit system and entity kind.
pub fn display_units(units: UnitSystem, profile: NodeProfile) -> BTreeMap<&'static str, u32> {
    let metric = units == UnitSystem::Metric;
    let temp = if metric { UOM_CELSIUS } else { UOM_FAHRENHEIT };
    let pressure = if metric { 117 } else { 23 };
    let speed = if metric { 32 } else { 48 };
    let rain = if metric { 82 } else { 105 };

    let mut uom = BTreeMap::new();
    match profile {
        NodeProfile::Controller => {
            uom.insert("ST", 2);
            uom.insert("CLITEMP", temp);
            uom.insert("CLIHUM", UOM_PERCENT);
            uom.insert("DEWPT", temp);
            uom.insert("BARPRES", pressure);
            uom.insert("WINDDIR", 76);
            uom.insert("SPEED", speed);
            uom.insert("GV5", speed);
            uom.insert("GV2", temp);
            uom.insert("GV3", temp);
            uom.insert("GV4", temp);
            uom.insert("GV6", rain);
            uom.insert("GV15", if metric { 5 } else { 105 });
            uom.insert("GV11", UOM_INDEX);
            uom.insert("GV12", UOM_INDEX);
            uom.insert("GV13", UOM_INDEX);
            uom.insert("GV14", UOM_PERCENT);
            uom.insert("DISTANC", if metric { 83 } else { 116 });
            uom.insert("SOLRAD", 74);
            uom.insert("UV", 71);
        }
        NodeProfile::Forecast => {
            uom.insert("GV19", UOM_INDEX);
            uom.insert("GV0", temp);
            uom.insert("GV1", temp);
            uom.insert("GV2", UOM_PERCENT);
            uom.insert("GV3", UOM_PERCENT);
            uom.insert("BARPRES", pressure);
            uom.insert("SPEED", speed);
            uom.insert("GV14", UOM_PERCENT);
            uom.insert("GV6", rain);
            uom.insert("GV18", UOM_PERCENT);
            uom.insert("UV", 71);
            uom.insert("GV11", UOM_INDEX);
            uom.insert("GV12", UOM_INDEX);
            uom.insert("GV13", UOM_INDEX);
            uom.insert("GV20", if metric { 106 } else { 120 });
        }
    }
    uom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_resolves_in_both_systems() {
        for units in [UnitSystem::Metric, UnitSystem::Imperial] {
            let tags = FieldTagMap::resolve(units);
            let entries = tags.entries();
            assert_eq!(entries.len(), Field::ALL.len());
            for (field, key) in entries {
                assert!(!key.is_empty(), "{} has no key for {}", field, units);
            }
        }
    }

    #[test]
    fn measured_quantities_have_distinct_keys_per_system() {
        let metric = FieldTagMap::resolve(UnitSystem::Metric);
        let imperial = FieldTagMap::resolve(UnitSystem::Imperial);
        for field in [
            Field::Temperature,
            Field::Pressure,
            Field::WindSpeed,
            Field::GustSpeed,
            Field::Visibility,
            Field::Precipitation,
            Field::Snow,
            Field::SnowFall,
            Field::Dewpoint,
            Field::HeatIndex,
            Field::WindChill,
            Field::FeelsLike,
            Field::TempMin,
            Field::TempMax,
            Field::WindMin,
            Field::WindMax,
            Field::PrecipSummary,
        ] {
            assert_ne!(metric.get(field), imperial.get(field), "{}", field);
            assert_ne!(metric.get(field), field.name(), "{}", field);
        }
    }

    #[test]
    fn unit_specific_keys_differ() {
        let metric = FieldTagMap::resolve(UnitSystem::Metric);
        let imperial = FieldTagMap::resolve(UnitSystem::Imperial);
        assert_eq!(metric.get(Field::Temperature), "tempC");
        assert_eq!(imperial.get(Field::Temperature), "tempF");
        assert_eq!(imperial.get(Field::Dewpoint), "dewpointF");
        assert_eq!(metric.get(Field::PrecipSummary), "totalMM");
        assert_eq!(metric.get(Field::Humidity), imperial.get(Field::Humidity));
    }

    #[test]
    fn shared_fields_use_provider_keys() {
        let metric = FieldTagMap::resolve(UnitSystem::Metric);
        let imperial = FieldTagMap::resolve(UnitSystem::Imperial);
        for (field, key) in [
            (Field::Uv, "uvi"),
            (Field::DateTime, "dateTimeISO"),
            (Field::ForecastWeatherCoded, "weatherPrimaryCoded"),
            (Field::HumidityMin, "minHumidity"),
            (Field::WindDirMax, "windDirMaxDEG"),
        ] {
            assert_eq!(metric.get(field), key);
            assert_eq!(imperial.get(field), key);
        }

        for tags in [metric, imperial] {
            let keys: std::collections::BTreeSet<_> =
                tags.entries().into_iter().map(|(_, key)| key).collect();
            assert_eq!(keys.len(), Field::ALL.len(), "{}", tags.units());
        }
    }

    #[test]
    fn resolve_str_rejects_unknown_system() {
        assert!(FieldTagMap::resolve_str("metric").is_ok());
        assert!(FieldTagMap::resolve_str(" Imperial ").is_ok());
        let err = FieldTagMap::resolve_str("kelvin").unwrap_err();
        assert!(matches!(err, AerisError::Configuration(_)));
    }

    #[test]
    fn display_units_follow_system() {
        let metric = display_units(UnitSystem::Metric, NodeProfile::Controller);
        let imperial = display_units(UnitSystem::Imperial, NodeProfile::Controller);
        assert_eq!(metric["CLITEMP"], 4);
        assert_eq!(imperial["CLITEMP"], 17);
        assert_eq!(metric["CLIHUM"], imperial["CLIHUM"]);

        let forecast = display_units(UnitSystem::Metric, NodeProfile::Forecast);
        assert_eq!(forecast["GV2"], 22);
        assert_eq!(forecast["GV20"], 106);
    }
}
