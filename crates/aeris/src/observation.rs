//! Current-conditions extraction.
//!
//! Every driver is read and written on its own; a missing key or an
//! unparsable value only costs that one driver. The outcome of each field is
//! collected in an [`ExtractionReport`].

use serde_json::Value;

use crate::drivers::DriverSink;
use crate::error::{AerisError, Result};
use crate::units::{Field, FieldTagMap};
use crate::weather_codes;

/// Observation fields and the controller driver each one feeds, in report order.
pub const OBSERVATION_DRIVERS: &[(Field, &str)] = &[
    (Field::Temperature, "CLITEMP"),
    (Field::Humidity, "CLIHUM"),
    (Field::Pressure, "BARPRES"),
    (Field::WindSpeed, "SPEED"),
    (Field::GustSpeed, "GV5"),
    (Field::WindDir, "WINDDIR"),
    (Field::Visibility, "DISTANC"),
    (Field::Dewpoint, "DEWPT"),
    (Field::HeatIndex, "GV3"),
    (Field::WindChill, "GV4"),
    (Field::FeelsLike, "GV2"),
    (Field::SolarRad, "SOLRAD"),
    (Field::Uv, "UV"),
    (Field::Snow, "GV15"),
    (Field::Sky, "GV14"),
];

pub const PRECIPITATION_DRIVER: &str = "GV6";
pub const COVERAGE_DRIVER: &str = "GV11";
pub const INTENSITY_DRIVER: &str = "GV12";
pub const CONDITION_DRIVER: &str = "GV13";

/// A field that could not be extracted and why.
#[derive(Debug)]
pub struct FieldFailure {
    pub field: Field,
    pub error: AerisError,
}

/// Per-field outcome of one observation extraction.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Fields that produced a value, in extraction order.
    pub extracted: Vec<Field>,
    pub failed: Vec<FieldFailure>,
    /// Observed precipitation, kept as fallback for the summary query.
    pub precipitation: Option<f64>,
    /// Station latitude if the response carried one.
    pub latitude: Option<f64>,
}

impl ExtractionReport {
    pub fn failed_fields(&self) -> Vec<Field> {
        self.failed.iter().map(|f| f.field).collect()
    }

    fn record(&mut self, field: Field, result: Result<()>) {
        match result {
            Ok(()) => self.extracted.push(field),
            Err(error) => {
                log::debug!("Missing data for {}: {}", field, error);
                self.failed.push(FieldFailure { field, error });
            }
        }
    }
}

/// Interpret a JSON value as a finite number.
///
/// Numeric strings are accepted, `null` counts as missing.
pub fn coerce_number(key: &str, value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null => return Err(AerisError::MissingField(key.to_string())),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(AerisError::Coercion {
            field: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Read `obj[key]` as a finite number.
pub fn number_at(obj: &Value, key: &str) -> Result<f64> {
    let value = obj
        .get(key)
        .ok_or_else(|| AerisError::MissingField(key.to_string()))?;
    coerce_number(key, value)
}

/// Read `obj[key]` as a string.
pub fn str_at<'a>(obj: &'a Value, key: &str) -> Result<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Null) | None => Err(AerisError::MissingField(key.to_string())),
        Some(other) => Err(AerisError::Coercion {
            field: key.to_string(),
            value: other.to_string(),
        }),
    }
}

/// The `response` envelope, unwrapping the single-element list form.
pub fn response_envelope(raw: &Value) -> Result<&Value> {
    match raw.get("response") {
        Some(Value::Array(items)) => items
            .first()
            .ok_or_else(|| AerisError::MissingField("response[0]".to_string())),
        Some(obj @ Value::Object(_)) => Ok(obj),
        _ => Err(AerisError::MissingField("response".to_string())),
    }
}

/// Extract current conditions from `raw` into `sink`.
///
/// Returns `Err` only when the `response`/`ob` envelope is absent, in which
/// case nothing can be extracted. All other failures are listed in the report.
pub fn extract(
    raw: &Value,
    tags: &FieldTagMap,
    sink: &mut dyn DriverSink,
) -> Result<ExtractionReport> {
    let response = response_envelope(raw)?;
    let ob = response
        .get("ob")
        .ok_or_else(|| AerisError::MissingField("response.ob".to_string()))?;

    let mut report = ExtractionReport {
        latitude: read_latitude(response),
        ..Default::default()
    };

    for (field, driver) in OBSERVATION_DRIVERS {
        let result = number_at(ob, tags.get(*field)).map(|value| sink.set_value(driver, value));
        report.record(*field, result);
    }

    let coded = str_at(ob, tags.get(Field::WeatherCoded))
        .and_then(weather_codes::decode)
        .map(|codes| {
            sink.set_value(COVERAGE_DRIVER, f64::from(codes.coverage));
            sink.set_value(INTENSITY_DRIVER, f64::from(codes.intensity));
            sink.set_value(CONDITION_DRIVER, f64::from(codes.condition));
        });
    report.record(Field::WeatherCoded, coded);

    // written after the summary query, which takes precedence
    let precipitation = number_at(ob, tags.get(Field::Precipitation));
    report.precipitation = precipitation.as_ref().ok().copied();
    report.record(Field::Precipitation, precipitation.map(|_| ()));

    Ok(report)
}

fn read_latitude(response: &Value) -> Option<f64> {
    let Some(loc) = response.get("loc") else {
        log::debug!("No location data in response");
        return None;
    };
    match number_at(loc, "lat") {
        Ok(lat) => Some(lat),
        Err(e) => {
            log::debug!("No latitude data in response: {}", e);
            None
        }
    }
}

/// Total precipitation from a precipitation-summary payload.
pub fn precip_summary_total(raw: &Value, tags: &FieldTagMap) -> Result<f64> {
    let summary = response_envelope(raw)?
        .get("periods")
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("summary"))
        .ok_or_else(|| AerisError::MissingField("periods[0].summary".to_string()))?;
    let precip = summary
        .get("precip")
        .ok_or_else(|| AerisError::MissingField("summary.precip".to_string()))?;
    number_at(precip, tags.get(Field::PrecipSummary))
}

/// Where the reported precipitation value came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrecipSource {
    Summary(f64),
    Observation(f64),
    Unavailable,
}

/// Write the precipitation driver from the summary payload, falling back to
/// the observed value. Leaves the driver untouched when neither exists.
pub fn merge_precip_summary(
    summary: Option<&Value>,
    tags: &FieldTagMap,
    fallback: Option<f64>,
    sink: &mut dyn DriverSink,
) -> PrecipSource {
    let total = match summary.map(|raw| precip_summary_total(raw, tags)) {
        Some(Ok(total)) => Some(total),
        Some(Err(e)) => {
            log::debug!("Precipitation summary unusable: {}", e);
            None
        }
        None => None,
    };

    let source = match (total, fallback) {
        (Some(total), _) => PrecipSource::Summary(total),
        (None, Some(observed)) => PrecipSource::Observation(observed),
        (None, None) => PrecipSource::Unavailable,
    };
    match source {
        PrecipSource::Summary(v) | PrecipSource::Observation(v) => {
            sink.set_value(PRECIPITATION_DRIVER, v)
        }
        PrecipSource::Unavailable => log::debug!("No precipitation data this cycle"),
    }
    source
}
