//! Daily forecast summaries.
//!
//! Two provider shapes are handled:
//! - daily periods, already aggregated by the provider, copied field by field;
//! - three-hour buckets, folded into one summary per calendar day.

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AerisError, Result};
use crate::observation::{number_at, str_at};
use crate::units::{Field, FieldTagMap};

/// Shape of the forecast periods requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForecastInterval {
    /// One pre-aggregated period per calendar day.
    #[default]
    Daily,
    /// Three-hour buckets aggregated here.
    ThreeHour,
}

/// Aggregated values for one forecast day.
///
/// A `None` field was absent from the provider data and leaves the matching
/// driver untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailySummary {
    /// Local calendar date of the period.
    pub date: Option<NaiveDate>,
    pub timestamp: Option<i64>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub humidity_max: Option<f64>,
    pub humidity_min: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub precipitation: Option<f64>,
    pub uv: Option<f64>,
    pub pop: Option<f64>,
    pub weather_coded: Option<String>,
    /// Number of provider records folded into this summary.
    pub bucket_count: usize,
}

fn optional(period: &Value, tags: &FieldTagMap, field: Field) -> Option<f64> {
    match number_at(period, tags.get(field)) {
        Ok(v) => Some(v),
        Err(e) => {
            log::debug!("Forecast period has no {}: {}", field, e);
            None
        }
    }
}

fn period_datetime(period: &Value, tags: &FieldTagMap) -> Result<DateTime<chrono::FixedOffset>> {
    let text = str_at(period, tags.get(Field::DateTime))?;
    DateTime::parse_from_rfc3339(text).map_err(|e| AerisError::Coercion {
        field: tags.get(Field::DateTime).to_string(),
        value: format!("{} ({})", text, e),
    })
}

impl DailySummary {
    /// Copy a provider-aggregated daily period.
    pub fn from_period(period: &Value, tags: &FieldTagMap) -> Self {
        Self {
            date: period_datetime(period, tags).ok().map(|dt| dt.date_naive()),
            timestamp: optional(period, tags, Field::Timestamp).map(|t| t as i64),
            temp_max: optional(period, tags, Field::TempMax),
            temp_min: optional(period, tags, Field::TempMin),
            humidity_max: optional(period, tags, Field::HumidityMax),
            humidity_min: optional(period, tags, Field::HumidityMin),
            pressure: optional(period, tags, Field::Pressure),
            wind_speed: optional(period, tags, Field::WindSpeed),
            cloud_cover: optional(period, tags, Field::Sky),
            precipitation: optional(period, tags, Field::Precipitation),
            uv: optional(period, tags, Field::Uv),
            pop: optional(period, tags, Field::Pop),
            weather_coded: str_at(period, tags.get(Field::ForecastWeatherCoded))
                .ok()
                .map(str::to_string),
            bucket_count: 1,
        }
    }
}

/// One three-hour forecast record.
///
/// Only the date and time are required; any measured field may be missing
/// and is then left out of that day's min, max and averages.
#[derive(Debug, Clone, PartialEq)]
pub struct SubDayBucket {
    pub date: NaiveDate,
    /// Local time of day, compared against the day markers.
    pub time_of_day: NaiveTime,
    pub timestamp: Option<i64>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub cloud_cover: Option<f64>,
    /// Precipitation accumulated over this bucket.
    pub precipitation: Option<f64>,
    pub uv: Option<f64>,
    pub pop: Option<f64>,
    pub weather_coded: Option<String>,
}

impl SubDayBucket {
    /// Fails only when `dateTimeISO` is missing or unparsable.
    pub fn from_period(period: &Value, tags: &FieldTagMap) -> Result<Self> {
        let dt = period_datetime(period, tags)?;
        let temperature = |field: Field| {
            optional(period, tags, field).or_else(|| optional(period, tags, Field::Temperature))
        };
        Ok(Self {
            date: dt.date_naive(),
            time_of_day: dt.time(),
            timestamp: optional(period, tags, Field::Timestamp).map(|t| t as i64),
            temp_max: temperature(Field::TempMax),
            temp_min: temperature(Field::TempMin),
            humidity: optional(period, tags, Field::Humidity),
            pressure: optional(period, tags, Field::Pressure),
            wind_speed: optional(period, tags, Field::WindSpeed),
            cloud_cover: optional(period, tags, Field::Sky),
            precipitation: optional(period, tags, Field::Precipitation),
            uv: optional(period, tags, Field::Uv),
            pop: optional(period, tags, Field::Pop),
            weather_coded: str_at(period, tags.get(Field::ForecastWeatherCoded))
                .ok()
                .map(str::to_string),
        })
    }
}

fn keep_max(current: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (current, value) {
        (Some(c), Some(v)) if v > c => Some(v),
        (None, v) => v,
        (c, _) => c,
    }
}

fn keep_min(current: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (current, value) {
        (Some(c), Some(v)) if v < c => Some(v),
        (None, v) => v,
        (c, _) => c,
    }
}

/// Sum and count of the buckets that carried a field.
#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Running state of the day being folded.
#[derive(Debug, Clone)]
struct DayAccumulator {
    date: NaiveDate,
    timestamp: Option<i64>,
    temp_max: Option<f64>,
    temp_min: Option<f64>,
    humidity_max: Option<f64>,
    humidity_min: Option<f64>,
    pressure: Mean,
    wind: Mean,
    cloud: Mean,
    precipitation: Option<f64>,
    uv: Option<f64>,
    pop: Option<f64>,
    weather_coded: Option<String>,
    count: usize,
}

impl DayAccumulator {
    fn start(bucket: &SubDayBucket) -> Self {
        let mut acc = Self {
            date: bucket.date,
            timestamp: bucket.timestamp,
            temp_max: None,
            temp_min: None,
            humidity_max: None,
            humidity_min: None,
            pressure: Mean::default(),
            wind: Mean::default(),
            cloud: Mean::default(),
            precipitation: None,
            uv: None,
            pop: None,
            weather_coded: None,
            count: 0,
        };
        acc.fold(bucket);
        acc
    }

    fn fold(&mut self, bucket: &SubDayBucket) {
        self.temp_max = keep_max(self.temp_max, bucket.temp_max);
        self.temp_min = keep_min(self.temp_min, bucket.temp_min);
        self.humidity_max = keep_max(self.humidity_max, bucket.humidity);
        self.humidity_min = keep_min(self.humidity_min, bucket.humidity);
        self.pressure.add(bucket.pressure);
        self.wind.add(bucket.wind_speed);
        self.cloud.add(bucket.cloud_cover);

        self.precipitation = match (self.precipitation, bucket.precipitation) {
            (Some(total), Some(more)) => Some(total + more),
            (total, more) => total.or(more),
        };
        self.uv = self.uv.or(bucket.uv);
        self.pop = self.pop.or(bucket.pop);
        if self.weather_coded.is_none() {
            self.weather_coded = bucket.weather_coded.clone();
        }
        self.count += 1;
    }

    /// Averages divide by the buckets that carried each field.
    fn close(self) -> DailySummary {
        DailySummary {
            date: Some(self.date),
            timestamp: self.timestamp,
            temp_max: self.temp_max,
            temp_min: self.temp_min,
            humidity_max: self.humidity_max,
            humidity_min: self.humidity_min,
            pressure: self.pressure.value(),
            wind_speed: self.wind.value(),
            cloud_cover: self.cloud.value(),
            precipitation: self.precipitation,
            uv: self.uv,
            pop: self.pop,
            weather_coded: self.weather_coded,
            bucket_count: self.count,
        }
    }
}

/// Folds a stream of three-hour buckets into daily summaries.
///
/// A day opens on a bucket at `day_start` and closes on the bucket at
/// `day_end`. Buckets before the first opening are skipped.
#[derive(Debug, Clone)]
pub struct DailyAggregator {
    day_start: NaiveTime,
    day_end: NaiveTime,
    open: Option<DayAccumulator>,
}

impl Default for DailyAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyAggregator {
    pub fn new() -> Self {
        Self {
            day_start: NaiveTime::MIN,
            day_end: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN),
            open: None,
        }
    }

    /// Feed one bucket. Returns a summary when this bucket closes a day, or
    /// when it opens a new day while the previous one never saw its end.
    pub fn push(&mut self, bucket: &SubDayBucket) -> Option<DailySummary> {
        let mut closed = None;

        if bucket.time_of_day == self.day_start {
            if let Some(unfinished) = self.open.take() {
                log::info!(
                    "Day {} ended without closing bucket after {} buckets",
                    unfinished.date,
                    unfinished.count
                );
                closed = Some(unfinished.close());
            }
            self.open = Some(DayAccumulator::start(bucket));
        } else if let Some(acc) = self.open.as_mut() {
            acc.fold(bucket);
        } else {
            log::debug!(
                "Skipping bucket {} {} before first day start",
                bucket.date,
                bucket.time_of_day
            );
            return None;
        }

        if bucket.time_of_day == self.day_end {
            if let Some(acc) = self.open.take() {
                return Some(acc.close());
            }
        }
        closed
    }

    /// Close a day still open at the end of the input.
    pub fn finish(&mut self) -> Option<DailySummary> {
        self.open.take().map(|acc| {
            log::info!("Partial day forecast {} ({} buckets)", acc.date, acc.count);
            acc.close()
        })
    }
}

/// Fold a full bucket sequence, closing a trailing partial day.
pub fn aggregate_buckets<'a>(buckets: impl IntoIterator<Item = &'a SubDayBucket>) -> Vec<DailySummary> {
    let mut aggregator = DailyAggregator::new();
    let mut days: Vec<DailySummary> = buckets
        .into_iter()
        .filter_map(|b| aggregator.push(b))
        .collect();
    days.extend(aggregator.finish());
    days
}

/// Turn raw provider periods into daily summaries for the given interval.
///
/// Three-hour periods without a readable `dateTimeISO` are logged and dropped.
pub fn aggregate(periods: &[Value], interval: ForecastInterval, tags: &FieldTagMap) -> Vec<DailySummary> {
    match interval {
        ForecastInterval::Daily => periods
            .iter()
            .map(|p| DailySummary::from_period(p, tags))
            .collect(),
        ForecastInterval::ThreeHour => {
            let buckets: Vec<SubDayBucket> = periods
                .iter()
                .filter_map(|p| match SubDayBucket::from_period(p, tags) {
                    Ok(bucket) => Some(bucket),
                    Err(e) => {
                        log::warn!("Dropping unreadable forecast bucket: {}", e);
                        None
                    }
                })
                .collect();
            aggregate_buckets(&buckets)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitSystem;
    use serde_json::json;

    fn bucket(hour: u32, temp: f64, humidity: f64, pressure: f64) -> SubDayBucket {
        SubDayBucket {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            time_of_day: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            timestamp: None,
            temp_max: Some(temp),
            temp_min: Some(temp),
            humidity: Some(humidity),
            pressure: Some(pressure),
            wind_speed: Some(10.0),
            cloud_cover: Some(50.0),
            precipitation: None,
            uv: None,
            pop: None,
            weather_coded: None,
        }
    }

    #[test]
    fn daily_period_is_copied_unchanged() {
        let tags = FieldTagMap::resolve(UnitSystem::Metric);
        let period = json!({
            "timestamp": 1714539600,
            "dateTimeISO": "2024-05-01T00:00:00-05:00",
            "maxTempC": 24.0,
            "minTempC": 11.0,
            "maxHumidity": 88,
            "minHumidity": 35,
            "pressureMB": 1014,
            "windSpeedKPH": 14,
            "sky": 40,
            "precipMM": 1.5,
            "uvi": 6,
            "pop": 30,
            "weatherPrimaryCoded": "C:L:RW"
        });
        let summary = DailySummary::from_period(&period, &tags);
        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(summary.timestamp, Some(1714539600));
        assert_eq!(summary.temp_max, Some(24.0));
        assert_eq!(summary.temp_min, Some(11.0));
        assert_eq!(summary.humidity_max, Some(88.0));
        assert_eq!(summary.humidity_min, Some(35.0));
        assert_eq!(summary.pressure, Some(1014.0));
        assert_eq!(summary.wind_speed, Some(14.0));
        assert_eq!(summary.cloud_cover, Some(40.0));
        assert_eq!(summary.precipitation, Some(1.5));
        assert_eq!(summary.uv, Some(6.0));
        assert_eq!(summary.pop, Some(30.0));
        assert_eq!(summary.weather_coded.as_deref(), Some("C:L:RW"));
    }

    #[test]
    fn daily_period_missing_fields_stay_unset() {
        let tags = FieldTagMap::resolve(UnitSystem::Imperial);
        let summary = DailySummary::from_period(&json!({"maxTempF": 80}), &tags);
        assert_eq!(summary.temp_max, Some(80.0));
        assert_eq!(summary.temp_min, None);
        assert_eq!(summary.date, None);
    }

    #[test]
    fn min_max_independent_of_order() {
        let orders = [
            [10.0, 25.0, 5.0],
            [25.0, 10.0, 5.0],
            [5.0, 25.0, 10.0],
            [5.0, 10.0, 25.0],
            [25.0, 5.0, 10.0],
            [10.0, 5.0, 25.0],
        ];
        for temps in orders {
            let buckets: Vec<_> = temps
                .iter()
                .enumerate()
                .map(|(i, t)| bucket(i as u32 * 3, *t, 50.0, 1000.0))
                .collect();
            let days = aggregate_buckets(&buckets);
            assert_eq!(days.len(), 1);
            assert_eq!(days[0].temp_max, Some(25.0), "{:?}", temps);
            assert_eq!(days[0].temp_min, Some(5.0), "{:?}", temps);
        }
    }

    #[test]
    fn single_bucket_day_has_equal_min_and_max() {
        let days = aggregate_buckets(&[bucket(0, 17.0, 64.0, 1012.0)]);
        assert_eq!(days[0].temp_max, Some(17.0));
        assert_eq!(days[0].temp_min, Some(17.0));
        assert_eq!(days[0].humidity_max, Some(64.0));
        assert_eq!(days[0].humidity_min, Some(64.0));
    }

    #[test]
    fn pressure_is_averaged() {
        let buckets = [
            bucket(0, 10.0, 50.0, 1000.0),
            bucket(3, 10.0, 50.0, 1010.0),
            bucket(6, 10.0, 50.0, 1020.0),
        ];
        let days = aggregate_buckets(&buckets);
        assert_eq!(days[0].pressure, Some(1010.0));
    }

    #[test]
    fn partial_day_divides_by_buckets_seen() {
        let mut aggregator = DailyAggregator::new();
        let mut first = bucket(0, 10.0, 40.0, 1000.0);
        first.wind_speed = Some(4.0);
        let mut second = bucket(3, 12.0, 60.0, 1004.0);
        second.wind_speed = Some(8.0);

        assert!(aggregator.push(&first).is_none());
        assert!(aggregator.push(&second).is_none());
        let day = aggregator.finish().unwrap();
        assert_eq!(day.bucket_count, 2);
        assert_eq!(day.pressure, Some(1002.0));
        assert_eq!(day.wind_speed, Some(6.0));
        assert!(aggregator.finish().is_none());
    }

    #[test]
    fn full_day_closes_on_end_marker() {
        let mut aggregator = DailyAggregator::new();
        let mut closed = Vec::new();
        for hour in (0..24).step_by(3) {
            closed.extend(aggregator.push(&bucket(hour, hour as f64, 50.0, 1000.0)));
        }
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].bucket_count, 8);
        assert_eq!(closed[0].temp_max, Some(21.0));
        assert_eq!(closed[0].temp_min, Some(0.0));
        assert!(aggregator.finish().is_none());
    }

    #[test]
    fn buckets_before_first_start_are_skipped() {
        let buckets = [
            bucket(15, 40.0, 10.0, 900.0),
            bucket(18, 40.0, 10.0, 900.0),
            bucket(0, 10.0, 50.0, 1000.0),
            bucket(3, 12.0, 50.0, 1000.0),
        ];
        let days = aggregate_buckets(&buckets);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].temp_max, Some(12.0));
        assert_eq!(days[0].bucket_count, 2);
    }

    #[test]
    fn precipitation_accumulates_uv_takes_first() {
        let mut a = bucket(0, 10.0, 50.0, 1000.0);
        a.precipitation = Some(1.0);
        let mut b = bucket(3, 10.0, 50.0, 1000.0);
        b.precipitation = Some(2.5);
        b.uv = Some(3.0);
        let mut c = bucket(6, 10.0, 50.0, 1000.0);
        c.uv = Some(7.0);

        let days = aggregate_buckets(&[a, b, c]);
        assert_eq!(days[0].precipitation, Some(3.5));
        assert_eq!(days[0].uv, Some(3.0));
    }

    #[test]
    fn three_hour_periods_from_json() {
        let tags = FieldTagMap::resolve(UnitSystem::Metric);
        let periods: Vec<Value> = (0..10)
            .map(|i| {
                let hour = (i * 3) % 24;
                let day = 1 + (i * 3) / 24;
                json!({
                    "dateTimeISO": format!("2024-05-{:02}T{:02}:00:00-05:00", day, hour),
                    "maxTempC": 10 + i,
                    "minTempC": 5 + i,
                    "humidity": 60,
                    "pressureMB": 1010,
                    "windSpeedKPH": 12,
                    "sky": 20,
                    "precipMM": 0.5
                })
            })
            .collect();
        let days = aggregate(&periods, ForecastInterval::ThreeHour, &tags);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(days[0].temp_max, Some(17.0));
        assert_eq!(days[0].temp_min, Some(5.0));
        assert_eq!(days[0].precipitation, Some(4.0));
        assert_eq!(days[1].bucket_count, 2);
    }

    #[test]
    fn unreadable_bucket_is_dropped() {
        let tags = FieldTagMap::resolve(UnitSystem::Metric);
        let periods = vec![
            json!({"dateTimeISO": "2024-05-01T00:00:00Z", "tempC": 10, "humidity": 50,
                   "pressureMB": 1000, "windSpeedKPH": 5, "sky": 0}),
            json!({"dateTimeISO": "not a date"}),
        ];
        let days = aggregate(&periods, ForecastInterval::ThreeHour, &tags);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].temp_max, Some(10.0));
    }

    #[test]
    fn missing_field_averages_over_buckets_that_carry_it() {
        let mut a = bucket(0, 10.0, 50.0, 1000.0);
        a.pressure = None;
        a.humidity = None;
        let b = bucket(3, 14.0, 70.0, 1004.0);
        let c = bucket(6, 12.0, 30.0, 1008.0);

        let days = aggregate_buckets(&[a, b, c]);
        assert_eq!(days[0].bucket_count, 3);
        assert_eq!(days[0].pressure, Some(1006.0));
        assert_eq!(days[0].humidity_max, Some(70.0));
        assert_eq!(days[0].humidity_min, Some(30.0));
        assert_eq!(days[0].temp_min, Some(10.0));
    }

    #[test]
    fn field_absent_all_day_stays_unset() {
        let mut buckets = [bucket(0, 10.0, 50.0, 1000.0), bucket(3, 12.0, 50.0, 1000.0)];
        for b in buckets.iter_mut() {
            b.cloud_cover = None;
        }
        let days = aggregate_buckets(&buckets);
        assert_eq!(days[0].cloud_cover, None);
        assert_eq!(days[0].wind_speed, Some(10.0));
    }

    #[test]
    fn start_bucket_without_sky_still_opens_the_day() {
        let tags = FieldTagMap::resolve(UnitSystem::Metric);
        let periods: Vec<Value> = (0..16)
            .map(|i| {
                let hour = (i * 3) % 24;
                let day = 1 + (i * 3) / 24;
                let mut period = json!({
                    "dateTimeISO": format!("2024-05-{:02}T{:02}:00:00-05:00", day, hour),
                    "tempC": 10 + i,
                    "humidity": 60,
                    "pressureMB": 1010,
                    "windSpeedKPH": 12,
                    "sky": 40
                });
                if i == 0 {
                    period.as_object_mut().unwrap().remove("sky");
                }
                period
            })
            .collect();

        let days = aggregate(&periods, ForecastInterval::ThreeHour, &tags);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(days[0].bucket_count, 8);
        assert_eq!(days[0].temp_min, Some(10.0));
        assert_eq!(days[0].temp_max, Some(17.0));
        assert_eq!(days[0].cloud_cover, Some(40.0));
        assert_eq!(days[1].date, NaiveDate::from_ymd_opt(2024, 5, 2));
        assert_eq!(days[1].temp_min, Some(18.0));
    }
}
