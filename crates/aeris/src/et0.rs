//! FAO-56 Penman-Monteith reference evapotranspiration for a forecast day.
//!
//! The forecast carries no measured radiation, so incoming solar radiation is
//! estimated from the daily temperature range (Hargreaves, kRs = 0.16).

use std::f64::consts::PI;

use crate::units::UnitSystem;

/// Solar constant, MJ m-2 min-1.
const GSC: f64 = 0.0820;
/// Stefan-Boltzmann constant, MJ K-4 m-2 day-1.
const SIGMA: f64 = 4.903e-9;
/// Hargreaves radiation adjustment for interior locations.
const KRS: f64 = 0.16;
/// Provider wind speeds are 10 m values.
const WIND_HEIGHT_M: f64 = 10.0;

/// Inputs for one day, in the units of `units`.
#[derive(Debug, Clone, Copy)]
pub struct Et0Input {
    pub temp_max: f64,
    pub temp_min: f64,
    pub humidity_max: f64,
    pub humidity_min: f64,
    /// km/h (metric) or mph (imperial) at 10 m.
    pub wind_speed: f64,
    pub latitude: f64,
    /// Metres above sea level.
    pub elevation: f64,
    pub day_of_year: u32,
    /// Surface albedo, 0.23 for the grass reference crop.
    pub albedo: f64,
    pub units: UnitSystem,
}

fn saturation_vapor_pressure(t: f64) -> f64 {
    0.6108 * ((17.27 * t) / (t + 237.3)).exp()
}

/// Extraterrestrial radiation Ra, MJ m-2 day-1.
pub fn extraterrestrial_radiation(latitude: f64, day_of_year: u32) -> f64 {
    let j = f64::from(day_of_year);
    let phi = latitude.to_radians();
    let dr = 1.0 + 0.033 * (2.0 * PI * j / 365.0).cos();
    let delta = 0.409 * (2.0 * PI * j / 365.0 - 1.39).sin();
    // clamped for polar day/night
    let ws = (-phi.tan() * delta.tan()).clamp(-1.0, 1.0).acos();
    (24.0 * 60.0 / PI)
        * GSC
        * dr
        * (ws * phi.sin() * delta.sin() + phi.cos() * delta.cos() * ws.sin())
}

/// Daily ET0 in mm (metric) or inches (imperial).
pub fn reference_et0(input: &Et0Input) -> f64 {
    let (tmax, tmin, wind_ms) = match input.units {
        UnitSystem::Metric => (input.temp_max, input.temp_min, input.wind_speed / 3.6),
        UnitSystem::Imperial => (
            (input.temp_max - 32.0) * 5.0 / 9.0,
            (input.temp_min - 32.0) * 5.0 / 9.0,
            input.wind_speed * 0.44704,
        ),
    };
    let u2 = wind_ms * 4.87 / (67.8 * WIND_HEIGHT_M - 5.42).ln();
    let tmean = (tmax + tmin) / 2.0;
    let z = input.elevation;

    let pressure = 101.3 * ((293.0 - 0.0065 * z) / 293.0).powf(5.26);
    let gamma = 0.000665 * pressure;
    let delta = 4098.0 * saturation_vapor_pressure(tmean) / (tmean + 237.3).powi(2);

    let es = (saturation_vapor_pressure(tmax) + saturation_vapor_pressure(tmin)) / 2.0;
    let ea = (saturation_vapor_pressure(tmin) * input.humidity_max / 100.0
        + saturation_vapor_pressure(tmax) * input.humidity_min / 100.0)
        / 2.0;

    let ra = extraterrestrial_radiation(input.latitude, input.day_of_year);
    let rs = KRS * (tmax - tmin).max(0.0).sqrt() * ra;
    let rso = (0.75 + 2e-5 * z) * ra;
    let rns = (1.0 - input.albedo) * rs;
    let ratio = if rso > 0.0 { (rs / rso).min(1.0) } else { 0.0 };
    let rnl = SIGMA
        * ((tmax + 273.16).powi(4) + (tmin + 273.16).powi(4))
        / 2.0
        * (0.34 - 0.14 * ea.max(0.0).sqrt())
        * (1.35 * ratio - 0.35);
    let rn = rns - rnl;

    let et0 = (0.408 * delta * rn + gamma * (900.0 / (tmean + 273.0)) * u2 * (es - ea))
        / (delta + gamma * (1.0 + 0.34 * u2));
    let et0 = et0.max(0.0);

    match input.units {
        UnitSystem::Metric => et0,
        UnitSystem::Imperial => et0 / 25.4,
    }
}
