// meteo_exporter - Weather station observation engine and Prometheus exporter
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Unit conversions and derived comfort metrics.

const KMH_PER_METER_PER_SECOND: f64 = 3.6;
const WIND_CHILL_MAX_TEMP: f64 = 10.0;
const WIND_CHILL_MIN_KMH: f64 = 4.8;
const HEAT_INDEX_MIN_TEMP: f64 = 27.0;
const HEAT_INDEX_MIN_HUMIDITY: f64 = 40.0;
const BREEZE_MIN_KMH: f64 = 3.6;

/// Convert a speed in meters per second to kilometers per hour.
pub fn meters_per_second_to_kmh(v: f64) -> f64 {
    v * KMH_PER_METER_PER_SECOND
}

/// Convert a speed in kilometers per hour to meters per second.
pub fn kmh_to_meters_per_second(v: f64) -> f64 {
    v / KMH_PER_METER_PER_SECOND
}

/// Round to the given number of decimal places.
pub fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

/// Temperature as felt, in celsius, given temperature in celsius, wind speed in km/h
/// and optionally relative humidity (0-100).
///
/// Cold and windy conditions use the wind chill formula, hot and humid conditions use
/// the heat index polynomial, a light breeze applies a small linear cooling and anything
/// else is returned unchanged. All wind comparisons are strict: a wind of exactly 4.8 km/h
/// in the wind chill temperature range is not a wind chill condition and the temperature
/// is returned as-is, as is a wind of exactly 3.6 km/h anywhere.
pub fn apparent_temperature(temp_c: f64, wind_kmh: f64, humidity_pct: Option<f64>) -> f64 {
    if temp_c <= WIND_CHILL_MAX_TEMP {
        if wind_kmh > WIND_CHILL_MIN_KMH {
            return round_to(wind_chill(temp_c, wind_kmh), 1);
        }
        if wind_kmh == WIND_CHILL_MIN_KMH {
            return temp_c;
        }
    }

    if let Some(rh) = humidity_pct {
        if temp_c >= HEAT_INDEX_MIN_TEMP && rh >= HEAT_INDEX_MIN_HUMIDITY {
            return round_to(heat_index(temp_c, rh), 1);
        }
    }

    if wind_kmh > BREEZE_MIN_KMH {
        return temp_c - (wind_kmh / 36.0) * 0.5;
    }

    temp_c
}

fn wind_chill(t: f64, v: f64) -> f64 {
    let v16 = v.powf(0.16);
    13.12 + 0.6215 * t - 11.37 * v16 + 0.3965 * t * v16
}

// Rothfusz regression with celsius coefficients
fn heat_index(t: f64, rh: f64) -> f64 {
    let t2 = t * t;
    let rh2 = rh * rh;
    -8.784_694_755_56 + 1.611_394_11 * t + 2.338_548_838_89 * rh
        - 0.146_116_05 * t * rh
        - 0.012_308_094 * t2
        - 0.016_424_827_777_8 * rh2
        + 0.002_211_732 * t2 * rh
        + 0.000_725_46 * t * rh2
        - 0.000_003_582 * t2 * rh2
}
