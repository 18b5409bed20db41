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

//! Normalization of the latest reading of a station into an `Observation`.

use crate::catalog::{
    is_wind_speed, Endpoint, ParameterCatalog, CODE_HUMIDITY, CODE_TEMPERATURE, CODE_WIND_AVG_10M, CODE_WIND_AVG_2M,
    UNIT_KMH, UNIT_METERS_PER_SECOND,
};
use crate::client::{parse_instant, ClientError, LatestResponse, MeteoClient, RawMeasure};
use crate::fanout::{fetch_each, BatchResult, FetchOptions};
use crate::units::{apparent_temperature, meters_per_second_to_kmh, round_to};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub parameter_code: String,
    pub parameter_name: String,
    pub unit: String,
    pub value: Option<f64>,
    pub validation_flag: Option<i32>,
}

/// Most recent reading batch of a single station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub station_id: u32,
    pub timestamp: DateTime<Utc>,
    pub measurements: Vec<Measurement>,
    pub apparent_temperature: Option<f64>,
}

impl Observation {
    pub fn measurement(&self, code: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.parameter_code == code)
    }

    /// First measurement among `primary` and `fallback` (in that order) with a value.
    pub fn measurement_with_fallback(&self, primary: &str, fallback: Option<&str>) -> Option<&Measurement> {
        std::iter::once(primary)
            .chain(fallback)
            .filter_map(|code| self.measurement(code))
            .find(|m| m.value.is_some())
    }

    pub fn value(&self, code: &str) -> Option<f64> {
        self.value_with_fallback(code, None)
    }

    pub fn value_with_fallback(&self, primary: &str, fallback: Option<&str>) -> Option<f64> {
        self.measurement_with_fallback(primary, fallback).and_then(|m| m.value)
    }
}

/// Convert an upstream value to its internal unit. Wind speeds reported in m/s become
/// km/h, everything else passes through unchanged.
pub fn convert_value(code: &str, unit: &str, value: Option<f64>) -> (Option<f64>, String) {
    if is_wind_speed(code) && unit.trim() == UNIT_METERS_PER_SECOND {
        (value.map(|v| round_to(meters_per_second_to_kmh(v), 2)), UNIT_KMH.to_owned())
    } else {
        (value, unit.to_owned())
    }
}

fn normalize_measure(raw: &RawMeasure, catalog: &ParameterCatalog) -> Option<Measurement> {
    let info = catalog.lookup(&raw.code, Endpoint::Latest)?;
    let (value, unit) = convert_value(&raw.code, &raw.unit, raw.reading());

    Some(Measurement {
        parameter_code: raw.code.clone(),
        parameter_name: info.name.clone(),
        unit,
        value,
        validation_flag: raw.validation,
    })
}

/// Build an `Observation` from a latest reading payload.
///
/// Returns `None` when the payload has no reading batch for the station, the batch has
/// no parseable instant, or none of its measurements are known parameters. This is a
/// "no data" outcome for the station and not an error.
pub fn normalize_latest(res: &LatestResponse, station_id: u32, catalog: &ParameterCatalog) -> Option<Observation> {
    let reading = res
        .readings
        .iter()
        .find(|r| r.station_id == Some(station_id))
        .or_else(|| res.readings.iter().find(|r| r.station_id.is_none()))?;

    let timestamp = reading.instant.as_deref().and_then(parse_instant)?;
    let measurements: Vec<Measurement> = reading
        .measures
        .iter()
        .filter_map(|m| normalize_measure(m, catalog))
        .collect();

    if measurements.is_empty() {
        return None;
    }

    let mut obs = Observation {
        station_id,
        timestamp,
        measurements,
        apparent_temperature: None,
    };

    let wind = obs
        .value_with_fallback(CODE_WIND_AVG_10M, Some(CODE_WIND_AVG_2M))
        .unwrap_or(0.0);
    let felt = obs
        .value(CODE_TEMPERATURE)
        .map(|t| apparent_temperature(t, wind, obs.value(CODE_HUMIDITY)));

    obs.apparent_temperature = felt;
    Some(obs)
}

/// Fetch and normalize the latest reading of a single station.
pub async fn fetch_latest(
    client: &MeteoClient,
    catalog: &ParameterCatalog,
    station_id: u32,
) -> Result<Option<Observation>, ClientError> {
    let res = client
        .latest(station_id)
        .instrument(tracing::debug_span!("latest_reading", station = station_id))
        .await?;

    let obs = normalize_latest(&res, station_id, catalog);
    if obs.is_none() {
        tracing::info!(message = "no latest reading available", station = station_id);
    }

    Ok(obs)
}

/// Fetch the latest reading of every station concurrently. Stations that fail or
/// return nothing are reported as missing.
pub async fn fetch_latest_batch(
    client: &MeteoClient,
    catalog: &ParameterCatalog,
    stations: &[u32],
    opts: FetchOptions,
) -> BatchResult<Observation> {
    fetch_each(stations, opts, |id| fetch_latest(client, catalog, id))
        .await
        .flatten()
}

#[cfg(test)]
mod test {
    use super::{convert_value, normalize_latest};
    use crate::catalog::{ParameterCatalog, CODE_WIND_AVG_10M, CODE_WIND_AVG_2M};
    use crate::client::LatestResponse;

    const LATEST_2M_ONLY: &str = r#"{"listUltimos10min": [{
        "idEstacion": 10157,
        "estacion": "Estación Porto",
        "instanteLecturaUTC": "2024-01-15T10:00:00",
        "listaMedidas": [
            {"codigoParametro": "TA_AVG_1.5m", "nomeParametro": "Temperatura", "unidade": "°C", "valor": 8.0, "lnCodigoValidacion": 1},
            {"codigoParametro": "VV_AVG_2m", "nomeParametro": "Vento", "unidade": "m/s", "valor": 5.0, "lnCodigoValidacion": 1},
            {"codigoParametro": "VV_AVG_10m", "nomeParametro": "Vento", "unidade": "m/s", "valor": -9999.0, "lnCodigoValidacion": 9},
            {"codigoParametro": "DV_AVG_2m", "nomeParametro": "Direccion", "unidade": "º", "valor": 270.0, "lnCodigoValidacion": 1},
            {"codigoParametro": "XX_UNKNOWN", "nomeParametro": "??", "unidade": "?", "valor": 1.0, "lnCodigoValidacion": 1}
        ]
    }]}"#;

    fn parse(json: &str) -> LatestResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_fallback_resolution() {
        let catalog = ParameterCatalog::default();
        let obs = normalize_latest(&parse(LATEST_2M_ONLY), 10157, &catalog).unwrap();

        assert_eq!(Some(18.0), obs.value_with_fallback(CODE_WIND_AVG_10M, Some(CODE_WIND_AVG_2M)));
        assert_eq!(None, obs.value_with_fallback(CODE_WIND_AVG_10M, None));
        assert_eq!(
            CODE_WIND_AVG_2M,
            obs.measurement_with_fallback(CODE_WIND_AVG_10M, Some(CODE_WIND_AVG_2M))
                .unwrap()
                .parameter_code
        );
    }

    #[test]
    fn test_wind_converted_and_unknown_dropped() {
        let catalog = ParameterCatalog::default();
        let obs = normalize_latest(&parse(LATEST_2M_ONLY), 10157, &catalog).unwrap();

        let wind = obs.measurement(CODE_WIND_AVG_2M).unwrap();
        assert_eq!("km/h", wind.unit);
        assert_eq!(Some(18.0), wind.value);
        assert_eq!("º", obs.measurement("DV_AVG_2m").unwrap().unit);
        assert!(obs.measurement("XX_UNKNOWN").is_none());
        assert_eq!(4, obs.measurements.len());
    }

    #[test]
    fn test_apparent_temperature_uses_fallback_wind() {
        let catalog = ParameterCatalog::default();
        let obs = normalize_latest(&parse(LATEST_2M_ONLY), 10157, &catalog).unwrap();

        // 8C with 18 km/h from the 2m sensor is a wind chill condition
        let felt = obs.apparent_temperature.unwrap();
        assert!(felt < 8.0, "expected wind chill below air temperature, got {}", felt);
    }

    #[test]
    fn test_empty_payload_is_no_observation() {
        let catalog = ParameterCatalog::default();
        assert!(normalize_latest(&parse("{}"), 10157, &catalog).is_none());
        assert!(normalize_latest(&parse(r#"{"listUltimos10min": []}"#), 10157, &catalog).is_none());

        let no_instant = r#"{"listUltimos10min": [{"idEstacion": 10157, "listaMedidas": []}]}"#;
        assert!(normalize_latest(&parse(no_instant), 10157, &catalog).is_none());

        let only_unknown = r#"{"listUltimos10min": [{"idEstacion": 10157, "instanteLecturaUTC": "2024-01-15T10:00:00",
            "listaMedidas": [{"codigoParametro": "XX_UNKNOWN", "unidade": "?", "valor": 1.0}]}]}"#;
        assert!(normalize_latest(&parse(only_unknown), 10157, &catalog).is_none());
    }

    #[test]
    fn test_other_station_is_no_observation() {
        let catalog = ParameterCatalog::default();
        assert!(normalize_latest(&parse(LATEST_2M_ONLY), 10104, &catalog).is_none());
    }

    #[test]
    fn test_convert_value() {
        assert_eq!((Some(21.6), String::from("km/h")), convert_value("VV_RACHA_10m", "m/s", Some(6.0)));
        assert_eq!((Some(6.0), String::from("km/h")), convert_value("VV_RACHA_10m", "km/h", Some(6.0)));
        assert_eq!((Some(6.0), String::from("m/s")), convert_value("TA_AVG_1.5m", "m/s", Some(6.0)));
        assert_eq!((None, String::from("km/h")), convert_value("VV_AVG_2m", "m/s", None));
    }
}
