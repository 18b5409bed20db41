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

//! Per-parameter time series for one station built from a historical window payload.

use crate::catalog::{Endpoint, ParameterCatalog};
use crate::client::{parse_instant, ClientError, HistoryResponse, MeteoClient};
use crate::observation::convert_value;
use crate::stations::{Period, Station};
use crate::units::round_to;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error;
use std::fmt;
use tracing::Instrument;

/// Order of series produced by the historical builder: most recent first.
pub const HISTORY_ORDER: SortOrder = SortOrder::Descending;

#[derive(Debug)]
pub enum HistoryError {
    Client(ClientError),
    NoData { station: u32, period: Period },
    UnknownStation(u32),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(e) => write!(f, "{}", e),
            Self::NoData { station, period } => write!(f, "no data for station {} in the last {}", station, period),
            Self::UnknownStation(s) => write!(f, "unknown station {}", s),
        }
    }
}

impl error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Client(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClientError> for HistoryError {
    fn from(e: ClientError) -> Self {
        HistoryError::Client(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<SortOrder> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortOrder::Ascending),
            "desc" | "descending" => Some(SortOrder::Descending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub validation_flag: Option<i32>,
}

/// Values of one parameter over time. All points share `unit`, and `data` is always
/// sorted by timestamp in the direction given by `order`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalTimeSeries {
    pub parameter_code: String,
    pub parameter_name: String,
    pub unit: String,
    pub order: SortOrder,
    pub data: Vec<HistoricalDataPoint>,
}

impl HistoricalTimeSeries {
    /// Re-sort the series, recording the new order.
    pub fn sort(&mut self, order: SortOrder) {
        match order {
            SortOrder::Ascending => self.data.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
            SortOrder::Descending => self.data.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        }
        self.order = order;
    }

    pub fn sorted(mut self, order: SortOrder) -> Self {
        self.sort(order);
        self
    }

    /// Most recent point, whichever order the series is in.
    pub fn latest(&self) -> Option<&HistoricalDataPoint> {
        match self.order {
            SortOrder::Ascending => self.data.last(),
            SortOrder::Descending => self.data.first(),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().map(|p| p.value)
    }

}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationHistoricalData {
    pub station_id: u32,
    pub station_name: String,
    pub period: Period,
    /// Earliest instant actually present in the payload
    pub start_date: DateTime<Utc>,
    /// Latest instant actually present in the payload
    pub end_date: DateTime<Utc>,
    pub variables: Vec<HistoricalTimeSeries>,
}

impl StationHistoricalData {
    pub fn series(&self, code: &str) -> Option<&HistoricalTimeSeries> {
        self.variables.iter().find(|s| s.parameter_code == code)
    }
}

/// Build the time series of a station from a historical window payload.
///
/// Unknown parameters and points without a value are skipped. Wind speeds are converted
/// to km/h and every value is rounded to two decimals here so that all readers of the
/// series see the same numbers. Each series is sorted in the requested `order`. A window
/// without any instants, or whose instants carry no measurements at all, is an error.
/// Measurements that are all unknown codes are not: the result just has no series.
pub fn build_history(
    res: &HistoryResponse,
    station: &Station,
    period: Period,
    catalog: &ParameterCatalog,
    order: SortOrder,
) -> Result<StationHistoricalData, HistoryError> {
    let no_data = || HistoryError::NoData {
        station: station.id,
        period,
    };

    let payload = res
        .stations
        .iter()
        .find(|s| s.station_id == Some(station.id))
        .or_else(|| res.stations.iter().find(|s| s.station_id.is_none()))
        .ok_or_else(no_data)?;

    let mut series: BTreeMap<String, HistoricalTimeSeries> = BTreeMap::new();
    let mut start: Option<DateTime<Utc>> = None;
    let mut end: Option<DateTime<Utc>> = None;
    let mut measures = 0;

    for instant in &payload.instants {
        let timestamp = match parse_instant(&instant.instant) {
            Some(ts) => ts,
            None => {
                tracing::debug!(
                    message = "skipping instant with invalid timestamp",
                    station = station.id,
                    instant = %instant.instant,
                );
                continue;
            }
        };

        start = Some(start.map_or(timestamp, |s| s.min(timestamp)));
        end = Some(end.map_or(timestamp, |e| e.max(timestamp)));
        measures += instant.measures.len();

        for measure in &instant.measures {
            let info = match catalog.lookup(&measure.code, Endpoint::Historical) {
                Some(info) => info,
                None => continue,
            };

            let (value, unit) = convert_value(&measure.code, &measure.unit, measure.reading());
            let value = match value {
                Some(v) => round_to(v, 2),
                None => continue,
            };

            series
                .entry(measure.code.clone())
                .or_insert_with(|| HistoricalTimeSeries {
                    parameter_code: measure.code.clone(),
                    parameter_name: info.name.clone(),
                    unit,
                    order,
                    data: Vec::new(),
                })
                .data
                .push(HistoricalDataPoint {
                    timestamp,
                    value,
                    validation_flag: measure.validation,
                });
        }
    }

    let (start_date, end_date) = start.zip(end).ok_or_else(no_data)?;
    if measures == 0 {
        return Err(no_data());
    }

    let variables = series.into_values().map(|s| s.sorted(order)).collect();

    Ok(StationHistoricalData {
        station_id: station.id,
        station_name: station.name.clone(),
        period,
        start_date,
        end_date,
        variables,
    })
}

/// Fetch a station's historical window and build its series, most recent first.
pub async fn fetch_history(
    client: &MeteoClient,
    catalog: &ParameterCatalog,
    station: &Station,
    period: Period,
) -> Result<StationHistoricalData, HistoryError> {
    let res = client
        .history(station.id, period)
        .instrument(tracing::debug_span!("historical_readings", station = station.id, period = %period))
        .await?;

    build_history(&res, station, period, catalog, HISTORY_ORDER)
}
