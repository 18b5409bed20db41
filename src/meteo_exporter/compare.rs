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

//! Merging historical series of several stations into per-parameter comparisons.
//!
//! Height specific codes of the same quantity (e.g. gusts measured at 10m at one
//! station and at 2m at another) are merged into one logical series, keeping track of
//! the height each station's values come from. Compass directions are not charted as
//! series since they wrap at 360 degrees; only the latest direction of each station is
//! reported.

use crate::catalog::{is_degree_unit, Endpoint, HeightGroups, LogicalParameter, ParameterCatalog, SensorHeight};
use crate::client::MeteoClient;
use crate::fanout::{fetch_each, BatchResult, FetchOptions};
use crate::history::{fetch_history, HistoricalTimeSeries, HistoryError, SortOrder, StationHistoricalData};
use crate::stations::{Period, StationRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Order of every series in a comparison: oldest first.
pub const COMPARISON_ORDER: SortOrder = SortOrder::Ascending;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSeries {
    /// Logical parameter key for height grouped parameters, the upstream code otherwise
    pub parameter_code: String,
    pub parameter_name: String,
    pub unit: String,
    /// Series of each station that reported the parameter, sorted oldest first
    pub stations: BTreeMap<u32, HistoricalTimeSeries>,
    /// Sensor height each station's values were measured at, for grouped parameters
    pub heights: BTreeMap<u32, SensorHeight>,
    /// Union of the timestamps of all station series, oldest first
    pub timestamps: Vec<DateTime<Utc>>,
    /// Values of each station on the shared `timestamps` axis. `None` is a gap.
    pub aligned: BTreeMap<u32, Vec<Option<f64>>>,
}

impl ComparisonSeries {
    pub fn value_at(&self, station: u32, timestamp: DateTime<Utc>) -> Option<f64> {
        let idx = self.timestamps.binary_search(&timestamp).ok()?;
        self.aligned.get(&station).and_then(|values| values[idx])
    }

    /// Chart points of a station on the shared axis. With `connect_gaps` missing points
    /// are left out entirely so a line is drawn across them, otherwise they are kept
    /// as `None` so a gap is rendered.
    pub fn chart_points(&self, station: u32, connect_gaps: bool) -> Vec<(DateTime<Utc>, Option<f64>)> {
        let values = match self.aligned.get(&station) {
            Some(v) => v,
            None => return Vec::new(),
        };

        self.timestamps
            .iter()
            .copied()
            .zip(values.iter().copied())
            .filter(|(_, v)| !connect_gaps || v.is_some())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionReading {
    pub parameter_code: String,
    pub height: Option<SensorHeight>,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Latest compass direction reported by each station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionSnapshot {
    pub parameter_code: String,
    pub parameter_name: String,
    pub unit: String,
    pub stations: BTreeMap<u32, DirectionReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub period: Period,
    pub series: Vec<ComparisonSeries>,
    pub directions: Vec<DirectionSnapshot>,
    /// Requested stations that produced no data
    pub missing_stations: Vec<u32>,
}

impl Comparison {
    pub fn series(&self, code: &str) -> Option<&ComparisonSeries> {
        self.series.iter().find(|s| s.parameter_code == code)
    }

    pub fn direction(&self, code: &str) -> Option<&DirectionSnapshot> {
        self.directions.iter().find(|s| s.parameter_code == code)
    }
}

/// Series of one station for a logical parameter along with the height it came from.
struct Member<'a> {
    station: u32,
    series: &'a HistoricalTimeSeries,
    height: Option<SensorHeight>,
}

pub struct Comparator<'a> {
    registry: &'a StationRegistry,
    catalog: &'a ParameterCatalog,
    groups: &'a HeightGroups,
}

impl<'a> Comparator<'a> {
    pub fn new(registry: &'a StationRegistry, catalog: &'a ParameterCatalog, groups: &'a HeightGroups) -> Self {
        Comparator {
            registry,
            catalog,
            groups,
        }
    }

    /// Fetch the historical window of every station concurrently and merge them.
    /// Stations that fail are listed as missing in the result.
    pub async fn compare(
        &self,
        client: &MeteoClient,
        stations: &[u32],
        period: Period,
        opts: FetchOptions,
    ) -> Comparison {
        let registry = self.registry;
        let catalog = self.catalog;

        let batch = fetch_each(stations, opts, |id| async move {
            let station = registry.get(id).ok_or(HistoryError::UnknownStation(id))?;
            fetch_history(client, catalog, station, period).await
        })
        .await;

        self.merge(period, batch)
    }

    /// Merge already fetched station histories into a comparison. Histories of a window
    /// other than `period` are left out and their stations are reported as missing.
    pub fn merge(&self, period: Period, batch: BatchResult<StationHistoricalData>) -> Comparison {
        let mut missing_stations = batch.missing;
        let mut found = Vec::with_capacity(batch.found.len());
        for (id, data) in batch.found {
            if data.period == period {
                found.push(data);
            } else {
                tracing::warn!(
                    message = "skipping station history of a different period",
                    station = id,
                    expected = %period,
                    actual = %data.period,
                );
                missing_stations.push(id);
            }
        }

        let mut members: BTreeMap<String, Vec<Member<'_>>> = BTreeMap::new();
        let mut names: HashMap<String, &str> = HashMap::new();

        for data in &found {
            let codes: BTreeSet<&str> = data.variables.iter().map(|s| s.parameter_code.as_str()).collect();

            for code in &codes {
                let series = match data.series(code) {
                    Some(s) => s,
                    None => continue,
                };

                match self.groups.group_of(code) {
                    Some(group) => {
                        if self.preferred_variant(group, data.station_id, &codes) != Some(*code) {
                            continue;
                        }

                        names.entry(group.key.clone()).or_insert(group.name.as_str());
                        members.entry(group.key.clone()).or_default().push(Member {
                            station: data.station_id,
                            series,
                            height: group.height_of(code),
                        });
                    }
                    None => {
                        names
                            .entry(series.parameter_code.clone())
                            .or_insert(series.parameter_name.as_str());
                        members.entry(series.parameter_code.clone()).or_default().push(Member {
                            station: data.station_id,
                            series,
                            height: None,
                        });
                    }
                }
            }
        }

        let mut series = Vec::new();
        let mut directions = Vec::new();

        for (key, group) in members {
            let name = names.get(&key).copied().unwrap_or(key.as_str()).to_owned();
            if self.is_direction(&group) {
                directions.push(direction_snapshot(key, name, &group));
            } else {
                series.push(aligned_series(key, name, &group));
            }
        }

        Comparison {
            period,
            series,
            directions,
            missing_stations,
        }
    }

    /// Variant of a logical parameter to use for a station. A station reporting more
    /// than one height of the same quantity only contributes the height its sensors are
    /// registered at, or the first variant with data if it isn't registered.
    fn preferred_variant<'c>(
        &self,
        group: &LogicalParameter,
        station: u32,
        codes: &BTreeSet<&'c str>,
    ) -> Option<&'c str> {
        let registered = self
            .registry
            .get(station)
            .and_then(|s| group.code_at(s.wind_height))
            .and_then(|code| codes.get(code).copied());

        registered.or_else(|| {
            group
                .variants
                .iter()
                .find_map(|v| codes.get(v.code.as_str()).copied())
        })
    }

    fn is_direction(&self, group: &[Member<'_>]) -> bool {
        group.iter().any(|m| {
            self.catalog
                .lookup(&m.series.parameter_code, Endpoint::Historical)
                .map(|info| info.is_direction())
                .unwrap_or_else(|| is_degree_unit(&m.series.unit))
        })
    }
}

fn direction_snapshot(code: String, name: String, group: &[Member<'_>]) -> DirectionSnapshot {
    let stations = group
        .iter()
        .filter_map(|m| {
            m.series.latest().map(|p| {
                (
                    m.station,
                    DirectionReading {
                        parameter_code: m.series.parameter_code.clone(),
                        height: m.height,
                        timestamp: p.timestamp,
                        value: p.value,
                    },
                )
            })
        })
        .collect();

    DirectionSnapshot {
        parameter_code: code,
        parameter_name: name,
        unit: group.first().map(|m| m.series.unit.clone()).unwrap_or_default(),
        stations,
    }
}

fn aligned_series(code: String, name: String, group: &[Member<'_>]) -> ComparisonSeries {
    let timestamps: Vec<DateTime<Utc>> = group
        .iter()
        .flat_map(|m| m.series.data.iter().map(|p| p.timestamp))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut stations = BTreeMap::new();
    let mut heights = BTreeMap::new();
    let mut aligned = BTreeMap::new();

    for m in group {
        let by_time: HashMap<DateTime<Utc>, f64> = m.series.data.iter().map(|p| (p.timestamp, p.value)).collect();
        aligned.insert(m.station, timestamps.iter().map(|ts| by_time.get(ts).copied()).collect());
        stations.insert(m.station, m.series.clone().sorted(COMPARISON_ORDER));
        if let Some(h) = m.height {
            heights.insert(m.station, h);
        }
    }

    ComparisonSeries {
        parameter_code: code,
        parameter_name: name,
        unit: group.first().map(|m| m.series.unit.clone()).unwrap_or_default(),
        stations,
        heights,
        timestamps,
        aligned,
    }
}

#[cfg(test)]
mod test {
    use super::Comparator;
    use crate::catalog::{HeightGroups, ParameterCatalog, SensorHeight};
    use crate::fanout::BatchResult;
    use crate::history::{HistoricalDataPoint, HistoricalTimeSeries, SortOrder, StationHistoricalData};
    use crate::stations::{Period, StationRegistry, SupportedPeriods};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    fn series(code: &str, unit: &str, points: &[(u32, f64)]) -> HistoricalTimeSeries {
        HistoricalTimeSeries {
            parameter_code: code.to_owned(),
            parameter_name: code.to_owned(),
            unit: unit.to_owned(),
            order: SortOrder::Descending,
            data: points
                .iter()
                .map(|(h, v)| HistoricalDataPoint {
                    timestamp: at(*h),
                    value: *v,
                    validation_flag: Some(1),
                })
                .collect(),
        }
        .sorted(SortOrder::Descending)
    }

    fn station(id: u32, period: Period, variables: Vec<HistoricalTimeSeries>) -> StationHistoricalData {
        StationHistoricalData {
            station_id: id,
            station_name: format!("station {}", id),
            period,
            start_date: at(0),
            end_date: at(23),
            variables,
        }
    }

    fn period() -> Period {
        SupportedPeriods::default().parse("24h").unwrap()
    }

    #[test]
    fn test_gap_is_none_not_zero() {
        let registry = StationRegistry::default();
        let catalog = ParameterCatalog::default();
        let groups = HeightGroups::default();
        let comparator = Comparator::new(&registry, &catalog, &groups);

        let a = station(10104, period(), vec![series("TA_AVG_1.5m", "°C", &[(10, 15.0), (11, 16.0)])]);
        let b = station(10157, period(), vec![series("TA_AVG_1.5m", "°C", &[(10, 13.0)])]);

        let cmp = comparator.merge(
            period(),
            BatchResult {
                found: vec![(10104, a), (10157, b)],
                missing: vec![],
            },
        );

        let temp = cmp.series("TA_AVG_1.5m").unwrap();
        assert_eq!(vec![at(10), at(11)], temp.timestamps);
        assert_eq!(vec![Some(15.0), Some(16.0)], temp.aligned[&10104]);
        assert_eq!(vec![Some(13.0), None], temp.aligned[&10157]);
        assert_eq!(None, temp.value_at(10157, at(11)));
        assert_eq!(Some(16.0), temp.value_at(10104, at(11)));

        assert_eq!(vec![(at(10), Some(13.0)), (at(11), None)], temp.chart_points(10157, false));
        assert_eq!(vec![(at(10), Some(13.0))], temp.chart_points(10157, true));
    }

    #[test]
    fn test_series_are_ascending() {
        let registry = StationRegistry::default();
        let catalog = ParameterCatalog::default();
        let groups = HeightGroups::default();
        let comparator = Comparator::new(&registry, &catalog, &groups);

        let a = station(10104, period(), vec![series("TA_AVG_1.5m", "°C", &[(9, 1.0), (12, 4.0), (10, 2.0)])]);
        let cmp = comparator.merge(
            period(),
            BatchResult {
                found: vec![(10104, a)],
                missing: vec![10157],
            },
        );

        let temp = cmp.series("TA_AVG_1.5m").unwrap();
        let s = &temp.stations[&10104];
        assert_eq!(SortOrder::Ascending, s.order);
        assert_eq!(vec![1.0, 2.0, 4.0], s.values().collect::<Vec<_>>());
        assert_eq!(vec![10157], cmp.missing_stations);
        assert!(!temp.stations.contains_key(&10157));
    }

    #[test]
    fn test_height_variants_merged() {
        let registry = StationRegistry::default();
        let catalog = ParameterCatalog::default();
        let groups = HeightGroups::default();
        let comparator = Comparator::new(&registry, &catalog, &groups);

        let a = station(10104, period(), vec![series("VV_RACHA_10m", "km/h", &[(10, 18.0), (11, 21.6)])]);
        let b = station(10157, period(), vec![series("VV_RACHA_2m", "km/h", &[(11, 9.0)])]);

        let cmp = comparator.merge(
            period(),
            BatchResult {
                found: vec![(10104, a), (10157, b)],
                missing: vec![],
            },
        );

        assert_eq!(1, cmp.series.len());
        let gust = cmp.series("wind_gust").unwrap();
        assert_eq!("Racha de viento", gust.parameter_name);
        assert_eq!("VV_RACHA_10m", gust.stations[&10104].parameter_code);
        assert_eq!("VV_RACHA_2m", gust.stations[&10157].parameter_code);
        assert_eq!(SensorHeight::TenMeters, gust.heights[&10104]);
        assert_eq!(SensorHeight::TwoMeters, gust.heights[&10157]);
        assert_eq!(vec![None, Some(9.0)], gust.aligned[&10157]);
    }

    #[test]
    fn test_station_never_appears_twice_in_group() {
        let registry = StationRegistry::default();
        let catalog = ParameterCatalog::default();
        let groups = HeightGroups::default();
        let comparator = Comparator::new(&registry, &catalog, &groups);

        // Registered at 2m but also reports a 10m gust
        let b = station(
            10157,
            period(),
            vec![
                series("VV_RACHA_10m", "km/h", &[(10, 30.0)]),
                series("VV_RACHA_2m", "km/h", &[(10, 12.0)]),
            ],
        );

        let cmp = comparator.merge(
            period(),
            BatchResult {
                found: vec![(10157, b)],
                missing: vec![],
            },
        );

        assert_eq!(1, cmp.series.len());
        let gust = cmp.series("wind_gust").unwrap();
        assert_eq!(1, gust.stations.len());
        assert_eq!("VV_RACHA_2m", gust.stations[&10157].parameter_code);
        assert_eq!(vec![Some(12.0)], gust.aligned[&10157]);
    }

    #[test]
    fn test_directions_are_snapshots() {
        let registry = StationRegistry::default();
        let catalog = ParameterCatalog::default();
        let groups = HeightGroups::default();
        let comparator = Comparator::new(&registry, &catalog, &groups);

        let a = station(10104, period(), vec![series("DV_AVG_10m", "º", &[(10, 350.0), (11, 10.0)])]);
        let b = station(10157, period(), vec![series("DV_AVG_2m", "º", &[(9, 180.0)])]);

        let cmp = comparator.merge(
            period(),
            BatchResult {
                found: vec![(10104, a), (10157, b)],
                missing: vec![],
            },
        );

        assert!(cmp.series.is_empty());
        let dir = cmp.direction("wind_direction").unwrap();
        assert_eq!(10.0, dir.stations[&10104].value);
        assert_eq!(at(11), dir.stations[&10104].timestamp);
        assert_eq!(Some(SensorHeight::TenMeters), dir.stations[&10104].height);
        assert_eq!(180.0, dir.stations[&10157].value);
        assert_eq!(Some(SensorHeight::TwoMeters), dir.stations[&10157].height);
    }

    #[test]
    fn test_histories_of_other_periods_are_missing() {
        let registry = StationRegistry::default();
        let catalog = ParameterCatalog::default();
        let groups = HeightGroups::default();
        let comparator = Comparator::new(&registry, &catalog, &groups);
        let longer = SupportedPeriods::default().parse("72h").unwrap();

        let a = station(10104, period(), vec![series("TA_AVG_1.5m", "°C", &[(10, 15.0)])]);
        let b = station(10157, longer, vec![series("TA_AVG_1.5m", "°C", &[(10, 13.0)])]);

        let cmp = comparator.merge(
            period(),
            BatchResult {
                found: vec![(10104, a), (10157, b)],
                missing: vec![],
            },
        );

        let temp = cmp.series("TA_AVG_1.5m").unwrap();
        assert_eq!(1, temp.stations.len());
        assert!(temp.stations.contains_key(&10104));
        assert!(!temp.aligned.contains_key(&10157));
        assert_eq!(vec![10157], cmp.missing_stations);
    }

    #[test]
    fn test_nothing_came_back() {
        let registry = StationRegistry::default();
        let catalog = ParameterCatalog::default();
        let groups = HeightGroups::default();
        let comparator = Comparator::new(&registry, &catalog, &groups);

        let cmp = comparator.merge(
            period(),
            BatchResult {
                found: vec![],
                missing: vec![10104, 10157],
            },
        );

        assert!(cmp.series.is_empty());
        assert!(cmp.directions.is_empty());
        assert_eq!(vec![10104, 10157], cmp.missing_stations);
    }
}
