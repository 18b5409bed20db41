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

use crate::observation::Observation;
use crate::stations::Station;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StationInfoLabels {
    station: String,
    station_name: String,
    wind_height: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StationLabels {
    station: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct MeasurementLabels {
    station: String,
    parameter: String,
    unit: String,
}

impl StationLabels {
    fn new(station: u32) -> Self {
        StationLabels {
            station: station.to_string(),
        }
    }
}

/// Holder for metrics that can be set from an `Observation`.
///
/// All metrics are created and registered upon call to `ObservationMetrics::new()`. Metrics
/// share the prefix of the registry they are registered with and have a "station" label
/// set to the numeric ID of the station (e.g. `{station="10104"}`)
#[derive(Debug)]
pub struct ObservationMetrics {
    station: Family<StationInfoLabels, Gauge>,
    up: Family<StationLabels, Gauge>,
    timestamp: Family<StationLabels, Gauge>,
    measurement: Family<MeasurementLabels, Gauge<f64, AtomicU64>>,
    apparent_temperature: Family<StationLabels, Gauge<f64, AtomicU64>>,
}

impl ObservationMetrics {
    /// Create a new `ObservationMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let station = Family::<StationInfoLabels, Gauge>::default();
        let up = Family::<StationLabels, Gauge>::default();
        let timestamp = Family::<StationLabels, Gauge>::default();
        let measurement = Family::<MeasurementLabels, Gauge<f64, AtomicU64>>::default();
        let apparent_temperature = Family::<StationLabels, Gauge<f64, AtomicU64>>::default();

        reg.register("station", "Station metadata", station.clone());
        reg.register("up", "1 if the last reading of the station was fetched, 0 otherwise", up.clone());
        reg.register(
            "observation_timestamp_seconds",
            "Time of the last reading of the station",
            timestamp.clone(),
        );
        reg.register(
            "measurement",
            "Last reading of each known parameter, in the unit given by the unit label",
            measurement.clone(),
        );
        reg.register(
            "apparent_temperature_degrees",
            "Temperature as felt, in celsius",
            apparent_temperature.clone(),
        );

        Self {
            station,
            up,
            timestamp,
            measurement,
            apparent_temperature,
        }
    }

    /// Set station metadata as labels on a single gauge
    pub fn station(&self, station: &Station) {
        self.station
            .get_or_create(&StationInfoLabels {
                station: station.id.to_string(),
                station_name: station.name.clone(),
                wind_height: station.wind_height.to_string(),
            })
            .set(1);
    }

    /// Set metrics from the provided observation if the relevant value exists.
    ///
    /// If the observation doesn't contain a value for a particular parameter, the metric
    /// will not be updated.
    pub fn observe(&self, obs: &Observation) {
        let labels = StationLabels::new(obs.station_id);
        self.up.get_or_create(&labels).set(1);
        self.timestamp.get_or_create(&labels).set(obs.timestamp.timestamp());

        if let Some(v) = obs.apparent_temperature {
            self.apparent_temperature.get_or_create(&labels).set(v);
        }

        for m in &obs.measurements {
            if let Some(v) = m.value {
                self.measurement
                    .get_or_create(&MeasurementLabels {
                        station: labels.station.clone(),
                        parameter: m.parameter_code.clone(),
                        unit: m.unit.clone(),
                    })
                    .set(v);
            }
        }
    }

    /// Mark a station as having produced no data on the last fetch.
    pub fn missing(&self, station: u32) {
        self.up.get_or_create(&StationLabels::new(station)).set(0);
    }
}
