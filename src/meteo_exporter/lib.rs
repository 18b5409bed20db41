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

//! Weather station observation engine and Prometheus exporter
//!
//! ## Features
//!
//! `meteo_exporter` fetches readings for a small, fixed set of weather stations from an
//! upstream station network API and turns them into a stable internal model:
//!
//! * Latest readings become an `Observation` per station, with wind speeds converted to
//!   km/h, unknown parameter codes dropped and an apparent temperature derived.
//! * Historical windows (e.g. the last 24, 48 or 72 hours) become one time series per
//!   parameter, most recent first.
//! * Historical windows of several stations are merged into comparison series on a
//!   shared timestamp axis. The same quantity measured at different sensor heights
//!   (10m vs 2m wind gusts) is merged into one logical series that records which height
//!   each station's values come from. Wind directions are reported as the latest value
//!   per station instead of a series.
//! * Points can be grouped into calendar days with morning, afternoon and night samples
//!   and daily minimum and maximum temperatures.
//! * Any series can be summarized to its minimum, maximum, average and latest value.
//!
//! Requests for several stations are made concurrently and a station that fails is
//! reported as missing instead of failing the whole request.
//!
//! ## Usage
//!
//! The `meteo_exporter` binary polls the latest reading of every registered station
//! and exposes them as Prometheus metrics on port `9783` at `/metrics`, along with
//! JSON endpoints for the engine's outputs:
//!
//! ```text
//! ./meteo_exporter --stations-file stations.json
//! curl -sS 'http://localhost:9783/compare?stations=10104,10157&period=48h' | jq
//! ```
//!
//! The station file is a JSON list of stations:
//!
//! ```text
//! [{"id": 10104, "name": "Estación Campus", "latitude": 42.8761, "longitude": -8.5569,
//!   "altitude": 260.0, "wind_height": "10m"}]
//! ```
//!

pub mod catalog;
pub mod client;
pub mod compare;
pub mod daily;
pub mod fanout;
pub mod history;
pub mod http;
pub mod metrics;
pub mod observation;
pub mod stations;
pub mod stats;
pub mod units;
