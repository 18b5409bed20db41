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

use crate::history::HistoricalTimeSeries;
use serde::Serialize;

/// Display statistics of a single series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Value of the most recent point according to the series' declared order
    pub latest: f64,
}

/// Summarize a series, or `None` if it has no points.
pub fn summarize(series: &HistoricalTimeSeries) -> Option<Summary> {
    let latest = series.latest()?.value;

    let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
    for v in series.values() {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }

    Some(Summary {
        min,
        max,
        avg: sum / series.data.len() as f64,
        latest,
    })
}

#[cfg(test)]
mod test {
    use super::summarize;
    use crate::history::{HistoricalDataPoint, HistoricalTimeSeries, SortOrder};
    use chrono::{TimeZone, Utc};

    fn series(order: SortOrder) -> HistoricalTimeSeries {
        HistoricalTimeSeries {
            parameter_code: String::from("TA_AVG_1.5m"),
            parameter_name: String::from("Temperatura media"),
            unit: String::from("°C"),
            order,
            data: [(10, 15.0), (11, 16.5), (12, 14.5)]
                .iter()
                .map(|(h, v)| HistoricalDataPoint {
                    timestamp: Utc.with_ymd_and_hms(2024, 1, 15, *h, 0, 0).unwrap(),
                    value: *v,
                    validation_flag: None,
                })
                .collect(),
        }
        .sorted(order)
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(&series(SortOrder::Ascending)).unwrap();
        assert_eq!(14.5, summary.min);
        assert_eq!(16.5, summary.max);
        assert_eq!(15.333333333333334, summary.avg);
        assert_eq!(14.5, summary.latest);
    }

    #[test]
    fn test_latest_is_most_recent_in_either_order() {
        assert_eq!(14.5, summarize(&series(SortOrder::Descending)).unwrap().latest);
        assert_eq!(14.5, summarize(&series(SortOrder::Ascending)).unwrap().latest);
    }

    #[test]
    fn test_summarize_empty() {
        let mut empty = series(SortOrder::Ascending);
        empty.data.clear();
        assert!(summarize(&empty).is_none());
    }
}
