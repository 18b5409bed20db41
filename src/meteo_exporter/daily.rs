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

//! Grouping of forecast or observation points into calendar days.

use crate::history::HistoricalTimeSeries;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use serde::Serialize;

/// Maximum number of days produced by an aggregation.
pub const MAX_DAYS: usize = 4;

const LABEL_TODAY: &str = "Hoy";
const LABEL_TOMORROW: &str = "Mañana";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
}

impl ForecastPoint {
    pub fn new(timestamp: DateTime<Utc>, temperature: f64) -> Self {
        ForecastPoint { timestamp, temperature }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Night,
}

impl DayPeriod {
    /// Period of the day a local hour falls in.
    pub fn of_hour(hour: u32) -> DayPeriod {
        match hour {
            6..=11 => DayPeriod::Morning,
            12..=19 => DayPeriod::Afternoon,
            _ => DayPeriod::Night,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAggregate {
    pub label: String,
    pub date: NaiveDate,
    pub morning: Option<ForecastPoint>,
    pub afternoon: Option<ForecastPoint>,
    pub night: Option<ForecastPoint>,
    pub temp_max: f64,
    pub temp_min: f64,
}

impl DailyAggregate {
    fn new(label: String, date: NaiveDate, first: &ForecastPoint) -> Self {
        DailyAggregate {
            label,
            date,
            morning: None,
            afternoon: None,
            night: None,
            temp_max: first.temperature,
            temp_min: first.temperature,
        }
    }

    fn add(&mut self, point: &ForecastPoint, period: DayPeriod) {
        self.temp_max = self.temp_max.max(point.temperature);
        self.temp_min = self.temp_min.min(point.temperature);

        let slot = match period {
            DayPeriod::Morning => &mut self.morning,
            DayPeriod::Afternoon => &mut self.afternoon,
            DayPeriod::Night => &mut self.night,
        };

        if slot.is_none() {
            *slot = Some(point.clone());
        }
    }
}

fn weekday_abbrev(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Lun",
        Weekday::Tue => "Mar",
        Weekday::Wed => "Mié",
        Weekday::Thu => "Jue",
        Weekday::Fri => "Vie",
        Weekday::Sat => "Sáb",
        Weekday::Sun => "Dom",
    }
}

fn day_label(index: usize, date: NaiveDate) -> String {
    match index {
        0 => LABEL_TODAY.to_owned(),
        1 => LABEL_TOMORROW.to_owned(),
        _ => weekday_abbrev(date.weekday()).to_owned(),
    }
}

/// Group points into at most `MAX_DAYS` calendar days of the given time zone.
///
/// Points are put in chronological order first. Each day keeps the first point seen in
/// the morning (06-12), afternoon (12-20) and night (20-06) of that date, while the
/// minimum and maximum temperatures cover every point of the day.
pub fn aggregate_daily<Tz: TimeZone>(points: &[ForecastPoint], tz: &Tz) -> Vec<DailyAggregate> {
    let mut sorted: Vec<&ForecastPoint> = points.iter().filter(|p| p.temperature.is_finite()).collect();
    sorted.sort_by_key(|p| p.timestamp);

    let mut days: Vec<DailyAggregate> = Vec::new();
    for point in sorted {
        let local = point.timestamp.with_timezone(tz);
        let date = local.date_naive();
        let period = DayPeriod::of_hour(local.hour());

        let idx = match days.iter().position(|d| d.date == date) {
            Some(idx) => idx,
            None if days.len() < MAX_DAYS => {
                days.push(DailyAggregate::new(day_label(days.len(), date), date, point));
                days.len() - 1
            }
            None => break,
        };

        days[idx].add(point, period);
    }

    days
}

/// Points for daily aggregation from a temperature series.
pub fn points_from_series(series: &HistoricalTimeSeries) -> Vec<ForecastPoint> {
    series
        .data
        .iter()
        .map(|p| ForecastPoint::new(p.timestamp, p.value))
        .collect()
}
