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

//! Registry of monitored stations and the historical windows that may be requested.

use crate::catalog::SensorHeight;
use serde::{Deserialize, Serialize, Serializer};
use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
    EmptyRegistry,
    DuplicateStation(u32),
    UnsupportedPeriod(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "unable to read station registry: {}", e),
            Self::Parse(e) => write!(f, "invalid station registry: {}", e),
            Self::EmptyRegistry => write!(f, "station registry has no stations"),
            Self::DuplicateStation(id) => write!(f, "duplicate station {}", id),
            Self::UnsupportedPeriod(p) => write!(f, "unsupported period {}", p),
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: u32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Mounting height of the wind sensors at this station
    pub wind_height: SensorHeight,
}

#[derive(Debug, Clone)]
pub struct StationRegistry {
    stations: Vec<Station>,
}

impl StationRegistry {
    pub fn new(stations: Vec<Station>) -> Result<Self, ConfigError> {
        if stations.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        for (i, s) in stations.iter().enumerate() {
            if stations[..i].iter().any(|o| o.id == s.id) {
                return Err(ConfigError::DuplicateStation(s.id));
            }
        }

        Ok(StationRegistry { stations })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let stations: Vec<Station> = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        Self::new(stations)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json(&contents)
    }

    pub fn get(&self, id: u32) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn ids(&self) -> Vec<u32> {
        self.stations.iter().map(|s| s.id).collect()
    }
}

impl Default for StationRegistry {
    fn default() -> Self {
        StationRegistry {
            stations: vec![
                Station {
                    id: 10104,
                    name: String::from("Estación Campus"),
                    latitude: 42.8761,
                    longitude: -8.5569,
                    altitude: 260.0,
                    wind_height: SensorHeight::TenMeters,
                },
                Station {
                    id: 10157,
                    name: String::from("Estación Porto"),
                    latitude: 42.2328,
                    longitude: -8.7226,
                    altitude: 32.0,
                    wind_height: SensorHeight::TwoMeters,
                },
            ],
        }
    }
}

/// Length of a historical window, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    hours: u32,
}

impl Period {
    pub fn hours(&self) -> u32 {
        self.hours
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.hours)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Closed set of window lengths the upstream supports.
#[derive(Debug, Clone)]
pub struct SupportedPeriods {
    hours: Vec<u32>,
}

impl SupportedPeriods {
    pub fn new(mut hours: Vec<u32>) -> Self {
        hours.retain(|h| *h > 0);
        hours.sort_unstable();
        hours.dedup();
        SupportedPeriods { hours }
    }

    /// Parse a period such as "48" or "48h", accepting only supported lengths.
    pub fn parse(&self, s: &str) -> Result<Period, ConfigError> {
        let trimmed = s.trim();
        let digits = trimmed.strip_suffix('h').unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .ok()
            .and_then(|h| self.period(h))
            .ok_or_else(|| ConfigError::UnsupportedPeriod(s.to_owned()))
    }

    pub fn period(&self, hours: u32) -> Option<Period> {
        self.hours.contains(&hours).then_some(Period { hours })
    }

    pub fn largest(&self) -> Option<Period> {
        self.hours.last().map(|h| Period { hours: *h })
    }

    pub fn smallest(&self) -> Option<Period> {
        self.hours.first().map(|h| Period { hours: *h })
    }
}

impl Default for SupportedPeriods {
    fn default() -> Self {
        Self::new(vec![24, 48, 72])
    }
}
