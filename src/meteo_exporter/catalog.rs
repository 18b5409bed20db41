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

//! Known upstream parameter codes and how they are displayed.
//!
//! Codes that are not in the catalog are never an error: they are dropped while
//! normalizing upstream payloads. Some codes are only reported by the latest reading
//! endpoint and must not show up in historical views, so every entry records which
//! endpoints it is available from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Parameter codes with this prefix are wind speeds, reported upstream in m/s.
pub const WIND_SPEED_PREFIX: &str = "VV_";

pub const UNIT_METERS_PER_SECOND: &str = "m/s";
pub const UNIT_KMH: &str = "km/h";

pub const CODE_TEMPERATURE: &str = "TA_AVG_1.5m";
pub const CODE_HUMIDITY: &str = "HR_AVG_1.5m";
pub const CODE_WIND_AVG_10M: &str = "VV_AVG_10m";
pub const CODE_WIND_AVG_2M: &str = "VV_AVG_2m";
pub const CODE_GUST_10M: &str = "VV_RACHA_10m";
pub const CODE_GUST_2M: &str = "VV_RACHA_2m";
pub const CODE_DIRECTION_10M: &str = "DV_AVG_10m";
pub const CODE_DIRECTION_2M: &str = "DV_AVG_2m";

/// Returns true if the code names a wind speed measurement.
pub fn is_wind_speed(code: &str) -> bool {
    code.starts_with(WIND_SPEED_PREFIX)
}

/// Returns true if the unit is an angle in degrees, i.e. a compass bearing.
pub fn is_degree_unit(unit: &str) -> bool {
    matches!(unit.trim(), "º" | "°" | "deg" | "degrees" | "graos" | "grados")
}

/// Height above ground a sensor is mounted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorHeight {
    #[serde(rename = "2m")]
    TwoMeters,
    #[serde(rename = "10m")]
    TenMeters,
}

impl fmt::Display for SensorHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwoMeters => write!(f, "2m"),
            Self::TenMeters => write!(f, "10m"),
        }
    }
}

/// Upstream endpoint a parameter is reported by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Latest,
    Historical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Scalar,
    Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    LatestOnly,
    Everywhere,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterInfo {
    pub code: String,
    pub name: String,
    /// Unit after normalization (wind speeds are always km/h)
    pub unit: String,
    pub color: String,
    pub kind: ParameterKind,
    #[serde(skip)]
    pub availability: Availability,
}

impl ParameterInfo {
    fn new(code: &str, name: &str, unit: &str, color: &str, kind: ParameterKind, availability: Availability) -> Self {
        ParameterInfo {
            code: code.to_owned(),
            name: name.to_owned(),
            unit: unit.to_owned(),
            color: color.to_owned(),
            kind,
            availability,
        }
    }

    pub fn is_direction(&self) -> bool {
        self.kind == ParameterKind::Direction || is_degree_unit(&self.unit)
    }

    fn available_from(&self, endpoint: Endpoint) -> bool {
        match (self.availability, endpoint) {
            (Availability::Everywhere, _) => true,
            (Availability::LatestOnly, Endpoint::Latest) => true,
            (Availability::LatestOnly, Endpoint::Historical) => false,
        }
    }
}

/// Allow-list of parameter codes, built once at startup and shared.
#[derive(Debug, Clone)]
pub struct ParameterCatalog {
    entries: HashMap<String, ParameterInfo>,
}

impl ParameterCatalog {
    pub fn new(entries: Vec<ParameterInfo>) -> Self {
        ParameterCatalog {
            entries: entries.into_iter().map(|e| (e.code.clone(), e)).collect(),
        }
    }

    /// Look up a code as reported by the given endpoint. Codes the endpoint doesn't
    /// provide are treated the same as unknown codes.
    pub fn lookup(&self, code: &str, endpoint: Endpoint) -> Option<&ParameterInfo> {
        self.entries.get(code).filter(|e| e.available_from(endpoint))
    }

    pub fn is_known(&self, code: &str, endpoint: Endpoint) -> bool {
        self.lookup(code, endpoint).is_some()
    }

    /// All entries available from an endpoint, ordered by code.
    pub fn entries(&self, endpoint: Endpoint) -> Vec<&ParameterInfo> {
        let mut out: Vec<&ParameterInfo> = self.entries.values().filter(|e| e.available_from(endpoint)).collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }
}

impl Default for ParameterCatalog {
    fn default() -> Self {
        use Availability::{Everywhere, LatestOnly};
        use ParameterKind::{Direction, Scalar};

        Self::new(vec![
            ParameterInfo::new(CODE_TEMPERATURE, "Temperatura media", "°C", "#e74c3c", Scalar, Everywhere),
            ParameterInfo::new("TA_MAX_1.5m", "Temperatura máxima", "°C", "#c0392b", Scalar, Everywhere),
            ParameterInfo::new("TA_MIN_1.5m", "Temperatura mínima", "°C", "#3498db", Scalar, Everywhere),
            ParameterInfo::new(CODE_HUMIDITY, "Humedad relativa", "%", "#1abc9c", Scalar, Everywhere),
            ParameterInfo::new("PP_SUM_1.5m", "Precipitación", "L/m2", "#2980b9", Scalar, Everywhere),
            ParameterInfo::new("PR_AVG_1.5m", "Presión", "hPa", "#8e44ad", Scalar, Everywhere),
            ParameterInfo::new("RS_AVG_1.5m", "Radiación solar", "W/m2", "#f1c40f", Scalar, Everywhere),
            ParameterInfo::new(CODE_GUST_10M, "Racha de viento (10m)", UNIT_KMH, "#e67e22", Scalar, Everywhere),
            ParameterInfo::new(CODE_GUST_2M, "Racha de viento (2m)", UNIT_KMH, "#d35400", Scalar, Everywhere),
            ParameterInfo::new(
                CODE_DIRECTION_10M,
                "Dirección del viento (10m)",
                "º",
                "#7f8c8d",
                Direction,
                Everywhere,
            ),
            ParameterInfo::new(CODE_DIRECTION_2M, "Dirección del viento (2m)", "º", "#95a5a6", Direction, Everywhere),
            ParameterInfo::new(
                CODE_WIND_AVG_10M,
                "Velocidad del viento (10m)",
                UNIT_KMH,
                "#16a085",
                Scalar,
                LatestOnly,
            ),
            ParameterInfo::new(CODE_WIND_AVG_2M, "Velocidad del viento (2m)", UNIT_KMH, "#27ae60", Scalar, LatestOnly),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeightVariant {
    pub code: String,
    pub height: SensorHeight,
}

/// One physical quantity that is reported under a different code depending on how
/// high the sensor is mounted.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalParameter {
    pub key: String,
    pub name: String,
    pub variants: Vec<HeightVariant>,
}

impl LogicalParameter {
    pub fn new(key: &str, name: &str, variants: &[(&str, SensorHeight)]) -> Self {
        LogicalParameter {
            key: key.to_owned(),
            name: name.to_owned(),
            variants: variants
                .iter()
                .map(|(code, height)| HeightVariant {
                    code: (*code).to_owned(),
                    height: *height,
                })
                .collect(),
        }
    }

    pub fn height_of(&self, code: &str) -> Option<SensorHeight> {
        self.variants.iter().find(|v| v.code == code).map(|v| v.height)
    }

    /// Code of this quantity measured at the given height, if there is one.
    pub fn code_at(&self, height: SensorHeight) -> Option<&str> {
        self.variants.iter().find(|v| v.height == height).map(|v| v.code.as_str())
    }
}

/// Table of logical parameter to height specific codes. Adding a station with a new
/// mounting height means adding variants here, not changing merge logic.
#[derive(Debug, Clone)]
pub struct HeightGroups {
    groups: Vec<LogicalParameter>,
}

impl HeightGroups {
    pub fn new(groups: Vec<LogicalParameter>) -> Self {
        HeightGroups { groups }
    }

    /// Logical parameter a code belongs to, if it is height specific.
    pub fn group_of(&self, code: &str) -> Option<&LogicalParameter> {
        self.groups.iter().find(|g| g.height_of(code).is_some())
    }

    pub fn groups(&self) -> &[LogicalParameter] {
        &self.groups
    }
}

impl Default for HeightGroups {
    fn default() -> Self {
        use SensorHeight::{TenMeters, TwoMeters};

        Self::new(vec![
            LogicalParameter::new(
                "wind_gust",
                "Racha de viento",
                &[(CODE_GUST_10M, TenMeters), (CODE_GUST_2M, TwoMeters)],
            ),
            LogicalParameter::new(
                "wind_direction",
                "Dirección del viento",
                &[(CODE_DIRECTION_10M, TenMeters), (CODE_DIRECTION_2M, TwoMeters)],
            ),
            LogicalParameter::new(
                "wind_speed",
                "Velocidad del viento",
                &[(CODE_WIND_AVG_10M, TenMeters), (CODE_WIND_AVG_2M, TwoMeters)],
            ),
        ])
    }
}

#[cfg(test)]
mod test {
    use super::{
        is_degree_unit, is_wind_speed, Endpoint, HeightGroups, ParameterCatalog, SensorHeight, CODE_GUST_10M,
        CODE_GUST_2M, CODE_TEMPERATURE, CODE_WIND_AVG_10M,
    };

    #[test]
    fn test_latest_only_codes_hidden_from_historical() {
        let catalog = ParameterCatalog::default();
        assert!(catalog.is_known(CODE_WIND_AVG_10M, Endpoint::Latest));
        assert!(!catalog.is_known(CODE_WIND_AVG_10M, Endpoint::Historical));
        assert!(catalog.is_known(CODE_TEMPERATURE, Endpoint::Historical));
        assert!(catalog
            .entries(Endpoint::Historical)
            .iter()
            .all(|e| e.code != CODE_WIND_AVG_10M));
    }

    #[test]
    fn test_unknown_code() {
        let catalog = ParameterCatalog::default();
        assert!(catalog.lookup("XX_UNKNOWN", Endpoint::Latest).is_none());
        assert!(catalog.lookup("XX_UNKNOWN", Endpoint::Historical).is_none());
    }

    #[test]
    fn test_wind_speed_and_degrees() {
        assert!(is_wind_speed(CODE_GUST_2M));
        assert!(!is_wind_speed("DV_AVG_10m"));
        assert!(is_degree_unit("º"));
        assert!(!is_degree_unit("°C"));
    }

    #[test]
    fn test_height_groups() {
        let groups = HeightGroups::default();
        let gust = groups.group_of(CODE_GUST_2M).unwrap();
        assert_eq!("wind_gust", gust.key);
        assert_eq!(Some(SensorHeight::TenMeters), gust.height_of(CODE_GUST_10M));
        assert_eq!(Some(CODE_GUST_2M), gust.code_at(SensorHeight::TwoMeters));
        assert!(groups.group_of(CODE_TEMPERATURE).is_none());
    }

    #[test]
    fn test_direction_kind() {
        let catalog = ParameterCatalog::default();
        assert!(catalog.lookup("DV_AVG_10m", Endpoint::Historical).unwrap().is_direction());
        assert!(!catalog.lookup(CODE_GUST_10M, Endpoint::Historical).unwrap().is_direction());
    }
}
