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

use crate::stations::Period;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

/// Value the upstream reports in place of a missing reading.
pub const MISSING_VALUE_SENTINEL: f64 = -9999.0;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    InvalidStation(u32),
    Malformed(serde_json::Error),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(e) => write!(f, "invalid base URL: {}", e),
            Self::InvalidStation(s) => write!(f, "invalid station {}", s),
            Self::Malformed(e) => write!(f, "malformed response body: {}", e),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for the upstream station network API.
#[derive(Debug, Clone)]
pub struct MeteoClient {
    client: Client,
    base_url: Url,
}

impl MeteoClient {
    const USER_AGENT: &'static str = "meteo_exporter (https://github.com/56quarters/meteo_exporter)";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(MeteoClient { client, base_url })
    }

    /// Fetch the most recent reading batch for a station.
    pub async fn latest(&self, station: u32) -> Result<LatestResponse, ClientError> {
        let request_url = self.latest_url(station)?;
        tracing::debug!(message = "making latest reading request", url = %request_url);

        let res = self.make_request(station, request_url).await?;
        Self::decode(res).await
    }

    /// Fetch all readings for a station over the given window.
    pub async fn history(&self, station: u32, period: Period) -> Result<HistoryResponse, ClientError> {
        let request_url = self.history_url(station, period)?;
        tracing::debug!(message = "making historical readings request", url = %request_url);

        let res = self.make_request(station, request_url).await?;
        Self::decode(res).await
    }

    async fn make_request(&self, station: u32, url: Url) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let status = res.status();
        if status == StatusCode::OK {
            Ok(res)
        } else if status == StatusCode::NOT_FOUND {
            Err(ClientError::InvalidStation(station))
        } else {
            Err(ClientError::Unexpected(status, url))
        }
    }

    async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ClientError> {
        let body = res.bytes().await.map_err(ClientError::Internal)?;
        serde_json::from_slice(&body).map_err(ClientError::Malformed)
    }

    fn latest_url(&self, station: u32) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join("ultimos10minEstacionsMeteo.action")
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("idEst", &station.to_string());
        Ok(url)
    }

    fn history_url(&self, station: u32, period: Period) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join("ultimosHorariosEstacions.action")
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("idEst", &station.to_string())
            .append_pair("numHoras", &period.hours().to_string());
        Ok(url)
    }
}

/// Parse an upstream instant. Instants without an offset are UTC.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|n| n.and_utc())
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LatestResponse {
    #[serde(alias = "listUltimos10min", default)]
    pub readings: Vec<LatestReading>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LatestReading {
    #[serde(alias = "idEstacion")]
    pub station_id: Option<u32>,
    #[serde(alias = "estacion")]
    pub station_name: Option<String>,
    #[serde(alias = "instanteLecturaUTC")]
    pub instant: Option<String>,
    #[serde(alias = "listaMedidas", default)]
    pub measures: Vec<RawMeasure>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HistoryResponse {
    #[serde(alias = "listHorarios", default)]
    pub stations: Vec<HistoryStation>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryStation {
    #[serde(alias = "idEstacion")]
    pub station_id: Option<u32>,
    #[serde(alias = "estacion")]
    pub station_name: Option<String>,
    #[serde(alias = "listaInstantes", default)]
    pub instants: Vec<HistoryInstant>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryInstant {
    #[serde(alias = "instanteLecturaUTC")]
    pub instant: String,
    #[serde(alias = "listaMedidas", default)]
    pub measures: Vec<RawMeasure>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RawMeasure {
    #[serde(alias = "codigoParametro")]
    pub code: String,
    #[serde(alias = "nomeParametro", default)]
    pub name: String,
    #[serde(alias = "unidade", default)]
    pub unit: String,
    #[serde(alias = "valor")]
    pub value: Option<f64>,
    #[serde(alias = "lnCodigoValidacion")]
    pub validation: Option<i32>,
}

impl RawMeasure {
    /// Reported value, treating the upstream missing sentinel as absent.
    pub fn reading(&self) -> Option<f64> {
        self.value.filter(|v| *v != MISSING_VALUE_SENTINEL && v.is_finite())
    }
}

#[cfg(test)]
mod test {
    use super::{parse_instant, HistoryResponse, LatestResponse, MeteoClient};
    use crate::stations::SupportedPeriods;
    use chrono::{TimeZone, Utc};
    use reqwest::Client;

    const LATEST: &str = r#"{"listUltimos10min": [{
        "idEstacion": 10104,
        "estacion": "Estación Campus",
        "instanteLecturaUTC": "2024-01-15T10:00:00",
        "listaMedidas": [
            {"codigoParametro": "TA_AVG_1.5m", "nomeParametro": "Temperatura", "unidade": "°C", "valor": 12.5, "lnCodigoValidacion": 1},
            {"codigoParametro": "HR_AVG_1.5m", "nomeParametro": "Humidade", "unidade": "%", "valor": -9999.0, "lnCodigoValidacion": 9}
        ]
    }]}"#;

    #[test]
    fn test_decode_latest() {
        let res: LatestResponse = serde_json::from_str(LATEST).unwrap();
        let reading = &res.readings[0];
        assert_eq!(Some(10104), reading.station_id);
        assert_eq!(Some(12.5), reading.measures[0].reading());
        assert_eq!(None, reading.measures[1].reading());
        assert_eq!(Some(9), reading.measures[1].validation);
    }

    #[test]
    fn test_decode_empty_history() {
        let res: HistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(res.stations.is_empty());
    }

    #[test]
    fn test_parse_instant() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(Some(expected), parse_instant("2024-01-15T10:00:00"));
        assert_eq!(Some(expected), parse_instant("2024-01-15T11:00:00+01:00"));
        assert_eq!(Some(expected), parse_instant("2024-01-15 10:00:00"));
        assert_eq!(None, parse_instant("yesterday"));
    }

    #[test]
    fn test_urls() {
        let client = MeteoClient::new(Client::new(), "https://example.com/api/").unwrap();
        let period = SupportedPeriods::default().parse("48h").unwrap();
        assert_eq!(
            "https://example.com/api/ultimos10minEstacionsMeteo.action?idEst=10104",
            client.latest_url(10104).unwrap().as_str()
        );
        assert_eq!(
            "https://example.com/api/ultimosHorariosEstacions.action?idEst=10104&numHoras=48",
            client.history_url(10104, period).unwrap().as_str()
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(MeteoClient::new(Client::new(), "not a url").is_err());
    }
}
