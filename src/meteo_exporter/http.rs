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

use crate::catalog::{HeightGroups, ParameterCatalog, CODE_TEMPERATURE};
use crate::client::{ClientError, MeteoClient};
use crate::compare::{Comparator, Comparison};
use crate::daily::{aggregate_daily, points_from_series, DailyAggregate};
use crate::fanout::FetchOptions;
use crate::history::{build_history, HistoryError, SortOrder, StationHistoricalData, HISTORY_ORDER};
use crate::observation::{fetch_latest, Observation};
use crate::stations::{Period, Station, StationRegistry, SupportedPeriods};
use crate::stats::{summarize, Summary};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

// Content-Type for the Prometheus text exposition format
const TEXT_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Everything a request handler needs, built once at startup.
#[derive(Debug)]
pub struct RequestContext {
    pub registry: Registry,
    pub client: MeteoClient,
    pub stations: StationRegistry,
    pub catalog: ParameterCatalog,
    pub groups: HeightGroups,
    pub periods: SupportedPeriods,
    pub fetch: FetchOptions,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::NoData { .. } | HistoryError::UnknownStation(_) => ApiError::NotFound(e.to_string()),
            HistoryError::Client(e) => e.into(),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::InvalidStation(_) => ApiError::NotFound(e.to_string()),
            _ => ApiError::Upstream(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    period: Option<String>,
    order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    period: Option<String>,
    code: String,
}

#[derive(Debug, Deserialize)]
pub struct CompareParams {
    stations: Option<String>,
    period: Option<String>,
}

pub fn router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/metrics", get(text_metrics))
        .route("/stations", get(list_stations))
        .route("/stations/:id/latest", get(latest))
        .route("/stations/:id/history", get(history))
        .route("/stations/:id/summary", get(summary))
        .route("/stations/:id/daily", get(daily))
        .route("/compare", get(compare))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

pub async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, TEXT_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn list_stations(State(context): State<Arc<RequestContext>>) -> Json<Vec<Station>> {
    Json(context.stations.stations().to_vec())
}

async fn latest(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<u32>,
) -> Result<Json<Observation>, ApiError> {
    let station = find_station(&context, id)?;
    fetch_latest(&context.client, &context.catalog, station.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no latest reading for station {}", id)))
}

async fn history(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<u32>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<StationHistoricalData>, ApiError> {
    let station = find_station(&context, id)?;
    let period = parse_period(&context.periods, params.period.as_deref())?;
    let order = match params.order.as_deref() {
        Some(o) => SortOrder::parse(o).ok_or_else(|| ApiError::BadRequest(format!("invalid order {}", o)))?,
        None => HISTORY_ORDER,
    };

    Ok(Json(station_history(&context, station, period, order).await?))
}

async fn summary(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<u32>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<Summary>, ApiError> {
    let station = find_station(&context, id)?;
    let period = parse_period(&context.periods, params.period.as_deref())?;
    let data = station_history(&context, station, period, HISTORY_ORDER).await?;

    data.series(&params.code)
        .and_then(summarize)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no {} data for station {}", params.code, id)))
}

async fn daily(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<u32>,
) -> Result<Json<Vec<DailyAggregate>>, ApiError> {
    let station = find_station(&context, id)?;
    let period = context
        .periods
        .largest()
        .ok_or_else(|| ApiError::NotFound(String::from("no supported periods")))?;
    let data = station_history(&context, station, period, SortOrder::Ascending).await?;

    let points = data.series(CODE_TEMPERATURE).map(points_from_series).unwrap_or_default();
    Ok(Json(aggregate_daily(&points, &chrono::Local)))
}

async fn compare(
    State(context): State<Arc<RequestContext>>,
    Query(params): Query<CompareParams>,
) -> Result<Json<Comparison>, ApiError> {
    let period = parse_period(&context.periods, params.period.as_deref())?;
    let stations = match params.stations.as_deref() {
        Some(s) => parse_station_list(s)?,
        None => context.stations.ids(),
    };

    let comparator = Comparator::new(&context.stations, &context.catalog, &context.groups);
    let comparison = comparator
        .compare(&context.client, &stations, period, context.fetch)
        .instrument(tracing::info_span!("compare", period = %period))
        .await;

    if !comparison.missing_stations.is_empty() {
        tracing::info!(
            message = "comparison is missing stations",
            missing = ?comparison.missing_stations,
            requested = stations.len(),
        );
    }

    Ok(Json(comparison))
}

async fn station_history(
    context: &RequestContext,
    station: &Station,
    period: Period,
    order: SortOrder,
) -> Result<StationHistoricalData, HistoryError> {
    let res = context.client.history(station.id, period).await?;
    build_history(&res, station, period, &context.catalog, order)
}

fn find_station(context: &RequestContext, id: u32) -> Result<&Station, ApiError> {
    context
        .stations
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown station {}", id)))
}

fn parse_period(periods: &SupportedPeriods, period: Option<&str>) -> Result<Period, ApiError> {
    match period {
        Some(p) => periods.parse(p).map_err(|e| ApiError::BadRequest(e.to_string())),
        None => periods
            .smallest()
            .ok_or_else(|| ApiError::BadRequest(String::from("no supported periods"))),
    }
}

fn parse_station_list(s: &str) -> Result<Vec<u32>, ApiError> {
    let mut ids = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part
            .parse::<u32>()
            .map_err(|_| ApiError::BadRequest(format!("invalid station {}", part)))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    if ids.is_empty() {
        return Err(ApiError::BadRequest(String::from("no stations requested")));
    }

    Ok(ids)
}

#[cfg(test)]
mod test {
    use super::{parse_period, parse_station_list, text_metrics, ApiError, RequestContext};
    use crate::catalog::{HeightGroups, ParameterCatalog};
    use crate::client::MeteoClient;
    use crate::fanout::FetchOptions;
    use crate::history::HistoryError;
    use crate::stations::{StationRegistry, SupportedPeriods};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use prometheus_client::registry::Registry;
    use reqwest::Client;
    use std::sync::Arc;

    #[test]
    fn test_parse_station_list() {
        assert_eq!(vec![10104, 10157], parse_station_list("10104, 10157,10104").unwrap());
        assert!(matches!(parse_station_list("10104,abc"), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_station_list(" , "), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_parse_period() {
        let periods = SupportedPeriods::default();
        assert_eq!(24, parse_period(&periods, None).unwrap().hours());
        assert_eq!(72, parse_period(&periods, Some("72h")).unwrap().hours());
        assert!(matches!(parse_period(&periods, Some("6h")), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_no_data_is_not_found() {
        let period = SupportedPeriods::default().parse("24h").unwrap();
        let res = ApiError::from(HistoryError::NoData { station: 1, period }).into_response();
        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }

    #[tokio::test]
    async fn test_text_metrics() {
        let context = Arc::new(RequestContext {
            registry: Registry::with_prefix("meteo"),
            client: MeteoClient::new(Client::new(), "http://localhost/").unwrap(),
            stations: StationRegistry::default(),
            catalog: ParameterCatalog::default(),
            groups: HeightGroups::default(),
            periods: SupportedPeriods::default(),
            fetch: FetchOptions::default(),
        });

        let res = text_metrics(State(context)).await;
        assert_eq!(StatusCode::OK, res.status());
    }
}
