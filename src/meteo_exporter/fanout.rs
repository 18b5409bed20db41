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

//! Concurrent per-station requests where a failing station never affects the others.

use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Give up on a single station after this long
    pub timeout: Option<Duration>,
    /// Additional attempts for a station after its first failure
    pub retries: u32,
}

/// Results of a multi-station request: stations that produced data and stations that
/// didn't.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult<T> {
    /// Stations with data, in the order they were requested
    pub found: Vec<(u32, T)>,
    /// Stations whose request failed, in the order they were requested. After
    /// `flatten()` these are followed by the stations that answered with nothing.
    pub missing: Vec<u32>,
}

impl<T> BatchResult<T> {
    /// True if no station produced data.
    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    /// True if some but not all stations produced data.
    pub fn is_partial(&self) -> bool {
        !self.found.is_empty() && !self.missing.is_empty()
    }

    pub fn get(&self, station: u32) -> Option<&T> {
        self.found.iter().find(|(id, _)| *id == station).map(|(_, v)| v)
    }
}

impl<T> BatchResult<Option<T>> {
    /// Treat stations that answered with nothing the same as stations that failed. They
    /// are appended to `missing` after the stations that failed, in request order.
    pub fn flatten(self) -> BatchResult<T> {
        let mut found = Vec::with_capacity(self.found.len());
        let mut missing = self.missing;

        for (id, v) in self.found {
            match v {
                Some(v) => found.push((id, v)),
                None => missing.push(id),
            }
        }

        BatchResult { found, missing }
    }
}

/// Run `fetch` for every station concurrently and join the results.
///
/// Errors and timeouts are logged and turn the station into a missing entry. Nothing
/// is shared between the per-station futures.
pub async fn fetch_each<T, E, F, Fut>(stations: &[u32], opts: FetchOptions, fetch: F) -> BatchResult<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let results = join_all(stations.iter().map(|id| fetch_one(*id, opts, &fetch))).await;

    let mut found = Vec::with_capacity(results.len());
    let mut missing = Vec::new();
    for (id, res) in results {
        match res {
            Some(v) => found.push((id, v)),
            None => missing.push(id),
        }
    }

    BatchResult { found, missing }
}

async fn fetch_one<T, E, F, Fut>(station: u32, opts: FetchOptions, fetch: &F) -> (u32, Option<T>)
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0;

    loop {
        let res = match opts.timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch(station)).await {
                Ok(r) => r.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {}ms", limit.as_millis())),
            },
            None => fetch(station).await.map_err(|e| e.to_string()),
        };

        match res {
            Ok(v) => return (station, Some(v)),
            Err(e) if attempt < opts.retries => {
                attempt += 1;
                tracing::debug!(message = "retrying station request", station = station, attempt = attempt, error = %e);
            }
            Err(e) => {
                tracing::warn!(message = "station request failed, treating as no data", station = station, error = %e);
                return (station, None);
            }
        }
    }
}
