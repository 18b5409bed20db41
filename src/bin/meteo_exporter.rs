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

use clap::Parser;
use meteo_exporter::catalog::{HeightGroups, ParameterCatalog};
use meteo_exporter::client::MeteoClient;
use meteo_exporter::fanout::FetchOptions;
use meteo_exporter::http::RequestContext;
use meteo_exporter::metrics::ObservationMetrics;
use meteo_exporter::observation::fetch_latest_batch;
use meteo_exporter::stations::{StationRegistry, SupportedPeriods};
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9783);
const DEFAULT_REFERSH_SECS: u64 = 600;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_RETRIES: u32 = 0;
const DEFAULT_API_URL: &str = "https://servizos.meteogalicia.gal/mgrss/observacion/";
const METRICS_PREFIX: &str = "meteo";

#[derive(Debug, Parser)]
#[clap(name = "meteo_exporter", version = clap::crate_version!())]
struct MeteoExporterApplication {
    /// JSON file with the stations to monitor. The built-in stations are used if not set
    #[clap(long)]
    stations_file: Option<PathBuf>,

    /// Base URL for the station network API
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch latest readings from the station network API at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFERSH_SECS)]
    refresh_secs: u64,

    /// Timeout for fetching data for a single station, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Number of times a failed request for a station is retried before the station
    /// is treated as having no data.
    #[clap(long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Supported historical window lengths, in hours, comma separated.
    #[clap(long, value_delimiter = ',', default_values_t = vec![24, 48, 72])]
    periods: Vec<u32>,

    /// Address to bind to. By default, meteo_exporter will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = MeteoExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let stations = match &opts.stations_file {
        Some(path) => StationRegistry::from_file(path).unwrap_or_else(|e| {
            tracing::error!(message = "unable to load station registry", path = %path.display(), error = %e);
            process::exit(1)
        }),
        None => StationRegistry::default(),
    };

    let periods = SupportedPeriods::new(opts.periods.clone());
    if periods.largest().is_none() {
        tracing::error!(message = "no supported periods configured", periods = ?opts.periods);
        process::exit(1)
    }

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = MeteoClient::new(http_client, &opts.api_url).unwrap_or_else(|e| {
        tracing::error!(message = "invalid API URL", api_url = %opts.api_url, error = %e);
        process::exit(1)
    });

    let fetch = FetchOptions {
        timeout: Some(timeout),
        retries: opts.retries,
    };

    let catalog = ParameterCatalog::default();
    let mut registry = Registry::with_prefix(METRICS_PREFIX);
    let metrics = ObservationMetrics::new(&mut registry);
    for station in stations.stations() {
        metrics.station(station);
    }

    // Make an initial request for every station. This allows us to warn about stations
    // that aren't returning data before starting the HTTP server and running indefinitely.
    let ids = stations.ids();
    let initial = fetch_latest_batch(&client, &catalog, &ids, fetch).await;
    if initial.is_empty() {
        tracing::warn!(message = "no station returned an initial reading", stations = ?ids);
    } else {
        for station in &initial.missing {
            tracing::warn!(message = "station returned no initial reading", station = station);
        }
    }

    let poll_client = client.clone();
    let poll_catalog = catalog.clone();
    let mut interval = tokio::time::interval(Duration::from_secs(opts.refresh_secs));

    tokio::spawn(async move {
        tracing::info!(message = "observation polling started", stations = ?ids);

        loop {
            let _ = interval.tick().await;
            let batch = fetch_latest_batch(&poll_client, &poll_catalog, &ids, fetch)
                .instrument(tracing::span!(Level::DEBUG, "latest_readings"))
                .await;

            for (_, obs) in &batch.found {
                metrics.observe(obs);
            }

            for station in &batch.missing {
                metrics.missing(*station);
            }

            tracing::info!(
                message = "fetched latest readings",
                found = batch.found.len(),
                missing = batch.missing.len(),
            );
        }
    });

    let context = Arc::new(RequestContext {
        registry,
        client,
        stations,
        catalog,
        groups: HeightGroups::default(),
        periods,
        fetch,
    });

    let app = meteo_exporter::http::router(context);
    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(app.into_make_service());

    tracing::info!(message = "server started", address = %server.local_addr());
    server
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
