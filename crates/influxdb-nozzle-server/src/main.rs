// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;
use tokio::{
    io::BufReader,
    time::{timeout, Duration},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use influxdb_nozzle::{
    access_token::AccessToken,
    batch_sender::{BatchSender, BatchSenderConfig},
    cloud_controller::CloudControllerClient,
    config::NozzleConfig,
    firehose::FirehoseReader,
    http_utils::build_client,
    nozzle::Nozzle,
    topology::TopologyCache,
    transport::InfluxDbTransport,
};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
pub async fn main() {
    let config = match NozzleConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // The subscriber is not installed yet
            eprintln!("Invalid nozzle configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config.log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let client = match build_client(
        config.https_proxy.as_deref(),
        config.http_timeout,
        config.skip_ssl_validation,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let cancel_token = CancellationToken::new();
    let topology = start_topology(&config, client.clone(), cancel_token.clone());

    let transport = match InfluxDbTransport::new(&config.db_host, &config.db_name, client) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Error creating InfluxDB transport: {e}");
            std::process::exit(1);
        }
    };
    info!("Writing to {}", transport.write_url());

    let (nozzle, batch_rx) = Nozzle::from_config(&config, topology);
    let sender = BatchSender::new(BatchSenderConfig {
        transport: Arc::new(transport),
        backoff: config.backoff(),
        max_retries: config.max_retries,
        recovery: None,
    });
    let sender_handle = tokio::spawn(sender.start(batch_rx));

    let reader = FirehoseReader::new(
        BufReader::new(tokio::io::stdin()),
        Arc::new(nozzle),
        cancel_token.clone(),
    );
    let reader_handle = tokio::spawn(reader.spin());

    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            signal_token.cancel();
        }
    });

    if let Err(e) = reader_handle.await {
        error!("Firehose reader failed: {e}");
    }
    cancel_token.cancel();

    match timeout(SHUTDOWN_GRACE_PERIOD, sender_handle).await {
        Ok(Ok(())) => info!("All batches sent"),
        Ok(Err(e)) => error!("Batch sender failed: {e}"),
        Err(_) => warn!(
            "Batches still in flight after {}s, exiting",
            SHUTDOWN_GRACE_PERIOD.as_secs()
        ),
    }

    // A pending stdin read cannot be cancelled and would keep the runtime from shutting down
    std::process::exit(0);
}

/// Builds the topology cache and spawns its refresh loop. Without an API host the cache stays
/// empty and points carry no application lineage.
fn start_topology(
    config: &NozzleConfig,
    client: reqwest::Client,
    cancel_token: CancellationToken,
) -> Arc<TopologyCache> {
    let Some(api_host) = config.api_host.as_deref() else {
        info!("No Cloud Controller configured, topology enrichment disabled");
        return Arc::new(TopologyCache::disabled());
    };

    let Some(access_token) = config.access_token.as_deref().map(AccessToken::new) else {
        warn!("No Cloud Controller access token configured, topology enrichment disabled");
        return Arc::new(TopologyCache::disabled());
    };
    let source = match CloudControllerClient::new(api_host, access_token, client) {
        Ok(source) => source,
        Err(e) => {
            error!("Topology enrichment disabled: {e}");
            return Arc::new(TopologyCache::disabled());
        }
    };

    let topology = Arc::new(TopologyCache::new(Arc::new(source)));
    tokio::spawn(
        Arc::clone(&topology).run_refresh_loop(config.topology_refresh_interval, cancel_token),
    );
    topology
}
