// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use influxdb_nozzle::{
    access_token::AccessToken,
    backoff::{Backoff, BackoffPolicy},
    batch_sender::{BatchSender, BatchSenderConfig, RecoveryCallback, SendOutcome},
    cloud_controller::CloudControllerClient,
    config::NozzleConfig,
    errors::ShippingError,
    firehose::FirehoseReader,
    http_utils::build_client,
    nozzle::Nozzle,
    topology::TopologyCache,
    transport::{InfluxDbTransport, Transport},
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn client() -> reqwest::Client {
    build_client(None, Duration::from_secs(5), false).expect("failed to build client")
}

async fn mock_cloud_controller(server: &mut ServerGuard) -> Vec<mockito::Mock> {
    let apps_page_1 = server
        .mock("GET", "/v2/apps")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "1".into()),
            Matcher::UrlEncoded("results-per-page".into(), "100".into()),
        ]))
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_body(
            json!({
                "next_url": "/v2/apps?order-direction=asc&page=2&results-per-page=100",
                "resources": [
                    {"metadata": {"guid": "app-1"}, "entity": {"name": "billing", "space_guid": "space-1"}}
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let apps_page_2 = server
        .mock("GET", "/v2/apps")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_body(
            json!({
                "next_url": null,
                "resources": [
                    {"metadata": {"guid": "app-2"}, "entity": {"name": "checkout", "space_guid": "space-1"}}
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let spaces = server
        .mock("GET", "/v2/spaces")
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_status(200)
        .with_body(
            json!({
                "next_url": null,
                "resources": [
                    {"metadata": {"guid": "space-1"}, "entity": {"name": "production", "organization_guid": "org-1"}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let organizations = server
        .mock("GET", "/v2/organizations")
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_status(200)
        .with_body(
            json!({
                "next_url": null,
                "resources": [{"metadata": {"guid": "org-1"}, "entity": {"name": "acme"}}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    vec![apps_page_1, apps_page_2, spaces, organizations]
}

#[tokio::test]
async fn influxdb_transport_posts_line_protocol() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/write")
        .match_query(Matcher::UrlEncoded("db".into(), "metrics".into()))
        .match_header("content-type", "text/plain; charset=utf-8")
        .match_body("a v=1 1\nb v=2 2")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let transport = InfluxDbTransport::new(&server.url(), "metrics", client())
        .expect("failed to create transport");
    transport
        .write("a v=1 1\nb v=2 2")
        .await
        .expect("write failed");

    mock.assert_async().await;
}

#[tokio::test]
async fn influxdb_transport_reports_rejections() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/write")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body("unable to parse")
        .create_async()
        .await;

    let transport = InfluxDbTransport::new(&server.url(), "metrics", client())
        .expect("failed to create transport");
    match transport.write("garbage").await {
        Err(ShippingError::Destination(status, body)) => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(body, "unable to parse");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_destination_is_a_transport_error() {
    let transport = InfluxDbTransport::new("http://127.0.0.1:1", "metrics", client())
        .expect("failed to create transport");
    assert!(matches!(
        transport.write("a v=1 1").await,
        Err(ShippingError::Transport(_))
    ));
}

#[tokio::test]
async fn batch_sender_gives_up_after_max_retries() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/write")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let exhausted = Arc::new(Mutex::new(Vec::new()));
    let exhausted_clone = Arc::clone(&exhausted);
    let recovery: RecoveryCallback = Arc::new(move |report| {
        exhausted_clone
            .lock()
            .expect("lock poisoned")
            .push(report);
    });

    let sender = BatchSender::new(BatchSenderConfig {
        transport: Arc::new(
            InfluxDbTransport::new(&server.url(), "metrics", client())
                .expect("failed to create transport"),
        ),
        backoff: Backoff::new(
            BackoffPolicy::Exponential,
            Duration::from_millis(1),
            Duration::from_millis(10),
        ),
        max_retries: 2,
        recovery: Some(recovery),
    });

    let outcome = sender
        .send(vec!["a v=1 1".to_string(), "b v=1 1".to_string()])
        .await;

    assert_eq!(outcome, SendOutcome::Exhausted { attempts: 3 });
    mock.assert_async().await;
    let exhausted = exhausted.lock().expect("lock poisoned");
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].attempts, 3);
    assert_eq!(exhausted[0].batch_size, 2);
}

#[tokio::test]
async fn cloud_controller_topology_is_paginated() {
    let mut server = Server::new_async().await;
    let mocks = mock_cloud_controller(&mut server).await;

    let source = CloudControllerClient::new(
        &server.url(),
        AccessToken::new("test-token"),
        client(),
    )
    .expect("failed to create client");
    let cache = TopologyCache::new(Arc::new(source));
    cache.refresh().await;

    for mock in &mocks {
        mock.assert_async().await;
    }

    let first = cache.lookup("app-1");
    assert_eq!(first.application_name.as_deref(), Some("billing"));
    assert_eq!(first.space_name.as_deref(), Some("production"));
    assert_eq!(first.organization_name.as_deref(), Some("acme"));

    let second = cache.lookup("app-2");
    assert_eq!(second.application_name.as_deref(), Some("checkout"));
    assert_eq!(second.organization_id.as_deref(), Some("org-1"));

    assert!(!cache.lookup("app-3").is_known());
}

#[tokio::test]
async fn cloud_controller_failure_keeps_previous_topology() {
    let mut server = Server::new_async().await;
    let mocks = mock_cloud_controller(&mut server).await;

    let source = CloudControllerClient::new(
        &server.url(),
        AccessToken::new("test-token"),
        client(),
    )
    .expect("failed to create client");
    let cache = TopologyCache::new(Arc::new(source));
    cache.refresh().await;

    for mock in mocks {
        mock.remove_async().await;
    }
    let _failing = server
        .mock("GET", Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    cache.refresh().await;

    assert_eq!(
        cache.lookup("app-1").organization_name.as_deref(),
        Some("acme")
    );
}

#[tokio::test]
async fn firehose_to_influxdb() {
    let mut cloud_controller = Server::new_async().await;
    let _topology = mock_cloud_controller(&mut cloud_controller).await;

    let mut influxdb = Server::new_async().await;
    let full_batch = influxdb
        .mock("POST", "/write")
        .match_query(Matcher::UrlEncoded("db".into(), "cf".into()))
        .match_body(
            "test.latency,eventType=ValueMetric,foundation=lab value=12.5,unit=\"ms\" 1000\n\
             gorouter.requests,eventType=CounterEvent,foundation=lab total=105,delta=5 7",
        )
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let tail_batch = influxdb
        .mock("POST", "/write")
        .match_query(Matcher::UrlEncoded("db".into(), "cf".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("^rep\\.ContainerMetric,".to_string()),
            Matcher::Regex("applicationName=billing".to_string()),
            Matcher::Regex("organizationName=acme".to_string()),
            Matcher::Regex("cpuPercentage=0\\.5 42$".to_string()),
        ]))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let config = NozzleConfig {
        foundation: "lab".to_string(),
        db_host: influxdb.url(),
        db_name: "cf".to_string(),
        batch_size: 2,
        ..Default::default()
    };

    let topology = Arc::new(TopologyCache::new(Arc::new(
        CloudControllerClient::new(
            &cloud_controller.url(),
            AccessToken::new("test-token"),
            client(),
        )
        .expect("failed to create client"),
    )));
    topology.refresh().await;

    let (nozzle, batch_rx) = Nozzle::from_config(&config, topology);
    let sender = BatchSender::new(BatchSenderConfig {
        transport: Arc::new(
            InfluxDbTransport::new(&config.db_host, &config.db_name, client())
                .expect("failed to create transport"),
        ),
        backoff: config.backoff(),
        max_retries: config.max_retries,
        recovery: None,
    });
    let sender_handle = tokio::spawn(sender.start(batch_rx));

    let input = [
        json!({"origin": "test", "eventType": "ValueMetric", "timestamp": 1000,
               "valueMetric": {"name": "latency", "value": 12.5, "unit": "ms"}}),
        json!({"origin": "gorouter", "eventType": "CounterEvent", "timestamp": 7,
               "counterEvent": {"name": "requests", "delta": 5, "total": 105}}),
        json!({"origin": "rep", "eventType": "ContainerMetric", "timestamp": 42,
               "containerMetric": {"applicationId": "app-1", "cpuPercentage": 0.5}}),
    ]
    .iter()
    .map(|envelope| envelope.to_string())
    .collect::<Vec<_>>()
    .join("\n");

    let stats = FirehoseReader::new(input.as_bytes(), Arc::new(nozzle), CancellationToken::new())
        .spin()
        .await;
    assert_eq!(stats.encoded, 3);

    // The reader owned the last handle to the buffer, so the channel is closed now
    tokio::time::timeout(Duration::from_secs(5), sender_handle)
        .await
        .expect("sender did not finish")
        .expect("sender task failed");

    full_batch.assert_async().await;
    tail_batch.assert_async().await;
}
