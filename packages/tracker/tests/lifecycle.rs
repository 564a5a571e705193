//! Lifecycle tests over in-memory chains
//!
//! Each test scripts source, destination and hub state on `MockChain`
//! readers and drives `HyperClient` the way the tracker binary does.

use futures::StreamExt;
use hyperclient_rs::calldata::encode_timeout_calldata;
use hyperclient_rs::testing::{MockChain, MockHistory};
use hyperclient_rs::{
    ChainConfig, ClientConfig, EventMetadata, HyperClient, LifecycleEvent, MessageStatus,
    PostRequest, PostResponse, RecordedStatus, RetryConfig, TimeoutStatus, TrackerError,
    TrackerSettings,
};
use std::sync::Arc;
use std::time::Duration;

const SOURCE: &str = "EVM-97";
const DEST: &str = "EVM-10200";
const HUB: &str = "KUSAMA-4009";
const SOURCE_HOST: &str = "0x1111111111111111111111111111111111111111";
const T: u64 = 1_700_000_000;

struct Harness {
    source: Arc<MockChain>,
    dest: Arc<MockChain>,
    hub: Arc<MockChain>,
    client: HyperClient,
}

fn harness() -> Harness {
    let config = ClientConfig {
        source: ChainConfig::new("http://source", SOURCE, SOURCE_HOST, "BSC0"),
        dest: ChainConfig::new(
            "http://dest",
            DEST,
            "0x2222222222222222222222222222222222222222",
            "GNO0",
        ),
        hyperbridge: ChainConfig::new("ws://hub", HUB, "", "PAS0"),
        indexer_url: None,
    };
    let source = Arc::new(MockChain::new(SOURCE));
    let dest = Arc::new(MockChain::new(DEST));
    let hub = Arc::new(MockChain::new(HUB));

    let client = HyperClient::with_readers(config, source.clone(), dest.clone(), hub.clone())
        .unwrap()
        .with_settings(TrackerSettings {
            poll_interval: Duration::from_millis(10),
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
        });

    Harness {
        source,
        dest,
        hub,
        client,
    }
}

fn request(timeout_timestamp: u64) -> PostRequest {
    PostRequest {
        source: SOURCE.to_string(),
        dest: DEST.to_string(),
        nonce: 7,
        from: vec![0xaa; 20],
        to: vec![0xbb; 20],
        timeout_timestamp,
        body: b"hello".to_vec(),
        height: 50,
    }
}

async fn next_within<S: futures::Stream + Unpin>(stream: &mut S) -> Option<S::Item> {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream stalled")
}

// ============================================================================
// Status queries
// ============================================================================

mod status {
    use super::*;

    #[tokio::test]
    async fn test_pending_before_timeout() {
        let h = harness();
        h.dest.set_timestamp(T - 1);
        let status = h.client.query_request_status(&request(T)).await.unwrap();
        assert_eq!(status, MessageStatus::Pending);
    }

    #[tokio::test]
    async fn test_timeout_at_deadline() {
        let h = harness();
        h.dest.set_timestamp(T);
        let status = h.client.query_request_status(&request(T)).await.unwrap();
        assert_eq!(status, MessageStatus::Timeout);
    }

    #[tokio::test]
    async fn test_delivery_wins_regardless_of_hub() {
        let h = harness();
        let req = request(T);
        h.dest.set_timestamp(T + 100);
        h.dest
            .add_request_receipt(req.commitment(), EventMetadata::at_height(31));
        h.hub
            .add_request_receipt(req.commitment(), EventMetadata::at_height(200));

        let status = h.client.query_request_status(&req).await.unwrap();
        assert_eq!(
            status,
            MessageStatus::DestinationDelivered {
                meta: EventMetadata::at_height(31)
            }
        );
        // The destination receipt alone settles it
        assert_eq!(h.hub.reads(), 0);
    }

    #[tokio::test]
    async fn test_source_finalized() {
        let h = harness();
        h.dest.set_timestamp(T - 1);
        h.hub.set_state_machine_height(SOURCE, 49);
        assert_eq!(
            h.client.query_request_status(&request(T)).await.unwrap(),
            MessageStatus::Pending
        );

        h.hub.set_state_machine_height(SOURCE, 60);
        assert_eq!(
            h.client.query_request_status(&request(T)).await.unwrap(),
            MessageStatus::SourceFinalized {
                finalized_height: 60
            }
        );
    }

    #[tokio::test]
    async fn test_hub_delivered_then_finalized() {
        let h = harness();
        let req = request(0);
        h.hub
            .add_request_receipt(req.commitment(), EventMetadata::at_height(200));
        h.dest.set_state_machine_height(HUB, 150);

        assert!(matches!(
            h.client.query_request_status(&req).await.unwrap(),
            MessageStatus::HyperbridgeDelivered { .. }
        ));

        h.dest.set_state_machine_height(HUB, 200);
        assert_eq!(
            h.client.query_request_status(&req).await.unwrap(),
            MessageStatus::HyperbridgeFinalized {
                finalized_height: 200
            }
        );
    }

    #[tokio::test]
    async fn test_query_is_idempotent() {
        let h = harness();
        let req = request(T);
        h.dest.set_timestamp(T - 5);
        h.hub
            .add_request_receipt(req.commitment(), EventMetadata::at_height(10));

        let first = h.client.query_request_status(&req).await.unwrap();
        let second = h.client.query_request_status(&req).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_response_is_tracked_back_to_source() {
        let h = harness();
        let response = PostResponse {
            post: request(T),
            response: b"pong".to_vec(),
            response_timeout_timestamp: T + 3600,
        };
        h.source.set_timestamp(T + 10);
        h.source
            .add_response_receipt(response.commitment(), EventMetadata::at_height(77));

        let status = h.client.query_response_status(&response).await.unwrap();
        assert_eq!(
            status,
            MessageStatus::DestinationDelivered {
                meta: EventMetadata::at_height(77)
            }
        );
        assert_eq!(h.dest.reads(), 0);
    }

    #[tokio::test]
    async fn test_response_timeout_uses_response_deadline() {
        let h = harness();
        let response = PostResponse {
            post: request(T),
            response: b"pong".to_vec(),
            response_timeout_timestamp: T + 3600,
        };
        // Past the request's timeout but not the response's
        h.source.set_timestamp(T + 10);
        assert_eq!(
            h.client.query_response_status(&response).await.unwrap(),
            MessageStatus::Pending
        );

        h.source.set_timestamp(T + 3600);
        assert_eq!(
            h.client.query_response_status(&response).await.unwrap(),
            MessageStatus::Timeout
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let h = harness();
        h.dest.set_timestamp(T - 1);
        h.dest.fail_next_reads(2);
        assert_eq!(
            h.client.query_request_status(&request(T)).await.unwrap(),
            MessageStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_unreachable() {
        let h = harness();
        h.dest.fail_next_reads(10);
        match h.client.query_request_status(&request(T)).await {
            Err(TrackerError::ChainUnreachable {
                chain, attempts, ..
            }) => {
                assert_eq!(chain, DEST);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected ChainUnreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let h = harness();
        h.dest.fail_permanently(Some("execution reverted"));
        let result = h.client.query_request_status(&request(T)).await;
        assert!(matches!(result, Err(TrackerError::ChainRead { .. })));
        assert_eq!(h.dest.reads(), 1);
    }

    #[tokio::test]
    async fn test_misrouted_request_rejected_before_reads() {
        let h = harness();
        let mut req = request(T);
        req.source = "EVM-1".to_string();
        let result = h.client.query_request_status(&req).await;
        assert!(matches!(result, Err(TrackerError::MalformedMessage(_))));
        assert_eq!(h.dest.reads(), 0);
    }
}

// ============================================================================
// Indexer acceleration
// ============================================================================

mod indexer {
    use super::*;

    fn event(status: RecordedStatus, height: u64) -> LifecycleEvent {
        LifecycleEvent {
            status,
            meta: EventMetadata::at_height(height),
        }
    }

    #[tokio::test]
    async fn test_recorded_delivery_skips_chains() {
        let h = harness();
        let history = Arc::new(MockHistory::new());
        history.record(event(RecordedStatus::Source, 50));
        history.record(event(RecordedStatus::Destination, 90));
        let client = h.client.clone().with_indexer(history);

        let status = client.query_request_status(&request(T)).await.unwrap();
        assert_eq!(
            status,
            MessageStatus::DestinationDelivered {
                meta: EventMetadata::at_height(90)
            }
        );
        assert_eq!(h.dest.reads() + h.hub.reads(), 0);
    }

    #[tokio::test]
    async fn test_recorded_milestone_is_a_floor() {
        let h = harness();
        h.dest.set_timestamp(T - 1);
        let history = Arc::new(MockHistory::new());
        history.record(event(RecordedStatus::HyperbridgeFinalized, 300));
        let client = h.client.clone().with_indexer(history);

        assert_eq!(
            client.query_request_status(&request(T)).await.unwrap(),
            MessageStatus::HyperbridgeFinalized {
                finalized_height: 300
            }
        );

        // Chain timeout still wins over a non-terminal record
        h.dest.set_timestamp(T);
        assert_eq!(
            client.query_request_status(&request(T)).await.unwrap(),
            MessageStatus::Timeout
        );
    }

    #[tokio::test]
    async fn test_failing_indexer_falls_back_to_chains() {
        let h = harness();
        h.dest.set_timestamp(T);
        let history = Arc::new(MockHistory::new());
        history.set_failing(true);
        let client = h.client.clone().with_indexer(history);

        assert_eq!(
            client.query_request_status(&request(T)).await.unwrap(),
            MessageStatus::Timeout
        );
    }
}

// ============================================================================
// Timeout stream
// ============================================================================

mod timeout {
    use super::*;

    #[tokio::test]
    async fn test_full_timeout_sequence() {
        let h = harness();
        let req = request(T);
        h.dest.set_timestamp(T + 60);
        h.hub.set_state_machine_height(DEST, 500);
        h.hub.set_state_machine_timestamp(DEST, 500, T + 1);
        h.hub
            .add_timeout_receipt(req.commitment(), EventMetadata::at_height(900));
        h.source.set_state_machine_height(HUB, 901);
        h.hub.set_proof(vec![1, 2, 3]);

        let statuses: Vec<TimeoutStatus> =
            h.client.timeout_post_request(req.clone()).unwrap().collect().await;

        let expected_calldata =
            encode_timeout_calldata(SOURCE_HOST, HUB, &req, 901, vec![1, 2, 3]).unwrap();
        assert_eq!(
            statuses,
            vec![
                TimeoutStatus::Pending,
                TimeoutStatus::DestinationFinalized {
                    meta: EventMetadata::at_height(500)
                },
                TimeoutStatus::HyperbridgeTimedout {
                    meta: EventMetadata::at_height(900)
                },
                TimeoutStatus::HyperbridgeFinalized {
                    meta: EventMetadata::at_height(901)
                },
                TimeoutStatus::TimeoutMessage {
                    calldata: expected_calldata
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_early_call_only_yields_pending() {
        let h = harness();
        // Hub has verified the destination, but not past the timeout
        h.hub.set_state_machine_height(DEST, 500);
        h.hub.set_state_machine_timestamp(DEST, 500, T - 100);

        let mut stream = Box::pin(h.client.timeout_post_request(request(T)).unwrap());
        assert_eq!(stream.next().await, Some(TimeoutStatus::Pending));

        let waited = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(waited.is_err(), "stream made progress before the timeout");
    }

    #[tokio::test]
    async fn test_stream_waits_for_each_stage() {
        let h = harness();
        let req = request(T);
        let mut stream = Box::pin(h.client.timeout_post_request(req.clone()).unwrap());
        assert_eq!(next_within(&mut stream).await, Some(TimeoutStatus::Pending));

        h.hub.set_state_machine_height(DEST, 500);
        h.hub.set_state_machine_timestamp(DEST, 500, T);
        assert!(matches!(
            next_within(&mut stream).await,
            Some(TimeoutStatus::DestinationFinalized { .. })
        ));

        h.hub
            .add_timeout_receipt(req.commitment(), EventMetadata::at_height(900));
        assert!(matches!(
            next_within(&mut stream).await,
            Some(TimeoutStatus::HyperbridgeTimedout { .. })
        ));

        h.source.set_state_machine_height(HUB, 899);
        let waited = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_delivered_request_yields_error() {
        let h = harness();
        let req = request(T);
        h.dest
            .add_request_receipt(req.commitment(), EventMetadata::at_height(12));

        let statuses: Vec<TimeoutStatus> =
            h.client.timeout_post_request(req).unwrap().collect().await;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], TimeoutStatus::Pending);
        assert!(matches!(statuses[1], TimeoutStatus::Error { .. }));
    }

    #[tokio::test]
    async fn test_request_without_timeout_yields_error() {
        let h = harness();
        let statuses: Vec<TimeoutStatus> =
            h.client.timeout_post_request(request(0)).unwrap().collect().await;
        assert_eq!(statuses.len(), 2);
        assert!(matches!(statuses[1], TimeoutStatus::Error { .. }));
    }

    #[tokio::test]
    async fn test_read_failure_ends_stream_with_error() {
        let h = harness();
        h.hub.fail_permanently(Some("method not found"));
        let statuses: Vec<TimeoutStatus> =
            h.client.timeout_post_request(request(T)).unwrap().collect().await;
        assert_eq!(statuses.len(), 2);
        match &statuses[1] {
            TimeoutStatus::Error { description } => assert!(description.contains(HUB)),
            other => panic!("expected Error, got {:?}", other),
        }
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

mod subscription {
    use super::*;

    #[tokio::test]
    async fn test_progression_to_delivery() {
        let h = harness();
        let req = request(0);
        let mut stream = h.client.subscribe_to_request_status(req.clone(), 50).unwrap();

        assert_eq!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::Pending
        );

        h.hub.set_state_machine_height(SOURCE, 55);
        assert_eq!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::SourceFinalized {
                finalized_height: 55
            }
        );

        h.hub
            .add_request_receipt(req.commitment(), EventMetadata::at_height(200));
        assert!(matches!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::HyperbridgeDelivered { .. }
        ));

        h.dest.set_state_machine_height(HUB, 200);
        assert!(matches!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::HyperbridgeFinalized { .. }
        ));

        h.dest
            .add_request_receipt(req.commitment(), EventMetadata::at_height(40));
        assert!(matches!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::DestinationDelivered { .. }
        ));

        assert!(next_within(&mut stream).await.is_none());
    }

    #[tokio::test]
    async fn test_height_argument_overrides_request_height() {
        let h = harness();
        h.hub.set_state_machine_height(SOURCE, 55);
        let mut req = request(0);
        req.height = 10;

        let mut stream = h.client.subscribe_to_request_status(req, 60).unwrap();
        assert_eq!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_timeout_ends_stream() {
        let h = harness();
        h.dest.set_timestamp(T - 10);
        let mut stream = h.client.subscribe_to_request_status(request(T), 50).unwrap();

        assert_eq!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::Pending
        );

        h.dest.set_timestamp(T);
        assert_eq!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::Timeout
        );
        assert!(next_within(&mut stream).await.is_none());
    }

    #[tokio::test]
    async fn test_regressions_are_suppressed() {
        let h = harness();
        let req = request(0);
        h.hub.set_state_machine_height(SOURCE, 60);
        let mut stream = h.client.subscribe_to_request_status(req.clone(), 50).unwrap();

        assert!(matches!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::SourceFinalized { .. }
        ));

        // A lagging hub node reports an older height for a few polls
        h.hub.set_state_machine_height(SOURCE, 0);
        let lagging = tokio::time::timeout(Duration::from_millis(60), stream.next()).await;
        assert!(lagging.is_err(), "regressed status was yielded");

        h.hub
            .add_request_receipt(req.commitment(), EventMetadata::at_height(200));
        assert!(matches!(
            next_within(&mut stream).await.unwrap().unwrap(),
            MessageStatus::HyperbridgeDelivered { .. }
        ));
    }

    #[tokio::test]
    async fn test_error_is_terminal() {
        let h = harness();
        h.dest.fail_permanently(Some("execution reverted"));
        let mut stream = h.client.subscribe_to_request_status(request(T), 50).unwrap();

        assert!(matches!(
            next_within(&mut stream).await,
            Some(Err(TrackerError::ChainRead { .. }))
        ));
        assert!(next_within(&mut stream).await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_polling() {
        let h = harness();
        let mut stream = h.client.subscribe_to_request_status(request(0), 50).unwrap();
        assert!(next_within(&mut stream).await.is_some());
        drop(stream);

        let reads = h.dest.reads();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(h.dest.reads(), reads);
    }

    #[tokio::test]
    async fn test_response_subscription() {
        let h = harness();
        let response = PostResponse {
            post: request(T),
            response: b"pong".to_vec(),
            response_timeout_timestamp: 0,
        };
        h.source
            .add_response_receipt(response.commitment(), EventMetadata::at_height(5));

        let statuses: Vec<_> = h
            .client
            .subscribe_to_response_status(response, 0)
            .unwrap()
            .collect()
            .await;
        assert_eq!(statuses.len(), 1);
        assert!(matches!(
            statuses[0],
            Ok(MessageStatus::DestinationDelivered { .. })
        ));
    }
}

// ============================================================================
// Commands
// ============================================================================

mod commands {
    use super::*;
    use tracker::commands;

    #[tokio::test]
    async fn test_subscribe_command_writes_json_lines() {
        let h = harness();
        let req = request(0);
        h.dest
            .add_request_receipt(req.commitment(), EventMetadata::at_height(40));

        let mut out = Vec::new();
        let written = commands::subscribe(
            &h.client,
            req.into(),
            None,
            &mut out,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(written, 1);
        let line = String::from_utf8(out).unwrap();
        let json: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(json["kind"], "DestinationDelivered");
        assert_eq!(json["meta"]["blockNumber"], 40);
    }

    #[tokio::test]
    async fn test_status_command() {
        let h = harness();
        h.dest.set_timestamp(T);
        let mut out = Vec::new();
        commands::status(&h.client, &request(T).into(), &mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"kind\":\"Timeout\"}\n");
    }

    #[tokio::test]
    async fn test_timeout_command_stops_on_shutdown() {
        let h = harness();
        let mut out = Vec::new();
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        let written = commands::timeout(&h.client, request(T).into(), &mut out, shutdown)
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert!(String::from_utf8(out).unwrap().contains("Pending"));
    }
}
