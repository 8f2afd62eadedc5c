use std::time::Duration;

use ais_relay::models::RawMessage;
use reqwest::StatusCode;
use serde_json::json;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::helper::{test, test_with_settings};

#[tokio::test]
async fn test_consumer_gets_own_upstream_subscription() {
    test(|helper| async move {
        let _consumer = helper.connect_consumer().await;
        let upstream = helper.upstream.next_connection().await;

        assert_eq!(
            json!({
                "APIKey": "test-key",
                "BoundingBoxes": [[[18.0, -98.0], [31.0, -81.0]]],
                "FilterMessageTypes": ["PositionReport"],
            }),
            upstream.subscription
        );
    })
    .await;
}

#[tokio::test]
async fn test_position_report_is_forwarded_unmodified() {
    test(|helper| async move {
        let mut consumer = helper.connect_consumer().await;
        let mut upstream = helper.upstream.next_connection().await;

        let report = RawMessage::test_position_report(244660000, 25.77, -80.13, 0);
        upstream.send(report.clone()).await;

        assert_eq!(report, consumer.recv_text().await);

        let vessels = helper.vessels().await;
        assert_eq!(1, vessels.len());
        assert_eq!("244660000", vessels[0].id);
        assert_eq!("Unknown Vessel (244660000)", vessels[0].vessel_name);
    })
    .await;
}

#[tokio::test]
async fn test_filtered_messages_are_not_forwarded() {
    test(|helper| async move {
        let mut consumer = helper.connect_consumer().await;
        let mut upstream = helper.upstream.next_connection().await;

        let static_data = RawMessage::test_static_data(1, "NORDIC STAR");
        let report = RawMessage::test_position_report(2, 25.0, -90.0, 0);
        upstream.send(static_data).await;
        upstream.send("not json".to_string()).await;
        upstream.send(report.clone()).await;

        assert_eq!(report, consumer.recv_text().await);

        let vessels = helper.vessels().await;
        assert_eq!(1, vessels.len());
        assert_eq!("2", vessels[0].id);

        let stats = helper.stats().await;
        assert_eq!(1, stats.rejected.filtered);
        assert_eq!(1, stats.decode_errors);
    })
    .await;
}

#[tokio::test]
async fn test_each_consumer_is_served_by_its_own_connection() {
    test(|helper| async move {
        let mut first = helper.connect_consumer().await;
        let mut first_upstream = helper.upstream.next_connection().await;
        let mut second = helper.connect_consumer().await;
        let mut second_upstream = helper.upstream.next_connection().await;

        let a = RawMessage::test_position_report(1, 20.0, -85.0, 0);
        let b = RawMessage::test_position_report(2, 21.0, -86.0, 1);
        first_upstream.send(a.clone()).await;
        second_upstream.send(b.clone()).await;

        assert_eq!(a, first.recv_text().await);
        assert_eq!(b, second.recv_text().await);
        assert_eq!(2, helper.stats().await.active_sessions);
    })
    .await;
}

#[tokio::test]
async fn test_consumer_disconnect_closes_upstream() {
    test(|helper| async move {
        let mut consumer = helper.connect_consumer().await;
        let mut upstream = helper.upstream.next_connection().await;

        consumer.close().await;

        upstream.wait_closed().await;
    })
    .await;
}

#[tokio::test]
async fn test_upstream_close_closes_consumer() {
    test(|helper| async move {
        let mut consumer = helper.connect_consumer().await;
        let mut upstream = helper.upstream.next_connection().await;

        upstream.close("maintenance").await;

        let frame = consumer.recv_close().await.unwrap();
        assert_eq!(CloseCode::Normal, frame.code);
        assert_eq!("upstream closed", frame.reason.as_str());
    })
    .await;
}

#[tokio::test]
async fn test_dropped_upstream_closes_consumer() {
    test(|helper| async move {
        let mut consumer = helper.connect_consumer().await;
        let upstream = helper.upstream.next_connection().await;

        drop(upstream);

        let frame = consumer.recv_close().await.unwrap();
        assert_eq!(CloseCode::Normal, frame.code);
        assert_eq!("upstream closed", frame.reason.as_str());
    })
    .await;
}

#[tokio::test]
async fn test_idle_upstream_is_torn_down() {
    test_with_settings(
        |settings| settings.feed.idle_timeout = Duration::from_millis(100),
        |helper| async move {
            let mut consumer = helper.connect_consumer().await;
            let mut upstream = helper.upstream.next_connection().await;

            upstream.wait_closed().await;

            let frame = consumer.recv_close().await.unwrap();
            assert_eq!(CloseCode::Normal, frame.code);
        },
    )
    .await;
}

#[tokio::test]
async fn test_unreachable_upstream_closes_consumer() {
    test_with_settings(
        |settings| settings.feed.url = "ws://127.0.0.1:1".to_string(),
        |helper| async move {
            let mut consumer = helper.connect_consumer().await;

            let frame = consumer.recv_close().await.unwrap();
            assert_eq!(CloseCode::Normal, frame.code);
            assert_eq!("upstream unavailable", frame.reason.as_str());
            assert_eq!(1, helper.stats().await.upstream_failures);
        },
    )
    .await;
}

#[tokio::test]
async fn test_consumer_answering_pings_stays_connected() {
    test_with_settings(
        |settings| settings.api.ping_interval = Duration::from_millis(50),
        |helper| async move {
            let mut consumer = helper.connect_consumer().await;
            let _upstream = helper.upstream.next_connection().await;

            let pings = consumer.idle(Duration::from_millis(400)).await;

            assert!(pings >= 2, "{pings}");
            assert_eq!(1, helper.stats().await.active_sessions);
        },
    )
    .await;
}

#[tokio::test]
async fn test_unresponsive_consumer_is_dropped() {
    test_with_settings(
        |settings| settings.api.ping_interval = Duration::from_millis(50),
        |helper| async move {
            let _consumer = helper.connect_consumer().await;
            let mut upstream = helper.upstream.next_connection().await;

            helper.wait_for_active_sessions(0).await;
            upstream.wait_closed().await;
        },
    )
    .await;
}

#[tokio::test]
async fn test_health() {
    test(|helper| async move {
        let response = helper.health().await;

        assert_eq!(StatusCode::OK, response.status());
        assert_eq!("OK", response.text().await.unwrap());
    })
    .await;
}

#[tokio::test]
async fn test_vessels_are_unavailable_without_a_store() {
    test_with_settings(
        |settings| settings.store.enabled = false,
        |helper| async move {
            let response = helper
                .http
                .get(format!("{}/vessels", helper.base_url()))
                .send()
                .await
                .unwrap();

            assert_eq!(StatusCode::NOT_FOUND, response.status());
        },
    )
    .await;
}
