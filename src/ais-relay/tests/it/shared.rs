use ais_relay::models::{MessageType, RawMessage, VesselMessage};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::helper::{shared, test_with_settings};

#[tokio::test]
async fn test_consumer_receives_snapshot_then_updates() {
    test_with_settings(shared, |helper| async move {
        let mut upstream = helper.upstream.next_connection().await;
        upstream
            .send(RawMessage::test_position_report(1, 25.0, -90.0, 0))
            .await;
        helper.wait_for_vessels(1).await;

        let mut consumer = helper.connect_consumer().await;
        let VesselMessage::Snapshot { vessels } = consumer.recv_message().await else {
            panic!("expected a snapshot");
        };
        assert_eq!(1, vessels.len());
        assert_eq!("1", vessels[0].id);

        upstream
            .send(RawMessage::test_position_report(2, 26.0, -91.0, 1))
            .await;

        let VesselMessage::Vessel { vessel } = consumer.recv_message().await else {
            panic!("expected a vessel update");
        };
        assert_eq!("2", vessel.id);
        assert_eq!(Some(1), vessel.navigational_status);
    })
    .await;
}

#[tokio::test]
async fn test_consumers_share_one_upstream_connection() {
    test_with_settings(shared, |helper| async move {
        let mut upstream = helper.upstream.next_connection().await;

        let mut first = helper.connect_consumer().await;
        let mut second = helper.connect_consumer().await;
        first.recv_message().await;
        second.recv_message().await;

        upstream
            .send(RawMessage::test_position_report(7, 22.0, -88.0, 0))
            .await;

        for consumer in [&mut first, &mut second] {
            let VesselMessage::Vessel { vessel } = consumer.recv_message().await else {
                panic!("expected a vessel update");
            };
            assert_eq!("7", vessel.id);
        }

        assert_eq!(0, helper.upstream.connection_count());
        assert_eq!(1, helper.stats().await.upstream_connects);
    })
    .await;
}

#[tokio::test]
async fn test_static_data_enriches_known_vessels() {
    test_with_settings(
        |settings| {
            shared(settings);
            settings.feed.message_types = vec![MessageType::PositionReport, MessageType::StaticData];
        },
        |helper| async move {
            let mut upstream = helper.upstream.next_connection().await;
            assert_eq!(
                serde_json::json!(["PositionReport", "ShipStaticData"]),
                upstream.subscription["FilterMessageTypes"]
            );

            let mut consumer = helper.connect_consumer().await;
            consumer.recv_message().await;

            upstream
                .send(RawMessage::test_position_report(9, 27.0, -92.0, 0))
                .await;
            let VesselMessage::Vessel { vessel } = consumer.recv_message().await else {
                panic!("expected a vessel update");
            };
            assert_eq!("Unknown Vessel (9)", vessel.vessel_name);
            assert_eq!("Unknown", vessel.destination);

            upstream
                .send(RawMessage::test_static_data(9, "NORDIC STAR"))
                .await;
            let VesselMessage::Vessel { vessel } = consumer.recv_message().await else {
                panic!("expected a vessel update");
            };
            assert_eq!("NORDIC STAR", vessel.vessel_name);
            assert_eq!("HOUSTON", vessel.destination);
            assert_eq!(Some(27.0), vessel.position.map(|p| p.lat));
        },
    )
    .await;
}

#[tokio::test]
async fn test_supervisor_reconnects_after_upstream_drop() {
    test_with_settings(shared, |helper| async move {
        let first = helper.upstream.next_connection().await;
        drop(first);

        let mut second = helper.upstream.next_connection().await;
        second
            .send(RawMessage::test_position_report(3, 24.0, -87.0, 0))
            .await;

        helper.wait_for_vessels(1).await;
        assert_eq!(2, helper.stats().await.upstream_connects);
    })
    .await;
}

#[tokio::test]
async fn test_shutdown_closes_shared_consumers() {
    test_with_settings(shared, |helper| async move {
        let mut consumer = helper.connect_consumer().await;
        consumer.recv_message().await;

        helper.shutdown();

        let frame = consumer.recv_close().await.unwrap();
        assert_eq!(CloseCode::Away, frame.code);
    })
    .await;
}
