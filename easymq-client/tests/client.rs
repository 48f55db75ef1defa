mod helper;

use easymq_client::*;
use helper::BrokerConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

async fn open_session() -> (Session, JoinHandle<()>) {
    let (io, broker) = helper::start();
    let session = Session::open_with(ConnectionParams::default(), io).await.unwrap();

    (session, broker)
}

async fn broker_released(broker: JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(1), broker)
        .await
        .expect("broker did not release the stream")
        .unwrap();
}

#[tokio::test]
async fn open_and_close_releases_the_transport() {
    for _ in 0..3 {
        let (mut session, broker) = open_session().await;

        assert_eq!(session.state(), SessionState::Open);

        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        // closing again is a no-op
        session.close().await.unwrap();

        broker_released(broker).await;
    }
}

#[tokio::test]
async fn bad_password_fails_the_handshake() {
    let (io, _broker) = helper::start_with(BrokerConfig {
        password: "secret".to_string(),
        ..Default::default()
    });

    let err = Session::open_with(ConnectionParams::default(), io).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Connection(ConnectionError::Handshake { code: 403, .. })
    ));
}

#[tokio::test]
async fn open_times_out_without_a_server() {
    // the peer stays alive but never answers the handshake
    let (io, _silent_peer) = tokio::io::duplex(1024);

    let params = ConnectionParams::default().timeout(Duration::from_millis(50));
    let err = Session::open_with(params, io).await.unwrap_err();

    assert!(matches!(err, Error::Connection(ConnectionError::Timeout)));
}

#[tokio::test]
async fn transport_loss_fails_the_session() {
    let (mut session, broker) = open_session().await;

    assert_eq!(session.state(), SessionState::Open);

    // the server goes away without an orderly close
    broker.abort();

    let mut attempts = 0;
    while session.state() != SessionState::Failed {
        attempts += 1;
        assert!(attempts < 100, "session did not notice the transport loss");

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let err = session.channel().await.unwrap_err();
    assert!(matches!(err, Error::State(_)));
}

#[tokio::test]
async fn second_channel_is_a_state_error() {
    let (mut session, _broker) = open_session().await;

    let _channel = session.channel().await.unwrap();

    let err = session.channel().await.unwrap_err();
    assert!(matches!(err, Error::State(_)));
}

#[tokio::test]
async fn oversized_publish_is_rejected_locally() {
    let (io, _broker) = helper::start_with(BrokerConfig {
        frame_max: 16,
        ..Default::default()
    });

    let mut session = Session::open_with(ConnectionParams::default(), io).await.unwrap();
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();

    let err = channel.publish(Message::new(vec![0u8; 32]), "main").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Publish(PublishError::TooLarge {
            size: 32,
            frame_max: 16
        })
    ));
}

#[tokio::test]
async fn declare_is_idempotent_and_conflicts_on_durability() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();
    channel.queue_declare("main", Durable(true)).await.unwrap();

    let err = channel.queue_declare("main", Durable(false)).await.unwrap_err();
    assert!(matches!(err, Error::Declare(_)));
}

#[tokio::test]
async fn server_side_declare_rejection_surfaces_as_declare_error() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    let err = channel.queue_declare("reserved-main", Durable(true)).await.unwrap_err();
    assert!(matches!(err, Error::Declare(_)));
}

#[tokio::test]
async fn overlong_names_are_rejected_before_framing() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    let err = channel.queue_declare(&"q".repeat(300), Durable(true)).await.unwrap_err();
    assert!(matches!(err, Error::Declare(_)));

    channel.queue_declare("main", Durable(true)).await.unwrap();

    let tag = "t".repeat(300);
    let err = channel
        .consume("main", Some(&tag), |_message: Message| -> ConsumerResult {
            Ok(ConsumerAction::Continue)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Declare(_)));
}

#[tokio::test]
async fn publish_to_undeclared_queue_fails() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    let err = channel.publish("Hello world!".into(), "main").await.unwrap_err();
    assert!(matches!(err, Error::Declare(_)));
}

#[tokio::test]
async fn published_message_reaches_the_consumer() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();
    channel.publish("Hello world!".into(), "main").await.unwrap();

    let received = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let sink = received.clone();

    channel
        .consume("main", None, move |message: Message| -> ConsumerResult {
            sink.lock().unwrap().push(message.into_body());

            Ok(ConsumerAction::Cancel)
        })
        .await
        .unwrap();

    channel.wait().await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], b"Hello world!");
}

#[tokio::test]
async fn deliveries_arrive_in_publish_order() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();

    for body in ["a", "b", "c"] {
        channel.publish(body.into(), "main").await.unwrap();
    }

    let received = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let sink = received.clone();

    channel
        .consume("main", None, move |message: Message| -> ConsumerResult {
            let mut received = sink.lock().unwrap();
            received.push(message.into_body());

            if received.len() == 3 {
                Ok(ConsumerAction::Cancel)
            } else {
                Ok(ConsumerAction::Continue)
            }
        })
        .await
        .unwrap();

    channel.wait().await.unwrap();

    assert_eq!(*received.lock().unwrap(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[tokio::test]
async fn duplicate_consumer_tag_is_a_conflict() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();

    let count = Arc::new(Mutex::new(0u32));
    let counter = count.clone();

    channel
        .consume("main", Some("ctag-fixed"), move |_message: Message| -> ConsumerResult {
            *counter.lock().unwrap() += 1;

            Ok(ConsumerAction::Cancel)
        })
        .await
        .unwrap();

    let err = channel
        .consume(
            "main",
            Some("ctag-fixed"),
            |_message: Message| -> ConsumerResult { Ok(ConsumerAction::Continue) },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConsumerConflict(tag) if tag == "ctag-fixed"));

    // the first registration stays intact and keeps consuming
    channel.publish("Hello world!".into(), "main").await.unwrap();
    channel.wait().await.unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test]
async fn cancel_of_unknown_tag_is_not_found() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    let err = channel.cancel("no-such-tag").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn wait_returns_once_the_last_consumer_is_cancelled() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();

    let count = Arc::new(Mutex::new(0u32));
    let counter = count.clone();

    let tag = channel
        .consume("main", None, move |_message: Message| -> ConsumerResult {
            *counter.lock().unwrap() += 1;

            Ok(ConsumerAction::Continue)
        })
        .await
        .unwrap();

    // a delivery is already queued when the consumer goes away
    channel.publish("Hello world!".into(), "main").await.unwrap();
    channel.cancel(&tag).await.unwrap();

    channel.wait().await.unwrap();

    assert_eq!(*count.lock().unwrap(), 0);
}

#[tokio::test]
async fn failing_callback_aborts_the_wait() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();
    channel.publish("first".into(), "main").await.unwrap();
    channel.publish("second".into(), "main").await.unwrap();

    let count = Arc::new(Mutex::new(0u32));
    let counter = count.clone();

    channel
        .consume("main", None, move |_message: Message| -> ConsumerResult {
            *counter.lock().unwrap() += 1;

            Err("payload checksum mismatch".into())
        })
        .await
        .unwrap();

    let err = channel.wait().await.unwrap_err();

    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test]
async fn stop_handle_stops_the_wait() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();

    channel
        .consume("main", None, |_message: Message| -> ConsumerResult {
            Ok(ConsumerAction::Continue)
        })
        .await
        .unwrap();

    let handle = channel.stop_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
    });

    channel.wait().await.unwrap();
}

#[tokio::test]
async fn wait_with_timeout_returns_at_the_deadline() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();

    channel
        .consume("main", None, |_message: Message| -> ConsumerResult {
            Ok(ConsumerAction::Continue)
        })
        .await
        .unwrap();

    channel.wait_with_timeout(Duration::from_millis(100)).await.unwrap();
}

#[tokio::test]
async fn operations_on_a_closed_channel_fail() {
    let (mut session, _broker) = open_session().await;
    let mut channel = session.channel().await.unwrap();

    channel.queue_declare("main", Durable(true)).await.unwrap();
    channel.close().await.unwrap();

    let err = channel.publish("Hello world!".into(), "main").await.unwrap_err();
    assert!(matches!(err, Error::State(_)));

    // closing again is a no-op
    channel.close().await.unwrap();
}
