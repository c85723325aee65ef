use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use kinetrack_lib::notify::{relay_router, Notifier};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(notifier: Notifier) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, relay_router(notifier)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

async fn wait_for_subscribers(notifier: &Notifier, count: usize) {
    for _ in 0..200 {
        if notifier.subscriber_count() == count {
            return;
        }
        time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {count} subscribers, found {}",
        notifier.subscriber_count()
    );
}

async fn next_text(client: &mut Client) -> String {
    let frame = time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("no frame within 5s")
        .expect("socket closed")
        .unwrap();
    match frame {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn posted_event_reaches_every_socket_verbatim() {
    let notifier = Notifier::new();
    let addr = serve(notifier.clone()).await;
    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    wait_for_subscribers(&notifier, 2).await;

    let raw = r#"{"type":"skeletal","data":{"patientId":"P1","joints":{}}}"#;
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/notify"))
        .body(raw)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(next_text(&mut first).await, raw);
    assert_eq!(next_text(&mut second).await, raw);
}

#[tokio::test]
async fn lagging_socket_skips_ahead_and_stays_connected() {
    let notifier = Notifier::new();
    let addr = serve(notifier.clone()).await;
    let mut client = connect(addr).await;
    wait_for_subscribers(&notifier, 1).await;

    // Published without yielding, so the socket task sees the overflow
    // on its next receive.
    for n in 0..300 {
        notifier.publish_raw(format!(r#"{{"type":"height","data":{{"n":{n}}}}}"#));
    }

    let first: serde_json::Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert!(first["data"]["n"].as_u64().unwrap() > 0);

    notifier.publish_raw(r#"{"type":"height","data":{"n":"after"}}"#.to_string());
    let mut last = String::new();
    while !last.contains("after") {
        last = next_text(&mut client).await;
    }
}

#[tokio::test]
async fn closed_socket_unsubscribes() {
    let notifier = Notifier::new();
    let addr = serve(notifier.clone()).await;
    let mut client = connect(addr).await;
    wait_for_subscribers(&notifier, 1).await;

    client.send(Message::Close(None)).await.unwrap();
    wait_for_subscribers(&notifier, 0).await;
}
