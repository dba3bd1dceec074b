use crate::common::{Script, ScriptedController, ScriptedProber, fast_config, spawn_supervisor_with};
use actix_web::body::MessageBody;
use actix_web::http::header;
use actix_web::{App, test, web::Data};
use backend_supervisor::bridge::events::EventManager;
use backend_supervisor::bridge::{BridgeState, handlers};
use backend_supervisor::config::AppConfig;
use futures::future::poll_fn;
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Next SSE message from a streaming body.
async fn next_chunk<B>(body: &mut Pin<Box<B>>) -> String
where
    B: MessageBody,
    B::Error: Debug,
{
    let chunk = tokio::time::timeout(
        Duration::from_secs(5),
        poll_fn(|cx| body.as_mut().poll_next(cx)),
    )
    .await
    .unwrap()
    .unwrap()
    .unwrap();
    String::from_utf8(chunk.to_vec()).unwrap()
}

#[tokio::test]
async fn test_forwarder_relays_supervisor_notifications() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    let manager = EventManager::new(64);
    let mut rx = manager.subscribe();
    let forwarder = manager.forward(supervisor.subscribe());

    supervisor.start().await.unwrap();

    let mut names = Vec::new();
    let ready = tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(message) = rx.recv().await {
            names.push(message.event.clone());
            if message.event == "server-ready" {
                return message;
            }
        }
        panic!("event channel closed");
    })
    .await
    .unwrap();

    assert_eq!(ready.data, r#"{"url":"http://127.0.0.1:8000"}"#);
    assert_eq!(names.first().map(String::as_str), Some("status-update"));

    supervisor.shutdown().await.unwrap();
    forwarder.abort();
}

#[actix_web::test]
async fn test_event_stream_starts_with_snapshot() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    let manager = Arc::new(EventManager::new(64));
    let forwarder = manager.forward(supervisor.subscribe());

    let app = test::init_service(
        App::new()
            .app_data(Data::new(BridgeState::new(AppConfig::default(), supervisor.clone())))
            .app_data(Data::new(Arc::clone(&manager)))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/events").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let mut body = Box::pin(resp.into_body());

    let first = next_chunk(&mut body).await;
    assert!(first.starts_with("event: snapshot\n"), "{}", first);
    assert!(first.contains(r#""phase":"idle""#), "{}", first);

    supervisor.start().await.unwrap();

    let mut seen_ready = false;
    for _ in 0..20 {
        let text = next_chunk(&mut body).await;
        if text.starts_with("event: server-ready\n") {
            assert!(text.contains("http://127.0.0.1:8000"));
            seen_ready = true;
            break;
        }
    }
    assert!(seen_ready, "no server-ready event on the stream");

    supervisor.shutdown().await.unwrap();
    forwarder.abort();
}
