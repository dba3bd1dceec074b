use crate::common::{Script, ScriptedController, ScriptedProber, fast_config, spawn_supervisor_with};
use actix_web::http::StatusCode;
use actix_web::{App, test, web::Data};
use backend_supervisor::bridge::events::EventManager;
use backend_supervisor::bridge::{AppInfo, BridgeState, RestartResponse, handlers};
use backend_supervisor::config::AppConfig;
use backend_supervisor::server::SupervisorHandle;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

fn app_config() -> AppConfig {
    AppConfig {
        name: "WELTO".to_string(),
        version: "1.4.2".to_string(),
    }
}

async fn serving_supervisor(controller: Arc<ScriptedController>) -> SupervisorHandle {
    let handle = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    handle.start().await.unwrap();
    handle
        .wait_until(Duration::from_secs(5), |s| s.server_running())
        .await
        .unwrap();
    handle
}

macro_rules! bridge_app {
    ($supervisor:expr) => {
        test::init_service(
            App::new()
                .app_data(Data::new(BridgeState::new(app_config(), $supervisor)))
                .app_data(Data::new(Arc::new(EventManager::new(16))))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_app_info_before_start() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    let app = bridge_app!(supervisor.clone());

    let req = test::TestRequest::get().uri("/app-info").to_request();
    let info: AppInfo = test::call_and_read_body_json(&app, req).await;

    assert_eq!(
        info,
        AppInfo {
            name: "WELTO".to_string(),
            version: "1.4.2".to_string(),
            server_running: false,
            server_url: "http://127.0.0.1:8000".to_string(),
        }
    );
    supervisor.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_app_info_wire_format_while_serving() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = serving_supervisor(controller).await;
    let app = bridge_app!(supervisor.clone());

    let req = test::TestRequest::get().uri("/app-info").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["name"], "WELTO");
    assert_eq!(body["serverRunning"], true);
    assert_eq!(body["serverUrl"], "http://127.0.0.1:8000");
    supervisor.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_restart_endpoint() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = serving_supervisor(controller.clone()).await;
    let app = bridge_app!(supervisor.clone());

    let req = test::TestRequest::post().uri("/restart").to_request();
    let response: RestartResponse = test::call_and_read_body_json(&app, req).await;

    assert!(response.restarted);
    assert_eq!(controller.spawn_count(), 2);
    assert_eq!(controller.terminate_count(), 1);
    supervisor
        .wait_until(Duration::from_secs(5), |s| s.server_running())
        .await
        .unwrap();
    supervisor.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_restart_after_supervisor_stopped() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    supervisor.shutdown().await.unwrap();
    let app = bridge_app!(supervisor);

    let req = test::TestRequest::post().uri("/restart").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn test_logs_endpoint() {
    let controller = ScriptedController::new(vec![Script::crash(1)], Script::ready());
    let supervisor = serving_supervisor(controller).await;
    let app = bridge_app!(supervisor.clone());

    let req = test::TestRequest::get().uri("/logs").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["snapshot"]["phase"], "serving");
    let events = body["events"].as_array().unwrap();
    assert_eq!(events[0]["event"], "serving");
    assert!(events.iter().any(|e| e["event"] == "crashed"));
    assert!(events.iter().any(|e| e["event"] == "attempt-failed"));

    let req = test::TestRequest::get().uri("/logs?limit=2").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::get().uri("/logs?limit=0").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    supervisor.shutdown().await.unwrap();
}
