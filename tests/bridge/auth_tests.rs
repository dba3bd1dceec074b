use crate::common::{Script, ScriptedController, ScriptedProber, fast_config, spawn_supervisor_with};
use actix_web::http::{Method, StatusCode, header};
use actix_web::{App, test, web::Data};
use backend_supervisor::bridge::auth::Authentication;
use backend_supervisor::bridge::events::EventManager;
use backend_supervisor::bridge::{BridgeState, handlers};
use backend_supervisor::config::{AppConfig, AuthConfig, BearerAuthConfig, BridgeConfig};
use std::sync::Arc;

fn bridge_config(token: Option<&str>) -> Arc<BridgeConfig> {
    Arc::new(BridgeConfig {
        authenticate: token.map(|token| AuthConfig {
            bearer: Some(BearerAuthConfig {
                token: token.to_string(),
            }),
        }),
        ..Default::default()
    })
}

macro_rules! protected_app {
    ($supervisor:expr, $token:expr) => {
        test::init_service(
            App::new()
                .app_data(Data::new(BridgeState::new(AppConfig::default(), $supervisor)))
                .app_data(Data::new(Arc::new(EventManager::new(16))))
                .wrap(Authentication::new(bridge_config($token)))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_missing_token_is_rejected() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    let app = protected_app!(supervisor.clone(), Some("s3cret"));

    let req = test::TestRequest::get().uri("/app-info").to_request();
    let err = test::try_call_service(&app, req).await.err().unwrap();

    assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    supervisor.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_wrong_token_is_rejected() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller.clone(), ScriptedProber::healthy());
    let app = protected_app!(supervisor.clone(), Some("s3cret"));

    let req = test::TestRequest::post()
        .uri("/restart")
        .insert_header((header::AUTHORIZATION, "Bearer guess"))
        .to_request();
    let err = test::try_call_service(&app, req).await.err().unwrap();

    assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    assert_eq!(controller.spawn_count(), 0);
    supervisor.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_valid_token_is_accepted() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    let app = protected_app!(supervisor.clone(), Some("s3cret"));

    let req = test::TestRequest::get()
        .uri("/app-info")
        .insert_header((header::AUTHORIZATION, "Bearer s3cret"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    supervisor.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_preflight_skips_authentication() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    let app = protected_app!(supervisor.clone(), Some("s3cret"));

    let req = test::TestRequest::default()
        .method(Method::OPTIONS)
        .uri("/app-info")
        .to_request();
    let resp = test::try_call_service(&app, req).await;

    assert!(resp.is_ok());
    supervisor.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_open_bridge_without_token() {
    let controller = ScriptedController::new(vec![], Script::ready());
    let supervisor = spawn_supervisor_with(fast_config(), controller, ScriptedProber::healthy());
    let app = protected_app!(supervisor.clone(), None);

    let req = test::TestRequest::get().uri("/app-info").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    supervisor.shutdown().await.unwrap();
}
