mod common;

use backend_supervisor::bridge::AppInfo;
use backend_supervisor::config::{BridgeConfig, Config};
use backend_supervisor::error::Error;
use backend_supervisor::storage::MigrationOutcome;
use backend_supervisor::{Launcher, Phase};
use common::{Script, ScriptedController, ScriptedProber, fast_config};
use std::time::Duration;

fn config_for(root: &std::path::Path) -> Config {
    let mut config = Config::parse_from_str(
        r#"{
            "app": { "name": "WELTO", "version": "1.4.2" },
            "launch": { "mode": "packaged", "executable": "/opt/welto/server" }
        }"#,
    )
    .unwrap();
    config.supervisor = fast_config();
    config.storage.user_data_dir = root.join("user-data");
    config
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = Launcher::from_config_str(
        r#"{
            "launch": { "mode": "packaged", "executable": "server" },
            "supervisor": { "maxAttempts": 0 }
        }"#,
    );

    assert!(matches!(result, Err(Error::ConfigValidation(_))));
}

#[test]
fn test_prepare_data_migrates_legacy_database() {
    let temp = tempfile::tempdir().unwrap();
    let legacy = temp.path().join("db.sqlite3");
    std::fs::write(&legacy, b"legacy").unwrap();
    let mut config = config_for(temp.path());
    config.storage.legacy_database = Some(legacy);

    let launcher = Launcher::new(config).unwrap();

    let outcome = launcher.prepare_data().unwrap();
    assert!(matches!(outcome, Some(MigrationOutcome::Migrated { backup: Some(_) })));
    assert_eq!(
        launcher.prepare_data().unwrap(),
        Some(MigrationOutcome::AlreadyMigrated)
    );
    assert_eq!(
        std::fs::read(launcher.layout().database_path()).unwrap(),
        b"legacy"
    );
}

#[test]
fn test_launch_spec_exports_user_data_root() {
    let temp = tempfile::tempdir().unwrap();
    let launcher = Launcher::new(config_for(temp.path())).unwrap();

    let spec = launcher.launch_spec();

    assert_eq!(spec.program, std::path::PathBuf::from("/opt/welto/server"));
    let exported = spec.env.get("WELTO_USER_DATA").unwrap();
    assert!(std::path::Path::new(exported).is_absolute());
    assert!(exported.ends_with("user-data"));
}

#[tokio::test]
async fn test_launcher_lifecycle() {
    let temp = tempfile::tempdir().unwrap();
    let mut launcher = Launcher::new(config_for(temp.path())).unwrap();
    let controller = ScriptedController::new(vec![], Script::ready());

    assert!(matches!(launcher.supervisor(), Err(Error::NotRunning)));
    assert!(!launcher.app_info().server_running);

    launcher
        .start_with(controller.clone(), ScriptedProber::healthy())
        .await
        .unwrap();
    launcher
        .supervisor()
        .unwrap()
        .wait_until(Duration::from_secs(5), |s| s.server_running())
        .await
        .unwrap();

    assert!(launcher.app_info().server_running);
    assert!(matches!(
        launcher
            .start_with(controller.clone(), ScriptedProber::healthy())
            .await,
        Err(Error::AlreadyRunning)
    ));

    assert!(launcher.restart_server().await.unwrap());
    assert_eq!(controller.spawn_count(), 2);

    launcher.shutdown().await.unwrap();
    assert!(launcher.supervisor().is_err());
    assert_eq!(launcher.app_info().server_url, "http://127.0.0.1:8000");
}

#[tokio::test]
async fn test_bridge_serves_app_info_over_http() {
    let temp = tempfile::tempdir().unwrap();
    let mut config = config_for(temp.path());
    config.bridge = Some(BridgeConfig {
        port: 0,
        workers: Some(1),
        ..Default::default()
    });
    let mut launcher = Launcher::new(config).unwrap();
    let controller = ScriptedController::new(vec![], Script::ready());

    launcher
        .start_with(controller, ScriptedProber::healthy())
        .await
        .unwrap();
    let supervisor = launcher.supervisor().unwrap().clone();
    supervisor
        .wait_until(Duration::from_secs(5), |s| s.phase == Phase::Serving)
        .await
        .unwrap();

    let addr = launcher.bridge().unwrap().local_addr();
    assert_ne!(addr.port(), 0);

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let info: AppInfo = client
        .get(format!("http://{}/app-info", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info.name, "WELTO");
    assert_eq!(info.version, "1.4.2");
    assert!(info.server_running);

    launcher.shutdown().await.unwrap();
}
