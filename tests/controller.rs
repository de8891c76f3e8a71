//! Controller tests: self-config refresh, live interval reconfiguration,
//! first-run suppression, and exit-on-failure handling.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use butler::controller::{Controller, ControllerSettings};
use butler::error::ButlerError;
use butler::metrics;
use butler::transport::TransportOptions;

fn settings(config_url: String, self_interval: Duration) -> ControllerSettings {
    ControllerSettings {
        config_url,
        self_interval,
        transport_opts: TransportOptions {
            timeout: Duration::from_secs(5),
            insecure: false,
            s3_region: None,
        },
        default_subs: BTreeMap::new(),
    }
}

fn agent_toml(
    interval: u64,
    exit_on_failure: bool,
    status: &Path,
    dest: &Path,
    src: &Path,
) -> String {
    format!(
        r#"
[globals]
scheduler-interval = {interval}
exit-on-failure = {exit_on_failure}
status-file = "{status}"
config-managers = ["prom"]

[prom]
repos = ["local"]
dest-path = "{dest}"
primary-config = ["prometheus.yml"]

[prom.local]
method = "file"
repo-path = "{src}"
"#,
        status = status.display(),
        dest = dest.display(),
        src = src.display(),
    )
}

struct Fixture {
    _dir: tempfile::TempDir,
    status: std::path::PathBuf,
    dest: std::path::PathBuf,
    src: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("butler.status");
    let dest = dir.path().join("dest");
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("prometheus.yml"), b"scrape_configs: []\n").unwrap();
    Fixture {
        status,
        dest,
        src,
        _dir: dir,
    }
}

#[tokio::test]
async fn sync_job_is_installed_then_replaced_on_interval_change() {
    let server = MockServer::start().await;
    let fx = fixture();

    Mock::given(method("GET"))
        .and(path("/reconfig/butler.toml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(agent_toml(
            10,
            false,
            &fx.status,
            &fx.dest,
            &fx.src,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reconfig/butler.toml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(agent_toml(
            3,
            false,
            &fx.status,
            &fx.dest,
            &fx.src,
        )))
        .mount(&server)
        .await;

    let controller = Controller::new(settings(
        format!("{}/reconfig/butler.toml", server.uri()),
        Duration::from_secs(300),
    ))
    .unwrap();

    controller.refresh_config().await.unwrap();
    assert_eq!(controller.installed_sync_interval(), 0);

    controller.manage_sync_job().await;
    assert_eq!(controller.installed_sync_interval(), 10);

    // Upstream now serves a different interval; the job is replaced.
    controller.refresh_config().await.unwrap();
    controller.manage_sync_job().await;
    assert_eq!(controller.installed_sync_interval(), 3);
    assert_eq!(controller.info().await.unwrap().sync_interval, 3);
}

#[tokio::test]
async fn invalid_refresh_keeps_previous_config_and_flips_contact() {
    let server = MockServer::start().await;
    let fx = fixture();

    Mock::given(method("GET"))
        .and(path("/invalid/butler.toml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(agent_toml(
            10,
            false,
            &fx.status,
            &fx.dest,
            &fx.src,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/invalid/butler.toml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not toml ==="))
        .mount(&server)
        .await;

    let controller = Controller::new(settings(
        format!("{}/invalid/butler.toml", server.uri()),
        Duration::from_secs(300),
    ))
    .unwrap();

    controller.refresh_config().await.unwrap();
    let before = controller.info().await.unwrap();

    let err = controller.refresh_config().await.unwrap_err();
    assert!(matches!(err, ButlerError::ContentParse { .. }));

    let after = controller.info().await.unwrap();
    assert_eq!(before.config_version, after.config_version);
    assert!(metrics::gather().contains(
        r#"butler_config_contact{host="127.0.0.1",path="/invalid/butler.toml",status="failure"} 1"#
    ));
}

#[tokio::test]
async fn non_200_config_fetch_is_a_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing/butler.toml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let controller = Controller::new(settings(
        format!("{}/missing/butler.toml", server.uri()),
        Duration::from_secs(300),
    ))
    .unwrap();

    let err = controller.refresh_config().await.unwrap_err();
    assert!(matches!(err, ButlerError::Transport { status: 404, .. }));
}

#[tokio::test]
async fn first_fetch_does_not_install_the_sync_job() {
    let server = MockServer::start().await;
    let fx = fixture();

    Mock::given(method("GET"))
        .and(path("/firstrun/butler.toml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(agent_toml(
            1,
            false,
            &fx.status,
            &fx.dest,
            &fx.src,
        )))
        .mount(&server)
        .await;

    let controller = Controller::new(settings(
        format!("{}/firstrun/butler.toml", server.uri()),
        Duration::from_millis(500),
    ))
    .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(controller.clone().run(shutdown_rx));

    // Startup fetch has happened, first scheduler tick has not.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(controller.info().await.is_some());
    assert_eq!(controller.installed_sync_interval(), 0);

    // The second tick installs the job.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(controller.installed_sync_interval(), 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn exit_on_failure_stops_the_agent_on_bad_refresh() {
    let server = MockServer::start().await;
    let fx = fixture();

    Mock::given(method("GET"))
        .and(path("/fatal/butler.toml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(agent_toml(
            10,
            true,
            &fx.status,
            &fx.dest,
            &fx.src,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fatal/butler.toml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not toml ==="))
        .mount(&server)
        .await;

    let controller = Controller::new(settings(
        format!("{}/fatal/butler.toml", server.uri()),
        Duration::from_millis(300),
    ))
    .unwrap();

    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(controller.run(shutdown_rx));

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("agent should stop on its own")
        .unwrap();
    assert!(outcome.is_err());
}
