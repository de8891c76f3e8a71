//! Integration tests for agent config parsing, resolution, and hashing.

use std::collections::BTreeMap;

use butler::config::model::{ReloadMethod, RepoMethod};
use butler::config::{load, parse_document, sha256_hex, ConfigVersion};
use butler::error::ButlerError;

const FULL: &str = r#"
[globals]
scheduler-interval = 300
exit-on-failure = false
status-file = "/var/tmp/butler.status"
config-managers = ["prometheus", "alertmanager"]

[prometheus]
repos = ["mirror", "fallback"]
dest-path = "/etc/prometheus"
primary-config = ["prometheus.yml"]
additional-config = ["alerts/core.rules", "alerts/extra.rules"]
clean-files = true
enable-cache = true
cache-path = "/var/cache/butler"
manager-timeout-ok = false

[prometheus.mustache-subs]
ethos-cluster-id = "prod-or1"

[prometheus.mirror]
method = "http"
host = "configs.example.com"
repo-path = "/prometheus"
timeout = 10

[prometheus.fallback]
method = "s3"
bucket = "cfg-bucket"
region = "us-east-1"
repo-path = "prometheus"

[prometheus.reloader]
method = "post"
url = "http://127.0.0.1:9090/-/reload"
timeout = 10

[alertmanager]
repos = ["mirror"]
dest-path = "/etc/alertmanager"
primary-config = ["alertmanager.yml"]

[alertmanager.mirror]
method = "file"
repo-path = "/srv/configs/alertmanager"
"#;

#[test]
fn full_document_loads_and_resolves() {
    let (config, version) = load(FULL.as_bytes(), "butler.toml", &BTreeMap::new()).unwrap();

    assert_eq!(config.globals.scheduler_interval, 300);
    assert!(!config.globals.exit_on_failure);
    assert_eq!(config.managers.len(), 2);

    let prom = config.manager("prometheus").unwrap();
    assert_eq!(prom.repos.len(), 2);
    assert_eq!(prom.repos[0].0, "mirror");
    assert_eq!(prom.repos[1].0, "fallback");
    assert!(prom.clean_files);
    assert!(prom.enable_cache);
    assert_eq!(prom.reloader.method, ReloadMethod::Post);
    assert_eq!(
        prom.mustache_subs.get("ethos-cluster-id").map(String::as_str),
        Some("prod-or1")
    );

    let am = config.manager("alertmanager").unwrap();
    assert_eq!(am.repos[0].1.method, RepoMethod::File);
    assert_eq!(am.reloader.method, ReloadMethod::None);

    let ConfigVersion::Hash(hash) = version else {
        unreachable!()
    };
    assert_eq!(hash, sha256_hex(FULL.as_bytes()));
}

#[test]
fn defaults_apply_when_fields_are_omitted() {
    let doc = parse_document(FULL.as_bytes(), "butler.toml").unwrap();
    let am = &doc.managers["alertmanager"];
    assert!(!am.clean_files);
    assert!(!am.enable_cache);
    assert!(!am.manager_timeout_ok);
    assert!(am.additional_config.is_empty());

    let mirror = &am.repo_opts["mirror"];
    assert_eq!(mirror.timeout, 10);
    assert!(!mirror.insecure);
}

#[test]
fn file_urls_join_repo_path_and_file() {
    let doc = parse_document(FULL.as_bytes(), "butler.toml").unwrap();
    let prom = &doc.managers["prometheus"];

    let http = &prom.repo_opts["mirror"];
    assert_eq!(
        http.file_url("prometheus.yml"),
        "http://configs.example.com/prometheus/prometheus.yml"
    );
    assert_eq!(
        http.file_url("alerts/core.rules"),
        "http://configs.example.com/prometheus/alerts/core.rules"
    );

    let s3 = &prom.repo_opts["fallback"];
    assert_eq!(
        s3.file_url("prometheus.yml"),
        "s3://cfg-bucket/prometheus/prometheus.yml"
    );
}

#[test]
fn dest_paths_cover_primary_and_additional() {
    let (config, _) = load(FULL.as_bytes(), "butler.toml", &BTreeMap::new()).unwrap();
    let prom = config.manager("prometheus").unwrap();

    let paths = prom.all_dest_paths();
    assert_eq!(paths.len(), 3);
    assert!(paths.contains(&"/etc/prometheus/prometheus.yml".into()));
    assert!(paths.contains(&"/etc/prometheus/alerts/core.rules".into()));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let err = load(b"not toml ===", "butler.toml", &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, ButlerError::ConfigParse { .. }));
}

#[test]
fn structural_problems_are_validation_errors() {
    let toml = r#"
[globals]
config-managers = ["ghost"]
"#;
    let err = load(toml.as_bytes(), "butler.toml", &BTreeMap::new()).unwrap_err();
    match err {
        ButlerError::ConfigValidation { errors } => {
            assert!(errors.iter().any(|e| e.section == "ghost"));
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn version_hash_tracks_raw_bytes() {
    let (_, v1) = load(FULL.as_bytes(), "butler.toml", &BTreeMap::new()).unwrap();
    let (_, v2) = load(FULL.as_bytes(), "butler.toml", &BTreeMap::new()).unwrap();
    assert_eq!(v1, v2);

    let altered = FULL.replace("scheduler-interval = 300", "scheduler-interval = 60");
    let (_, v3) = load(altered.as_bytes(), "butler.toml", &BTreeMap::new()).unwrap();
    assert_ne!(v1, v3);
}
