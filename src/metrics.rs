//! Prometheus gauge surface.
//!
//! The core only ever sets or deletes labeled gauges; the exporter side
//! (`server::build_router`) encodes the registry in text format. Setting
//! a status writes 1 to the matching label set and removes the opposite
//! one, so each manager exposes exactly one row per family at a time.

use std::sync::LazyLock;

use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

pub const SUCCESS: &str = "success";
pub const FAILURE: &str = "failure";

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RELOAD: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register(
        "butler_manager_reload",
        "Outcome of the last reload attempt per manager",
        &["manager", "status"],
    )
});

static REMOTE_REPO_UP: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register(
        "butler_remote_repo_up",
        "Whether the manager's remote repos answered the last fetch",
        &["manager", "status"],
    )
});

static REMOTE_REPO_SANITY: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register(
        "butler_remote_repo_sanity",
        "Whether fetched files passed validation",
        &["manager", "status"],
    )
});

static REPO_IN_SYNC: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register(
        "butler_repo_in_sync",
        "Whether the destination matched the remote on the last tick",
        &["manager", "status"],
    )
});

static CONTACT: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register(
        "butler_config_contact",
        "Outcome of the last fetch of the agent's own config",
        &["host", "path", "status"],
    )
});

fn register(name: &str, help: &str, labels: &[&str]) -> IntGaugeVec {
    let vec = IntGaugeVec::new(Opts::new(name, help), labels).expect("valid metric definition");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("metric registered once");
    vec
}

const fn status_label(ok: bool) -> (&'static str, &'static str) {
    if ok {
        (SUCCESS, FAILURE)
    } else {
        (FAILURE, SUCCESS)
    }
}

fn set_manager_gauge(vec: &IntGaugeVec, manager: &str, ok: bool) {
    let (active, stale) = status_label(ok);
    vec.with_label_values(&[manager, active]).set(1);
    let _ = vec.remove_label_values(&[manager, stale]);
}

pub fn set_reload(manager: &str, ok: bool) {
    set_manager_gauge(&RELOAD, manager, ok);
}

/// Drop both reload rows for a manager (timeout-tolerated reloads leave
/// no opinion behind).
pub fn delete_reload(manager: &str) {
    let _ = RELOAD.remove_label_values(&[manager, SUCCESS]);
    let _ = RELOAD.remove_label_values(&[manager, FAILURE]);
}

pub fn set_remote_repo_up(manager: &str, ok: bool) {
    set_manager_gauge(&REMOTE_REPO_UP, manager, ok);
}

pub fn set_remote_repo_sanity(manager: &str, ok: bool) {
    set_manager_gauge(&REMOTE_REPO_SANITY, manager, ok);
}

pub fn set_repo_in_sync(manager: &str, ok: bool) {
    set_manager_gauge(&REPO_IN_SYNC, manager, ok);
}

pub fn set_contact(host: &str, path: &str, ok: bool) {
    let (active, stale) = status_label(ok);
    CONTACT.with_label_values(&[host, path, active]).set(1);
    let _ = CONTACT.remove_label_values(&[host, path, stale]);
}

/// Encode the registry in Prometheus text format.
#[must_use]
pub fn gather() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buf) {
        tracing::error!(error = %e, "could not encode metrics");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
