//! Butler is a configuration-management agent.
//!
//! It keeps a local filesystem tree of configuration files for one or
//! more long-running services ("managers", e.g. Prometheus or
//! Alertmanager) continuously in sync with remote authoritative sources,
//! and reloads each managed service when its effective configuration
//! changes. Butler runs beside the managed service and operates
//! autonomously on a periodic schedule.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate).
//! - [`config`] -- Agent config model, TOML parsing, structural
//!   validation, and content-hash change detection.
//! - [`controller`] -- The two-level scheduler: self-config refresh loop
//!   plus the manager-sync fan-out job with live interval reconfiguration.
//! - [`transport`] -- Uniform `get(url) → Response` over http(s), s3,
//!   and local files via the [`Transport`](transport::Transport) trait.
//! - [`validator`] -- Sentinel-section extraction, format-aware syntax
//!   checks, and mustache substitution.
//! - [`manager`] -- Per-manager runtime state and the
//!   fetch→validate→diff→swap→reload pipeline.
//! - [`cache`] -- Last-known-good snapshot/restore for rollback.
//! - [`reloader`] -- HTTP reload signalling with a small failure taxonomy.
//! - [`status`] -- The persisted per-manager health file.
//! - [`metrics`] -- Prometheus gauge surface (set/delete only).
//! - [`server`] -- Axum exporter router (`/metrics`, `/health`) and
//!   graceful shutdown.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`logging`] -- Structured tracing setup with JSON and pretty output.

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cache;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod reloader;
pub mod server;
pub mod status;
pub mod transport;
pub mod validator;
