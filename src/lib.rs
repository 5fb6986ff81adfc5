//! Status dashboard for HTTP endpoints, proxies and OpenVPN-style listeners.
//!
//! [`engine::Dispatcher`] fans probes out over every configured service and
//! returns their verdicts in configuration order; [`api`] serves them as an
//! HTML dashboard, an authenticated admin view and JSON.

pub mod admin;
pub mod api;
pub mod config;
pub mod engine;
pub mod models;
pub mod probes;
pub mod render;
pub mod resolver;
