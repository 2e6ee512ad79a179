pub mod admin;
pub mod aws_clients;
pub mod backend;
pub mod board;
pub mod busy;
pub mod card;
pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod handlers;
pub mod media;
pub mod memory;
pub mod models;
pub mod notice;
pub mod realtime;
pub mod repositories;
pub mod routes;
pub mod share;
pub mod startup;
pub mod storage;

use std::sync::Arc;

/// AppState holds shared resources for the web server.
pub struct AppState {
    pub board: Arc<board::Board>,
    pub backend: backend::Backend,
}
