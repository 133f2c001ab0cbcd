pub mod access;
pub mod alerts;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod labels;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod state;
pub mod storage;
pub mod urgency;
pub mod utils;
pub mod validation;
pub mod workers;

pub use workers::{default_handlers, Worker};
