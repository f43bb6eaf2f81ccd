//! HTTP channels: JSON API and the browser form.
//!
//! # Endpoints
//!
//! - `GET  /health`      - Liveness probe
//! - `POST /api/analyze` - JSON analysis
//! - `GET  /`, `/chat`   - Analysis page
//! - `POST /web/analyze` - HTML fragment for the page

pub mod routes;
pub mod web;

pub use routes::{app_router, AppState};
