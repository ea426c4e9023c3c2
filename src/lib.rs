mod error;
mod ort_service;
mod preprocess;
mod proxy;
mod registry;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod classification;
pub mod config;
pub mod model_service;

pub use app::start_app;
