pub mod broker;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod outbox;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod utils;
pub mod worker;
