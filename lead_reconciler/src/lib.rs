//! Reconciles inbound sales leads with commerce orders and reports qualifying
//! revenue to the ad platform as offline conversions, once per order.

pub mod config;
pub mod db;
pub mod intake;
pub mod leads;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod policy;
pub mod queue;
pub mod runner;
pub mod schema;
pub mod worker;
