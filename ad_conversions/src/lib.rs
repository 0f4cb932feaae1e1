pub mod datetime;
pub mod models;
pub mod uploader;
