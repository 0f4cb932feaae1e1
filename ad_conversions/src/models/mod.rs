pub mod conversion;
pub mod upload_result;
