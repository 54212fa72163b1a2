pub mod config_store;
pub mod encode_worker;
pub mod frame_queue;
pub mod ingestion_gateway;
pub mod lifecycle_controller;
pub mod session_state;
#[cfg(test)]
pub(crate) mod testing;
pub mod video_exporter;
