pub mod face_pipeline;
pub mod infrastructure;
pub mod pipeline_config;
pub mod pipeline_logger;
