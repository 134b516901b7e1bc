pub mod config;
pub mod pipeline_processing;
pub mod stages;
pub mod util;
