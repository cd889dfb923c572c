pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use app::pipelines::{
    ConsolidatePipeline, CouncillorsPipeline, DeputiesPipeline, NormalizePipeline,
    SenatorsPipeline,
};
pub use config::{AppConfig, LocalStorage};
pub use core::etl::EtlEngine;
pub use domain::model::Role;
pub use utils::error::{EtlError, Result};
