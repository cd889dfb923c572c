pub mod consolidate;
pub mod councillors;
pub mod deputies;
pub mod normalize;
pub mod senators;

pub use consolidate::ConsolidatePipeline;
pub use councillors::CouncillorsPipeline;
pub use deputies::{DeputiesPipeline, DeputyListingParser};
pub use normalize::NormalizePipeline;
pub use senators::{SenateTableParser, SenatorsPipeline};

use crate::domain::model::TransformResult;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::Path;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Writes every output file, primary first, and returns the primary file's path
/// under `output_dir`.
pub(crate) async fn write_outputs<S: Storage>(
    storage: &S,
    output_dir: &str,
    result: &TransformResult,
) -> Result<String> {
    for output in &result.outputs {
        tracing::debug!("Writing {} ({} bytes)", output.path, output.contents.len());
        storage.write_file(&output.path, &output.contents).await?;
    }

    let primary = result
        .outputs
        .first()
        .map(|output| output.path.as_str())
        .unwrap_or_default();
    Ok(Path::new(output_dir).join(primary).display().to_string())
}
