pub mod archive;
pub mod consolidate;
pub mod etl;
pub mod flatfile;
pub mod http;
pub mod municipalities;
pub mod normalize;
pub mod pagination;
pub mod profile;
pub mod selectors;
pub mod stats;

pub use crate::domain::model::{Record, TransformResult};
pub use crate::domain::ports::{FragmentParser, Pipeline, Storage};
pub use crate::utils::error::Result;
