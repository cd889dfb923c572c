use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
use crate::domain::model::Role;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "mulheres-politica")]
#[command(about = "Collects and consolidates data on Brazilian women in parliament")]
pub struct CliArgs {
    /// Path to a TOML configuration file (defaults to ./mulheres-politica.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log CPU and memory usage per ETL phase
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Scrape the paginated Câmara listing of female deputies into deputadas.csv
    Deputies,
    /// Scrape the Senado table of sitting senators into senadoras.csv
    Senators,
    /// Extract elected female council members from the TSE archive into vereadoras.csv
    Councillors,
    /// Convert one collection's CSV into its normalized JSON document
    Normalize {
        #[arg(value_enum)]
        role: Role,
    },
    /// Merge the normalized JSON documents into the consolidated artifact
    Consolidate,
    /// Run every job in order
    All,
}

/// Files under a base directory. Writes go to a temporary sibling and are renamed
/// into place, so an interrupted run never leaves a truncated artifact.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }

    pub fn full_path(&self, path: &str) -> PathBuf {
        Path::new(&self.base_path).join(path)
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.full_path(path))?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = full_path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &full_path)?;
        Ok(())
    }
}
