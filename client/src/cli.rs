use {
    anyhow::{Result, anyhow},
    clap::{Parser, Subcommand},
    std::path::PathBuf,
};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Cli {
    /// Path to the config file.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Print a new random key for the config.
    GenerateKey {
        #[arg(long)]
        cipher: Option<String>,
    },
    /// List supported ciphers.
    Ciphers,
    /// Encrypt a file into a directory of parts.
    Encrypt { input: PathBuf, store: PathBuf },
    /// Restore a file from a directory of parts.
    Decrypt { store: PathBuf, output: PathBuf },
}

impl Cli {
    /// Config given on the command line, or `reseal.json5` in the user config directory.
    pub fn config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config {
            return Ok(path.clone());
        }
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow!("cannot find config dir"))?;
        Ok(config_dir.join("reseal.json5"))
    }
}
