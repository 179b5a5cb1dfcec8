pub mod cli;
pub mod config;
mod download;
pub mod store;
mod upload;

use {
    anyhow::{Result, bail},
    cli::{Cli, Command},
    config::Config,
    derivative::Derivative,
    reseal_sdk::{CipherDetails, CipherRegistry, DEFAULT_CIPHER, EncryptionKey},
    std::sync::Arc,
    tokio::task::block_in_place,
    tracing::info,
    tracing_subscriber::{EnvFilter, prelude::*},
};

pub use {download::decrypt, upload::encrypt};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Ctx {
    pub config: Config,
    pub registry: CipherRegistry,
    #[derivative(Debug = "ignore")]
    pub key: EncryptionKey,
}

impl Ctx {
    pub fn new(config: Config, registry: CipherRegistry) -> Result<Self> {
        let ctx = Self {
            key: config.encryption_key.clone(),
            config,
            registry,
        };
        let details = ctx.details()?;
        if ctx.key.len() != details.key_len() {
            bail!(
                "`encryption_key` has {} bytes, but {} needs {}",
                ctx.key.len(),
                details.id(),
                details.key_len()
            );
        }
        Ok(ctx)
    }

    /// Cipher configured for new objects.
    pub fn details(&self) -> Result<Arc<CipherDetails>> {
        Ok(self.registry.get(&self.config.cipher)?)
    }
}

/// Commands that need no config. Returns `false` if `command` is not one of them.
#[expect(clippy::print_stdout, reason = "command output")]
pub fn run_offline(command: &Command) -> Result<bool> {
    let registry = CipherRegistry::default();
    match command {
        Command::GenerateKey { cipher } => {
            let details = registry.get(cipher.as_deref().unwrap_or(DEFAULT_CIPHER))?;
            println!("{}", details.generate_key().display_unmasked());
        }
        Command::Ciphers => {
            for id in registry.ids() {
                println!("{id}");
            }
        }
        Command::Encrypt { .. } | Command::Decrypt { .. } => return Ok(false),
    }
    Ok(true)
}

pub async fn run(cli: &Cli, config: Config) -> Result<()> {
    let ctx = Ctx::new(config, CipherRegistry::default())?;
    match &cli.command {
        Command::Encrypt { input, store } => {
            let manifest = encrypt(&ctx, input, store).await?;
            info!(
                parts = manifest.parts.len(),
                size = manifest.plaintext_size,
                encrypted_size = manifest.ciphertext_size,
                "encrypted {} into {}",
                input.display(),
                store.display()
            );
        }
        Command::Decrypt { store, output } => {
            block_in_place(|| decrypt(&ctx, store, output))?;
            info!("restored {}", output.display());
        }
        command @ (Command::GenerateKey { .. } | Command::Ciphers) => {
            run_offline(command)?;
        }
    }
    Ok(())
}

pub fn setup_logger(log_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_new(log_filter)?)
        .init();
    Ok(())
}
