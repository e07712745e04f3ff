//! Command-line front end for ChainVault: content-addressed, per-fragment
//! encrypted file storage.
//!
//! # Usage
//!
//! ```text
//! chainvault keygen --out vault.key
//! chainvault ingest report.pdf --owner 0xabc
//! chainvault retrieve <address> --output report.pdf
//! chainvault retrieve <address> --simulate-failure
//! chainvault list --account 0xabc
//! chainvault penalize node-a node-b
//! ```
//!
//! Reports go to stdout as pretty JSON, logs go to stderr.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chainvault_core::crypto::{FragmentCipher, SymmetricKey};
use chainvault_core::hash::ContentId;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use chainvault::config::VaultConfig;
use chainvault::ledger::ConfiguredLedger;
use chainvault::store::DirStore;
use chainvault::telemetry;
use chainvault::vault::Vault;

#[derive(Parser)]
#[command(
    name = "chainvault",
    version,
    about = "Content-addressed, per-fragment encrypted file storage"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the store directory.
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Override the fragment window in bytes.
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// JSON ledger snapshot with node trust scores and file ownership.
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Fragment key as 64 hex characters.
    #[arg(long, global = true, env = "CHAINVAULT_KEY", hide_env_values = true)]
    key_hex: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh fragment key.
    Keygen {
        /// Write the key here instead of printing it.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Fragment, encrypt and store a file.
    Ingest {
        file: PathBuf,

        /// Account recorded as the owner.
        #[arg(long)]
        owner: Option<String>,

        /// Name recorded for the content; defaults to the file name.
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        media_type: Option<String>,
    },

    /// Show metadata and fragment summaries.
    Info { address: ContentId },

    /// Reassemble and verify stored content.
    Retrieve {
        address: ContentId,

        /// Withhold one or two random fragments.
        #[arg(long)]
        simulate_failure: bool,

        /// Write the recovered bytes here instead of embedding them as base64.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for failure injection.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check a local file against a content address.
    Verify { address: ContentId, file: PathBuf },

    /// List stored content, optionally only what an account may access.
    List {
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Delete content and all of its fragments.
    Delete { address: ContentId },

    /// Storage totals.
    Stats,

    /// Check every stored fragment of one content object.
    Audit { address: ContentId },

    /// Compute the failure penalty for the given storing parties.
    Penalize {
        #[arg(required = true)]
        parties: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = VaultConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(dir) = cli.store_dir {
        config.store.dir = dir;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.store.chunk_size = chunk_size;
    }
    if let Some(snapshot) = cli.ledger {
        config.ledger.snapshot = Some(snapshot);
    }
    config.validate()?;

    telemetry::init(&config.log.level);

    if let Commands::Keygen { out } = &cli.command {
        return keygen(out.as_deref());
    }

    let key = load_key(cli.key_hex.as_deref(), config.key.file.as_deref())?;
    let ledger = ConfiguredLedger::from_path(config.ledger.snapshot.as_deref());
    if let ConfiguredLedger::File(file) = &ledger {
        info!(snapshot = %file.path().display(), "using ledger snapshot");
    }
    let mut vault = Vault::new(
        FragmentCipher::new(key),
        DirStore::new(&config.store.dir),
        ledger,
    )
    .with_chunk_size(config.store.chunk_size);

    match cli.command {
        Commands::Keygen { .. } => Ok(()),
        Commands::Ingest {
            file,
            owner,
            name,
            media_type,
        } => {
            let bytes = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let name = name.or_else(|| {
                file.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            });
            print_json(&vault.ingest(&bytes, name, media_type, owner)?)
        }
        Commands::Info { address } => print_json(&vault.info(&address)?),
        Commands::Retrieve {
            address,
            simulate_failure,
            output,
            seed,
        } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let retrieval = vault.retrieve(&address, simulate_failure, &mut rng)?;
            if let (Some(path), Ok(bytes)) = (&output, &retrieval.outcome) {
                fs::write(path, bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), "recovered content written");
            }
            print_json(&retrieval.report(output.is_none()))?;
            if let Err(err) = &retrieval.outcome {
                bail!("retrieval of {address} failed: {err}");
            }
            Ok(())
        }
        Commands::Verify { address, file } => {
            let bytes = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            print_json(&vault.verify_upload(&address, &bytes)?)
        }
        Commands::List { account } => print_json(&vault.list(account.as_deref())?),
        Commands::Delete { address } => print_json(&vault.delete(&address)?),
        Commands::Stats => print_json(&vault.stats()?),
        Commands::Audit { address } => print_json(&vault.audit(&address)?),
        Commands::Penalize { parties } => print_json(&vault.penalize(&parties)),
    }
}

fn keygen(out: Option<&Path>) -> Result<()> {
    let key = SymmetricKey::generate();
    let hex = key.to_hex();
    match out {
        Some(path) => {
            fs::write(path, hex.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "fragment key written");
        }
        None => println!("{}", hex.as_str()),
    }
    Ok(())
}

/// Flag or environment first, then the configured key file. Without either
/// the key lives only as long as the process.
fn load_key(key_hex: Option<&str>, key_file: Option<&Path>) -> Result<SymmetricKey> {
    if let Some(hex) = key_hex {
        return SymmetricKey::from_hex(hex).context("invalid --key-hex");
    }
    if let Some(path) = key_file {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read key file {}", path.display()))?;
        return SymmetricKey::from_hex(raw.trim())
            .with_context(|| format!("invalid key in {}", path.display()));
    }
    warn!("no fragment key configured, generated an ephemeral one; stored content will not be readable by later runs");
    Ok(SymmetricKey::generate())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
