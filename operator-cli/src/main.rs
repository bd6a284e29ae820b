use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use devicepass::crypto::{EnvelopeCodec, DEFAULT_KDF_ROUNDS};
use devicepass_types::{extract_query, from_b64url_query, PairingMessage, RawPairingMessage};

#[derive(Parser)]
#[command(name = "devicepass-operator")]
#[command(about = "Operator side of DevicePass pairing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an activation or login link with the master password
    Open {
        /// Deep link, markdown link or bare query
        link: String,
        #[arg(long, default_value_t = DEFAULT_KDF_ROUNDS)]
        kdf_rounds: u32,
    },
    /// Report whether a pairing file is ready for the device
    Check { file: PathBuf },
}

/// Where a pasted pairing message stands.
#[derive(Debug, PartialEq, Eq)]
enum PairingStatus {
    Complete,
    Pending,
    Malformed(String),
}

fn pairing_status(text: &str) -> PairingStatus {
    let raw: RawPairingMessage = match from_b64url_query(&extract_query(text)) {
        Ok(raw) => raw,
        Err(e) => return PairingStatus::Malformed(e.to_string()),
    };
    match PairingMessage::try_from(raw) {
        Ok(PairingMessage::Complete(_)) => PairingStatus::Complete,
        Ok(PairingMessage::Pending(_)) => PairingStatus::Pending,
        Err(shape) => PairingStatus::Malformed(shape.to_string()),
    }
}

fn open(link: &str, kdf_rounds: u32) -> Result<()> {
    let query = extract_query(link);
    let password = Zeroizing::new(
        rpassword::read_password_from_tty(Some("Master password: "))
            .context("Failed to read password")?,
    );
    let codec = EnvelopeCodec::new(kdf_rounds);
    let plaintext = Zeroizing::new(
        codec
            .open_query(&password, &query)
            .map_err(|_| anyhow::anyhow!("Unable to open link: wrong password or damaged link"))?,
    );
    debug!(bytes = plaintext.len(), "Opened envelope");
    println!("{}", String::from_utf8_lossy(&plaintext));
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devicepass_operator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Open { link, kdf_rounds } => open(&link, kdf_rounds),
        Commands::Check { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            match pairing_status(&text) {
                PairingStatus::Complete => println!("complete: ready for the device"),
                PairingStatus::Pending => println!("pending: exchange transcript not written yet"),
                PairingStatus::Malformed(why) => anyhow::bail!("malformed: {}", why),
            }
            Ok(())
        }
    }
}
