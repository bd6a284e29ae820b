use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devicepass::{
    clock::TokioClock,
    config::write_env_file,
    install::read_installation,
    mailbox::GitWiki,
    pake::{verify_transcript, HmacShareVerifier},
    platform::{GithubClient, GithubDeviceAuth, GithubInstallations, GithubProjects, GithubSecrets},
    ActivationConfig, PairingContext, Settings,
};
use devicepass_types::b64;

#[derive(Parser)]
#[command(name = "devicepass")]
#[command(about = "Pair this device with its operator over a public mailbox")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device flow, hand over the token and rotate secrets
    Activate {
        #[arg(long, env = "CLIENT_ID")]
        client_id: String,
        #[arg(long, env = "MASTER_PASS", hide_env_values = true)]
        master_pass: String,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        owner_token: String,
    },
    /// Wait for the operator's pairing message on the wiki
    Verify {
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        owner_token: String,
        /// Exchange session key (base64url) to authenticate the transcript shares
        #[arg(long, env = "SESSION", hide_env_values = true)]
        session_key: Option<String>,
        /// Deadlines to wait through before giving up
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },
    /// Wait for the operator to install the app
    Install {
        #[arg(long, env = "APP_TOKEN", hide_env_values = true)]
        app_token: String,
        #[arg(long, env = "CLIENT_ID")]
        client_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devicepass=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let production = Settings::is_production().context("Failed to load configuration")?;
    if !production {
        info!("DEVELOPMENT");
        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env loaded: {}", e);
        }
    } else {
        info!("PRODUCTION");
    }

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Activate {
            client_id,
            master_pass,
            owner_token,
        } => {
            let activation = ActivationConfig {
                client_id,
                master_pass,
                owner_token,
            };
            run_activate(&settings, &activation).await.map_err(|e| {
                error!("{:#}", e);
                anyhow::anyhow!("Unable to activate")
            })
        }
        Commands::Verify {
            owner_token,
            session_key,
            rounds,
        } => run_verify(&settings, &owner_token, session_key.as_deref(), rounds)
            .await
            .map_err(|e| {
                error!("{:#}", e);
                anyhow::anyhow!("Unable to verify")
            }),
        Commands::Install {
            app_token,
            client_id,
        } => run_install(&settings, &app_token, &client_id).await,
    }
}

async fn run_activate(settings: &Settings, activation: &ActivationConfig) -> anyhow::Result<()> {
    info!("Activating with Master Password!");
    let timeout = settings.github.timeout();
    let client = GithubClient::new(&settings.github.api_url, &activation.owner_token, timeout)?;
    let device_auth = GithubDeviceAuth::new(&settings.github.login_url, timeout)?;
    let boards = GithubProjects::new(client.clone(), &settings.git.owner);
    let secrets = GithubSecrets::new(client);
    let clock = TokioClock::new();

    let ctx = PairingContext {
        device_auth: &device_auth,
        boards: &boards,
        secrets: &secrets,
        clock: &clock,
    };
    let activated = devicepass::activate(ctx, settings, activation).await?;
    println!("{}", devicepass::ACTIVATED);

    if !settings.production {
        let entries = [
            ("CLIENT_ID", activation.client_id.as_str()),
            ("GITHUB_TOKEN", activated.access_token.as_str()),
            (settings.pairing.pepper_secret_name.as_str(), activated.pepper.as_str()),
        ];
        match write_env_file(Path::new(".env"), &entries) {
            Ok(()) => info!("Wrote new .env file."),
            Err(e) => error!("Unable to write .env file: {}", e),
        }
    }
    Ok(())
}

async fn run_verify(
    settings: &Settings,
    owner_token: &str,
    session_key: Option<&str>,
    rounds: u32,
) -> anyhow::Result<()> {
    let wiki = GitWiki::new(&settings.git.repo(), &settings.wiki.tmp_dir).with_token(owner_token);
    let clock = TokioClock::new();

    for round in 1..=rounds.max(1) {
        info!(round, "Verifying your credentials");
        let Some(app) = devicepass::verify(&wiki, &clock, settings).await? else {
            continue;
        };
        match session_key {
            Some(key) => {
                let key = b64::decode(key).context("Session key is not base64url")?;
                verify_transcript(&app, &HmacShareVerifier::new(&key))?;
                info!("Transcript shares authenticated");
            }
            None => warn!("No session key given, transcript shares not authenticated"),
        }
        println!("Verified your credentials.");
        return Ok(());
    }
    anyhow::bail!("No complete pairing message after {} round(s)", rounds.max(1))
}

async fn run_install(settings: &Settings, app_token: &str, client_id: &str) -> anyhow::Result<()> {
    let client = GithubClient::new(&settings.github.api_url, app_token, settings.github.timeout())?;
    let installations = GithubInstallations::new(client);
    let clock = TokioClock::new();
    let app = devicepass_types::AppIdentity {
        client_id: client_id.to_string(),
    };

    let record = read_installation(
        &installations,
        &clock,
        settings.pairing.poll_policy(),
        &settings.git.repo(),
        &app,
    )
    .await
    .context("Unable to find installation")?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
