use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use persona_voice_core::config::{AppConfig, Config};
use persona_voice_core::voice::VoiceProvider;
use persona_voice_gateway::GatewayState;
use persona_voice_providers::fallback::synthesize_with_fallback;
use persona_voice_providers::{ChatClient, SynthesisRequest, VoiceDispatcher};

mod logging;

#[derive(Parser)]
#[command(
    name = "persona-voice",
    about = "Talk to famous characters: in-character chat with multi-provider voice synthesis",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, env = "PERSONA_VOICE_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to listen on (default: 5000, or $PORT)
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// List characters and their voices
    Characters,

    /// Show which voice providers are configured
    Providers,

    /// Synthesize a line in a character's voice and write the MP3
    Speak {
        #[arg(long)]
        character: String,

        #[arg(long)]
        text: String,

        /// Provider to try first (elevenlabs, playht, openai)
        #[arg(long)]
        provider: Option<VoiceProvider>,

        /// Use only the given provider
        #[arg(long, requires = "provider")]
        no_fallback: bool,

        /// Output file
        #[arg(short, long, default_value = "speech.mp3")]
        out: PathBuf,
    },

    /// Send one chat message to a character
    Chat {
        #[arg(long)]
        character: String,

        #[arg(short, long)]
        message: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    logging::init(&config.logging.clone().unwrap_or_default(), cli.verbose);

    match cli.command {
        Commands::Serve { port, bind } => {
            let port = port.unwrap_or_else(|| config.server_port());
            let bind = bind.unwrap_or_else(|| config.bind_addr());
            let state = Arc::new(GatewayState::new(AppConfig::from_env(config)));
            log_startup_banner(&state).await;

            persona_voice_gateway::start_gateway(state, &bind, port).await?;
        }
        Commands::Characters => {
            let app = AppConfig::from_env(config);
            for c in app.characters.iter() {
                println!("{:<10} {}  ({})", c.id, c.name, c.description);
                for provider in VoiceProvider::ALL {
                    println!("{:>14}: {}", provider.display_name(), c.voices.get(provider));
                }
            }
        }
        Commands::Providers => {
            let app = AppConfig::from_env(config);
            for provider in VoiceProvider::ALL {
                let cap = provider.capability();
                let state = if app.availability.is_available(provider) {
                    "configured"
                } else {
                    "not configured"
                };
                println!(
                    "{:<11} {:<15} auth={:?} voice_id={:?} env={}",
                    provider.display_name(),
                    state,
                    cap.auth,
                    cap.voice_id_format,
                    cap.required_env.join("+")
                );
            }
        }
        Commands::Speak {
            character,
            text,
            provider,
            no_fallback,
            out,
        } => {
            let app = AppConfig::from_env(config);
            let voices = VoiceDispatcher::from_config(&app, reqwest::Client::new());

            let clip = match (provider, no_fallback) {
                (Some(provider), true) => {
                    voices
                        .synthesize(&SynthesisRequest {
                            text,
                            character_id: character,
                            provider,
                        })
                        .await?
                }
                _ => {
                    let outcome =
                        synthesize_with_fallback(&voices, &text, &character, provider, None)
                            .await?;
                    for attempt in &outcome.attempts {
                        tracing::warn!("Skipped: {attempt}");
                    }
                    outcome.clip
                }
            };

            tokio::fs::write(&out, &clip.bytes).await?;
            println!(
                "Wrote {} bytes from {} to {}",
                clip.len(),
                clip.provider.display_name(),
                out.display()
            );
        }
        Commands::Chat { character, message } => {
            let app = AppConfig::from_env(config);
            let c = app
                .characters
                .get(&character)
                .ok_or_else(|| anyhow::anyhow!("Character not found: {character}"))?;
            let chat = ChatClient::new(
                reqwest::Client::new(),
                app.credentials.openai.clone(),
                &app.config.providers.openai,
            );
            let reply = chat.reply(c, &message).await?;
            println!("{}: {reply}", c.name);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config.redacted())?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}

async fn log_startup_banner(state: &GatewayState) {
    let status = |on: bool| if on { "Configured" } else { "Not configured" };
    let app = &state.app;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Persona Voice starting");
    tracing::info!(
        "Analytics: {}",
        if state.events.is_enabled() { "Connected" } else { "Not configured" }
    );
    for provider in VoiceProvider::ALL {
        tracing::info!(
            "{}: {}",
            provider.display_name(),
            status(state.voices.is_available(provider))
        );
    }
    tracing::info!(model = state.chat.model(), "Chat: {}", status(state.chat.is_configured()));
    tracing::info!("Speech-to-text: {}", status(state.transcriber.is_configured()));
    if state.transcoder.is_available().await {
        tracing::info!("Audio processing: ffmpeg found");
    } else {
        tracing::warn!("Audio processing: ffmpeg not found, /api/audio/process will fail");
    }
    tracing::info!(characters = app.characters.len(), "Character table loaded");
}
