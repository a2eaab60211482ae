use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};

use music_discovery::{
    app::App,
    config::Config,
    logging::init_tracing,
    services::recommendations::RecommendationRequest,
    services::token_resolver::InboundCredential,
    spotify_rs::auth::{DEFAULT_SCOPES, authorize_url, generate_state},
    spotify_rs::types::TimeRange,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "MUSIC_DISCOVERY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (default: warn)
    #[arg(long, default_value = "warn", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Spotify application client id
    #[arg(long, env = "SPOTIFY_CLIENT_ID", global = true, hide_env_values = true)]
    client_id: Option<String>,

    /// Spotify application client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", global = true, hide_env_values = true)]
    client_secret: Option<String>,

    /// Key material used to encrypt stored tokens
    #[arg(long, env = "MUSIC_DISCOVERY_CRYPTO_KEY", global = true, hide_env_values = true)]
    crypto_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print track recommendations as JSON
    Recommend {
        /// The user to recommend for
        #[arg(short, long)]
        user: String,

        /// Session whose stored credential should be preferred
        #[arg(short, long)]
        session: Option<String>,

        /// Use this Spotify access token instead of a stored credential
        #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,

        /// Use an app token (client credentials); only genre and artist seeds work
        #[arg(long, conflicts_with = "access_token")]
        app_token: bool,

        /// Comma separated genre seeds
        #[arg(long, value_delimiter = ',')]
        genres: Vec<String>,

        /// Comma separated artist id seeds
        #[arg(long, value_delimiter = ',')]
        artists: Vec<String>,

        /// Comma separated track id seeds
        #[arg(long, value_delimiter = ',')]
        tracks: Vec<String>,

        #[arg(long)]
        market: Option<String>,

        #[arg(short, long)]
        limit: Option<u32>,

        #[arg(long)]
        min_popularity: Option<u32>,

        /// YYYY, YYYY-MM or YYYY-MM-DD
        #[arg(long)]
        released_after: Option<String>,

        /// short_term, medium_term or long_term
        #[arg(long)]
        time_range: Option<TimeRange>,
    },
    /// Print the URL a user visits to grant access
    AuthorizeUrl,
    /// Exchange an authorization code and store the resulting credential
    Connect {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        session: Option<String>,

        /// The `code` query parameter Spotify redirected back with
        #[arg(long)]
        code: String,
    },
    /// Remove every stored credential of a user
    Disconnect {
        #[arg(short, long)]
        user: String,
    },
    /// Print circuit breaker states as JSON
    Health,
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_tracing(&args.log_level)?;

    tracing::debug!("Loading configuration");

    let mut config = {
        if let Some(config) = &args.config {
            Config::from_file(config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load music-discovery config")?;

    if args.client_id.is_some() {
        config.spotify.client_id = args.client_id.clone();
    }
    if args.client_secret.is_some() {
        config.spotify.client_secret = args.client_secret.clone();
    }
    if args.crypto_key.is_some() {
        config.vault.crypto_key = args.crypto_key.clone();
    }

    match args.command {
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = Config::create_default()?;
                println!("{}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
        Commands::AuthorizeUrl => {
            let credentials = config
                .spotify_credentials()
                .ok_or(color_eyre::eyre::eyre!("Spotify client id and secret are required"))?;
            println!(
                "{}",
                authorize_url(
                    &config.spotify.accounts_base,
                    &credentials.client_id,
                    &config.spotify.redirect_uri,
                    &generate_state(),
                    DEFAULT_SCOPES,
                )
            );
        }
        Commands::Connect {
            user,
            session,
            code,
        } => {
            let app = App::build(config).await?;
            let grant = app
                .gateway
                .exchange_code(&code, &app.config.spotify.redirect_uri)
                .await
                .wrap_err("Failed to exchange authorization code")?;
            app.resolver
                .store_grant(&user, session.as_deref(), &grant)
                .await?;

            let profile = app.gateway.current_user(&grant.access_token).await?;
            tracing::info!("Connected Spotify account {} for user {}", profile.id, user);
            println!(
                "Connected {}",
                profile.display_name.unwrap_or(profile.id)
            );
        }
        Commands::Disconnect { user } => {
            let app = App::build(config).await?;
            app.resolver.disconnect(&user).await?;
            tracing::info!("Disconnected user {}", user);
        }
        Commands::Health => {
            let app = App::build(config).await?;
            println!("{}", serde_json::to_string_pretty(&app.health())?);
        }
        Commands::Recommend {
            user,
            session,
            access_token,
            app_token,
            genres,
            artists,
            tracks,
            market,
            limit,
            min_popularity,
            released_after,
            time_range,
        } => {
            let app = App::build(config).await?;

            let embedded_access_token = if app_token {
                Some(app.gateway.app_token().await?)
            } else {
                access_token
            };
            let credential = InboundCredential {
                user_id: user,
                session_id: session,
                embedded_access_token,
            };
            let request = RecommendationRequest {
                genres,
                artist_ids: artists,
                track_ids: tracks,
                market,
                limit,
                min_popularity,
                released_after,
                time_range,
            };

            let response = app
                .discovery
                .recommend(&credential, request)
                .await
                .with_context(|| "Failed to compute recommendations")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
