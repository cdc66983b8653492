//! Vertex Orchestrator CLI
//!
//! Drives keygen, signing, policy binding and secret import across the
//! configured vertex cluster, plus the two end-to-end venue flows.

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use std::sync::Arc;
use vertex_orchestrator::{
    encode_public_key_pem, logging, AppConfig, CommandSharer, KeyGenerator, KeyName,
    OperatorPrompt, OrchestratorError, OrderRequest, PolicyBinder, RestVenue, Scheme,
    SecretImporter, SessionAuthenticator, Side, SigningOrchestrator, TerminalPrompt, VenueSession,
    VertexClient,
};

#[derive(Parser)]
#[command(name = "vertex-orchestrator")]
#[command(about = "Threshold signing orchestration across vertex nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the loaded cluster configuration
    Config,

    /// Generate a new distributed key
    Keygen {
        /// Key name (random UUID if omitted)
        #[arg(short, long)]
        key_name: Option<String>,

        #[arg(short, long, default_value = "ed25519")]
        scheme: Scheme,
    },

    /// Sign a UTF-8 message with an existing key
    Sign {
        #[arg(short, long)]
        key_name: String,

        #[arg(short, long)]
        message: String,

        #[arg(short, long, default_value = "ed25519")]
        scheme: Scheme,
    },

    /// Attach a policy to a key on every vertex
    AttachPolicy {
        #[arg(short, long)]
        key_name: String,

        #[arg(short, long)]
        policy: String,
    },

    /// Split a secret into encrypted shares and import them
    ImportSecret {
        /// Key name (random UUID if omitted)
        #[arg(short, long)]
        key_name: Option<String>,

        /// Environment variable holding the secret
        #[arg(long, default_value = "VENUE_API_SECRET")]
        secret_env: String,

        /// Program that splits the secret into encrypted shares
        #[arg(long)]
        sharer: String,

        /// Extra arguments for the sharer program
        #[arg(long = "sharer-arg")]
        sharer_args: Vec<String>,

        #[arg(short, long, default_value = "hmac-sha256")]
        scheme: Scheme,
    },

    /// Ed25519 flow: keygen, register with the venue, logon over WebSocket, place orders
    WsTrade {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,

        #[arg(long, default_value = "0.001")]
        quantity: String,

        /// Number of market orders to place after logon
        #[arg(long, default_value = "3")]
        orders: usize,
    },

    /// HMAC flow: import the venue secret, attach a policy, place a signed REST order
    RestTrade {
        #[arg(long, default_value = "limit-half-btc-orders")]
        policy: String,

        #[arg(long)]
        sharer: String,

        #[arg(long = "sharer-arg")]
        sharer_args: Vec<String>,

        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,

        #[arg(long, default_value = "0.0001")]
        quantity: String,
    },
}

struct Context {
    config: AppConfig,
    cluster: Arc<vertex_orchestrator::Cluster>,
    client: VertexClient,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("{}", e);
    }

    if let Err(e) = run(cli.command, config).await {
        tracing::error!(code = e.error_code(), node = ?e.node(), "{}", e);
        eprintln!("Error [{}]: {}", e.error_code(), e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: AppConfig) -> Result<(), OrchestratorError> {
    let cluster = Arc::new(config.cluster.clone());
    let client = VertexClient::for_cluster(&cluster)?;
    let ctx = Context {
        config,
        cluster,
        client,
    };

    match command {
        Commands::Config => {
            ctx.config.print_summary();
            Ok(())
        }
        Commands::Keygen { key_name, scheme } => {
            let key_name = key_name.map(KeyName::new).unwrap_or_else(KeyName::random);
            let generator = KeyGenerator::new(ctx.cluster.clone(), ctx.client.clone(), scheme);
            let public_key = generator.generate(&key_name).await?;

            println!("Key name: {}", key_name);
            println!("Public key: {}", public_key.to_hex());
            if scheme == Scheme::Ed25519 {
                println!("{}", encode_public_key_pem(&public_key)?);
            }
            Ok(())
        }
        Commands::Sign {
            key_name,
            message,
            scheme,
        } => {
            let signer = SigningOrchestrator::new(ctx.cluster.clone(), ctx.client.clone(), scheme);
            let signature = signer.sign(&KeyName::new(key_name), message.as_bytes()).await?;
            println!("{}", signature.to_hex());
            Ok(())
        }
        Commands::AttachPolicy { key_name, policy } => {
            PolicyBinder::new(ctx.cluster.clone(), ctx.client.clone())
                .attach_policy(&KeyName::new(key_name), &policy)
                .await?;
            println!("Policy {} attached", policy);
            Ok(())
        }
        Commands::ImportSecret {
            key_name,
            secret_env,
            sharer,
            sharer_args,
            scheme,
        } => {
            let secret = std::env::var(&secret_env)
                .map_err(|_| OrchestratorError::invalid(format!("{} is not set", secret_env)))?;
            let key_name = key_name.map(KeyName::new).unwrap_or_else(KeyName::random);
            let sharer = Arc::new(CommandSharer::new(sharer, sharer_args));

            SecretImporter::new(ctx.cluster.clone(), ctx.client.clone(), sharer, scheme)
                .import_secret(&key_name, secret.as_bytes())
                .await?;
            println!("Secret imported as {}", key_name);
            Ok(())
        }
        Commands::WsTrade {
            symbol,
            quantity,
            orders,
        } => ws_trade(&ctx, &symbol, &quantity, orders).await,
        Commands::RestTrade {
            policy,
            sharer,
            sharer_args,
            symbol,
            quantity,
        } => rest_trade(&ctx, &policy, sharer, sharer_args, &symbol, &quantity).await,
    }
}

async fn ws_trade(
    ctx: &Context,
    symbol: &str,
    quantity: &str,
    orders: usize,
) -> Result<(), OrchestratorError> {
    let key_name = KeyName::random();
    let generator = KeyGenerator::new(ctx.cluster.clone(), ctx.client.clone(), Scheme::Ed25519);
    let public_key = generator.generate(&key_name).await?;
    let pem = encode_public_key_pem(&public_key)?;

    let api_key = tokio::task::spawn_blocking(move || TerminalPrompt::stdio().confirm_registration(&pem))
        .await
        .map_err(|e| OrchestratorError::session(format!("prompt task failed: {}", e)))??;

    let signer = Arc::new(SigningOrchestrator::new(
        ctx.cluster.clone(),
        ctx.client.clone(),
        Scheme::Ed25519,
    ));
    let mut session =
        VenueSession::connect(&ctx.config.venue.ws_url, ctx.config.venue.response_timeout).await?;

    SessionAuthenticator::new(signer)
        .authenticate(&mut session, &api_key, &key_name)
        .await?;

    let placed = join_all((0..orders).map(|_| {
        let order = OrderRequest::market(symbol, Side::Buy, quantity);
        let session = &session;
        async move { session.place_order(&order).await }
    }))
    .await;

    let mut result = Ok(());
    for outcome in placed {
        match outcome {
            Ok(response) => println!("Placed market order {}", response.id),
            Err(e) => {
                tracing::warn!(error = %e, "Order failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
    }

    session.close();
    result
}

async fn rest_trade(
    ctx: &Context,
    policy: &str,
    sharer: String,
    sharer_args: Vec<String>,
    symbol: &str,
    quantity: &str,
) -> Result<(), OrchestratorError> {
    let venue = &ctx.config.venue;
    let api_key = venue
        .api_key
        .clone()
        .ok_or_else(|| OrchestratorError::invalid("VENUE_API_KEY is not set"))?;
    let api_secret = venue
        .api_secret
        .clone()
        .ok_or_else(|| OrchestratorError::invalid("VENUE_API_SECRET is not set"))?;

    let key_name = KeyName::random();
    let sharer = Arc::new(CommandSharer::new(sharer, sharer_args));

    SecretImporter::new(ctx.cluster.clone(), ctx.client.clone(), sharer, Scheme::HmacSha256)
        .import_secret(&key_name, api_secret.as_bytes())
        .await?;
    println!("HMAC secret imported as {}", key_name);

    PolicyBinder::new(ctx.cluster.clone(), ctx.client.clone())
        .attach_policy(&key_name, policy)
        .await?;
    println!("Policy {} attached", policy);

    let signer = SigningOrchestrator::new(ctx.cluster.clone(), ctx.client.clone(), Scheme::HmacSha256);
    let order = OrderRequest::market(symbol, Side::Buy, quantity);
    let placed = RestVenue::new(&venue.rest_url, api_key)?
        .place_signed_order(&order, &signer, &key_name)
        .await?;

    println!("Order placed: {}", placed);
    Ok(())
}
