mod backend;
mod config;
mod draft;
mod http;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod session;
#[cfg(test)]
mod test_support;
mod upload;
mod validation;

use backend::{AuthClient, ProductsClient};
use clap::{Parser, Subcommand};
use config::{BackendConfig, GeminiConfig};
use draft::{DraftListing, load_image};
use eyre::{WrapErr, eyre};
use llm::GeminiClient;
use models::{Category, ImageRef, ListingDetails};
use pipeline::{SubmitMode, SubmitPipeline};
use serde::Serialize;
use serde_json::json;
use session::SessionStore;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "campus-market", about = "Campus marketplace client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session locally
    Login {
        email: String,
        #[arg(long, env = "MARKET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        username: String,
        email: String,
        #[arg(long, env = "MARKET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user, checking the token with the backend
    Whoami,
    /// List marketplace products
    Browse {
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "8")]
        limit: u32,
    },
    /// Show one product
    Show { id: String },
    /// List your own listings
    Mine,
    /// Draft listing fields from a product photo
    Analyze { image: PathBuf },
    /// Ask the vision model whether photos are acceptable for a listing
    CheckImages {
        #[arg(long)]
        title: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Create a listing from a JSON draft and up to five photos
    Sell {
        /// JSON file with the listing fields
        #[arg(long)]
        draft: PathBuf,
        /// Fill title, description, category, condition and price from the
        /// first photo; contact details and meeting place come from the draft
        #[arg(long)]
        autofill: bool,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Edit one of your listings
    Update {
        id: String,
        /// JSON file whose fields replace the stored ones
        #[arg(long)]
        draft: Option<PathBuf>,
        /// Position of a stored image to drop (repeatable)
        #[arg(long = "remove-image")]
        remove: Vec<usize>,
        /// New photos to add
        images: Vec<PathBuf>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Register { .. } => "register",
            Command::Logout => "logout",
            Command::Whoami => "whoami",
            Command::Browse { .. } => "browse",
            Command::Show { .. } => "show",
            Command::Mine => "mine",
            Command::Analyze { .. } => "analyze",
            Command::CheckImages { .. } => "check_images",
            Command::Sell { .. } => "sell",
            Command::Update { .. } => "update",
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "market.cli", "command failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    metrics::inc_command(cli.command.name());

    let backend = BackendConfig::from_env();
    let mut store = SessionStore::hydrate(config::SESSION_PATH.clone()).await;
    info!(target = "market.cli", command = cli.command.name(), signed_in = store.is_authenticated(), "command_started");

    match cli.command {
        Command::Login { email, password } => {
            let session = AuthClient::new(backend)
                .login(&email, &password)
                .await
                .wrap_err("login failed")?;
            store.persist(session.clone()).await?;
            print_json(&session.user)?;
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let session = AuthClient::new(backend)
                .register(&username, &email, &password)
                .await
                .wrap_err("registration failed")?;
            store.persist(session.clone()).await?;
            print_json(&session.user)?;
        }
        Command::Logout => {
            store.clear().await?;
            info!(target = "market.cli", path = %store.path().display(), "session_cleared");
            print_json(&json!({ "signedIn": false }))?;
        }
        Command::Whoami => {
            let auth = AuthClient::new(backend);
            if store.refresh(&auth).await? {
                print_json(&store.current().map(|s| &s.user))?;
            } else {
                print_json(&json!({ "signedIn": false }))?;
            }
        }
        Command::Browse { page, limit } => {
            let page = ProductsClient::new(backend, store.token().map(str::to_string))
                .list_products(page, limit)
                .await?;
            print_json(&page)?;
        }
        Command::Show { id } => {
            let product = ProductsClient::new(backend, store.token().map(str::to_string))
                .get_product(&id)
                .await?;
            print_json(&product)?;
        }
        Command::Mine => {
            let token = require_token(&store)?;
            let products = ProductsClient::new(backend, Some(token))
                .my_products()
                .await?;
            print_json(&products)?;
        }
        Command::Analyze { image } => {
            let vision = GeminiClient::new(GeminiConfig::from_env());
            let image = load_image(&image).await?;
            info!(target = "market.cli", model = vision.model(), image = %image.name, "analyzing_image");
            let analysis = validation::analyze_product(&vision, &image).await?;
            print_json(&analysis)?;
        }
        Command::CheckImages {
            title,
            category,
            images,
        } => {
            let category = parse_category(category.as_deref())?;
            let vision = GeminiClient::new(GeminiConfig::from_env());
            let images = load_images(&images).await?;
            let refs: Vec<&ImageRef> = images.iter().collect();
            let results = validation::validate_all(&vision, &refs, &title, category).await;
            let report: Vec<_> = images
                .iter()
                .zip(results)
                .map(|(image, result)| match result {
                    Ok(result) => json!({ "image": image.name, "result": result }),
                    Err(err) => json!({ "image": image.name, "error": err.to_string() }),
                })
                .collect();
            print_json(&report)?;
        }
        Command::Sell {
            draft,
            autofill,
            images,
        } => {
            let token = require_token(&store)?;
            let mut listing = DraftListing::new(read_details(&draft).await?);
            if autofill {
                listing.check_seller_fields()?;
            } else {
                listing.validate()?;
            }
            let mut pipeline = submit_pipeline(backend, token);
            pipeline
                .admit_images(&mut listing, load_images(&images).await?)
                .await?;
            if autofill {
                pipeline.autofill(&mut listing).await?;
            }
            let report = pipeline.submit(&mut listing, SubmitMode::Create).await?;
            print_json(&report)?;
        }
        Command::Update {
            id,
            draft,
            mut remove,
            images,
        } => {
            let token = require_token(&store)?;
            let products = ProductsClient::new(backend.clone(), Some(token.clone()));
            let existing = products.get_product(&id).await?;
            let mut listing = DraftListing::from_product(&existing)?;
            if let Some(path) = draft {
                listing.details = read_details(&path).await?;
            }
            remove.sort_unstable();
            remove.dedup();
            for index in remove.into_iter().rev() {
                listing.remove_image(index)?;
            }

            let mut pipeline = submit_pipeline(backend, token);
            if !images.is_empty() {
                pipeline
                    .admit_images(&mut listing, load_images(&images).await?)
                    .await?;
            }
            let report = pipeline
                .submit(&mut listing, SubmitMode::Update { id })
                .await?;
            print_json(&report)?;
        }
    }
    Ok(())
}

fn submit_pipeline(backend: BackendConfig, token: String) -> SubmitPipeline {
    SubmitPipeline::new(
        Arc::new(GeminiClient::new(GeminiConfig::from_env())),
        ProductsClient::new(backend, Some(token)),
    )
}

fn require_token(store: &SessionStore) -> eyre::Result<String> {
    store
        .token()
        .map(str::to_string)
        .ok_or_else(|| eyre!("not signed in; run `campus-market login` first"))
}

fn parse_category(raw: Option<&str>) -> eyre::Result<Option<Category>> {
    raw.map(|value| Category::parse(value).ok_or_else(|| eyre!("unknown category `{value}`")))
        .transpose()
}

async fn read_details(path: &Path) -> eyre::Result<ListingDetails> {
    let raw = tokio::fs::read(path)
        .await
        .wrap_err_with(|| format!("unable to read {}", path.display()))?;
    serde_json::from_slice(&raw).wrap_err_with(|| format!("{} is not a valid listing draft", path.display()))
}

async fn load_images(paths: &[PathBuf]) -> eyre::Result<Vec<ImageRef>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(load_image(path).await?);
    }
    Ok(images)
}

fn print_json(value: &impl Serialize) -> eyre::Result<()> {
    let out = serde_json::to_string_pretty(value).wrap_err("serialize output")?;
    println!("{out}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
