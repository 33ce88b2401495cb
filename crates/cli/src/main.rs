//! Marketstall CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! ms-cli migrate
//!
//! # Create an administrator
//! ms-cli user create -e admin@example.com -p 'long passphrase' -r admin
//!
//! # Add a product to the catalogue
//! ms-cli product create -n "Enamel mug" -p 12.50 -d "Holds coffee"
//! ```
//!
//! # Environment Variables
//!
//! - `MARKETSTALL_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `MARKETSTALL_PASSWORD_MIN_LENGTH` - Minimum password length (default: 8)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ms-cli")]
#[command(author, version, about = "Marketstall CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage the catalogue
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user with a password
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Initial password
        #[arg(short, long, env = "MS_CLI_PASSWORD", hide_env_values = true)]
        password: String,

        /// Role (`customer`, `admin`)
        #[arg(short, long, default_value = "customer")]
        role: String,
    },
}

#[derive(Subcommand)]
enum ProductAction {
    /// Create a product
    Create {
        /// Product name
        #[arg(short, long)]
        name: String,

        /// Unit price in the store currency, e.g. `12.50`
        #[arg(short, long)]
        price: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Image URL
        #[arg(short, long)]
        image: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                password,
                role,
            } => {
                commands::user::create(&email, &password, &role).await?;
            }
        },
        Commands::Product { action } => match action {
            ProductAction::Create {
                name,
                price,
                description,
                image,
            } => {
                commands::product::create(name, &price, description, image).await?;
            }
        },
    }
    Ok(())
}
