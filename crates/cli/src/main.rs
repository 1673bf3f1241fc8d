//! Marketstall CLI - migrations and operational tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! ms-cli migrate
//!
//! # Mint a session token (e.g. for the first admin)
//! ms-cli token issue -e admin@example.com -n "Admin Name" -r admin
//!
//! # Verify a token and print its claims
//! ms-cli token inspect <token>
//!
//! # Generate a value for MARKETSTALL_SESSION_SECRET
//! ms-cli secret generate
//! ```

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
    /// Run storefront database migrations
    Migrate,
    /// Issue or inspect session tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Generate secrets
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Mint a session token signed with the configured secret
    Issue {
        /// User ID to embed (random if omitted)
        #[arg(short, long)]
        subject: Option<String>,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role (`user`, `admin`)
        #[arg(short, long, default_value = "user")]
        role: String,
    },
    /// Verify a token and print its claims
    Inspect {
        /// The token, as stored in the session cookie
        token: String,
    },
}

#[derive(Subcommand)]
enum SecretAction {
    /// Print a random 48-byte base64url secret
    Generate,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Token { action } => match action {
            TokenAction::Issue {
                subject,
                email,
                name,
                role,
            } => commands::token::issue(subject.as_deref(), &email, &name, &role)?,
            TokenAction::Inspect { token } => commands::token::inspect(&token)?,
        },
        Commands::Secret {
            action: SecretAction::Generate,
        } => {
            #[allow(clippy::print_stdout)]
            {
                println!("{}", commands::secret::generate());
            }
        }
    }
    Ok(())
}
