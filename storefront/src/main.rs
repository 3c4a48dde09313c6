use anyhow::Result;
use clap::{Parser, Subcommand};

use storefront::{commands, logging};
use storefront_auth::Settings;

#[derive(Parser)]
#[command(name = "storefront")]
#[command(about = "Storefront account CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List your products
    Listings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (log_path, _guard) = logging::init_logging()?;
    tracing::info!(log = %log_path.display(), "Starting storefront");

    let settings = Settings::new()?;
    let context = storefront_auth::connect(&settings).await?;

    let output = match cli.command {
        Commands::Login { email, password } => {
            commands::login(&context, &email, &password).await?
        }
        Commands::Logout => commands::logout(&context).await?,
        Commands::Whoami => commands::whoami(&context).await?,
        Commands::Listings => commands::listings(&context).await?,
    };
    println!("{}", output);

    Ok(())
}
