mod config;
mod generate_cmd;
mod serve_cmd;
mod user_cmd;

#[cfg(test)]
mod test_util;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use studyplan_core::accounts::AuthConfig;
use studyplan_core::token;
use studyplan_db::models::Role;
use studyplan_db::pool;

use config::StudyplanConfig;

#[derive(Parser)]
#[command(name = "studyplan", about = "Personalized study plan service")]
struct Cli {
    /// Database URL (overrides STUDYPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a studyplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/studyplan")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the studyplan database and run migrations
    DbInit,
    /// Run the HTTP API
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Generate a plan and print it as JSON (no database required)
    Generate(generate_cmd::GenerateArgs),
    /// Account administration
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create an account
    Create {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// user, admin or superadmin
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Change the role of an existing account
    SetRole {
        username: String,
        /// user, admin or superadmin
        role: Role,
    },
}

/// Execute the `studyplan init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = token::generate_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        auth: config::AuthSection {
            token_secret: token_secret.clone(),
        },
        llm: config::LlmSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  auth.token_secret = {}...{}", &token_secret[..8], &token_secret[56..]);
    println!();
    println!("Set OPENAI_API_KEY (or llm.api_key in the config) to generate plans with a model;");
    println!("without it plans are synthesized offline.");
    println!("Next: run `studyplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `studyplan db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = StudyplanConfig::resolve(cli_db_url)?;

    println!(
        "Initializing studyplan database at {}...",
        resolved.db_config.redacted_url()
    );

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("studyplan db-init complete.");
    Ok(())
}

async fn cmd_serve(cli_db_url: Option<&str>, bind: &str, port: u16) -> anyhow::Result<()> {
    let resolved = StudyplanConfig::resolve(cli_db_url)?;
    let generator = generate_cmd::generator_from_config(resolved.llm.as_ref());
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let state = serve_cmd::AppState::new(
        db_pool.clone(),
        AuthConfig::new(resolved.token_config),
        generator,
    );
    let result = serve_cmd::run_serve(state, bind, port).await;
    db_pool.close().await;
    result
}

async fn cmd_user(cli_db_url: Option<&str>, command: UserCommands) -> anyhow::Result<()> {
    let resolved = StudyplanConfig::resolve(cli_db_url)?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let result = match command {
        UserCommands::Create {
            username,
            email,
            password,
            role,
        } => {
            let auth = AuthConfig::new(resolved.token_config);
            user_cmd::create_user(&db_pool, &auth, &username, &email, &password, role)
                .await
                .map(|user| println!("Created {role} {} ({})", user.username, user.id))
        }
        UserCommands::SetRole { username, role } => user_cmd::set_role(&db_pool, &username, role)
            .await
            .map(|user| println!("{} is now {}", user.username, user.role)),
    };
    db_pool.close().await;
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), &bind, port).await?;
        }
        Commands::Generate(args) => {
            let file_config = config::load_config().ok();
            let llm = config::resolve_llm(file_config.as_ref())?;
            generate_cmd::run_generate(&args, llm.as_ref()).await?;
        }
        Commands::User { command } => {
            cmd_user(cli.database_url.as_deref(), command).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "studyplan",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
