mod commands;

use clap::{Args, Parser, Subcommand};
use influx_provider::client::AuthorizationStatus;
use influx_provider::provider::{DEFAULT_LOG_LEVEL, LOG_LEVEL_ENV, TOKEN_ENV, URL_ENV};
use influx_provider::{PermissionSpec, ProviderConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "influx-provider")]
#[command(
    about = "Manage InfluxDB v2 buckets, DBRP mappings and authorizations",
    long_about = None
)]
struct Cli {
    /// InfluxDB server URL
    #[arg(long, env = URL_ENV, global = true)]
    url: Option<String>,

    /// API token
    #[arg(long, env = TOKEN_ENV, global = true, hide_env_values = true)]
    token: Option<String>,

    /// Log level from 1 (TRACE) to 5 (ERROR); RUST_LOG takes precedence
    #[arg(
        long,
        env = LOG_LEVEL_ENV,
        global = true,
        default_value_t = DEFAULT_LOG_LEVEL,
        value_parser = clap::value_parser!(u8).range(1..=5)
    )]
    log_level: u8,

    /// Directory holding .influx-provider/state.json
    #[arg(long, global = true, default_value = ".")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage a bucket and its DBRP mapping
    Bucket {
        #[command(subcommand)]
        command: BucketCommands,
    },
    /// Manage an authorization token
    Authorization {
        #[command(subcommand)]
        command: AuthorizationCommands,
    },
    /// Inspect local state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum BucketCommands {
    /// Show what apply would change
    Plan(BucketArgs),
    /// Create, update or replace the bucket
    Apply(BucketArgs),
    /// Re-read the bucket and its mapping into state
    Refresh {
        /// Resource name
        name: String,
    },
    /// Delete the bucket and its mapping
    Destroy {
        /// Resource name
        name: String,
    },
}

#[derive(Args)]
struct BucketArgs {
    /// Bucket name (also the DBRP database name)
    name: String,

    /// Local resource name; defaults to the bucket name
    #[arg(long)]
    resource: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Days to keep data; 0 keeps it forever
    #[arg(long, default_value_t = 0)]
    retention_days: u32,

    /// Organization id; defaults to the first organization of the token
    #[arg(long)]
    org_id: Option<String>,
}

#[derive(Subcommand)]
enum AuthorizationCommands {
    /// Show what apply would change
    Plan(AuthorizationArgs),
    /// Create, update or replace the authorization
    Apply(AuthorizationArgs),
    /// Re-read the authorization into state
    Refresh {
        /// Resource name
        name: String,
    },
    /// Delete the authorization
    Destroy {
        /// Resource name
        name: String,
    },
}

#[derive(Args)]
struct AuthorizationArgs {
    /// Authorization name (stored as its description)
    name: String,

    /// Local resource name; defaults to the authorization name
    #[arg(long)]
    resource: Option<String>,

    /// Permission as <action>:<type>[:<id>], e.g. write:buckets:0123456789abcdef
    #[arg(short, long = "permission", required = true)]
    permissions: Vec<PermissionSpec>,

    /// active or inactive
    #[arg(long, default_value = "active")]
    status: AuthorizationStatus,
}

#[derive(Subcommand)]
enum StateCommands {
    /// List managed resources
    List,
}

fn init_tracing(config: &ProviderConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default().add_directive(config.level_filter().into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ProviderConfig::new(
        cli.url.unwrap_or_default(),
        cli.token.unwrap_or_default(),
    )
    .with_log_level(cli.log_level);
    init_tracing(&config);

    let ctx = commands::Context::new(config, &cli.state_dir);

    match cli.command {
        Commands::Version => {
            println!("influx-provider {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::State { command } => match command {
            StateCommands::List => commands::state::list(&ctx).await,
        },
        Commands::Bucket { command } => match command {
            BucketCommands::Plan(args) => {
                commands::bucket::plan(&ctx, &args.resource_name(), &args.into()).await
            }
            BucketCommands::Apply(args) => {
                commands::bucket::apply(&ctx, &args.resource_name(), &args.into()).await
            }
            BucketCommands::Refresh { name } => commands::bucket::refresh(&ctx, &name).await,
            BucketCommands::Destroy { name } => commands::bucket::destroy(&ctx, &name).await,
        },
        Commands::Authorization { command } => match command {
            AuthorizationCommands::Plan(args) => {
                commands::authorization::plan(&ctx, &args.resource_name(), &args.into()).await
            }
            AuthorizationCommands::Apply(args) => {
                commands::authorization::apply(&ctx, &args.resource_name(), &args.into()).await
            }
            AuthorizationCommands::Refresh { name } => {
                commands::authorization::refresh(&ctx, &name).await
            }
            AuthorizationCommands::Destroy { name } => {
                commands::authorization::destroy(&ctx, &name).await
            }
        },
    }
}

impl BucketArgs {
    fn resource_name(&self) -> String {
        self.resource.clone().unwrap_or_else(|| self.name.clone())
    }
}

impl AuthorizationArgs {
    fn resource_name(&self) -> String {
        self.resource.clone().unwrap_or_else(|| self.name.clone())
    }
}

impl From<BucketArgs> for influx_provider::BucketSpec {
    fn from(args: BucketArgs) -> Self {
        let mut spec = Self::new(args.name).with_retention_days(args.retention_days);
        spec.description = args.description;
        spec.org_id = args.org_id;
        spec
    }
}

impl From<AuthorizationArgs> for influx_provider::AuthorizationSpec {
    fn from(args: AuthorizationArgs) -> Self {
        Self::new(args.name, args.permissions).with_status(args.status)
    }
}
