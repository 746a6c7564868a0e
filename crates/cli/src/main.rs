use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gpuatlas")]
#[command(about = "GPU pricing aggregator: scrape providers, query the catalog", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape all providers and rebuild the offer catalog
    Scrape {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Only scrape the first N enabled adapters
        #[arg(long)]
        limit: Option<usize>,
        /// Scrape and report without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Query the offer catalog
    Query {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Filter by provider name; repeat for multiple (e.g., "lambda")
        #[arg(long = "provider")]
        providers: Vec<String>,
        /// Filter by GPU model substring (e.g., "H100")
        #[arg(long)]
        model: Option<String>,
        /// Filter by offering class: gpu or cpu
        #[arg(long)]
        class: Option<String>,
        /// Filter by deployment type: vm, bare-metal, or vgpu
        #[arg(long)]
        deployment: Option<String>,
        /// Only offers at or above this hourly price
        #[arg(long)]
        min_price: Option<String>,
        /// Only offers at or below this hourly price
        #[arg(long)]
        max_price: Option<String>,
        /// Only offers with at least this many GPUs
        #[arg(long)]
        min_gpu_count: Option<u32>,
        /// Only offers with at least this much VRAM in GB
        #[arg(long)]
        min_vram: Option<u32>,
        /// Only offers with at most this much VRAM in GB
        #[arg(long)]
        max_vram: Option<u32>,
        /// Free-text term matched across every descriptive column
        #[arg(long)]
        search: Option<String>,
        /// Sort order: price-asc, price-desc, provider, or model
        #[arg(long, default_value = "price-asc")]
        sort: String,
        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Results per page (1-200)
        #[arg(long, default_value_t = 50)]
        per_page: u32,
    },
    /// Show distinct providers, models, and the priced range
    Facets {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Show a stored time series for one subject
    Series {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Stable key or endpoint id of the stream
        #[arg(long)]
        subject: String,
        /// Restrict to one dimension (e.g., "price")
        #[arg(long)]
        dimension: Option<String>,
    },
    /// Show headline catalog counts
    Stats {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Delete samples older than the retention horizon
    Prune {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Retention horizon in days (defaults to the configured value)
        #[arg(long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Scrape {
            config,
            limit,
            dry_run,
        } => {
            commands::run_scrape(&config, limit, dry_run).await?;
        }
        Commands::Query {
            config,
            providers,
            model,
            class,
            deployment,
            min_price,
            max_price,
            min_gpu_count,
            min_vram,
            max_vram,
            search,
            sort,
            page,
            per_page,
        } => {
            let args = commands::QueryArgs {
                providers,
                model,
                class,
                deployment,
                min_price,
                max_price,
                min_gpu_count,
                min_vram,
                max_vram,
                search,
                sort,
                page,
                per_page,
            };
            commands::run_query(&config, args).await?;
        }
        Commands::Facets { config } => {
            commands::run_facets(&config).await?;
        }
        Commands::Series {
            config,
            subject,
            dimension,
        } => {
            commands::run_series(&config, &subject, dimension.as_deref()).await?;
        }
        Commands::Stats { config } => {
            commands::run_stats(&config).await?;
        }
        Commands::Prune { config, days } => {
            commands::run_prune(&config, days).await?;
        }
    }

    Ok(())
}
