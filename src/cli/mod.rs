use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use newsdesk::reflection::MAX_PERIOD_DAYS;
use newsdesk::Config;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod commands;
pub mod migrate;

#[derive(Parser)]
#[command(
    name = "newsdesk",
    about = "Financial news research desk with periodic reflections",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Treat this date as "today" when resolving periods (YYYY-MM-DD)
    #[arg(long, global = true)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daily news and price analysis for a stock ticker or market topic
    Analyze {
        /// Ticker (e.g. NVDA) or market topic (e.g. market:general, topic:economy_macro)
        #[arg(short, long)]
        subject: String,

        /// Number of news articles to fetch
        #[arg(short, long, default_value_t = 50)]
        articles: usize,

        /// Day to analyze (defaults to the effective date)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Print the analysis without storing it
        #[arg(long)]
        no_save: bool,
    },

    /// Generate a periodic reflection over stored daily analyses
    Reflect {
        /// Subject to reflect on; omit for a portfolio-wide reflection
        #[arg(short, long)]
        subject: Option<String>,

        /// Period label: week, month, quarter or any custom label
        #[arg(short, long, default_value = "week")]
        period: String,

        /// Explicit window length in days, overriding the label's default
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_PERIOD_DAYS)))]
        days: Option<u32>,

        /// Do not run daily analyses for missing days
        #[arg(long)]
        no_backfill: bool,
    },

    /// Search stored analyses by semantic similarity
    Search {
        /// Restrict results to one subject
        #[arg(short, long)]
        subject: Option<String>,

        /// Natural language query
        #[arg(short, long)]
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Earliest record date (inclusive)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        /// Latest record date (inclusive)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },

    /// Run database migrations
    Migrate,
}

/// Execute CLI command
pub async fn run(cli: Cli, config: Config, cancel: CancellationToken) -> Result<()> {
    match cli.command {
        Commands::Analyze {
            subject,
            articles,
            date,
            no_save,
        } => {
            info!("Running daily analysis for {}", subject);
            commands::analyze(&config, &subject, articles, date, !no_save, &cancel).await?;
        }
        Commands::Reflect {
            subject,
            period,
            days,
            no_backfill,
        } => {
            info!("Running {} reflection", period);
            commands::reflect(&config, subject.as_deref(), &period, days, !no_backfill, &cancel).await?;
        }
        Commands::Search {
            subject,
            query,
            limit,
            from,
            to,
        } => {
            info!("Searching historical analyses: {}", query);
            let range = from.zip(to);
            commands::search(&config, subject.as_deref(), &query, limit, range).await?;
        }
        Commands::Migrate => {
            migrate::execute(&config).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_defaults() {
        let cli = Cli::try_parse_from(["newsdesk", "reflect", "--subject", "nvda"]).unwrap();
        match cli.command {
            Commands::Reflect {
                subject,
                period,
                days,
                no_backfill,
            } => {
                assert_eq!(subject.as_deref(), Some("nvda"));
                assert_eq!(period, "week");
                assert_eq!(days, None);
                assert!(!no_backfill);
            }
            _ => panic!("expected reflect"),
        }
    }

    #[test]
    fn test_global_as_of() {
        let cli = Cli::try_parse_from(["newsdesk", "search", "-q", "guidance", "--as-of", "2024-03-01"]).unwrap();
        assert_eq!(cli.as_of, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn test_reflect_days_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["newsdesk", "reflect", "--days", "0"]).is_err());
        assert!(Cli::try_parse_from(["newsdesk", "reflect", "--days", "1000000"]).is_err());
        assert!(Cli::try_parse_from(["newsdesk", "reflect", "--days", "3650"]).is_ok());
    }

    #[test]
    fn test_search_range_requires_both_bounds() {
        assert!(Cli::try_parse_from(["newsdesk", "search", "-q", "x", "--from", "2024-01-01"]).is_err());
    }
}
