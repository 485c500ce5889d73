use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use reviewbot_core::HarvestStrategy;

/// Search restaurants, harvest their reviews, generate new ones and post them.
#[derive(Parser, Debug, Clone)]
#[command(name = "reviewbot", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args, Default)]
pub struct GlobalArgs {
    /// Directory holding api_keys.json and credentials.json.
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub credentials_dir: Option<PathBuf>,

    /// Directory snapshots are written to.
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Settings file (defaults to config.toml in the config directory).
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Look up restaurants for a location.
    Search(SearchArgs),
    /// Collect reviews for the restaurants of a location.
    Harvest(HarvestArgs),
    /// Generate reviews from a stored harvest.
    Generate(GenerateArgs),
    /// Post every review of a stored synthetic aggregate.
    Post(PostArgs),
    /// Search, harvest and generate in one go.
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Free-form location, e.g. "Oakland, CA".
    #[arg(long)]
    pub location: String,

    /// Write list_of_restaurants.json to the output directory.
    #[arg(long, action = ArgAction::SetTrue)]
    pub store: bool,
}

#[derive(Debug, Clone, Args)]
pub struct HarvestArgs {
    #[arg(long)]
    pub location: String,

    /// Result pages per restaurant (scrape strategy only).
    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    #[arg(long, value_enum, default_value_t = StrategyArg::Api)]
    pub strategy: StrategyArg,

    /// Only harvest the first N restaurants.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    #[arg(long, action = ArgAction::SetTrue)]
    pub store: bool,
}

#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    /// Harvested aggregate (defaults to true_reviews.json in the output directory).
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// Example reviews included in each prompt (all when omitted).
    #[arg(long, value_name = "K")]
    pub samples: Option<usize>,

    #[arg(long, value_name = "N", default_value_t = 1)]
    pub per_restaurant: usize,

    #[arg(long, action = ArgAction::SetTrue)]
    pub store: bool,
}

#[derive(Debug, Clone, Args)]
pub struct PostArgs {
    /// Synthetic aggregate (defaults to new_reviews.json in the output directory).
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(long)]
    pub location: String,

    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    #[arg(long, value_enum, default_value_t = StrategyArg::Api)]
    pub strategy: StrategyArg,

    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    #[arg(long, value_name = "K")]
    pub samples: Option<usize>,

    #[arg(long, value_name = "N", default_value_t = 1)]
    pub per_restaurant: usize,

    #[arg(long, action = ArgAction::SetTrue)]
    pub store: bool,

    /// Also post the generated reviews through the browser.
    #[arg(long, action = ArgAction::SetTrue)]
    pub post: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Api,
    Scrape,
}

impl From<StrategyArg> for HarvestStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Api => HarvestStrategy::Api,
            StrategyArg::Scrape => HarvestStrategy::Scrape,
        }
    }
}
