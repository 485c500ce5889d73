mod cli_args;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cli_args::{Cli, Command, GenerateArgs, HarvestArgs, PostArgs, RunArgs, SearchArgs};
use reviewbot_core::{
    BrowserSession, ChatCompletionClient, HarvestStrategy, LaunchOptions, LoggingDestination,
    NEW_REVIEWS_FILE_NAME, ReviewAggregate, ReviewBot, ReviewSource, RunOptions, Settings,
    SnapshotWriter, StageLogger, TRUE_REVIEWS_FILE_NAME, Waits, WebDriverClient, YelpClient,
    YelpLayout, init_logging, load_aggregate, load_api_keys, load_login_credentials,
    load_settings, post_reviews,
};
use tracing::warn;

type Bot = ReviewBot<Box<dyn ReviewSource>, ChatCompletionClient>;
type Session = BrowserSession<WebDriverClient, YelpLayout>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = dispatch(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match init_logging(LoggingDestination::FileAndStderr) {
        Ok(Some(path)) => eprintln!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(err) => eprintln!("Warning: file logging unavailable: {err}"),
    }

    let loaded = load_settings(cli.global.config.as_deref()).context("loading settings")?;
    for warning in &loaded.warnings {
        eprintln!("Warning: {warning}");
    }
    let mut settings = loaded.settings;
    if let Some(dir) = cli.global.credentials_dir {
        settings.credentials_dir = dir;
    }
    if let Some(dir) = cli.global.output_dir {
        settings.output_dir = dir;
    }

    match cli.command {
        Command::Search(args) => search(&settings, args).await,
        Command::Harvest(args) => harvest(&settings, args).await,
        Command::Generate(args) => generate(&settings, args).await,
        Command::Post(args) => post(&settings, args).await,
        Command::Run(args) => run(&settings, args).await,
    }
}

fn snapshot_writer(settings: &Settings, store: bool) -> Option<SnapshotWriter> {
    store.then(|| SnapshotWriter::new(settings.output_dir.clone()))
}

fn input_path(settings: &Settings, input: Option<PathBuf>, default_name: &str) -> PathBuf {
    input.unwrap_or_else(|| settings.output_dir.join(default_name))
}

fn build_bot(settings: &Settings, strategy: HarvestStrategy, store: bool) -> Result<Bot> {
    let keys = load_api_keys(&settings.credentials_dir).context("loading API keys")?;
    Ok(ReviewBot::from_settings(
        settings,
        &keys,
        strategy,
        snapshot_writer(settings, store),
    )?)
}

fn build_session(settings: &Settings) -> Result<Session> {
    let login = load_login_credentials(&settings.credentials_dir)
        .context("loading login credentials")?;
    Ok(BrowserSession::new(
        WebDriverClient::new(settings.webdriver_url.clone()),
        YelpLayout,
        login,
        LaunchOptions::randomized(settings.headless),
        Waits::from_settings(settings),
    ))
}

async fn search(settings: &Settings, args: SearchArgs) -> Result<()> {
    let keys = load_api_keys(&settings.credentials_dir).context("loading API keys")?;
    let client = YelpClient::new(keys.yelp_api_key, settings.search_base_url.clone())?;
    let writer = snapshot_writer(settings, args.store);
    let restaurants = client
        .search_and_store(&args.location, writer.as_ref())
        .await?;
    for restaurant in &restaurants {
        println!("{}\t{}", restaurant.name, restaurant.url);
    }
    Ok(())
}

async fn harvest(settings: &Settings, args: HarvestArgs) -> Result<()> {
    let mut bot = build_bot(settings, args.strategy.into(), args.store)?;
    let restaurants = bot.search(&args.location, args.limit).await?;
    let aggregate = bot.harvest(&restaurants, args.pages).await?;
    print_summary("Harvested", &aggregate);
    Ok(())
}

async fn generate(settings: &Settings, args: GenerateArgs) -> Result<()> {
    let path = input_path(settings, args.input, TRUE_REVIEWS_FILE_NAME);
    let aggregate = load_aggregate(&path)
        .with_context(|| format!("reading harvested reviews from {}", path.display()))?;
    let mut bot = build_bot(settings, HarvestStrategy::default(), args.store)?;
    let generated = bot
        .generate(&aggregate, args.samples, args.per_restaurant)
        .await?;
    print_summary("Generated", &generated);
    Ok(())
}

async fn post(settings: &Settings, args: PostArgs) -> Result<()> {
    let path = input_path(settings, args.input, NEW_REVIEWS_FILE_NAME);
    let generated = load_aggregate(&path)
        .with_context(|| format!("reading generated reviews from {}", path.display()))?;
    let mut session = build_session(settings)?;
    let result = post_reviews(&mut StageLogger::default(), &mut session, &generated).await;
    close_session(session).await;
    println!("Posted {} reviews", result?);
    Ok(())
}

async fn run(settings: &Settings, args: RunArgs) -> Result<()> {
    let mut bot = build_bot(settings, args.strategy.into(), args.store)?;
    let options = RunOptions {
        location: args.location,
        page_count: args.pages,
        limit: args.limit,
        input_sample_limit: args.samples,
        per_restaurant: args.per_restaurant,
    };
    let outcome = bot.run(&options).await?;
    print_summary("Harvested", &outcome.true_reviews);
    print_summary("Generated", &outcome.new_reviews);

    if args.post {
        let mut session = build_session(settings)?;
        let result = bot.post(&mut session, &outcome.new_reviews).await;
        close_session(session).await;
        println!("Posted {} reviews", result?);
    }
    Ok(())
}

async fn close_session(session: Session) {
    if let Err(err) = session.close().await {
        warn!(error = %err, "Failed to close browser session");
    }
}

fn print_summary(label: &str, aggregate: &ReviewAggregate) {
    println!(
        "{label} {} reviews for {} restaurants",
        aggregate.review_count(),
        aggregate.len()
    );
    for (name, entry) in aggregate.iter() {
        println!("  {name}: {} ({})", entry.reviews.len(), entry.url);
    }
}
