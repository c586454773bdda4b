//! Boxoffice CLI
//!
//! Prices the cart of a fixture set and prints quota availability.
//!
//! Set `RUST_LOG` (e.g. `RUST_LOG=boxoffice=debug`) to see what the engines do.

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Instant,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use humanize_duration::{Truncate, prelude::DurationExt};
use jiff::Timestamp;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use boxoffice::{
    discounts::{apply_discounts, rule::available_rules},
    fixtures::Fixture,
    quotas::QuotaAvailability,
    report::{CartReport, write_quota_table},
};

#[derive(Debug, Parser)]
#[command(name = "boxoffice", about = "Quota availability and cart discounts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply automatic discounts to the cart of a fixture set
    Price(FixtureArgs),

    /// Print the availability of every quota
    Quotas(QuotasArgs),

    /// Load a fixture set and print what it contains
    Validate(FixtureArgs),
}

#[derive(Debug, Args)]
struct FixtureArgs {
    /// Fixture set name
    #[arg(short, long, default_value = "festival")]
    fixture: String,

    /// Directory holding the fixture kinds
    #[arg(long, default_value = "./fixtures")]
    fixtures_dir: PathBuf,
}

impl FixtureArgs {
    fn load(&self) -> Result<Fixture> {
        let fixture = Fixture::with_base_path(&self.fixtures_dir).load_set(&self.fixture)?;

        info!(set = %self.fixture, "fixture set loaded");

        Ok(fixture)
    }
}

#[derive(Debug, Args)]
struct QuotasArgs {
    #[command(flatten)]
    fixture: FixtureArgs,

    /// Point in time to evaluate at; the cart's time when omitted
    #[arg(long)]
    now: Option<Timestamp>,

    /// Count waiting list entries against the quotas
    #[arg(long)]
    count_waiting_list: bool,

    /// Report closed quotas as if they were open
    #[arg(long)]
    ignore_closed: bool,
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match cli.command {
        Commands::Price(args) => price(&args, &mut handle),
        Commands::Quotas(args) => quotas(&args, &mut handle),
        Commands::Validate(args) => validate(&args, &mut handle),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_writer(io::stderr),
        )
        .with(filter)
        .init();
}

fn price(args: &FixtureArgs, out: &mut impl Write) -> Result<()> {
    let fixture = args.load()?;
    let cart = fixture.cart()?;

    let start = Instant::now();

    let rules = available_rules(fixture.discounts(), &cart.channel, cart.now);
    let prices = apply_discounts(&cart.lines, rules)?;

    let elapsed = start.elapsed();

    let report = CartReport::new(
        fixture.currency()?,
        &cart.lines,
        &prices,
        fixture.catalog(),
        |key| fixture.discount_name(key),
    )?;

    report.write_to(&mut *out)?;

    writeln!(
        out,
        " {} ({}s)",
        elapsed.human(Truncate::Nano),
        elapsed.as_secs_f32()
    )?;

    Ok(())
}

fn quotas(args: &QuotasArgs, out: &mut impl Write) -> Result<()> {
    let fixture = args.fixture.load()?;

    let now = match args.now {
        Some(now) => now,
        None => fixture.cart().map_or_else(|_| Timestamp::now(), |cart| cart.now),
    };

    let start = Instant::now();

    let mut availability = QuotaAvailability::new(fixture.quotas())
        .with_count_waiting_list(args.count_waiting_list)
        .with_ignore_closed(args.ignore_closed);

    availability.queue_all();
    availability.compute(fixture.sales(), now);

    let elapsed = start.elapsed();

    writeln!(out, "\n Quotas at {now}")?;

    write_quota_table(&mut *out, fixture.quotas(), &availability)?;

    writeln!(
        out,
        " {} ({}s)",
        elapsed.human(Truncate::Nano),
        elapsed.as_secs_f32()
    )?;

    Ok(())
}

fn validate(args: &FixtureArgs, out: &mut impl Write) -> Result<()> {
    let fixture = args.load()?;
    let cart = fixture.cart()?;
    let sales = fixture.sales();

    writeln!(out, "Fixture set '{}' is valid", args.fixture)?;
    writeln!(out, "  items:        {}", fixture.catalog().items().count())?;
    writeln!(out, "  subevents:    {}", fixture.catalog().subevents().count())?;
    writeln!(out, "  quotas:       {}", fixture.quotas().len())?;
    writeln!(out, "  orders:       {}", sales.orders.len())?;
    writeln!(out, "  carts:        {}", sales.carts.len())?;
    writeln!(out, "  vouchers:     {}", sales.vouchers.len())?;
    writeln!(out, "  waiting list: {}", sales.waiting_list.len())?;
    writeln!(out, "  discounts:    {}", fixture.discounts().len())?;
    writeln!(out, "  cart lines:   {}", cart.lines.len())?;

    Ok(())
}
