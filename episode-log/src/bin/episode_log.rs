use anyhow::Result;
use clap::{Parser, Subcommand};
use episode_log::{
    open_episode_log, DurableStore, EpisodeLog, EpisodeLogConfig, Record, SamplingMode,
    SqliteStore,
};
use log::info;
use std::io::{self, Write};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file in YAML
    #[arg(short, long)]
    config: Option<String>,

    /// Path of the database file, overrides the configuration
    #[arg(short, long)]
    db: Option<String>,

    /// Name of the table, overrides the configuration
    #[arg(short, long)]
    table: Option<String>,

    /// The number of records loaded by a refresh, overrides the configuration
    #[arg(short, long)]
    window: Option<usize>,

    /// Log every SQL statement, at debug level
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Appends a record
    Append {
        /// Game ID
        #[arg(long, default_value_t = 0)]
        game_id: u64,

        /// Name of the machine which produced the record
        #[arg(long, default_value = "")]
        machine: String,

        /// Sequence number in the game
        #[arg(long, default_value_t = 0)]
        seq: i32,

        /// Priority
        #[arg(long, default_value_t = 0.0)]
        priority: f32,

        /// Reward
        #[arg(long, default_value_t = 0.0)]
        reward: f32,

        /// Timestamp in milliseconds, the current time if omitted
        #[arg(long)]
        timestamp: Option<u64>,

        /// Payload of the record
        #[arg(default_value = "")]
        content: String,
    },

    /// Prints the number of records in the table
    Count,

    /// Prints the most recent records, newest first
    Recent {
        #[arg(short, default_value_t = 10)]
        n: usize,
    },

    /// Prints records drawn uniformly from the recent window
    Sample {
        #[arg(short, default_value_t = 10)]
        n: usize,

        /// Seed of the sampler
        #[arg(long)]
        seed: Option<u64>,

        /// Keep sampling from the buffer of the first draw
        #[arg(long, default_value_t = false)]
        pinned: bool,
    },

    /// Refreshes the cache and prints its stats
    Stats,
}

fn config(args: &Args) -> Result<EpisodeLogConfig> {
    let mut config = match &args.config {
        Some(path) => EpisodeLogConfig::load(path)?,
        None => EpisodeLogConfig::default(),
    };
    if let Some(db) = &args.db {
        config = config.path(db.as_str());
    }
    if let Some(table) = &args.table {
        config = config.table_name(table.as_str());
    }
    if let Some(window) = args.window {
        config = config.window(window);
    }
    if args.verbose {
        config = config.verbose(true);
    }
    Ok(config)
}

fn print_records<'a>(
    out: &mut impl Write,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<()> {
    for record in records {
        writeln!(out, "{}", serde_json::to_string(record)?)?;
    }
    Ok(())
}

fn sample(
    log: &EpisodeLog<SqliteStore>,
    n: usize,
    seed: Option<u64>,
    pinned: bool,
) -> Result<Vec<Record>> {
    let mode = if pinned {
        SamplingMode::Pinned
    } else {
        log.config().sampling_mode
    };
    let mut sampler = match seed {
        Some(seed) => log.sampler_with_seed(mode, seed),
        None => log.sampler_with_mode(mode),
    };
    sampler.sample_batch(n)
}

fn run(args: &Args, out: &mut impl Write) -> Result<()> {
    let log = open_episode_log(config(args)?)?;

    match &args.command {
        Command::Append {
            game_id,
            machine,
            seq,
            priority,
            reward,
            timestamp,
            content,
        } => {
            let record = Record::new(*game_id, machine.as_str(), content.as_str())
                .with_timestamp(timestamp.unwrap_or(0))
                .with_seq(*seq)
                .with_priority(*priority)
                .with_reward(*reward);
            let ts = log.append(record)?;
            info!("Appended record {}", ts);
            writeln!(out, "{}", ts)?;
        }
        Command::Count => {
            writeln!(out, "{}", log.store().len()?)?;
        }
        Command::Recent { n } => {
            print_records(out, &log.store().load_recent(*n)?)?;
        }
        Command::Sample { n, seed, pinned } => {
            print_records(out, &sample(&log, *n, *seed, *pinned)?)?;
        }
        Command::Stats => {
            log.refresh()?;
            write!(out, "{}", log.stats().fmt())?;
        }
    }
    Ok(())
}

fn log_filter(args: &Args) -> &'static str {
    if args.verbose {
        "debug"
    } else {
        "info"
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&args)))
        .init();
    let stdout = io::stdout();
    run(&args, &mut stdout.lock())
}
