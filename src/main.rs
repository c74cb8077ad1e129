use anyhow::Result;
use clap::{Parser, Subcommand};
use ec2ctl::config::{load_aws_config, PollSettings};
use ec2ctl::ec2::{self, Action};
use ec2ctl::interactive::{print_table, Session};
use ec2ctl::select::SelectionPolicy;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ec2ctl")]
#[command(about = "List, start and stop EC2 instances", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// AWS region override (falls back to the SDK default chain)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Seconds between state polls
    #[arg(long, global = true, default_value = "10")]
    poll_interval: u64,

    /// Maximum number of poll rounds before giving up
    #[arg(long, global = true, default_value = "60")]
    max_polls: u32,

    /// How invalid selection tokens are handled
    #[arg(long, global = true, value_enum, default_value_t = SelectionPolicy::DropInvalid)]
    selection_policy: SelectionPolicy,

    /// Return as soon as the start/stop call is accepted, without polling
    #[arg(long, global = true)]
    no_wait: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List all instances
    List,

    /// Interactive menu: list, start and stop instances until you exit
    Menu,

    /// One-shot prompt: start, stop or stop all, then exit
    Once,

    /// Start instances by id
    Start {
        /// Instance ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Stop instances by id
    Stop {
        /// Instance ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init();
    }

    // One SDK config and one client for the whole process.
    let config = load_aws_config(cli.region.clone()).await;
    let client = aws_sdk_ec2::Client::new(&config);

    let settings = PollSettings {
        interval: Duration::from_secs(cli.poll_interval),
        max_attempts: cli.max_polls,
    };
    let wait = !cli.no_wait;

    let session = Session {
        client: &client,
        settings,
        policy: cli.selection_policy,
        wait,
    };

    match cli.command {
        Commands::List => {
            let records = ec2::fetch_instances(&client).await?;
            if records.is_empty() {
                println!("No EC2 instances found.");
            } else {
                print_table(&records);
            }
        }
        Commands::Menu => session.run_menu().await?,
        Commands::Once => session.run_once().await?,
        Commands::Start { ids } => {
            let outcome = dispatch_by_ids(&client, Action::Start, &ids, settings, wait).await?;
            std::process::exit(outcome.exit_code());
        }
        Commands::Stop { ids } => {
            let outcome = dispatch_by_ids(&client, Action::Stop, &ids, settings, wait).await?;
            std::process::exit(outcome.exit_code());
        }
    }

    Ok(())
}

async fn dispatch_by_ids(
    client: &aws_sdk_ec2::Client,
    action: Action,
    ids: &[String],
    settings: PollSettings,
    wait: bool,
) -> Result<ec2::WaitOutcome> {
    let records = ec2::fetch_instances_by_ids(client, ids).await?;
    anyhow::ensure!(!records.is_empty(), "no instances found for the given ids");
    ec2::apply_action(client, action, &records, settings, wait).await
}
