//! STUI CLI - command-line access to the hub client
//!
//! Describes the sop commands, replays the TCC status test stream, runs
//! scripted sequences and sends single commands.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use stui::descr::{CommandDescriptor, sop};
use stui::hub::storage::{config_path, load_config_or_default};
use stui::hub::{Credentials, HubConfig, HubContext, LogEntry, Severity};
use stui::script::RunnerState;
use stui::script::apogee_short_dark::{self, GangGuard};
use stui::testdata::{TestDispatcher, tcc_status};

#[derive(Parser)]
#[command(name = "stui")]
#[command(about = "Hub client for the observatory control UI", long_about = None)]
struct Cli {
    /// Settings directory holding config.json
    #[arg(short, long, default_value = ".stui")]
    config: PathBuf,

    /// Hub host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Hub port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Program name used to log in
    #[arg(long)]
    program: Option<String>,

    /// User name used to log in
    #[arg(short, long, default_value = "observer")]
    username: String,

    /// Program password
    #[arg(long, env = "STUI_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,

    /// Use a null connection instead of the network
    #[arg(long)]
    test: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sop commands, or describe one
    Describe {
        /// Command name
        name: Option<String>,
    },

    /// Replay the TCC status test stream and print the final keywords
    ReplayTcc {
        /// Delay between data sets in milliseconds (default: from config)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Run a built-in script
    RunScript {
        /// Script to run
        script: Script,

        /// Log the commands without sending them
        #[arg(long)]
        debug: bool,

        /// Refuse to run unless the gang connector is at the podium
        #[arg(long)]
        require_podium: bool,
    },

    /// Send one command and wait for it to finish
    Send {
        /// Target actor
        actor: String,

        /// Command text
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Script {
    /// Short APOGEE dark to check the binding
    ApogeeShortDark,
}

impl Cli {
    fn hub_config(&self) -> Result<HubConfig> {
        let mut config = load_config_or_default(&config_path(&self.config))?;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(program) = &self.program {
            config.program = program.clone();
        }
        config.test_mode |= self.test;
        Ok(config)
    }

    fn credentials(&self, config: &HubConfig) -> Credentials {
        Credentials::new(&config.program, &self.username, &self.password)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Describe { name } => {
            let set = sop::command_set()?;
            match name {
                Some(name) => print_command(set.get(name)?),
                None => {
                    for command in set.commands() {
                        println!("{} {}", command.actor, command.name);
                    }
                }
            }
        }

        Commands::ReplayTcc { interval_ms } => {
            let mut config = cli.hub_config()?;
            config.test_mode = true;
            let interval = Duration::from_millis(interval_ms.unwrap_or(config.replay_interval_ms));

            let ctx = HubContext::new(config);
            let test = TestDispatcher::new(&ctx, tcc_status::ACTOR);
            tcc_status::init(&test);
            tcc_status::run_test(&test, interval).await;

            for keyword in ctx.model().keywords(tcc_status::ACTOR) {
                if let Some(value) = ctx.model().get(tcc_status::ACTOR, &keyword) {
                    let values: Vec<String> = value.values.iter().map(ToString::to_string).collect();
                    println!("{keyword}={}", values.join(", "));
                }
            }
        }

        Commands::RunScript {
            script,
            debug,
            require_podium,
        } => {
            let ctx = connect(&cli).await?;
            let runner = match script {
                Script::ApogeeShortDark => {
                    let guard = if *require_podium {
                        GangGuard::require_podium()
                    } else {
                        GangGuard::report_only()
                    };
                    // A null connection never answers, so nothing would ever finish.
                    apogee_short_dark::runner(guard).debug(*debug || ctx.connection().is_null())
                }
            };
            let name = runner.name().to_string();

            let state = runner.run(&ctx).await;
            print_log(&ctx.log().entries());
            ctx.shutdown();
            match state {
                RunnerState::Completed => println!("{name}: completed"),
                RunnerState::Aborted(reason) => bail!("{name}: aborted ({reason})"),
                other => bail!("{name}: stopped in state {other:?}"),
            }
        }

        Commands::Send { actor, command } => {
            let ctx = connect(&cli).await?;
            let text = command.join(" ");
            let mut invocation = ctx.dispatcher().issue_command(actor, &text)?;
            println!("{} {actor} {text}", invocation.id());

            if ctx.connection().is_null() {
                println!("(test mode: command recorded, not sent)");
            } else {
                let replies = invocation.wait_ok().await;
                for reply in invocation.replies() {
                    println!("{reply}");
                }
                replies?;
            }
            ctx.shutdown();
        }
    }

    Ok(())
}

async fn connect(cli: &Cli) -> Result<HubContext> {
    let config = cli.hub_config()?;
    let credentials = cli.credentials(&config);
    let address = config.address();
    let ctx = HubContext::new(config);
    ctx.start(&credentials)
        .await
        .with_context(|| format!("Failed to connect to hub at {address}"))?;
    Ok(ctx)
}

fn print_command(command: &CommandDescriptor) {
    println!("{} {}", command.actor, command.name);
    println!("  stages: {}", command.effective_stages().join(" "));
    for param in &command.parameters {
        let mut line = format!("  {} ({})", param.name, param.kind);
        if let Some(default) = &param.default {
            line.push_str(&format!(" default={default}"));
        }
        if let Some(units) = &param.units {
            line.push_str(&format!(" [{units}]"));
        }
        if !param.stages.is_empty() {
            line.push_str(&format!(" stages: {}", param.stages.join(" ")));
        }
        if !param.help.is_empty() {
            line.push_str(&format!(" - {}", param.help));
        }
        println!("{line}");
    }
}

fn print_log(entries: &[LogEntry]) {
    for entry in entries {
        let marker = match entry.severity {
            Severity::Normal => ' ',
            Severity::Warning => 'w',
            Severity::Error => '!',
        };
        println!(
            "{} {marker} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.text
        );
    }
}
