//! CLI entry point for `imapscrub`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{error, info, warn};

use imapscrub::config::{config_file_path, Config, Settings};
use imapscrub::engine::Scrubber;
use imapscrub::mailbox::imap::ImapSession;
use imapscrub::mailbox::MailboxSession;

#[derive(Parser)]
#[command(
    name = "imapscrub",
    version,
    about = "Delete old messages and strip attachments from IMAP mailboxes"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML)
    #[arg(value_name = "CONFIG", env = "IMAPSCRUB_CONFIG")]
    config: Option<PathBuf>,

    /// Perform the rule actions instead of only listing matches
    #[arg(short, long)]
    yes: bool,

    /// List the selectable mailboxes on the server and exit
    #[arg(short, long)]
    mailboxes: bool,

    /// Print the validated configuration as JSON and exit
    #[arg(short, long)]
    print_config: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    let path = config_file_path(cli.config.clone())?;
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }
    let settings = Config::load(&path)?;

    let log_level = match cli.verbose {
        0 => settings.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, settings.log_file.as_deref())?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    if cli.mailboxes {
        return cmd_mailboxes(&settings);
    }

    cmd_run(&settings, cli.yes)
}

/// Configure logging: stderr plus an optional log file.
fn setup_logging(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::never(dir, name);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_appender),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "imapscrub", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

fn connect(settings: &Settings) -> anyhow::Result<ImapSession> {
    ImapSession::connect(&settings.account).with_context(|| {
        format!(
            "Cannot connect to {}:{}",
            settings.account.host, settings.account.port
        )
    })
}

/// Print the selectable mailboxes on the server.
fn cmd_mailboxes(settings: &Settings) -> anyhow::Result<()> {
    let mut session = connect(settings)?;
    let mailboxes = session.list_mailboxes()?;

    let mut stdout = std::io::stdout().lock();
    for mailbox in mailboxes.iter().filter(|m| m.selectable) {
        writeln!(stdout, "{}", mailbox.name)?;
    }

    if let Err(e) = session.logout() {
        warn!(error = %e, "Logout failed");
    }
    Ok(())
}

/// Apply every rule, or only list matches when `perform` is false.
fn cmd_run(settings: &Settings, perform: bool) -> anyhow::Result<()> {
    info!(
        account = %settings.account.name,
        rules = settings.rules.len(),
        dry_run = !perform,
        "Starting run"
    );

    let mut reader = connect(settings)?;
    let mut writer = connect(settings)?;

    let report = {
        let mut scrubber = Scrubber::new(&mut reader, &mut writer, settings, perform)?;
        let mut stdout = std::io::stdout().lock();
        scrubber.run(&mut stdout)
    };

    for session in [&mut reader, &mut writer] {
        if let Err(e) = session.logout() {
            warn!(error = %e, "Logout failed");
        }
    }

    for rule in &report.rules {
        info!(
            mailbox = %rule.mailbox,
            matched = rule.matched,
            removed = rule.removed,
            appended = rule.appended,
            retired = rule.retired,
            "Rule finished"
        );
    }
    if report.failed_rules() > 0 {
        error!(failed = report.failed_rules(), "Some rules did not complete");
    }
    if !perform {
        println!("Dry run: nothing was changed. Pass --yes to apply the rules.");
    }
    Ok(())
}
