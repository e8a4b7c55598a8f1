//! CLI entry point for `mimeview`.

use std::path::{Path, PathBuf};

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mimeview::assemble::{
    view_to_text, AssembledView, Assembly, AssemblerOptions, AssemblyMode, MessageSet,
    MessageSetAssembler,
};
use mimeview::config::{self, Config};
use mimeview::error::Uid;
use mimeview::i18n;
use mimeview::model::part::PartAddress;
use mimeview::render::fragment::PartRender;
use mimeview::render::{html, RenderMode};
use mimeview::store::mbox::MboxMailbox;
use mimeview::store::MailStore;

#[derive(Parser)]
#[command(name = "mimeview", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Treat the mailbox as sent mail (show recipients instead of senders)
    #[arg(long, global = true)]
    outgoing: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Language (en, es). Defaults to system locale.
    #[arg(long, value_name = "LANG", global = true)]
    lang: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the whole thread containing a message
    Thread {
        path: PathBuf,
        uid: Uid,
    },
    /// Show several messages together
    View {
        path: PathBuf,
        #[arg(required = true)]
        uids: Vec<Uid>,
    },
    /// Print the resolved part map of a message
    Parts {
        path: PathBuf,
        uid: Uid,
        /// Part to resolve (dotted address). Defaults to the message body.
        #[arg(short, long)]
        part: Option<PartAddress>,
        /// Ask for part descriptions instead of inline content
        #[arg(long)]
        info: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Detect language early from --lang arg or system env, before clap processes --help.
fn detect_lang_early() -> i18n::Lang {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--lang" {
            if let Some(lang) = args.get(i + 1).and_then(|c| i18n::Lang::from_code(c)) {
                return lang;
            }
        }
        if let Some(lang) = args[i]
            .strip_prefix("--lang=")
            .and_then(i18n::Lang::from_code)
        {
            return lang;
        }
    }
    i18n::detect_system_lang()
}

/// Build a localized clap Command using i18n strings.
fn build_localized_command() -> clap::Command {
    let mut cmd = Cli::command().about(i18n::app_about());

    let subcommands: Vec<clap::Command> = cmd
        .get_subcommands()
        .map(|sub| {
            let about = match sub.get_name() {
                "thread" => Some(i18n::help_cmd_thread()),
                "view" => Some(i18n::help_cmd_view()),
                "parts" => Some(i18n::help_cmd_parts()),
                "completions" => Some(i18n::help_cmd_completions()),
                "manpage" => Some(i18n::help_cmd_manpage()),
                _ => None,
            };
            match about {
                Some(about) => sub.clone().about(about),
                None => sub.clone(),
            }
        })
        .collect();

    for sub in subcommands {
        cmd = cmd.mut_subcommand(sub.get_name(), |_| sub.clone());
    }
    cmd
}

fn main() -> anyhow::Result<()> {
    // Detect language BEFORE clap parsing so --help is localized
    i18n::set_lang(detect_lang_early());

    let matches = build_localized_command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Thread { ref path, uid } => {
            cmd_assemble(&cli, &config, path, &[uid], AssemblyMode::SingleThread)
        }
        Commands::View { ref path, ref uids } => {
            cmd_assemble(&cli, &config, path, uids, AssemblyMode::MultiMessage)
        }
        Commands::Parts {
            ref path,
            uid,
            ref part,
            info,
        } => cmd_parts(&cli, &config, path, uid, part.as_ref(), info),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = config::log_file_path(config);
    let log_dir = log_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::cache_dir(config));
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_name = log_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mimeview.log".to_string());
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Open a mailbox behind a spinner.
fn open_mailbox(path: &Path, config: &Config, outgoing: bool) -> anyhow::Result<MboxMailbox> {
    if !path.exists() {
        anyhow::bail!("{}: {}", i18n::err_file_not_found(), path.display());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("{} {}", i18n::msg_scanning(), path.display()));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let mailbox = MboxMailbox::open_with_cache(path, config.display.max_cached_messages);
    spinner.finish_and_clear();
    Ok(mailbox?.outgoing(outgoing))
}

fn cmd_assemble(
    cli: &Cli,
    config: &Config,
    path: &Path,
    uids: &[Uid],
    mode: AssemblyMode,
) -> anyhow::Result<()> {
    let mailbox = open_mailbox(path, config, cli.outgoing)?;
    let resolver = config::resolver_from_config(config)?;
    let assembler = MessageSetAssembler::new(&mailbox, &resolver)
        .with_options(AssemblerOptions::from_config(config));

    let set = MessageSet::new(mailbox.name(), uids.iter().copied());
    match assembler.assemble(&set, mode)? {
        Assembly::View(view) => print_view(&view, cli.json),
        Assembly::Redirect { mailbox, notice } => {
            if cli.json {
                let redirect = Assembly::Redirect { mailbox, notice };
                println!("{}", serde_json::to_string_pretty(&redirect)?);
                Ok(())
            } else {
                anyhow::bail!("{notice} ({mailbox})")
            }
        }
    }
}

fn print_view(view: &AssembledView, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
    } else {
        print!("{}", view_to_text(view));
    }
    Ok(())
}

fn cmd_parts(
    cli: &Cli,
    config: &Config,
    path: &Path,
    uid: Uid,
    part: Option<&PartAddress>,
    info: bool,
) -> anyhow::Result<()> {
    let mailbox = open_mailbox(path, config, cli.outgoing)?;
    let resolver = config::resolver_from_config(config)?;
    let tree = mailbox.fetch_structure(mailbox.name(), uid)?;

    let address = match part {
        Some(address) => address.clone(),
        None => resolver
            .find_body(&tree)
            .ok_or_else(|| anyhow::anyhow!(i18n::no_inline_text()))?,
    };
    let mode = if info {
        RenderMode::INFO
    } else {
        RenderMode::INLINE
    };
    let result = resolver.resolve(&tree, &address, mode)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for (address, render) in result.iter() {
        let (content_type, size, renderer) = match tree.part(address) {
            Some(node) => (
                node.content_type.as_str(),
                format_size(node.size_hint, BINARY),
                resolver.renderer_for(node, mode).name(),
            ),
            None => ("?", String::new(), "?"),
        };
        println!("{address:<8} {content_type:<32} {size:>10}  {renderer}");
        match render {
            PartRender::Visible(fragment) => {
                for status in &fragment.status {
                    println!("         ! {}", html::html_to_text(&status.text.join(" ")));
                }
                for line in html::html_to_text(&fragment.body).lines() {
                    println!("         {line}");
                }
            }
            PartRender::Suppressed => println!("         ({})", i18n::suppressed()),
        }
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mimeview", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
