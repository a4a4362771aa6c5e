use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use flexrev::api::CachedApiClient;
use flexrev::commands::{self, Command};
use flexrev::config::Config;
use flexrev::logging;

#[derive(Parser, Debug)]
#[command(name = "flexrev")]
#[command(about = "Moderate Flex Living guest reviews from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/flexrev/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Gateway base URL, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Keep session and moderation record in memory only
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
  /// Run commands interactively against one shared cache
  Shell,
  #[command(flatten)]
  Once(Command),
}

/// One line typed into the shell.
#[derive(Parser, Debug)]
#[command(name = "", no_binary_name = true)]
struct ShellLine {
  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Logging is best-effort; the CLI works without it
  let _guard = match logging::init() {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("warning: {}", e);
      None
    }
  };

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.url = url;
  }
  if args.ephemeral {
    config.storage.ephemeral = true;
  }

  let client = CachedApiClient::new(&config)?;

  match args.command {
    Mode::Once(command) => commands::execute(&client, command).await,
    Mode::Shell => shell(&client).await,
  }
}

async fn shell(client: &CachedApiClient) -> Result<()> {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut stdout = tokio::io::stdout();

  println!("flexrev shell. Type 'help' for commands, 'quit' to leave.");
  loop {
    let prompt = match client.current_user() {
      Some(user) => format!("{}> ", user.email),
      None => "> ".to_string(),
    };
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;

    let Some(line) = lines.next_line().await? else {
      break;
    };
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
      [] => continue,
      ["quit" | "exit" | "q"] => break,
      _ => {}
    }

    match ShellLine::try_parse_from(words.iter().copied()) {
      Ok(parsed) => {
        if let Err(e) = commands::execute(client, parsed.command).await {
          eprintln!("error: {}", e);
        }
      }
      // Covers `help` and `--help` too
      Err(e) => {
        let _ = e.print();
      }
    }
  }

  Ok(())
}
