use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use tgrelay_core::{
    config::Config,
    forward::{ForwardRequest, RunReport},
    platform::{ChatPlatform, ThrottleConfig, ThrottledPlatform},
    replacements::ReplacementStore,
    service::ForwardingService,
};
use tgrelay_telegram::TelegramPlatform;

mod cli;

use cli::{Cli, Command, ReplaceCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tgrelay_core::logging::init("tgrelay")?;

    let cfg = Arc::new(Config::load()?);

    match cli.command {
        Command::Replace(cmd) => replace(&cfg, cmd),
        Command::Chats => {
            let service = connect(&cfg).await?;
            let chats = service.list_chats().await?;
            if chats.is_empty() {
                println!("No chats seen yet. Post a message where the bot is a member, then retry.");
            }
            print!("{}", tgrelay_core::directory::format_listing(&chats));
            println!("List of chats written to {}", cfg.chats_file.display());
            Ok(())
        }
        Command::Forward {
            source,
            destination,
            keywords,
        } => {
            let service = connect(&cfg).await?;
            let req = ForwardRequest {
                source: service.resolve(source).await?,
                destination: service.resolve(destination).await?,
                keywords: cli::keywords(&keywords),
            };
            let report = service.start_forwarding(req, cancel_on_ctrl_c()).await?;
            print_report(&report);
            Ok(())
        }
        Command::Resume { keywords } => {
            let service = connect(&cfg).await?;
            match service
                .resume_last_forwarding(cli::keywords(&keywords), cancel_on_ctrl_c())
                .await?
            {
                Some(report) => print_report(&report),
                None => println!("No previous forwarding session found."),
            }
            Ok(())
        }
    }
}

async fn connect(cfg: &Arc<Config>) -> anyhow::Result<ForwardingService> {
    let raw: Arc<dyn ChatPlatform> = Arc::new(
        TelegramPlatform::connect(cfg)
            .await
            .context("telegram connection failed")?,
    );
    // Pace outbound sends; the adapter still retries once on RetryAfter.
    let platform: Arc<dyn ChatPlatform> = Arc::new(ThrottledPlatform::new(
        raw,
        ThrottleConfig::from(cfg.as_ref()),
    ));
    Ok(ForwardingService::new(cfg.clone(), platform))
}

fn replace(cfg: &Config, cmd: ReplaceCommand) -> anyhow::Result<()> {
    let mut store = ReplacementStore::open(&cfg.replacements_file)?;
    match cmd {
        ReplaceCommand::Add {
            pattern,
            replacement,
        } => {
            store.add(&pattern, &replacement)?;
            println!("Replacement added: '{pattern}' -> '{replacement}'");
        }
        ReplaceCommand::Remove { pattern } => match store.remove(&pattern)? {
            Some(rule) => println!("Replacement removed: '{}'", rule.pattern),
            None => println!("No replacement found for '{pattern}'"),
        },
        ReplaceCommand::List => {
            if store.list().is_empty() {
                println!("No replacements defined.");
            }
            for (i, rule) in store.list().iter().enumerate() {
                println!("{}. '{}' -> '{}'", i + 1, rule.pattern, rule.replacement);
            }
        }
    }
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping forwarding");
            child.cancel();
        }
    });
    token
}

fn print_report(report: &RunReport) {
    println!(
        "Forwarding stopped. Started {}, {} polls, {} forwarded, {} suppressed (no text {}, filtered {}, emptied {}), last message {}",
        report.started_at.to_rfc3339(),
        report.polls,
        report.forwarded,
        report.suppressed(),
        report.no_text,
        report.filtered_out,
        report.emptied,
        report.last_seen
    );
}
