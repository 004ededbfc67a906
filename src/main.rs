use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod classify;
mod cli;
mod config;
mod errors;
mod logbook;
mod metadata;
mod render;
mod resolve;
mod storage;
mod web;

use config::Config;
use metadata::{Extractor, FetchOptions, ForwardedHeaders};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_tracing();

    let mut config = Config::load()?;
    log::debug!("using base path {}", config.base_path().display());

    match args.command {
        cli::Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            web::start_daemon(config)
        }

        cli::Command::Meta {
            url,
            html,
            user_agent,
        } => {
            let extractor = Extractor::http(FetchOptions::from(&config))?;
            let forwarded = ForwardedHeaders {
                user_agent,
                ..Default::default()
            };

            let meta = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(extractor.extract(&url, &forwarded))
                .with_context(|| format!("couldn't fetch {url}"))?;

            if html {
                println!("{}", render::render_preview(&meta, &url));
            } else {
                println!("{}", serde_json::to_string_pretty(&meta)?);
            }
            Ok(())
        }

        cli::Command::Logs {} => {
            let store = storage::BackendLocal::new(config.logs_dir())?;
            let logbook = logbook::Logbook::new(Arc::new(store), false);
            println!("{}", serde_json::to_string_pretty(&logbook.entries())?);
            Ok(())
        }
    }
}
