use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{CollectionEvent, HttpRemoteStore, LiveCollection};
use shared::domain::{Bookmark, BookmarkId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "BOOKMARKS_SERVER_URL", default_value = "http://127.0.0.1:8443")]
    server_url: String,
    #[arg(long, env = "BOOKMARKS_USERNAME")]
    username: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the collection, newest first.
    List,
    Add {
        title: String,
        url: String,
    },
    Delete {
        bookmark_id: i64,
    },
    /// Keep the collection on screen and redraw it on every change until Ctrl-C.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let store = HttpRemoteStore::new(cli.server_url);
    let owner_id = store.login(&cli.username).await?;
    info!(owner_id = owner_id.0, username = %cli.username, "signed in");

    let live = LiveCollection::new(Arc::new(store));
    live.start(owner_id).await?;

    let outcome = run(&live, cli.command).await;
    live.stop().await;
    outcome
}

async fn run(live: &LiveCollection, command: Command) -> Result<()> {
    match command {
        Command::List => render(&live.snapshot().await),
        Command::Add { title, url } => {
            let bookmark = live.add_item(&title, &url).await?;
            println!("added bookmark_id={}", bookmark.id);
        }
        Command::Delete { bookmark_id } => {
            live.delete_item(BookmarkId(bookmark_id)).await?;
            println!("deleted bookmark_id={bookmark_id}");
        }
        Command::Watch => watch(live).await?,
    }
    Ok(())
}

async fn watch(live: &LiveCollection) -> Result<()> {
    let mut changes = live.subscribe_changes();
    render(&live.snapshot().await);

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(CollectionEvent::FeedLost { owner_id }) => {
                    warn!(owner_id = owner_id.0, "watch: change feed lost, reconnecting");
                    live.start(owner_id).await?;
                }
                Ok(_) => render(&live.snapshot().await),
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "watch: fell behind, redrawing");
                    render(&live.snapshot().await);
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }
    Ok(())
}

fn render(items: &[Bookmark]) {
    println!("-- {} bookmark(s) --", items.len());
    for bookmark in items {
        println!(
            "{:>6}  {}  <{}>  {}",
            bookmark.id.0,
            bookmark.title,
            bookmark.url,
            bookmark.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
