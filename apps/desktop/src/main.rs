use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    config::{load_client_settings_from, validate_server_url},
    ordering::position_of,
    spawn_change_feed, CourseOutline, FeedEvent, HttpItemStore, OrderedItem, ReorderController,
};
use shared::domain::CourseId;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tokio_stream::{
    wrappers::{BroadcastStream, WatchStream},
    StreamExt,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

use commands::{parse_command, Action, Command, Target, HELP};
use render::{describe_notice, render_list, status_line, Labelled};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    course_id: i64,
    /// Overrides `server_url` from the settings file and environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long, default_value = "client.toml")]
    config: PathBuf,
    #[arg(long)]
    debounce_ms: Option<u64>,
    /// Skip the live change feed.
    #[arg(long)]
    no_feed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_client_settings_from(&args.config, |key| std::env::var(key).ok())?;
    if let Some(server_url) = &args.server_url {
        settings.server_url = validate_server_url(server_url)?;
    }
    if let Some(debounce_ms) = args.debounce_ms {
        settings.debounce_ms = debounce_ms;
    }

    let course_id = CourseId(args.course_id);
    let store = Arc::new(HttpItemStore::new(settings.server_url.clone()));
    let outline = CourseOutline::load(store, course_id, settings.timings())
        .await
        .with_context(|| format!("failed to load course {course_id} from {}", settings.server_url))?;

    spawn_status_printer(outline.modules());
    spawn_status_printer(outline.chapters());
    spawn_new_chapter_printers(Arc::clone(&outline));
    for chapter_id in outline.content_chapters().await {
        if let Some(controller) = outline.content(chapter_id).await {
            spawn_status_printer(&controller);
        }
    }

    if !args.no_feed {
        let (feed_tx, feed_rx) = broadcast::channel(64);
        match spawn_change_feed(Arc::clone(&outline), &settings.server_url, feed_tx).await {
            Ok(_) => spawn_feed_printer(feed_rx),
            Err(err) => warn!(%err, "live updates unavailable"),
        }
    }

    println!("{}", render_list(&outline.modules().view()));
    println!("{}", render_list(&outline.chapters().view()));
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => println!("{}", run_command(&outline, command).await),
            Err(err) => println!("error: {err}"),
        }
    }

    flush_on_exit(&outline).await;
    Ok(())
}

async fn run_command(outline: &CourseOutline, command: Command) -> String {
    match command {
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
        Command::Show(None) => {
            let mut sections = vec![
                render_list(&outline.modules().view()),
                render_list(&outline.chapters().view()),
            ];
            for chapter_id in outline.content_chapters().await {
                if let Some(controller) = outline.content(chapter_id).await {
                    sections.push(render_list(&controller.view()));
                }
            }
            sections.join("\n")
        }
        Command::Show(Some(target)) => match target {
            Target::Modules => render_list(&outline.modules().view()),
            Target::Chapters => render_list(&outline.chapters().view()),
            Target::Content(chapter_id) => match outline.content(chapter_id).await {
                Some(controller) => render_list(&controller.view()),
                None => format!("chapter {chapter_id} is not part of this course"),
            },
        },
        Command::Refresh(target) => {
            match outline.refresh_scope(target.scope(outline.course_id())).await {
                Ok(Some(outcome)) => format!("refresh: {outcome:?}"),
                Ok(None) => "nothing to refresh for that target".to_string(),
                Err(err) => format!("refresh failed: {err:#}"),
            }
        }
        Command::Act(target, action) => match target {
            Target::Modules => apply(outline.modules(), action).await,
            Target::Chapters => apply(outline.chapters(), action).await,
            Target::Content(chapter_id) => match outline.content(chapter_id).await {
                Some(controller) => apply(&controller, action).await,
                None => format!("chapter {chapter_id} is not part of this course"),
            },
        },
    }
}

async fn apply<T: Labelled>(controller: &Arc<ReorderController<T>>, action: Action) -> String {
    match action {
        Action::Move { item_id, position } => {
            let items = controller.view().items;
            let Some(from) = position_of(&items, item_id) else {
                return format!("item {item_id} is not in {}", controller.scope());
            };
            if controller
                .request_reorder(item_id, from, position.saturating_sub(1))
                .await
            {
                render_list(&controller.view())
            } else {
                "move ignored".to_string()
            }
        }
        Action::Drag { active_id, over_id } => {
            if controller.handle_drag_end(active_id, over_id).await {
                render_list(&controller.view())
            } else {
                "drop ignored".to_string()
            }
        }
        Action::Manual => {
            controller.enter_manual_reorder_mode().await;
            status_line(&controller.view())
        }
        Action::Save => {
            let status = controller.commit().await;
            format!("{}: save finished ({})", controller.scope(), status.as_str())
        }
        Action::Cancel => {
            if controller.cancel().await {
                render_list(&controller.view())
            } else {
                format!("{} is not in reorder mode", controller.scope())
            }
        }
        Action::Auto => {
            controller.exit_manual_reorder_mode().await;
            status_line(&controller.view())
        }
    }
}

/// Prints status transitions and notices of one controller as they happen.
fn spawn_status_printer<T: OrderedItem>(controller: &Arc<ReorderController<T>>) {
    let mut views = WatchStream::from_changes(controller.subscribe());
    let mut notices = BroadcastStream::new(controller.notices());
    tokio::spawn(async move {
        let mut last = None;
        loop {
            tokio::select! {
                Some(view) = views.next() => {
                    let key = (view.status, view.pending_changes, view.is_reorder_mode);
                    if last != Some(key) {
                        last = Some(key);
                        println!("{}", status_line(&view));
                    }
                }
                Some(notice) = notices.next() => {
                    if let Ok(notice) = notice {
                        println!("{}", describe_notice(&notice));
                    }
                }
                else => break,
            }
        }
    });
}

/// Attaches a status printer to every chapter the outline starts tracking later.
fn spawn_new_chapter_printers(outline: Arc<CourseOutline>) {
    let mut added = outline.content_added();
    tokio::spawn(async move {
        loop {
            match added.recv().await {
                Ok(chapter_id) => {
                    if let Some(controller) = outline.content(chapter_id).await {
                        spawn_status_printer(&controller);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed new chapter notifications");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_feed_printer(feed_rx: broadcast::Receiver<FeedEvent>) {
    let mut feed = BroadcastStream::new(feed_rx);
    tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            match event {
                Ok(FeedEvent::Error(err)) => println!("live updates: {err}"),
                Ok(FeedEvent::Closed) => println!("live updates: disconnected"),
                Ok(FeedEvent::Applied { .. }) | Err(_) => {}
            }
        }
    });
}

/// Saves whatever is still unsaved so quitting does not drop moves.
async fn flush_on_exit(outline: &CourseOutline) {
    if outline.modules().view().pending_changes {
        outline.modules().commit().await;
    }
    if outline.chapters().view().pending_changes {
        outline.chapters().commit().await;
    }
    for chapter_id in outline.content_chapters().await {
        if let Some(controller) = outline.content(chapter_id).await {
            if controller.view().pending_changes {
                controller.commit().await;
            }
        }
    }
}
