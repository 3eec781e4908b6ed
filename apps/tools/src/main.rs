use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shared::domain::{ChapterId, ContentKind, CourseId, ModuleId, ReorderScope};
use storage::Storage;
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/courses.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateCourse {
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    CreateModule {
        course_id: i64,
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    CreateChapter {
        course_id: i64,
        title: String,
        #[arg(long)]
        module_id: Option<i64>,
        #[arg(long)]
        description: Option<String>,
    },
    CreateContent {
        chapter_id: i64,
        title: String,
        #[arg(long, value_parser = parse_kind, default_value = "text")]
        kind: ContentKind,
    },
    /// Prints the outline of one course in stored order.
    Show {
        course_id: i64,
    },
    /// Replaces the order of one scope, e.g. `reorder content 4 9 7 8`.
    Reorder {
        #[arg(value_enum)]
        scope: ScopeKind,
        parent_id: i64,
        #[arg(required = true, num_args = 1..)]
        ordered_item_ids: Vec<i64>,
    },
    /// Creates a small course with two modules, three chapters and content.
    SeedDemo,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeKind {
    Modules,
    Chapters,
    Content,
}

impl ScopeKind {
    fn scope(self, parent_id: i64) -> ReorderScope {
        match self {
            ScopeKind::Modules => ReorderScope::CourseModules(CourseId(parent_id)),
            ScopeKind::Chapters => ReorderScope::CourseChapters(CourseId(parent_id)),
            ScopeKind::Content => ReorderScope::ChapterContent(ChapterId(parent_id)),
        }
    }
}

fn parse_kind(raw: &str) -> Result<ContentKind, String> {
    ContentKind::parse(raw).ok_or_else(|| format!("unknown content kind '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateCourse { title, description } => {
            let course_id = storage
                .create_course(&title, description.as_deref())
                .await?;
            println!("created course_id={}", course_id.0);
        }
        Command::CreateModule {
            course_id,
            title,
            description,
        } => {
            let module_id = storage
                .create_module(CourseId(course_id), &title, description.as_deref())
                .await?;
            println!("created module_id={}", module_id.0);
        }
        Command::CreateChapter {
            course_id,
            title,
            module_id,
            description,
        } => {
            let chapter_id = storage
                .create_chapter(
                    CourseId(course_id),
                    module_id.map(ModuleId),
                    &title,
                    description.as_deref(),
                )
                .await?;
            println!("created chapter_id={}", chapter_id.0);
        }
        Command::CreateContent {
            chapter_id,
            title,
            kind,
        } => {
            let item_id = storage
                .create_content_item(ChapterId(chapter_id), kind, &title)
                .await?;
            println!("created content_item_id={}", item_id.0);
        }
        Command::Show { course_id } => show_outline(&storage, CourseId(course_id)).await?,
        Command::Reorder {
            scope,
            parent_id,
            ordered_item_ids,
        } => {
            let scope = scope.scope(parent_id);
            storage
                .replace_order(scope, &ordered_item_ids)
                .await
                .map_err(|err| anyhow!("reorder of {scope} rejected: {err}"))?;
            println!("reordered {scope}: {ordered_item_ids:?}");
        }
        Command::SeedDemo => {
            let course_id = seed_demo(&storage).await?;
            info!(course_id = course_id.0, "seeded demo course");
            show_outline(&storage, course_id).await?;
        }
    }

    Ok(())
}

async fn show_outline(storage: &Storage, course_id: CourseId) -> Result<()> {
    if !storage.course_exists(course_id).await? {
        return Err(anyhow!("course {course_id} not found"));
    }
    println!("course {course_id}");
    println!("  modules:");
    for module in storage.list_modules(course_id).await? {
        println!("    [{}] {}", module.module_id, module.title);
    }
    println!("  chapters:");
    for chapter in storage.list_chapters(course_id).await? {
        let module = chapter
            .module_id
            .map(|id| format!(" (module {id})"))
            .unwrap_or_default();
        println!("    [{}] {}{module}", chapter.chapter_id, chapter.title);
        for item in storage.list_content_items(chapter.chapter_id).await? {
            println!(
                "      - [{}] {} ({})",
                item.content_item_id,
                item.title,
                item.kind.as_str()
            );
        }
    }
    Ok(())
}

async fn seed_demo(storage: &Storage) -> Result<CourseId> {
    let course_id = storage
        .create_course("Introduction to Databases", Some("Demo course"))
        .await?;
    let basics = storage.create_module(course_id, "Basics", None).await?;
    let queries = storage.create_module(course_id, "Queries", None).await?;

    let chapters = [
        (basics, "What is a database", ContentKind::Video),
        (basics, "Tables and rows", ContentKind::Text),
        (queries, "Selecting data", ContentKind::Quiz),
    ];
    for (module_id, title, kind) in chapters {
        let chapter_id = storage
            .create_chapter(course_id, Some(module_id), title, None)
            .await?;
        storage
            .create_content_item(chapter_id, kind, &format!("{title}: overview"))
            .await?;
        storage
            .create_content_item(chapter_id, ContentKind::File, &format!("{title}: slides"))
            .await?;
    }
    Ok(course_id)
}
