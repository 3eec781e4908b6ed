use shared::domain::{ChapterId, CourseId, ReorderScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Modules,
    Chapters,
    Content(ChapterId),
}

impl Target {
    pub fn scope(self, course_id: CourseId) -> ReorderScope {
        match self {
            Target::Modules => ReorderScope::CourseModules(course_id),
            Target::Chapters => ReorderScope::CourseChapters(course_id),
            Target::Content(chapter_id) => ReorderScope::ChapterContent(chapter_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `position` is 1-based.
    Move { item_id: i64, position: usize },
    Drag { active_id: i64, over_id: Option<i64> },
    Manual,
    Save,
    Cancel,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Show(Option<Target>),
    Refresh(Target),
    Act(Target, Action),
    Help,
    Quit,
}

pub const HELP: &str = "\
targets: modules | chapters | content <chapter_id>
  show [target]                    print the current order
  move <target> <item_id> <pos>    move an item to a 1-based position
  drag <target> <item_id> <over_id|none>
  manual <target>                  batch moves until save or cancel
  save <target>                    persist now (leaves manual mode)
  cancel <target>                  discard batched moves
  auto <target>                    leave manual mode, auto-save batched moves
  refresh <target>                 reload the order from the server
  help | quit";

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".into());
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "show" | "ls" => {
            if words.clone().next().is_none() {
                Command::Show(None)
            } else {
                Command::Show(Some(parse_target(&mut words)?))
            }
        }
        "refresh" => Command::Refresh(parse_target(&mut words)?),
        "move" | "mv" => {
            let target = parse_target(&mut words)?;
            let item_id = parse_id(words.next(), "item id")?;
            let position = parse_id(words.next(), "position")?;
            if position < 1 {
                return Err("positions start at 1".into());
            }
            Command::Act(
                target,
                Action::Move {
                    item_id,
                    position: position as usize,
                },
            )
        }
        "drag" => {
            let target = parse_target(&mut words)?;
            let active_id = parse_id(words.next(), "item id")?;
            let over_id = match words.next() {
                Some("none") | Some("-") => None,
                raw => Some(parse_id(raw, "target item id")?),
            };
            Command::Act(target, Action::Drag { active_id, over_id })
        }
        "manual" => Command::Act(parse_target(&mut words)?, Action::Manual),
        "save" => Command::Act(parse_target(&mut words)?, Action::Save),
        "cancel" => Command::Act(parse_target(&mut words)?, Action::Cancel),
        "auto" => Command::Act(parse_target(&mut words)?, Action::Auto),
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument '{extra}'"));
    }
    Ok(command)
}

fn parse_target<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<Target, String> {
    match words.next() {
        Some("modules") => Ok(Target::Modules),
        Some("chapters") => Ok(Target::Chapters),
        Some("content") => Ok(Target::Content(ChapterId(parse_id(
            words.next(),
            "chapter id",
        )?))),
        Some(other) => Err(format!("unknown target '{other}'")),
        None => Err("missing target (modules, chapters or content <chapter_id>)".into()),
    }
}

fn parse_id(raw: Option<&str>, what: &str) -> Result<i64, String> {
    let raw = raw.ok_or_else(|| format!("missing {what}"))?;
    raw.parse()
        .map_err(|_| format!("{what} must be a number, got '{raw}'"))
}
