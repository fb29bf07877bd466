use std::fmt::Write as _;
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use strum::{Display, EnumString};
use time::format_description::BorrowedFormatItem;
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use super::Commands;
use crate::config::themes::ThemeMode;
use crate::config::AppConfig;
use crate::editor;
use crate::highlight::mark_matches;
use crate::journaling::{AutoSaveEvent, AutoSaveRuntime};
use crate::model::{FolderDraft, FolderSelector, FolderUpdate, Note, NoteDraft, NoteId};
use crate::search::SearchQuery;
use crate::storage::{LocalStore, PanelSpec, NOTES_LIST_PANEL, PANELS, SIDEBAR_PANEL};
use crate::store::{
    DropPosition, FolderSortBy, GroupBy, NoteSortBy, ReorderRequest, ViewMode, Workspace,
};
use crate::views::{self, FolderRow};

const TITLE_COLUMN: usize = 32;
const SNIPPET_CHARS: usize = 80;
const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]");

#[derive(Args, Debug, Clone)]
pub struct NoteArgs {
    #[command(subcommand)]
    pub command: NoteCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NoteCommand {
    /// Create a note; the body is read from stdin when --body is omitted
    New(NewNoteArgs),
    /// List the notes in the selected folder or smart view
    List(ListArgs),
    /// Print a note and make it the selected one
    Show(NoteRef),
    /// Replace a note's title or body
    Edit(EditArgs),
    /// Delete a note
    Delete(NoteRef),
    /// Toggle the pinned flag
    Pin(NoteRef),
    /// Toggle the favourite flag
    Favorite(NoteRef),
    /// File a note under a folder, or `none` to unfile it
    Move(MoveNoteArgs),
    /// Add or remove tags; lists them when no change is given
    Tag(TagArgs),
}

#[derive(Args, Debug, Clone)]
pub struct NoteRef {
    /// Note id or unique id prefix
    pub note: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct NewNoteArgs {
    /// Title for the note (derived from the body when omitted)
    #[arg()]
    pub title: Option<String>,
    /// Provide the note body inline
    #[arg(long)]
    pub body: Option<String>,
    /// Folder name or id; defaults to the selected folder
    #[arg(long)]
    pub folder: Option<String>,
    /// Pin the new note
    #[arg(long)]
    pub pin: bool,
    /// Tag to attach (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Smart view (all, recent, pinned, favorites, tagged, archive, trash) or folder
    #[arg(long)]
    pub folder: Option<String>,
    /// Only notes whose title, content or tags contain this text
    #[arg(long)]
    pub search: Option<String>,
    /// Only pinned notes
    #[arg(long)]
    pub pinned_only: bool,
    /// Sort key for this listing (date, title)
    #[arg(long)]
    pub sort: Option<NoteSortBy>,
    /// Group rows by period (none, date, week, month, year)
    #[arg(long)]
    pub group_by: Option<GroupBy>,
    /// Print at most this many notes
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    /// Note id or unique id prefix
    pub note: String,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New body; read from stdin when neither --title nor --body is given
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct MoveNoteArgs {
    /// Note id or unique id prefix
    pub note: String,
    /// Target folder name or id, or `none`
    pub folder: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TagArgs {
    /// Note id or unique id prefix
    pub note: String,
    /// Tag to add (repeatable)
    #[arg(long)]
    pub add: Vec<String>,
    /// Tag to remove (repeatable)
    #[arg(long)]
    pub remove: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FolderArgs {
    #[command(subcommand)]
    pub command: FolderCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FolderCommand {
    /// Create a folder
    New(NewFolderArgs),
    /// Rename a folder
    Rename(RenameFolderArgs),
    /// Delete a folder, its subfolders and the notes filed in them
    Delete(DeleteFolderArgs),
    /// Print the visible folder tree
    Tree(TreeArgs),
    /// Place a folder before or after a sibling, adopting its parent
    Move(MoveFolderArgs),
    /// Re-parent a folder; `none` makes it a root folder
    Nest(NestFolderArgs),
    /// Set a folder's manual sort position directly
    Order(OrderFolderArgs),
    /// Select a folder or smart view for note listings
    Select(SelectArgs),
    /// Expand or collapse a folder in the tree
    Toggle(FolderRef),
    /// Sibling order in the tree (name, modified, created, size, manual)
    Sort(FolderSortArgs),
    /// Default grouping for note listings (none, date, week, month, year)
    Group(FolderGroupArgs),
    /// Recently selected folders
    Recent,
}

#[derive(Args, Debug, Clone)]
pub struct FolderRef {
    /// Folder name or id prefix
    pub folder: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct NewFolderArgs {
    pub name: String,
    /// Parent folder name or id
    #[arg(long)]
    pub parent: Option<String>,
    #[arg(long)]
    pub icon: Option<String>,
    #[arg(long)]
    pub color: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RenameFolderArgs {
    pub folder: String,
    pub name: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteFolderArgs {
    pub folder: String,
    /// Leave the notes in place; they remain reachable from "all"
    #[arg(long)]
    pub keep_notes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MoveFolderArgs {
    pub folder: String,
    #[arg(long, conflicts_with = "after")]
    pub before: Option<String>,
    #[arg(long)]
    pub after: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TreeArgs {
    /// Only folders whose name contains this text, with their ancestors
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct OrderFolderArgs {
    pub folder: String,
    pub order: i64,
}

#[derive(Args, Debug, Clone)]
pub struct NestFolderArgs {
    pub folder: String,
    /// New parent folder, or `none`
    pub parent: String,
}

#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    /// Smart view name or folder
    pub selector: String,
}

#[derive(Args, Debug, Clone)]
pub struct FolderSortArgs {
    pub by: FolderSortBy,
}

#[derive(Args, Debug, Clone)]
pub struct FolderGroupArgs {
    pub by: GroupBy,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Search text
    #[arg()]
    pub query: Vec<String>,
    /// Search every note instead of the selected folder or view
    #[arg(long)]
    pub everywhere: bool,
    /// Limit the number of results printed
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub command: Option<PrefsCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PrefsCommand {
    /// Print every preference
    Show,
    /// Note list layout (grid, list)
    View { mode: ViewMode },
    /// Note sort key (date, title)
    Sort { by: NoteSortBy },
    /// Collapse or expand the sidebar
    Sidebar,
    /// Toggle the pinned-only filter
    PinnedOnly,
    /// Colour theme (light, dark, system)
    Theme { mode: ThemeMode },
    /// Show or set a panel width in pixels
    Panel { panel: PanelName, width: Option<i64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum PanelName {
    Sidebar,
    NotesList,
}

impl PanelName {
    fn spec(self) -> &'static PanelSpec {
        match self {
            PanelName::Sidebar => &SIDEBAR_PANEL,
            PanelName::NotesList => &NOTES_LIST_PANEL,
        }
    }
}

/// Everything a command needs: configuration, the key-value store and the
/// workspace loaded from it.
pub struct CliContext {
    config: Arc<AppConfig>,
    store: LocalStore,
    pub workspace: Workspace,
}

impl CliContext {
    pub fn open(config: Arc<AppConfig>, store: LocalStore) -> Result<Self> {
        let workspace = match store.load_workspace()? {
            Some(workspace) => workspace,
            None => {
                let mut workspace = if config.seed_on_first_run {
                    Workspace::seeded()
                } else {
                    Workspace::new()
                };
                workspace.ui.set_view(config.default_view);
                workspace.ui.set_sort_by(config.default_sort);
                workspace.ui.set_theme(config.default_theme);
                store.save_workspace(&workspace)?;
                workspace
            }
        };
        let mut ctx = Self {
            config,
            store,
            workspace,
        };
        if let Some(theme) = ctx.store.load_theme()? {
            ctx.workspace.ui.set_theme(theme);
        }
        Ok(ctx)
    }

    fn save(&self) -> Result<()> {
        self.store
            .save_workspace(&self.workspace)
            .context("saving workspace")
    }

    fn note_id(&self, needle: &str) -> Result<NoteId> {
        Ok(self.workspace.notes.resolve(needle)?)
    }

    fn note(&self, id: NoteId) -> Result<&Note> {
        self.workspace
            .notes
            .get(id)
            .with_context(|| format!("note {id} disappeared"))
    }
}

pub fn dispatch(ctx: &mut CliContext, command: Commands) -> Result<String> {
    let now = OffsetDateTime::now_utc();
    match command {
        Commands::Overview => Ok(overview(ctx, now)),
        Commands::Note(args) => handle_note_command(ctx, args.command, now),
        Commands::Folder(args) => handle_folder_command(ctx, args.command),
        Commands::Search(args) => run_search(ctx, &args, now),
        Commands::Prefs(args) => handle_prefs_command(ctx, args.command.unwrap_or(PrefsCommand::Show)),
    }
}

fn overview(ctx: &CliContext, now: OffsetDateTime) -> String {
    let ws = &ctx.workspace;
    let counts = views::quick_access_counts(ws, now);
    let mut out = String::new();
    for (label, count) in [
        ("All notes", counts.all),
        ("Recent", counts.recent),
        ("Pinned", counts.pinned),
        ("Favorites", counts.favorites),
        ("Tagged", counts.tagged),
    ] {
        let _ = writeln!(&mut out, "{label:<12}{count}");
    }
    let _ = writeln!(&mut out, "{:<12}{}", "Selected", selection_label(ws));
    let recent = views::recent_folders(ws);
    if !recent.is_empty() {
        let names: Vec<&str> = recent.iter().map(|folder| folder.name.as_str()).collect();
        let _ = writeln!(&mut out, "{:<12}{}", "Recent", names.join(", "));
    }
    let orphaned = ws.orphaned_notes().len();
    if orphaned > 0 {
        let _ = writeln!(&mut out, "{orphaned} note(s) point at deleted folders");
    }
    out
}

fn handle_note_command(ctx: &mut CliContext, command: NoteCommand, now: OffsetDateTime) -> Result<String> {
    match command {
        NoteCommand::New(mut args) => {
            if args.body.is_none() {
                args.body = read_stdin()?;
            }
            new_note(ctx, args)
        }
        NoteCommand::List(args) => list_notes(ctx, &args, now),
        NoteCommand::Show(args) => show_note(ctx, &args.note),
        NoteCommand::Edit(mut args) => {
            if args.title.is_none() && args.body.is_none() {
                args.body = read_stdin()?;
            }
            edit_note(ctx, args)
        }
        NoteCommand::Delete(args) => {
            let id = ctx.note_id(&args.note)?;
            let title = ctx.note(id)?.display_title().to_string();
            ctx.workspace.notes.delete_note(id);
            ctx.save()?;
            Ok(format!("Deleted note {} \"{title}\"\n", id.short()))
        }
        NoteCommand::Pin(args) => {
            let id = ctx.note_id(&args.note)?;
            let pinned = ctx.workspace.notes.toggle_pin_note(id).unwrap_or(false);
            ctx.save()?;
            let verb = if pinned { "Pinned" } else { "Unpinned" };
            Ok(format!("{verb} note {}\n", id.short()))
        }
        NoteCommand::Favorite(args) => {
            let id = ctx.note_id(&args.note)?;
            let favorited = ctx.workspace.notes.toggle_favorite_note(id).unwrap_or(false);
            ctx.save()?;
            let verb = if favorited { "Added" } else { "Removed" };
            Ok(format!("{verb} note {} {} favorites\n", id.short(), if favorited { "to" } else { "from" }))
        }
        NoteCommand::Move(args) => move_note(ctx, &args),
        NoteCommand::Tag(args) => tag_note(ctx, &args),
    }
}

fn new_note(ctx: &mut CliContext, args: NewNoteArgs) -> Result<String> {
    let body = args.body.unwrap_or_default();
    let mut title = args.title.unwrap_or_default().trim().to_string();
    if title.is_empty() && ctx.config.auto_save.derive_title {
        title = editor::detect_title(&body).unwrap_or_default();
    }
    let folder_id = match args.folder.as_deref() {
        Some(needle) => Some(ctx.workspace.folders.resolve(needle)?),
        None => ctx
            .workspace
            .folders
            .effective_selection()
            .and_then(|selector| selector.target_folder()),
    };

    let draft = NoteDraft::new(title, body)
        .in_folder(folder_id)
        .pinned(args.pin)
        .with_tags(args.tags);
    let id = ctx.workspace.notes.add_note(draft);
    ctx.save()?;

    let note = ctx.note(id)?;
    let mut out = format!("Created note {} \"{}\"", id.short(), note.display_title());
    if let Some(folder) = folder_id.and_then(|fid| ctx.workspace.folders.get(fid)) {
        let _ = write!(&mut out, " in {}", folder.name);
    }
    if args.pin {
        out.push_str(" (pinned)");
    }
    out.push('\n');
    Ok(out)
}

fn list_notes(ctx: &CliContext, args: &ListArgs, now: OffsetDateTime) -> Result<String> {
    let mut view = ctx.workspace.clone();
    if let Some(raw) = args.folder.as_deref() {
        let selector = resolve_selector(&view, raw)?;
        view.folders.select_folder(Some(selector));
    }
    if let Some(query) = args.search.as_deref() {
        view.notes.set_search_query(query);
    }
    if args.pinned_only && !view.ui.show_pinned_only {
        view.ui.toggle_show_pinned_only();
    }
    if let Some(sort) = args.sort {
        view.ui.set_sort_by(sort);
    }
    let group_by = args.group_by.unwrap_or_else(|| view.folders.group_by());

    let mut notes = views::visible_notes(&view, now);
    if let Some(limit) = args.limit {
        notes.truncate(limit);
    }
    let query = view.notes.search_query().to_string();
    Ok(render_note_list(&view, &notes, group_by, &query))
}

fn render_note_list(ws: &Workspace, notes: &[&Note], group_by: GroupBy, query: &str) -> String {
    if notes.is_empty() {
        return format!("No notes in {}.\n", selection_label(ws));
    }
    let mut out = String::new();
    for group in views::group_notes(notes, group_by) {
        if group_by != GroupBy::None {
            let _ = writeln!(&mut out, "{}", group.label);
        }
        for note in group.notes {
            let _ = writeln!(&mut out, "{}", format_note_line(ws, note, query));
        }
    }
    out
}

fn format_note_line(ws: &Workspace, note: &Note, query: &str) -> String {
    let pin = if note.is_pinned { '*' } else { ' ' };
    let fav = if note.is_favorited { '+' } else { ' ' };
    let title = fit_width(note.display_title(), TITLE_COLUMN);
    let title = mark_matches(&title, query, "[", "]");
    let folder = note
        .folder_id
        .and_then(|id| ws.folders.get(id))
        .map(|folder| folder.name.as_str())
        .unwrap_or("-");
    let mut line = format!(
        "{}  {pin}{fav} {title}  {}  {folder}",
        note.id.short(),
        format_timestamp(note.updated_at)
    );
    if !note.tags.is_empty() {
        let _ = write!(&mut line, "  {}", format_tags(&note.tags));
    }
    line.trim_end().to_string()
}

fn show_note(ctx: &mut CliContext, needle: &str) -> Result<String> {
    let id = ctx.note_id(needle)?;
    ctx.workspace.notes.select_note(Some(id));
    ctx.save()?;

    let note = ctx.note(id)?;
    let folder = note
        .folder_id
        .and_then(|fid| ctx.workspace.folders.get(fid))
        .map(|folder| folder.name.as_str())
        .unwrap_or("-");
    let mut flags = Vec::new();
    if note.is_pinned {
        flags.push("pinned");
    }
    if note.is_favorited {
        flags.push("favorite");
    }

    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", note.display_title());
    let _ = writeln!(&mut out, "    id       {}", note.id);
    let _ = writeln!(&mut out, "    folder   {folder}");
    let _ = writeln!(&mut out, "    created  {}", format_timestamp(note.created_at));
    let _ = writeln!(&mut out, "    updated  {}", format_timestamp(note.updated_at));
    if !flags.is_empty() {
        let _ = writeln!(&mut out, "    flags    {}", flags.join(", "));
    }
    if !note.tags.is_empty() {
        let _ = writeln!(&mut out, "    tags     {}", format_tags(&note.tags));
    }
    let _ = writeln!(
        &mut out,
        "    words    {} ({} chars)",
        editor::word_count(&note.content),
        editor::char_count(&note.content)
    );
    let text = editor::plain_text(&note.content);
    if !text.is_empty() {
        out.push('\n');
        out.push_str(&text);
        out.push('\n');
    }
    Ok(out)
}

/// Routes the edit through the auto-save runtime so an unchanged buffer is
/// not written and a blank title can be derived from the body.
fn edit_note(ctx: &mut CliContext, args: EditArgs) -> Result<String> {
    let id = ctx.note_id(&args.note)?;
    let (title, content) = {
        let note = ctx.note(id)?;
        (note.title.clone(), note.content.clone())
    };
    let mut runtime = AutoSaveRuntime::new(&ctx.config.auto_save);
    runtime.start_session(id, &title, &content);
    runtime.update_buffer(
        id,
        args.title.as_deref().unwrap_or(&title),
        args.body.as_deref().unwrap_or(&content),
    );

    match runtime.end_session(&mut ctx.workspace.notes) {
        None => Ok(format!("No changes to note {}\n", id.short())),
        Some(AutoSaveEvent::Saved { .. }) => {
            ctx.save()?;
            let note = ctx.note(id)?;
            Ok(format!("Saved note {} \"{}\"\n", id.short(), note.display_title()))
        }
        Some(AutoSaveEvent::Error { message, .. }) => {
            bail!("saving note {}: {message}", id.short())
        }
    }
}

fn move_note(ctx: &mut CliContext, args: &MoveNoteArgs) -> Result<String> {
    let id = ctx.note_id(&args.note)?;
    let target = if args.folder.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(ctx.workspace.folders.resolve(&args.folder)?)
    };
    ctx.workspace.notes.move_note(id, target);
    ctx.save()?;
    let destination = target
        .and_then(|fid| ctx.workspace.folders.get(fid))
        .map(|folder| folder.name.clone())
        .unwrap_or_else(|| "no folder".to_string());
    Ok(format!("Moved note {} to {destination}\n", id.short()))
}

fn tag_note(ctx: &mut CliContext, args: &TagArgs) -> Result<String> {
    let id = ctx.note_id(&args.note)?;
    let mut out = String::new();
    for tag in &args.add {
        match ctx.workspace.notes.add_tag(id, tag) {
            Some(true) => {
                let _ = writeln!(&mut out, "Added tag '{}'", tag.trim());
            }
            _ => {
                let _ = writeln!(&mut out, "Tag '{}' already present or empty", tag.trim());
            }
        }
    }
    for tag in &args.remove {
        match ctx.workspace.notes.remove_tag(id, tag) {
            Some(true) => {
                let _ = writeln!(&mut out, "Removed tag '{}'", tag.trim());
            }
            _ => {
                let _ = writeln!(&mut out, "Tag '{}' not on note", tag.trim());
            }
        }
    }
    if !args.add.is_empty() || !args.remove.is_empty() {
        ctx.save()?;
    }

    let note = ctx.note(id)?;
    let _ = writeln!(
        &mut out,
        "Tags for note {} ({}): {}",
        id.short(),
        note.display_title(),
        if note.tags.is_empty() {
            "(no tags)".to_string()
        } else {
            format_tags(&note.tags)
        }
    );
    Ok(out)
}

fn handle_folder_command(ctx: &mut CliContext, command: FolderCommand) -> Result<String> {
    let output = match command {
        FolderCommand::New(args) => {
            let parent_id = match args.parent.as_deref() {
                Some(needle) => Some(ctx.workspace.folders.resolve(needle)?),
                None => None,
            };
            let name = args.name.trim();
            if name.is_empty() {
                bail!("folder name cannot be empty");
            }
            let draft = FolderDraft {
                icon: args.icon,
                color: args.color,
                ..FolderDraft::new(name, parent_id)
            };
            let id = ctx.workspace.folders.add_folder(draft);
            format!("Created folder {name} ({})\n", id.short())
        }
        FolderCommand::Rename(args) => {
            let id = ctx.workspace.folders.resolve(&args.folder)?;
            let name = args.name.trim();
            if name.is_empty() {
                bail!("folder name cannot be empty");
            }
            ctx.workspace.folders.rename_folder(id, name);
            format!("Renamed folder to {name}\n")
        }
        FolderCommand::Delete(args) => delete_folder(ctx, &args)?,
        FolderCommand::Tree(args) => {
            let mut view = ctx.workspace.clone();
            if let Some(filter) = args.filter {
                view.folders.set_folder_search_query(filter);
            }
            return Ok(render_tree(&view, &views::folder_tree(&view)));
        }
        FolderCommand::Order(args) => {
            let id = ctx.workspace.folders.resolve(&args.folder)?;
            if !ctx.workspace.folders.set_folder_order(id, args.order) {
                bail!("folder {} no longer exists", args.folder);
            }
            format!("Set order of folder {} to {}\n", args.folder, args.order)
        }
        FolderCommand::Move(args) => {
            let (target, position) = match (args.before, args.after) {
                (Some(target), None) => (target, DropPosition::Before),
                (None, Some(target)) => (target, DropPosition::After),
                _ => bail!("pass exactly one of --before or --after"),
            };
            let request = ReorderRequest {
                dragged_id: ctx.workspace.folders.resolve(&args.folder)?,
                target_id: ctx.workspace.folders.resolve(&target)?,
                position,
            };
            if !ctx.workspace.folders.reorder_folders(request) {
                bail!("cannot place a folder {position} itself or inside its own subtree");
            }
            format!("Moved folder {position} {target}\n")
        }
        FolderCommand::Nest(args) => {
            let id = ctx.workspace.folders.resolve(&args.folder)?;
            let parent = if args.parent.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(ctx.workspace.folders.resolve(&args.parent)?)
            };
            if parent.is_some_and(|parent| ctx.workspace.folders.would_cycle(id, parent)) {
                bail!("cannot nest a folder inside itself or its own subtree");
            }
            let update = FolderUpdate {
                parent_id: Some(parent),
                ..FolderUpdate::default()
            };
            ctx.workspace.folders.update_folder(id, update);
            format!("Nested {} under {}\n", args.folder, parent.map(|_| args.parent.as_str()).unwrap_or("the root"))
        }
        FolderCommand::Select(args) => {
            let selector = resolve_selector(&ctx.workspace, &args.selector)?;
            ctx.workspace.folders.select_folder(Some(selector));
            format!("Selected {}\n", selection_label(&ctx.workspace))
        }
        FolderCommand::Toggle(args) => {
            let id = ctx.workspace.folders.resolve(&args.folder)?;
            let expanded = ctx.workspace.folders.toggle_folder_expanded(id);
            format!("{} {}\n", if expanded { "Expanded" } else { "Collapsed" }, args.folder)
        }
        FolderCommand::Sort(args) => {
            ctx.workspace.folders.set_sort_by(args.by);
            format!("Folders sorted by {}\n", args.by)
        }
        FolderCommand::Group(args) => {
            ctx.workspace.folders.set_group_by(args.by);
            format!("Notes grouped by {}\n", args.by)
        }
        FolderCommand::Recent => {
            let recent = views::recent_folders(&ctx.workspace);
            if recent.is_empty() {
                return Ok("No recently selected folders.\n".to_string());
            }
            let mut out = String::new();
            for folder in recent {
                let _ = writeln!(&mut out, "{}  {}", folder.id.short(), folder.name);
            }
            return Ok(out);
        }
    };
    ctx.save()?;
    Ok(output)
}

fn delete_folder(ctx: &mut CliContext, args: &DeleteFolderArgs) -> Result<String> {
    let id = ctx.workspace.folders.resolve(&args.folder)?;
    if args.keep_notes {
        let removed = ctx.workspace.folders.delete_folder(id);
        let orphaned = ctx.workspace.orphaned_notes().len();
        return Ok(format!(
            "Deleted {} folder(s); {orphaned} note(s) kept without a folder\n",
            removed.len()
        ));
    }
    let outcome = ctx.workspace.delete_folder_cascade(id);
    Ok(format!(
        "Deleted {} folder(s) and {} note(s)\n",
        outcome.folders.len(),
        outcome.notes.len()
    ))
}

fn render_tree(ws: &Workspace, rows: &[FolderRow<'_>]) -> String {
    if rows.is_empty() {
        return "No folders.\n".to_string();
    }
    let selected = ws.folders.effective_selection().and_then(|s| s.folder_id());
    let mut out = String::new();
    for row in rows {
        let marker = match (row.has_children, row.expanded) {
            (false, _) => "•",
            (true, true) => "▾",
            (true, false) => "▸",
        };
        let icon = row
            .folder
            .icon
            .as_deref()
            .map(|icon| format!("{icon} "))
            .unwrap_or_default();
        let _ = write!(
            &mut out,
            "{}{marker} {icon}{} ({})",
            "  ".repeat(row.depth),
            row.folder.name,
            row.note_count
        );
        if selected == Some(row.folder.id) {
            out.push_str(" *");
        }
        out.push('\n');
    }
    out
}

fn run_search(ctx: &CliContext, args: &SearchArgs, now: OffsetDateTime) -> Result<String> {
    let raw_query = args.query.join(" ");
    let query = SearchQuery::new(raw_query.trim());
    if !query.is_active() {
        bail!("search query cannot be empty");
    }

    let mut view = ctx.workspace.clone();
    if args.everywhere {
        view.folders.select_folder(None);
    }
    view.notes.set_search_query(query.raw());
    let mut results = views::visible_notes(&view, now);
    results.truncate(args.limit);
    Ok(format_search_results(&view, &query, &results))
}

fn format_search_results(ws: &Workspace, query: &SearchQuery, notes: &[&Note]) -> String {
    if notes.is_empty() {
        return format!("No matches in {}.\n", selection_label(ws));
    }
    let mut out = String::new();
    for note in notes {
        let mut headline = format!(
            "{}  {}",
            note.id.short(),
            mark_matches(note.display_title(), query.raw(), "[", "]")
        );
        if note.is_pinned {
            headline.push_str("  [PINNED]");
        }
        let _ = writeln!(&mut out, "{headline}");
        if let Some(kind) = query.match_kind(note) {
            let _ = writeln!(&mut out, "    matched {}", kind.label());
        }
        let _ = writeln!(&mut out, "    updated {}", format_timestamp(note.updated_at));
        if !note.tags.is_empty() {
            let _ = writeln!(&mut out, "    tags    {}", format_tags(&note.tags));
        }
        let snippet = editor::preview(&note.content, SNIPPET_CHARS);
        if !snippet.is_empty() {
            let _ = writeln!(&mut out, "    {}", mark_matches(&snippet, query.raw(), "[", "]"));
        }
        out.push('\n');
    }
    out
}

fn handle_prefs_command(ctx: &mut CliContext, command: PrefsCommand) -> Result<String> {
    let output = match command {
        PrefsCommand::Show => return render_prefs(ctx),
        PrefsCommand::View { mode } => {
            ctx.workspace.ui.set_view(mode);
            format!("View set to {mode}\n")
        }
        PrefsCommand::Sort { by } => {
            ctx.workspace.ui.set_sort_by(by);
            format!("Notes sorted by {by}\n")
        }
        PrefsCommand::Sidebar => {
            let collapsed = ctx.workspace.ui.toggle_sidebar();
            format!("Sidebar {}\n", if collapsed { "collapsed" } else { "expanded" })
        }
        PrefsCommand::PinnedOnly => {
            let on = ctx.workspace.ui.toggle_show_pinned_only();
            format!("Pinned-only filter {}\n", if on { "on" } else { "off" })
        }
        PrefsCommand::Theme { mode } => {
            ctx.workspace.ui.set_theme(mode);
            ctx.store.save_theme(mode)?;
            format!("Theme set to {mode}\n")
        }
        PrefsCommand::Panel { panel, width } => {
            let spec = panel.spec();
            let Some(width) = width else {
                return Ok(format!("{panel} width {}\n", ctx.store.load_panel_width(spec)?));
            };
            let stored = ctx.store.save_panel_width(spec, width)?;
            return Ok(format!("{panel} width {stored}\n"));
        }
    };
    ctx.save()?;
    Ok(output)
}

fn render_prefs(ctx: &CliContext) -> Result<String> {
    let ui = &ctx.workspace.ui;
    let folders = &ctx.workspace.folders;
    let mut out = String::new();
    let _ = writeln!(&mut out, "{:<18}{}", "view", ui.view);
    let _ = writeln!(&mut out, "{:<18}{}", "sort", ui.sort_by);
    let _ = writeln!(&mut out, "{:<18}{}", "sidebar", if ui.sidebar_collapsed { "collapsed" } else { "expanded" });
    let _ = writeln!(&mut out, "{:<18}{}", "pinned-only", ui.show_pinned_only);
    let _ = writeln!(&mut out, "{:<18}{}", "theme", ui.theme);
    let _ = writeln!(&mut out, "{:<18}{}", "folder sort", folders.sort_by());
    let _ = writeln!(&mut out, "{:<18}{}", "group by", folders.group_by());
    for panel in &PANELS {
        let _ = writeln!(&mut out, "{:<18}{}", panel.key, ctx.store.load_panel_width(panel)?);
    }
    let _ = writeln!(&mut out, "{:<18}{}ms", "auto-save", ctx.config.auto_save.debounce_ms);
    Ok(out)
}

/// Smart-view names first, then folder names and id prefixes.
fn resolve_selector(ws: &Workspace, raw: &str) -> Result<FolderSelector> {
    match raw.parse::<FolderSelector>() {
        Ok(selector) => Ok(selector),
        Err(_) => Ok(FolderSelector::Specific(ws.folders.resolve(raw)?)),
    }
}

fn selection_label(ws: &Workspace) -> String {
    match ws.folders.effective_selection() {
        None => "all".to_string(),
        Some(FolderSelector::Specific(id)) => ws
            .folders
            .get(id)
            .map(|folder| folder.name.clone())
            .unwrap_or_else(|| id.short()),
        Some(selector) => selector.to_string(),
    }
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

/// Truncates or pads to `width` terminal columns.
fn fit_width(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    let total = UnicodeWidthStr::width(text);
    let budget = if total > width { width.saturating_sub(1) } else { width };
    for grapheme in text.graphemes(true) {
        let w = UnicodeWidthStr::width(grapheme);
        if used + w > budget {
            break;
        }
        out.push_str(grapheme);
        used += w;
    }
    if total > width {
        out.push('…');
        used += 1;
    }
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));
    out
}

fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(DATE_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPaths;
    use crate::storage;
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    fn setup_context() -> TestResult<(TempDir, CliContext)> {
        let temp = TempDir::new().context("creating temp dir")?;
        let paths = ConfigPaths::under(temp.path());
        let config = AppConfig {
            seed_on_first_run: false,
            ..AppConfig::default()
        };
        let store = storage::init(&paths, &config.storage)?;
        let ctx = CliContext::open(Arc::new(config), store)?;
        Ok((temp, ctx))
    }

    fn reopen(ctx: &CliContext) -> TestResult<CliContext> {
        CliContext::open(ctx.config.clone(), ctx.store.clone())
    }

    fn folder(ctx: &mut CliContext, name: &str, parent: Option<&str>) -> TestResult {
        handle_folder_command(
            ctx,
            FolderCommand::New(NewFolderArgs {
                name: name.into(),
                parent: parent.map(str::to_string),
                ..NewFolderArgs::default()
            }),
        )?;
        Ok(())
    }

    fn note(ctx: &mut CliContext, title: &str, body: &str, folder: Option<&str>) -> TestResult<NoteId> {
        new_note(
            ctx,
            NewNoteArgs {
                title: Some(title.into()),
                body: Some(body.into()),
                folder: folder.map(str::to_string),
                ..NewNoteArgs::default()
            },
        )?;
        ctx.workspace
            .notes
            .selected_note_id()
            .context("new note is selected")
    }

    #[test]
    fn unreadable_snapshot_is_kept_when_reopening() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        note(&mut ctx, "precious", "do not lose", None)?;
        let saved = ctx
            .store
            .get_item(storage::WORKSPACE_KEY)?
            .context("workspace stored")?;
        assert!(saved.contains("\"isPinned\":false"));
        let corrupt = saved.replacen("\"isPinned\":false", "\"isPinned\":\"no\"", 1);
        ctx.store.set_item(storage::WORKSPACE_KEY, &corrupt)?;

        let reopened = reopen(&ctx)?;
        assert!(reopened.workspace.notes.is_empty());
        let backups = reopened.store.corrupt_workspace_keys()?;
        assert_eq!(backups.len(), 1);
        assert_eq!(reopened.store.get_item(&backups[0])?, Some(corrupt));
        Ok(())
    }

    #[test]
    fn new_note_lands_in_selected_folder_and_persists() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        folder(&mut ctx, "Work", None)?;
        handle_folder_command(&mut ctx, FolderCommand::Select(SelectArgs { selector: "work".into() }))?;
        let output = new_note(
            &mut ctx,
            NewNoteArgs {
                body: Some("<p>Quarterly plan</p><p>details</p>".into()),
                pin: true,
                ..NewNoteArgs::default()
            },
        )?;
        assert!(output.contains("\"Quarterly plan\" in Work (pinned)"));

        let reopened = reopen(&ctx)?;
        let notes = reopened.workspace.notes.notes();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].is_pinned);
        assert_eq!(
            notes[0].folder_id,
            reopened.workspace.folders.resolve("Work").ok()
        );
        Ok(())
    }

    #[test]
    fn list_scopes_to_folder_and_marks_flags() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        folder(&mut ctx, "Work", None)?;
        note(&mut ctx, "Standup", "daily", Some("Work"))?;
        let pinned = note(&mut ctx, "Roadmap", "q3", Some("Work"))?;
        ctx.workspace.notes.toggle_pin_note(pinned);
        note(&mut ctx, "Groceries", "milk", None)?;

        let output = list_notes(
            &ctx,
            &ListArgs {
                folder: Some("Work".into()),
                ..ListArgs::default()
            },
            OffsetDateTime::now_utc(),
        )?;
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("*  Roadmap"));
        assert!(lines[1].contains("Standup"));
        assert!(!output.contains("Groceries"));
        assert_eq!(ctx.workspace.folders.selected(), None);
        Ok(())
    }

    #[test]
    fn deleting_a_folder_cascades_unless_notes_are_kept() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        folder(&mut ctx, "Work", None)?;
        folder(&mut ctx, "Projects", Some("Work"))?;
        folder(&mut ctx, "Personal", None)?;
        note(&mut ctx, "deep", "", Some("Projects"))?;
        let kept = note(&mut ctx, "diary", "", Some("Personal"))?;

        let output = delete_folder(
            &mut ctx,
            &DeleteFolderArgs {
                folder: "Work".into(),
                keep_notes: false,
            },
        )?;
        assert_eq!(output, "Deleted 2 folder(s) and 1 note(s)\n");

        let output = delete_folder(
            &mut ctx,
            &DeleteFolderArgs {
                folder: "Personal".into(),
                keep_notes: true,
            },
        )?;
        assert_eq!(output, "Deleted 1 folder(s); 1 note(s) kept without a folder\n");
        assert!(ctx.workspace.notes.get(kept).is_some());
        Ok(())
    }

    #[test]
    fn tree_renders_nesting_counts_and_selection() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        folder(&mut ctx, "Work", None)?;
        folder(&mut ctx, "Projects", Some("Work"))?;
        folder(&mut ctx, "Personal", None)?;
        note(&mut ctx, "plan", "", Some("Work"))?;
        note(&mut ctx, "launch", "", Some("Projects"))?;
        note(&mut ctx, "diary", "", Some("Personal"))?;
        handle_folder_command(&mut ctx, FolderCommand::Select(SelectArgs { selector: "Projects".into() }))?;

        let tree = handle_folder_command(&mut ctx, FolderCommand::Tree(TreeArgs::default()))?;
        insta::assert_snapshot!(tree.trim_end(), @r###"
▾ Work (2)
  • Projects (1) *
• Personal (1)
"###);

        handle_folder_command(&mut ctx, FolderCommand::Toggle(FolderRef { folder: "Work".into() }))?;
        let tree = handle_folder_command(&mut ctx, FolderCommand::Tree(TreeArgs::default()))?;
        assert_eq!(tree, "▸ Work (2)\n• Personal (1)\n");
        Ok(())
    }

    #[test]
    fn tree_filter_and_manual_order() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        folder(&mut ctx, "Work", None)?;
        folder(&mut ctx, "Projects", Some("Work"))?;
        folder(&mut ctx, "Personal", None)?;

        let filtered = handle_folder_command(
            &mut ctx,
            FolderCommand::Tree(TreeArgs { filter: Some("proj".into()) }),
        )?;
        assert_eq!(filtered, "▾ Work (0)\n  • Projects (0)\n");

        handle_folder_command(
            &mut ctx,
            FolderCommand::Order(OrderFolderArgs { folder: "Work".into(), order: 9 }),
        )?;
        let tree = handle_folder_command(&mut ctx, FolderCommand::Tree(TreeArgs::default()))?;
        assert!(tree.starts_with("• Personal (0)\n▾ Work (0)\n"));
        Ok(())
    }

    #[test]
    fn folder_move_and_nest_refuse_cycles() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        folder(&mut ctx, "A", None)?;
        folder(&mut ctx, "B", Some("A"))?;
        let err = handle_folder_command(
            &mut ctx,
            FolderCommand::Nest(NestFolderArgs {
                folder: "A".into(),
                parent: "B".into(),
            }),
        );
        assert!(err.is_err());

        folder(&mut ctx, "C", None)?;
        handle_folder_command(
            &mut ctx,
            FolderCommand::Move(MoveFolderArgs {
                folder: "C".into(),
                before: Some("A".into()),
                after: None,
            }),
        )?;
        let roots: Vec<String> = views::folder_tree(&ctx.workspace)
            .iter()
            .filter(|row| row.depth == 0)
            .map(|row| row.folder.name.clone())
            .collect();
        assert_eq!(roots, ["C", "A"]);
        Ok(())
    }

    #[test]
    fn edit_goes_through_autosave_and_skips_unchanged_text() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        let id = note(&mut ctx, "Draft", "<p>one</p>", None)?;
        let prefix = id.short();

        let output = edit_note(
            &mut ctx,
            EditArgs {
                note: prefix.clone(),
                body: Some("<p>two</p>".into()),
                ..EditArgs::default()
            },
        )?;
        assert!(output.starts_with("Saved note"));
        let reopened = reopen(&ctx)?;
        assert_eq!(
            reopened.workspace.notes.get(id).map(|n| n.content.as_str()),
            Some("<p>two</p>")
        );

        let output = edit_note(
            &mut ctx,
            EditArgs {
                note: prefix,
                body: Some("<p>two</p>".into()),
                ..EditArgs::default()
            },
        )?;
        assert!(output.starts_with("No changes"));
        Ok(())
    }

    #[test]
    fn search_highlights_and_respects_the_selection() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        folder(&mut ctx, "Home", None)?;
        note(&mut ctx, "Groceries", "milk and bread", Some("Home"))?;
        note(&mut ctx, "Work log", "buy groceries later", None)?;
        handle_folder_command(&mut ctx, FolderCommand::Select(SelectArgs { selector: "Home".into() }))?;

        let now = OffsetDateTime::now_utc();
        let scoped = run_search(
            &ctx,
            &SearchArgs {
                query: vec!["groceries".into()],
                limit: 10,
                ..SearchArgs::default()
            },
            now,
        )?;
        assert!(scoped.contains("[Groceries]"));
        assert!(scoped.contains("matched title"));
        assert!(!scoped.contains("Work log"));

        let everywhere = run_search(
            &ctx,
            &SearchArgs {
                query: vec!["groceries".into()],
                everywhere: true,
                limit: 10,
            },
            now,
        )?;
        let first = everywhere.find("[Groceries]").unwrap_or(usize::MAX);
        let second = everywhere.find("Work log").unwrap_or(0);
        assert!(first < second);
        assert!(everywhere.contains("buy [groceries] later"));

        assert!(run_search(&ctx, &SearchArgs::default(), now).is_err());
        Ok(())
    }

    #[test]
    fn prefs_persist_theme_and_clamp_panels() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        handle_prefs_command(&mut ctx, PrefsCommand::Theme { mode: ThemeMode::Dark })?;
        let output = handle_prefs_command(
            &mut ctx,
            PrefsCommand::Panel {
                panel: PanelName::Sidebar,
                width: Some(1000),
            },
        )?;
        assert_eq!(output, "sidebar width 400\n");
        handle_prefs_command(&mut ctx, PrefsCommand::PinnedOnly)?;

        let reopened = reopen(&ctx)?;
        assert_eq!(reopened.workspace.ui.theme, ThemeMode::Dark);
        assert!(reopened.workspace.ui.show_pinned_only);
        let shown = render_prefs(&reopened)?;
        assert!(shown.contains("sidebar-width     400"));
        assert!(shown.contains("notes-list-width  350"));
        Ok(())
    }

    #[test]
    fn selectors_accept_smart_views_and_folder_names() -> TestResult {
        let (_temp, mut ctx) = setup_context()?;
        folder(&mut ctx, "Work", None)?;
        let work = ctx.workspace.folders.resolve("work")?;
        assert_eq!(resolve_selector(&ctx.workspace, "starred")?, FolderSelector::Favorites);
        assert_eq!(resolve_selector(&ctx.workspace, "WORK")?, FolderSelector::Specific(work));
        assert!(resolve_selector(&ctx.workspace, "nowhere").is_err());
        Ok(())
    }

    #[test]
    fn fit_width_pads_and_truncates_by_columns() {
        assert_eq!(fit_width("abc", 5), "abc  ");
        assert_eq!(fit_width("abcdef", 4), "abc…");
        assert_eq!(UnicodeWidthStr::width(fit_width("日本語テキスト", 6).as_str()), 6);
    }
}
