use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use marknest_settings::{JsonSettingsStore, RecentRootsStore, DEFAULT_RECENT_ROOTS};
use marknest_sync::{
    ActionOutcome, DeleteMode, DocumentSession, EngineConfig, EnginePorts, LinkFixup,
    LocalFileSystem, LogNotifier, SaveSettle, WatchConfig, WorkspaceEngine, WorkspaceWatcher,
};
use marknest_tree::Entry;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CONFIG_DIR_ENV: &str = "MARKNEST_CONFIG_DIR";
const RECENT_FILE: &str = "recent.json";

#[derive(Parser)]
#[command(
    name = "marknest-cli",
    about = "Manage Marknest note workspaces from the command line",
    author,
    version
)]
struct Cli {
    /// 指定工作區根目錄；預設為目前目錄。 / Workspace root (defaults to current directory).
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,

    /// 最近開啟清單的存放位置。 / Directory holding the recent workspaces list.
    #[arg(long, global = true, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// 顯示除錯訊息。 / Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出工作區樹狀結構。 / Print the workspace tree.
    Tree(TreeArgs),
    /// 建立資料夾。 / Create a folder, numbering the name on collision.
    Mkdir(MkdirArgs),
    /// 建立空白筆記。 / Create an empty note.
    NewNote(NewNoteArgs),
    /// 重新命名檔案或資料夾。 / Rename a file or folder in place.
    Rename(RenameArgs),
    /// 搬移到另一個資料夾。 / Move an entry into another folder.
    Mv(TransferArgs),
    /// 複製到另一個資料夾。 / Copy an entry into another folder.
    Cp(TransferArgs),
    /// 刪除項目（預設丟入垃圾桶）。 / Delete entries (to the trash unless --permanent).
    Rm(RmArgs),
    /// 匯入工作區外的檔案或資料夾。 / Copy outside files or folders into the workspace.
    Import(ImportArgs),
    /// 釘選資料夾。 / Pin a folder.
    Pin(DirArgs),
    /// 取消釘選資料夾。 / Unpin a folder.
    Unpin(DirArgs),
    /// 列出已釘選的資料夾。 / List pinned folders.
    Pins,
    /// 列出最近開啟的工作區。 / List recently opened workspaces.
    Recent,
    /// 監看外部變更並重新同步。 / Watch for outside changes and resync.
    Watch(WatchArgs),
}

#[derive(Args)]
struct TreeArgs {
    /// 以 JSON 輸出。 / Emit the entry forest as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MkdirArgs {
    /// 父資料夾。 / Parent folder.
    #[arg(value_name = "PARENT")]
    parent: PathBuf,
    /// 資料夾名稱。 / Folder name.
    name: String,
}

#[derive(Args)]
struct NewNoteArgs {
    /// 父資料夾。 / Parent folder.
    #[arg(value_name = "PARENT")]
    parent: PathBuf,
    /// 筆記名稱；預設為 Untitled。 / Note name; defaults to `Untitled`.
    name: Option<String>,
}

#[derive(Args)]
struct RenameArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,
    /// 新名稱。 / New name; markdown notes keep `.md` when it is omitted.
    name: String,
}

#[derive(Args)]
struct TransferArgs {
    #[arg(value_name = "SOURCE")]
    source: PathBuf,
    #[arg(value_name = "DEST_DIR")]
    destination: PathBuf,
}

#[derive(Args)]
struct RmArgs {
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,
    /// 直接刪除而不丟入垃圾桶。 / Delete permanently instead of using the trash.
    #[arg(long)]
    permanent: bool,
}

#[derive(Args)]
struct ImportArgs {
    /// 工作區外的來源（相對於目前目錄）。 / Outside sources, relative to the current directory.
    #[arg(value_name = "SOURCE", required = true)]
    sources: Vec<PathBuf>,
    /// 目的資料夾。 / Destination folder inside the workspace.
    #[arg(long, value_name = "DIR")]
    into: PathBuf,
}

#[derive(Args)]
struct DirArgs {
    #[arg(value_name = "DIR")]
    dir: PathBuf,
}

#[derive(Args)]
struct WatchArgs {
    /// 第一次重新同步後結束。 / Exit after the first resync.
    #[arg(long)]
    once: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    runtime.block_on(execute(cli))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn execute(cli: Cli) -> Result<()> {
    let Cli {
        workspace,
        config_dir,
        command,
        ..
    } = cli;
    let config_dir = resolve_config_dir(config_dir)?;
    let delete_mode = match &command {
        Commands::Rm(args) if args.permanent => DeleteMode::Permanent,
        _ => DeleteMode::Trash,
    };
    let engine = build_engine(&config_dir, delete_mode)?;

    if let Commands::Recent = command {
        for root in engine.recent_roots() {
            println!("{}", root.display());
        }
        return Ok(());
    }

    let requested = resolve_workspace(workspace)?;
    let report = applied(engine.open_workspace(&requested).await?)?;
    let root = engine.root().context("workspace did not open")?;
    debug!(root = %root.display(), entries = report.entries, "workspace ready");

    match command {
        Commands::Tree(args) => print_tree(&engine, args.json),
        Commands::Mkdir(args) => {
            let created =
                applied(engine.create_folder(&resolve_in(&root, &args.parent), &args.name).await?)?;
            println!("Created {}", relative(&root, &created.path));
            Ok(())
        }
        Commands::NewNote(args) => {
            let parent = resolve_in(&root, &args.parent);
            let created = applied(engine.create_note(&parent, args.name.as_deref()).await?)?;
            println!("Created {}", relative(&root, &created.path));
            Ok(())
        }
        Commands::Rename(args) => {
            let moved = applied(engine.rename_entry(&resolve_in(&root, &args.path), &args.name).await?)?;
            if moved.is_noop() {
                println!("Unchanged {}", relative(&root, &moved.to));
            } else {
                println!("Renamed {} -> {}", relative(&root, &moved.from), relative(&root, &moved.to));
            }
            report_save(moved.save);
            Ok(())
        }
        Commands::Mv(args) => {
            let source = resolve_in(&root, &args.source);
            let destination = resolve_in(&root, &args.destination);
            let moved = applied(engine.move_entry(&source, &destination).await?)?;
            if moved.is_noop() {
                println!("Unchanged {}", relative(&root, &moved.to));
            } else {
                println!("Moved {} -> {}", relative(&root, &moved.from), relative(&root, &moved.to));
            }
            report_save(moved.save);
            report_links(&moved.links);
            Ok(())
        }
        Commands::Cp(args) => {
            let source = resolve_in(&root, &args.source);
            let destination = resolve_in(&root, &args.destination);
            let copied = applied(engine.copy_entry(&source, &destination).await?)?;
            println!(
                "Copied {} -> {}",
                relative(&root, &copied.source),
                relative(&root, &copied.destination)
            );
            report_links(&copied.links);
            Ok(())
        }
        Commands::Rm(args) => {
            let paths: Vec<PathBuf> = args.paths.iter().map(|path| resolve_in(&root, path)).collect();
            let deleted = applied(engine.delete_many(&paths).await?)?;
            for path in &deleted.removed {
                println!("Deleted {}", relative(&root, path));
            }
            report_save(deleted.save);
            Ok(())
        }
        Commands::Import(args) => {
            let sources = args
                .sources
                .iter()
                .map(|path| resolve_input_path(path))
                .collect::<Result<Vec<_>>>()?;
            let destination = resolve_in(&root, &args.into);
            for copied in applied(engine.import_external(&sources, &destination).await?)? {
                println!(
                    "Imported {} -> {}",
                    copied.source.display(),
                    relative(&root, &copied.destination)
                );
                report_links(&copied.links);
            }
            Ok(())
        }
        Commands::Pin(args) => {
            let dir = resolve_in(&root, &args.dir);
            if applied(engine.pin(&dir)?)? {
                println!("Pinned {}", relative(&root, &dir));
            } else {
                println!("Already pinned {}", relative(&root, &dir));
            }
            Ok(())
        }
        Commands::Unpin(args) => {
            let dir = resolve_in(&root, &args.dir);
            if applied(engine.unpin(&dir)?)? {
                println!("Unpinned {}", relative(&root, &dir));
            } else {
                println!("Not pinned {}", relative(&root, &dir));
            }
            Ok(())
        }
        Commands::Pins => {
            for dir in engine.pinned_directories() {
                println!("{}", relative(&root, &dir));
            }
            Ok(())
        }
        Commands::Watch(args) => watch(engine, args.once).await,
        Commands::Recent => Ok(()),
    }
}

fn build_engine(config_dir: &Path, delete_mode: DeleteMode) -> Result<Arc<WorkspaceEngine>> {
    let history = RecentRootsStore::load(config_dir.join(RECENT_FILE), DEFAULT_RECENT_ROOTS)
        .with_context(|| format!("load recent workspaces from {}", config_dir.display()))?;
    let ports = EnginePorts {
        fs: Arc::new(LocalFileSystem::new(delete_mode)),
        settings: Arc::new(JsonSettingsStore::new()),
        history: Arc::new(history),
        tabs: Arc::new(DocumentSession::new()),
        notifier: Arc::new(LogNotifier),
    };
    Ok(Arc::new(WorkspaceEngine::new(ports, EngineConfig::default())))
}

async fn watch(engine: Arc<WorkspaceEngine>, once: bool) -> Result<()> {
    let mut watcher =
        WorkspaceWatcher::start(engine, WatchConfig::default()).context("start watcher")?;
    eprintln!("Watching for changes; press Ctrl+C to stop.");
    loop {
        tokio::select! {
            report = watcher.next_resync() => {
                let Some(report) = report else {
                    bail!("watcher stopped unexpectedly");
                };
                println!(
                    "Resynced {} entries{}",
                    report.entries,
                    if report.pruned { " (pruned stale folders)" } else { "" }
                );
                if once {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    watcher.stop();
    Ok(())
}

fn applied<T>(outcome: ActionOutcome<T>) -> Result<T> {
    match outcome {
        ActionOutcome::Applied(value) => Ok(value),
        ActionOutcome::Rejected(rejection) => bail!("{rejection}"),
    }
}

fn report_save(save: SaveSettle) {
    if save == SaveSettle::TimedOut {
        eprintln!("Warning: an open document had unsaved changes");
    }
}

fn report_links(links: &LinkFixup) {
    match links {
        LinkFixup::Rewritten(count) => println!("Rewrote {count} relative link(s)"),
        LinkFixup::Degraded(reason) => eprintln!("Warning: links were not updated: {reason}"),
        LinkFixup::NotApplicable | LinkFixup::Unchanged => {}
    }
}

fn print_tree(engine: &WorkspaceEngine, json: bool) -> Result<()> {
    let entries = engine.entries();
    if json {
        let text = serde_json::to_string_pretty(&entries).context("serialize workspace tree")?;
        println!("{text}");
        return Ok(());
    }
    let pinned = engine.pinned_directories();
    let mut out = String::new();
    render_entries(&entries, 0, &pinned, &mut out);
    print!("{out}");
    Ok(())
}

fn render_entries(entries: &[Entry], depth: usize, pinned: &[PathBuf], out: &mut String) {
    for entry in entries {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&entry.name);
        if entry.is_directory {
            out.push('/');
            if pinned.contains(&entry.path) {
                out.push_str(" *");
            }
        }
        out.push('\n');
        render_entries(entry.children(), depth + 1, pinned, out);
    }
}

fn relative(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rest) if rest.as_os_str().is_empty() => ".".to_string(),
        Ok(rest) => rest.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

/// Resolves a workspace-relative argument; absolute paths pass through.
fn resolve_in(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else if path == Path::new(".") {
        root.to_path_buf()
    } else {
        root.join(path)
    }
}

fn resolve_config_dir(config_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = config_dir {
        return resolve_input_path(&dir);
    }
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV) {
        return resolve_input_path(Path::new(&dir));
    }
    let home = env::var_os("HOME").context("HOME is not set; pass --config-dir")?;
    Ok(PathBuf::from(home).join(".config").join("marknest"))
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => resolve_input_path(&path),
        None => env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
