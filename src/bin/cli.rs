//! Curio CLI 工具
//!
//! 加载对象快照，执行单个查询或进入交互式命令行

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use curio::cli::{
    check_vertical_display, execute_console_command, is_console_command, CommandResult, ConsoleState,
    PrintMode, Printer, QueryCompleter,
};
use curio::{Catalog, EngineConfig, MemoryStore, QueryExecutor};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "curio-cli")]
#[command(about = "Curio 关系图查询命令行工具")]
struct Args {
    /// 对象快照文件 (JSON)
    #[arg(short, long, default_value = "./data.json")]
    data: PathBuf,

    /// 引擎配置文件 (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 执行单个查询后退出
    #[arg(short = 'e', long)]
    execute: Option<String>,

    /// 以 JSON 输出结果
    #[arg(long)]
    json: bool,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "curio=debug" } else { "curio=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let store = MemoryStore::load_json(&args.data)
        .with_context(|| format!("加载快照失败: {}", args.data.display()))?;
    let catalog = Arc::new(store.catalog()?);
    info!(models = catalog.len(), data = %args.data.display(), "catalog ready");

    let executor = QueryExecutor::new(Arc::clone(&catalog)).with_config(config);
    let mut state = ConsoleState::new();
    state.json = args.json;

    // 单个查询模式
    if let Some(query) = args.execute {
        let output = run_query(&executor, &state, &query)?;
        print!("{}", output);
        return Ok(());
    }

    // 交互模式
    println!("{} {}", "Curio CLI".bold(), curio::VERSION);
    println!("输入 :help 查看帮助，:quit 退出\n");

    let mut editor: Editor<QueryCompleter, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(QueryCompleter::new(&catalog)));
    let history = history_path();
    if let Some(path) = &history {
        // 首次运行时历史文件不存在
        let _ = editor.load_history(path);
    }

    loop {
        match editor.readline("curio> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if handle_line(&executor, &catalog, &mut state, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(path) = &history {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = editor.save_history(path) {
            warn!(error = %e, "cannot save history");
        }
    }
    println!("Bye");
    Ok(())
}

/// 处理一行输入，返回 true 表示退出
fn handle_line(executor: &QueryExecutor, catalog: &Catalog, state: &mut ConsoleState, line: &str) -> bool {
    if is_console_command(line) {
        match execute_console_command(line, state, catalog) {
            CommandResult::Exit => return true,
            CommandResult::Continue => {}
            CommandResult::Message(msg) => state.write_output(&format!("{}\n", msg)),
            CommandResult::Error(err) => eprintln!("{} {}", "ERROR:".red().bold(), err),
        }
        return false;
    }

    match run_query(executor, state, line) {
        Ok(output) => state.write_output(&output),
        Err(e) => eprintln!("{} {}", "ERROR:".red().bold(), e),
    }
    false
}

fn run_query(executor: &QueryExecutor, state: &ConsoleState, input: &str) -> curio::Result<String> {
    let (query, vertical) = check_vertical_display(input);
    let result = executor.run(&query)?;
    let mode = if state.json {
        PrintMode::Json
    } else if vertical {
        PrintMode::Vertical
    } else {
        PrintMode::Table
    };
    Ok(Printer::new(mode).print_result(&result))
}

fn history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("curio").join("history.txt"))
}
