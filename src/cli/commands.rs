//! 控制台命令处理
//!
//! 处理以 : 开头的控制台命令

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use super::printer::Printer;
use crate::catalog::Catalog;

/// 控制台命令执行结果
#[derive(Debug)]
pub enum CommandResult {
    /// 继续运行
    Continue,
    /// 退出程序
    Exit,
    /// 显示消息
    Message(String),
    /// 错误
    Error(String),
}

/// 控制台状态
#[derive(Default)]
pub struct ConsoleState {
    /// 输出到文件
    pub tee_file: Option<File>,
    /// JSON 输出
    pub json: bool,
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入输出（同时写入 stdout 和 tee 文件）
    pub fn write_output(&mut self, content: &str) {
        print!("{}", content);
        if let Some(ref mut file) = self.tee_file {
            let _ = file.write_all(content.as_bytes());
        }
    }
}

/// 解析并执行控制台命令
pub fn execute_console_command(input: &str, state: &mut ConsoleState, catalog: &Catalog) -> CommandResult {
    let input = input.trim();
    let cmd_line = input.strip_prefix(':').unwrap_or(input);

    let mut parts = cmd_line.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().unwrap_or("").trim();

    match cmd.as_str() {
        "help" | "h" => CommandResult::Message(get_help_text()),

        "quit" | "q" | "exit" => CommandResult::Exit,

        "models" => CommandResult::Message(Printer::print_models(catalog)),

        "relations" => {
            if args.is_empty() {
                return CommandResult::Error("Usage: :relations <Model>".to_string());
            }
            match Printer::print_relations(catalog, args) {
                Ok(table) => CommandResult::Message(table),
                Err(e) => CommandResult::Error(e.to_string()),
            }
        }

        "json" => {
            state.json = !state.json;
            let mode = if state.json { "on" } else { "off" };
            CommandResult::Message(format!("JSON output {}", mode))
        }

        "tee" => {
            let args_parts: Vec<&str> = args.split_whitespace().collect();
            let (overwrite, filename) = if args_parts.first() == Some(&"-o") {
                (true, args_parts.get(1).copied())
            } else {
                (false, args_parts.first().copied())
            };

            if let Some(filename) = filename {
                let path = PathBuf::from(filename);
                let file = if overwrite {
                    File::create(&path)
                } else {
                    File::options().create(true).append(true).open(&path)
                };

                match file {
                    Ok(f) => {
                        state.tee_file = Some(f);
                        CommandResult::Message(format!("Logging to {}", filename))
                    }
                    Err(e) => CommandResult::Error(format!("Cannot open file: {}", e)),
                }
            } else {
                CommandResult::Error("Usage: :tee [-o] <filename>".to_string())
            }
        }

        "notee" => {
            if state.tee_file.take().is_some() {
                CommandResult::Message("Stopped logging".to_string())
            } else {
                CommandResult::Message("No active logging".to_string())
            }
        }

        "clear" => {
            print!("\x1B[2J\x1B[1;1H");
            CommandResult::Continue
        }

        _ => CommandResult::Error(format!("Unknown command: {}. Type :help for help.", cmd)),
    }
}

/// 检查输入是否是控制台命令
pub fn is_console_command(input: &str) -> bool {
    input.trim().starts_with(':')
}

fn get_help_text() -> String {
    r#"
╔═══════════════════════════════════════════════════════════════╗
║                    Console Commands                           ║
╠═══════════════════════════════════════════════════════════════╣
║ :help, :h                  Show this help                     ║
║ :quit, :q, :exit           Exit the program                   ║
║ :models                    List registered models             ║
║ :relations <Model>         List relations of a model          ║
║ :json                      Toggle JSON output                 ║
║ :tee [-o] <filename>       Log output to file (-o: overwrite) ║
║ :notee                     Stop logging to file               ║
║ :clear                     Clear the screen                   ║
╠═══════════════════════════════════════════════════════════════╣
║ Tip: Use \G at end of query for vertical result display       ║
╚═══════════════════════════════════════════════════════════════╝
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::blog_fixture;

    #[test]
    fn test_console_commands() {
        let fixture = blog_fixture();
        let catalog = fixture.catalog();
        let mut state = ConsoleState::new();

        assert!(is_console_command(" :models"));
        assert!(!is_console_command("Blog(1)"));
        assert!(matches!(
            execute_console_command(":quit", &mut state, catalog),
            CommandResult::Exit
        ));
        match execute_console_command(":relations Blog", &mut state, catalog) {
            CommandResult::Message(table) => assert!(table.contains("entry_set")),
            other => panic!("Expected relation table, got {:?}", other),
        }
        assert!(matches!(
            execute_console_command(":relations", &mut state, catalog),
            CommandResult::Error(_)
        ));
        assert!(matches!(
            execute_console_command(":bogus", &mut state, catalog),
            CommandResult::Error(_)
        ));
    }

    #[test]
    fn test_json_toggle_and_tee() {
        let fixture = blog_fixture();
        let mut state = ConsoleState::new();
        execute_console_command(":json", &mut state, fixture.catalog());
        assert!(state.json);
        execute_console_command(":json", &mut state, fixture.catalog());
        assert!(!state.json);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let cmd = format!(":tee -o {}", path.display());
        assert!(matches!(
            execute_console_command(&cmd, &mut state, fixture.catalog()),
            CommandResult::Message(_)
        ));
        state.write_output("row\n");
        execute_console_command(":notee", &mut state, fixture.catalog());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "row\n");
    }
}
