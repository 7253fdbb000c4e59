//! 交互式命令行
//!
//! 结果打印、Tab 补全与控制台命令

pub mod commands;
pub mod completer;
pub mod printer;

pub use commands::{execute_console_command, is_console_command, CommandResult, ConsoleState};
pub use completer::QueryCompleter;
pub use printer::{check_vertical_display, PrintMode, Printer};
