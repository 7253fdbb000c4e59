//! 结果打印器
//!
//! 提供表格、垂直和 JSON 格式的结果输出

use crate::catalog::Catalog;
use crate::query::{QueryResult, ResultGroup};
use crate::types::ObjectId;
use prettytable::{format, row, Cell, Row, Table};

/// 打印模式
#[derive(Clone, Copy, PartialEq)]
pub enum PrintMode {
    /// 表格模式
    Table,
    /// 垂直模式 (\G)
    Vertical,
    /// JSON 模式
    Json,
}

/// 结果打印器
pub struct Printer {
    mode: PrintMode,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new(PrintMode::Table)
    }
}

impl Printer {
    pub fn new(mode: PrintMode) -> Self {
        Self { mode }
    }

    /// 设置打印模式
    pub fn set_mode(&mut self, mode: PrintMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> PrintMode {
        self.mode
    }

    /// 打印查询结果
    pub fn print_result(&self, result: &QueryResult) -> String {
        let elapsed = result.stats.execution_time_ms;
        if self.mode == PrintMode::Json {
            return match serde_json::to_string_pretty(result) {
                Ok(json) => format!("{}\n", json),
                Err(e) => format!("ERROR: {}\n", e),
            };
        }

        let rows: usize = result.groups.iter().map(ResultGroup::len).sum();
        if rows == 0 {
            return format!("Empty set ({} ms)\n", elapsed);
        }

        let mut output = String::new();
        for (index, group) in result.groups.iter().enumerate() {
            output.push_str(&group_header(index, group));
            output.push('\n');
            let body = match self.mode {
                PrintMode::Vertical => self.format_vertical(group),
                _ => self.format_table(group),
            };
            output.push_str(&body);
        }

        format!(
            "{}\n{} row(s) in {} group(s) ({} ms, {} provider call(s))\n",
            output,
            rows,
            result.groups.len(),
            elapsed,
            result.stats.provider_calls
        )
    }

    /// 表格格式
    fn format_table(&self, group: &ResultGroup) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);
        table.set_titles(row!["#", "object", "source"]);

        for (i, (obj, src)) in group.objects.iter().enumerate() {
            table.add_row(Row::new(vec![
                Cell::new(&(i + 1).to_string()),
                Cell::new(&format_id(*obj)),
                Cell::new(&format_id(*src)),
            ]));
        }

        table.to_string()
    }

    /// 垂直格式
    fn format_vertical(&self, group: &ResultGroup) -> String {
        let mut output = String::new();
        for (i, (obj, src)) in group.objects.iter().enumerate() {
            output.push_str(&format!(
                "*************************** {}. row ***************************\n",
                i + 1
            ));
            output.push_str(&format!("object: {}\n", format_id(*obj)));
            output.push_str(&format!("source: {}\n", format_id(*src)));
        }
        output
    }

    /// 打印模型列表
    pub fn print_models(catalog: &Catalog) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);
        table.set_titles(row!["Model", "Full name", "Relations"]);
        for model in catalog.models() {
            table.add_row(row![
                catalog.display_name(model.name()),
                model.name(),
                model.allowed_relations().count().to_string()
            ]);
        }
        table.to_string()
    }

    /// 打印模型的关系
    pub fn print_relations(catalog: &Catalog, model: &str) -> crate::error::Result<String> {
        let entry = catalog.model(model)?;
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);
        table.set_titles(row!["Relation", "Target", "Kind"]);
        for rel in entry.allowed_relations() {
            table.add_row(row![
                rel.name(),
                catalog.display_name(rel.target()),
                rel.kind().to_string()
            ]);
        }
        Ok(table.to_string())
    }

    /// 打印帮助信息
    pub fn print_help() -> String {
        r#"
═══════════════════════════════════════════════════════════════
                     Curio CLI 命令帮助
═══════════════════════════════════════════════════════════════

查询语法:
  Model(<id>) | Model(field=value, ...)     种子对象
  Model.relation(filters)                   关系步骤
  Model.relation**  *  ?  $                 递归: all / until / search / terminal
  (steps)  +(steps)  -(steps)  ?(steps)     子查询 (join / 存在 / 不存在 / 左连接)
  (steps) | (steps)                         并集
  , step                                    连接：开始新的结果组

过滤方法:
  (k=v) .filter(k=v) .exclude(k=v)
  .count(f) .sum(f) .avg(f) .min(f) .max(f)
  .start(n) .limit(n) .first(n) .last(n)

示例:
  Blog(1), Blog.entry_set(rating__gte=4) ?(Entry.comment_set)
  Entry(1) Entry.responses*
  Entry(pub_date__gte=t"3 days ago") -(Entry.comment_set)

═══════════════════════════════════════════════════════════════
控制台命令 (以 : 开头)
═══════════════════════════════════════════════════════════════

  :help, :h              显示帮助
  :quit, :q              退出程序
  :models                列出模型
  :relations <Model>     列出模型的关系
  :json                  切换 JSON 输出
  :tee [-o] <file>       输出到文件 (-o 覆盖)
  :notee                 停止输出到文件
  :clear                 清屏

提示: 在查询末尾加 \G 可垂直显示结果

═══════════════════════════════════════════════════════════════
"#
        .to_string()
    }
}

/// 结果组标题：序号、模型与 back_index
fn group_header(index: usize, group: &ResultGroup) -> String {
    let model = group.model.as_deref().unwrap_or("(empty)");
    if group.back_index < 0 {
        format!("[{}] {}", index, model)
    } else {
        format!("[{}] {} <- [{}]", index, model, group.back_index)
    }
}

fn format_id(id: Option<ObjectId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "NULL".to_string())
}

/// 检查查询是否以 \G 结尾（垂直显示）
pub fn check_vertical_display(query: &str) -> (String, bool) {
    let trimmed = query.trim();
    if trimmed.ends_with("\\G") || trimmed.ends_with("\\g") {
        let clean_query = trimmed[..trimmed.len() - 2].trim().to_string();
        (clean_query, true)
    } else {
        (trimmed.to_string(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::blog_fixture;

    #[test]
    fn test_check_vertical_display() {
        assert_eq!(check_vertical_display("Blog(1) \\G"), ("Blog(1)".to_string(), true));
        assert_eq!(check_vertical_display(" Blog(1) "), ("Blog(1)".to_string(), false));
    }

    #[test]
    fn test_print_groups() {
        let fixture = blog_fixture();
        let result = fixture.executor().run("Blog(1), Blog.entry_set").unwrap();

        let table = Printer::default().print_result(&result);
        assert!(table.contains("[0] Blog"));
        assert!(table.contains("[1] Entry <- [0]"));
        assert!(table.contains("4 row(s) in 2 group(s)"));

        let vertical = Printer::new(PrintMode::Vertical).print_result(&result);
        assert!(vertical.contains("1. row"));
        assert!(vertical.contains("source: NULL"));

        let json = Printer::new(PrintMode::Json).print_result(&result);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["groups"][1]["back_index"], 0);
    }

    #[test]
    fn test_print_empty() {
        let fixture = blog_fixture();
        let result = fixture.executor().run("Blog(99)").unwrap();
        assert!(Printer::default().print_result(&result).starts_with("Empty set"));
    }

    #[test]
    fn test_print_catalog() {
        let fixture = blog_fixture();
        let models = Printer::print_models(fixture.catalog());
        assert!(models.contains("blog__Entry"));
        let relations = Printer::print_relations(fixture.catalog(), "Entry").unwrap();
        assert!(relations.contains("responses"));
        assert!(relations.contains("many-to-many"));
        assert!(Printer::print_relations(fixture.catalog(), "Nothing").is_err());
    }
}
