//! 查询补全器
//!
//! 基于 rustyline 实现 Tab 补全：控制台命令、模型名和 `Model.` 之后的关系名

use crate::catalog::Catalog;
use crate::query::FilterMethod;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::collections::HashMap;

/// 控制台命令列表
const CONSOLE_COMMANDS: &[&str] = &[
    ":help", ":h",
    ":quit", ":q",
    ":exit",
    ":models",
    ":relations",
    ":json",
    ":tee",
    ":notee",
    ":clear",
];

/// Curio CLI 补全器
#[derive(Default)]
pub struct QueryCompleter {
    /// 查询中可用的模型名（短名唯一时为短名）
    models: Vec<String>,
    /// 模型名 -> 允许的关系名
    relations: HashMap<String, Vec<String>>,
}

impl QueryCompleter {
    pub fn new(catalog: &Catalog) -> Self {
        let mut models = Vec::new();
        let mut relations = HashMap::new();
        for model in catalog.models() {
            let name = catalog.display_name(model.name()).to_string();
            let names: Vec<String> = model.allowed_relations().map(|r| r.name().to_string()).collect();
            relations.insert(model.name().to_string(), names.clone());
            relations.insert(name.clone(), names);
            models.push(name);
        }
        Self { models, relations }
    }

    fn candidates(&self, word: &str) -> Vec<String> {
        if let Some((model, prefix)) = word.rsplit_once('.') {
            if let Some(names) = self.relations.get(model) {
                return names
                    .iter()
                    .filter(|r| r.starts_with(prefix))
                    .map(|r| format!("{}.{}", model, r))
                    .collect();
            }
            // `.` 之后是过滤方法
            return FilterMethod::ALL
                .iter()
                .map(FilterMethod::as_str)
                .filter(|m| m.starts_with(prefix))
                .map(|m| format!("{}.{}(", model, m))
                .collect();
        }
        self.models
            .iter()
            .filter(|m| m.starts_with(word))
            .cloned()
            .collect()
    }
}

fn to_pairs(words: impl IntoIterator<Item = String>) -> Vec<Pair> {
    words
        .into_iter()
        .map(|w| Pair {
            display: w.clone(),
            replacement: w,
        })
        .collect()
}

impl Completer for QueryCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_cursor = &line[..pos];

        // 检查是否是控制台命令
        if line_to_cursor.starts_with(':') {
            let completions = CONSOLE_COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(line_to_cursor))
                .map(|cmd| cmd.to_string());
            return Ok((0, to_pairs(completions)));
        }

        // 当前单词：标识符字符与 `.`
        let start = line_to_cursor
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = &line_to_cursor[start..];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        Ok((start, to_pairs(self.candidates(word))))
    }
}

impl Hinter for QueryCompleter {
    type Hint = String;
}

impl Highlighter for QueryCompleter {}

impl Validator for QueryCompleter {}

impl Helper for QueryCompleter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::blog_fixture;

    #[test]
    fn test_model_and_relation_candidates() {
        let fixture = blog_fixture();
        let completer = QueryCompleter::new(fixture.catalog());

        assert_eq!(completer.candidates("Bl"), vec!["Blog"]);
        assert_eq!(completer.candidates("Entry.re"), vec!["Entry.responses"]);
        assert_eq!(
            completer.candidates("blog__Entry.comm"),
            vec!["blog__Entry.comment_set"]
        );
        assert_eq!(completer.candidates("Entry.authors.li"), vec!["Entry.authors.limit("]);
        assert!(completer.candidates("Zebra").is_empty());
    }
}
