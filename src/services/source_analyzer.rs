//! Source Analyzer
//!
//! Line-based outline of a C# file: classes (with their extent), public
//! methods and `using` directives. It is a heuristic, not a parser.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn class_decl() -> &'static Regex {
    static CLASS_DECL: OnceLock<Regex> = OnceLock::new();
    CLASS_DECL.get_or_init(|| {
        Regex::new(r"^(?:(?:public|internal|private|protected|static|abstract|sealed|partial)\s+)*class\s+(\w+)")
            .expect("class pattern is valid")
    })
}

fn public_method_signature() -> &'static Regex {
    static PUBLIC_METHOD: OnceLock<Regex> = OnceLock::new();
    PUBLIC_METHOD.get_or_init(|| {
        Regex::new(r"^public\s+[^=]*?(\w+)\s*(?:<[^>]*>)?\s*\(").expect("method pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodOutline {
    pub name: String,
    /// 1-based line of the signature
    pub line: usize,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOutline {
    pub name: String,
    pub start_line: usize,
    /// `None` when the closing brace was never seen
    pub end_line: Option<usize>,
    pub methods: Vec<MethodOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutline {
    pub classes: Vec<ClassOutline>,
    pub usings: Vec<String>,
}

impl SourceOutline {
    pub fn method_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }

    /// Compact text form for prompts, one class per line
    pub fn describe(&self) -> String {
        if self.classes.is_empty() {
            return "no classes found".to_string();
        }
        self.classes
            .iter()
            .map(|class| {
                let methods: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
                if methods.is_empty() {
                    format!("class {}", class.name)
                } else {
                    format!("class {}: {}", class.name, methods.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn brace_delta(line: &str) -> i64 {
    line.chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

/// Public method on a trimmed line, if any
fn public_method(line: &str, number: usize) -> Option<MethodOutline> {
    public_method_signature().captures(line).and_then(|caps| {
        let name = caps.get(1)?.as_str();
        // `public class Foo(...)` primary constructors are not methods
        if line.contains(" class ") || line.contains(" record ") {
            return None;
        }
        Some(MethodOutline {
            name: name.to_string(),
            line: number,
            signature: line.to_string(),
        })
    })
}

/// Outline classes, public methods and usings.
///
/// A class ends on the first line where its brace depth, having opened, returns
/// to zero and that line opens no new brace. A class declaration seen while
/// another class is still open closes the outer one. `using` directives are
/// only read outside classes.
pub fn analyze(source: &str) -> SourceOutline {
    let mut outline = SourceOutline::default();
    let mut current: Option<ClassOutline> = None;
    let mut depth: i64 = 0;
    let mut opened = false;

    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let line = raw.trim();

        if current.is_none() {
            if let Some(namespace) = line
                .strip_prefix("using ")
                .and_then(|rest| rest.strip_suffix(';'))
            {
                outline.usings.push(namespace.trim().to_string());
                continue;
            }
        }

        if let Some(caps) = class_decl().captures(line) {
            if let Some(open) = current.take() {
                outline.classes.push(open);
            }
            current = Some(ClassOutline {
                name: caps[1].to_string(),
                start_line: number,
                end_line: None,
                methods: Vec::new(),
            });
            depth = brace_delta(line);
            opened = depth > 0;
            continue;
        }

        let Some(class) = current.as_mut() else {
            continue;
        };
        depth += brace_delta(line);
        opened |= depth > 0;
        if let Some(method) = public_method(line, number) {
            class.methods.push(method);
        }
        if opened && depth <= 0 && !line.contains('{') {
            class.end_line = Some(number);
            if let Some(closed) = current.take() {
                outline.classes.push(closed);
            }
        }
    }

    if let Some(open) = current {
        outline.classes.push(open);
    }
    outline
}
