//! Change Parser: turns free-form LLM output into a list of [`taskstore::FileChange`].
//!
//! The grammar is a `FILE: <path>` declaration line followed by a fenced
//! code block. This is a small hand-written scanner rather than a regex:
//! the grammar is line-oriented and a regex would need to re-derive the
//! "nearest unpaired block" pairing rule anyway.

use tracing::{debug, warn};

use taskstore::{ChangeType, FileChange};

/// Practical cap on a single file's content, matching the Validator's
/// `file-too-large` check. Oversize content is still parsed, never
/// truncated or rejected here.
pub const MAX_FILE_CHANGE_BYTES: usize = 1024 * 1024;

/// Parse free-form text into an ordered list of file changes.
///
/// Never fails: malformed or absent declarations simply yield fewer (or
/// zero) changes, with the reason logged at `warn` level.
pub fn parse(text: &str) -> Vec<FileChange> {
    let lines: Vec<&str> = text.lines().collect();
    let mut declarations = Vec::new();
    let mut blocks = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        if let Some(path) = lines[i].strip_prefix("FILE: ") {
            let path = path.trim();
            if !path.is_empty() {
                declarations.push((i, path.to_string()));
            }
            i += 1;
            continue;
        }
        if let Some((end, lang, content)) = scan_fence(&lines, i) {
            blocks.push((i, end, lang, content));
            i = end + 1;
            continue;
        }
        i += 1;
    }

    pair(declarations, blocks)
}

/// If `lines[start]` opens a fenced code block (optionally preceded by the
/// scan already having skipped blank lines), scan forward for its closing
/// fence. Returns `(closing_line_index, language_tag, content)`.
fn scan_fence(lines: &[&str], start: usize) -> Option<(usize, Option<String>, String)> {
    let opener = lines[start].trim_start();
    let rest = opener.strip_prefix("```")?;
    let lang = rest.trim();
    let lang = if lang.is_empty() { None } else { Some(lang.to_string()) };

    let mut j = start + 1;
    let mut content_lines = Vec::new();
    while j < lines.len() {
        if lines[j].trim() == "```" {
            return Some((j, lang, content_lines.join("\n")));
        }
        content_lines.push(lines[j]);
        j += 1;
    }
    None
}

/// Pair each `FILE:` declaration, in document order, with the nearest
/// following unpaired code block. Unpaired declarations/blocks are dropped.
fn pair(declarations: Vec<(usize, String)>, blocks: Vec<(usize, usize, Option<String>, String)>) -> Vec<FileChange> {
    let mut used = vec![false; blocks.len()];
    let mut out = Vec::with_capacity(declarations.len());

    for (decl_line, path) in declarations {
        let candidate = blocks
            .iter()
            .enumerate()
            .filter(|(idx, (start, ..))| !used[*idx] && *start > decl_line)
            .min_by_key(|(_, (start, ..))| *start);

        let Some((idx, (_, _, lang, content))) = candidate else {
            warn!(path, "parser: unpaired FILE declaration, dropping");
            continue;
        };
        used[idx] = true;

        let language = lang.clone().or_else(|| infer_language(&path));
        debug!(path, language = ?language, bytes = content.len(), "parser: paired file change");
        out.push(FileChange {
            path,
            language,
            change_type: ChangeType::Modify,
            content: content.clone(),
        });
    }

    let unpaired = used.iter().filter(|u| !**u).count();
    if unpaired > 0 {
        warn!(unpaired, "parser: unpaired code blocks, dropping");
    }

    out
}

/// Infer a language tag from a file extension. Returns `None` for unknown
/// extensions, matching the table enumerated in the change-parser grammar.
pub fn infer_language(path: &str) -> Option<String> {
    let ext = std::path::Path::new(path).extension()?.to_str()?;
    let lang = match ext {
        "cs" => "csharp",
        "js" => "javascript",
        "ts" => "typescript",
        "py" => "python",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "cpp" | "cc" | "cxx" => "cpp",
        "c" => "c",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "sql" => "sql",
        "json" => "json",
        "xml" => "xml",
        "html" => "html",
        "css" => "css",
        _ => return None,
    };
    Some(lang.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_file_change() {
        let text = "FILE: src/main.rs\n```rust\nfn main() {}\n```\n";
        let changes = parse(text);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "src/main.rs");
        assert_eq!(changes[0].language.as_deref(), Some("rust"));
        assert_eq!(changes[0].content, "fn main() {}");
    }

    #[test]
    fn infers_language_when_fence_has_no_tag() {
        let text = "FILE: lib.py\n```\nprint('hi')\n```\n";
        let changes = parse(text);
        assert_eq!(changes[0].language.as_deref(), Some("python"));
    }

    #[test]
    fn pairs_with_nearest_unpaired_block() {
        let text = "\
FILE: a.rs
some preamble the model wrote
```rust
fn a() {}
```
FILE: b.rs
```rust
fn b() {}
```
";
        let changes = parse(text);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, "a.rs");
        assert_eq!(changes[1].path, "b.rs");
    }

    #[test]
    fn unpaired_declaration_is_dropped_not_errored() {
        let text = "FILE: orphan.rs\nno fence follows\n";
        let changes = parse(text);
        assert!(changes.is_empty());
    }

    #[test]
    fn no_declarations_yields_empty_list() {
        assert!(parse("just some prose, no changes here").is_empty());
    }

    #[test]
    fn allows_blank_lines_between_declaration_and_fence() {
        let text = "FILE: a.rs\n\n\n```rust\nfn a() {}\n```\n";
        let changes = parse(text);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn unknown_extension_yields_no_language() {
        assert_eq!(infer_language("README"), None);
        assert_eq!(infer_language("data.unknownext"), None);
    }
}
