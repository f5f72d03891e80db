//! Minimal Dockerfile reader.
//!
//! Only the base image matters here: it selects which registry credentials
//! accompany the build. The engine does the actual parsing.

use std::path::Path;

use traefiker_core::error::{DeployError, Result};

/// Read the Dockerfile at `path` and return the image of its first `FROM`.
pub fn read_base_image(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DeployError::BuildError(format!(
            "Failed to read Dockerfile at {}: {}",
            path.display(),
            e
        ))
    })?;
    base_image(&content).ok_or_else(|| {
        DeployError::BuildError(format!("No FROM instruction in {}", path.display()))
    })
}

/// Image reference of the first `FROM` instruction, if any.
pub fn base_image(content: &str) -> Option<String> {
    join_continuation_lines(content)
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let (keyword, rest) = split_first_word(line);
            if !keyword.eq_ignore_ascii_case("FROM") {
                return None;
            }
            rest.split_whitespace()
                .find(|word| !word.starts_with("--"))
                .map(str::to_string)
        })
}

/// Join lines ending with `\` into single logical lines.
fn join_continuation_lines(content: &str) -> Vec<String> {
    let mut logical_lines = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        if let Some(stripped) = line.strip_suffix('\\') {
            current.push_str(stripped.trim_end());
            current.push(' ');
        } else {
            current.push_str(line);
            logical_lines.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        logical_lines.push(current);
    }

    logical_lines
}

fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}
