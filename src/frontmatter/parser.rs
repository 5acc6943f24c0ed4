use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontmatterError {
    #[error("Failed to parse YAML frontmatter: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
}

/// Extract the YAML frontmatter mapping from a note.
///
/// Frontmatter is a block delimited by `---` lines at the very start of the
/// note:
///
/// ```text
/// ---
/// tags: [inbox]
/// created: 2024-01-05
/// ---
/// # Note body
/// ```
///
/// Returns `Ok(None)` when the note has no frontmatter: no opening delimiter,
/// no closing delimiter, or a block that is empty or not a mapping.
///
/// # Errors
///
/// Returns an error if the delimited block is not valid YAML.
pub fn extract_frontmatter(content: &str) -> Result<Option<Mapping>, FrontmatterError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let lines: Vec<&str> = content.lines().collect();

    if lines.is_empty() || lines[0].trim_end() != "---" {
        return Ok(None);
    }

    // The closing delimiter must sit at column zero; indented `---` lines belong
    // to block scalars inside the YAML.
    let end_idx = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| line.trim_end() == "---")
        .map(|(idx, _)| idx);

    let Some(end_idx) = end_idx else {
        return Ok(None);
    };

    let yaml_content = lines[1..end_idx].join("\n");
    match serde_yaml::from_str::<Value>(&yaml_content)? {
        Value::Mapping(map) => Ok(Some(map)),
        _ => Ok(None),
    }
}
