//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::{Context, Result};

use super::DemConfig;

/// Parse dem.toml with detailed error messages
pub fn parse_dem_toml(path: &Path) -> Result<DemConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_dem_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse dem.toml content from string
pub fn parse_dem_toml_str(content: &str) -> Result<DemConfig> {
    let config: DemConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
    config.validate()?;
    Ok(config)
}

pub fn to_toml(config: &DemConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();
    match error.span() {
        Some(span) => {
            let before = content.get(..span.start).unwrap_or(content);
            let line_num = before.matches('\n').count() + 1;
            anyhow::anyhow!(
                "TOML parsing error at line {}:\n{}\n\nError: {}",
                line_num,
                line_context(content, line_num),
                message
            )
        }
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

/// Lines around `line_num` (1-based), with the offending line marked
fn line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let current = start + i + 1;
            let marker = if current == line_num { ">" } else { " " };
            format!("{} {:4} | {}", marker, current, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
