//! `gantry check` - Validate a stage graph definition
//!
//! Parses and validates a definition file without executing anything.
//! Exit code 0 means the definition would be accepted by the runner.

use anyhow::{Context, Result};
use gantry::{GraphDefinition, Validate};
use std::path::Path;

/// Validate a definition file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, or when the
/// definition fails validation.
pub fn check_definition(file: &Path) -> Result<()> {
    tracing::debug!("Validating definition: {}", file.display());

    let definition = GraphDefinition::from_path(file)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to load definition: {}", file.display()))?;

    definition
        .validate()
        .with_context(|| format!("Definition rejected: {}", file.display()))?;

    let mut nodes = 0usize;
    definition.root.walk("", &mut |_, _| nodes += 1);

    println!(
        "{}: ok ({} nodes, max fan-out {})",
        definition.display_name(),
        nodes,
        definition.max_fan_out()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_check_valid_definition() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("ci.yaml");

        let definition = r#"
name: ci
root:
  name: pipeline
  kind: sequential-group
  children:
    - name: build
      kind: leaf
      steps:
        - type: command
          command: make all
"#;

        fs::write(&file_path, definition).unwrap();
        assert!(check_definition(&file_path).is_ok());
    }

    #[test]
    fn test_check_invalid_definition() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("bad.yaml");

        // Group without children fails validation.
        let definition = r#"
root:
  name: pipeline
  kind: parallel-group
"#;

        fs::write(&file_path, definition).unwrap();
        assert!(check_definition(&file_path).is_err());
    }

    #[test]
    fn test_check_nonexistent_file() {
        let result = check_definition(Path::new("/nonexistent/graph.yaml"));
        assert!(result.is_err());
    }
}
