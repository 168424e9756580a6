//! Notebook (nbformat 4) serialization of the execution history

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One executed code/output pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookCell {
    pub code: String,
    pub outputs: Vec<String>,
}

impl NotebookCell {
    pub fn new(code: impl Into<String>, outputs: Vec<String>) -> Self {
        Self {
            code: code.into(),
            outputs,
        }
    }
}

/// Split text into nbformat source lines, each keeping its trailing newline
fn source_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Render the cells as a portable nbformat 4 notebook document
pub fn render_notebook(cells: &[NotebookCell]) -> serde_json::Value {
    let cell_values: Vec<serde_json::Value> = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let outputs: Vec<serde_json::Value> = cell
                .outputs
                .iter()
                .filter(|o| !o.is_empty())
                .map(|o| {
                    serde_json::json!({
                        "output_type": "stream",
                        "name": "stdout",
                        "text": source_lines(o),
                    })
                })
                .collect();
            serde_json::json!({
                "cell_type": "code",
                "execution_count": i + 1,
                "metadata": {},
                "source": source_lines(&cell.code),
                "outputs": outputs,
            })
        })
        .collect();

    serde_json::json!({
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {
            "kernelspec": {
                "display_name": "Python 3",
                "language": "python",
                "name": "python3",
            },
            "language_info": { "name": "python" },
        },
        "cells": cell_values,
    })
}

/// Write the execution history to an `.ipynb` file
pub fn write_notebook(path: &Path, cells: &[NotebookCell]) -> std::io::Result<()> {
    let document = render_notebook(cells);
    let json = serde_json::to_string_pretty(&document)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_notebook_structure() {
        let cells = vec![
            NotebookCell::new("print('hi')\nprint('bye')", vec!["hi\nbye\n".to_string()]),
            NotebookCell::new("x = 1", vec![]),
        ];
        let doc = render_notebook(&cells);

        assert_eq!(doc["nbformat"], 4);
        assert_eq!(doc["cells"].as_array().unwrap().len(), 2);
        assert_eq!(doc["cells"][0]["cell_type"], "code");
        assert_eq!(doc["cells"][0]["execution_count"], 1);
        assert_eq!(doc["cells"][0]["source"][0], "print('hi')\n");
        assert_eq!(doc["cells"][0]["outputs"][0]["output_type"], "stream");
        assert_eq!(doc["cells"][1]["execution_count"], 2);
        // Empty output text produces no output entries.
        assert!(doc["cells"][1]["outputs"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_write_notebook_roundtrips_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notebook.ipynb");
        let cells = vec![NotebookCell::new("1 + 1", vec!["2\n".to_string()])];

        write_notebook(&path, &cells).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["cells"][0]["source"][0], "1 + 1");
    }
}
