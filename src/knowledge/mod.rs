//! Knowledge injector: keyword-matched snippet retrieval
//!
//! Given the latest user-facing message, the injector returns at most one
//! augmentation block to be composed *transiently* into the outgoing prompt.
//! The block is never persisted in message history. Snippets come in two
//! modes: a full reference snippet, or a core snippet whose backend code is
//! predefined in the execution kernel at session open.

use std::collections::HashSet;

/// A retrievable knowledge entry
#[derive(Debug, Clone)]
pub enum Snippet {
    /// Complete reference code the coder should adapt
    Full {
        name: String,
        description: String,
        code: String,
    },
    /// Functions already defined and executed in the kernel backend
    Core {
        name: String,
        description: String,
        backend_code: String,
        usage: String,
    },
}

impl Snippet {
    pub fn name(&self) -> &str {
        match self {
            Snippet::Full { name, .. } | Snippet::Core { name, .. } => name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Snippet::Full { description, .. } | Snippet::Core { description, .. } => description,
        }
    }

    /// Backend code to execute at session open, for core snippets
    pub fn backend_code(&self) -> Option<&str> {
        match self {
            Snippet::Core { backend_code, .. } => Some(backend_code),
            Snippet::Full { .. } => None,
        }
    }

    /// Render the augmentation block appended to an outgoing request
    pub fn render(&self) -> String {
        match self {
            Snippet::Full {
                description, code, ..
            } => format!(
                "\n\nRetrieval:\nThe retriever found the following code snippet \
that may help solve the problem. Refer to this code and modify it appropriately.\n\
Code description: {description}\n\
Full code:\n```\n{code}\n```\n\
Your modified code:",
            ),
            Snippet::Core {
                description,
                backend_code,
                usage,
                ..
            } => format!(
                "\n\nRetrieval:\nThe retriever found the following code snippet \
that can solve the problem. All functions and classes below are already defined \
and executed in the backend.\n\
Code description: {description}\n\
Code defined and executed in the backend (check whether it fully satisfies the \
request):\n```\n{backend_code}\n```\n\
Core usage (the functions are already defined; call them directly):\n\
```core_function\n{usage}\n```\n\
Your code:",
            ),
        }
    }
}

/// The knowledge retrieval seam
pub trait KnowledgeBase: Send + Sync {
    /// Return the best-matching snippet for the query, if any
    fn retrieve(&self, query: &str) -> Option<&Snippet>;
}

/// In-process snippet registry matched by keyword overlap
pub struct SnippetRegistry {
    snippets: Vec<Snippet>,
    /// Minimum number of shared keywords for a match
    min_hits: usize,
}

impl Default for SnippetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SnippetRegistry {
    pub fn new() -> Self {
        Self {
            snippets: Vec::new(),
            min_hits: 2,
        }
    }

    pub fn with_min_hits(mut self, min_hits: usize) -> Self {
        self.min_hits = min_hits;
        self
    }

    pub fn register(&mut self, snippet: Snippet) {
        self.snippets.push(snippet);
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Backend code of every core snippet, in registration order
    pub fn backend_cells(&self) -> impl Iterator<Item = &str> {
        self.snippets.iter().filter_map(Snippet::backend_code)
    }

    fn score(query_tokens: &HashSet<String>, description: &str) -> usize {
        tokenize(description)
            .filter(|t| query_tokens.contains(t))
            .count()
    }
}

impl KnowledgeBase for SnippetRegistry {
    fn retrieve(&self, query: &str) -> Option<&Snippet> {
        let query_tokens: HashSet<String> = tokenize(query).collect();
        self.snippets
            .iter()
            .map(|s| (Self::score(&query_tokens, s.description()), s))
            .filter(|(score, _)| *score >= self.min_hits)
            .max_by_key(|(score, _)| *score)
            .map(|(_, s)| s)
    }
}

/// Registry shipped with the binary
///
/// One full-mode snippet: reference code for loading a Hugging Face
/// dataset, previewing its columns, and saving approved fields as parquet.
pub fn bundled() -> SnippetRegistry {
    let mut registry = SnippetRegistry::new();
    registry.register(Snippet::Full {
        name: "hf-dataset-analyzer".to_string(),
        description: "hugging face dataset analysis load preview column \
samples quality check save approved fields parquet"
            .to_string(),
        code: HF_DATASET_ANALYZER.to_string(),
    });
    registry
}

const HF_DATASET_ANALYZER: &str = r#"
from datasets import load_dataset
import pandas as pd
import os

def load_and_display_dataset(dataset_name, split="train", num_samples=100):
    token = os.environ.get("HF_TOKEN")
    kwargs = {"token": token} if token else {}
    try:
        dataset = load_dataset(dataset_name, split=f"{split}[:{num_samples}]", **kwargs)
    except Exception:
        dataset = load_dataset(dataset_name, split=split, **kwargs)
        dataset = dataset.select(range(min(num_samples, len(dataset))))
    df = pd.DataFrame(dataset)
    print(f"{len(df)} rows, columns: {list(df.columns)}")
    for column in df.columns:
        print(f"--- {column} ---")
        for i, sample in enumerate(df[column].dropna().head(5), 1):
            text = str(sample)
            print(f"  sample {i}: {text[:500]}")
    return df

def save_fields_to_parquet(df, fields, path="output/approved.parquet"):
    os.makedirs(os.path.dirname(path), exist_ok=True)
    df[fields].to_parquet(path, index=False)
    print(f"saved {len(df)} rows to {path}")
"#;

/// Lowercased alphanumeric tokens of length >= 3
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SnippetRegistry {
        let mut reg = SnippetRegistry::new();
        reg.register(Snippet::Full {
            name: "timeseries".to_string(),
            description: "time series decomposition seasonal trend analysis".to_string(),
            code: "from statsmodels.tsa.seasonal import seasonal_decompose".to_string(),
        });
        reg.register(Snippet::Core {
            name: "dataset-report".to_string(),
            description: "dataset quality report missing values column statistics".to_string(),
            backend_code: "def quality_report(df): ...".to_string(),
            usage: "quality_report(df)".to_string(),
        });
        reg
    }

    #[test]
    fn test_retrieve_picks_best_overlap() {
        let reg = registry();
        let hit = reg
            .retrieve("run a quality report on the dataset columns")
            .unwrap();
        assert_eq!(hit.name(), "dataset-report");
    }

    #[test]
    fn test_retrieve_requires_min_hits() {
        let reg = registry();
        assert!(reg.retrieve("plot a histogram").is_none());
        // A single shared token is below the threshold.
        assert!(reg.retrieve("analysis of variance").is_none());
    }

    #[test]
    fn test_render_full_mode_mentions_modification() {
        let reg = registry();
        let hit = reg.retrieve("seasonal trend decomposition").unwrap();
        let block = hit.render();
        assert!(block.contains("modify it appropriately"));
        assert!(block.contains("seasonal_decompose"));
    }

    #[test]
    fn test_render_core_mode_mentions_backend() {
        let reg = registry();
        let hit = reg.retrieve("dataset quality report").unwrap();
        let block = hit.render();
        assert!(block.contains("already defined"));
        assert!(block.contains("core_function"));
    }

    #[test]
    fn test_bundled_registry_serves_dataset_queries() {
        let reg = bundled();
        let hit = reg
            .retrieve("load a hugging face dataset and preview the samples")
            .unwrap();
        assert_eq!(hit.name(), "hf-dataset-analyzer");
        assert!(hit.render().contains("load_dataset"));
    }

    #[test]
    fn test_backend_cells_only_core() {
        let reg = registry();
        let cells: Vec<&str> = reg.backend_cells().collect();
        assert_eq!(cells, vec!["def quality_report(df): ..."]);
    }
}
