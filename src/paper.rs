use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a paper's content ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    OpenAccess,
    ElsevierApi,
    Proxy,
    Arxiv,
    #[default]
    Unresolved,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::OpenAccess => "open_access",
            Source::ElsevierApi => "elsevier_api",
            Source::Proxy => "proxy",
            Source::Arxiv => "arxiv",
            Source::Unresolved => "unresolved",
        }
    }
}

/// A fetched academic paper. Created once per fetch call and progressively
/// enriched by the fallback chain; once `full_text` is non-empty no later
/// stage overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Paper {
    pub doi: String,
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub year: Option<u32>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub full_text: String,
    pub figures: Vec<String>,
    pub references: Vec<String>,
    pub source: Source,
    pub pdf_path: Option<PathBuf>,
    pub url: String,
}

impl Paper {
    pub fn new(doi: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            doi: doi.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// True once some stage produced readable content.
    pub fn has_content(&self) -> bool {
        !self.full_text.is_empty() || !self.abstract_text.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Markdown rendering for MCP consumption.
    pub fn to_markdown(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        let title = if self.title.is_empty() { "Untitled" } else { &self.title };
        lines.push(format!("# {}", title));
        lines.push(String::new());
        if !self.authors.is_empty() {
            lines.push(format!("**Authors:** {}", self.authors.join(", ")));
        }
        if !self.journal.is_empty() {
            lines.push(format!("**Journal:** {}", self.journal));
        }
        if let Some(year) = self.year {
            lines.push(format!("**Year:** {}", year));
        }
        if !self.doi.is_empty() {
            lines.push(format!("**DOI:** {}", self.doi));
        }
        lines.push(format!("**Source:** {}", self.source.as_str()));
        lines.push(String::new());

        if !self.abstract_text.is_empty() {
            lines.push("## Abstract".into());
            lines.push(String::new());
            lines.push(self.abstract_text.clone());
            lines.push(String::new());
        }
        if !self.full_text.is_empty() {
            lines.push("## Full Text".into());
            lines.push(String::new());
            lines.push(self.full_text.clone());
            lines.push(String::new());
        }
        if !self.figures.is_empty() {
            lines.push("## Figures".into());
            lines.push(String::new());
            for (i, fig) in self.figures.iter().enumerate() {
                lines.push(format!("**Figure {}:** {}", i + 1, fig));
            }
            lines.push(String::new());
        }
        if !self.references.is_empty() {
            lines.push("## References".into());
            lines.push(String::new());
            for r in &self.references {
                lines.push(format!("- {}", r));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Minimal plain-text rendering (title, abstract, body).
    pub fn to_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.title.is_empty() {
            parts.push(&self.title);
        }
        if !self.abstract_text.is_empty() {
            parts.push(&self.abstract_text);
        }
        if !self.full_text.is_empty() {
            parts.push(&self.full_text);
        }
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Paper {
        Paper {
            doi: "10.1038/nphys1509".into(),
            title: "Quantum physics".into(),
            authors: vec!["A. Author".into(), "B. Author".into()],
            journal: "Nature Physics".into(),
            year: Some(2010),
            abstract_text: "An abstract.".into(),
            full_text: "Body text.".into(),
            source: Source::Arxiv,
            ..Default::default()
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let paper = sample();
        let json = paper.to_json().unwrap();
        assert!(json.contains("\"abstract\""), "serde rename to `abstract` expected");
        assert!(json.contains("\"source\": \"arxiv\""));
        let back: Paper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, paper);
    }

    #[test]
    fn test_markdown_rendering() {
        let md = sample().to_markdown();
        assert!(md.starts_with("# Quantum physics"));
        assert!(md.contains("**Authors:** A. Author, B. Author"));
        assert!(md.contains("## Abstract"));
        assert!(md.contains("## Full Text"));
    }

    #[test]
    fn test_default_source_is_unresolved() {
        assert_eq!(Paper::default().source, Source::Unresolved);
    }
}
