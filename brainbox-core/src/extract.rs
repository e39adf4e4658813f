//! Artifact extraction from a finished tutor response.
//!
//! Runs once over the final text, never per chunk, so a fence split across
//! chunk boundaries cannot produce a partial match.

/// Marker the tutor prints before a code example.
pub const CODE_EXAMPLE_MARKER: &str = "Code Example";

const FENCE: &str = "```";

/// Code and hints found in a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub code: Option<String>,
    pub hints: Vec<String>,
}

/// Apply the extraction rules to the final text.
///
/// A response announcing a code example yields the first fenced block tagged
/// with `language`. Otherwise a response mentioning "hint" (any case) is kept
/// whole as a single hint. The two rules never both apply.
pub fn extract_artifacts(text: &str, language: &str) -> Artifacts {
    if text.contains(CODE_EXAMPLE_MARKER) {
        Artifacts {
            code: extract_code_block(text, language),
            hints: Vec::new(),
        }
    } else if text.to_lowercase().contains("hint") {
        Artifacts {
            code: None,
            hints: vec![text.to_string()],
        }
    } else {
        Artifacts::default()
    }
}

/// Text between "```<language>" and the next closing fence.
///
/// Returns `None` when the opening fence is missing or never closed.
pub fn extract_code_block(text: &str, language: &str) -> Option<String> {
    let opening = format!("{FENCE}{language}");
    let start = text.find(&opening)?;
    let body_start = start + opening.len();
    let end = text[body_start..].find(FENCE)?;
    Some(text[body_start..body_start + end].to_string())
}

/// Ordered hint collection that ignores repeats of an identical hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintBoard {
    hints: Vec<String>,
}

impl HintBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hint. Returns `false` if the same text was already recorded.
    pub fn push(&mut self, hint: impl Into<String>) -> bool {
        let hint = hint.into();
        if self.hints.contains(&hint) {
            return false;
        }
        self.hints.push(hint);
        true
    }

    /// Add every hint of a response, returning how many were new.
    pub fn extend<I, S>(&mut self, hints: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for hint in hints {
            if self.push(hint) {
                added += 1;
            }
        }
        added
    }

    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn clear(&mut self) {
        self.hints.clear();
    }
}
