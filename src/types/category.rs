//! Category labels assigned to responses

use serde::{Deserialize, Serialize};

use crate::{DISQUALIFIED_LABEL, UNCATEGORIZED_LABEL};

/// Trim and case-fold before any comparison of responses or labels
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Classifier output: a sentinel or one exact taxonomy entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CategoryLabel {
    /// Invalid response (nonsense, irrelevant, repeats the object name)
    Disqualified,
    /// Legitimate but outside the taxonomy
    Uncategorized,
    /// Taxonomy entry
    Category(String),
}

impl CategoryLabel {
    pub fn as_str(&self) -> &str {
        match self {
            CategoryLabel::Disqualified => DISQUALIFIED_LABEL,
            CategoryLabel::Uncategorized => UNCATEGORIZED_LABEL,
            CategoryLabel::Category(name) => name,
        }
    }

    pub fn is_disqualified(&self) -> bool {
        matches!(self, CategoryLabel::Disqualified)
    }

    /// Case/whitespace-folded form used for set membership
    pub fn normalized(&self) -> String {
        normalize(self.as_str())
    }
}

impl From<String> for CategoryLabel {
    fn from(raw: String) -> Self {
        match normalize(&raw).as_str() {
            "disqualified" => CategoryLabel::Disqualified,
            "uncategorized" => CategoryLabel::Uncategorized,
            _ => CategoryLabel::Category(raw.trim().to_string()),
        }
    }
}

impl From<CategoryLabel> for String {
    fn from(label: CategoryLabel) -> Self {
        label.as_str().to_string()
    }
}

impl std::fmt::Display for CategoryLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
