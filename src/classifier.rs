/// Extension-based file classification.
///
/// Maps a file extension to one of the configured categories. When an extension
/// is listed under more than one category, the category declared later wins.
///
/// # Examples
///
/// ```
/// use fileorg::classifier::{Classifier, ClassificationReason};
/// use fileorg::config::CategoryRule;
/// use std::path::Path;
///
/// let rules = vec![
///     CategoryRule::new("media", &["jpg"]),
///     CategoryRule::new("others", &[]),
/// ];
/// let classifier = Classifier::new(&rules, true);
///
/// let hit = classifier.classify(Path::new("photo.JPG")).unwrap();
/// assert_eq!(hit.category, "media");
/// assert_eq!(hit.reason, ClassificationReason::MatchExtension);
///
/// let fallback = classifier.classify(Path::new("notes.xyz")).unwrap();
/// assert_eq!(fallback.category, "others");
/// ```
use crate::catalog::extension_of;
use crate::config::CategoryRule;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Name of the fallback category for unmatched extensions.
pub const OTHERS: &str = "others";

/// Why a file landed in its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassificationReason {
    /// The extension is listed under the category.
    MatchExtension,
    /// No category matched and the fallback is enabled.
    Others,
}

impl ClassificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationReason::MatchExtension => "match-extension",
            ClassificationReason::Others => "others",
        }
    }
}

impl fmt::Display for ClassificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The category chosen for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub reason: ClassificationReason,
}

/// Maps file extensions to categories.
#[derive(Debug, Clone)]
pub struct Classifier {
    extension_map: HashMap<String, String>,
    fallback: Option<String>,
}

impl Classifier {
    /// Builds the extension lookup by walking the categories in order.
    ///
    /// The fallback is used only when an `others` category exists and
    /// `others_enabled` is set.
    pub fn new(categories: &[CategoryRule], others_enabled: bool) -> Self {
        let mut extension_map = HashMap::new();
        for rule in categories {
            for ext in &rule.extensions {
                extension_map.insert(ext.clone(), rule.name.clone());
            }
        }

        let has_others = categories.iter().any(|rule| rule.name == OTHERS);
        Self {
            extension_map,
            fallback: (others_enabled && has_others).then(|| OTHERS.to_string()),
        }
    }

    /// Maps a lowercase, dot-less extension to its category.
    pub fn extension_to_category(&self, ext: &str) -> Option<&str> {
        self.extension_map.get(ext).map(String::as_str)
    }

    /// Classifies a file by extension. Returns `None` when the file should be
    /// left out of the plan.
    pub fn classify(&self, path: &Path) -> Option<Classification> {
        let ext = extension_of(path);
        if let Some(category) = self.extension_to_category(&ext) {
            return Some(Classification {
                category: category.to_string(),
                reason: ClassificationReason::MatchExtension,
            });
        }

        self.fallback.as_ref().map(|category| Classification {
            category: category.clone(),
            reason: ClassificationReason::Others,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<CategoryRule> {
        vec![
            CategoryRule::new("media", &["jpg", "png"]),
            CategoryRule::new("docs", &["pdf", "txt"]),
            CategoryRule::new("others", &[]),
        ]
    }

    #[test]
    fn test_classify_case_insensitive() {
        let classifier = Classifier::new(&rules(), true);
        assert_eq!(
            classifier.classify(Path::new("/a/REPORT.PDF")).unwrap().category,
            "docs"
        );
    }

    #[test]
    fn test_later_category_wins() {
        let mut rules = rules();
        rules.push(CategoryRule::new("images", &["png"]));
        let classifier = Classifier::new(&rules, true);

        assert_eq!(classifier.extension_to_category("png"), Some("images"));
        assert_eq!(classifier.extension_to_category("jpg"), Some("media"));
    }

    #[test]
    fn test_others_requires_flag_and_category() {
        let with_flag = Classifier::new(&rules(), true);
        let without_flag = Classifier::new(&rules(), false);
        let without_category = Classifier::new(&rules()[..2], true);

        let unknown = Path::new("archive.xyz");
        assert_eq!(
            with_flag.classify(unknown).unwrap().reason,
            ClassificationReason::Others
        );
        assert!(without_flag.classify(unknown).is_none());
        assert!(without_category.classify(unknown).is_none());
    }

    #[test]
    fn test_file_without_extension_goes_to_others() {
        let classifier = Classifier::new(&rules(), true);
        assert_eq!(
            classifier.classify(Path::new("Makefile")).unwrap().category,
            OTHERS
        );
    }
}
