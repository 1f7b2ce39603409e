//! Data split tags.

use serde::{Deserialize, Serialize};

/// Which part of the data a frame, loader or metric belongs to.
///
/// # Example
///
/// ```rust
/// use neuralprophet_core::Split;
///
/// assert_eq!(Split::Valid.metric_name("MAE"), "MAE_val");
/// assert_eq!(Split::Train.metric_name("MAE"), "MAE");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Split {
    /// Training data: shuffled, weighted, regularized.
    #[default]
    Train,
    /// Validation data evaluated after every epoch.
    Valid,
    /// Holdout data evaluated once by `test`.
    Test,
}

impl Split {
    /// Check if this is the training split.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    /// Check if this is an evaluation split (valid or test).
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        matches!(self, Split::Valid | Split::Test)
    }

    /// Column name of a metric reported for this split.
    ///
    /// Validation metrics carry a `_val` suffix so that they can sit next to
    /// the training metrics in one table.
    #[must_use]
    pub fn metric_name(&self, metric: &str) -> String {
        match self {
            Split::Valid => format!("{metric}_val"),
            Split::Train | Split::Test => metric.to_string(),
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Valid => write!(f, "valid"),
            Split::Test => write!(f, "test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_checks() {
        assert!(Split::Train.is_train());
        assert!(!Split::Train.is_eval());
        assert!(Split::Valid.is_eval());
        assert!(Split::Test.is_eval());
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Split::Valid.metric_name("RMSE"), "RMSE_val");
        assert_eq!(Split::Test.metric_name("RMSE"), "RMSE");
    }

    #[test]
    fn test_split_display() {
        assert_eq!(format!("{}", Split::Valid), "valid");
    }
}
