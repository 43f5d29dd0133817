//! Scorecard definitions: task selection and field-name translation.

use std::collections::BTreeMap;

use taiga_forest::{FeatureId, TaskId};

/// One exported scorecard: a task plus its feature-to-field-name table.
///
/// A model may be exported through several scorecards, including several
/// over the same task with different field vocabularies.
#[derive(Debug, Clone)]
pub struct Scorecard {
    name: String,
    task: TaskId,
    filter: Option<String>,
    fields: BTreeMap<FeatureId, String>,
}

impl Scorecard {
    /// Create a scorecard over one task.
    #[must_use]
    pub fn new(name: impl Into<String>, task: TaskId) -> Self {
        Self {
            name: name.into(),
            task,
            filter: None,
            fields: BTreeMap::new(),
        }
    }

    /// Set the scorecard's row-filter expression.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Map one feature number to a field name.
    #[must_use]
    pub fn with_field(mut self, feature: FeatureId, name: impl Into<String>) -> Self {
        self.fields.insert(feature, name.into());
        self
    }

    /// Replace the whole field-name table.
    #[must_use]
    pub fn with_fields(mut self, fields: BTreeMap<FeatureId, String>) -> Self {
        self.fields = fields;
        self
    }

    /// Return the scorecard name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the task the scorecard exports.
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Return the filter expression, if any.
    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Look up the field name for a feature.
    #[must_use]
    pub fn field(&self, feature: FeatureId) -> Option<&str> {
        self.fields.get(&feature).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_round_trip() {
        let card = Scorecard::new("risk", TaskId::new(2))
            .with_filter("region = 'EU'")
            .with_field(FeatureId::new(1), "age")
            .with_field(FeatureId::new(2), "income");
        assert_eq!(card.name(), "risk");
        assert_eq!(card.task(), TaskId::new(2));
        assert_eq!(card.filter(), Some("region = 'EU'"));
        assert_eq!(card.field(FeatureId::new(2)), Some("income"));
        assert_eq!(card.field(FeatureId::new(3)), None);
    }
}
