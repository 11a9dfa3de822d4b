use crate::domain::models::FindingKind;

/// An editable rule table used to screen project ideas.
pub trait PatternSet: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> FindingKind;

    /// Feasibility points deducted when the set matches
    fn penalty(&self) -> u32;

    /// Message attached to a finding from this set
    fn message(&self) -> &str;

    /// Distinct terms of `text` that match; empty when the set does not apply
    fn matches(&self, text: &str) -> Vec<String>;
}
