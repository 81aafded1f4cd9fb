//! Predicates that select a subset of validators.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::core::code::Code;
use crate::validator::Validator;

/// Predicate over a validator.
#[derive(Clone)]
pub struct Filter(Arc<dyn Fn(&dyn Validator) -> bool + Send + Sync>);

impl Filter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&dyn Validator) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn matches(&self, validator: &dyn Validator) -> bool {
        (self.0)(validator)
    }

    /// True when every filter matches. An empty slice matches everything.
    pub fn all(filters: &[Filter], validator: &dyn Validator) -> bool {
        filters.iter().all(|filter| filter.matches(validator))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter(..)")
    }
}

/// Select validators whose code is one of `codes`.
pub fn matches_codes<I>(codes: I) -> Filter
where
    I: IntoIterator<Item = Code>,
{
    let wanted: BTreeSet<Code> = codes.into_iter().collect();
    Filter::new(move |validator| wanted.contains(&validator.code()))
}

/// Negate `filter`.
pub fn not(filter: Filter) -> Filter {
    Filter::new(move |validator| !filter.matches(validator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{code, scripted_success};

    #[test]
    fn matches_codes_selects_members_only() {
        let first = scripted_success(1);
        let second = scripted_success(2);
        let filter = matches_codes([code(1), code(7)]);
        assert!(filter.matches(first.as_ref()));
        assert!(!filter.matches(second.as_ref()));
    }

    #[test]
    fn empty_code_set_matches_nothing() {
        let validator = scripted_success(1);
        assert!(!matches_codes(Vec::<Code>::new()).matches(validator.as_ref()));
    }

    #[test]
    fn not_inverts_predicate() {
        let validator = scripted_success(1);
        assert!(!not(matches_codes([code(1)])).matches(validator.as_ref()));
        assert!(not(matches_codes([code(2)])).matches(validator.as_ref()));
    }

    #[test]
    fn all_requires_every_filter() {
        let validator = scripted_success(3);
        assert!(Filter::all(&[], validator.as_ref()));
        assert!(Filter::all(
            &[matches_codes([code(3), code(4)]), not(matches_codes([code(4)]))],
            validator.as_ref()
        ));
        assert!(!Filter::all(
            &[matches_codes([code(3)]), not(matches_codes([code(3)]))],
            validator.as_ref()
        ));
    }
}
