//! Target selection: which containers an action applies to.
//!
//! Selection runs fresh on every action invocation:
//! 1. list containers from the engine;
//! 2. keep those matching the name set or pattern plus every label filter,
//!    dropping self- and skip-labelled containers;
//! 3. truncate to `limit` (listing order);
//! 4. optionally collapse to one random container.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use std::str::FromStr;

use crate::container::Container;
use crate::engine::ContainerEngine;
use crate::error::{EngineError, ValidationError};

/// One `--label` filter: `key=value` requires equality, bare `key` presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    /// Label key.
    pub key: String,
    /// Required value, or `None` for presence only.
    pub value: Option<String>,
}

impl LabelFilter {
    /// Filter requiring `key == value`.
    pub fn equals(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: Some(value.to_string()),
        }
    }

    /// Filter requiring `key` to be present.
    pub fn exists(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
        }
    }

    /// Whether the container satisfies this filter.
    pub fn matches(&self, container: &Container) -> bool {
        match (&self.value, container.labels.get(&self.key)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(want), Some(have)) => want == have,
        }
    }
}

impl FromStr for LabelFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = match s.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim().to_string())),
            None => (s.trim(), None),
        };
        if key.is_empty() {
            return Err(ValidationError::InvalidLabel(s.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            value,
        })
    }
}

/// What to select.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionCriteria {
    /// Exact names (OR-matched); tolerant of a leading `/`.
    pub names: Vec<String>,
    /// RE2 pattern matched against the whole name. Ignored when names are given.
    pub pattern: Option<String>,
    /// Label filters, all of which must match.
    pub labels: Vec<LabelFilter>,
    /// Maximum number of containers; 0 means unlimited.
    pub limit: usize,
}

impl SelectionCriteria {
    /// Build the per-container predicate.
    ///
    /// A pattern that fails to compile rejects every container.
    pub fn matcher(&self) -> impl Fn(&Container) -> bool + '_ {
        let pattern = match (&self.pattern, self.names.is_empty()) {
            (Some(p), true) => Some(compile_pattern(p)),
            _ => None,
        };

        move |c: &Container| {
            if c.is_self() || c.is_skipped() {
                return false;
            }
            if !self.labels.iter().all(|l| l.matches(c)) {
                return false;
            }
            match &pattern {
                Some(Some(re)) => re.is_match(&c.name) || re.is_match(c.trimmed_name()),
                Some(None) => false,
                None if self.names.is_empty() => true,
                None => self
                    .names
                    .iter()
                    .any(|n| n == &c.name || n == c.trimmed_name()),
            }
        }
    }
}

/// Anchor the pattern so it must match the whole name.
fn compile_pattern(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid name pattern, matching nothing");
            None
        }
    }
}

/// Apply criteria, limit and random choice to an already-listed set.
pub fn filter(containers: Vec<Container>, criteria: &SelectionCriteria, random: bool) -> Vec<Container> {
    let matches = criteria.matcher();
    let mut selected: Vec<Container> = containers.into_iter().filter(|c| matches(c)).collect();

    if criteria.limit > 0 {
        selected.truncate(criteria.limit);
    }

    if random {
        selected = pick_random(selected);
    }

    selected
}

/// Collapse to one uniformly chosen container (empty stays empty).
pub fn pick_random(containers: Vec<Container>) -> Vec<Container> {
    let mut rng = StdRng::from_entropy();
    containers
        .choose(&mut rng)
        .cloned()
        .into_iter()
        .collect()
}

/// List running containers from `engine` and select targets.
///
/// Zero matches is an empty, successful result.
pub async fn select(
    engine: &dyn ContainerEngine,
    criteria: &SelectionCriteria,
    random: bool,
) -> Result<Vec<Container>, EngineError> {
    let containers = engine.list_containers(false).await?;
    let total = containers.len();
    let selected = filter(containers, criteria, random);
    tracing::debug!(total, selected = selected.len(), "selected target containers");
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{SELF_LABEL, SKIP_LABEL};
    use crate::engine::MockEngine;

    fn containers() -> Vec<Container> {
        vec![
            Container::new("1", "/web-1").with_label("tier", "front"),
            Container::new("2", "/web-2").with_label("tier", "front"),
            Container::new("3", "/db").with_label("tier", "back"),
            Container::new("4", "/ruckus").with_label(SELF_LABEL, "true"),
            Container::new("5", "/web-skip").with_label(SKIP_LABEL, "true"),
        ]
    }

    fn names(cs: &[Container]) -> Vec<&str> {
        cs.iter().map(|c| c.trimmed_name()).collect()
    }

    #[test]
    fn empty_criteria_selects_all_but_self_and_skip() {
        let selected = filter(containers(), &SelectionCriteria::default(), false);
        assert_eq!(names(&selected), vec!["web-1", "web-2", "db"]);
    }

    #[test]
    fn names_match_with_or_without_slash() {
        let criteria = SelectionCriteria {
            names: vec!["web-1".into(), "/db".into()],
            ..Default::default()
        };
        let selected = filter(containers(), &criteria, false);
        assert_eq!(names(&selected), vec!["web-1", "db"]);
    }

    #[test]
    fn skip_label_excludes_named_container() {
        let criteria = SelectionCriteria {
            names: vec!["web-skip".into(), "ruckus".into()],
            ..Default::default()
        };
        assert!(filter(containers(), &criteria, false).is_empty());
    }

    #[test]
    fn pattern_is_full_match() {
        let criteria = SelectionCriteria {
            pattern: Some("web-\\d".into()),
            ..Default::default()
        };
        let selected = filter(containers(), &criteria, false);
        assert_eq!(names(&selected), vec!["web-1", "web-2"]);

        let partial = SelectionCriteria {
            pattern: Some("web".into()),
            ..Default::default()
        };
        assert!(filter(containers(), &partial, false).is_empty());
    }

    #[test]
    fn pattern_matches_raw_name_too() {
        let criteria = SelectionCriteria {
            pattern: Some("/db".into()),
            ..Default::default()
        };
        assert_eq!(names(&filter(containers(), &criteria, false)), vec!["db"]);
    }

    #[test]
    fn invalid_pattern_matches_nothing() {
        let criteria = SelectionCriteria {
            pattern: Some("web-(".into()),
            ..Default::default()
        };
        assert!(filter(containers(), &criteria, false).is_empty());
    }

    #[test]
    fn labels_apply_in_addition() {
        let criteria = SelectionCriteria {
            pattern: Some(".*".into()),
            labels: vec![LabelFilter::equals("tier", "front")],
            ..Default::default()
        };
        assert_eq!(
            names(&filter(containers(), &criteria, false)),
            vec!["web-1", "web-2"]
        );

        let presence = SelectionCriteria {
            labels: vec![LabelFilter::exists("tier")],
            ..Default::default()
        };
        assert_eq!(filter(containers(), &presence, false).len(), 3);
    }

    #[test]
    fn limit_keeps_listing_order() {
        let criteria = SelectionCriteria {
            limit: 2,
            ..Default::default()
        };
        assert_eq!(
            names(&filter(containers(), &criteria, false)),
            vec!["web-1", "web-2"]
        );
    }

    #[test]
    fn random_returns_exactly_one() {
        for _ in 0..20 {
            let selected = filter(containers(), &SelectionCriteria::default(), true);
            assert_eq!(selected.len(), 1);
            assert!(["web-1", "web-2", "db"].contains(&selected[0].trimmed_name()));
        }
    }

    #[test]
    fn random_on_empty_is_empty() {
        let criteria = SelectionCriteria {
            names: vec!["nope".into()],
            ..Default::default()
        };
        assert!(filter(containers(), &criteria, true).is_empty());
    }

    #[test]
    fn label_filter_parse() {
        assert_eq!(
            "app=web".parse::<LabelFilter>().unwrap(),
            LabelFilter::equals("app", "web")
        );
        assert_eq!(
            "app".parse::<LabelFilter>().unwrap(),
            LabelFilter::exists("app")
        );
        assert!("=x".parse::<LabelFilter>().is_err());
    }

    #[tokio::test]
    async fn select_lists_running_containers() {
        let engine = MockEngine::with_containers(containers());
        let selected = select(&engine, &SelectionCriteria::default(), false)
            .await
            .unwrap();
        assert_eq!(selected.len(), 3);
        assert_eq!(
            engine.calls(),
            vec![crate::engine::EngineCall::List { all: false }]
        );
    }

    #[tokio::test]
    async fn select_propagates_listing_error() {
        let engine = MockEngine::with_containers(containers());
        engine.fail_next_list("daemon down");
        assert!(select(&engine, &SelectionCriteria::default(), false)
            .await
            .is_err());
    }
}
