/// Policy for collapsing several simultaneously-due interval classes into
/// one tick's worth of materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    Single,
    Hardlink,
    Symlink,
}

impl OverlapPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "single" => Some(Self::Single),
            "hardlink" => Some(Self::Hardlink),
            "symlink" => Some(Self::Symlink),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasMode {
    Hardlink,
    Symlink,
}

/// The materialization work for one tick of one repository: exactly one
/// physical snapshot, plus zero or more aliased siblings sharing its
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializationPlan {
    pub physical_class: String,
    pub alias_classes: Vec<String>,
    pub alias_mode: Option<AliasMode>,
}

/// Resolve which classes get materialized this tick. `due_classes` must
/// already be in declared class-priority order (the caller walks
/// `Repository::intervals` and keeps only the ones `IntervalClock::is_due`
/// returned true for) — the first entry always wins the physical slot.
pub fn resolve(due_classes: &[String], policy: OverlapPolicy) -> Option<MaterializationPlan> {
    let (first, rest) = due_classes.split_first()?;
    let (alias_classes, alias_mode) = match policy {
        OverlapPolicy::Single => (Vec::new(), None),
        OverlapPolicy::Hardlink => (rest.to_vec(), Some(AliasMode::Hardlink)),
        OverlapPolicy::Symlink => (rest.to_vec(), Some(AliasMode::Symlink)),
    };
    Some(MaterializationPlan {
        physical_class: first.clone(),
        alias_classes,
        alias_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn due(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_due_classes_yields_no_plan() {
        assert!(resolve(&[], OverlapPolicy::Single).is_none());
    }

    #[test]
    fn single_policy_materializes_only_first() {
        let plan = resolve(&due(&["hourly", "daily"]), OverlapPolicy::Single).unwrap();
        assert_eq!(plan.physical_class, "hourly");
        assert!(plan.alias_classes.is_empty());
        assert!(plan.alias_mode.is_none());
    }

    #[test]
    fn hardlink_policy_aliases_the_rest() {
        let plan = resolve(&due(&["hourly", "daily", "weekly"]), OverlapPolicy::Hardlink).unwrap();
        assert_eq!(plan.physical_class, "hourly");
        assert_eq!(plan.alias_classes, vec!["daily", "weekly"]);
        assert_eq!(plan.alias_mode, Some(AliasMode::Hardlink));
    }

    #[test]
    fn symlink_policy_aliases_the_rest() {
        let plan = resolve(&due(&["daily", "weekly"]), OverlapPolicy::Symlink).unwrap();
        assert_eq!(plan.physical_class, "daily");
        assert_eq!(plan.alias_classes, vec!["weekly"]);
        assert_eq!(plan.alias_mode, Some(AliasMode::Symlink));
    }

    #[test]
    fn single_due_class_has_no_aliases_regardless_of_policy() {
        for policy in [OverlapPolicy::Single, OverlapPolicy::Hardlink, OverlapPolicy::Symlink] {
            let plan = resolve(&due(&["hourly"]), policy).unwrap();
            assert!(plan.alias_classes.is_empty());
        }
    }
}
