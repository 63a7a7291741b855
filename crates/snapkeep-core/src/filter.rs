use std::path::PathBuf;

/// One rsync filter-family rule, tagged by kind. Stored as an ordered list
/// (never re-sorted or grouped by kind) since the sync tool's matching
/// behavior depends on the declaration order of include/exclude/filter
/// rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    Include(String),
    Exclude(String),
    IncludeFile(PathBuf),
    ExcludeFile(PathBuf),
    Filter(String),
}

impl FilterRule {
    pub fn to_arg(&self) -> String {
        match self {
            FilterRule::Include(pattern) => format!("--include={pattern}"),
            FilterRule::Exclude(pattern) => format!("--exclude={pattern}"),
            FilterRule::IncludeFile(path) => format!("--include-from={}", path.display()),
            FilterRule::ExcludeFile(path) => format!("--exclude-from={}", path.display()),
            FilterRule::Filter(rule) => format!("--filter={rule}"),
        }
    }
}

/// Expand an ordered rule list into the sync tool's flags, in the exact
/// order the rules were declared.
pub fn rules_to_args(rules: &[FilterRule]) -> Vec<String> {
    rules.iter().map(FilterRule::to_arg).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_declaration_order() {
        let rules = vec![
            FilterRule::Include("*.txt".into()),
            FilterRule::Exclude("*".into()),
            FilterRule::Filter("merge /etc/snapkeep/common.filter".into()),
        ];
        assert_eq!(
            rules_to_args(&rules),
            vec![
                "--include=*.txt".to_string(),
                "--exclude=*".to_string(),
                "--filter=merge /etc/snapkeep/common.filter".to_string(),
            ]
        );
    }
}
