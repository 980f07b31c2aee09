//! Branch-name derivation for the smart-commit rule.

/// Branches on which direct commits are never made; `save_changes` branches
/// off to a feature branch first. Compared case-insensitively.
pub const PROTECTED_BRANCHES: &[&str] = &["main", "master", "develop", "development"];

pub const SLUG_MAX_LEN: usize = 50;

pub fn is_protected_branch(name: &str) -> bool {
    PROTECTED_BRANCHES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(name))
}

/// Deterministic slug for a commit message: lowercase, strip everything
/// outside `[a-z0-9 -]`, collapse runs, hyphenate, truncate to 50 chars.
/// Idempotent: `slugify(slugify(s)) == slugify(s)`.
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ' || *c == '-')
        .collect();

    let mut slug = String::with_capacity(cleaned.len());
    let mut last_was_hyphen = true; // suppress leading hyphens
    for c in cleaned.chars() {
        let mapped = if c == ' ' { '-' } else { c };
        if mapped == '-' {
            if !last_was_hyphen {
                slug.push('-');
                last_was_hyphen = true;
            }
        } else {
            slug.push(mapped);
            last_was_hyphen = false;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.len() > SLUG_MAX_LEN {
        slug.truncate(SLUG_MAX_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Feature-branch name for a commit message made on a protected branch.
/// `feature-`/`fix-`/`hotfix-` slugs become `feature/…` etc.; anything else
/// gets a `feature/` prefix.
pub fn branch_name_for_message(message: &str) -> String {
    let slug = slugify(message);
    for prefix in ["feature-", "fix-", "hotfix-"] {
        if let Some(rest) = slug.strip_prefix(prefix) {
            return format!("{}/{rest}", &prefix[..prefix.len() - 1]);
        }
    }
    if slug.is_empty() {
        return "feature/update".to_string();
    }
    format!("feature/{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_branches_are_case_insensitive() {
        assert!(is_protected_branch("main"));
        assert!(is_protected_branch("Master"));
        assert!(is_protected_branch("DEVELOP"));
        assert!(is_protected_branch("development"));
        assert!(!is_protected_branch("feature/main"));
        assert!(!is_protected_branch("maint"));
    }

    #[test]
    fn slug_basic() {
        assert_eq!(slugify("Add login page"), "add-login-page");
    }

    #[test]
    fn slug_strips_punctuation_and_collapses() {
        assert_eq!(
            slugify("Testing smart commit - auto-branching from master"),
            "testing-smart-commit-auto-branching-from-master"
        );
        assert_eq!(slugify("Fix: the  bug!!"), "fix-the-bug");
    }

    #[test]
    fn slug_is_idempotent() {
        for input in [
            "Add login page",
            "Testing smart commit - auto-branching from master",
            "  weird   spacing -- and units (v2.0)  ",
            "ALL CAPS",
        ] {
            let once = slugify(input);
            assert_eq!(slugify(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn slug_bounded_at_50() {
        let long = "this is a very long commit message that keeps going and going beyond fifty characters";
        let slug = slugify(long);
        assert!(slug.len() <= SLUG_MAX_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn branch_name_default_prefix() {
        assert_eq!(
            branch_name_for_message("Testing smart commit - auto-branching from master"),
            "feature/testing-smart-commit-auto-branching-from-master"
        );
    }

    #[test]
    fn branch_name_recognizes_conventional_prefixes() {
        assert_eq!(branch_name_for_message("fix the login bug"), "fix/the-login-bug");
        assert_eq!(
            branch_name_for_message("feature add search"),
            "feature/add-search"
        );
        assert_eq!(
            branch_name_for_message("hotfix crash on startup"),
            "hotfix/crash-on-startup"
        );
    }

    #[test]
    fn branch_name_for_empty_message() {
        assert_eq!(branch_name_for_message("!!!"), "feature/update");
    }
}
