//! Pattern-driven translation from raw Git / GitHub errors to user-facing
//! remediation records.
//!
//! The catalog is an ordered list of data records; ordering is load-bearing
//! (timeout matches before the broader network pattern, GH009 before the
//! generic push failure). HTTP-status errors are mapped by a fixed table
//! first, then enriched by substring scanning of the remote message.

use regex::{Captures, Regex};
use serde::Serialize;

use crate::errors::AppError;

// ── Model ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Authentication,
    Authorization,
    Network,
    GitOperation,
    MergeConflict,
    PushProtection,
    RateLimit,
    NotFound,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslatedError {
    pub user_message: String,
    pub technical_details: String,
    pub suggested_actions: Vec<String>,
    pub severity: Severity,
    pub category: Category,
    pub code: Option<String>,
    pub affected_files: Vec<String>,
}

impl TranslatedError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category,
            Category::Authentication
                | Category::Network
                | Category::RateLimit
                | Category::MergeConflict
        )
    }

    pub fn is_category(&self, category: Category) -> bool {
        self.category == category
    }

    pub fn primary_action(&self) -> Option<&str> {
        self.suggested_actions.first().map(String::as_str)
    }
}

// ── Catalog records ─────────────────────────────────────────────────────

enum MessageSpec {
    Static(&'static str),
    Dynamic(fn(&Captures) -> String),
}

struct ErrorPattern {
    regex: Regex,
    category: Category,
    severity: Severity,
    code: Option<&'static str>,
    message: MessageSpec,
    actions: &'static [&'static str],
    file_extractor: Option<fn(&str) -> Vec<String>>,
}

fn conflict_files(text: &str) -> Vec<String> {
    // Two conflict-specific patterns; the affected set is their union.
    let res = [
        Regex::new(r"Merge conflict in (.+)").expect("conflict regex"),
        Regex::new(r"CONFLICT \([^)]+\):\s*(?:Merge conflict in\s*)?(.+)").expect("conflict regex"),
    ];
    let mut files = Vec::new();
    for re in &res {
        for caps in re.captures_iter(text) {
            let file = caps[1].trim().to_string();
            if !file.is_empty() && !files.contains(&file) {
                files.push(file);
            }
        }
    }
    files
}

fn behind_message(caps: &Captures) -> String {
    match caps.get(1) {
        Some(n) => format!(
            "Your branch is {} commit(s) behind the remote. Pull the latest changes before pushing.",
            n.as_str()
        ),
        None => "The remote has changes you don't have yet. Pull before pushing.".to_string(),
    }
}

fn pathspec_message(caps: &Captures) -> String {
    format!(
        "Git couldn't find anything matching '{}'. Check the name and try again.",
        caps.get(1).map(|m| m.as_str()).unwrap_or("?")
    )
}

fn lock_ref_message(caps: &Captures) -> String {
    format!(
        "Git couldn't update the branch '{}' — another operation may be holding it.",
        caps.get(1).map(|m| m.as_str()).unwrap_or("?")
    )
}

fn branch_exists_message(caps: &Captures) -> String {
    format!(
        "A branch named '{}' already exists.",
        caps.get(1).map(|m| m.as_str()).unwrap_or("?")
    )
}

fn branch_unmerged_message(caps: &Captures) -> String {
    format!(
        "The branch '{}' has work that hasn't been merged yet.",
        caps.get(1).map(|m| m.as_str()).unwrap_or("?")
    )
}

/// Specific → general; first match wins.
fn build_catalog() -> Vec<ErrorPattern> {
    fn p(
        pattern: &str,
        category: Category,
        severity: Severity,
        code: Option<&'static str>,
        message: MessageSpec,
        actions: &'static [&'static str],
        file_extractor: Option<fn(&str) -> Vec<String>>,
    ) -> ErrorPattern {
        ErrorPattern {
            regex: Regex::new(pattern).expect("catalog regex"),
            category,
            severity,
            code,
            message,
            actions,
            file_extractor,
        }
    }

    vec![
        p(
            r"(?i)GH009|push\s.*declined\s.*secret|secret[s]?\s+detected",
            Category::PushProtection,
            Severity::Critical,
            Some("GH009"),
            MessageSpec::Static(
                "GitHub blocked this push because it detected a secret (a password, key, or token) in your changes.",
            ),
            &[
                "Remove the secret from the file GitHub pointed at",
                "Save the file",
                "Try pushing again",
            ],
            None,
        ),
        p(
            r"(?i)GH013|repository rule violations",
            Category::PushProtection,
            Severity::Critical,
            Some("GH013"),
            MessageSpec::Static(
                "GitHub blocked this push because it violates a rule configured for this repository.",
            ),
            &[
                "Review the rule violation GitHub reported",
                "Adjust your changes to satisfy the rule",
                "Try pushing again",
            ],
            None,
        ),
        p(
            r"(?i)Authentication failed",
            Category::Authentication,
            Severity::Error,
            None,
            MessageSpec::Static("GitHub didn't accept your credentials. You'll need to sign in again."),
            &["Run `authenticate_github` to sign in again"],
            None,
        ),
        p(
            r"(?i)Permission denied \(publickey\)",
            Category::Authentication,
            Severity::Error,
            None,
            MessageSpec::Static("GitHub rejected the connection. You'll need to sign in again."),
            &["Run `authenticate_github` to sign in again"],
            None,
        ),
        p(
            r"(?i)\b401\b|bad credentials|invalid token",
            Category::Authentication,
            Severity::Error,
            None,
            MessageSpec::Static("Your GitHub session is no longer valid."),
            &["Run `authenticate_github` to sign in again"],
            None,
        ),
        p(
            r"(?i)\b403\b|permission denied|forbidden",
            Category::Authorization,
            Severity::Error,
            None,
            MessageSpec::Static(
                "You don't have permission to do that on this repository. Ask the repository owner for access.",
            ),
            &["Ask the repository owner to grant you write access"],
            None,
        ),
        p(
            r"(?i)(?:(\d+)\s+commits?\s+behind)|non-fast-forward|fetch first|tip of your current branch is behind",
            Category::GitOperation,
            Severity::Warning,
            None,
            MessageSpec::Dynamic(behind_message),
            &["Run `git_pull` to get the latest changes", "Then push again"],
            None,
        ),
        p(
            r"(?i)remote rejected|failed to push",
            Category::GitOperation,
            Severity::Error,
            None,
            MessageSpec::Static("GitHub rejected the push."),
            &["Pull the latest changes and try again"],
            None,
        ),
        p(
            r"(?i)CONFLICT \(content\)|Merge conflict in|Automatic merge failed",
            Category::MergeConflict,
            Severity::Error,
            None,
            MessageSpec::Static(
                "Your changes overlap with changes someone else made. The conflicting files need to be resolved by hand.",
            ),
            &[
                "Open each conflicted file and choose which version to keep",
                "Save the files",
                "Run `save_changes` to finish the merge",
            ],
            Some(conflict_files),
        ),
        p(
            r"(?i)Your local changes .*would be overwritten",
            Category::MergeConflict,
            Severity::Warning,
            None,
            MessageSpec::Static(
                "You have unsaved work that would be overwritten. Save your changes first.",
            ),
            &["Run `save_changes` to commit your work", "Then retry"],
            None,
        ),
        p(
            r"(?i)'origin' does not appear to be a git repository",
            Category::Network,
            Severity::Error,
            None,
            MessageSpec::Static("The repository's remote address is missing or broken."),
            &["Re-clone the repository with `clone_and_setup_repo`"],
            None,
        ),
        p(
            r"(?i)not a git repository",
            Category::GitOperation,
            Severity::Error,
            None,
            MessageSpec::Static("That folder isn't a Git repository."),
            &["Clone the repository first with `clone_and_setup_repo`"],
            None,
        ),
        p(
            r"(?i)pathspec '([^']+)' did not match",
            Category::GitOperation,
            Severity::Error,
            None,
            MessageSpec::Dynamic(pathspec_message),
            &["Check the branch or file name and try again"],
            None,
        ),
        p(
            r"(?i)cannot lock ref 'refs/heads/([^']+)'",
            Category::GitOperation,
            Severity::Error,
            None,
            MessageSpec::Dynamic(lock_ref_message),
            &["Wait a moment and try again"],
            None,
        ),
        // Timeout is deliberately ahead of the broader network pattern.
        p(
            r"(?i)timed? ?out|timeout",
            Category::Network,
            Severity::Error,
            None,
            MessageSpec::Static("The connection to GitHub timed out."),
            &["Check your internet connection", "Try again in a moment"],
            None,
        ),
        p(
            r"(?i)could not resolve host|unable to access|network is unreachable",
            Category::Network,
            Severity::Error,
            None,
            MessageSpec::Static("GitHub couldn't be reached."),
            &["Check your internet connection", "Try again in a moment"],
            None,
        ),
        p(
            r"(?i)SSL certificate problem",
            Category::Network,
            Severity::Error,
            None,
            MessageSpec::Static("There's a secure-connection problem between you and GitHub."),
            &["Check your network; a proxy or firewall may be interfering"],
            None,
        ),
        p(
            r"(?i)nothing to commit|working tree clean",
            Category::GitOperation,
            Severity::Info,
            None,
            MessageSpec::Static("There's nothing to save — no files have changed."),
            &["Make some changes first, then run `save_changes`"],
            None,
        ),
        p(
            r"(?i)Already up to date",
            Category::GitOperation,
            Severity::Info,
            None,
            MessageSpec::Static("Everything is already up to date."),
            &[],
            None,
        ),
        p(
            r"(?i)branch(?: named)? '([^']+)' already exists",
            Category::GitOperation,
            Severity::Warning,
            None,
            MessageSpec::Dynamic(branch_exists_message),
            &["Switch to the existing branch, or pick a different name"],
            None,
        ),
        p(
            r"(?i)branch '([^']+)' is not fully merged",
            Category::GitOperation,
            Severity::Warning,
            None,
            MessageSpec::Dynamic(branch_unmerged_message),
            &[
                "Merge or push the branch before deleting it",
                "Or delete with force if the work is disposable",
            ],
            None,
        ),
    ]
}

// ── HTTP status table ───────────────────────────────────────────────────

fn http_entry(status: u16) -> Option<(Category, Severity, &'static str, &'static [&'static str])> {
    Some(match status {
        400 => (
            Category::Validation,
            Severity::Error,
            "GitHub didn't understand the request.",
            &["Check the values you provided and try again"],
        ),
        401 => (
            Category::Authentication,
            Severity::Error,
            "Your GitHub session has expired.",
            &["Run `authenticate_github` to sign in again"],
        ),
        403 => (
            Category::Authorization,
            Severity::Error,
            "GitHub refused this request — you may not have permission.",
            &["Ask the repository owner to grant you access"],
        ),
        404 => (
            Category::NotFound,
            Severity::Error,
            "GitHub couldn't find that. It may have been deleted, renamed, or you may not have access.",
            &["Check the repository name", "Run `list_repositories` to see what you can access"],
        ),
        409 => (
            Category::GitOperation,
            Severity::Error,
            "GitHub reported a conflict with the current state of the repository.",
            &["Pull the latest changes and try again"],
        ),
        422 => (
            Category::Validation,
            Severity::Error,
            "GitHub rejected the request as invalid.",
            &["Check the values you provided and try again"],
        ),
        429 => (
            Category::RateLimit,
            Severity::Warning,
            "GitHub is asking us to slow down.",
            &["Wait a minute and try again"],
        ),
        500 => (
            Category::Network,
            Severity::Error,
            "GitHub had an internal error.",
            &["Wait a moment and try again"],
        ),
        502 | 503 => (
            Category::Network,
            Severity::Warning,
            "GitHub is temporarily unavailable.",
            &["Wait a minute and try again"],
        ),
        _ => return None,
    })
}

// ── Translator ──────────────────────────────────────────────────────────

pub struct ErrorTranslator {
    catalog: Vec<ErrorPattern>,
}

impl Default for ErrorTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorTranslator {
    pub fn new() -> Self {
        Self {
            catalog: build_catalog(),
        }
    }

    pub fn translate(&self, error: &AppError) -> TranslatedError {
        // Internal kinds are never surfaced verbatim.
        match error {
            AppError::NotAuthenticated => {
                return TranslatedError {
                    user_message: "You're not signed in to GitHub, or your session expired."
                        .to_string(),
                    technical_details: error.to_string(),
                    suggested_actions: vec![
                        "Run `authenticate_github` to sign in".to_string(),
                    ],
                    severity: Severity::Error,
                    category: Category::Authentication,
                    code: None,
                    affected_files: Vec::new(),
                }
            }
            AppError::TierLimit(detail) => {
                return TranslatedError {
                    user_message: format!(
                        "You've reached a limit of your current plan ({detail})."
                    ),
                    technical_details: error.to_string(),
                    suggested_actions: vec![
                        "Upgrade your plan to raise the limit".to_string(),
                        "Or remove a repository you no longer use".to_string(),
                    ],
                    severity: Severity::Warning,
                    category: Category::Validation,
                    code: None,
                    affected_files: Vec::new(),
                }
            }
            AppError::NotCloned => {
                return TranslatedError {
                    user_message: "This repository isn't set up on your computer yet.".to_string(),
                    technical_details: error.to_string(),
                    suggested_actions: vec![
                        "Run `clone_and_setup_repo` to set it up".to_string(),
                    ],
                    severity: Severity::Error,
                    category: Category::NotFound,
                    code: None,
                    affected_files: Vec::new(),
                }
            }
            AppError::NotFound(entity) => {
                return TranslatedError {
                    user_message: format!("I couldn't find that {entity}."),
                    technical_details: error.to_string(),
                    suggested_actions: vec![
                        "Check the id and try again".to_string(),
                        "Run `list_repositories` or `list_sessions` to see what exists".to_string(),
                    ],
                    severity: Severity::Error,
                    category: Category::NotFound,
                    code: None,
                    affected_files: Vec::new(),
                }
            }
            AppError::Validation(message) => {
                return TranslatedError {
                    user_message: message.clone(),
                    technical_details: error.to_string(),
                    suggested_actions: vec!["Adjust the input and try again".to_string()],
                    severity: Severity::Warning,
                    category: Category::Validation,
                    code: None,
                    affected_files: Vec::new(),
                }
            }
            _ => {}
        }

        if let Some(status) = error.http_status() {
            if let Some(translated) = self.translate_http(status, &error.raw_text()) {
                return translated;
            }
        }

        self.translate_text(&error.raw_text())
    }

    /// HTTP status table plus substring enrichment of the remote message.
    fn translate_http(&self, status: u16, remote_message: &str) -> Option<TranslatedError> {
        let (category, severity, message, actions) = http_entry(status)?;
        let mut translated = TranslatedError {
            user_message: message.to_string(),
            technical_details: format!("HTTP {status}: {remote_message}"),
            suggested_actions: actions.iter().map(|s| s.to_string()).collect(),
            severity,
            category,
            code: Some(format!("HTTP_{status}")),
            affected_files: Vec::new(),
        };

        let lower = remote_message.to_lowercase();
        if lower.contains("secondary rate limit") {
            translated.category = Category::RateLimit;
            translated.severity = Severity::Warning;
            translated.user_message =
                "GitHub flagged too many rapid requests (secondary rate limit).".to_string();
            translated.suggested_actions =
                vec!["Wait a few minutes before trying again".to_string()];
        } else if lower.contains("rate limit") {
            translated.category = Category::RateLimit;
            translated.severity = Severity::Warning;
            translated.user_message =
                "GitHub's rate limit was reached.".to_string();
            translated.suggested_actions = vec!["Wait a minute and try again".to_string()];
        } else if lower.contains("secret") || lower.contains("push protection") {
            translated.category = Category::PushProtection;
            translated.severity = Severity::Critical;
            translated.user_message =
                "GitHub blocked this because it detected a secret in the content.".to_string();
            translated.suggested_actions = vec![
                "Remove the secret from your changes".to_string(),
                "Try again once it's removed".to_string(),
            ];
        }

        Some(translated)
    }

    /// Walk the ordered regex catalog; first match wins.
    pub fn translate_text(&self, raw: &str) -> TranslatedError {
        for pattern in &self.catalog {
            let Some(caps) = pattern.regex.captures(raw) else {
                continue;
            };
            let user_message = match &pattern.message {
                MessageSpec::Static(text) => (*text).to_string(),
                MessageSpec::Dynamic(f) => f(&caps),
            };
            let affected_files = pattern
                .file_extractor
                .map(|extract| extract(raw))
                .unwrap_or_default();
            return TranslatedError {
                user_message,
                technical_details: raw.to_string(),
                suggested_actions: pattern.actions.iter().map(|s| s.to_string()).collect(),
                severity: pattern.severity,
                category: pattern.category,
                code: pattern.code.map(String::from),
                affected_files,
            };
        }

        TranslatedError {
            user_message:
                "Something went wrong. You can try again, or ask me for help with what you were doing."
                    .to_string(),
            technical_details: raw.to_string(),
            suggested_actions: vec!["Try the same action again".to_string()],
            severity: Severity::Error,
            category: Category::Unknown,
            code: None,
            affected_files: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ErrorTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorTranslator")
            .field("patterns", &self.catalog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> ErrorTranslator {
        ErrorTranslator::new()
    }

    #[test]
    fn gh009_is_push_protection_critical() {
        let out = t().translate_text("remote: error: GH009: Secrets detected!");
        assert_eq!(out.category, Category::PushProtection);
        assert_eq!(out.severity, Severity::Critical);
        assert_eq!(out.code.as_deref(), Some("GH009"));
    }

    #[test]
    fn gh013_is_push_protection() {
        let out = t().translate_text("GH013: Repository rule violations found");
        assert_eq!(out.category, Category::PushProtection);
        assert_eq!(out.code.as_deref(), Some("GH013"));
    }

    #[test]
    fn auth_failures() {
        let out = t().translate_text("fatal: Authentication failed for 'https://github.com/a/b.git'");
        assert_eq!(out.category, Category::Authentication);
        let out = t().translate_text("git@github.com: Permission denied (publickey).");
        assert_eq!(out.category, Category::Authentication);
        let out = t().translate_text("Bad credentials");
        assert_eq!(out.category, Category::Authentication);
    }

    #[test]
    fn forbidden_is_authorization() {
        let out = t().translate_text("The requested URL returned error: 403 Forbidden");
        assert_eq!(out.category, Category::Authorization);
    }

    #[test]
    fn behind_count_is_interpolated() {
        let out = t().translate_text("Your branch is 3 commits behind 'origin/main'");
        assert_eq!(out.category, Category::GitOperation);
        assert_eq!(out.severity, Severity::Warning);
        assert!(out.user_message.contains("3 commit(s) behind"));
    }

    #[test]
    fn non_fast_forward_is_warning() {
        let out = t().translate_text("! [rejected] main -> main (non-fast-forward)");
        assert_eq!(out.category, Category::GitOperation);
        assert_eq!(out.severity, Severity::Warning);
    }

    #[test]
    fn merge_conflict_collects_files() {
        let raw = "Auto-merging src/app.rs\n\
                   CONFLICT (content): Merge conflict in src/app.rs\n\
                   CONFLICT (content): Merge conflict in src/db.rs\n\
                   Automatic merge failed; fix conflicts and then commit the result.";
        let out = t().translate_text(raw);
        assert_eq!(out.category, Category::MergeConflict);
        assert!(out.affected_files.contains(&"src/app.rs".to_string()));
        assert!(out.affected_files.contains(&"src/db.rs".to_string()));
    }

    #[test]
    fn local_changes_overwritten_is_warning() {
        let out = t().translate_text(
            "error: Your local changes to the following files would be overwritten by merge:",
        );
        assert_eq!(out.category, Category::MergeConflict);
        assert_eq!(out.severity, Severity::Warning);
    }

    #[test]
    fn origin_missing_is_network_not_git() {
        let out = t().translate_text("fatal: 'origin' does not appear to be a git repository");
        assert_eq!(out.category, Category::Network);
    }

    #[test]
    fn not_a_repo_is_git_operation() {
        let out = t().translate_text("fatal: not a git repository (or any of the parent directories): .git");
        assert_eq!(out.category, Category::GitOperation);
    }

    #[test]
    fn pathspec_quotes_the_name() {
        let out = t().translate_text("error: pathspec 'feature/missing' did not match any file(s) known to git");
        assert!(out.user_message.contains("'feature/missing'"));
    }

    #[test]
    fn timeout_wins_over_generic_network() {
        let out = t().translate_text(
            "fatal: unable to access 'https://github.com/a/b.git/': Operation timed out",
        );
        assert_eq!(out.category, Category::Network);
        assert!(out.user_message.contains("timed out"));
    }

    #[test]
    fn network_unreachable() {
        let out = t().translate_text("fatal: unable to access 'https://github.com/a/b.git/': Could not resolve host: github.com");
        assert_eq!(out.category, Category::Network);
    }

    #[test]
    fn clean_tree_is_info() {
        let out = t().translate_text("nothing to commit, working tree clean");
        assert_eq!(out.severity, Severity::Info);
        assert_eq!(out.category, Category::GitOperation);
    }

    #[test]
    fn already_up_to_date_is_info() {
        let out = t().translate_text("Already up to date.");
        assert_eq!(out.severity, Severity::Info);
    }

    #[test]
    fn branch_exists_is_warning() {
        let out = t().translate_text("fatal: a branch named 'feature/x' already exists");
        assert_eq!(out.severity, Severity::Warning);
        assert!(out.user_message.contains("'feature/x'"));
    }

    #[test]
    fn branch_not_merged_is_warning() {
        let out = t().translate_text("error: the branch 'feature/x' is not fully merged");
        assert_eq!(out.severity, Severity::Warning);
    }

    #[test]
    fn unmatched_input_is_unknown() {
        let out = t().translate_text("zorp gleeble frobnicated");
        assert_eq!(out.category, Category::Unknown);
        assert_eq!(out.severity, Severity::Error);
    }

    #[test]
    fn http_429_is_recoverable_rate_limit() {
        let err = AppError::GitHub {
            status: 429,
            message: "API rate limit exceeded".into(),
        };
        let out = t().translate(&err);
        assert_eq!(out.category, Category::RateLimit);
        assert_eq!(out.severity, Severity::Warning);
        assert!(out.is_recoverable());
    }

    #[test]
    fn http_403_with_rate_limit_is_enriched() {
        let err = AppError::GitHub {
            status: 403,
            message: "You have exceeded a secondary rate limit.".into(),
        };
        let out = t().translate(&err);
        assert_eq!(out.category, Category::RateLimit);
        assert_eq!(out.severity, Severity::Warning);
    }

    #[test]
    fn http_with_push_protection_is_enriched() {
        let err = AppError::GitHub {
            status: 422,
            message: "push protection: secret scanning blocked this".into(),
        };
        let out = t().translate(&err);
        assert_eq!(out.category, Category::PushProtection);
        assert_eq!(out.severity, Severity::Critical);
    }

    #[test]
    fn internal_kinds_are_not_surfaced_verbatim() {
        let out = t().translate(&AppError::NotAuthenticated);
        assert_eq!(out.category, Category::Authentication);
        assert!(out.user_message.contains("signed in"));

        let out = t().translate(&AppError::NotCloned);
        assert!(out.user_message.contains("isn't set up"));

        let out = t().translate(&AppError::TierLimit("5 repositories".into()));
        assert!(out.user_message.contains("limit"));
    }

    #[test]
    fn predicates_read_the_record() {
        let out = t().translate_text("fatal: Authentication failed for 'https://github.com/a/b'");
        assert!(out.is_category(Category::Authentication));
        assert!(!out.is_category(Category::Network));
        assert_eq!(
            out.primary_action(),
            Some("Run `authenticate_github` to sign in again")
        );
    }

    #[test]
    fn recoverability_matches_category_set() {
        for (category, recoverable) in [
            (Category::Authentication, true),
            (Category::Network, true),
            (Category::RateLimit, true),
            (Category::MergeConflict, true),
            (Category::GitOperation, false),
            (Category::PushProtection, false),
            (Category::Unknown, false),
        ] {
            let te = TranslatedError {
                user_message: String::new(),
                technical_details: String::new(),
                suggested_actions: vec![],
                severity: Severity::Error,
                category,
                code: None,
                affected_files: vec![],
            };
            assert_eq!(te.is_recoverable(), recoverable, "{category:?}");
        }
    }
}
