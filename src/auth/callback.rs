use crate::auth::dto::CallbackParams;
use crate::auth::repo_types::CodeKind;

pub const LOGIN_PATH: &str = "/login";
pub const RESET_PATH: &str = "/auth/reset";

/// Where the callback sends the browser once it has looked at the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackStep {
    /// Provider reported an error or the code is missing.
    Fail(String),
    /// Exchange the code, then continue to the reset page or `next`.
    Exchange { code: String, recovery: bool, next: String },
}

pub fn plan(params: &CallbackParams) -> CallbackStep {
    if let Some(err) = params.error.as_deref().filter(|e| !e.is_empty()) {
        if let Some(detail) = params.error_description.as_deref() {
            tracing::debug!(%detail, "provider error detail");
        }
        return CallbackStep::Fail(err.to_string());
    }
    match params.code.as_deref().filter(|c| !c.is_empty()) {
        Some(code) => CallbackStep::Exchange {
            code: code.to_string(),
            recovery: params.kind.as_deref() == Some(CodeKind::Recovery.as_str()),
            next: sanitize_next(params.next.as_deref()),
        },
        None => CallbackStep::Fail("missing_code".into()),
    }
}

/// Only same-site absolute paths are honored; anything else lands on `/`.
pub fn sanitize_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n.to_string(),
        _ => "/".to_string(),
    }
}

pub fn login_redirect(error: &str) -> String {
    format!("{}?error={}", LOGIN_PATH, urlencoding::encode(error))
}

/// Destination after a successful exchange.
pub fn success_redirect(kind: CodeKind, recovery_requested: bool, next: String) -> String {
    if recovery_requested || kind == CodeKind::Recovery {
        RESET_PATH.to_string()
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(code: Option<&str>, error: Option<&str>, kind: Option<&str>, next: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(Into::into),
            error: error.map(Into::into),
            error_description: None,
            kind: kind.map(Into::into),
            next: next.map(Into::into),
        }
    }

    #[test]
    fn error_wins_over_code() {
        let step = plan(&params(Some("abc"), Some("access_denied"), None, None));
        assert_eq!(step, CallbackStep::Fail("access_denied".into()));
    }

    #[test]
    fn missing_code_fails() {
        assert_eq!(
            plan(&params(None, None, None, Some("/calendar"))),
            CallbackStep::Fail("missing_code".into())
        );
    }

    #[test]
    fn recovery_type_is_flagged() {
        match plan(&params(Some("abc"), None, Some("recovery"), None)) {
            CallbackStep::Exchange { code, recovery, next } => {
                assert_eq!(code, "abc");
                assert!(recovery);
                assert_eq!(next, "/");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn next_must_be_local() {
        assert_eq!(sanitize_next(Some("/calendar?view=week")), "/calendar?view=week");
        assert_eq!(sanitize_next(Some("//evil.example")), "/");
        assert_eq!(sanitize_next(Some("https://evil.example")), "/");
        assert_eq!(sanitize_next(Some("/\\evil.example")), "/");
        assert_eq!(sanitize_next(None), "/");
    }

    #[test]
    fn redirects() {
        assert_eq!(login_redirect("bad code"), "/login?error=bad%20code");
        assert_eq!(success_redirect(CodeKind::Recovery, false, "/x".into()), RESET_PATH);
        assert_eq!(success_redirect(CodeKind::Magiclink, true, "/x".into()), RESET_PATH);
        assert_eq!(success_redirect(CodeKind::Magiclink, false, "/x".into()), "/x");
    }
}
