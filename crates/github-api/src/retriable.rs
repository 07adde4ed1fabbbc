use crate::error::GithubError;

/// Whether a failed request is worth retrying as a whole job later.
///
/// Anything without a usable status (network, timeout, decode errors) fails
/// open and is treated as retriable.
pub fn is_retriable_error(err: &GithubError) -> bool {
    match err {
        GithubError::EmptyToken | GithubError::MissingToken | GithubError::InvalidUrl(_) => false,
        GithubError::TokenValidation(inner) => is_retriable_error(inner),
        _ => err.status().is_none_or(is_retriable_status),
    }
}

/// 408, 429 and every 5xx are transient. Other statuses are not.
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn status(code: u16) -> GithubError {
        GithubError::Status {
            context: "notifications",
            status: code,
            body: String::new(),
        }
    }

    #[rstest]
    #[case(408, true)]
    #[case(429, true)]
    #[case(500, true)]
    #[case(502, true)]
    #[case(503, true)]
    #[case(504, true)]
    #[case(400, false)]
    #[case(401, false)]
    #[case(403, false)]
    #[case(404, false)]
    #[case(410, false)]
    #[case(422, false)]
    fn test_status_classification(#[case] code: u16, #[case] expected: bool) {
        assert_eq!(is_retriable_error(&status(code)), expected);
    }

    #[test]
    fn test_unparsable_errors_fail_open() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(is_retriable_error(&GithubError::Json(err)));
    }

    #[test]
    fn test_local_configuration_errors_are_permanent() {
        assert!(!is_retriable_error(&GithubError::EmptyToken));
        assert!(!is_retriable_error(&GithubError::MissingToken));
        let err = url::Url::parse("not a url").unwrap_err();
        assert!(!is_retriable_error(&GithubError::InvalidUrl(err)));
    }

    #[test]
    fn test_token_validation_uses_probe_status() {
        let err = GithubError::TokenValidation(Box::new(status(401)));
        assert!(!is_retriable_error(&err));
        let err = GithubError::TokenValidation(Box::new(status(503)));
        assert!(is_retriable_error(&err));
    }
}
