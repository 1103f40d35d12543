use super::*;

#[test]
fn token_failures_are_authoritative() {
    assert!(AuthError::TokenExpired.is_authoritative());
    assert!(AuthError::TokenInvalid.is_authoritative());
    assert!(!AuthError::NetworkUnavailable("refused".into()).is_authoritative());
    assert!(!AuthError::CredentialsInvalid.is_authoritative());
}

#[test]
fn only_network_failures_are_transient() {
    assert!(AuthError::NetworkUnavailable("timeout".into()).is_transient());
    assert!(!AuthError::Upstream("502".into()).is_transient());
    assert!(!AuthError::TokenExpired.is_transient());
}

#[test]
fn credentials_message_does_not_echo_input() {
    let msg = AuthError::CredentialsInvalid.user_message();
    assert_eq!(msg, "Invalid email or password.");
}

#[test]
fn display_includes_detail() {
    let err = AuthError::StorageUnavailable("read-only filesystem".into());
    assert!(err.to_string().contains("read-only filesystem"));
}
