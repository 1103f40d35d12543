use super::*;
use serde_json::json;

// =============================================================================
// SessionToken
// =============================================================================

#[test]
fn session_token_rejects_empty() {
    assert!(SessionToken::new("").is_none());
    assert!(SessionToken::new("   ").is_none());
}

#[test]
fn session_token_debug_hides_secret() {
    let token = SessionToken::new("super-secret-value").unwrap();
    let debug = format!("{token:?}");
    assert!(!debug.contains("super-secret-value"));
    assert!(debug.contains(&token.fingerprint()));
}

#[test]
fn session_token_fingerprint_is_stable_hex() {
    let a = SessionToken::new("abc").unwrap();
    let b = SessionToken::new("abc").unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.fingerprint().len(), 12);
    assert!(a.fingerprint().chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn bytes_to_hex_leading_zero() {
    assert_eq!(bytes_to_hex(&[0x0a, 0xff]), "0aff");
}

// =============================================================================
// Credentials
// =============================================================================

#[test]
fn credentials_debug_redacts_password() {
    let creds = Credentials::new("ada@example.com", "hunter2");
    let debug = format!("{creds:?}");
    assert!(debug.contains("ada@example.com"));
    assert!(!debug.contains("hunter2"));
}

// =============================================================================
// UserIdentity::from_payload
// =============================================================================

#[test]
fn from_payload_camel_case_with_roles() {
    let payload = json!({
        "id": "u-1",
        "firstName": "Ada",
        "lastName": "Lovelace",
        "email": "ada@example.com",
        "roles": ["tutor", "parent"]
    });
    let user = UserIdentity::from_payload(&payload).unwrap();
    assert_eq!(user.id, "u-1");
    assert_eq!(user.first_name, "Ada");
    assert_eq!(user.last_name, "Lovelace");
    assert_eq!(user.roles, RoleSet::from([Role::Tutor, Role::Parent]));
}

#[test]
fn from_payload_snake_case_single_role_and_numeric_id() {
    let payload = json!({
        "id": 42,
        "first_name": "Sam",
        "last_name": "Okafor",
        "email": "sam@example.com",
        "role": "student"
    });
    let user = UserIdentity::from_payload(&payload).unwrap();
    assert_eq!(user.id, "42");
    assert_eq!(user.roles, RoleSet::from([Role::Student]));
}

#[test]
fn from_payload_unwraps_user_envelope() {
    let payload = json!({ "user": { "id": "u-2", "email": "x@example.com", "roles": [] } });
    let user = UserIdentity::from_payload(&payload).unwrap();
    assert_eq!(user.id, "u-2");
    assert!(user.roles.is_empty());
}

#[test]
fn from_payload_drops_unknown_roles() {
    let payload = json!({ "id": "u-3", "email": "x@example.com", "roles": ["admin", "Superuser", "ADMIN"] });
    let user = UserIdentity::from_payload(&payload).unwrap();
    assert_eq!(user.roles, RoleSet::from([Role::Admin]));
}

#[test]
fn from_payload_rejects_missing_id() {
    let payload = json!({ "email": "x@example.com" });
    let err = UserIdentity::from_payload(&payload).unwrap_err();
    assert!(matches!(err, AuthError::InvalidIdentity(_)));
}

#[test]
fn from_payload_rejects_malformed_email() {
    for email in ["", "nobody", "a@b@c", "@example.com"] {
        let payload = json!({ "id": "u", "email": email });
        assert!(UserIdentity::from_payload(&payload).is_err(), "accepted {email:?}");
    }
}

#[test]
fn from_payload_rejects_non_string_roles() {
    let payload = json!({ "id": "u", "email": "x@example.com", "roles": [1, 2] });
    assert!(UserIdentity::from_payload(&payload).is_err());
    let payload = json!({ "id": "u", "email": "x@example.com", "roles": "admin" });
    assert!(UserIdentity::from_payload(&payload).is_err());
}

#[test]
fn from_payload_rejects_non_object() {
    assert!(UserIdentity::from_payload(&json!(["admin"])).is_err());
    assert!(UserIdentity::from_payload(&json!(null)).is_err());
}

#[test]
fn display_name_falls_back_to_email() {
    let payload = json!({ "id": "u", "email": "quiet@example.com" });
    let user = UserIdentity::from_payload(&payload).unwrap();
    assert_eq!(user.display_name(), "quiet@example.com");
}

#[test]
fn identity_serde_round_trip_keeps_roles() {
    let user = UserIdentity {
        id: "u-9".into(),
        first_name: "Lee".into(),
        last_name: "Chen".into(),
        email: "lee@example.com".into(),
        roles: RoleSet::from([Role::Admin, Role::Tutor]),
    };
    let json = serde_json::to_value(&user).unwrap();
    assert_eq!(json["roles"], json!(["admin", "tutor"]));
    let restored = UserIdentity::from_payload(&json).unwrap();
    assert_eq!(restored, user);
}
