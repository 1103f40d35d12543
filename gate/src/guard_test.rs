use super::*;
use crate::identity::SessionToken;
use crate::role::Role;

fn authenticated(roles: &[Role]) -> AuthStatus {
    AuthStatus::Authenticated {
        user: UserIdentity {
            id: "u1".into(),
            first_name: "Kim".into(),
            last_name: "Ito".into(),
            email: "kim@example.com".into(),
            roles: roles.iter().copied().collect(),
        },
        token: SessionToken::new("tok").unwrap(),
    }
}

fn all_role_subsets() -> Vec<RoleSet> {
    (0u8..16)
        .map(|mask| {
            Role::ALL
                .into_iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, role)| role)
                .collect()
        })
        .collect()
}

// =============================================================================
// decide
// =============================================================================

#[test]
fn loading_renders_placeholder_without_redirect() {
    let admin_only = RoleSet::from([Role::Admin]);
    assert_eq!(decide(&AuthStatus::Loading, &admin_only, "/admin"), GuardDecision::Pending);
    assert_eq!(decide(&AuthStatus::Uninitialized, &admin_only, "/admin"), GuardDecision::Pending);
}

#[test]
fn unauthenticated_redirects_to_login_with_return_path() {
    let decision = decide(&AuthStatus::Unauthenticated, &RoleSet::new(), "/dashboard/sessions");
    assert_eq!(decision, GuardDecision::Redirect("/login?next=%2Fdashboard%2Fsessions".into()));
}

#[test]
fn tutor_denied_admin_area() {
    let decision = decide(&authenticated(&[Role::Tutor]), &RoleSet::from([Role::Admin]), "/admin");
    assert_eq!(decision, GuardDecision::Redirect("/unauthorized".into()));
}

#[test]
fn empty_requirement_admits_any_authenticated_user() {
    assert_eq!(decide(&authenticated(&[]), &RoleSet::new(), "/dashboard"), GuardDecision::Render);
    assert_eq!(decide(&authenticated(&[Role::Student]), &RoleSet::new(), "/dashboard"), GuardDecision::Render);
}

#[test]
fn any_shared_role_is_enough() {
    let allowed = RoleSet::from([Role::Admin, Role::Tutor]);
    assert_eq!(decide(&authenticated(&[Role::Parent, Role::Tutor]), &allowed, "/x"), GuardDecision::Render);
}

#[test]
fn renders_iff_authenticated_and_roles_intersect() {
    let subsets = all_role_subsets();
    for required in &subsets {
        for held in &subsets {
            let held_roles: Vec<Role> = held.iter().collect();
            let decision = decide(&authenticated(&held_roles), required, "/area");
            let expected = required.is_empty() || required.intersects(held);
            assert_eq!(decision == GuardDecision::Render, expected, "required={required} held={held}");
        }
        assert_ne!(decide(&AuthStatus::Unauthenticated, required, "/area"), GuardDecision::Render);
        assert_eq!(decide(&AuthStatus::Loading, required, "/area"), GuardDecision::Pending);
    }
}

// =============================================================================
// login_redirect
// =============================================================================

#[test]
fn login_redirect_skips_root() {
    assert_eq!(login_redirect("/login", "/"), "/login");
    assert_eq!(login_redirect("/login", ""), "/login");
}

#[test]
fn login_redirect_encodes_query() {
    assert_eq!(login_redirect("/login", "/tutor?week=2"), "/login?next=%2Ftutor%3Fweek%3D2");
}

// =============================================================================
// RouteGuard
// =============================================================================

#[test]
fn for_path_uses_table_paths() {
    let table = RouteTable { unauthorized_path: "/403".into(), ..RouteTable::default() };
    let guard = RouteGuard::for_path(&table, "/parent/invoices").unwrap();
    assert_eq!(guard.allowed_roles, RoleSet::from([Role::Parent]));
    assert_eq!(guard.decide(&authenticated(&[Role::Student]), "/parent/invoices"), GuardDecision::Redirect("/403".into()));
}

#[test]
fn for_path_is_none_outside_protected_areas() {
    let table = RouteTable::default();
    assert!(RouteGuard::for_path(&table, "/login").is_none());
    assert!(RouteGuard::for_path(&table, "/about").is_none());
}

#[test]
fn apply_never_renders_children_when_denied() {
    let guard = RouteGuard::new(RoleSet::from([Role::Admin]));
    let snapshot = AuthSnapshot { status: authenticated(&[Role::Tutor]), error: None };
    let mut rendered = false;
    let outcome = guard.apply(&snapshot, "/admin", |_| {
        rendered = true;
    });
    assert_eq!(outcome, Guarded::Redirect("/unauthorized".into()));
    assert!(!rendered);
}

#[test]
fn apply_renders_with_user() {
    let guard = RouteGuard::any_authenticated();
    let snapshot = AuthSnapshot { status: authenticated(&[Role::Student]), error: None };
    let outcome = guard.apply(&snapshot, "/dashboard", |user| user.display_name());
    assert_eq!(outcome, Guarded::Rendered("Kim Ito".to_owned()));
}

#[test]
fn apply_pending_while_loading() {
    let guard = RouteGuard::any_authenticated();
    let snapshot = AuthSnapshot { status: AuthStatus::Loading, error: None };
    let outcome = guard.apply(&snapshot, "/dashboard", |_| "children");
    assert_eq!(outcome, Guarded::Pending);
}
