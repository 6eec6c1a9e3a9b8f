//! Integration tests for the route guards.

use std::sync::Arc;
use std::time::Duration;

use aop_auth::guard::{AuthorizedProfile, cancellable};
use aop_auth::{GuardKind, GuardState, GuardView, RouteGuard, SessionConfig, SessionManager};
use aop_backend::MemoryBackend;
use aop_backend::memory::Faults;
use aop_core::models::identity::Identity;
use aop_core::models::profile::UserRole;
use aop_core::models::session::Session;
use aop_core::routes::{Redirect, RouteAccess, resolve};
use tokio_util::sync::CancellationToken;

type Guard = RouteGuard<MemoryBackend, MemoryBackend, MemoryBackend>;

fn guard(backend: &MemoryBackend, kind: GuardKind) -> Guard {
    let sessions = SessionManager::new(backend.clone(), backend.clone(), SessionConfig::default());
    RouteGuard::new(sessions, backend.clone(), kind)
}

/// Helper: backend with a signed-in member of `role`.
fn member(role: UserRole) -> (MemoryBackend, Identity) {
    let backend = MemoryBackend::new();
    let user = backend.add_account("member@example.com", "correct-horse-battery");
    backend.add_profile(user.id, "Morgan Member", role);
    backend.sign_in_as(&user);
    (backend, user)
}

async fn resolve_state(guard: &Guard) -> GuardState {
    guard
        .check(&CancellationToken::new())
        .await
        .expect("check was not cancelled")
}

#[tokio::test]
async fn matching_role_renders_children() {
    let (backend, user) = member(UserRole::Client);
    let guard = guard(&backend, GuardKind::Member(UserRole::Client));

    let state = resolve_state(&guard).await;

    match state.view(guard.kind(), "/orders") {
        GuardView::Render(AuthorizedProfile::Member(profile)) => {
            assert_eq!(profile.user_id, user.id);
            assert_eq!(profile.role, UserRole::Client);
        }
        other => panic!("expected Render, got {other:?}"),
    }
}

#[tokio::test]
async fn writer_on_client_route_goes_to_writer_dashboard() {
    let (backend, _) = member(UserRole::Writer);
    let guard = guard(&backend, GuardKind::Member(UserRole::Client));

    let state = resolve_state(&guard).await;
    assert!(matches!(state, GuardState::Authorized(_)));

    assert_eq!(
        state.view(guard.kind(), "/orders/new"),
        GuardView::Redirect(Redirect::to("/dashboard/writer").replacing())
    );
}

#[tokio::test]
async fn no_identity_shows_loading_then_redirects_with_location() {
    let backend = MemoryBackend::new();
    backend.set_faults(Faults {
        latency: Some(Duration::from_millis(20)),
        ..Default::default()
    });
    let guard = Arc::new(guard(&backend, GuardKind::Member(UserRole::Client)));

    let mut mount = guard.mount("/orders/new");
    assert_eq!(mount.state(), GuardState::Loading);
    assert_eq!(mount.view(), GuardView::Loading);

    assert_eq!(mount.resolved().await, GuardState::Unauthorized);
    assert_eq!(
        mount.view(),
        GuardView::Redirect(Redirect::to("/").from_location("/orders/new").replacing())
    );
}

#[tokio::test]
async fn admin_guard_redirects_to_admin_login() {
    let backend = MemoryBackend::new();
    let guard = Arc::new(guard(&backend, GuardKind::Admin));

    let mut mount = guard.mount("/admin/users");
    assert_eq!(mount.resolved().await, GuardState::Unauthorized);

    match mount.view() {
        GuardView::Redirect(redirect) => {
            assert_eq!(redirect.to, "/admin/login");
            assert_eq!(redirect.from.as_deref(), Some("/admin/users"));
            assert!(redirect.replace);
        }
        other => panic!("expected Redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn admin_guard_renders_for_admin() {
    let backend = MemoryBackend::new();
    let admin = backend.add_account("root@example.com", "correct-horse-battery");
    backend.add_admin_profile(admin.id, "Ada Admin", "root@example.com");
    backend.sign_in_as(&admin);
    let guard = guard(&backend, GuardKind::Admin);

    let state = resolve_state(&guard).await;

    match state.view(GuardKind::Admin, "/admin/dashboard") {
        GuardView::Render(profile) => assert_eq!(profile.full_name(), "Ada Admin"),
        other => panic!("expected Render, got {other:?}"),
    }
}

#[tokio::test]
async fn member_without_admin_profile_is_signed_out_by_admin_guard() {
    let (backend, user) = member(UserRole::Client);
    let guard = guard(&backend, GuardKind::Admin);

    assert_eq!(resolve_state(&guard).await, GuardState::Unauthorized);

    assert!(backend.held_credential().is_none());
    let rows = backend.sessions();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|s| s.user_id == user.id && !s.is_active));
}

#[tokio::test]
async fn missing_profile_ends_session() {
    let backend = MemoryBackend::new();
    let user = backend.add_account("ghost@example.com", "correct-horse-battery");
    backend.sign_in_as(&user);
    let guard = guard(&backend, GuardKind::Member(UserRole::Client));

    assert_eq!(resolve_state(&guard).await, GuardState::Unauthorized);
    assert!(backend.held_credential().is_none());
    assert!(backend.sessions().iter().all(|s| !s.is_active));
}

#[tokio::test]
async fn profile_lookup_failure_ends_session() {
    let (backend, _) = member(UserRole::Writer);
    backend.set_faults(Faults {
        profiles: true,
        ..Default::default()
    });
    let guard = guard(&backend, GuardKind::Member(UserRole::Writer));

    assert_eq!(resolve_state(&guard).await, GuardState::Unauthorized);
    assert!(backend.held_credential().is_none());
}

#[tokio::test]
async fn refresh_failure_denies_without_profile_lookup() {
    let (backend, _) = member(UserRole::Client);
    backend.set_faults(Faults {
        refresh: true,
        ..Default::default()
    });
    let guard = guard(&backend, GuardKind::Member(UserRole::Client));

    let state = resolve_state(&guard).await;
    assert_eq!(state, GuardState::Unauthorized);
    assert_eq!(
        state.view(guard.kind(), "/finance"),
        GuardView::Redirect(Redirect::to("/").from_location("/finance").replacing())
    );
}

#[tokio::test]
async fn cancelled_before_start_never_touches_backend() {
    let (backend, _) = member(UserRole::Client);
    let guard = guard(&backend, GuardKind::Member(UserRole::Client));
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(guard.check(&cancel).await.is_none());
    assert!(backend.sessions().is_empty());
    assert!(backend.held_credential().is_some());
}

#[tokio::test]
async fn cancelled_mid_flight_discards_result() {
    let (backend, _) = member(UserRole::Client);
    backend.set_faults(Faults {
        latency: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let guard = guard(&backend, GuardKind::Member(UserRole::Client));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    assert!(guard.check(&cancel).await.is_none());
}

#[tokio::test]
async fn unmount_stops_the_check() {
    let (backend, _) = member(UserRole::Client);
    backend.set_faults(Faults {
        latency: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let guard = Arc::new(guard(&backend, GuardKind::Member(UserRole::Client)));

    let mount = guard.clone().mount("/orders");
    assert_eq!(mount.state(), GuardState::Loading);
    mount.unmount();

    // Give the cancelled task a moment; no row may appear afterwards.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.sessions().is_empty());
}

#[tokio::test]
async fn unmount_during_teardown_finishes_sign_out() {
    let (backend, user) = member(UserRole::Client);
    let now = chrono::Utc::now();
    backend.insert_session(Session {
        id: uuid::Uuid::new_v4(),
        user_id: user.id,
        created_at: now,
        last_activity: now,
        expires_at: now + chrono::Duration::hours(12),
        is_active: true,
        device_info: None,
        ip_address: None,
        metadata: None,
    });
    // Refresh fails, so the check tears the session down: the credential
    // lookup and refresh take two steps, then current user, deactivation
    // and sign-out one step each.
    backend.set_faults(Faults {
        refresh: true,
        latency: Some(Duration::from_millis(100)),
        ..Default::default()
    });
    let guard = Arc::new(guard(&backend, GuardKind::Member(UserRole::Client)));

    let mount = guard.mount("/orders");
    // Between deactivation and sign-out.
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(mount.state(), GuardState::Loading);
    mount.unmount();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(backend.sessions().iter().all(|s| !s.is_active));
    assert!(backend.held_credential().is_none());
}

#[tokio::test]
async fn every_mount_rechecks() {
    let (backend, _) = member(UserRole::Client);
    let guard = Arc::new(guard(&backend, GuardKind::Member(UserRole::Client)));

    let mut first = guard.clone().mount("/orders");
    assert!(matches!(first.resolved().await, GuardState::Authorized(_)));

    backend.set_faults(Faults {
        refresh: true,
        ..Default::default()
    });
    let mut second = guard.mount("/orders");
    assert_eq!(second.resolved().await, GuardState::Unauthorized);
}

#[tokio::test]
async fn cancellable_passes_through_when_not_cancelled() {
    let cancel = CancellationToken::new();
    assert_eq!(cancellable(&cancel, async { 7 }).await, Ok(7));
}

#[test]
fn guard_kind_follows_route_table() {
    assert_eq!(
        GuardKind::for_route(resolve("/writer/finance")),
        Some(GuardKind::Member(UserRole::Writer))
    );
    assert_eq!(
        GuardKind::for_route(resolve("/admin/orders")),
        Some(GuardKind::Admin)
    );
    assert_eq!(GuardKind::for_route(RouteAccess::Public), None);
    assert_eq!(GuardKind::for_route(resolve("/unknown")), None);
}
