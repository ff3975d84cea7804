#![allow(clippy::unwrap_used)]
// Integration tests for `Coordinator` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use uniwifi_core::{
    ControllerEndpoint, ControllerVariant, Coordinator, CoordinatorState, CoreError, FailureKind,
    PresharedKeyEntry, RefreshOutcome, UpdateEvent,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn endpoint(server: &MockServer) -> ControllerEndpoint {
    ControllerEndpoint {
        name: "test".into(),
        url: Url::parse(&server.uri()).unwrap(),
        site: "default".into(),
        username: "admin".into(),
        password: SecretString::from("hunter22".to_owned()),
        variant: ControllerVariant::Classic,
        verify_tls: false,
        force_provision: false,
        managed_aps: Vec::new(),
        poll_interval: Duration::from_secs(3600),
        request_timeout: Duration::from_secs(5),
        auth_failure_limit: 3,
    }
}

fn envelope(data: serde_json::Value) -> serde_json::Value {
    json!({ "meta": { "rc": "ok" }, "data": data })
}

async fn mount_auth(server: &MockServer, expected_logins: u64) {
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(expected_logins)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Mount the three fetcher endpoints a refresh cycle hits.
async fn mount_site(server: &MockServer, wlans: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(wlans)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/networkconf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/stat/sysinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([{}]))))
        .mount(server)
        .await;
}

fn guest_wlan(enabled: bool, passphrase: &str) -> serde_json::Value {
    json!([{
        "_id": "wl-1",
        "name": "guest",
        "enabled": enabled,
        "x_passphrase": passphrase,
    }])
}

// ── Single-flight coalescing ────────────────────────────────────────

#[tokio::test]
async fn concurrent_refreshes_share_one_session() {
    let server = MockServer::start().await;
    // Exactly one login no matter how many callers pile up.
    mount_auth(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(guest_wlan(true, "abc12345")))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/networkconf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/stat/sysinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([{}]))))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(endpoint(&server));

    let (a, b, c) = tokio::join!(
        coordinator.refresh(),
        coordinator.refresh(),
        coordinator.refresh(),
    );

    for outcome in [&a, &b, &c] {
        assert!(outcome.is_success(), "expected Updated, got: {outcome:?}");
    }
    assert_eq!(coordinator.snapshot().wlans.len(), 1);
}

#[tokio::test]
async fn write_refresh_never_settles_for_a_cycle_that_fetched_before_the_put() {
    let server = MockServer::start().await;
    // Three sessions: the slow background refresh, the write, and the
    // post-write refresh.
    mount_auth(&server, 3).await;

    // The background refresh fetches pre-write state, slowly.
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(guest_wlan(true, "abc12345")))
                .set_delay(Duration::from_millis(800)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // The write's id-resolution listing.
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(guest_wlan(true, "abc12345"))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // Post-write state.
    mount_site(&server, guest_wlan(false, "abc12345")).await;

    Mock::given(method("PUT"))
        .and(path("/api/s/default/rest/wlanconf/wl-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(endpoint(&server));
    let background = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The write must not coalesce onto the in-flight cycle, whose fetch
    // predates the PUT.
    coordinator
        .set_wlan_enabled("guest", false, false)
        .await
        .unwrap();

    let snapshot = coordinator.snapshot();
    assert!(
        !snapshot.wlans[0].enabled,
        "cache must reflect the write when the call returns"
    );
    assert!(background.await.unwrap().is_success());
}

// ── Atomic cache replacement ────────────────────────────────────────

#[tokio::test]
async fn snapshot_taken_before_refresh_stays_complete() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_site(&server, guest_wlan(true, "abc12345")).await;

    let coordinator = Coordinator::new(endpoint(&server));

    let before = coordinator.snapshot();
    assert!(before.wlans.is_empty());
    assert!(before.refreshed_at.is_none());

    coordinator.refresh().await.into_result().unwrap();

    // The pre-refresh holder still sees its own complete snapshot; a new
    // load sees the replacement wholesale.
    assert!(before.wlans.is_empty());
    let after = coordinator.snapshot();
    assert_eq!(after.wlans.len(), 1);
    assert_eq!(after.wlans[0].name, "guest");
    assert!(after.refreshed_at.is_some());
}

// ── Failure classification ──────────────────────────────────────────

#[tokio::test]
async fn expired_session_fails_once_without_stopping_schedule() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(endpoint(&server));
    let mut updates = coordinator.updates();

    let outcome = coordinator.refresh().await;

    assert!(matches!(outcome, RefreshOutcome::AuthFailed { .. }));
    // One failure, limit three: still schedulable.
    assert_eq!(*coordinator.state().borrow(), CoordinatorState::Idle);
    assert!(matches!(
        updates.recv().await.unwrap(),
        UpdateEvent::UpdateFailed {
            kind: FailureKind::Auth,
            ..
        }
    ));
}

#[tokio::test]
async fn server_failure_is_retryable_not_auth() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(endpoint(&server));
    let mut updates = coordinator.updates();

    let outcome = coordinator.refresh().await;

    assert!(matches!(outcome, RefreshOutcome::ApiFailed { .. }));
    assert_eq!(*coordinator.state().borrow(), CoordinatorState::Idle);
    assert!(matches!(
        updates.recv().await.unwrap(),
        UpdateEvent::UpdateFailed {
            kind: FailureKind::Api,
            ..
        }
    ));
}

#[tokio::test]
async fn repeated_auth_failures_stop_the_coordinator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let mut ep = endpoint(&server);
    ep.auth_failure_limit = 2;
    let coordinator = Coordinator::new(ep);

    assert!(matches!(
        coordinator.refresh().await,
        RefreshOutcome::AuthFailed { .. }
    ));
    assert_eq!(*coordinator.state().borrow(), CoordinatorState::Idle);

    assert!(matches!(
        coordinator.refresh().await,
        RefreshOutcome::AuthFailed { .. }
    ));
    assert_eq!(*coordinator.state().borrow(), CoordinatorState::Failed);

    // Terminal: no further cycle is attempted.
    assert!(matches!(
        coordinator.refresh().await,
        RefreshOutcome::Stopped
    ));
}

#[tokio::test]
async fn server_failure_breaks_a_run_of_auth_failures() {
    let server = MockServer::start().await;
    // Login rejected, then accepted once, then rejected again.
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut ep = endpoint(&server);
    ep.auth_failure_limit = 2;
    let coordinator = Coordinator::new(ep);

    assert!(matches!(
        coordinator.refresh().await,
        RefreshOutcome::AuthFailed { .. }
    ));
    // The server failure in between resets the consecutive count.
    assert!(matches!(
        coordinator.refresh().await,
        RefreshOutcome::ApiFailed { .. }
    ));
    assert!(matches!(
        coordinator.refresh().await,
        RefreshOutcome::AuthFailed { .. }
    ));
    assert_eq!(*coordinator.state().borrow(), CoordinatorState::Idle);
}

#[tokio::test]
async fn slow_controller_trips_the_refresh_deadline() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!([])))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut ep = endpoint(&server);
    ep.request_timeout = Duration::from_millis(200);
    let coordinator = Coordinator::new(ep);

    let outcome = coordinator.refresh().await;

    assert!(matches!(outcome, RefreshOutcome::TimedOut { .. }));
    assert_eq!(*coordinator.state().borrow(), CoordinatorState::Idle);
    // The aborted cycle left the cache untouched.
    assert!(coordinator.snapshot().refreshed_at.is_none());
}

// ── Write-then-refresh ──────────────────────────────────────────────

#[tokio::test]
async fn disable_wlan_is_visible_in_cache_on_return() {
    let server = MockServer::start().await;
    // Two sessions: one for the write, one for the refresh that follows.
    mount_auth(&server, 2).await;

    // First listing (write-side id resolution) shows the wlan enabled;
    // the post-write listing shows it disabled.
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(guest_wlan(true, "abc12345"))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_site(&server, guest_wlan(false, "abc12345")).await;

    Mock::given(method("PUT"))
        .and(path("/api/s/default/rest/wlanconf/wl-1"))
        .and(body_json(json!({ "enabled": "false" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(endpoint(&server));
    let mut updates = coordinator.updates();

    coordinator
        .set_wlan_enabled("guest", false, false)
        .await
        .unwrap();

    // The caller's next read reflects its own write.
    let snapshot = coordinator.snapshot();
    assert!(!snapshot.wlans[0].enabled);
    assert!(matches!(
        updates.recv().await.unwrap(),
        UpdateEvent::Updated { .. }
    ));
}

#[tokio::test]
async fn password_change_reports_changed_ssid() {
    let server = MockServer::start().await;
    mount_auth(&server, 3).await;

    // Seed the cache with the old passphrase.
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(guest_wlan(true, "old-pass"))))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_site(&server, guest_wlan(true, "new-pass1")).await;

    Mock::given(method("PUT"))
        .and(path("/api/s/default/rest/wlanconf/wl-1"))
        .and(body_json(json!({ "x_passphrase": "new-pass1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(endpoint(&server));
    coordinator.refresh().await.into_result().unwrap();

    let mut updates = coordinator.updates();
    coordinator
        .set_wlan_password("guest", "new-pass1", false)
        .await
        .unwrap();

    match updates.recv().await.unwrap() {
        UpdateEvent::Updated { changes } => {
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].ssid, "guest");
            assert!(changes[0].password_changed);
            assert!(!changes[0].enabled_changed);
        }
        other => panic!("expected Updated, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_ssid_fails_without_a_put() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/wlanconf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(endpoint(&server));
    let err = coordinator
        .set_wlan_password("nonexistent", "abc12345", false)
        .await
        .unwrap_err();

    match err {
        CoreError::WlanNotFound { ssid, site } => {
            assert_eq!(ssid, "nonexistent");
            assert_eq!(site, "default");
        }
        other => panic!("expected WlanNotFound, got {other:?}"),
    }

    let puts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .count();
    assert_eq!(puts, 0);
}

#[tokio::test]
async fn per_call_force_provisions_discovered_access_points() {
    let server = MockServer::start().await;
    mount_auth(&server, 2).await;
    mount_site(&server, guest_wlan(true, "abc12345")).await;

    Mock::given(method("PUT"))
        .and(path("/api/s/default/rest/wlanconf/wl-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;
    // No explicit AP list: discovery filters the adopted-device listing
    // down to wifi-capable devices.
    Mock::given(method("GET"))
        .and(path("/api/s/default/stat/device-basic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            { "mac": "aa:bb:cc:dd:ee:01", "type": "uap" },
            { "mac": "aa:bb:cc:dd:ee:02", "type": "usw" }
        ]))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/s/default/cmd/devmgr"))
        .and(body_json(json!({ "cmd": "force-provision", "mac": "aa:bb:cc:dd:ee:01" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    // Endpoint default is off; the call itself asks for provisioning.
    let coordinator = Coordinator::new(endpoint(&server));
    coordinator
        .set_wlan_config("guest", json!({ "hide_ssid": "true" }), true)
        .await
        .unwrap();
}

// ── Settings writes ─────────────────────────────────────────────────

#[tokio::test]
async fn settings_write_resolves_backing_id_and_provisions() {
    let server = MockServer::start().await;
    mount_auth(&server, 2).await;
    mount_site(&server, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/setting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            { "_id": "s1", "key": "guest_access" }
        ]))))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/s/default/rest/setting/guest_access/s1"))
        .and(body_json(json!({ "portal_enabled": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/s/default/cmd/devmgr"))
        .and(body_json(json!({ "cmd": "force-provision", "mac": "aa:bb:cc:dd:ee:01" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let mut ep = endpoint(&server);
    ep.force_provision = true;
    ep.managed_aps = vec!["aa:bb:cc:dd:ee:01".into()];
    let coordinator = Coordinator::new(ep);

    coordinator
        .set_setting("guest_access", json!({ "portal_enabled": false }), false)
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_settings_key_fails_without_a_put() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/rest/setting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(endpoint(&server));
    let err = coordinator
        .set_setting("hotspot", json!({ "enabled": true }), false)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::SettingNotFound { ref key, .. } if key == "hotspot"));
    let puts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .count();
    assert_eq!(puts, 0);
}

// ── Pre-shared-key conflicts ────────────────────────────────────────

#[tokio::test]
async fn duplicate_preshared_passwords_rejected_before_any_request() {
    let server = MockServer::start().await;

    let coordinator = Coordinator::new(endpoint(&server));
    let keys = vec![
        PresharedKeyEntry {
            networkconf_id: "net-a".into(),
            password: "shared-pw".into(),
            extra: serde_json::Map::new(),
        },
        PresharedKeyEntry {
            networkconf_id: "net-b".into(),
            password: "shared-pw".into(),
            extra: serde_json::Map::new(),
        },
    ];

    let err = coordinator
        .set_preshared_keys("guest", keys, false)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::DuplicatePresharedKey { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Scheduling lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn poll_task_fills_the_cache_and_stops_on_shutdown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    mount_site(&server, guest_wlan(true, "abc12345")).await;

    let mut ep = endpoint(&server);
    ep.poll_interval = Duration::from_millis(50);
    let coordinator = Coordinator::new(ep);

    coordinator.start().await;
    let mut updates = coordinator.updates();
    assert!(matches!(
        updates.recv().await.unwrap(),
        UpdateEvent::Updated { .. }
    ));
    assert_eq!(coordinator.snapshot().wlans.len(), 1);

    coordinator.shutdown().await;
    let polled = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        polled,
        "no requests after shutdown"
    );
}
