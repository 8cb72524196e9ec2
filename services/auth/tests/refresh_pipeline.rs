mod support;

use std::time::Duration;

use auth::error::{ClientError, ErrorKind, RefreshError};
use auth::http::ApiRequest;
use auth::session::{ROLE_USER, Session};
use reqwest::StatusCode;
use serde_json::{Value, json};
use support::{Hit, MockBackend, logged_in_client, wait_for_queue};

const MY_INFO: &str = "/common/accounts/my-info";

#[tokio::test]
async fn test_concurrent_expired_requests_share_one_refresh() {
    let backend = MockBackend::new("B");
    backend.gate_refresh();
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;

    let requests: Vec<_> = (0..5)
        .map(|_| {
            let api = client.client().clone();
            tokio::spawn(async move { api.execute(ApiRequest::get(MY_INFO).authorized()).await })
        })
        .collect();

    // The first failure runs the exchange, the other four wait for it.
    wait_for_queue(client.coordinator(), 4).await;
    backend.release_refresh();

    for request in requests {
        let response = request.await.unwrap().unwrap();
        assert_eq!(response.body, json!({"bearer": "B"}));
    }
    assert_eq!(backend.refresh_calls(), 1);

    let hits = backend.hits_for(MY_INFO);
    let stale = hits.iter().filter(|h| h.bearer.as_deref() == Some("A")).count();
    let fresh = hits.iter().filter(|h| h.bearer.as_deref() == Some("B")).count();
    assert_eq!((stale, fresh), (5, 5));

    let session = client.store().get();
    assert_eq!(session.access_token.as_deref(), Some("B"));
    assert_eq!(session.refresh_token.as_deref(), Some("R2"));
    assert_eq!(session.role.as_str(), ROLE_USER);
}

#[tokio::test]
async fn test_failed_refresh_rejects_every_waiting_request() {
    let backend = MockBackend::new("B");
    backend.set_refresh_reply(StatusCode::UNAUTHORIZED, json!({"message": "expired"}));
    backend.gate_refresh();
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;

    let requests: Vec<_> = (0..3)
        .map(|_| {
            let api = client.client().clone();
            tokio::spawn(async move { api.execute(ApiRequest::get(MY_INFO).authorized()).await })
        })
        .collect();

    wait_for_queue(client.coordinator(), 2).await;
    backend.release_refresh();

    for request in requests {
        let err = request.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Refresh(RefreshError::Rejected { status: 401 })
        ));
        assert_eq!(err.kind(), ErrorKind::SessionExpired);
    }
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(client.store().get(), Session::default());
    // Nothing was replayed.
    assert_eq!(backend.hits_for(MY_INFO).len(), 3);
}

#[tokio::test]
async fn test_replayed_request_is_not_retried_twice() {
    let backend = MockBackend::new("B");
    backend.reject_all();
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;

    let err = client
        .client()
        .execute(ApiRequest::get(MY_INFO).authorized())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(
        backend.hits_for(MY_INFO),
        vec![
            Hit {
                path: MY_INFO.into(),
                bearer: Some("A".into())
            },
            Hit {
                path: MY_INFO.into(),
                bearer: Some("B".into())
            },
        ]
    );
}

#[tokio::test]
async fn test_late_failure_for_replaced_token_does_not_refresh_again() {
    let backend = MockBackend::new("B");
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;

    client
        .client()
        .execute(ApiRequest::get(MY_INFO).authorized())
        .await
        .unwrap();
    assert_eq!(backend.refresh_calls(), 1);

    // Sent with A before the refresh landed, answered after it.
    let mut late = ApiRequest::get(MY_INFO).authorized();
    late.set_bearer("A").unwrap();
    let response = client.client().execute(late).await.unwrap();

    assert_eq!(response.body, json!({"bearer": "B"}));
    assert_eq!(backend.refresh_calls(), 1);
    let bearers: Vec<_> = backend
        .hits_for(MY_INFO)
        .into_iter()
        .map(|h| h.bearer.unwrap_or_default())
        .collect();
    assert_eq!(bearers, vec!["A", "B", "A", "B"]);
}

#[tokio::test]
async fn test_public_request_failure_never_refreshes() {
    let backend = MockBackend::new("B");
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;

    let err = client
        .client()
        .execute(ApiRequest::get(MY_INFO))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(backend.refresh_calls(), 0);
    // No credential on a request that does not ask for one.
    assert_eq!(backend.hits_for(MY_INFO)[0].bearer, None);
    assert!(client.store().is_logged_in());
}

#[tokio::test]
async fn test_missing_refresh_token_logs_out() {
    let backend = MockBackend::new("B");
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;
    client
        .store()
        .update(|s| s.refresh_token = None)
        .await
        .unwrap();

    let err = client
        .client()
        .execute(ApiRequest::get(MY_INFO).authorized())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Refresh(RefreshError::MissingRefreshToken)
    ));
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(client.store().get(), Session::default());
}

#[tokio::test]
async fn test_unavailable_refresh_keeps_session() {
    let backend = MockBackend::new("B");
    backend.set_refresh_reply(StatusCode::SERVICE_UNAVAILABLE, Value::Null);
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;

    let err = client
        .client()
        .execute(ApiRequest::get(MY_INFO).authorized())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(client.store().access_token().as_deref(), Some("A"));
    assert!(client.store().is_logged_in());
}

#[tokio::test]
async fn test_hung_refresh_times_out_and_logs_out() {
    let backend = MockBackend::new("B");
    backend.gate_refresh();
    let client = logged_in_client(backend.clone(), Duration::from_millis(200)).await;

    let err = client
        .client()
        .execute(ApiRequest::get(MY_INFO).authorized())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Refresh(RefreshError::Timeout(_))));
    assert!(!client.store().is_logged_in());
    assert!(!client.coordinator().is_refreshing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_never_see_a_mixed_session() {
    let backend = MockBackend::new("B");
    backend.gate_refresh();
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;

    let store = client.store().clone();
    let reader = tokio::spawn(async move {
        let mut seen = Vec::new();
        loop {
            let session = store.get();
            let pair = (session.access_token.clone(), session.refresh_token.clone());
            let done = pair.0.as_deref() == Some("B");
            seen.push((pair, session.role.clone()));
            if done {
                return seen;
            }
            tokio::task::yield_now().await;
        }
    });

    let api = client.client().clone();
    let request =
        tokio::spawn(async move { api.execute(ApiRequest::get(MY_INFO).authorized()).await });

    while backend.refresh_calls() == 0 {
        tokio::task::yield_now().await;
    }
    backend.release_refresh();
    request.await.unwrap().unwrap();

    let old = (Some("A".to_string()), Some("R".to_string()));
    let new = (Some("B".to_string()), Some("R2".to_string()));
    for (pair, role) in reader.await.unwrap() {
        assert!(pair == old || pair == new, "mixed session observed: {:?}", pair);
        assert_eq!(role.as_str(), ROLE_USER);
    }
}

#[tokio::test]
async fn test_refresh_uses_bare_transport() {
    let backend = MockBackend::new("B");
    let client = logged_in_client(backend.clone(), Duration::from_secs(5)).await;

    client
        .client()
        .execute(ApiRequest::get(MY_INFO).authorized())
        .await
        .unwrap();

    // The exchange carries the refresh token in its body, not a bearer.
    assert_eq!(
        backend.hits_for("/common/auth/refresh"),
        vec![Hit {
            path: "/common/auth/refresh".into(),
            bearer: None
        }]
    );
}
