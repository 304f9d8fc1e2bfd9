use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wheelshare_api::middleware::auth::{encode_token, Claims};
use wheelshare_api::{app, AppState, AuthConfig};
use wheelshare_core::{Coordinate, Principal, Role, StaticGeocoder};
use wheelshare_store::app_config::BookingRules;

const SECRET: &str = "integration-secret";

fn test_state() -> AppState {
    let geocoder = StaticGeocoder::new().with_entry(
        "1 Front St, Toronto",
        Coordinate {
            latitude: 43.6446,
            longitude: -79.3849,
        },
    );
    AppState::in_memory(
        Arc::new(geocoder),
        &BookingRules::default(),
        AuthConfig {
            secret: SECRET.to_string(),
        },
    )
    .unwrap()
}

fn token(subject: &str, role: Role) -> String {
    let principal = Principal::new(subject, format!("{}@example.com", subject), role);
    encode_token(&Claims::for_principal(&principal, 3600), SECRET).unwrap()
}

async fn send(router: Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn listing_form(address: &str, capacity: u32) -> Value {
    json!({
        "car_model": "Corolla",
        "license_plate": "BXTR 204",
        "daily_price_cents": 5200,
        "photo_url": "https://img.example.com/corolla.jpg",
        "city": "Toronto",
        "address": address,
        "capacity": capacity,
    })
}

async fn create_listing(state: &AppState, owner: &str, address: &str, capacity: u32) -> String {
    let (status, body) = send(
        app(state.clone()),
        Method::POST,
        "/v1/listings",
        Some(&token(owner, Role::Owner)),
        Some(listing_form(address, capacity)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let (status, body) = send(app(test_state()), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_v1_requires_a_valid_token() {
    let state = test_state();

    let (status, _) = send(app(state.clone()), Method::GET, "/v1/listings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(app(state), Method::GET, "/v1/listings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_listing_creation_rules() {
    let state = test_state();

    let (status, _) = send(
        app(state.clone()),
        Method::POST,
        "/v1/listings",
        Some(&token("renter-1", Role::Renter)),
        Some(listing_form("1 Front St", 1)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        app(state.clone()),
        Method::POST,
        "/v1/listings",
        Some(&token("owner-1", Role::Owner)),
        Some(listing_form("1 Front St", 0)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("capacity"));

    create_listing(&state, "owner-1", "1 Front St", 1).await;
    create_listing(&state, "owner-2", "9 Elsewhere Rd", 1).await;

    let (status, body) = send(
        app(state.clone()),
        Method::GET,
        "/v1/listings/mine",
        Some(&token("owner-1", Role::Owner)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(
        app(state),
        Method::GET,
        "/v1/listings?city=toron",
        Some(&token("renter-1", Role::Renter)),
        None,
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_booking_flow_end_to_end() {
    let state = test_state();
    let listing_id = create_listing(&state, "owner-1", "1 Front St", 1).await;
    let r1 = token("renter-1", Role::Renter);
    let r2 = token("renter-2", Role::Renter);
    let owner = token("owner-1", Role::Owner);
    let book = json!({ "listing_id": listing_id });

    let (status, booking) = send(app(state.clone()), Method::POST, "/v1/bookings", Some(&r1), Some(book.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "ACTIVE");
    let booking_id = booking["id"].as_str().unwrap().to_string();
    assert_eq!(booking["confirmation_code"].as_str().unwrap().len(), 6);

    let (status, _) = send(app(state.clone()), Method::POST, "/v1/bookings", Some(&r1), Some(book.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(app(state.clone()), Method::POST, "/v1/bookings", Some(&r2), Some(book.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = send(app(state.clone()), Method::GET, "/v1/me/booking", Some(&r2), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(app(state.clone()), Method::GET, "/v1/me/booking", Some(&r1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], booking_id.as_str());

    let cancel_uri = format!("/v1/bookings/{}", booking_id);
    let (status, _) = send(app(state.clone()), Method::DELETE, &cancel_uri, Some(&r2), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for _ in 0..2 {
        let (status, body) = send(app(state.clone()), Method::DELETE, &cancel_uri, Some(&r1), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "CANCELLED");
    }

    let (status, _) = send(app(state.clone()), Method::POST, "/v1/bookings", Some(&r2), Some(book)).await;
    assert_eq!(status, StatusCode::CREATED);

    let history_uri = format!("/v1/listings/{}/history", listing_id);
    let (status, body) = send(app(state.clone()), Method::GET, &history_uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = send(
        app(state.clone()),
        Method::GET,
        &history_uri,
        Some(&token("owner-2", Role::Owner)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        app(state.clone()),
        Method::GET,
        &format!("/v1/listings/{}/bookings", listing_id),
        Some(&r1),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(app(state), Method::GET, "/v1/me/bookings", Some(&r1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_owner_cancellation() {
    let state = test_state();
    let listing_id = create_listing(&state, "owner-1", "1 Front St", 1).await;
    let (_, booking) = send(
        app(state.clone()),
        Method::POST,
        "/v1/bookings",
        Some(&token("renter-1", Role::Renter)),
        Some(json!({ "listing_id": listing_id })),
    )
    .await;
    let uri = format!("/v1/owner/bookings/{}/cancel", booking["id"].as_str().unwrap());

    let (status, _) = send(app(state.clone()), Method::POST, &uri, Some(&token("owner-2", Role::Owner)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(app(state), Method::POST, &uri, Some(&token("owner-1", Role::Owner)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancellation"]["cause"], "OWNER");
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let state = test_state();
    let missing = uuid::Uuid::new_v4();
    let r1 = token("renter-1", Role::Renter);

    let (status, _) = send(
        app(state.clone()),
        Method::POST,
        "/v1/bookings",
        Some(&r1),
        Some(json!({ "listing_id": missing })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        app(state.clone()),
        Method::DELETE,
        &format!("/v1/bookings/{}", missing),
        Some(&r1),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app(state), Method::GET, &format!("/v1/listings/{}/stream", missing), Some(&r1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_map_omits_ungeocodable_listings() {
    let state = test_state();
    let located = create_listing(&state, "owner-1", "1 Front St", 1).await;
    create_listing(&state, "owner-2", "9 Elsewhere Rd", 1).await;

    let (status, body) = send(
        app(state),
        Method::GET,
        "/v1/map?city=Toronto",
        Some(&token("renter-1", Role::Renter)),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let pins = body["pins"].as_array().unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0]["listing_id"], located.as_str());
    assert_eq!(body["center"]["latitude"], 43.6446);
}

#[tokio::test]
async fn test_metrics_count_booking_outcomes() {
    let state = test_state();
    let listing_id = create_listing(&state, "owner-1", "1 Front St", 1).await;
    for renter in ["renter-1", "renter-2"] {
        send(
            app(state.clone()),
            Method::POST,
            "/v1/bookings",
            Some(&token(renter, Role::Renter)),
            Some(json!({ "listing_id": listing_id })),
        )
        .await;
    }

    let response = app(state)
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains(r#"wheelshare_booking_requests_total{outcome="ok"} 1"#));
    assert!(text.contains(r#"wheelshare_booking_requests_total{outcome="listing_full"} 1"#));
}

#[tokio::test]
async fn test_listing_stream_is_server_sent_events() {
    let state = test_state();
    let listing_id = create_listing(&state, "owner-1", "1 Front St", 1).await;

    let request = Request::get(format!("/v1/listings/{}/stream", listing_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token("renter-1", Role::Renter)))
        .body(Body::empty())
        .unwrap();
    let response = app(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
}
