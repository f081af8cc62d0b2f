// HTTP behaviour of the REST client against a local mock server

use std::sync::Arc;

use chrono::{Duration, Local};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rental_client::api::{ApiError, HttpRentalApi, RentalApi};
use rental_client::config::ClientConfig;
use rental_client::error::{Locale, Route};
use rental_client::flow::{BookingFlow, FlowState};
use rental_client::forms::{LoginForm, PaymentForm};
use rental_client::models::{
    BookingStatus, ProfileUpdate, PropertyInput, Registration, SearchParams,
};
use rental_client::session::{AuthSession, MemoryStore, SessionStore, USER_INFO_KEY};

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: format!("{}/api", server.uri()),
        timeout_ms: 2_000,
        ..Default::default()
    }
}

fn user_json(token: &str) -> serde_json::Value {
    json!({
        "_id": "u1",
        "name": "Lucía",
        "email": "lucia@example.com",
        "isAdmin": false,
        "token": token
    })
}

fn property_json(id: &str, price: f64) -> serde_json::Value {
    json!({
        "_id": id,
        "title": format!("Casa {}", id),
        "pricePerNight": price,
        "maxGuests": 4,
        "address": { "city": "Sevilla", "country": "España" }
    })
}

fn logged_in_store(token: &str) -> Arc<dyn SessionStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .set(USER_INFO_KEY, &user_json(token).to_string())
        .unwrap();
    store
}

#[tokio::test]
async fn test_listing_sends_page_and_keyword() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/properties"))
        .and(query_param("pageNumber", "2"))
        .and(query_param("keyword", "playa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": [property_json("p1", 100.0), property_json("p2", 80.0)],
            "page": 2,
            "pages": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpRentalApi::new(&config(&server), Arc::new(MemoryStore::new())).unwrap();
    let page = api.list_properties(2, "playa").await.unwrap();

    assert_eq!(page.properties.len(), 2);
    assert_eq!(page.properties[0].title, "Casa p1");
    assert_eq!(page.properties[1].max_guests, 4);
    assert_eq!(page.page, Some(2));
    assert_eq!(page.pages, Some(3));
}

#[tokio::test]
async fn test_search_accepts_bare_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .and(query_param("city", "Sevilla"))
        .and(query_param("guests", "3"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([property_json("p1", 120.0)])),
        )
        .mount(&server)
        .await;

    let api = HttpRentalApi::new(&config(&server), Arc::new(MemoryStore::new())).unwrap();
    let params = SearchParams {
        city: Some("Sevilla".to_string()),
        guests: Some(3),
        ..Default::default()
    };
    let page = api.search_properties(&params).await.unwrap();

    assert_eq!(page.properties.len(), 1);
    assert_eq!(page.page, None);
}

#[tokio::test]
async fn test_stored_token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/bookings"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpRentalApi::new(&config(&server), logged_in_store("tok-123")).unwrap();
    assert!(api.my_bookings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_authorization_header_when_logged_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/properties/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(property_json("p1", 90.0)))
        .mount(&server)
        .await;

    let api = HttpRentalApi::new(&config(&server), Arc::new(MemoryStore::new())).unwrap();
    api.get_property("p1").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_login_token_is_used_by_later_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .and(body_partial_json(json!({ "email": "lucia@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("fresh-token")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/bookings"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let api = HttpRentalApi::new(&config(&server), Arc::clone(&store)).unwrap();
    let session = AuthSession::restore(store);

    let form = LoginForm {
        email: "lucia@example.com".to_string(),
        password: "secret".to_string(),
    };
    session.login(&api, &form).await.unwrap();
    api.my_bookings().await.unwrap();
}

#[tokio::test]
async fn test_error_statuses_carry_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "message": "Email o contraseña incorrectos" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/properties/broken"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "message": "Server exploded" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/properties/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let api = HttpRentalApi::new(&config(&server), Arc::clone(&store)).unwrap();

    let session = AuthSession::restore(store);
    let form = LoginForm {
        email: "lucia@example.com".to_string(),
        password: "wrong".to_string(),
    };
    let err = session.login(&api, &form).await.unwrap_err();
    assert_eq!(err.user_message(Locale::Es), "Email o contraseña incorrectos");

    assert_eq!(
        api.get_property("broken").await.unwrap_err(),
        ApiError::ApiResponseError {
            status_code: 500,
            message: "Server exploded".to_string()
        }
    );
    assert_eq!(
        api.get_property("missing").await.unwrap_err(),
        ApiError::ApiResponseError {
            status_code: 404,
            message: String::new()
        }
    );

    let stats = api.stats();
    assert_eq!(stats.requests_sent, 3);
    assert_eq!(stats.requests_failed, 3);
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/properties/p1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(property_json("p1", 90.0))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = ClientConfig {
        timeout_ms: 100,
        ..config(&server)
    };
    let api = HttpRentalApi::new(&config, Arc::new(MemoryStore::new())).unwrap();

    assert_eq!(
        api.get_property("p1").await.unwrap_err(),
        ApiError::Timeout(100)
    );
    assert_eq!(api.stats().requests_timeout, 1);
}

#[tokio::test]
async fn test_booking_flow_creates_then_pays_over_http() {
    let server = MockServer::start().await;
    let check_in = Local::now().date_naive() + Duration::days(10);
    let check_out = check_in + Duration::days(3);
    let booking = json!({
        "_id": "b42",
        "property": "p1",
        "checkInDate": format!("{}T00:00:00.000Z", check_in),
        "checkOutDate": format!("{}T00:00:00.000Z", check_out),
        "guestCount": 2,
        "totalPrice": 395.0,
        "status": "pending",
        "isPaid": false
    });
    let mut paid = booking.clone();
    paid["status"] = json!("confirmed");
    paid["isPaid"] = json!(true);

    Mock::given(method("GET"))
        .and(path("/api/properties/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(property_json("p1", 100.0)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/bookings"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({
            "propertyId": "p1",
            "checkInDate": check_in.to_string(),
            "checkOutDate": check_out.to_string(),
            "totalPrice": 395.0,
            "guestCount": 2
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(booking))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/bookings/b42/pay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paid))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store("tok-1");
    let api = HttpRentalApi::new(&config(&server), Arc::clone(&store)).unwrap();
    let session = AuthSession::restore(store);

    let property = api.get_property("p1").await.unwrap();
    let mut flow = BookingFlow::new(property);
    flow.set_check_in(check_in).unwrap();
    flow.set_check_out(check_out).unwrap();
    flow.set_guests(2).unwrap();
    flow.review(Local::now().date_naive()).unwrap();

    let payment = PaymentForm {
        card_number: "4242424242424242".to_string(),
        expiry: "12/30".to_string(),
        cvc: "123".to_string(),
        card_name: "Lucía".to_string(),
    };
    let route = flow.submit(&api, &session, &payment).await.unwrap();

    assert_eq!(route, Route::BookingConfirmation("b42".to_string()));
    assert_eq!(flow.state(), FlowState::Confirmed);
    let confirmed = flow.confirmed_booking().unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.check_in_date, check_in);
}

#[tokio::test]
async fn test_cancel_sends_status_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/bookings/b7"))
        .and(body_partial_json(json!({ "status": "cancelled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "b7",
            "property": { "_id": "p1", "title": "Casa p1" },
            "checkInDate": "2030-01-10",
            "checkOutDate": "2030-01-12",
            "guestCount": 1,
            "totalPrice": 280.0,
            "status": "cancelled"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpRentalApi::new(&config(&server), logged_in_store("tok-1")).unwrap();
    let booking = api
        .update_booking_status("b7", BookingStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.property.title(), Some("Casa p1"));
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 200\r\n\r\n{\"_id\":",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    });

    let config = ClientConfig {
        base_url: format!("http://{}/api", addr),
        timeout_ms: 300,
        ..Default::default()
    };
    let api = HttpRentalApi::new(&config, Arc::new(MemoryStore::new())).unwrap();

    assert_eq!(
        api.get_property("p1").await.unwrap_err(),
        ApiError::Timeout(300)
    );
    assert_eq!(api.stats().requests_timeout, 1);
}

#[tokio::test]
async fn test_register_and_profile_update_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .and(body_partial_json(json!({
            "name": "Lucía",
            "email": "lucia@example.com",
            "password": "secret"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_json("new-token")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/users/profile"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({ "name": "Lucía G." })))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("tok-2")))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpRentalApi::new(&config(&server), Arc::new(MemoryStore::new())).unwrap();
    let registration = Registration {
        name: "Lucía".to_string(),
        email: "lucia@example.com".to_string(),
        password: "secret".to_string(),
    };
    assert_eq!(api.register(&registration).await.unwrap().token, "new-token");

    let api = HttpRentalApi::new(&config(&server), logged_in_store("tok-1")).unwrap();
    let update = ProfileUpdate {
        name: Some("Lucía G.".to_string()),
        ..Default::default()
    };
    assert_eq!(api.update_profile(&update).await.unwrap().token, "tok-2");

    let requests = server.received_requests().await.unwrap();
    let profile: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert!(profile.get("email").is_none());
    assert!(profile.get("password").is_none());
}

#[tokio::test]
async fn test_property_writes_hit_owner_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/properties"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({
            "title": "Ático",
            "pricePerNight": 90.0,
            "maxGuests": 3,
            "propertyType": "Apartment"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(property_json("p9", 90.0)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/properties/p9"))
        .and(body_partial_json(json!({ "title": "Ático", "pricePerNight": 110.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(property_json("p9", 110.0)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/properties/p9"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "Property removed" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpRentalApi::new(&config(&server), logged_in_store("tok-1")).unwrap();
    let mut input = PropertyInput {
        title: "Ático".to_string(),
        price_per_night: 90.0,
        max_guests: 3,
        ..Default::default()
    };
    assert_eq!(api.create_property(&input).await.unwrap().id, "p9");

    input.price_per_night = 110.0;
    let updated = api.update_property("p9", &input).await.unwrap();
    assert_eq!(updated.price_per_night, 110.0);

    api.delete_property("p9").await.unwrap();
    assert_eq!(api.stats().requests_failed, 0);
}

#[tokio::test]
async fn test_review_and_booking_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/properties/p1/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "_id": "r1",
            "user": { "_id": "u2", "name": "Pablo" },
            "property": "p1",
            "rating": 5,
            "comment": "Perfecto"
        }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/reviews/r1"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "Review removed" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/bookings/b7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "b7",
            "property": "p1",
            "checkInDate": "2030-01-10T00:00:00.000Z",
            "checkOutDate": "2030-01-12T00:00:00.000Z",
            "guestCount": 2,
            "totalPrice": 215.0,
            "status": "pending"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpRentalApi::new(&config(&server), logged_in_store("tok-1")).unwrap();

    let reviews = api.property_reviews("p1").await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].user.name, "Pablo");
    assert_eq!(reviews[0].rating, 5);

    api.delete_review("r1").await.unwrap();

    let booking = api.get_booking("b7").await.unwrap();
    assert_eq!(booking.guest_count, 2);
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.check_in_date.to_string(), "2030-01-10");
}
