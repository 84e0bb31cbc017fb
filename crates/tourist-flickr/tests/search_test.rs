use serde_json::json;
use tourist_core::{Error, PhotoSearch};
use tourist_flickr::{FlickrClient, FlickrConfig};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> FlickrClient {
    let config = FlickrConfig::new("test-key").with_api_url(format!("{}/services/rest/", server.uri()));
    FlickrClient::new(config).expect("valid config")
}

fn photo_json(i: usize) -> serde_json::Value {
    json!({
        "id": format!("5301{i:04}"),
        "owner": "12345678@N00",
        "secret": format!("s{i:03}"),
        "server": "65535",
        "farm": 66,
        "title": format!("Photo {i}"),
        "ispublic": 1
    })
}

#[tokio::test]
async fn test_search_sends_expected_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("method", "flickr.photos.search"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("format", "json"))
        .and(query_param("nojsoncallback", "1"))
        .and(query_param("per_page", "500"))
        .and(query_param("lat", "48.8566"))
        .and(query_param("lon", "2.3522"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": {"page": 1, "pages": 1, "perpage": 500, "total": 3,
                       "photo": [photo_json(1), photo_json(2), photo_json(3)]},
            "stat": "ok"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results = client_for(&server).search(48.8566, 2.3522).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].farm, "66");
    assert_eq!(results[0].server, "65535");
    assert_eq!(results[0].id, "53010001");
    assert_eq!(results[0].secret, "s001");
}

#[tokio::test]
async fn test_search_sends_recent_min_upload_date() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": {"photo": []}, "stat": "ok"
        })))
        .mount(&server)
        .await;

    client_for(&server).search(0.0, 0.0).await.unwrap();

    let requests = server.received_requests().await.expect("recording enabled");
    let min_upload: i64 = requests[0]
        .url
        .query_pairs()
        .find(|(k, _)| k == "min_upload_date")
        .map(|(_, v)| v.parse().unwrap())
        .expect("min_upload_date present");
    let expected = (chrono::Utc::now() - chrono::Duration::days(365)).timestamp();
    assert!((expected - min_upload).abs() < 60);
}

#[tokio::test]
async fn test_search_empty_container_is_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": {"page": 1, "pages": 0, "perpage": 500, "total": 0, "photo": []},
            "stat": "ok"
        })))
        .mount(&server)
        .await;

    let results = client_for(&server).search(-77.85, 166.67).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_search_missing_container_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stat": "ok"})))
        .mount(&server)
        .await;

    let err = client_for(&server).search(1.0, 1.0).await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn test_search_api_failure_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stat": "fail", "code": 100, "message": "Invalid API Key (Key has invalid format)"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).search(1.0, 1.0).await.unwrap_err();
    match err {
        Error::Parse(msg) => assert!(msg.contains("Invalid API Key")),
        other => panic!("Expected Parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_search_invalid_json_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("jsonFlickrApi({\"stat\":\"ok\"})"))
        .mount(&server)
        .await;

    let err = client_for(&server).search(1.0, 1.0).await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn test_search_server_error_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&server)
        .await;

    let err = client_for(&server).search(1.0, 1.0).await.unwrap_err();
    match err {
        Error::Network(msg) => {
            assert!(msg.contains("503"));
            assert!(msg.contains("service unavailable"));
        }
        other => panic!("Expected Network error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_search_unreachable_host_is_network_error() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    drop(server);

    let err = client.search(1.0, 1.0).await.unwrap_err();
    assert!(matches!(err, Error::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn test_search_skips_incomplete_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": {"photo": [
                photo_json(1),
                {"id": "2", "server": "65535", "farm": 66},
                {"id": "3", "secret": "x/y", "server": "65535", "farm": 66},
                photo_json(4)
            ]},
            "stat": "ok"
        })))
        .mount(&server)
        .await;

    let results = client_for(&server).search(1.0, 1.0).await.unwrap();
    let ids: Vec<_> = results.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["53010001", "53010004"]);
}
