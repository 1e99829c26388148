//! End-to-end tests of the reqwest transport stack against a local server

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{Method, StatusCode, header};
use url::Url;
use wiremock::matchers::{header as header_eq, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use ca_core::{NetworkTimeouts, ProgressListener, no_progress};
use ca_webdav::{
    DavRequest, HttpTransport, Origin, RequestBody, WebDavCredential, build_transport,
};

const BASIC_FOO_BAR: &str = "Basic Zm9vOmJhcg==";

fn credential(server: &MockServer) -> WebDavCredential {
    WebDavCredential::from_url(&format!("{}/dav", server.uri()), "foo", "bar").unwrap()
}

fn get(server: &MockServer, p: &str) -> DavRequest {
    DavRequest::new(Method::GET, Url::parse(&format!("{}{p}", server.uri())).unwrap())
}

fn authorization(request: &Request) -> Option<&str> {
    request
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

fn digest_params(value: &str) -> HashMap<String, String> {
    value
        .trim_start_matches("Digest ")
        .split(", ")
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.trim_matches('"').to_string()))
        .collect()
}

/// Accepts only a correct `qop=auth` MD5 digest for foo/bar
struct ValidDigest {
    realm: &'static str,
    nonce: &'static str,
}

impl Match for ValidDigest {
    fn matches(&self, request: &Request) -> bool {
        let Some(value) = authorization(request) else {
            return false;
        };
        if !value.starts_with("Digest ") {
            return false;
        }
        let params = digest_params(value);
        let (Some(uri), Some(nc), Some(cnonce), Some(response)) = (
            params.get("uri"),
            params.get("nc"),
            params.get("cnonce"),
            params.get("response"),
        ) else {
            return false;
        };

        let ha1 = format!("{:x}", md5::compute(format!("foo:{}:bar", self.realm)));
        let ha2 = format!("{:x}", md5::compute(format!("{}:{uri}", request.method)));
        let expected = format!(
            "{:x}",
            md5::compute(format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", self.nonce))
        );
        uri == request.url.path() && *response == expected
    }
}

#[tokio::test]
async fn test_basic_challenge_is_answered_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dav/file.txt"))
        .and(header_eq("authorization", BASIC_FOO_BAR))
        .respond_with(ResponseTemplate::new(200).set_body_string("content"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="test""#),
        )
        .with_priority(5)
        .mount(&server)
        .await;

    let credential = credential(&server);
    let transport = build_transport(&credential, &NetworkTimeouts::default()).unwrap();

    let response = transport.execute(get(&server, "/dav/file.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.bytes().await.unwrap(), "content");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(authorization(&requests[0]), None);
    assert_eq!(authorization(&requests[1]), Some(BASIC_FOO_BAR));

    // second request authenticates up front
    let response = transport.execute(get(&server, "/dav/file.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(authorization(&requests[2]), Some(BASIC_FOO_BAR));

    let origin = Origin::of(credential.base_url());
    assert_eq!(transport.inner().authenticator().cached_scheme(&origin), Some("basic"));
}

#[tokio::test]
async fn test_digest_challenge_is_answered() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(ValidDigest {
            realm: "webdav",
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093",
        })
        .respond_with(ResponseTemplate::new(207))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            r#"Digest realm="webdav", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", qop="auth", algorithm=MD5"#,
        ))
        .with_priority(5)
        .mount(&server)
        .await;

    let transport = build_transport(&credential(&server), &NetworkTimeouts::default()).unwrap();
    let propfind = || {
        DavRequest::new(
            Method::from_bytes(b"PROPFIND").unwrap(),
            Url::parse(&format!("{}/dav/", server.uri())).unwrap(),
        )
    };

    let first = transport.execute(propfind()).await.unwrap();
    assert_eq!(first.status, StatusCode::MULTI_STATUS);
    let second = transport.execute(propfind()).await.unwrap();
    assert_eq!(second.status, StatusCode::MULTI_STATUS);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    let nc: Vec<String> = requests[1..]
        .iter()
        .map(|r| digest_params(authorization(r).unwrap())["nc"].clone())
        .collect();
    assert_eq!(nc, vec!["00000001", "00000002"]);
}

#[tokio::test]
async fn test_rejected_credentials_surface_as_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="test""#),
        )
        .mount(&server)
        .await;

    let transport = build_transport(&credential(&server), &NetworkTimeouts::default()).unwrap();
    let response = transport.execute(get(&server, "/dav/file.txt")).await.unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    // one challenge answer, no loop
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_redirect_is_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dav/old.txt"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/dav/new.txt"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dav/new.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved content"))
        .mount(&server)
        .await;

    let transport = build_transport(&credential(&server), &NetworkTimeouts::default()).unwrap();
    let response = transport.execute(get(&server, "/dav/old.txt")).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.url.path(), "/dav/new.txt");
    assert_eq!(response.body.bytes().await.unwrap(), "moved content");
}

#[tokio::test]
async fn test_cross_origin_redirect_gets_no_credentials() {
    let home = MockServer::start().await;
    let elsewhere = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header_eq("authorization", BASIC_FOO_BAR))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/collect", elsewhere.uri()).as_str()),
        )
        .with_priority(1)
        .mount(&home)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="home""#),
        )
        .with_priority(5)
        .mount(&home)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="elsewhere""#),
        )
        .mount(&elsewhere)
        .await;

    let transport = build_transport(&credential(&home), &NetworkTimeouts::default()).unwrap();
    let response = transport.execute(get(&home, "/dav/file.txt")).await.unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let leaked = elsewhere.received_requests().await.unwrap();
    assert_eq!(leaked.len(), 1);
    assert_eq!(authorization(&leaked[0]), None);
}

#[tokio::test]
async fn test_upload_body_is_sent_with_length() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/dav/up.bin"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let transport = build_transport(&credential(&server), &NetworkTimeouts::default()).unwrap();
    let request = DavRequest::new(
        Method::PUT,
        Url::parse(&format!("{}/dav/up.bin", server.uri())).unwrap(),
    )
    .body(RequestBody::with_progress(vec![7u8; 20_000], no_progress()));

    let response = transport.execute(request).await.unwrap();
    assert_eq!(response.status, StatusCode::CREATED);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].body.len(), 20_000);
    assert_eq!(
        requests[0].headers.get(header::CONTENT_LENGTH).unwrap(),
        "20000"
    );
}

fn put(server: &MockServer, p: &str, body: RequestBody) -> DavRequest {
    DavRequest::new(Method::PUT, Url::parse(&format!("{}{p}", server.uri())).unwrap()).body(body)
}

fn recording_listener() -> (Arc<dyn ProgressListener>, Arc<Mutex<Vec<u64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener: Arc<dyn ProgressListener> =
        Arc::new(move |bytes: u64| sink.lock().unwrap().push(bytes));
    (listener, seen)
}

fn short_write_timeout() -> NetworkTimeouts {
    NetworkTimeouts {
        write_secs: 1,
        ..NetworkTimeouts::default()
    }
}

#[tokio::test]
async fn test_slow_response_after_upload_is_not_a_write_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/dav/slow.txt"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;

    let transport = build_transport(&credential(&server), &short_write_timeout()).unwrap();
    let response = transport
        .execute(put(&server, "/dav/slow.txt", RequestBody::bytes(vec![1u8; 10])))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_stalled_upload_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    // the writer stays open and silent, so the body never progresses
    let (reader, writer) = tokio::io::duplex(64);
    let body = RequestBody::streamed(Box::pin(reader), no_progress());

    let transport = build_transport(&credential(&server), &short_write_timeout()).unwrap();
    let err = transport
        .execute(put(&server, "/dav/stalled.bin", body))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("timed out"), "{err}");
    drop(writer);
}

#[tokio::test]
async fn test_streamed_upload_sends_whole_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/dav/stream.bin"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let (listener, seen) = recording_listener();
    let data = std::io::Cursor::new(vec![3u8; 20_000]);
    let body = RequestBody::streamed(Box::pin(data), listener);

    let transport = build_transport(&credential(&server), &NetworkTimeouts::default()).unwrap();
    let response = transport
        .execute(put(&server, "/dav/stream.bin", body))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::CREATED);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].body, vec![3u8; 20_000]);
    assert_eq!(*seen.lock().unwrap(), vec![8192, 16384, 20_000]);
}

#[tokio::test]
async fn test_upload_progress_never_goes_backwards_after_challenge() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(header_eq("authorization", BASIC_FOO_BAR))
        .respond_with(ResponseTemplate::new(201))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Basic realm=\"dav\""),
        )
        .with_priority(5)
        .mount(&server)
        .await;

    let (listener, seen) = recording_listener();
    let body = RequestBody::with_progress(vec![9u8; 8193], listener);

    let transport = build_transport(&credential(&server), &NetworkTimeouts::default()).unwrap();
    let response = transport
        .execute(put(&server, "/dav/twice.bin", body))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert_eq!(*seen, vec![8192, 8193]);
}

#[tokio::test]
async fn test_streamed_upload_is_not_resent_after_challenge() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Basic realm=\"dav\""),
        )
        .mount(&server)
        .await;

    let data = std::io::Cursor::new(b"once only".to_vec());
    let body = RequestBody::streamed(Box::pin(data), no_progress());

    let transport = build_transport(&credential(&server), &NetworkTimeouts::default()).unwrap();
    let response = transport
        .execute(put(&server, "/dav/once.txt", body))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
