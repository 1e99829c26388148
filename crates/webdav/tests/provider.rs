//! Provider operations through the full transport stack

use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use wiremock::matchers::{body_bytes, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ca_core::{ByteStream, CloudPath, CloudProvider, Error, NetworkTimeouts, no_progress};
use ca_webdav::{WebDavCloudProvider, WebDavCredential};

fn credential(server: &MockServer) -> WebDavCredential {
    WebDavCredential::from_url(&format!("{}/dav", server.uri()), "foo", "bar").unwrap()
}

fn multistatus(responses: &[(&str, Option<u64>)]) -> String {
    let mut body = String::from(r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:">"#);
    for (href, size) in responses {
        let props = match size {
            Some(size) => format!("<d:resourcetype/><d:getcontentlength>{size}</d:getcontentlength>"),
            None => "<d:resourcetype><d:collection/></d:resourcetype>".to_string(),
        };
        body.push_str(&format!(
            "<d:response><d:href>{href}</d:href><d:propstat><d:prop>{props}</d:prop>\
             <d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"
        ));
    }
    body.push_str("</d:multistatus>");
    body
}

async fn mount_server_check(server: &MockServer) {
    Mock::given(method("OPTIONS"))
        .and(path("/dav"))
        .respond_with(ResponseTemplate::new(200).insert_header("DAV", "1, 2"))
        .mount(server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/dav/"))
        .and(header("depth", "0"))
        .respond_with(ResponseTemplate::new(207).set_body_string(multistatus(&[("/dav/", None)])))
        .mount(server)
        .await;
}

async fn connect(server: &MockServer) -> WebDavCloudProvider {
    WebDavCloudProvider::connect(&credential(server), &NetworkTimeouts::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_connect_checks_server() {
    let server = MockServer::start().await;
    mount_server_check(&server).await;

    connect(&server).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method.as_str(), "OPTIONS");
    assert_eq!(requests[1].method.as_str(), "PROPFIND");
}

#[tokio::test]
async fn test_connect_rejects_non_webdav_server() {
    let server = MockServer::start().await;
    Mock::given(method("OPTIONS"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = WebDavCloudProvider::connect(&credential(&server), &NetworkTimeouts::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ServerNotCompatible(_)), "{err}");
}

#[tokio::test]
async fn test_connect_reports_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("OPTIONS"))
        .respond_with(ResponseTemplate::new(200).insert_header("DAV", "1"))
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="dav""#),
        )
        .mount(&server)
        .await;

    let err = WebDavCloudProvider::connect(&credential(&server), &NetworkTimeouts::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unauthorized), "{err}");
}

#[tokio::test]
async fn test_connect_tolerates_failing_root_lookup() {
    // known leniency: the credential check only reports Unauthorized
    let server = MockServer::start().await;
    Mock::given(method("OPTIONS"))
        .respond_with(ResponseTemplate::new(200).insert_header("DAV", "1"))
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    WebDavCloudProvider::connect(&credential(&server), &NetworkTimeouts::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_and_metadata() {
    let server = MockServer::start().await;
    mount_server_check(&server).await;
    Mock::given(method("PROPFIND"))
        .and(path("/dav/My%20Folder"))
        .and(header("depth", "1"))
        .respond_with(ResponseTemplate::new(207).set_body_string(multistatus(&[
            ("/dav/My%20Folder/", None),
            ("/dav/My%20Folder/b.txt", Some(2)),
            ("/dav/My%20Folder/sub/", None),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/dav/My%20Folder/b.txt"))
        .and(header("depth", "0"))
        .respond_with(
            ResponseTemplate::new(207)
                .set_body_string(multistatus(&[("/dav/My%20Folder/b.txt", Some(2))])),
        )
        .mount(&server)
        .await;

    let provider = connect(&server).await;
    let folder = CloudPath::new("/My Folder").unwrap();

    let list = provider.list(&folder, None).await.unwrap();
    let paths: Vec<&str> = list.items.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(paths, vec!["/My Folder/b.txt", "/My Folder/sub"]);
    assert!(list.items[1].is_folder());

    let metadata = provider
        .item_metadata(&CloudPath::new("/My Folder/b.txt").unwrap())
        .await
        .unwrap();
    assert_eq!(metadata.name, "b.txt");
    assert_eq!(metadata.size, Some(2));
}

#[tokio::test]
async fn test_read_range_through_provider() {
    let server = MockServer::start().await;
    mount_server_check(&server).await;
    Mock::given(method("GET"))
        .and(path("/dav/About.txt"))
        .and(header("range", "bytes=4-6"))
        .respond_with(ResponseTemplate::new(206).set_body_string("o, "))
        .mount(&server)
        .await;

    let provider = connect(&server).await;
    let mut stream = provider
        .read_range(&CloudPath::new("/About.txt").unwrap(), 4, 3, no_progress())
        .await
        .unwrap();

    let mut content = String::new();
    stream.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "o, ");
}

#[tokio::test]
async fn test_write_new_file_reports_progress() {
    let server = MockServer::start().await;
    mount_server_check(&server).await;
    let written = multistatus(&[("/dav/foo.txt", Some(8193))]);
    // existence check first, then the re-fetch after the upload
    Mock::given(method("PROPFIND"))
        .and(path("/dav/foo.txt"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/dav/foo.txt"))
        .respond_with(ResponseTemplate::new(207).set_body_string(written))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/dav/foo.txt"))
        .and(body_bytes(vec![b'x'; 8193]))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let provider = connect(&server).await;
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let data: ByteStream = Box::pin(std::io::Cursor::new(vec![b'x'; 8193]));

    let metadata = provider
        .write(
            &CloudPath::new("/foo.txt").unwrap(),
            false,
            data,
            Arc::new(move |bytes: u64| sink.lock().unwrap().push(bytes)),
        )
        .await
        .unwrap();

    assert_eq!(metadata.size, Some(8193));
    assert_eq!(*progress.lock().unwrap(), vec![8192, 8193]);
}

#[tokio::test]
async fn test_move_without_replace_collides() {
    let server = MockServer::start().await;
    mount_server_check(&server).await;
    Mock::given(method("MOVE"))
        .and(path("/dav/foo"))
        .and(header("overwrite", "F"))
        .and(header_exists("destination"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let provider = connect(&server).await;
    let err = provider
        .move_item(
            &CloudPath::new("/foo").unwrap(),
            &CloudPath::new("/bar").unwrap(),
            false,
        )
        .await
        .unwrap_err();

    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_delete_missing_node() {
    let server = MockServer::start().await;
    mount_server_check(&server).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let provider = connect(&server).await;
    let err = provider
        .delete(&CloudPath::new("/nothing").unwrap())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}
