use std::sync::{Arc, Mutex};

use wirecall::{
    Connection, Error, Exchange, Headers, Method, Middleware, Query, QueryValue, RequestOptions,
    Response, StatusCode,
};

#[allow(dead_code)]
mod support;

#[test]
fn basic_get_round_trip() {
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world".to_string(),
    ]);

    let connection = Connection::new(&server.url).unwrap();
    let response = connection
        .get(RequestOptions::new().with_path("/p"))
        .unwrap();

    assert_eq!(response.status, StatusCode(200));
    assert_eq!(response.body, b"hello world");
    assert_eq!(response.remote_ip.as_deref(), Some("127.0.0.1"));

    let host = server.url.trim_start_matches("http://").to_string();
    let expected = format!("GET /p HTTP/1.1\r\nHost: {}\r\n\r\n", host);
    assert_eq!(String::from_utf8(server.request()).unwrap(), expected);
}

#[test]
fn post_carries_a_sized_body() {
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n".to_string(),
    ]);

    let connection = Connection::new(&server.url).unwrap();
    let response = connection
        .post(RequestOptions::new().with_path("/p").with_body("ab"))
        .unwrap();
    assert_eq!(response.status, StatusCode(201));

    let request = String::from_utf8(server.request()).unwrap();
    assert!(request.starts_with("POST /p HTTP/1.1\r\n"));
    assert!(request.contains("Content-Length: 2\r\n"));
    assert!(request.ends_with("\r\n\r\nab"));
}

#[test]
fn chunked_upload_from_a_pull_source() {
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_string(),
    ]);

    let connection = Connection::new(&server.url).unwrap();
    let mut chunks = vec![Vec::new(), b"hi".to_vec()];
    connection
        .put(
            RequestOptions::new()
                .with_path("/p")
                .with_request_block(move || chunks.pop().unwrap_or_default()),
        )
        .unwrap();

    let request = String::from_utf8(server.request()).unwrap();
    assert!(request.contains("Transfer-Encoding: chunked\r\n"));
    assert!(!request.contains("Content-Length"));
    assert!(request.ends_with("\r\n\r\n2\r\nhi\r\n0\r\n\r\n"));
}

#[test]
fn chunked_response_is_decoded() {
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n".to_string(),
    ]);

    let connection = Connection::new(&server.url).unwrap();
    let response = connection.get(RequestOptions::new()).unwrap();

    assert_eq!(response.status, StatusCode(200));
    assert_eq!(response.body, b"hello");
}

#[test]
fn query_mapping_is_serialized_on_the_wire() {
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_string(),
    ]);

    let connection = Connection::new(&server.url).unwrap();
    connection
        .get(RequestOptions::new().with_query(Query::Pairs(vec![
            ("a".to_string(), QueryValue::One("1".to_string())),
            (
                "b".to_string(),
                QueryValue::Many(vec!["2".to_string(), "3".to_string()]),
            ),
            ("c".to_string(), QueryValue::Empty),
        ])))
        .unwrap();

    let request = String::from_utf8(server.request()).unwrap();
    assert!(request.starts_with("GET /?a=1&b=2&b=3&c HTTP/1.1\r\n"));
}

#[test]
fn clear_text_proxying_rewrites_the_request_line() {
    // the scripted server plays the proxy; the destination never exists
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_string(),
    ]);

    let connection = Connection::with_options(
        "http://h:80",
        RequestOptions::new().with_proxy_url(&server.url),
    )
    .unwrap();
    connection.get(RequestOptions::new().with_path("/p")).unwrap();

    assert_eq!(
        String::from_utf8(server.request()).unwrap(),
        "GET http://h:80/p HTTP/1.1\r\nHost: h:80\r\nProxy-Connection: Keep-Alive\r\n\r\n"
    );
}

#[test]
fn head_skips_the_response_body() {
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\n".to_string(),
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_string(),
    ]);

    let connection = Connection::new(&server.url).unwrap();
    let head = connection.head(RequestOptions::new()).unwrap();
    assert!(head.body.is_empty());
    assert_eq!(head.header("Content-Length"), Some("11"));

    // the socket is still in sync for the next request
    let next = connection.get(RequestOptions::new()).unwrap();
    assert_eq!(next.body, b"ok");
    assert_eq!(server.accepts(), 1);
}

#[test]
fn unexpected_status_raises_with_the_response() {
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\n\r\ngone".to_string(),
    ]);

    let connection = Connection::new(&server.url).unwrap();
    let err = connection
        .get(RequestOptions::new().with_expects([200]))
        .unwrap_err();

    match err {
        Error::HttpStatus(response) => {
            assert_eq!(response.status, StatusCode(404));
            assert_eq!(response.body, b"gone");
        }
        other => panic!("expected HttpStatus, got {:?}", other),
    }
}

#[test]
fn streamed_download_reaches_the_sink() {
    let server = support::keep_alive_server(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_string(),
    ]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let connection = Connection::new(&server.url).unwrap();
    let response = connection
        .get(
            RequestOptions::new()
                .with_chunk_size(2)
                .with_response_block(move |chunk, remaining, total| {
                    sink.lock()
                        .unwrap()
                        .push((chunk.to_vec(), remaining, total));
                }),
        )
        .unwrap();

    assert!(response.body.is_empty());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (b"he".to_vec(), Some(3), Some(5)),
            (b"ll".to_vec(), Some(1), Some(5)),
            (b"o".to_vec(), Some(0), Some(5)),
        ]
    );
}

struct Stubbed;

impl Middleware for Stubbed {
    fn request_call(&self, exchange: &mut Exchange) -> Result<(), Error> {
        exchange.response = Some(Response {
            status: StatusCode(200),
            headers: Headers::new(),
            body: b"stubbed".to_vec(),
            remote_ip: None,
        });
        Ok(())
    }
}

#[test]
fn middleware_can_answer_without_touching_the_network() {
    // port 9 goes nowhere; the middleware must answer first
    let connection = Connection::with_options(
        "http://127.0.0.1:9",
        RequestOptions::new()
            .with_middlewares(vec![Arc::new(Stubbed), Arc::new(wirecall::Expects)]),
    )
    .unwrap();

    let response = connection
        .get(RequestOptions::new().with_expects([200]))
        .unwrap();
    assert_eq!(response.body, b"stubbed");
}

struct NoStub;

impl Middleware for NoStub {
    fn request_call(&self, exchange: &mut Exchange) -> Result<(), Error> {
        Err(Error::StubNotFound(format!(
            "{} {}",
            exchange.method, exchange.path
        )))
    }
}

#[test]
fn stub_misses_propagate_unchanged() {
    let connection = Connection::with_options(
        "http://127.0.0.1:9",
        RequestOptions::new().with_middlewares(vec![Arc::new(NoStub)]),
    )
    .unwrap();

    // even an idempotent request must not retry a stub miss
    let err = connection
        .get(RequestOptions::new().with_idempotent(true))
        .unwrap_err();
    assert!(matches!(err, Error::StubNotFound(_)));

    match err {
        Error::StubNotFound(msg) => assert_eq!(msg, "GET /"),
        _ => unreachable!(),
    }
}

#[test]
fn file_bodies_are_sized_from_metadata() {
    use std::io::Write;

    let server = support::keep_alive_server(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_string(),
    ]);

    let path = std::env::temp_dir().join(format!("wirecall-test-{}", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"file body").unwrap();
    }
    let file = std::fs::File::open(&path).unwrap();

    let connection = Connection::new(&server.url).unwrap();
    connection
        .request(
            RequestOptions::new()
                .with_method(Method::Post)
                .with_body(file),
        )
        .unwrap();

    let request = String::from_utf8(server.request()).unwrap();
    assert!(request.contains("Content-Length: 9\r\n"));
    assert!(request.ends_with("\r\n\r\nfile body"));

    std::fs::remove_file(&path).ok();
}
