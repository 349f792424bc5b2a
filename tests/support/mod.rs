use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// A scripted peer for the client under test: every accepted connection
/// and raw request is recorded, responses are canned.
pub struct Server {
    pub url: String,
    accepts: Arc<AtomicUsize>,
    requests: Receiver<Vec<u8>>,
}

impl Server {
    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// The next raw request the server read, as bytes on the wire.
    pub fn request(&self) -> Vec<u8> {
        self.requests
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("server saw no request")
    }
}

fn spawn<F>(script: F) -> Server
where
    F: FnOnce(TcpListener, Arc<AtomicUsize>, Sender<Vec<u8>>) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    let accepts = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = channel();

    let counter = accepts.clone();
    thread::spawn(move || script(listener, counter, tx));

    Server {
        url,
        accepts,
        requests: rx,
    }
}

/// One accepted connection serving `responses` in order, kept alive in
/// between.
pub fn keep_alive_server(responses: Vec<String>) -> Server {
    spawn(move |listener, accepts, tx| {
        let (mut stream, _) = listener.accept().unwrap();
        accepts.fetch_add(1, Ordering::SeqCst);
        for response in responses {
            match read_request(&mut stream) {
                Some(request) => tx.send(request).ok(),
                None => return,
            };
            stream.write_all(response.as_bytes()).unwrap();
        }
    })
}

/// Each response is served on its own accepted connection, which is then
/// closed.
pub fn close_per_request_server(responses: Vec<String>) -> Server {
    spawn(move |listener, accepts, tx| {
        for response in responses {
            let (mut stream, _) = listener.accept().unwrap();
            accepts.fetch_add(1, Ordering::SeqCst);
            match read_request(&mut stream) {
                Some(request) => tx.send(request).ok(),
                None => return,
            };
            stream.write_all(response.as_bytes()).unwrap();
        }
    })
}

/// Accepts and immediately drops `failures` connections, then serves one
/// request per later connection.
pub fn flaky_server(failures: usize, responses: Vec<String>) -> Server {
    spawn(move |listener, accepts, tx| {
        for _ in 0..failures {
            let (stream, _) = listener.accept().unwrap();
            accepts.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
        for response in responses {
            let (mut stream, _) = listener.accept().unwrap();
            accepts.fetch_add(1, Ordering::SeqCst);
            match read_request(&mut stream) {
                Some(request) => tx.send(request).ok(),
                None => return,
            };
            stream.write_all(response.as_bytes()).unwrap();
        }
    })
}

/// Accepts one connection, reads one request, and never answers.
pub fn silent_server() -> Server {
    spawn(move |listener, accepts, tx| {
        let (mut stream, _) = listener.accept().unwrap();
        accepts.fetch_add(1, Ordering::SeqCst);
        if let Some(request) = read_request(&mut stream) {
            tx.send(request).ok();
        }
        // hold the connection open until the client gives up
        let mut byte = [0u8; 1];
        let _ = stream.read(&mut byte);
    })
}

/// One connection: reads `count` requests before answering any of them,
/// then writes all responses back to back.
pub fn pipelined_server(count: usize, responses: Vec<String>) -> Server {
    spawn(move |listener, accepts, tx| {
        let (mut stream, _) = listener.accept().unwrap();
        accepts.fetch_add(1, Ordering::SeqCst);
        for _ in 0..count {
            match read_request(&mut stream) {
                Some(request) => tx.send(request).ok(),
                None => return,
            };
        }
        for response in responses {
            stream.write_all(response.as_bytes()).unwrap();
        }
    })
}

/// Reads one full request (head plus any sized or chunked body) off the
/// stream, byte by byte. Returns `None` on EOF.
fn read_request(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) => return None,
            Ok(_) => head.push(byte[0]),
            Err(_) => return None,
        }
    }

    let text = String::from_utf8_lossy(&head).to_ascii_lowercase();
    let content_length = text
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let chunked = text.contains("transfer-encoding: chunked");

    let mut body = Vec::new();
    if chunked {
        while !body.ends_with(b"0\r\n\r\n") {
            match stream.read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => body.push(byte[0]),
                Err(_) => return None,
            }
        }
    } else {
        for _ in 0..content_length {
            match stream.read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => body.push(byte[0]),
                Err(_) => return None,
            }
        }
    }

    head.extend_from_slice(&body);
    Some(head)
}
