//! Scripted HTTP service used by the session integration tests.
//!
//! Routes match on a path marker; each hit pops the next scripted JSON body
//! for that route, repeating the last one once the script runs out so tests
//! stay insensitive to poll timing. Every request line is recorded for
//! assertions about which endpoints were hit.

use std::{
    collections::VecDeque,
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    sync::{Arc, Mutex},
    thread,
};

pub struct Route {
    marker: &'static str,
    bodies: VecDeque<String>,
}

impl Route {
    pub fn new(marker: &'static str, bodies: impl IntoIterator<Item = String>) -> Self {
        Self {
            marker,
            bodies: bodies.into_iter().collect(),
        }
    }
}

pub struct MockService {
    base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl MockService {
    /// Bind a local listener and serve the scripted routes until the test
    /// binary exits.
    pub fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock service");
        let addr = listener.local_addr().expect("mock service addr");
        let hits = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(Mutex::new(routes));

        let thread_hits = hits.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                handle_connection(stream, &routes, &thread_hits);
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            hits,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request lines seen so far, e.g. `"GET /api/training-status/1001"`.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("hits mutex poisoned").clone()
    }
}

fn handle_connection(
    mut stream: TcpStream,
    routes: &Arc<Mutex<Vec<Route>>>,
    hits: &Arc<Mutex<Vec<String>>>,
) {
    let Some(request_line) = read_request(&mut stream) else {
        return;
    };
    hits.lock().expect("hits mutex poisoned").push(request_line.clone());

    let body = next_body(routes, &request_line);
    let response = match body {
        Some(body) => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}"
            .to_string(),
    };
    let _ = stream.write_all(response.as_bytes());
}

/// Read headers (and any body) until the request is complete, returning the
/// request line without the HTTP version.
fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let read = stream.read(&mut buf).ok()?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..read]);
        if let Some(header_end) = find_header_end(&raw) {
            let headers = String::from_utf8_lossy(&raw[..header_end]).to_string();
            let content_length = content_length(&headers);
            if raw.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    let text = String::from_utf8_lossy(&raw);
    let request_line = text.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    Some(format!("{method} {path}"))
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0)
}

fn next_body(routes: &Arc<Mutex<Vec<Route>>>, request_line: &str) -> Option<String> {
    let mut routes = routes.lock().expect("routes mutex poisoned");
    let route = routes
        .iter_mut()
        .find(|route| request_line.contains(route.marker))?;
    if route.bodies.len() > 1 {
        route.bodies.pop_front()
    } else {
        route.bodies.front().cloned()
    }
}
