//! Local HTTP server answering canned responses, for exercising the real
//! reqwest code paths without leaving the machine.

use reqwest::{Client, StatusCode, redirect::Policy};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

#[derive(Debug, Clone)]
pub struct Canned {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Canned {
    pub fn status(status: u16) -> Self {
        Canned {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn body(status: u16, body: impl Into<String>) -> Self {
        Canned {
            body: body.into(),
            ..Canned::status(status)
        }
    }

    pub fn redirect(location: &str) -> Self {
        Canned::status(302).header("Location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn render(&self) -> String {
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        let mut out = format!(
            "HTTP/1.1 {} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.body.len()
        );
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

/// Client that talks to the local server directly and never follows redirects.
pub fn local_client() -> Client {
    Client::builder()
        .no_proxy()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

/// Same as [`local_client`], following redirects.
pub fn redirecting_client() -> Client {
    Client::builder().no_proxy().build().unwrap()
}

/// A running server; `origin` is its base URL, `requests` the request
/// lines it has received, in order.
pub struct Server {
    pub origin: Url,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Server {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Serves `routes`, keyed by request target (path and query). Unknown
/// targets get a 500.
pub async fn serve(routes: &[(&str, Canned)]) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    let routes: Arc<HashMap<String, Canned>> = Arc::new(
        routes
            .iter()
            .map(|(target, canned)| ((*target).to_string(), canned.clone()))
            .collect(),
    );
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            let seen = Arc::clone(&seen);
            tokio::spawn(async move { answer(stream, &routes, &seen).await });
        }
    });

    Server { origin, requests }
}

async fn answer(
    mut stream: TcpStream,
    routes: &HashMap<String, Canned>,
    seen: &Mutex<Vec<String>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let split = buf.windows(4).position(|w| w == b"\r\n\r\n").unwrap_or(0) + 4;
    let head = String::from_utf8_lossy(&buf[..split]).to_string();
    let length: usize = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0);
    let mut body_read = buf.len() - split;
    while body_read < length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => body_read += n,
        }
    }

    let line = head.lines().next().unwrap_or_default().to_string();
    let target = line.split_whitespace().nth(1).unwrap_or_default().to_string();
    seen.lock().unwrap().push(line);

    let canned = routes
        .get(&target)
        .cloned()
        .unwrap_or_else(|| Canned::status(500));
    let _ = stream.write_all(canned.render().as_bytes()).await;
    let _ = stream.shutdown().await;
}
