use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_std::net::{TcpListener, TcpStream};
use async_std::prelude::*;
use async_std::task;

use rustymux::config::ServerConfig;
use rustymux::handler::{HandlerFunc, text};
use rustymux::http::request::HttpRequest;
use rustymux::http::response::HttpResponse;
use rustymux::http::status::HttpStatus;
use rustymux::{ConnState, Handler, Server};

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Splits a buffer holding one or more responses without bodies spanning
/// past their Content-Length.
fn parse_replies(raw: &str) -> Vec<Reply> {
    let mut replies = Vec::new();
    let mut rest = raw;
    while let Some((head, tail)) = rest.split_once("\r\n\r\n") {
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap();
        let status = status_line.split(' ').nth(1).unwrap().parse().unwrap();
        let headers: Vec<(String, String)> = lines
            .map(|l| {
                let (n, v) = l.split_once(':').unwrap();
                (n.trim().to_string(), v.trim().to_string())
            })
            .collect();
        let len = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.parse::<usize>().unwrap())
            .unwrap_or(0);
        replies.push(Reply {
            status,
            headers,
            body: tail[..len].to_string(),
        });
        rest = &tail[len..];
    }
    replies
}

async fn start(server: Server, handler: Option<Arc<dyn Handler>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    task::spawn(async move {
        let _ = server.serve(listener, handler).await;
    });
    addr
}

async fn exchange(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    out
}

async fn get(addr: SocketAddr, host: &str, target: &str) -> Reply {
    let raw = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        target, host
    );
    parse_replies(&exchange(addr, &raw).await).remove(0)
}

fn named(name: &'static str) -> HandlerFunc<impl Fn(&mut HttpResponse, &HttpRequest) + Send + Sync> {
    HandlerFunc(move |res: &mut HttpResponse, _req: &HttpRequest| {
        text(res, HttpStatus::Ok, name)
    })
}

fn counting(hits: Arc<AtomicUsize>) -> HandlerFunc<impl Fn(&mut HttpResponse, &HttpRequest) + Send + Sync> {
    HandlerFunc(move |res: &mut HttpResponse, _req: &HttpRequest| {
        hits.fetch_add(1, Ordering::SeqCst);
        text(res, HttpStatus::Ok, "counted")
    })
}

#[async_std::test]
async fn routes_by_longest_pattern() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/", named("A")).unwrap();
    server.mux().handle("/images/", named("B")).unwrap();
    let addr = start(server, None).await;

    assert_eq!(get(addr, "localhost", "/images/logo.png").await.body, "B");
    assert_eq!(get(addr, "localhost", "/about").await.body, "A");
    assert_eq!(get(addr, "localhost", "/images").await.body, "A");
}

#[async_std::test]
async fn host_patterns_use_host_header() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("api.example.com/v1/", named("C")).unwrap();
    server.mux().handle("/v1/", named("D")).unwrap();
    let addr = start(server, None).await;

    assert_eq!(get(addr, "api.example.com", "/v1/users").await.body, "C");
    assert_eq!(get(addr, "api.example.com:443", "/v1/users").await.body, "C");
    assert_eq!(get(addr, "other.example.com", "/v1/users").await.body, "D");
}

#[async_std::test]
async fn unknown_paths_are_404() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/known", named("k")).unwrap();
    let addr = start(server, None).await;

    let reply = get(addr, "localhost", "/unknown").await;
    assert_eq!(reply.status, 404);
    assert!(reply.body.contains("404"));
}

#[async_std::test]
async fn unclean_paths_redirect_without_running_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/docs/", counting(hits.clone())).unwrap();
    let addr = start(server, None).await;

    let reply = get(addr, "localhost", "/docs/../docs//guide").await;
    assert_eq!(reply.status, 301);
    assert_eq!(reply.header("location"), Some("/docs/guide"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let reply = get(addr, "localhost", "/docs/guide").await;
    assert_eq!(reply.body, "counted");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[async_std::test]
async fn asterisk_target_is_bad_request() {
    let hits = Arc::new(AtomicUsize::new(0));
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/", counting(hits.clone())).unwrap();
    let addr = start(server, None).await;

    // No Connection: close from the client, the server must close anyway.
    let raw = exchange(addr, "OPTIONS * HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    let replies = parse_replies(&raw);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].status, 400);
    assert_eq!(replies[0].header("connection"), Some("close"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[async_std::test]
async fn keep_alive_serves_requests_in_order() {
    let server = Server::new(ServerConfig::default());
    server
        .mux()
        .handle_func("/echo/", |res, req| text(res, HttpStatus::Ok, &req.path))
        .unwrap();
    let addr = start(server, None).await;

    let raw = exchange(
        addr,
        "GET /echo/1 HTTP/1.1\r\nHost: x\r\n\r\n\
         GET /echo/2 HTTP/1.1\r\nHost: x\r\n\r\n\
         GET /echo/3 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    )
    .await;
    let bodies: Vec<String> = parse_replies(&raw).into_iter().map(|r| r.body).collect();
    assert_eq!(bodies, vec!["/echo/1", "/echo/2", "/echo/3"]);
}

#[async_std::test]
async fn keep_alive_can_be_disabled() {
    let config = ServerConfig {
        keep_alive: false,
        ..ServerConfig::default()
    };
    let server = Server::new(config);
    server.mux().handle("/", named("once")).unwrap();
    let addr = start(server, None).await;

    let raw = exchange(
        addr,
        "GET / HTTP/1.1\r\nHost: x\r\n\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\n",
    )
    .await;
    let replies = parse_replies(&raw);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].header("connection"), Some("close"));
}

#[async_std::test]
async fn head_requests_get_no_body() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/", named("hello")).unwrap();
    let addr = start(server, None).await;

    let raw = exchange(addr, "HEAD / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(raw.contains("Content-Length: 5\r\n"));
    assert!(raw.ends_with("\r\n\r\n"));
}

#[async_std::test]
async fn http10_closes_by_default() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/", named("old")).unwrap();
    let addr = start(server, None).await;

    let raw = exchange(addr, "GET / HTTP/1.0\r\n\r\n").await;
    assert!(raw.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(raw.ends_with("old"));
}

#[async_std::test]
async fn request_body_reaches_handler() {
    let server = Server::new(ServerConfig::default());
    server
        .mux()
        .handle_func("/upload", |res, req| {
            text(res, HttpStatus::Ok, &format!("{} bytes", req.body.len()))
        })
        .unwrap();
    let addr = start(server, None).await;

    let raw = exchange(
        addr,
        "POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world",
    )
    .await;
    assert_eq!(parse_replies(&raw)[0].body, "11 bytes");
}

#[async_std::test]
async fn malformed_request_closes_without_response() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/", named("never")).unwrap();
    let addr = start(server, None).await;

    assert_eq!(exchange(addr, "NONSENSE\r\n\r\n").await, "");
    assert_eq!(exchange(addr, "GET / HTTP/1.1\r\n\r\n").await, "");
    assert_eq!(get(addr, "x", "/").await.body, "never");
}

#[async_std::test]
async fn path_shaped_host_cannot_reach_path_patterns() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/", named("public")).unwrap();
    server.mux().handle("/admin/", named("admin")).unwrap();
    server.mux().handle("api.example.com/", named("api")).unwrap();
    let addr = start(server, None).await;

    assert_eq!(exchange(addr, "GET / HTTP/1.1\r\nHost: /admin\r\n\r\n").await, "");
    assert_eq!(exchange(addr, "GET / HTTP/1.1\r\nHost: evil /admin\r\n\r\n").await, "");
    assert_eq!(get(addr, "api.example.com", "/").await.body, "api");
    assert_eq!(get(addr, "other.example.com", "/").await.body, "public");
}

#[async_std::test]
async fn handler_panic_only_aborts_its_connection() {
    let server = Server::new(ServerConfig::default());
    server
        .mux()
        .handle_func("/panic", |_res, _req| panic!("handler exploded"))
        .unwrap();
    server.mux().handle("/ok", named("fine")).unwrap();
    let addr = start(server, None).await;

    // Keep a healthy connection open across the panic.
    let mut healthy = TcpStream::connect(addr).await.unwrap();
    healthy
        .write_all(b"GET /ok HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();

    let raw = exchange(addr, "GET /panic HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert_eq!(raw, "");

    healthy
        .write_all(b"GET /ok HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut out = String::new();
    healthy.read_to_string(&mut out).await.unwrap();
    let bodies: Vec<String> = parse_replies(&out).into_iter().map(|r| r.body).collect();
    assert_eq!(bodies, vec!["fine", "fine"]);

    assert_eq!(get(addr, "x", "/ok").await.body, "fine");
}

#[async_std::test]
async fn blocking_handler_does_not_stall_others() {
    let server = Server::new(ServerConfig::default());
    server
        .mux()
        .handle_func("/slow", |res, _req| {
            std::thread::sleep(Duration::from_millis(800));
            text(res, HttpStatus::Ok, "slow")
        })
        .unwrap();
    server.mux().handle("/fast", named("fast")).unwrap();
    let addr = start(server, None).await;

    let slow = task::spawn(async move { get(addr, "x", "/slow").await.body });
    task::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    assert_eq!(get(addr, "x", "/fast").await.body, "fast");
    assert!(started.elapsed() < Duration::from_millis(600));

    assert_eq!(slow.await, "slow");
}

#[async_std::test]
async fn concurrent_clients_resolve_independently() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/", named("root")).unwrap();
    server.mux().handle("/images/", named("images")).unwrap();
    let addr = start(server, None).await;

    let clients: Vec<_> = (0..16)
        .map(|i| {
            task::spawn(async move {
                let (path, want) = if i % 2 == 0 {
                    ("/images/a.png", "images")
                } else {
                    ("/about", "root")
                };
                assert_eq!(get(addr, "x", path).await.body, want);
            })
        })
        .collect();
    for c in clients {
        c.await;
    }
}

#[async_std::test]
async fn registration_while_serving_is_visible() {
    let server = Arc::new(Server::new(ServerConfig::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = server.clone();
    task::spawn(async move {
        let _ = running.serve(listener, None).await;
    });

    assert_eq!(get(addr, "x", "/late").await.status, 404);
    server.mux().handle("/late", named("late")).unwrap();
    assert_eq!(get(addr, "x", "/late").await.body, "late");
}

#[async_std::test]
async fn explicit_handler_replaces_default_mux() {
    let server = Server::new(ServerConfig::default());
    server.mux().handle("/", named("mux")).unwrap();
    let custom: Arc<dyn Handler> = Arc::new(named("custom"));
    let addr = start(server, Some(custom)).await;

    assert_eq!(get(addr, "x", "/anything").await.body, "custom");
}

#[async_std::test]
async fn reports_connection_states() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hook_seen = seen.clone();
    let server = Server::new(ServerConfig::default())
        .on_conn_state(move |_peer, state| hook_seen.lock().unwrap().push(state));
    server.mux().handle("/", named("x")).unwrap();
    let addr = start(server, None).await;

    get(addr, "x", "/").await;

    let deadline = Instant::now() + Duration::from_secs(2);
    while !seen.lock().unwrap().contains(&ConnState::Closed) && Instant::now() < deadline {
        task::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnState::Accepted,
            ConnState::Reading,
            ConnState::Dispatching,
            ConnState::Writing,
            ConnState::Closed,
        ]
    );
}

#[async_std::test]
async fn idle_connections_time_out() {
    let config = ServerConfig {
        read_timeout: Duration::from_millis(100),
        ..ServerConfig::default()
    };
    let server = Server::new(config);
    let addr = start(server, None).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut out = Vec::new();
    let read = async_std::io::timeout(Duration::from_secs(2), stream.read_to_end(&mut out)).await;
    assert!(read.is_ok());
    assert!(out.is_empty());
}
