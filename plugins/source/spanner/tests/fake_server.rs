//! Drives the Spanner source against a scripted HTTP server speaking the
//! three REST calls the connector uses, plus the OAuth token endpoint.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use sluice_api::{ConfigValues, ConnectionResolver, ErrorKind, NativeValue, ParamValue, WrappedNumber};
use sluice_source_spanner::SpannerResolver;

const SESSION: &str = "projects/p/instances/i/databases/d/sessions/s1";

const METADATA: &str = r#"{"rowType": {"fields": [
    {"name": "id", "type": {"code": "INT64"}},
    {"name": "name", "type": {"code": "STRING"}}
]}}"#;

struct Script {
    session_status: u16,
    session_body: String,
    query_status: u16,
    /// Body of `executeStreamingSql`, written chunk by chunk.
    query_chunks: Vec<String>,
    /// Leading `executeStreamingSql` calls answered with 503.
    unavailable_queries: usize,
}

impl Script {
    fn streaming(chunks: Vec<String>) -> Self {
        Self {
            session_status: 200,
            session_body: format!(r#"{{"name": "{SESSION}"}}"#),
            query_status: 200,
            query_chunks: chunks,
            unavailable_queries: 0,
        }
    }
}

struct Request {
    method: String,
    path: String,
    authorization: Option<String>,
    body: String,
}

#[derive(Default)]
struct Seen {
    deleted: AtomicUsize,
    queries: AtomicUsize,
    /// Authorization header of every session create.
    session_auth: Mutex<Vec<Option<String>>>,
    token_forms: Mutex<Vec<String>>,
}

struct FakeSpanner {
    addr: SocketAddr,
    seen: Arc<Seen>,
}

async fn spawn_fake(script: Script) -> FakeSpanner {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Seen::default());
    let script = Arc::new(script);
    let state = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                break;
            };
            let script = Arc::clone(&script);
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                let _ = serve(sock, &script, &state).await;
            });
        }
    });
    FakeSpanner { addr, seen }
}

async fn serve(mut sock: TcpStream, script: &Script, seen: &Seen) -> std::io::Result<()> {
    let req = read_request(&mut sock).await?;
    if req.method == "DELETE" {
        seen.deleted.fetch_add(1, Ordering::SeqCst);
        return respond(&mut sock, 200, "{}").await;
    }
    if req.path == "/token" {
        seen.token_forms.lock().unwrap().push(req.body);
        return respond(
            &mut sock,
            200,
            r#"{"access_token": "ya29.fake", "expires_in": 3599, "token_type": "Bearer"}"#,
        )
        .await;
    }
    if req.path.ends_with("/sessions") {
        seen.session_auth.lock().unwrap().push(req.authorization);
        return respond(&mut sock, script.session_status, &script.session_body).await;
    }
    if req.path.ends_with(":executeStreamingSql") {
        let attempt = seen.queries.fetch_add(1, Ordering::SeqCst);
        if attempt < script.unavailable_queries {
            return respond(
                &mut sock,
                503,
                r#"{"error": {"code": 503, "message": "The service is currently unavailable."}}"#,
            )
            .await;
        }
        if script.query_status != 200 {
            let body = script.query_chunks.concat();
            return respond(&mut sock, script.query_status, &body).await;
        }
        sock.write_all(
            b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\nconnection: close\r\n\r\n",
        )
        .await?;
        for chunk in &script.query_chunks {
            sock.write_all(chunk.as_bytes()).await?;
            sock.flush().await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        return sock.shutdown().await;
    }
    respond(&mut sock, 404, r#"{"error": {"message": "no such route"}}"#).await
}

async fn read_request(sock: &mut TcpStream) -> std::io::Result<Request> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let header_end = loop {
        let n = sock.read(&mut tmp).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let header = |name: &str| {
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim().to_string())
    };
    let content_length = header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = sock.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    Ok(Request {
        method: request_line.next().unwrap_or_default().to_string(),
        path: request_line.next().unwrap_or_default().to_string(),
        authorization: header("authorization"),
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    })
}

async fn respond(sock: &mut TcpStream, status: u16, body: &str) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    );
    sock.write_all(head.as_bytes()).await?;
    sock.write_all(body.as_bytes()).await?;
    sock.shutdown().await
}

fn emulator_config(addr: SocketAddr) -> ConfigValues {
    ConfigValues::new()
        .with("project_id", ParamValue::Str("p".into()))
        .with("instance_id", ParamValue::Str("i".into()))
        .with("database_id", ParamValue::Str("d".into()))
        .with("authenticator", ParamValue::Str("emulator".into()))
        .with("emulator_host", ParamValue::Str(addr.ip().to_string()))
        .with("emulator_port", ParamValue::U64(u64::from(addr.port())))
        .with("retry_base_delay_ms", ParamValue::U64(1))
}

#[tokio::test]
async fn streams_rows_across_chunked_values() {
    let fake = spawn_fake(Script::streaming(vec![
        format!(r#"[{{"metadata": {METADATA}, "values": ["1", "Ad"], "chunkedValue": true}}"#),
        r#",{"values": ["a", "2", "Gra"#.to_string(),
        r#"ce"]}]"#.to_string(),
    ]))
    .await;

    let resolver = SpannerResolver::new();
    let config = emulator_config(fake.addr);
    let conn = resolver.connect(&config).await.unwrap();
    let mut source = conn.query("SELECT id, name FROM people").await.unwrap();

    let columns = source.columns().unwrap();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].type_tag.as_deref(), Some("INT64"));

    let first = source.next_row().await.unwrap().unwrap();
    assert_eq!(first.get("id"), Some(&NativeValue::Wrapped(WrappedNumber::Int64(1))));
    assert_eq!(first.get("name"), Some(&NativeValue::String("Ada".into())));
    let second = source.next_row().await.unwrap().unwrap();
    assert_eq!(second.get("name"), Some(&NativeValue::String("Grace".into())));
    assert!(source.next_row().await.unwrap().is_none());

    source.close().await;
    assert_eq!(fake.seen.deleted.load(Ordering::SeqCst), 1);
    source.close().await;
    assert_eq!(fake.seen.deleted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn in_stream_error_fails_the_query() {
    let fake = spawn_fake(Script::streaming(vec![
        format!(r#"[{{"metadata": {METADATA}, "values": ["1", "Ada"]}}"#),
        r#",{"error": {"code": 10, "message": "Transaction was aborted"}}]"#.to_string(),
    ]))
    .await;

    let config = emulator_config(fake.addr);
    let conn = SpannerResolver::new().connect(&config).await.unwrap();
    let mut source = conn.query("SELECT 1").await.unwrap();

    assert!(source.next_row().await.unwrap().is_some());
    let err = source.next_row().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Query);
    assert_eq!(err.message, "Transaction was aborted");
    source.close().await;
}

#[tokio::test]
async fn rejected_sql_is_a_query_error_and_releases_the_session() {
    let mut script = Script::streaming(vec![
        r#"{"error": {"code": 400, "message": "Table not found: nope", "status": "INVALID_ARGUMENT"}}"#
            .to_string(),
    ]);
    script.query_status = 400;
    let fake = spawn_fake(script).await;

    let config = emulator_config(fake.addr);
    let conn = SpannerResolver::new().connect(&config).await.unwrap();
    let err = match conn.query("SELECT * FROM nope").await {
        Ok(_) => panic!("query should fail"),
        Err(e) => e,
    };
    assert_eq!(err.kind, ErrorKind::Query);
    assert_eq!(err.message, "Table not found: nope");
    assert_eq!(fake.seen.deleted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refused_credentials_fail_the_connect() {
    let mut script = Script::streaming(Vec::new());
    script.session_status = 401;
    script.session_body = r#"{"error": {"code": 401, "message": "Request had invalid authentication credentials."}}"#.to_string();
    let fake = spawn_fake(script).await;

    let config = emulator_config(fake.addr);
    let err = match SpannerResolver::new().connect(&config).await {
        Ok(_) => panic!("connect should fail"),
        Err(e) => e,
    };
    assert_eq!(err.kind, ErrorKind::Connection);
    assert!(err.message.contains("invalid authentication credentials"));
}

#[tokio::test]
async fn unavailable_query_is_retried_before_streaming() {
    let mut script = Script::streaming(vec![format!(
        r#"[{{"metadata": {METADATA}, "values": ["1", "Ada"]}}]"#
    )]);
    script.unavailable_queries = 1;
    let fake = spawn_fake(script).await;

    let config = emulator_config(fake.addr);
    let conn = SpannerResolver::new().connect(&config).await.unwrap();
    let mut source = conn.query("SELECT id, name FROM people").await.unwrap();

    let row = source.next_row().await.unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&NativeValue::String("Ada".into())));
    assert!(source.next_row().await.unwrap().is_none());
    assert_eq!(fake.seen.queries.load(Ordering::SeqCst), 2);
    source.close().await;
}

#[tokio::test]
async fn unavailable_query_fails_once_retries_run_out() {
    let mut script = Script::streaming(Vec::new());
    script.unavailable_queries = usize::MAX;
    let fake = spawn_fake(script).await;

    let config = emulator_config(fake.addr).with("max_retries", ParamValue::U64(2));
    let conn = SpannerResolver::new().connect(&config).await.unwrap();
    let err = match conn.query("SELECT 1").await {
        Ok(_) => panic!("query should fail"),
        Err(e) => e,
    };
    assert_eq!(err.kind, ErrorKind::Connection);
    assert_eq!(err.message, "The service is currently unavailable.");
    assert_eq!(fake.seen.queries.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn service_account_key_is_exchanged_for_a_bearer_token() {
    let fake = spawn_fake(Script::streaming(Vec::new())).await;
    let escaped_key = include_str!("../testdata/service_account_key.pem").replace('\n', "\\n");

    let config = ConfigValues::new()
        .with("project_id", ParamValue::Str("p".into()))
        .with("instance_id", ParamValue::Str("i".into()))
        .with("database_id", ParamValue::Str("d".into()))
        .with("client_email", ParamValue::Str("reader@p.iam.gserviceaccount.com".into()))
        .with("private_key", ParamValue::Str(escaped_key))
        .with("endpoint", ParamValue::Str(format!("http://{}", fake.addr)))
        .with("token_uri", ParamValue::Str(format!("http://{}/token", fake.addr)));
    let conn = SpannerResolver::new().connect(&config).await.unwrap();
    drop(conn);

    let forms = fake.seen.token_forms.lock().unwrap().clone();
    assert_eq!(forms.len(), 1);
    assert!(
        forms[0].starts_with("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer&assertion="),
        "{}",
        forms[0]
    );
    let auth = fake.seen.session_auth.lock().unwrap().clone();
    assert_eq!(auth, vec![Some("Bearer ya29.fake".to_string())]);
}
