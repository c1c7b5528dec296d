//! End-to-end behaviour of the request pipeline, driven through
//! `App::handle` without opening sockets.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::{StatusCode, header};
use http_body_util::{BodyExt as _, Full};
use vaultkit::log::{MemorySink, Record};
use vaultkit::{
    App, Config, HandlerFailure, MemoryReporter, Method, Request, Response, Router, Unauthorized, outbound,
};

struct Harness {
    app: App,
    sink: MemorySink,
    reporter: MemoryReporter,
}

fn harness(config: Config, router: Router) -> Harness {
    let sink = MemorySink::new();
    let reporter = MemoryReporter::new();
    let app = App::new(config, router).with_sink(sink.clone()).with_reporter(reporter.clone());
    Harness { app, sink, reporter }
}

fn test_config() -> Config {
    Config::new("test-app").with_deploy("testing")
}

fn request(method: http::Method, uri: &str) -> http::request::Builder {
    http::Request::builder().method(method).uri(uri)
}

fn basic(password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{password}")))
}

struct Reply {
    status: StatusCode,
    headers: http::HeaderMap,
    body: String,
}

impl Harness {
    async fn send(&self, req: http::request::Builder) -> Reply {
        let req = req.body(Full::new(Bytes::new())).unwrap();
        let resp = self.app.handle(req).await;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        Reply { status, headers, body: String::from_utf8(body.to_vec()).unwrap() }
    }

    async fn get(&self, uri: &str) -> Reply {
        self.send(request(http::Method::GET, uri)).await
    }

    fn logged(&self, key: &str) -> Option<String> {
        self.sink.value(key)
    }

    fn record(&self, key: &str) -> Record {
        self.sink.find(key).unwrap_or_else(|| panic!("no record with `{key}` in {:?}", self.sink.records()))
    }
}

async fn you_may_pass(req: Request) -> Result<&'static str, Unauthorized> {
    req.protect(&[])?;
    Ok("You may pass")
}

// ── built-in endpoints ───────────────────────────────────────────────────────

#[tokio::test]
async fn head_status_check() {
    let h = harness(test_config(), Router::new());
    let reply = h.send(request(http::Method::HEAD, "/")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(h.logged("count#test-app.http.200").as_deref(), Some("1"));
    assert_eq!(h.logged("count#test-app.http.2xx").as_deref(), Some("1"));
    assert_eq!(h.record("count#test-app.http.200")["request_path"], "/");
    assert_eq!(h.record("count#test-app.http.2xx")["request_path"], "/");
}

#[tokio::test]
async fn liveness_answers_any_verb() {
    let h = harness(test_config(), Router::new());
    for method in [http::Method::GET, http::Method::POST, http::Method::DELETE] {
        let reply = h.send(request(method.clone(), "/")).await;
        assert_eq!(reply.status, StatusCode::OK, "{method}");
        assert!(reply.body.is_empty());
    }
}

#[tokio::test]
async fn liveness_answers_extension_verbs() {
    let h = harness(test_config(), Router::new());
    for verb in [&b"PURGE"[..], b"PROPFIND"] {
        let method = http::Method::from_bytes(verb).unwrap();
        let reply = h.send(request(method.clone(), "/")).await;
        assert_eq!(reply.status, StatusCode::OK, "{method}");
    }
    assert_eq!(h.logged("count#test-app.http.200").as_deref(), Some("1"));
    assert!(h.sink.records().iter().all(|r| !r.contains_key("count#test-app.http.405")));
}

#[tokio::test]
async fn get_health_check() {
    let h = harness(test_config(), Router::new());
    let reply = h.get("/health").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "OK");
    assert_eq!(h.logged("count#test-app.http.200").as_deref(), Some("1"));
    assert_eq!(h.logged("count#test-app.http.2xx").as_deref(), Some("1"));

    let timing = h.logged("measure#test-app.http-health").unwrap();
    assert!(timing.ends_with("ms"), "{timing}");
    assert_eq!(h.record("measure#test-app.http-health")["source"], "testing");
}

#[tokio::test]
async fn unknown_endpoint_counts_404_without_timing() {
    let h = harness(test_config(), Router::new());
    let reply = h.send(request(http::Method::HEAD, "/unknown")).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(h.logged("count#test-app.http.404").as_deref(), Some("1"));
    assert_eq!(h.logged("count#test-app.http.4xx").as_deref(), Some("1"));
    assert!(h.sink.records().iter().all(|r| r.keys().all(|k| !k.starts_with("measure#"))));
}

#[tokio::test]
async fn unknown_method_is_405() {
    let h = harness(test_config(), Router::new());
    let method = http::Method::from_bytes(b"PROPFIND").unwrap();
    let reply = h.send(request(method, "/health")).await;

    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(h.logged("count#test-app.http.405").as_deref(), Some("1"));
}

// ── failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn error_logs_500_with_diagnostic_body() {
    let h = harness(test_config(), Router::new());
    let reply = h.get("/boom").await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.starts_with("ExpectedError: An expected error occurred.\n\n"), "{}", reply.body);
    let (_, trace) = reply.body.split_once("\n\n").unwrap();
    assert!(!trace.trim().is_empty(), "500 body carries no trace");
    assert_eq!(h.logged("count#test-app.http.500").as_deref(), Some("1"));
    assert_eq!(h.logged("count#test-app.http.5xx").as_deref(), Some("1"));
}

#[tokio::test]
async fn error_is_reported_exactly_once() {
    let h = harness(test_config(), Router::new());
    assert!(h.reporter.reports().is_empty());

    let reply = h.send(request(http::Method::GET, "/boom").header("x-request-id", "boom-1")).await;

    let reports = h.reporter.reports();
    assert_eq!(reports.len(), 1);
    let (failure, context) = &reports[0];
    assert_eq!(failure.kind(), "ExpectedError");
    assert_eq!(context["request-id"], "boom-1");
    assert_eq!(context["path"], "/boom");
    assert_eq!(context["route"], "/boom");
    assert_eq!(reply.headers["request-id"], "boom-1");
}

#[tokio::test]
async fn panicking_handler_becomes_500() {
    async fn explode(_req: Request) -> Response {
        panic!("kaboom");
    }

    let h = harness(test_config(), Router::new().on(Method::Get, "/explode", explode));
    let reply = h.get("/explode").await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.starts_with("Panic: kaboom\n\npanicked at "), "{}", reply.body);
    assert!(reply.body.contains("instrumentation.rs"), "{}", reply.body);
    assert_eq!(h.reporter.reports().len(), 1);
    assert_eq!(h.logged("count#test-app.http.5xx").as_deref(), Some("1"));
    assert!(h.logged("measure#test-app.http-explode").is_some());
}

#[tokio::test]
async fn question_mark_converts_std_errors() {
    async fn parse(req: Request) -> Result<String, HandlerFailure> {
        let n: u32 = req.param("n").unwrap_or_default().parse()?;
        Ok(format!("{}", n * 2))
    }

    let h = harness(test_config(), Router::new().on(Method::Get, "/double/{n}", parse));
    assert_eq!(h.get("/double/21").await.body, "42");

    let reply = h.get("/double/abc").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.starts_with("ParseIntError: invalid digit"), "{}", reply.body);
}

// ── basic auth ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn http_basic_auth() {
    let config = test_config().with_basic_passwords(["password"]);
    let h = harness(config, Router::new().on(Method::Get, "/protected", you_may_pass));

    let reply = h.get("/protected").await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.headers[header::WWW_AUTHENTICATE], r#"Basic realm="Restricted Area""#);

    let reply = h.send(request(http::Method::GET, "/protected").header("authorization", basic("password"))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "You may pass");
}

#[tokio::test]
async fn http_basic_auth_multi_pass() {
    let config = test_config().with_basic_passwords(["password", "password2"]);
    let h = harness(config, Router::new().on(Method::Get, "/protected", you_may_pass));

    assert_eq!(h.get("/protected").await.status, StatusCode::UNAUTHORIZED);
    for password in ["password", "password2"] {
        let reply = h.send(request(http::Method::GET, "/protected").header("authorization", basic(password))).await;
        assert_eq!(reply.status, StatusCode::OK, "{password}");
    }
}

#[tokio::test]
async fn http_basic_auth_without_passwords_fails_closed() {
    let h = harness(test_config(), Router::new().on(Method::Get, "/protected", you_may_pass));

    assert_eq!(h.get("/protected").await.status, StatusCode::UNAUTHORIZED);
    let reply = h.send(request(http::Method::GET, "/protected").header("authorization", basic(""))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn http_basic_auth_with_alternate_password() {
    async fn multipass(req: Request) -> Result<&'static str, Unauthorized> {
        req.protect(&["leelu-dallas-multipass"])?;
        Ok("You may pass")
    }

    let config = test_config().with_basic_passwords(["password"]);
    let h = harness(config, Router::new().on(Method::Get, "/protected", multipass));

    assert_eq!(h.get("/protected").await.status, StatusCode::UNAUTHORIZED);
    let with = |p: &str| request(http::Method::GET, "/protected").header("authorization", basic(p));
    assert_eq!(h.send(with("password")).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.send(with("leelu-dallas-multipass")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn http_basic_auth_with_two_passwords() {
    async fn either(req: Request) -> Result<&'static str, Unauthorized> {
        req.protect(&["leelu-dallas-multipass", "password"])?;
        Ok("You may pass")
    }

    let config = test_config().with_basic_passwords(["password"]);
    let h = harness(config, Router::new().on(Method::Get, "/protected", either));

    assert_eq!(h.get("/protected").await.status, StatusCode::UNAUTHORIZED);
    let with = |p: &str| request(http::Method::GET, "/protected").header("authorization", basic(p));
    assert_eq!(h.send(with("password")).await.status, StatusCode::OK);
    assert_eq!(h.send(with("leelu-dallas-multipass")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn http_basic_auth_with_default_protection() {
    async fn protected(_req: Request) -> &'static str {
        "You may pass"
    }
    async fn greet(req: Request) -> String {
        format!("You may pass {}", req.param("name").unwrap_or_default())
    }

    let config = test_config().with_basic_passwords(["password"]);
    let router = Router::new()
        .protect_by_default()
        .on(Method::Get, "/protected", protected)
        .on_unprotected(Method::Get, "/unprotected/{name}", greet);
    let h = harness(config, router);

    assert_eq!(h.get("/protected").await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.get("/nowhere").await.status, StatusCode::UNAUTHORIZED);

    assert_eq!(h.send(request(http::Method::HEAD, "/unprotected/Bob")).await.status, StatusCode::OK);
    let reply = h.get("/unprotected/Bob").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "You may pass Bob");

    let authed = |uri: &str| request(http::Method::GET, uri).header("authorization", basic("password"));
    let reply = h.send(authed("/protected")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "You may pass");
    assert_eq!(h.send(authed("/unprotected/Jill")).await.body, "You may pass Jill");

    // built-ins stay open
    assert_eq!(h.get("/health").await.status, StatusCode::OK);
}

#[tokio::test]
async fn unauthorized_is_measured_but_never_reported() {
    let h = harness(test_config(), Router::new().protect_by_default().on(Method::Get, "/protected", you_may_pass));
    let reply = h.get("/protected").await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(reply.headers.contains_key("request-id"));
    assert_eq!(h.logged("count#test-app.http.401").as_deref(), Some("1"));
    assert_eq!(h.logged("count#test-app.http.4xx").as_deref(), Some("1"));
    assert!(h.reporter.reports().is_empty());
}

// ── correlation ids ──────────────────────────────────────────────────────────

#[tokio::test]
async fn request_id_round_trips_and_is_logged() {
    async fn logging(req: Request) -> &'static str {
        req.log().log([("msg", "Hit logging test!")]);
        "logged"
    }

    let h = harness(test_config(), Router::new().on(Method::Get, "/logging-test", logging));
    let reply = h.send(request(http::Method::GET, "/logging-test").header("X-Request-ID", "JKJK-123")).await;

    assert_eq!(reply.headers["request-id"], "JKJK-123");
    let line = h.record("msg");
    assert_eq!(line["msg"], "Hit logging test!");
    assert_eq!(line["request-id"], "JKJK-123");
    assert_eq!(line["source"], "testing");
    assert_eq!(line["app"], "test-app");
    assert_eq!(h.record("count#test-app.http.200")["request-id"], "JKJK-123");
}

#[tokio::test]
async fn request_id_is_generated_when_absent() {
    let h = harness(test_config(), Router::new());
    let first = h.get("/health").await;
    let second = h.get("/health").await;

    let a = first.headers["request-id"].to_str().unwrap().to_owned();
    let b = second.headers["request-id"].to_str().unwrap().to_owned();
    assert!(uuid::Uuid::parse_str(&a).is_ok(), "{a}");
    assert_ne!(a, b);
}

#[tokio::test]
async fn custom_inbound_header() {
    let config = test_config().with_request_id_header(http::HeaderName::from_static("x-correlation-id"));
    let h = harness(config, Router::new());
    let reply = h.send(request(http::Method::GET, "/health").header("x-correlation-id", "corr-9")).await;
    assert_eq!(reply.headers["request-id"], "corr-9");
}

#[tokio::test]
async fn outbound_calls_carry_request_id() {
    async fn proxy(_req: Request) -> String {
        let mut outbound_req = http::Request::get("http://example.com/").body(()).unwrap();
        outbound::decorate(&mut outbound_req);
        outbound_req
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("missing")
            .to_owned()
    }

    let h = harness(test_config(), Router::new().on(Method::Get, "/proxy-test", proxy));
    let reply = h.send(request(http::Method::GET, "/proxy-test").header("x-request-id", "JKJK-123")).await;

    assert_eq!(reply.headers["request-id"], "JKJK-123");
    assert_eq!(reply.body, "JKJK-123");
}

#[tokio::test]
async fn concurrent_requests_never_see_each_other() {
    async fn slow_echo(req: Request) -> String {
        tokio::task::yield_now().await;
        req.log().log([("msg", "echo")]);
        tokio::task::yield_now().await;
        req.request_id().unwrap_or_default()
    }

    let h = std::sync::Arc::new(harness(test_config(), Router::new().on(Method::Get, "/echo", slow_echo)));
    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let h = std::sync::Arc::clone(&h);
            tokio::spawn(async move {
                let id = format!("req-{i}");
                let reply = h.send(request(http::Method::GET, "/echo").header("x-request-id", id.as_str())).await;
                (id, reply)
            })
        })
        .collect();

    for task in tasks {
        let (id, reply) = task.await.unwrap();
        assert_eq!(reply.body, id);
        assert_eq!(reply.headers["request-id"], id.as_str());
    }

    let echoes: Vec<_> = h.sink.records().into_iter().filter(|r| r.contains_key("msg")).collect();
    assert_eq!(echoes.len(), 32);
    let mut ids: Vec<_> = echoes.iter().map(|r| r["request-id"].clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 32);
}

// ── metadata & ssl ───────────────────────────────────────────────────────────

#[tokio::test]
async fn metadata_rides_on_status_metrics() {
    async fn tagged(_req: Request) -> Response {
        Response::text("").with_metadata("user", "amanda").with_metadata("some_flag", true)
    }

    let h = harness(test_config(), Router::new().on(Method::Get, "/logging-test", tagged));
    h.get("/logging-test").await;

    for key in ["count#test-app.http.200", "count#test-app.http.2xx"] {
        let record = h.record(key);
        assert_eq!(record["user"], "amanda");
        assert_eq!(record["some_flag"], "true");
        assert_eq!(record["request_path"], "/logging-test");
    }
}

#[tokio::test]
async fn ssl_enforced_in_production() {
    let h = harness(test_config().with_production(true), Router::new());
    let reply = h.send(request(http::Method::GET, "/health?verbose=1").header("host", "billing.example.com")).await;

    assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(reply.headers[header::LOCATION], "https://billing.example.com/health?verbose=1");
    assert_eq!(h.logged("count#test-app.http.301").as_deref(), Some("1"));
    let timing = h.logged("measure#test-app.http-health").unwrap();
    assert!(timing.ends_with("ms"), "{timing}");
}

#[tokio::test]
async fn ssl_redirect_for_unknown_path_is_not_timed() {
    let h = harness(test_config().with_production(true), Router::new());
    let reply = h.send(request(http::Method::GET, "/nowhere").header("host", "billing.example.com")).await;

    assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
    assert!(h.sink.records().iter().all(|r| r.keys().all(|k| !k.starts_with("measure#"))));
}

#[tokio::test]
async fn forwarded_https_passes_in_production() {
    let h = harness(test_config().with_production(true), Router::new());
    let reply = h
        .send(
            request(http::Method::GET, "/health")
                .header("host", "billing.example.com")
                .header("x-forwarded-proto", "https"),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn ssl_can_be_disabled_in_production() {
    let h = harness(test_config().with_production(true).with_ssl(false), Router::new());
    assert_eq!(h.get("/health").await.status, StatusCode::OK);
}
