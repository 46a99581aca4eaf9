use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use gatehouse::{
    ClientKey, Gateway, GatewayRequest, GatewayResponse, HandlerContext, ManualClock, Middleware,
    MiddlewareError, Router, Settings,
};

const START_SECS: u64 = 1_700_000_000;

async fn hello(_ctx: HandlerContext) -> GatewayResponse {
    GatewayResponse::ok("Hello World")
}

async fn cached(ctx: HandlerContext) -> GatewayResponse {
    if let Some(body) = ctx.cached() {
        return GatewayResponse::ok(body);
    }
    ctx.cache_for(1, "from cache");
    GatewayResponse::ok("fresh")
}

fn gateway(toml: &str, router: Router) -> (Gateway, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_secs(START_SECS));
    let settings = Settings::from_toml_str(toml).unwrap();
    (Gateway::with_clock(settings, router, clock.clone()).unwrap(), clock)
}

fn get(ip: &str, target: &str) -> GatewayRequest {
    GatewayRequest::get(target).with_remote_addr(format!("{}:50000", ip))
}

#[tokio::test]
async fn test_not_found_flood_suspends_until_expiry() {
    let (gw, clock) = gateway(
        "[behaver]\ncleansecond = 0\n",
        Router::builder().get("/", hello, vec![]).build(),
    );
    let ip = "198.51.100.10";

    // uneven spacing keeps the cadence detector out of the picture
    for i in 0..51 {
        let resp = gw.dispatch(get(ip, "/wp-login.php")).await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND, "request {}", i + 1);
        clock.advance_secs(if i % 2 == 0 { 1 } else { 4 });
    }
    assert_eq!(gw.behavior().not_found_count(&ClientKey::from(ip)), Some(51));

    let resp = gw.dispatch(get(ip, "/")).await;
    assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.body, "client suspended");

    // other clients are unaffected
    assert_eq!(gw.dispatch(get("198.51.100.11", "/")).await.status, StatusCode::OK);

    clock.advance_secs(299);
    assert_eq!(gw.dispatch(get(ip, "/")).await.status, StatusCode::TOO_MANY_REQUESTS);

    clock.advance_secs(1);
    assert_eq!(gw.dispatch(get(ip, "/")).await.status, StatusCode::OK);
    assert_eq!(gw.behavior().not_found_count(&ClientKey::from(ip)), Some(0));
}

#[tokio::test]
async fn test_fifty_not_found_is_tolerated() {
    let (gw, clock) = gateway(
        "[behaver]\ncleansecond = 0\n",
        Router::builder().get("/", hello, vec![]).build(),
    );
    let ip = "198.51.100.12";

    for i in 0..50 {
        gw.dispatch(get(ip, "/missing")).await;
        clock.advance_secs(if i % 2 == 0 { 1 } else { 4 });
    }
    assert_eq!(gw.dispatch(get(ip, "/")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_uniform_cadence_suspends() {
    let (gw, clock) = gateway(
        "[behaver]\ncleansecond = 0\n",
        Router::builder().get("/", hello, vec![]).build(),
    );
    let ip = "203.0.113.50";

    for _ in 0..10 {
        assert_eq!(gw.dispatch(get(ip, "/")).await.status, StatusCode::OK);
        clock.advance_secs(5);
    }
    let resp = gw.dispatch(get(ip, "/")).await;
    assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(gw.behavior().suspended_clients(), 1);
}

#[tokio::test]
async fn test_middleware_abort_skips_rest_of_chain() {
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));

    let handler = {
        let calls = Arc::clone(&handler_calls);
        move |_ctx: HandlerContext| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { GatewayResponse::ok("handler ran") }
        }
    };
    let second = {
        let calls = Arc::clone(&second_calls);
        Middleware::new("second", move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    let first = Middleware::new("first", |_| Err(MiddlewareError::new("first failed")));

    let (gw, _clock) = gateway(
        "",
        Router::builder()
            .get("/middleware", handler, vec![first, second])
            .build(),
    );

    let resp = gw.dispatch(get("192.0.2.20", "/middleware")).await;
    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.body, "first failed");
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rate_limit_capacity_and_refill() {
    let (gw, clock) = gateway(
        "[server]\nipmax = 100\nratelimit = 3\nrefill_ms = 1000\n[behaver]\nipmax = 0\n",
        Router::builder().get("/", hello, vec![]).build(),
    );

    for _ in 0..3 {
        assert_eq!(gw.dispatch(get("192.0.2.30", "/")).await.status, StatusCode::OK);
    }
    let resp = gw.dispatch(get("192.0.2.30", "/")).await;
    assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.body, "rate limit exceeded");

    clock.advance(Duration::from_millis(1_000));
    assert_eq!(gw.dispatch(get("192.0.2.30", "/")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_cache_route_serves_and_expires() {
    let (gw, clock) = gateway(
        "[server]\ncache = 1\n[behaver]\nipmax = 0\n",
        Router::builder().get("/cache", cached, vec![]).build(),
    );

    assert_eq!(gw.dispatch(get("192.0.2.40", "/cache")).await.body, "fresh");
    assert_eq!(gw.dispatch(get("192.0.2.41", "/cache")).await.body, "from cache");
    assert_eq!(gw.dispatch(get("192.0.2.40", "/cache?page=2")).await.body, "fresh");

    clock.advance_secs(60);
    assert_eq!(gw.dispatch(get("192.0.2.40", "/cache")).await.body, "fresh");
}

#[tokio::test]
async fn test_access_log_file_has_one_line_per_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    let toml = format!(
        "[server]\nipmax = 10\nratelimit = 1\n[logging]\naccess_log = \"{}\"\n",
        path.display()
    );

    let (gw, _clock) = gateway(&toml, Router::builder().get("/", hello, vec![]).build());
    gw.dispatch(get("192.0.2.50", "/")).await;
    gw.dispatch(get("192.0.2.50", "/")).await;
    gw.dispatch(get("192.0.2.51", "/nowhere")).await;
    drop(gw);

    let mut lines = Vec::new();
    for _ in 0..100 {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        lines = content.lines().map(str::to_string).collect::<Vec<_>>();
        if lines.len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(lines.len(), 3);
    let events: Vec<serde_json::Value> = lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events[0]["outcome"], "served");
    assert_eq!(events[1]["outcome"], "throttled");
    assert_eq!(events[1]["status"], 429);
    assert_eq!(events[2]["outcome"], "not_found");
    assert_eq!(events[2]["client"], "192.0.2.51");
}

#[tokio::test]
async fn test_unparsable_peer_shares_unknown_identity() {
    let (gw, _clock) = gateway(
        "[server]\nipmax = 10\nratelimit = 1\n",
        Router::builder().get("/", hello, vec![]).build(),
    );

    let anon = || GatewayRequest::get("/").with_remote_addr("garbage");
    assert_eq!(gw.dispatch(anon()).await.status, StatusCode::OK);
    assert_eq!(gw.dispatch(anon()).await.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(gw.rate_limiter().is_tracked(ClientKey::UNKNOWN));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bucket_admits_exactly_capacity_under_contention() {
    let (gw, _clock) = gateway(
        "[server]\nipmax = 100\nratelimit = 50\nrefill_ms = 3600000\n[behaver]\nipmax = 0\n",
        Router::builder().get("/", hello, vec![]).build(),
    );

    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let dispatcher = Arc::clone(gw.dispatcher());
            tokio::spawn(async move { dispatcher.dispatch(get("192.0.2.60", "/")).await.status })
        })
        .collect();

    let mut served = 0;
    let mut throttled = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => served += 1,
            StatusCode::TOO_MANY_REQUESTS => throttled += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(served, 50);
    assert_eq!(throttled, 150);
    assert_eq!(gw.rate_limiter().remaining("192.0.2.60"), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_behavior_counts_stay_exact_under_contention() {
    let (gw, _clock) = gateway(
        "[behaver]\ncleansecond = 0\n",
        Router::builder().get("/", hello, vec![]).build(),
    );

    // five misses per client stays under both detectors
    let tasks: Vec<_> = (0..64)
        .flat_map(|c| (0..5).map(move |_| c))
        .map(|c| {
            let dispatcher = Arc::clone(gw.dispatcher());
            tokio::spawn(async move {
                dispatcher
                    .dispatch(get(&format!("198.51.100.{}", c), "/missing"))
                    .await
                    .status
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::NOT_FOUND);
    }

    assert_eq!(gw.behavior().tracked_clients(), 64);
    assert_eq!(gw.behavior().suspended_clients(), 0);
    for c in 0..64 {
        let key = ClientKey::from(format!("198.51.100.{}", c).as_str());
        assert_eq!(gw.behavior().not_found_count(&key), Some(5));
    }
}
