//! Integration tests for `RedisStore` against an in-process fake Redis.
//!
//! The fake speaks just enough RESP2 for the commands the store and the
//! connection pool issue (`GET`, `SET`, `DEL`, `PING`, `CLIENT`). It can
//! be told to answer every data command with an error, to sit on `GET`s
//! without answering, and it can be shut down to simulate a server that
//! went away mid-flight.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use satchel_redis::{DEFAULT_KEY_PREFIX, RedisError, RedisStore, RedisStoreConfig};
use satchel_store::{ConfigError, SessionData, SessionId, Store, StoreError, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

// =========================================================================
// Fake Redis server
// =========================================================================

#[derive(Default)]
struct FakeState {
    values: RwLock<HashMap<String, Vec<u8>>>,
    force_err: AtomicBool,
    stall_reads: AtomicBool,
}

/// How long a stalled `GET` sits before answering.
const STALL: Duration = Duration::from_secs(5);

struct FakeRedis {
    addr: SocketAddr,
    state: Arc<FakeState>,
    shutdown: watch::Sender<bool>,
}

impl FakeRedis {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        let state = Arc::new(FakeState::default());
        let (shutdown, mut stop) = watch::channel(false);

        let accept_state = Arc::clone(&state);
        let conn_stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((socket, _)) = accepted else { break };
                        let state = Arc::clone(&accept_state);
                        let stop = conn_stop.clone();
                        tokio::spawn(serve_connection(socket, state, stop));
                    }
                    _ = stop.changed() => break,
                }
            }
            // Listener drops here, so new connections are refused.
        });

        Self {
            addr,
            state,
            shutdown,
        }
    }

    fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    fn len(&self) -> usize {
        self.state.values.read().len()
    }

    fn contains(&self, key: &str) -> bool {
        self.state.values.read().contains_key(key)
    }

    fn insert_raw(&self, key: &str, value: &[u8]) {
        self.state
            .values
            .write()
            .insert(key.to_string(), value.to_vec());
    }

    fn force_errors(&self) {
        self.state.force_err.store(true, Ordering::SeqCst);
    }

    /// Makes every following `GET` hang for [`STALL`] before replying.
    fn stall_reads(&self) {
        self.state.stall_reads.store(true, Ordering::SeqCst);
    }

    /// Stops accepting and drops every open connection.
    async fn stop(&self) {
        let _ = self.shutdown.send(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn serve_connection(
    socket: TcpStream,
    state: Arc<FakeState>,
    mut stop: watch::Receiver<bool>,
) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    loop {
        let args = tokio::select! {
            cmd = read_command(&mut reader) => match cmd {
                Ok(Some(args)) => args,
                _ => return,
            },
            _ = stop.changed() => return,
        };

        let is_read = args.first().is_some_and(|name| name.eq_ignore_ascii_case(b"GET"));
        if is_read && state.stall_reads.load(Ordering::SeqCst) {
            tokio::select! {
                _ = tokio::time::sleep(STALL) => {}
                _ = stop.changed() => return,
            }
        }

        let reply = execute(&state, &args);
        if write.write_all(&reply).await.is_err() {
            return;
        }
    }
}

/// Reads one RESP array of bulk strings.
async fn read_command(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let bad = || std::io::Error::new(std::io::ErrorKind::InvalidData, "bad frame");

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let count: usize = line
        .trim_end()
        .strip_prefix('*')
        .and_then(|n| n.parse().ok())
        .ok_or_else(bad)?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await?;
        let len: usize = line
            .trim_end()
            .strip_prefix('$')
            .and_then(|n| n.parse().ok())
            .ok_or_else(bad)?;
        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await?;
        buf.truncate(len);
        args.push(buf);
    }
    Ok(Some(args))
}

fn bulk(bytes: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", bytes.len()).into_bytes();
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
    out
}

fn execute(state: &FakeState, args: &[Vec<u8>]) -> Vec<u8> {
    let Some(name) = args.first() else {
        return b"-ERR empty command\r\n".to_vec();
    };
    let name = String::from_utf8_lossy(name).to_ascii_uppercase();
    let key = args.get(1).map(|k| String::from_utf8_lossy(k).into_owned());
    let forced = state.force_err.load(Ordering::SeqCst);

    match (name.as_str(), key) {
        ("PING", None) => b"+PONG\r\n".to_vec(),
        ("PING", Some(msg)) => bulk(msg.as_bytes()),
        ("CLIENT", _) | ("SELECT", _) => b"+OK\r\n".to_vec(),
        ("GET" | "SET" | "DEL", _) if forced => b"-ERR forced\r\n".to_vec(),
        ("GET", Some(key)) => match state.values.read().get(&key) {
            Some(value) => bulk(value),
            None => b"$-1\r\n".to_vec(),
        },
        ("SET", Some(key)) => {
            let value = args.get(2).cloned().unwrap_or_default();
            state.values.write().insert(key, value);
            b"+OK\r\n".to_vec()
        }
        ("DEL", Some(key)) => {
            let removed = state.values.write().remove(&key).is_some();
            format!(":{}\r\n", u8::from(removed)).into_bytes()
        }
        _ => b"-ERR unknown command\r\n".to_vec(),
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn id(n: usize) -> SessionId {
    SessionId::from(format!("id-{n}"))
}

fn payload(n: usize) -> SessionData {
    let mut data = SessionData::new();
    data.insert("id".into(), Value::from(n as i64));
    data
}

fn something() -> SessionData {
    let mut data = SessionData::new();
    data.insert("avalue".into(), Value::from(""));
    data
}

// =========================================================================
// Store contract
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_concurrent_lifecycle() {
    let fake = FakeRedis::start().await;
    let store = RedisStore::new(&fake.url()).expect("should construct");

    // Sanity check.
    let missing = store.get(&SessionId::from("notpresent")).await;
    assert!(matches!(missing, Err(StoreError::NotFound)));

    let mut saves = JoinSet::new();
    for n in 0..10 {
        let store = store.clone();
        saves.spawn(async move { store.save(&id(n), &payload(n)).await });
    }
    while let Some(res) = saves.join_next().await {
        res.unwrap().expect("save should succeed");
    }
    assert_eq!(fake.len(), 10);

    let mut gets = JoinSet::new();
    for n in 0..10 {
        let store = store.clone();
        gets.spawn(async move { (n, store.get(&id(n)).await) });
    }
    while let Some(res) = gets.join_next().await {
        let (n, got) = res.unwrap();
        assert_eq!(got.expect("get should succeed"), payload(n));
    }

    let mut destroys = JoinSet::new();
    for n in 0..10 {
        let store = store.clone();
        destroys.spawn(async move { store.destroy(&id(n)).await });
    }
    while let Some(res) = destroys.join_next().await {
        res.unwrap().expect("destroy should succeed");
    }
    assert_eq!(fake.len(), 0);

    for n in 0..10 {
        assert!(matches!(store.get(&id(n)).await, Err(StoreError::NotFound)));
    }
}

#[tokio::test]
async fn test_round_trip_preserves_nested_values() {
    let fake = FakeRedis::start().await;
    let store = RedisStore::new(&fake.url()).unwrap();

    let mut prefs = std::collections::BTreeMap::new();
    prefs.insert("theme".to_string(), Value::from("dark"));
    prefs.insert("size".to_string(), Value::from(1.5));
    let mut data = SessionData::new();
    data.insert("prefs".into(), Value::Map(prefs));
    data.insert("count".into(), Value::from(3));
    data.insert("admin".into(), Value::from(false));
    data.insert("recent".into(), Value::from(vec!["a", "b"]));

    store.save(&SessionId::from("deep"), &data).await.unwrap();

    assert_eq!(store.get(&SessionId::from("deep")).await.unwrap(), data);
}

#[tokio::test]
async fn test_save_non_finite_float_fails_without_writing() {
    let fake = FakeRedis::start().await;
    let store = RedisStore::new(&fake.url()).unwrap();
    let mut data = SessionData::new();
    data.insert("ratio".into(), Value::Float(f64::INFINITY));

    let result = store.save(&SessionId::from("inf"), &data).await;

    assert!(
        matches!(result, Err(StoreError::Encode { cmd: "SET", .. })),
        "expected Encode error, got {result:?}"
    );
    assert_eq!(fake.len(), 0);
    assert!(matches!(
        store.get(&SessionId::from("inf")).await,
        Err(StoreError::NotFound)
    ));

    // The same session with a finite value goes through untouched.
    data.insert("ratio".into(), Value::Float(0.25));
    store.save(&SessionId::from("inf"), &data).await.unwrap();
    assert_eq!(store.get(&SessionId::from("inf")).await.unwrap(), data);
}

#[tokio::test]
async fn test_destroy_missing_key_is_not_an_error() {
    let fake = FakeRedis::start().await;
    let store = RedisStore::new(&fake.url()).unwrap();

    store.destroy(&SessionId::from("never")).await.expect("first");
    store.destroy(&SessionId::from("never")).await.expect("second");
}

#[tokio::test]
async fn test_save_uses_key_prefix() {
    let fake = FakeRedis::start().await;
    let default_store = RedisStore::new(&fake.url()).unwrap();
    let custom_store = RedisStore::with_prefix(&fake.url(), "myprefix_").unwrap();

    default_store
        .save(&SessionId::from("something"), &something())
        .await
        .unwrap();
    custom_store
        .save(&SessionId::from("something"), &something())
        .await
        .unwrap();

    assert!(fake.contains(&format!("{DEFAULT_KEY_PREFIX}something")));
    assert!(fake.contains("myprefix_something"));
    assert_eq!(fake.len(), 2);
}

#[tokio::test]
async fn test_get_undecodable_record_returns_decode_error() {
    let fake = FakeRedis::start().await;
    let store = RedisStore::new(&fake.url()).unwrap();
    fake.insert_raw("SESS_garbled", b"\x00not a session");

    let result = store.get(&SessionId::from("garbled")).await;

    match result {
        Err(err @ StoreError::Decode { cmd: "GET", .. }) => {
            assert!(err.to_string().starts_with("decode GET"));
        }
        other => panic!("expected Decode error, got {other:?}"),
    }
}

// =========================================================================
// Construction
// =========================================================================

#[test]
fn test_new_rejects_malformed_and_wrong_scheme_urls() {
    assert!(matches!(
        RedisStore::new(":,/"),
        Err(ConfigError::MalformedUrl(_))
    ));
    assert!(matches!(
        RedisStore::new("http://google.com/"),
        Err(ConfigError::InvalidScheme { .. })
    ));
}

#[tokio::test]
async fn test_nothing_listening_fails_on_first_operation_not_construction() {
    // Grab a free port, then release it so nothing is listening there.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = RedisStore::new(&format!("redis://{addr}"))
        .expect("construction must not connect");

    let result = store.get(&SessionId::from("anything")).await;

    assert!(
        matches!(result, Err(StoreError::Backend { op: "connect", cmd: "GET", .. })),
        "expected connect backend error, got {result:?}"
    );
}

// =========================================================================
// Backend failures
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exhausted_pool_times_out_as_connect_error() {
    let fake = FakeRedis::start().await;
    let config = RedisStoreConfig::new(fake.url())
        .pool_size(1)
        .wait_timeout(Duration::from_millis(200));
    let store = RedisStore::from_config(config).unwrap();
    fake.stall_reads();

    // Holds the only connection while the server sits on its GET.
    let holder = tokio::spawn({
        let store = store.clone();
        async move { store.get(&SessionId::from("slow")).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let result = store.save(&SessionId::from("other"), &something()).await;

    assert!(
        matches!(result, Err(StoreError::Backend { op: "connect", cmd: "SET", .. })),
        "expected connect backend error, got {result:?}"
    );
    assert!(started.elapsed() < STALL, "waited for the stalled command");
    assert!(!fake.contains("SESS_other"));
    holder.abort();
}

/// Stores one record, breaks the server with `breaker`, then runs each of
/// save/get/destroy and checks the failure and that nothing was lost.
async fn assert_each_operation_fails<F, Fut>(breaker: F, check: fn(&StoreError))
where
    F: Fn(Arc<FakeRedis>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    for op in 0..3 {
        let fake = Arc::new(FakeRedis::start().await);
        let store = RedisStore::new(&fake.url()).unwrap();

        assert!(matches!(
            store.get(&SessionId::from("nonpresent")).await,
            Err(StoreError::NotFound)
        ));
        store
            .save(&SessionId::from("something"), &something())
            .await
            .expect("save before breaking");
        assert_eq!(fake.len(), 1);

        breaker(Arc::clone(&fake)).await;

        let err = match op {
            0 => store
                .save(&SessionId::from("secondthing"), &something())
                .await
                .expect_err("save should fail"),
            1 => store
                .get(&SessionId::from("something"))
                .await
                .expect_err("get should fail"),
            _ => store
                .destroy(&SessionId::from("something"))
                .await
                .expect_err("destroy should fail"),
        };
        check(&err);

        assert_eq!(fake.len(), 1, "op {op}: record count must not change");
        assert!(fake.contains("SESS_something"), "op {op}: record lost");
    }
}

#[tokio::test]
async fn test_server_errors_surface_as_backend_with_command() {
    assert_each_operation_fails(
        |fake| async move { fake.force_errors() },
        |err| {
            let StoreError::Backend { op, cmd, source } = err else {
                panic!("expected Backend error, got {err:?}");
            };
            assert_ne!(*op, "connect");
            assert!(["GET", "SET", "DEL"].contains(cmd));
            let redis_err = source
                .downcast_ref::<RedisError>()
                .expect("source should be the redis error");
            assert!(redis_err.to_string().contains("forced"));
        },
    )
    .await;
}

#[tokio::test]
async fn test_vanished_server_surfaces_as_backend() {
    assert_each_operation_fails(
        |fake| async move { fake.stop().await },
        |err| {
            assert!(
                matches!(err, StoreError::Backend { .. }),
                "expected Backend error, got {err:?}"
            );
        },
    )
    .await;
}
