use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpResponse, HttpServer, web};
use bytes::Bytes;
use futures::stream;
use serde_json::Value;

/// Voice that makes the mock answer 500
pub const FAILING_VOICE: &str = "explode";
/// Voice that makes the mock break the ogg body after the first chunk
pub const TRUNCATING_VOICE: &str = "truncate";

#[derive(Clone)]
pub struct MockBackendConfig {
    /// `/health` answers 503 this many times before answering 200
    pub unhealthy_polls: u32,
    /// `/health` sleeps this long before answering
    pub health_delay: Duration,
    pub response_delay: Duration,
    pub wav_body: Vec<u8>,
    pub ogg_chunks: Vec<Vec<u8>>,
    pub chunk_delay: Duration,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            unhealthy_polls: 0,
            health_delay: Duration::ZERO,
            response_delay: Duration::ZERO,
            wav_body: b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec(),
            ogg_chunks: vec![b"OggS-one".to_vec(), b"OggS-two".to_vec(), b"OggS-three".to_vec()],
            chunk_delay: Duration::from_millis(5),
        }
    }
}

pub struct MockBackendState {
    config: MockBackendConfig,
    pub health_calls: AtomicU32,
    pub speech_calls: AtomicU32,
    pub in_flight: AtomicI64,
    pub high_water: AtomicI64,
    pub last_body: Mutex<Option<Value>>,
}

impl MockBackendState {
    pub fn speech_calls(&self) -> u32 {
        self.speech_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> u32 {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn high_water(&self) -> i64 {
        self.high_water.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Option<Value> {
        self.last_body.lock().unwrap().clone()
    }
}

/// Marks one speech call as being served until dropped.
struct InFlight(Arc<MockBackendState>);

impl InFlight {
    fn enter(state: Arc<MockBackendState>) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.high_water.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process stand-in for the inference server
pub struct MockBackend {
    pub url: String,
    pub state: Arc<MockBackendState>,
    handle: ServerHandle,
}

impl MockBackend {
    pub async fn start(config: MockBackendConfig) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(MockBackendState {
            config,
            health_calls: AtomicU32::new(0),
            speech_calls: AtomicU32::new(0),
            in_flight: AtomicI64::new(0),
            high_water: AtomicI64::new(0),
            last_body: Mutex::new(None),
        });
        let data = web::Data::from(state.clone());

        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/health", web::get().to(health))
                .route("/v1/audio/speech", web::post().to(speech))
        })
        .workers(2)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();

        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            url: format!("http://127.0.0.1:{}", port),
            state,
            handle,
        }
    }

    pub async fn stop(&self) {
        self.handle.stop(false).await;
    }

    /// Poll until the mock has no open speech call, or give up.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.state.in_flight() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.state.in_flight() == 0
    }
}

async fn health(state: web::Data<MockBackendState>) -> HttpResponse {
    let calls = state.health_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if !state.config.health_delay.is_zero() {
        tokio::time::sleep(state.config.health_delay).await;
    }
    if calls > state.config.unhealthy_polls {
        HttpResponse::Ok().body("ok")
    } else {
        HttpResponse::ServiceUnavailable().body("loading model")
    }
}

async fn speech(state: web::Data<MockBackendState>, body: web::Json<Value>) -> HttpResponse {
    let body = body.into_inner();
    state.speech_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_body.lock().unwrap() = Some(body.clone());

    let guard = InFlight::enter(state.clone().into_inner());
    let config = state.config.clone();
    if !config.response_delay.is_zero() {
        tokio::time::sleep(config.response_delay).await;
    }

    let voice = body["voice"].as_str().unwrap_or_default().to_string();
    if voice == FAILING_VOICE {
        return HttpResponse::InternalServerError().body("backend exploded");
    }

    if body["response_format"] == "wav" {
        return HttpResponse::Ok()
            .content_type("audio/wav")
            .body(config.wav_body);
    }

    let truncate_after = (voice == TRUNCATING_VOICE).then_some(1usize);
    let chunks = stream::unfold((0usize, guard), move |(index, guard)| {
        let config = config.clone();
        async move {
            if Some(index) == truncate_after {
                // let the chunks already sent reach the client first
                tokio::time::sleep(config.chunk_delay * 4).await;
                let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "gpu fell over");
                return Some((Err(err), (config.ogg_chunks.len(), guard)));
            }
            let chunk = config.ogg_chunks.get(index)?.clone();
            tokio::time::sleep(config.chunk_delay).await;
            Some((Ok::<_, std::io::Error>(Bytes::from(chunk)), (index + 1, guard)))
        }
    });

    HttpResponse::Ok().content_type("audio/ogg").streaming(chunks)
}
