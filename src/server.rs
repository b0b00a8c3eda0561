//! The command pipe server.
//!
//! Listens on a freshly generated Unix socket and serves one request per
//! connection: the body is read to end-of-stream, parsed as JSON, dispatched
//! by its `type` discriminator to a host collaborator, and answered with an
//! HTTP/1.1 response.  Companion processes learn the socket path out-of-band
//! (the owning application prints or exports it); being able to connect is
//! the only authorization the channel has.
//!
//! Each accepted connection is served on its own thread, so a long-running
//! `"command"` never delays a later connection.  Once dispatched, a handler
//! runs to completion — there is no per-request timeout or cancellation,
//! only [`CliServer::dispose`] to stop accepting new connections.

use crate::endpoint::{self, SocketGuard};
use crate::http::{self, Response};
use crate::protocol::{CommandArgs, OpenArgs, Request};
use crate::traits::{CommandExecutor, StatusReporter, WindowOpener};
use log::{debug, info, warn};
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// How many fresh socket names to try before giving up on binding.
const BIND_ATTEMPTS: usize = 8;

/// Errors from binding the pipe endpoint.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("failed to bind socket: {0}")]
    Io(#[from] io::Error),
    #[error("no free socket name after {0} attempts")]
    Exhausted(usize),
}

/// Server-side settings, usually derived from [`Config`](crate::config::Config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory for the generated socket file.  `None` means
    /// [`endpoint::default_socket_dir`].
    pub socket_dir: Option<PathBuf>,
    /// Leading component of the generated socket file name.
    pub socket_prefix: String,
    /// Extensions recognized as workspace descriptors.
    pub workspace_extensions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&crate::config::Config::default())
    }
}

impl From<&crate::config::Config> for ServerConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            socket_dir: config.socket.directory.clone(),
            socket_prefix: config.socket.prefix.clone(),
            workspace_extensions: config.workspace_extensions.clone(),
        }
    }
}

//  Request handling

/// Parses a request body and dispatches it to the host collaborators.
///
/// Cloned into every connection thread; holds the collaborators behind
/// [`Arc`]s so a clone is cheap.
pub struct RequestHandler<O, E, S> {
    opener: Arc<O>,
    executor: Arc<E>,
    status: Arc<S>,
    workspace_extensions: Arc<Vec<String>>,
}

impl<O, E, S> Clone for RequestHandler<O, E, S> {
    fn clone(&self) -> Self {
        Self {
            opener: Arc::clone(&self.opener),
            executor: Arc::clone(&self.executor),
            status: Arc::clone(&self.status),
            workspace_extensions: Arc::clone(&self.workspace_extensions),
        }
    }
}

impl<O, E, S> RequestHandler<O, E, S>
where
    O: WindowOpener,
    E: CommandExecutor,
    S: StatusReporter,
{
    pub fn new(
        opener: Arc<O>,
        executor: Arc<E>,
        status: Arc<S>,
        workspace_extensions: Vec<String>,
    ) -> Self {
        Self {
            opener,
            executor,
            status,
            workspace_extensions: Arc::new(workspace_extensions),
        }
    }

    /// Handle one raw request body and produce the response to write back.
    ///
    /// A body that is not valid JSON, or whose `type` is missing or
    /// unrecognized, is answered with `404` and the error message; collaborator
    /// failures are answered with `500` and the stringified error.
    pub fn handle(&self, raw_body: &str) -> Response {
        match Request::parse(raw_body) {
            Ok(Request::Open(args)) => self.handle_open(args),
            Ok(Request::Status) => self.handle_status(),
            Ok(Request::Command(args)) => self.handle_command(args),
            Err(e) => {
                debug!("rejecting request: {}", e);
                Response::text(404, e.to_string())
            }
        }
    }

    /// Best-effort: the caller always gets `200`, whether or not anything
    /// was opened.
    fn handle_open(&self, args: OpenArgs) -> Response {
        let (targets, options) = args.classify(&self.workspace_extensions);
        if targets.is_empty() {
            debug!("open request carried no usable targets");
        } else if let Err(e) = self.opener.open(targets, options) {
            warn!("window opener failed: {}", e);
        }
        Response::empty(200)
    }

    fn handle_status(&self) -> Response {
        match self.status.system_status() {
            Ok(status) => Response::text(200, status),
            Err(e) => Response::text(500, e.to_string()),
        }
    }

    fn handle_command(&self, args: CommandArgs) -> Response {
        let CommandArgs { command, args } = args;
        match self.executor.execute(&command, args) {
            Ok(result) => match serde_json::to_vec(&result) {
                Ok(body) => Response::json(200, body),
                Err(e) => Response::text(500, e.to_string()),
            },
            Err(e) => Response::text(500, e.to_string()),
        }
    }
}

//  Server

/// A running server's listener-side state.
struct Running {
    path: PathBuf,
    shutdown: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
    _guard: SocketGuard,
}

/// The command pipe server.
///
/// Owns the listening socket and the three host collaborators.  The server
/// holds no state across requests beyond the listener itself.
pub struct CliServer<O, E, S> {
    handler: RequestHandler<O, E, S>,
    config: ServerConfig,
    running: Option<Running>,
}

impl<O, E, S> CliServer<O, E, S>
where
    O: WindowOpener + Send + Sync + 'static,
    E: CommandExecutor + Send + Sync + 'static,
    S: StatusReporter + Send + Sync + 'static,
{
    pub fn new(opener: Arc<O>, executor: Arc<E>, status: Arc<S>, config: ServerConfig) -> Self {
        let handler = RequestHandler::new(
            opener,
            executor,
            status,
            config.workspace_extensions.clone(),
        );
        Self {
            handler,
            config,
            running: None,
        }
    }

    /// Bind a freshly generated socket and start accepting connections.
    ///
    /// Returns the socket path; the owning application hands it to companion
    /// processes out-of-band.  Calling `start` on an already-running server
    /// just returns the current path.  On failure the server stays inert —
    /// the caller decides whether that is fatal.
    pub fn start(&mut self) -> Result<PathBuf, BindError> {
        if let Some(running) = &self.running {
            return Ok(running.path.clone());
        }

        let dir = self
            .config
            .socket_dir
            .clone()
            .unwrap_or_else(endpoint::default_socket_dir);
        let (listener, guard) = bind_fresh_socket(&dir, &self.config.socket_prefix)?;
        let path = guard.path().to_path_buf();

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept = {
            let handler = self.handler.clone();
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || accept_loop(listener, handler, shutdown))
        };

        info!("command pipe listening on {}", path.display());
        self.running = Some(Running {
            path: path.clone(),
            shutdown,
            accept: Some(accept),
            _guard: guard,
        });
        Ok(path)
    }

    /// The live endpoint path, or `None` before `start` / after `dispose`.
    pub fn ipc_handle_path(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.path.as_path())
    }

    /// Block on the accept thread.  Returns when the server is disposed from
    /// another thread or the listener fails.
    pub fn join(&mut self) {
        if let Some(running) = self.running.as_mut() {
            if let Some(accept) = running.accept.take() {
                if accept.join().is_err() {
                    warn!("accept thread panicked");
                }
            }
        }
    }

    /// Stop accepting connections and remove the socket file.
    ///
    /// Idempotent; also runs on drop.  In-flight connection threads are left
    /// to finish on their own.
    pub fn dispose(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        running.shutdown.store(true, Ordering::SeqCst);
        // The accept loop blocks inside accept(2); a throwaway connection
        // wakes it so it can observe the shutdown flag.
        let _ = UnixStream::connect(&running.path);
        if let Some(accept) = running.accept.take() {
            if accept.join().is_err() {
                warn!("accept thread panicked");
            }
        }
        info!("command pipe on {} closed", running.path.display());
        // Dropping `running` unlinks the socket file via its guard.
    }
}

impl<O, E, S> Drop for CliServer<O, E, S> {
    fn drop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        running.shutdown.store(true, Ordering::SeqCst);
        let _ = UnixStream::connect(&running.path);
        if let Some(accept) = running.accept.take() {
            let _ = accept.join();
        }
    }
}

/// Bind a listener at a collision-resistant generated path, retrying with a
/// fresh nonce when the name is already taken.
fn bind_fresh_socket(dir: &Path, prefix: &str) -> Result<(UnixListener, SocketGuard), BindError> {
    for _ in 0..BIND_ATTEMPTS {
        let path = endpoint::generate_socket_path(dir, prefix);
        match UnixListener::bind(&path) {
            Ok(listener) => return Ok((listener, SocketGuard::new(path))),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!("socket name {} already taken, retrying", path.display());
            }
            Err(e) => return Err(BindError::Io(e)),
        }
    }
    Err(BindError::Exhausted(BIND_ATTEMPTS))
}

fn accept_loop<O, E, S>(
    listener: UnixListener,
    handler: RequestHandler<O, E, S>,
    shutdown: Arc<AtomicBool>,
) where
    O: WindowOpener + Send + Sync + 'static,
    E: CommandExecutor + Send + Sync + 'static,
    S: StatusReporter + Send + Sync + 'static,
{
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            debug!("pipe server shutting down");
            break;
        }
        match stream {
            Ok(stream) => {
                let handler = handler.clone();
                std::thread::spawn(move || serve(handler, stream));
            }
            Err(e) => {
                warn!("accept failed: {}", e);
            }
        }
    }
}

/// Serve a single connection: one request in, one response out.
fn serve<O, E, S>(handler: RequestHandler<O, E, S>, mut stream: UnixStream)
where
    O: WindowOpener,
    E: CommandExecutor,
    S: StatusReporter,
{
    debug!("client connected");
    let response = match http::read_request_body(&mut stream) {
        Ok(body) => handler.handle(&String::from_utf8_lossy(&body)),
        Err(e) => {
            warn!("failed to read request: {}", e);
            Response::text(400, e.to_string())
        }
    };
    if let Err(e) = http::write_response(&mut stream, &response) {
        warn!("failed to write response: {}", e);
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
    debug!("client disconnected");
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OpenOptions, OpenTarget};
    use crate::registry::{CommandError, CommandRegistry};
    use serde_json::{json, Value};
    use std::io::{Read, Write};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    //  Mock collaborators

    /// Records every open call made to it.
    #[derive(Debug, Default)]
    struct MockOpener {
        calls: Mutex<Vec<(Vec<OpenTarget>, OpenOptions)>>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("mock error")]
    struct MockError;

    impl WindowOpener for MockOpener {
        type Error = MockError;

        fn open(&self, targets: Vec<OpenTarget>, options: OpenOptions) -> Result<(), MockError> {
            self.calls.lock().unwrap().push((targets, options));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FixedStatus(Result<&'static str, &'static str>);

    impl StatusReporter for FixedStatus {
        type Error = MockError;

        fn system_status(&self) -> Result<String, MockError> {
            match self.0 {
                Ok(s) => Ok(s.to_string()),
                Err(_) => Err(MockError),
            }
        }
    }

    fn test_registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register("echo", |args| Ok(Value::Array(args)));
        registry.register("boom", |_| Err(CommandError::Failed("kaboom".into())));
        registry
    }

    fn test_handler(
        opener: Arc<MockOpener>,
        status: FixedStatus,
    ) -> RequestHandler<MockOpener, CommandRegistry, FixedStatus> {
        RequestHandler::new(
            opener,
            Arc::new(test_registry()),
            Arc::new(status),
            vec!["code-workspace".into()],
        )
    }

    //  Handler dispatch

    #[test]
    fn open_forwards_classified_batch() {
        let opener = Arc::new(MockOpener::default());
        let handler = test_handler(Arc::clone(&opener), FixedStatus(Ok("ok")));

        let response = handler.handle(
            r#"{"type":"open","folderURIs":["file:///proj"],"fileURIs":["file:///a.txt"]}"#,
        );
        assert_eq!(response, Response::empty(200));

        let calls = opener.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (targets, options) = &calls[0];
        assert_eq!(targets.len(), 2);
        assert!(matches!(targets[0], OpenTarget::Folder(_)));
        assert!(matches!(targets[1], OpenTarget::File(_)));
        assert!(options.force_new_window);
    }

    #[test]
    fn empty_open_gives_200_without_collaborator_call() {
        let opener = Arc::new(MockOpener::default());
        let handler = test_handler(Arc::clone(&opener), FixedStatus(Ok("ok")));

        let response = handler.handle(r#"{"type":"open","folderURIs":[],"fileURIs":[]}"#);
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert!(opener.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn open_with_only_malformed_uris_gives_200_without_call() {
        let opener = Arc::new(MockOpener::default());
        let handler = test_handler(Arc::clone(&opener), FixedStatus(Ok("ok")));

        let response =
            handler.handle(r#"{"type":"open","folderURIs":["not a uri"],"fileURIs":["%%%"]}"#);
        assert_eq!(response.status, 200);
        assert!(opener.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn status_success_returns_payload() {
        let handler = test_handler(Arc::new(MockOpener::default()), FixedStatus(Ok("all good")));
        let response = handler.handle(r#"{"type":"status"}"#);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"all good");
    }

    #[test]
    fn status_failure_returns_500_with_error_string() {
        let handler = test_handler(Arc::new(MockOpener::default()), FixedStatus(Err("down")));
        let response = handler.handle(r#"{"type":"status"}"#);
        assert_eq!(response.status, 500);
        assert_eq!(response.body, b"mock error");
    }

    #[test]
    fn command_result_is_json_serialized() {
        let handler = test_handler(Arc::new(MockOpener::default()), FixedStatus(Ok("ok")));
        let response =
            handler.handle(r#"{"type":"command","command":"echo","args":[1,"two"]}"#);
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "application/json");
        let value: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value, json!([1, "two"]));
    }

    #[test]
    fn failing_command_returns_500_with_error_string() {
        let handler = test_handler(Arc::new(MockOpener::default()), FixedStatus(Ok("ok")));
        let response = handler.handle(r#"{"type":"command","command":"boom","args":[]}"#);
        assert_eq!(response.status, 500);
        assert_eq!(response.body, b"kaboom");
    }

    #[test]
    fn unknown_command_returns_500_not_found_message() {
        let handler = test_handler(Arc::new(MockOpener::default()), FixedStatus(Ok("ok")));
        let response = handler.handle(r#"{"type":"command","command":"absent","args":[]}"#);
        assert_eq!(response.status, 500);
        assert_eq!(response.body, b"command not found: absent");
    }

    #[test]
    fn unknown_type_returns_404_with_message() {
        let handler = test_handler(Arc::new(MockOpener::default()), FixedStatus(Ok("ok")));
        let response = handler.handle(r#"{"type":"ping"}"#);
        assert_eq!(response.status, 404);
        assert_eq!(response.body, b"Unknown message type: ping");
    }

    #[test]
    fn invalid_json_returns_404() {
        let handler = test_handler(Arc::new(MockOpener::default()), FixedStatus(Ok("ok")));
        let response = handler.handle("not json");
        assert_eq!(response.status, 404);
    }

    //  Socket round trips

    /// Monotonic counter to generate unique socket directories per test.
    static TEST_ID: AtomicU32 = AtomicU32::new(0);

    fn test_config() -> ServerConfig {
        let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("openpipe-test-{}-{}", std::process::id(), id));
        std::fs::create_dir_all(&dir).unwrap();
        ServerConfig {
            socket_dir: Some(dir),
            socket_prefix: "openpipe-test".into(),
            workspace_extensions: vec!["code-workspace".into()],
        }
    }

    fn test_server() -> CliServer<MockOpener, CommandRegistry, FixedStatus> {
        CliServer::new(
            Arc::new(MockOpener::default()),
            Arc::new(test_registry()),
            Arc::new(FixedStatus(Ok("alive"))),
            test_config(),
        )
    }

    /// Connect, send `body`, half-close, and return (status, response body).
    fn request(path: &Path, body: &str) -> (u16, String) {
        let mut stream = UnixStream::connect(path).expect("connect");
        stream.write_all(body.as_bytes()).unwrap();
        stream.shutdown(std::net::Shutdown::Write).unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();
        let status: u16 = raw
            .split(' ')
            .nth(1)
            .expect("status line")
            .parse()
            .expect("status code");
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (status, body)
    }

    #[test]
    fn command_round_trip_over_socket() {
        let mut server = test_server();
        let path = server.start().unwrap();

        let (status, body) = request(&path, r#"{"type":"command","command":"echo","args":[42]}"#);
        assert_eq!(status, 200);
        assert_eq!(body, "[42]");
    }

    #[test]
    fn http_framed_request_over_socket() {
        let mut server = test_server();
        let path = server.start().unwrap();

        let json = r#"{"type":"status"}"#;
        let framed = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            json.len(),
            json
        );
        let (status, body) = request(&path, &framed);
        assert_eq!(status, 200);
        assert_eq!(body, "alive");
    }

    #[test]
    fn framed_client_is_answered_without_half_close() {
        let mut server = test_server();
        let path = server.start().unwrap();

        let json = r#"{"type":"status"}"#;
        let framed = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            json.len(),
            json
        );

        let mut stream = UnixStream::connect(&path).expect("connect");
        stream
            .set_read_timeout(Some(std::time::Duration::from_secs(5)))
            .unwrap();
        stream.write_all(framed.as_bytes()).unwrap();
        // Write side stays open, as a conforming HTTP/1.1 client's does
        // while it waits for the response.
        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.ends_with("alive"));
    }

    #[test]
    fn unknown_type_round_trip() {
        let mut server = test_server();
        let path = server.start().unwrap();

        let (status, body) = request(&path, r#"{"type":"ping"}"#);
        assert_eq!(status, 404);
        assert_eq!(body, "Unknown message type: ping");
    }

    #[test]
    fn concurrent_connections_both_complete() {
        let mut server = test_server();
        let path = server.start().unwrap();

        let mut handles = Vec::new();
        for i in 0..2 {
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                request(&path, &format!(r#"{{"type":"command","command":"echo","args":[{}]}}"#, i))
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.contains(&(200, "[0]".to_string())));
        assert!(results.contains(&(200, "[1]".to_string())));
    }

    #[test]
    fn start_is_idempotent() {
        let mut server = test_server();
        let first = server.start().unwrap();
        let second = server.start().unwrap();
        assert_eq!(first, second);
        assert_eq!(server.ipc_handle_path(), Some(first.as_path()));
    }

    #[test]
    fn bind_failure_leaves_server_inert() {
        let config = ServerConfig {
            socket_dir: Some(PathBuf::from("/nonexistent/openpipe-no-such-dir")),
            socket_prefix: "openpipe-test".into(),
            workspace_extensions: vec!["code-workspace".into()],
        };
        let mut server = CliServer::new(
            Arc::new(MockOpener::default()),
            Arc::new(test_registry()),
            Arc::new(FixedStatus(Ok("alive"))),
            config,
        );

        let err = server.start();
        assert!(matches!(err, Err(BindError::Io(_))));
        assert!(server.ipc_handle_path().is_none());
        // Disposing a server that never started is a no-op.
        server.dispose();
        assert!(server.ipc_handle_path().is_none());
    }

    #[test]
    fn dispose_closes_listener_and_removes_socket_file() {
        let mut server = test_server();
        let path = server.start().unwrap();
        assert!(path.exists());

        server.dispose();
        assert!(!path.exists());
        assert!(server.ipc_handle_path().is_none());
        assert!(UnixStream::connect(&path).is_err());

        // A second dispose is a no-op.
        server.dispose();
    }
}
