//! TCP-based engine gateway for the driver binary.
//!
//! [`RemoteGateway`] implements the [`EngineGateway`] trait by exchanging
//! newline-delimited JSON messages with a stepwise traffic engine over a
//! TCP socket, optionally launching the engine process itself first.
//!
//! # Wire Convention
//!
//! - **Request:** one line, `{"op": "...", ...}` with the remaining keys
//!   named after the operation's parameters.
//! - **Response:** one line, `{"ok": <payload>}` on success or
//!   `{"err": "<message>"}` when the engine rejects the request.
//!
//! Every request is answered before the next one is written, so the
//! connection never carries more than one message in flight.
//!
//! # Sync/Async Bridge
//!
//! The [`EngineGateway`] trait methods are synchronous, but socket I/O is
//! async. We use [`tokio::runtime::Handle::current()`] with `block_on` to
//! bridge into the existing tokio runtime.

use std::time::Duration;

use flowscope_core::config::EngineConfig;
use flowscope_core::gateway::{
    EngineGateway, EntityKind, EntitySpec, Field, FieldValue, GatewayError,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, warn};

/// Delay between connection attempts while the engine is starting up.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// One request line sent to the engine.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireRequest<'a> {
    List {
        kind: EntityKind,
    },
    Get {
        kind: EntityKind,
        id: &'a str,
        field: Field,
    },
    Set {
        kind: EntityKind,
        id: &'a str,
        field: Field,
        value: &'a FieldValue,
    },
    Add {
        spec: &'a EntitySpec,
    },
    Step,
    Time,
    Arrived,
    Close,
}

/// One response line received from the engine.
#[derive(Debug, Deserialize)]
enum WireResponse {
    /// The request succeeded; the payload shape depends on the operation.
    #[serde(rename = "ok")]
    Ok(serde_json::Value),
    /// The engine rejected the request.
    #[serde(rename = "err")]
    Err(String),
}

/// A gateway that talks to a live engine process over TCP.
///
/// Created via [`RemoteGateway::launch_and_connect`]. When the configured
/// launch command is empty the gateway attaches to an already-running
/// engine instead of spawning one.
pub struct RemoteGateway {
    /// Buffered read half of the engine socket.
    reader: BufReader<OwnedReadHalf>,
    /// Write half of the engine socket.
    writer: OwnedWriteHalf,
    /// The engine process, when this gateway launched it.
    child: Option<tokio::process::Child>,
    /// Remote address, kept for log context.
    address: String,
}

impl RemoteGateway {
    /// Launch the engine process (unless attaching) and connect to it.
    ///
    /// Connection attempts are retried until `startup_wait_ms` elapses,
    /// which covers the window where a freshly launched engine has not
    /// opened its listening port yet.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Io`] if the process cannot be spawned or no
    /// connection is established within the startup window.
    pub async fn launch_and_connect(config: &EngineConfig) -> Result<Self, GatewayError> {
        let child = if config.launch_command.is_empty() {
            info!(
                host = %config.host,
                port = config.port,
                "Attaching to an already-running engine"
            );
            None
        } else {
            let mut command = tokio::process::Command::new(&config.launch_command);
            command
                .arg("-c")
                .arg(&config.scenario)
                .arg("--step-length")
                .arg(config.step_length_s.to_string())
                .arg("--remote-port")
                .arg(config.port.to_string())
                .kill_on_drop(true);
            let child = command.spawn()?;
            info!(
                command = %config.launch_command,
                scenario = %config.scenario,
                "Engine process launched"
            );
            Some(child)
        };

        let address = format!("{}:{}", config.host, config.port);
        let startup_wait = Duration::from_millis(config.startup_wait_ms);
        let stream = connect_with_retry(&address, startup_wait).await?;
        // Every frame is a short line; latency matters more than throughput.
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        info!(address = %address, "Engine gateway connected");

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            child,
            address,
        })
    }

    /// Send one request line and read the matching response line.
    async fn exchange(
        &mut self,
        request: &WireRequest<'_>,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut line = serde_json::to_string(request).map_err(|e| GatewayError::Protocol {
            message: format!("failed to encode request: {e}"),
        })?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        let mut response = String::new();
        let read = self.reader.read_line(&mut response).await?;
        if read == 0 {
            return Err(GatewayError::Protocol {
                message: String::from("engine closed the connection"),
            });
        }

        let parsed: WireResponse =
            serde_json::from_str(&response).map_err(|e| GatewayError::Protocol {
                message: format!("malformed response line: {e}"),
            })?;
        match parsed {
            WireResponse::Ok(value) => Ok(value),
            WireResponse::Err(message) => Err(GatewayError::Rejected { message }),
        }
    }

    /// Run one request/response exchange from a synchronous caller.
    fn request_blocking(
        &mut self,
        request: &WireRequest<'_>,
    ) -> Result<serde_json::Value, GatewayError> {
        // Bridge from the sync trait method to async socket I/O using the
        // current tokio runtime handle. The control loop already runs in
        // an async context, so a handle is always available there.
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| GatewayError::Protocol {
                message: format!("no tokio runtime available: {e}"),
            })?;

        // Use `block_in_place` to avoid blocking the runtime's executor
        // thread when calling `block_on`.
        tokio::task::block_in_place(|| handle.block_on(self.exchange(request)))
    }
}

/// Connect to `address`, retrying until `startup_wait` has elapsed.
async fn connect_with_retry(
    address: &str,
    startup_wait: Duration,
) -> Result<TcpStream, GatewayError> {
    let deadline = tokio::time::Instant::now()
        .checked_add(startup_wait)
        .unwrap_or_else(tokio::time::Instant::now);

    loop {
        match TcpStream::connect(address).await {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(GatewayError::Io { source: error });
                }
                debug!(
                    address = %address,
                    error = %error,
                    "Engine not accepting connections yet, retrying"
                );
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
    }
}

/// Decode a response payload into the type the operation promises.
fn decode_payload<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, GatewayError> {
    serde_json::from_value(value).map_err(|e| GatewayError::Protocol {
        message: format!("malformed {what} payload: {e}"),
    })
}

impl std::fmt::Debug for RemoteGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteGateway")
            .field("address", &self.address)
            .field("launched", &self.child.is_some())
            .finish_non_exhaustive()
    }
}

impl EngineGateway for RemoteGateway {
    fn list_entities(&mut self, kind: EntityKind) -> Result<Vec<String>, GatewayError> {
        let value = self.request_blocking(&WireRequest::List { kind })?;
        decode_payload(value, "id list")
    }

    fn get_field(
        &mut self,
        kind: EntityKind,
        id: &str,
        field: Field,
    ) -> Result<FieldValue, GatewayError> {
        let value = self.request_blocking(&WireRequest::Get { kind, id, field })?;
        decode_payload(value, "field")
    }

    fn set_field(
        &mut self,
        kind: EntityKind,
        id: &str,
        field: Field,
        value: FieldValue,
    ) -> Result<(), GatewayError> {
        self.request_blocking(&WireRequest::Set {
            kind,
            id,
            field,
            value: &value,
        })?;
        Ok(())
    }

    fn add_entity(&mut self, spec: &EntitySpec) -> Result<(), GatewayError> {
        self.request_blocking(&WireRequest::Add { spec })?;
        Ok(())
    }

    fn step(&mut self) -> Result<(), GatewayError> {
        self.request_blocking(&WireRequest::Step)?;
        Ok(())
    }

    fn current_time(&mut self) -> Result<f64, GatewayError> {
        let value = self.request_blocking(&WireRequest::Time)?;
        decode_payload(value, "clock")
    }

    fn arrived_last_step(&mut self) -> Result<u64, GatewayError> {
        let value = self.request_blocking(&WireRequest::Arrived)?;
        decode_payload(value, "arrival count")
    }

    fn close(&mut self) -> Result<(), GatewayError> {
        let result = self.request_blocking(&WireRequest::Close).map(|_| ());
        if let Some(mut child) = self.child.take() {
            if let Err(error) = child.start_kill() {
                warn!(error = %error, "Engine process did not accept the kill signal");
            }
        }
        result
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
