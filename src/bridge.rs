//! A long-lived child process driven as a synchronous request/response
//! function.
//!
//! [`Bridge::spawn`] starts the command and three named threads:
//!
//! * the input pump writes each encoded request to the child's stdin;
//! * the output pump frames and decodes the child's stdout;
//! * the supervisor watches for the child to exit, and kills and reaps it
//!   once the bridge is cancelled.
//!
//! Every thread selects on the bridge's [`CancelToken`] alongside its own
//! channel, so the first failure anywhere (or cancellation from the caller)
//! terminates the bridge and is reported by every later [`Bridge::call`].
//! The child inherits the parent's stderr.

use std::fmt;
use std::io::{self, BufReader, Write as _};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::cancel::CancelToken;
use crate::codec::{Codec, CodecError, Framer, framing_error};
use crate::prelude::*;

/// How often the supervisor polls the child for exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long the output pump waits, after the child closes stdout, for the
/// supervisor to observe the exit before reporting a closed stream.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// How long teardown waits for each pump after the child is reaped. A pump
/// still blocked on a pipe that another process holds open is detached.
const PUMP_JOIN_GRACE: Duration = Duration::from_millis(250);

/// The stream or handle an I/O error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Stream {
    #[display(fmt = "stdin")]
    Stdin,
    #[display(fmt = "stdout")]
    Stdout,
    #[display(fmt = "process")]
    Process,
}

/// Why a call failed or a bridge terminated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// The child wrote a malformed record.
    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),

    /// The request couldn't be encoded. The bridge stays usable.
    #[error("failed to encode request: {0}")]
    Encode(#[source] CodecError),

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source:  Arc<io::Error>,
    },

    /// The child exited with a failure status.
    #[error("{command} exited unsuccessfully ({status})")]
    Exited { command: String, status: ExitStatus },

    #[error("i/o error on {stream}: {source}")]
    Io {
        stream: Stream,
        #[source]
        source: Arc<io::Error>,
    },

    /// The child closed stdout without exiting.
    #[error("{command} closed its output")]
    OutputClosed { command: String },

    /// Cancelled by the caller.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The child exited successfully, so no more calls can be answered.
    #[error("{command} exited")]
    Completed { command: String },

    /// The bridge was shut down locally.
    #[error("bridge closed")]
    Closed,
}

impl BridgeError {
    fn io(stream: Stream, source: io::Error) -> Self {
        Self::Io {
            stream,
            source: Arc::new(source),
        }
    }
}

/// Lifecycle of a bridge. `Starting` only lasts until [`Bridge::spawn`]
/// returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BridgeState {
    #[display(fmt = "starting")]
    Starting,
    #[display(fmt = "running")]
    Running,
    #[display(fmt = "completed")]
    Completed,
    #[display(fmt = "failed")]
    Failed,
    #[display(fmt = "cancelled")]
    Cancelled,
}

impl BridgeState {
    fn of(cause: Option<&BridgeError>) -> Self {
        match cause {
            None => Self::Running,
            Some(BridgeError::Completed { .. }) => Self::Completed,
            Some(BridgeError::Cancelled(_) | BridgeError::TimedOut(_) | BridgeError::Closed) => Self::Cancelled,
            Some(_) => Self::Failed,
        }
    }
}

/// An external command line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args:    Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir:     Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

struct Calls<O> {
    requests:  Option<Sender<Vec<u8>>>,
    recycled:  Receiver<Vec<u8>>,
    responses: Receiver<O>,
}

/// A pump thread plus a receiver that disconnects when the thread exits.
struct Pump {
    name:     &'static str,
    handle:   JoinHandle<()>,
    finished: Receiver<()>,
}

impl Pump {
    fn spawn<F>(name: &'static str, f: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exiting, finished) = bounded::<()>(0);
        let handle = spawn_named(name, move || {
            let _exiting = exiting;
            f();
        })?;
        Ok(Self { name, handle, finished })
    }

    fn join_within(self, grace: Duration, command: &str) {
        let Self { name, handle, finished } = self;
        select! {
            recv(finished) -> _ => {
                if handle.join().is_err() {
                    warn!(%command, thread = name, "bridge worker panicked");
                }
            }
            default(grace) => {
                warn!(%command, thread = name, "pipe still held open by another process, detaching pump");
            }
        }
    }
}

#[derive(Default)]
struct Workers {
    supervisor: Option<JoinHandle<()>>,
    pumps:      Vec<Pump>,
}

impl Workers {
    /// Joins the supervisor, which reaps the child once the token fires, then
    /// each pump for at most [`PUMP_JOIN_GRACE`].
    fn join(&mut self, command: &str) {
        if let Some(supervisor) = self.supervisor.take() {
            if supervisor.join().is_err() {
                warn!(%command, thread = "supervisor", "bridge worker panicked");
            }
        }
        for pump in self.pumps.drain(..) {
            pump.join_within(PUMP_JOIN_GRACE, command);
        }
    }
}

/// A running external command, callable one request at a time.
///
/// Calls are serialized; concurrent callers queue behind each other.
/// Dropping the bridge cancels it with [`BridgeError::Closed`], kills and
/// reaps the child, and joins the threads it started. A pump blocked on a
/// pipe that a descendant of the child still holds open is left to exit on
/// its own.
pub struct Bridge<C: Codec> {
    command: String,
    pid:     u32,
    codec:   Arc<C>,
    token:   CancelToken,
    calls:   Mutex<Calls<C::Output>>,
    workers: Workers,
}

impl<C: Codec> fmt::Debug for Bridge<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: Codec> Bridge<C> {
    /// Starts `spec` and wires it to `codec`. The bridge is cancelled when
    /// `parent` is, but its own failures don't propagate to `parent`.
    ///
    /// # Errors
    /// Returns [`BridgeError::Spawn`] if the process or a worker thread
    /// can't be started.
    pub fn spawn(spec: &CommandSpec, codec: C, parent: &CancelToken) -> Result<Self, BridgeError> {
        let command = spec.to_string();
        debug!(%command, state = %BridgeState::Starting, "spawning external command");

        let spawn_error = |source: io::Error| BridgeError::Spawn {
            command: command.clone(),
            source:  Arc::new(source),
        };

        let mut child = spec
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;
        let pid = child.id();

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_error(io::Error::other("child pipes were not captured")));
        };

        let token = parent.child();
        let codec = Arc::new(codec);
        let (request_tx, request_rx) = bounded(0);
        let (recycle_tx, recycle_rx) = bounded(1);
        let (response_tx, response_rx) = bounded(0);

        let mut workers = Workers::default();
        let started = supervise(child, token.clone(), command.clone()).and_then(|supervisor| {
            workers.supervisor = Some(supervisor);
            workers.pumps.push(pump_input(stdin, request_rx, recycle_tx, token.clone())?);
            workers
                .pumps
                .push(pump_output(stdout, Arc::clone(&codec), response_tx, token.clone(), command.clone())?);
            Ok(())
        });
        if let Err(err) = started {
            token.cancel(BridgeError::Closed);
            workers.join(&command);
            return Err(spawn_error(err));
        }

        info!(%command, pid, "external command running");
        Ok(Self {
            command,
            pid,
            codec,
            token,
            calls: Mutex::new(Calls {
                requests:  Some(request_tx),
                recycled:  recycle_rx,
                responses: response_rx,
            }),
            workers,
        })
    }

    /// Sends one request and waits for its response.
    ///
    /// # Errors
    /// Returns [`BridgeError::Encode`] if `input` can't be encoded, which
    /// leaves the bridge usable. Any other error means the bridge has
    /// terminated, and every later call returns the same cause.
    pub fn call(&self, input: &C::Input) -> Result<C::Output, BridgeError> {
        let calls = self.calls.lock();
        let Calls {
            requests,
            recycled,
            responses,
        } = &*calls;

        if let Some(cause) = self.token.cause() {
            return Err(cause);
        }
        let Some(requests) = requests.as_ref() else {
            return Err(BridgeError::Closed);
        };

        let mut buf = recycled.try_recv().unwrap_or_default();
        buf.clear();
        self.codec.encode(&mut buf, input).map_err(BridgeError::Encode)?;
        trace!(bytes = buf.len(), "sending request");

        select! {
            recv(self.token.done()) -> _ => return Err(self.token.wait()),
            send(requests, buf) -> sent => {
                if sent.is_err() {
                    return Err(self.token.wait());
                }
            }
        }

        select! {
            recv(self.token.done()) -> _ => Err(self.token.wait()),
            recv(responses) -> response => response.map_err(|_| self.token.wait()),
        }
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::of(self.token.cause().as_ref())
    }

    /// The terminal cause, once the bridge has stopped.
    pub fn cause(&self) -> Option<BridgeError> {
        self.token.cause()
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Terminates the bridge with `reason`. Pending and later calls fail
    /// with [`BridgeError::Cancelled`].
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(BridgeError::Cancelled(reason.into()));
    }

    /// Closes the child's stdin and waits for it to exit.
    ///
    /// This blocks until the child exits or the parent token is cancelled.
    ///
    /// # Errors
    /// Returns the terminal cause unless the child exited successfully.
    pub fn wait(self) -> Result<(), BridgeError> {
        self.calls.lock().requests = None;
        match self.token.wait() {
            BridgeError::Completed { .. } => Ok(()),
            cause => Err(cause),
        }
    }
}

impl<C: Codec> Drop for Bridge<C> {
    fn drop(&mut self) {
        if self.token.cancel(BridgeError::Closed) {
            debug!(command = %self.command, "closing bridge");
        }
        self.workers.join(&self.command);
    }
}

/// Runs `f` against a bridge to `spec`, then tears the bridge down,
/// whether `f` succeeds, fails, or unwinds.
///
/// # Errors
/// Returns spawn failures and whatever `f` returns. If `f` succeeds but the
/// bridge has already failed (the child exited unsuccessfully after the last
/// call, say), that failure is returned instead. A clean exit, a local close
/// or a caller's cancellation is not a failure.
pub fn run<C, T, E, F>(spec: &CommandSpec, codec: C, token: &CancelToken, f: F) -> Result<T, E>
where
    C: Codec,
    E: From<BridgeError>,
    F: FnOnce(&Bridge<C>) -> Result<T, E>,
{
    let bridge = Bridge::spawn(spec, codec, token)?;
    let value = f(&bridge)?;
    match bridge.cause() {
        None | Some(BridgeError::Closed | BridgeError::Completed { .. } | BridgeError::Cancelled(_)) => Ok(value),
        Some(cause) => Err(cause.into()),
    }
}

fn spawn_named<F>(name: &str, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_owned()).spawn(f)
}

fn pump_input(
    mut stdin: ChildStdin,
    requests: Receiver<Vec<u8>>,
    recycle: Sender<Vec<u8>>,
    token: CancelToken,
) -> io::Result<Pump> {
    Pump::spawn("tsdate-stdin", move || {
        loop {
            select! {
                recv(token.done()) -> _ => break,
                recv(requests) -> request => {
                    let Ok(buf) = request else {
                        debug!("closing child stdin");
                        break;
                    };
                    if let Err(err) = stdin.write_all(&buf).and_then(|()| stdin.flush()) {
                        token.cancel(BridgeError::io(Stream::Stdin, err));
                        break;
                    }
                    let _ = recycle.try_send(buf);
                }
            }
        }
    })
}

fn pump_output<C: Codec>(
    stdout: ChildStdout,
    codec: Arc<C>,
    responses: Sender<C::Output>,
    token: CancelToken,
    command: String,
) -> io::Result<Pump> {
    Pump::spawn("tsdate-stdout", move || {
        let mut reader = BufReader::new(stdout);
        let mut framer = codec.framer();
        let mut record = Vec::new();
        loop {
            match framer.next_record(&mut reader, &mut record) {
                Ok(true) => {}
                Ok(false) => {
                    select! {
                        recv(token.done()) -> _ => {}
                        default(EXIT_GRACE) => {
                            token.cancel(BridgeError::OutputClosed { command });
                        }
                    }
                    return;
                }
                Err(err) => {
                    let cause = match framing_error(&err) {
                        Some(framing) => {
                            warn!(%command, error = %framing, "malformed output");
                            BridgeError::Protocol(framing.clone())
                        }
                        None => BridgeError::io(Stream::Stdout, err),
                    };
                    token.cancel(cause);
                    return;
                }
            }

            let output = match codec.decode(&record) {
                Ok(output) => output,
                Err(err) => {
                    warn!(%command, error = %err, "malformed output");
                    token.cancel(err.into());
                    return;
                }
            };

            select! {
                recv(token.done()) -> _ => return,
                send(responses, output) -> sent => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    })
}

fn reap(child: &mut Child, command: &str) {
    let _ = child.kill();
    match child.wait() {
        Ok(status) => debug!(%command, %status, "external command reaped"),
        Err(err) => warn!(%command, error = %err, "failed to reap external command"),
    }
}

fn supervise(mut child: Child, token: CancelToken, command: String) -> io::Result<JoinHandle<()>> {
    spawn_named("tsdate-supervisor", move || {
        loop {
            select! {
                recv(token.done()) -> _ => {
                    reap(&mut child, &command);
                    return;
                }
                default(EXIT_POLL_INTERVAL) => match child.try_wait() {
                    Ok(None) => {}
                    Ok(Some(status)) => {
                        info!(%command, %status, "external command exited");
                        let command = command.clone();
                        token.cancel(if status.success() {
                            BridgeError::Completed { command }
                        } else {
                            BridgeError::Exited { command, status }
                        });
                        return;
                    }
                    Err(err) => {
                        token.cancel(BridgeError::io(Stream::Process, err));
                        reap(&mut child, &command);
                        return;
                    }
                }
            }
        }
    })
}
