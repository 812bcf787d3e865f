use std::io::Read;
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use dynvc::{DvcEngine, DvcError, DvcErrorExt as _, DvcResult};

use crate::{FramedReader, StopEvent};

/// Locks a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Spawns the per-connection dispatch thread.
///
/// One thread per connection reads frames off the security transport and
/// feeds them to the engine. Plugin callbacks run on this thread; writes may
/// come from any thread and are serialized by the engine's transport lock.
pub struct Connection;

impl Connection {
    pub fn spawn<S, E>(reader: FramedReader<S>, engine: E, stop: StopEvent) -> DvcResult<ConnectionHandle>
    where
        S: Read + Send + 'static,
        E: DvcEngine + 'static,
    {
        let dispatch_stop = stop.clone();
        let join = std::thread::Builder::new()
            .name("dvc-dispatch".to_owned())
            .spawn(move || run_dispatch(reader, engine, dispatch_stop))
            .map_err(|e| DvcError::transport("Connection::spawn", e))?;

        Ok(ConnectionHandle {
            stop,
            join,
            shutdown: None,
        })
    }
}

/// Owner-side handle to a running connection.
pub struct ConnectionHandle {
    stop: StopEvent,
    join: JoinHandle<DvcResult<()>>,
    shutdown: Option<Box<dyn FnOnce() + Send>>,
}

impl ConnectionHandle {
    /// Registers a closure that unblocks the transport read (e.g. a socket
    /// shutdown). Invoked by [`stop`](Self::stop) after the event is set; a
    /// read blocked in the kernel cannot observe the event on its own.
    #[must_use]
    pub fn with_shutdown<F>(mut self, shutdown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.shutdown = Some(Box::new(shutdown));
        self
    }

    /// The connection's cancellation token.
    pub fn stop_event(&self) -> StopEvent {
        self.stop.clone()
    }

    /// Requests shutdown: sets the stop event and kicks the transport so
    /// the dispatch thread returns from its blocked read.
    pub fn stop(&mut self) {
        self.stop.set();
        if let Some(shutdown) = self.shutdown.take() {
            shutdown();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the dispatch thread and returns its outcome.
    pub fn join(self) -> DvcResult<()> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(DvcError::other(
                "ConnectionHandle::join",
                "dispatch thread panicked",
            )),
        }
    }
}

fn run_dispatch<S, E>(mut reader: FramedReader<S>, mut engine: E, stop: StopEvent) -> DvcResult<()>
where
    S: Read,
    E: DvcEngine,
{
    let result = dispatch_loop(&mut reader, &mut engine, &stop);

    // Teardown runs on every exit path: channels close in reverse creation
    // order, plugins terminate, the transport write half shuts down. The
    // stop event is set so owners polling it observe the exit.
    engine.teardown();
    stop.set();

    if let Err(error) = &result {
        error!(%error, "DVC dispatch loop failed");
    }
    result
}

fn dispatch_loop<S, E>(reader: &mut FramedReader<S>, engine: &mut E, stop: &StopEvent) -> DvcResult<()>
where
    S: Read,
    E: DvcEngine,
{
    engine.start()?;

    loop {
        if stop.is_set() {
            debug!("Stop event set; leaving dispatch loop");
            return Ok(());
        }

        let frame = match reader.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Transport EOF; leaving dispatch loop");
                return Ok(());
            }
            Err(error) if stop.is_set() => {
                debug!(%error, "Read aborted by stop event");
                return Ok(());
            }
            Err(error) => return Err(DvcError::transport("dispatch_loop", error)),
        };

        match engine.process_frame(&frame) {
            Ok(()) => {}
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => warn!(%error, "Recoverable DVC error; connection continues"),
        }
    }
}
