use std::sync::mpsc;
use std::thread;

use tracing::{debug, error, warn};

use super::{Access, ExecFailure, ExecOutcome, ExecutionBackend, StopHandle};
use crate::snippet::Snippet;

/// Stack reserved for the worker; deep user recursion runs on it.
pub const WORKER_STACK_SIZE: usize = 256 * 1024 * 1024;

enum Command<U> {
    Define(Snippet, U, Access),
    Remove(Snippet, U),
    Run(Snippet, U, mpsc::Sender<ExecOutcome>),
    Value(Snippet, mpsc::Sender<ExecOutcome>),
}

/// Runs a backend on a dedicated thread. Declarations are forwarded without
/// waiting; `run` and `var_value` block until the worker replies, and can be
/// cancelled through the shared [`StopHandle`].
pub struct WorkerExecutor<U> {
    tx: Option<mpsc::Sender<Command<U>>>,
    stop: StopHandle,
    worker: Option<thread::JoinHandle<()>>,
    exit_code: Option<i32>,
}

impl<U: Send + 'static> WorkerExecutor<U> {
    /// Spawn the worker. `factory` runs on the worker thread and receives
    /// the stop flag the backend must poll.
    pub fn spawn<B, F>(factory: F) -> std::io::Result<Self>
    where
        B: ExecutionBackend<Unit = U>,
        F: FnOnce(StopHandle) -> B + Send + 'static,
    {
        let stop = StopHandle::new();
        let worker_stop = stop.clone();
        let (tx, rx) = mpsc::channel::<Command<U>>();
        let worker = thread::Builder::new()
            .name("jolt-exec".to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                let mut backend = factory(worker_stop);
                debug!("execution worker started");
                for command in rx {
                    match command {
                        Command::Define(snippet, unit, access) => {
                            backend.define(&snippet, &unit, access)
                        }
                        Command::Remove(snippet, unit) => backend.remove(&snippet, &unit),
                        Command::Run(snippet, unit, reply) => {
                            let outcome = backend.run(&snippet, &unit);
                            let exiting = matches!(
                                outcome,
                                ExecOutcome::Failed(ExecFailure::Terminated { .. })
                            );
                            let _ = reply.send(outcome);
                            if exiting {
                                break;
                            }
                        }
                        Command::Value(snippet, reply) => {
                            let _ = reply.send(backend.var_value(&snippet));
                        }
                    }
                }
                debug!("execution worker exiting");
            })?;
        Ok(WorkerExecutor {
            tx: Some(tx),
            stop,
            worker: Some(worker),
            exit_code: None,
        })
    }

    fn send(&mut self, command: Command<U>) -> bool {
        match &self.tx {
            Some(tx) => {
                if tx.send(command).is_err() {
                    warn!("execution worker is gone");
                    self.tx = None;
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    fn request(&mut self, make: impl FnOnce(mpsc::Sender<ExecOutcome>) -> Command<U>) -> ExecOutcome {
        if let Some(code) = self.exit_code {
            return ExecOutcome::Failed(ExecFailure::Terminated { exit_code: code });
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        if !self.send(make(reply_tx)) {
            return self.lost();
        }
        match reply_rx.recv() {
            Ok(outcome) => {
                if let ExecOutcome::Failed(ExecFailure::Terminated { exit_code }) = &outcome {
                    self.exit_code = Some(*exit_code);
                    self.tx = None;
                }
                outcome
            }
            Err(_) => self.lost(),
        }
    }

    fn lost(&mut self) -> ExecOutcome {
        error!("execution worker terminated unexpectedly");
        self.exit_code = Some(1);
        self.tx = None;
        ExecOutcome::Failed(ExecFailure::Terminated { exit_code: 1 })
    }
}

impl<U: Clone + Send + 'static> ExecutionBackend for WorkerExecutor<U> {
    type Unit = U;

    fn define(&mut self, snippet: &Snippet, unit: &U, access: Access) {
        self.send(Command::Define(snippet.clone(), unit.clone(), access));
    }

    fn remove(&mut self, snippet: &Snippet, unit: &U) {
        self.send(Command::Remove(snippet.clone(), unit.clone()));
    }

    fn run(&mut self, snippet: &Snippet, unit: &U) -> ExecOutcome {
        let snippet = snippet.clone();
        let unit = unit.clone();
        self.request(move |reply| Command::Run(snippet, unit, reply))
    }

    fn var_value(&mut self, snippet: &Snippet) -> ExecOutcome {
        let snippet = snippet.clone();
        self.request(move |reply| Command::Value(snippet, reply))
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl<U> Drop for WorkerExecutor<U> {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once it is idle.
        self.tx = None;
        self.stop.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::SnippetId;
    use crate::snippet::SnippetKind;
    use std::time::Duration;

    /// Counts down until stopped; `spin` never finishes on its own.
    struct Spinner {
        stop: StopHandle,
    }

    impl ExecutionBackend for Spinner {
        type Unit = &'static str;

        fn define(&mut self, _: &Snippet, _: &Self::Unit, _: Access) {}

        fn remove(&mut self, _: &Snippet, _: &Self::Unit) {}

        fn run(&mut self, _: &Snippet, unit: &Self::Unit) -> ExecOutcome {
            self.stop.reset();
            match *unit {
                "spin" => loop {
                    if self.stop.is_stopped() {
                        return ExecOutcome::Failed(ExecFailure::Stopped);
                    }
                    thread::sleep(Duration::from_millis(1));
                },
                "exit" => ExecOutcome::Failed(ExecFailure::Terminated { exit_code: 3 }),
                other => ExecOutcome::Completed {
                    value: Some(other.to_string()),
                },
            }
        }

        fn var_value(&mut self, _: &Snippet) -> ExecOutcome {
            ExecOutcome::Completed { value: None }
        }

        fn stop_handle(&self) -> StopHandle {
            self.stop.clone()
        }
    }

    fn snippet() -> Snippet {
        Snippet {
            id: SnippetId(1),
            kind: SnippetKind::Statement,
            source: String::new(),
        }
    }

    #[test]
    fn runs_on_worker_thread() {
        let mut exec = WorkerExecutor::spawn(|stop| Spinner { stop }).unwrap();
        assert_eq!(
            exec.run(&snippet(), &"42"),
            ExecOutcome::Completed {
                value: Some("42".into())
            }
        );
    }

    #[test]
    fn stop_interrupts_running_code() {
        let mut exec = WorkerExecutor::spawn(|stop| Spinner { stop }).unwrap();
        let handle = exec.stop_handle();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.stop();
        });
        assert_eq!(
            exec.run(&snippet(), &"spin"),
            ExecOutcome::Failed(ExecFailure::Stopped)
        );
        stopper.join().unwrap();
    }

    #[test]
    fn termination_is_sticky() {
        let mut exec = WorkerExecutor::spawn(|stop| Spinner { stop }).unwrap();
        let terminated = ExecOutcome::Failed(ExecFailure::Terminated { exit_code: 3 });
        assert_eq!(exec.run(&snippet(), &"exit"), terminated);
        assert_eq!(exec.run(&snippet(), &"42"), terminated);
    }
}
