//! Calculation of a group assignment by driving an external LP solver process.
//!
//! The model generated by `crate::model::compile()` is streamed into the solver's stdin while a
//! dedicated reader thread drains the solver's stdout into a `SolutionParser`. Both sides must run
//! concurrently: pipe buffers are bounded, so writing the whole model before reading any output
//! may deadlock with a solver that is blocked on writing its own output.

pub mod score;

use crate::solution::SolutionParser;
use crate::{
    model, Assignment, GroupId, GroupPreferences, OptimizerError, Registry, TeamPreferences,
    UserId,
};
use log::{debug, info, trace, warn};
use std::collections::{BTreeSet, VecDeque};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Number of lines of the solver's stderr output to keep for error messages
const STDERR_TAIL_LINES: usize = 10;

/// Polling interval for the solver's exit, when a timeout is configured
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to run the external solver. The solver must read an LP model from stdin and print the
/// values of all variables as `<name> <value>` lines to stdout (e.g. `lp_solve -S3`).
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Path or name of the solver executable
    pub program: String,
    /// Command line arguments for the solver
    pub args: Vec<String>,
    /// Maximum run time of the solver. It is killed when exceeding the timeout. `None` waits
    /// forever.
    pub timeout: Option<Duration>,
}

impl SolverConfig {
    pub fn new(program: impl Into<String>) -> Self {
        SolverConfig {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig::new("lp_solve").with_args(vec!["-S3"])
    }
}

/// Entry point for calculating group assignments with an external solver
pub struct Optimizer {
    config: SolverConfig,
}

impl Optimizer {
    pub fn new(config: SolverConfig) -> Self {
        Optimizer { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Calculate an optimal assignment of all users in `group_preferences` to the groups in
    /// `group_ids`.
    ///
    /// The users are taken from the keys of `group_preferences`. The result contains exactly
    /// these users. The solver process is killed before this function returns, in any case.
    ///
    /// # Errors
    /// Input errors (see `validate_preferences()`) are detected before the solver is started.
    /// Afterwards, any problem with the solver process (launch failure, broken pipes,
    /// non-zero exit code, timeout) or with its result (inconsistent or incomplete assignment)
    /// fails the whole calculation.
    pub fn calculate_assignment(
        &self,
        group_ids: &[GroupId],
        group_preferences: &GroupPreferences,
        team_preferences: &TeamPreferences,
    ) -> Result<Assignment, OptimizerError> {
        if group_ids.is_empty() {
            return Err(OptimizerError::NoGroups);
        }
        let registry = Arc::new(Registry::new(
            group_preferences.keys().copied(),
            group_ids.iter().cloned(),
        )?);
        validate_preferences(&registry, group_preferences, team_preferences)?;
        if registry.all_user_ids().is_empty() {
            warn!("No users to assign. Skipping solver run.");
            return Ok(Assignment::new());
        }

        info!(
            "Assigning {} users to {} groups with {} friend preferences",
            registry.all_user_ids().len(),
            registry.num_groups(),
            team_preferences.values().map(Vec::len).sum::<usize>()
        );
        let model_lines = model::compile(&registry, group_preferences, team_preferences);

        let (process, pipes) = SolverProcess::spawn(&self.config)?;
        let watchdog = match self.config.timeout {
            Some(timeout) => Some(Watchdog::start(&process, timeout)?),
            None => None,
        };

        let reader = {
            let registry = Arc::clone(&registry);
            let stdout = pipes.stdout;
            thread::Builder::new()
                .name("solver-output".to_owned())
                .spawn(move || read_solution(&registry, stdout))?
        };
        let stderr_drain = {
            let stderr = pipes.stderr;
            thread::Builder::new()
                .name("solver-stderr".to_owned())
                .spawn(move || drain_stderr(stderr))?
        };

        // Errors while writing are only reported after both threads have been joined. A broken
        // pipe usually means that the solver has terminated early, so its exit code is the more
        // helpful error in that case.
        let write_result = write_model(pipes.stdin, model_lines);
        match &write_result {
            Ok(num_lines) => debug!("Wrote {} lines of model to the solver.", num_lines),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                warn!("Solver closed its input before reading the whole model.")
            }
            Err(e) => warn!("Could not write the model to the solver: {}", e),
        }

        // The output must be drained completely before waiting for the solver's exit
        let parse_result = join_until_timeout(reader, watchdog.as_ref())?
            .unwrap_or(Err(OptimizerError::ReaderPanicked));
        if parse_result.is_err() {
            // The calculation has failed anyway
            process.kill();
        }
        let stderr_tail = join_until_timeout(stderr_drain, watchdog.as_ref())?.unwrap_or_default();
        let status = process.wait(watchdog.is_some());
        let timeout_result = match watchdog {
            Some(watchdog) => watchdog.stop(),
            None => Ok(()),
        };
        let assignment = conclude(
            timeout_result,
            parse_result,
            status,
            stderr_tail,
            write_result,
        )?;

        validate_assignment(&registry, &assignment)?;
        info!("Solver assigned all {} users.", assignment.len());
        Ok(assignment)
    }
}

/// Check the consistency of the preference inputs with the registry.
///
/// # Errors
/// - `OptimizerError::UnknownGroup`, if a group preference refers to an unknown group
/// - `OptimizerError::UnknownUser`, if team preferences are given for a user without group
///   preferences
/// - `OptimizerError::UnknownFriend`, if a friend has no group preferences
/// - `OptimizerError::DuplicateFriend`, if a user lists a friend twice
pub fn validate_preferences(
    registry: &Registry,
    group_preferences: &GroupPreferences,
    team_preferences: &TeamPreferences,
) -> Result<(), OptimizerError> {
    for preferences in group_preferences.values() {
        for group in preferences.keys() {
            registry.numeric_group_id(group)?;
        }
    }

    let users = registry.all_user_ids();
    for (user, friends) in team_preferences {
        if !users.contains(user) {
            return Err(OptimizerError::UnknownUser(*user));
        }
        let mut seen = BTreeSet::new();
        for friend in friends {
            if !users.contains(friend) {
                return Err(OptimizerError::UnknownFriend {
                    user: *user,
                    friend: *friend,
                });
            }
            if !seen.insert(*friend) {
                return Err(OptimizerError::DuplicateFriend {
                    user: *user,
                    friend: *friend,
                });
            }
        }
    }
    Ok(())
}

/// Check that the assignment covers exactly the users of the registry
fn validate_assignment(registry: &Registry, assignment: &Assignment) -> Result<(), OptimizerError> {
    let users = registry.all_user_ids();
    if let Some(user) = assignment.keys().find(|user| !users.contains(*user)) {
        return Err(OptimizerError::UnexpectedUser(*user));
    }
    let missing: Vec<UserId> = users
        .iter()
        .filter(|user| !assignment.contains_key(*user))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(OptimizerError::IncompleteAssignment(missing));
    }
    Ok(())
}

fn check_exit_status(status: ExitStatus, stderr: Vec<String>) -> Result<(), OptimizerError> {
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(OptimizerError::SolverExit { code, stderr }),
        None => Err(OptimizerError::SolverTerminated { stderr }),
    }
}

/// Combine the outcomes of a finished solver run. The first failure wins, in this order: timeout,
/// solver output, exit status, writing of the model.
fn conclude(
    timeout_result: Result<(), OptimizerError>,
    parse_result: Result<Assignment, OptimizerError>,
    status: std::io::Result<ExitStatus>,
    stderr: Vec<String>,
    write_result: std::io::Result<usize>,
) -> Result<Assignment, OptimizerError> {
    timeout_result?;
    let assignment = parse_result?;
    check_exit_status(status?, stderr)?;
    write_result?;
    Ok(assignment)
}

/// Write the model lines into the solver's stdin. The stdin is closed afterwards to signal the end
/// of the model.
fn write_model<I: Iterator<Item = String>>(stdin: ChildStdin, lines: I) -> std::io::Result<usize> {
    let mut writer = BufWriter::new(stdin);
    let mut num_lines = 0;
    for line in lines {
        writeln!(writer, "{}", line)?;
        num_lines += 1;
    }
    writer.flush()?;
    Ok(num_lines)
}

/// Reader thread function: parse the whole output of the solver. Lines which are not valid UTF-8
/// cannot be variable values, so they are read lossily and end up as noise.
fn read_solution<R: Read>(registry: &Registry, output: R) -> Result<Assignment, OptimizerError> {
    let mut parser = SolutionParser::new(registry);
    for line in BufReader::new(output).split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        trace!("solver: {}", line);
        parser.parse_line(&line)?;
    }
    Ok(parser.into_assignment())
}

/// Read the solver's stderr output into the log and return its last lines
fn drain_stderr<R: Read>(stderr: R) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(stderr).split(b'\n') {
        let line = match line {
            Ok(line) => String::from_utf8_lossy(&line).trim_end().to_owned(),
            Err(e) => {
                warn!("Could not read solver's stderr: {}", e);
                break;
            }
        };
        debug!("solver stderr: {}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect()
}

/// Join one of the threads reading the solver's output.
///
/// Once the watchdog has killed the solver, the thread is not waited for anymore: child processes
/// of the solver (e.g. of a wrapper script) may still hold the pipe open. The thread ends by itself
/// when they exit.
fn join_until_timeout<T>(
    handle: thread::JoinHandle<T>,
    watchdog: Option<&Watchdog>,
) -> Result<thread::Result<T>, OptimizerError> {
    if let Some(watchdog) = watchdog {
        while !handle.is_finished() {
            if watchdog.fired() {
                warn!(
                    "Not waiting for thread {:?} after timeout.",
                    handle.thread().name()
                );
                return Err(OptimizerError::Timeout(watchdog.timeout));
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
    Ok(handle.join())
}

/// Pipes to the solver process' standard streams
struct SolverPipes {
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
}

/// Handle of a running solver process. The process is killed when the handle is dropped, so no
/// solver outlives a calculation, regardless of how it ends.
struct SolverProcess {
    child: Arc<Mutex<Child>>,
}

impl SolverProcess {
    fn spawn(config: &SolverConfig) -> Result<(Self, SolverPipes), OptimizerError> {
        debug!("Starting solver: {} {:?}", config.program, config.args);
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| OptimizerError::Launch {
                program: config.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let process = SolverProcess {
            child: Arc::new(Mutex::new(child)),
        };
        match (stdin, stdout, stderr) {
            (Some(stdin), Some(stdout), Some(stderr)) => Ok((
                process,
                SolverPipes {
                    stdin,
                    stdout,
                    stderr,
                },
            )),
            _ => Err(OptimizerError::Communication(std::io::Error::new(
                std::io::ErrorKind::Other,
                "solver's standard streams are not available",
            ))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Child> {
        lock_child(&self.child)
    }

    fn kill(&self) {
        kill(&mut self.lock());
    }

    /// Wait for the solver to exit. With `poll`, the lock on the child is released between
    /// checks, so that a `Watchdog` is able to kill it in the meantime.
    fn wait(&self, poll: bool) -> std::io::Result<ExitStatus> {
        if !poll {
            return self.lock().wait();
        }
        loop {
            if let Some(status) = self.lock().try_wait()? {
                return Ok(status);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

impl Drop for SolverProcess {
    fn drop(&mut self) {
        let mut child = self.lock();
        kill(&mut child);
        // Reap the process
        if let Err(e) = child.wait() {
            warn!("Could not wait for solver process: {}", e);
        }
    }
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

fn kill(child: &mut Child) {
    // Fails for processes which have already been reaped. That's fine.
    if let Err(e) = child.kill() {
        trace!("Could not kill solver process: {}", e);
    }
}

/// Thread, which kills the solver process when the timeout has elapsed before `stop()` is called
struct Watchdog {
    timeout: Duration,
    done: mpsc::Sender<()>,
    fired: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl Watchdog {
    fn start(process: &SolverProcess, timeout: Duration) -> Result<Self, OptimizerError> {
        let (done, done_receiver) = mpsc::channel();
        let fired = Arc::new(AtomicBool::new(false));
        let handle = {
            let child = Arc::clone(&process.child);
            let fired = Arc::clone(&fired);
            thread::Builder::new()
                .name("solver-watchdog".to_owned())
                .spawn(move || {
                    if let Err(RecvTimeoutError::Timeout) = done_receiver.recv_timeout(timeout) {
                        let mut child = lock_child(&child);
                        if let Ok(Some(_)) = child.try_wait() {
                            debug!("Solver has already exited at the timeout.");
                            return;
                        }
                        warn!("Solver exceeded timeout of {:?}. Killing it.", timeout);
                        kill(&mut child);
                        fired.store(true, Ordering::SeqCst);
                    }
                })?
        };
        Ok(Watchdog {
            timeout,
            done,
            fired,
            handle,
        })
    }

    /// Whether the watchdog has killed the solver
    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Stop the watchdog. Fails with `OptimizerError::Timeout` if it has killed the solver.
    fn stop(self) -> Result<(), OptimizerError> {
        // The watchdog thread may have stopped already after the timeout
        let _ = self.done.send(());
        if self.handle.join().is_err() {
            warn!("Solver watchdog thread panicked.");
        }
        if self.fired.load(Ordering::SeqCst) {
            Err(OptimizerError::Timeout(self.timeout))
        } else {
            Ok(())
        }
    }
}
