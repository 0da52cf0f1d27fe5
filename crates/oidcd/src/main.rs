//! Daemon entry point (§6): CLI parsing, the `NAME=VAL; export NAME;` announcement protocol,
//! daemonization, and wiring the Frontend Channel, Dispatcher, and Reaper together.
//!
//! Argument parsing and daemonization are named as an out-of-scope external collaborator
//! alongside the companion prompt binary; what's here is deliberately the minimum needed to turn
//! the in-scope pieces (Agent State, Dispatcher, Reaper, Frontend Channel) into a running process,
//! not a general-purpose service supervisor.

mod agent_state;
mod callback;
mod cli;
mod dispatcher;
mod error;
mod frontend_channel;
mod logging;
mod reaper;
mod wire;

use std::os::fd::{
    AsRawFd,
    FromRawFd,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nix::sys::signal::{
    SigHandler,
    Signal,
};
use nix::unistd::{
    ForkResult,
    Pid,
};
use oidcd_auth::Frontend;
use tokio::net::UnixListener;
use tokio::net::unix::pipe;
use tokio::signal::unix::{
    SignalKind,
    signal,
};
use tracing::{
    error,
    info,
    warn,
};

use crate::agent_state::AgentState;
use crate::callback::CallbackCoordinator;
use crate::cli::Cli;
use crate::dispatcher::Dispatcher;
use crate::frontend_channel::{
    DuplexPipe,
    PipeFrontend,
};

const DEFAULT_PID_VAR: &str = "OIDC_AGENT_PID";
const DEFAULT_SOCK_VAR: &str = "OIDC_SOCK";
const PID_VAR_NAME_ENV: &str = "OIDC_PID_ENV_NAME";
const SOCK_VAR_NAME_ENV: &str = "OIDC_SOCK_ENV_NAME";
const FRONTEND_READ_FD_VAR: &str = "OIDCD_FRONTEND_READ_FD";
const FRONTEND_WRITE_FD_VAR: &str = "OIDCD_FRONTEND_WRITE_FD";
const DEFAULT_TIMEOUT_VAR: &str = "OIDCD_DEFAULT_TIMEOUT";
const NO_AUTOLOAD_VAR: &str = "OIDCD_NO_AUTOLOAD";
const CONFIRM_DEFAULT_VAR: &str = "OIDCD_CONFIRM_DEFAULT";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() {
    let cli = Cli::parse();

    if cli.kill {
        std::process::exit(kill_running_agent());
    }

    let pid_var = env_var_name(PID_VAR_NAME_ENV, DEFAULT_PID_VAR);
    let sock_var = env_var_name(SOCK_VAR_NAME_ENV, DEFAULT_SOCK_VAR);
    let socket_path = socket_path(&sock_var);

    if let Err(e) = oidcd_ipc::prepare_socket_dir(&socket_path) {
        eprintln!("oidcd: failed to prepare socket directory: {e}");
        std::process::exit(1);
    }

    let std_listener = match std::os::unix::net::UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("oidcd: failed to bind {}: {e}", socket_path.display());
            std::process::exit(1);
        },
    };
    if let Err(e) = std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600)) {
        eprintln!("oidcd: failed to set socket permissions: {e}");
        std::process::exit(1);
    }
    if let Err(e) = std_listener.set_nonblocking(true) {
        eprintln!("oidcd: failed to set socket non-blocking: {e}");
        std::process::exit(1);
    }

    if cli.console {
        announce(&pid_var, &sock_var, std::process::id(), &socket_path);
    } else {
        match daemonize() {
            Ok(DaemonRole::Parent { child_pid }) => {
                announce(&pid_var, &sock_var, child_pid, &socket_path);
                return;
            },
            Ok(DaemonRole::Child) => {},
            Err(e) => {
                eprintln!("oidcd: failed to daemonize: {e}");
                std::process::exit(1);
            },
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("oidcd: failed to start async runtime: {e}");
            std::process::exit(1);
        },
    };

    let exit_code = runtime.block_on(run(cli, socket_path, std_listener));
    std::process::exit(exit_code);
}

/// Reads the *name* of an environment variable from `name_var` (falling back to `default` if
/// unset), matching §6's indirection: `OIDC_PID_ENV_NAME`'s value is itself the name under which
/// the daemon's actual PID is later exported.
fn env_var_name(name_var: &str, default: &str) -> String {
    std::env::var(name_var).unwrap_or_else(|_| default.to_string())
}

fn socket_path(sock_var: &str) -> PathBuf {
    if let Ok(existing) = std::env::var(sock_var) {
        return PathBuf::from(existing);
    }
    let base = std::env::var("XDG_RUNTIME_DIR").map(PathBuf::from).unwrap_or_else(|_| std::env::temp_dir());
    base.join(format!("oidcd-{}", std::process::id())).join("oidcd.sock")
}

fn announce(pid_var: &str, sock_var: &str, pid: u32, socket_path: &Path) {
    println!("{pid_var}={pid}; export {pid_var};");
    println!("{sock_var}={}; export {sock_var};", socket_path.display());
}

fn kill_running_agent() -> i32 {
    let pid_var = env_var_name(PID_VAR_NAME_ENV, DEFAULT_PID_VAR);
    let sock_var = env_var_name(SOCK_VAR_NAME_ENV, DEFAULT_SOCK_VAR);

    match std::env::var(&pid_var).ok().and_then(|v| v.parse::<i32>().ok()) {
        Some(pid) => {
            if let Err(e) = nix::sys::signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
                eprintln!("oidcd: failed to signal pid {pid}: {e}");
            }
        },
        None => eprintln!("oidcd: {pid_var} is not set, nothing to kill"),
    }

    if let Ok(sock) = std::env::var(&sock_var) {
        let path = PathBuf::from(sock);
        let _ = std::fs::remove_file(&path);
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir(parent);
        }
    }

    println!("unset {pid_var};");
    println!("unset {sock_var};");
    0
}

enum DaemonRole {
    Parent { child_pid: u32 },
    Child,
}

/// Classic double-call daemonization: fork once, detach the child from the controlling terminal
/// with `setsid`, and point its standard streams at `/dev/null`. The parent's only job afterward
/// is to print the announcement lines and exit.
fn daemonize() -> nix::Result<DaemonRole> {
    match unsafe { nix::unistd::fork()? } {
        ForkResult::Parent { child } => Ok(DaemonRole::Parent {
            child_pid: child.as_raw() as u32,
        }),
        ForkResult::Child => {
            nix::unistd::setsid()?;
            let _ = std::env::set_current_dir("/");
            redirect_stdio_to_dev_null();
            Ok(DaemonRole::Child)
        },
    }
}

fn redirect_stdio_to_dev_null() {
    let Ok(dev_null) = std::fs::OpenOptions::new().read(true).write(true).open("/dev/null") else {
        return;
    };
    let fd = dev_null.as_raw_fd();
    for target in [0, 1, 2] {
        let _ = nix::unistd::dup2(fd, target);
    }
}

async fn run(cli: Cli, socket_path: PathBuf, std_listener: std::os::unix::net::UnixListener) -> i32 {
    let log_guard = match logging::initialize_logging(logging::LogArgs {
        log_level: cli.debug.then(|| "debug".to_string()),
        log_to_stdout: cli.console,
        log_file_path: (!cli.console).then(|| socket_path.with_extension("log")),
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("oidcd: failed to initialize logging: {e}");
            return 1;
        },
    };

    info!(socket = %socket_path.display(), "oidcd starting");

    let frontend: Arc<dyn Frontend> = match frontend_from_env() {
        Ok(frontend) => Arc::new(PipeFrontend::new(frontend)),
        Err(e) => {
            error!(error = %e, "failed to set up frontend channel");
            return 1;
        },
    };

    let listener = match UnixListener::from_std(std_listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "failed to adopt bound socket into the async runtime");
            return 1;
        },
    };

    let default_timeout = std::env::var(DEFAULT_TIMEOUT_VAR).ok().and_then(|v| v.parse().ok()).unwrap_or(0);
    let no_autoload = std::env::var(NO_AUTOLOAD_VAR).is_ok();
    let confirm_default = std::env::var(CONFIRM_DEFAULT_VAR).is_ok();

    let state = Arc::new(AgentState::new(frontend, default_timeout, no_autoload, confirm_default));
    let callbacks = Arc::new(CallbackCoordinator::new());
    let dispatcher = Arc::new(Dispatcher::new(state.clone(), callbacks));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reaper_handle = tokio::spawn(reaper::run(state.clone(), shutdown_rx.clone()));
    let dispatcher_handle = tokio::spawn(dispatcher.run(listener, shutdown_rx));

    let received = wait_for_shutdown_signal().await;
    info!(?received, "received signal, shutting down");
    let _ = shutdown_tx.send(true);

    let cleanup = async {
        let _ = reaper_handle.await;
        let _ = dispatcher_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, cleanup).await.is_err() {
        warn!("cleanup exceeded the shutdown grace period, forcing exit");
    }

    state.registry.remove_all();
    let _ = std::fs::remove_file(&socket_path);

    drop(log_guard);
    reraise(received);
}

/// Waits for `SIGTERM` or `SIGINT`; `SIGHUP` is logged and otherwise ignored, per §5.
async fn wait_for_shutdown_signal() -> Signal {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    loop {
        tokio::select! {
            _ = sigterm.recv() => return Signal::SIGTERM,
            _ = sigint.recv() => return Signal::SIGINT,
            _ = sighup.recv() => info!("SIGHUP ignored"),
        }
    }
}

/// Restores the default disposition for `signal` and re-raises it, so whatever spawned this
/// process observes the expected signal-terminated exit status instead of a plain `exit(0)`.
fn reraise(signal: Signal) -> ! {
    unsafe {
        let _ = nix::sys::signal::signal(signal, SigHandler::SigDfl);
    }
    let _ = nix::sys::signal::raise(signal);
    std::process::exit(128 + signal as i32)
}

/// Wraps the pair of anonymous pipe fds the spawning frontend process inherited to us into a
/// [`DuplexPipe`] (§4.5, §6). The fd numbers themselves are an implementation detail of the
/// out-of-scope companion prompt binary; the agent only needs to know which environment
/// variables name them.
fn frontend_from_env() -> std::io::Result<DuplexPipe> {
    let read_fd = env_fd(FRONTEND_READ_FD_VAR)?;
    let write_fd = env_fd(FRONTEND_WRITE_FD_VAR)?;
    let reader = pipe::Receiver::from_file(unsafe { std::fs::File::from_raw_fd(read_fd) })?;
    let writer = pipe::Sender::from_file(unsafe { std::fs::File::from_raw_fd(write_fd) })?;
    Ok(DuplexPipe::new(reader, writer))
}

fn env_fd(var: &str) -> std::io::Result<i32> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("{var} is not set")))
}
