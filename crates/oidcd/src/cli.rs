//! Daemon CLI surface (§6). No positional arguments; everything is a flag.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "oidcd", version, about = "OIDC credential agent")]
pub struct Cli {
    /// Send SIGTERM to the running agent, unlink its socket, and exit.
    #[arg(short = 'k', long)]
    pub kill: bool,

    /// Raise log verbosity to debug.
    #[arg(short = 'g', long)]
    pub debug: bool,

    /// Stay in the foreground instead of daemonizing.
    #[arg(short = 'c', long)]
    pub console: bool,
}
