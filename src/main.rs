use std::env;
use std::process;
use std::thread;

use tracing_subscriber::EnvFilter;

use jolt::config::{EngineConfig, DEFAULT_LOG_FILTER, LOG_ENV, USAGE};
use jolt::exec::WORKER_STACK_SIZE;

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("Warning: ignoring {}: {}", LOG_ENV, e);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let config = match EngineConfig::from_args(env::args().skip(1), env::var(LOG_ENV).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            process::exit(2);
        }
    };
    if config.show_help {
        println!("{}", USAGE);
        return;
    }
    init_logging(&config.log_filter);

    // Local execution runs user code on this thread, so give it the same
    // stack a worker gets.
    let repl = thread::Builder::new()
        .name("jolt-repl".to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || jolt::repl::run(config));
    let code = match repl.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => {
            eprintln!("Error: session thread panicked");
            101
        }
        Err(e) => {
            eprintln!("Error: cannot start session thread: {}", e);
            1
        }
    };
    process::exit(code);
}
