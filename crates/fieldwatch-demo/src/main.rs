#![forbid(unsafe_code)]

//! Fieldwatch demo binary.
//!
//! Text changes arrive on a channel from a reader thread (stdin or a script).
//! The main thread owns the form and the coordination context: it applies
//! each change, drains async verdicts between changes, and prints the form
//! whenever its state changes.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use fieldwatch::{CoordinationContext, DispatchConfig};
use fieldwatch_demo::cli::Opts;
use fieldwatch_demo::form::{FormConfig, LoginForm};
use fieldwatch_demo::repository::UserRepository;
use fieldwatch_demo::widgets::FormState;
use tracing_subscriber::EnvFilter;

const POLL: Duration = Duration::from_millis(10);

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|err| {
        eprintln!("Invalid log filter {directive:?}: {err}; using 'warn'");
        EnvFilter::new("warn")
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_thread_names(true)
        .try_init();
}

/// Forward stdin lines until EOF.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("fieldwatch-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .unwrap_or_else(|err| {
            eprintln!("failed to start stdin reader: {err}");
            std::process::exit(1);
        });
    rx
}

/// Replay `inputs`, pausing `step` between them.
fn spawn_script(inputs: Vec<String>, step: Duration) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("fieldwatch-script".into())
        .spawn(move || {
            for input in inputs {
                if tx.send(input).is_err() {
                    break;
                }
                thread::sleep(step);
            }
        })
        .unwrap_or_else(|err| {
            eprintln!("failed to start input script: {err}");
            std::process::exit(1);
        });
    rx
}

/// Print the form when it differs from what was last printed.
#[derive(Default)]
struct Renderer {
    last: Option<FormState>,
}

impl Renderer {
    fn render(&mut self, form: &LoginForm) {
        let state = form.state();
        if self.last.as_ref() != Some(&state) {
            println!("{state}");
            self.last = Some(state);
        }
    }
}

fn main() {
    let opts = Opts::parse();
    init_logging(&opts.log);

    let context = CoordinationContext::new();
    let repository = Arc::new(UserRepository::new(
        opts.latency_min_ms..opts.latency_max_ms,
        opts.seed,
    ));
    let dispatch = DispatchConfig::from_env().with_trace(opts.trace);
    let form = LoginForm::new(
        repository,
        &context,
        FormConfig {
            min_length: opts.min_length,
            dispatch,
        },
    );

    let events = if opts.inputs.is_empty() {
        spawn_stdin_reader()
    } else {
        spawn_script(opts.inputs.clone(), Duration::from_millis(opts.step_ms))
    };

    let mut renderer = Renderer::default();
    loop {
        match events.recv_timeout(POLL) {
            Ok(text) => {
                if let Err(err) = form.on_text_changed(&text) {
                    tracing::error!(error = %err, "validation could not start");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        context.run_pending();
        renderer.render(&form);
    }

    // Input is over; wait for the last lookup.
    let grace = Duration::from_millis(opts.latency_max_ms) + Duration::from_secs(1);
    if !context.run_until(grace, || form.is_settled()) {
        tracing::warn!("availability lookup still pending at exit");
    }
    renderer.render(&form);

    if opts.trace {
        for (name, criteria) in [
            ("availability", form.availability().criteria()),
            ("compliance", form.compliance().criteria()),
        ] {
            let Some(trace) = criteria.trace() else { continue };
            eprintln!("# {name}: {} event(s), checksum {:016x}", trace.len(), trace.checksum());
            for event in trace.events() {
                eprintln!("{event:?}");
            }
            for violation in trace.verify_invariants() {
                eprintln!("! {violation}");
            }
        }
    }
}
