use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use ttree::engine::progress::{Progress, ProgressReporter};

/// Parsing, instantiating, binding and rendering.
pub const COMPILE_PHASES: usize = 4;

const SPINNER_TICK_MS: u64 = 80;

struct CompileState {
    pb: ProgressBar,
    /// 1-based index of the current phase.
    phase: usize,
    started: Option<(&'static str, Instant)>,
    timings: Vec<(&'static str, Duration)>,
}

impl CompileState {
    fn close_phase(&mut self) {
        if let Some((name, start)) = self.started.take() {
            self.timings.push((name, start.elapsed()));
        }
    }
}

/// Console display of one compilation: a spinner per phase and a scope counter
/// while the instance tree is rendered.
#[derive(Clone)]
pub struct CompileProgress {
    state: Arc<Mutex<CompileState>>,
}

impl CompileProgress {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Tracks phases without drawing anything.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let pb = ProgressBar::with_draw_target(None, target).with_style(spinner_style());
        Self {
            state: Arc::new(Mutex::new(CompileState {
                pb,
                phase: 0,
                started: None,
                timings: Vec::new(),
            })),
        }
    }

    pub fn reporter(&self) -> ProgressReporter<'static> {
        let state = self.state.clone();
        ProgressReporter::with_callback(Box::new(move |event| {
            let Ok(mut state) = state.lock() else {
                warn!("Progress state mutex was poisoned; skipping update.");
                return;
            };
            apply(&mut state, event);
        }))
    }

    /// Clears the display and returns how long each finished phase took.
    pub fn finish(&self) -> Vec<(&'static str, Duration)> {
        match self.state.lock() {
            Ok(mut state) => {
                state.close_phase();
                state.pb.finish_and_clear();
                std::mem::take(&mut state.timings)
            }
            Err(_) => Vec::new(),
        }
    }
}

impl Default for CompileProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(state: &mut CompileState, event: Progress) {
    match event {
        Progress::PhaseStart { name } => {
            state.close_phase();
            state.phase += 1;
            state.started = Some((name, Instant::now()));
            state.pb.set_style(spinner_style());
            state.pb.set_message(format!("[{}/{}] {}", state.phase, COMPILE_PHASES, name));
            state
                .pb
                .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
        }
        Progress::PhaseFinish => state.close_phase(),
        Progress::ScopesStart { total_scopes } => {
            state.pb.disable_steady_tick();
            state.pb.set_style(scope_style());
            state.pb.set_length(total_scopes);
            state.pb.set_position(0);
        }
        Progress::ScopeDone => state.pb.inc(1),
        Progress::ScopesFinish => {
            if let Some(total) = state.pb.length() {
                state.pb.set_position(total);
            }
        }
        Progress::Message(msg) => state.pb.println(format!("  {}", msg)),
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn scope_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {pos}/{len} scopes")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}
