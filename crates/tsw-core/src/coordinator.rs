//! Switch coordinator
//!
//! The coordinator is the only place where switching decisions are made.
//! Input threads, the output thread and the control thread all call into
//! it; every call takes the single state lock, updates the state, runs the
//! action queue as far as it can go and releases the lock.
//!
//! # Switch protocol
//!
//! Switching from input A to input B is a group of queued actions, for
//! instance in standard mode:
//!
//! ```text
//! START B, WAIT_STARTED B, NOTIF_CURRENT A=false, NOTIF_CURRENT B=true,
//! SET_CURRENT B, WAIT_INPUT B, STOP A, WAIT_STOPPED A, NONE
//! ```
//!
//! Immediate actions run and leave the queue at once. A wait action stays
//! at the head until the matching event was signaled by an input callback.
//! Events that fire before their wait reaches the head are kept in the
//! event set and consumed later. The trailing NONE marks the end of the
//! group so that a failed start can discard the rest of its switch.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::action::{Action, ActionKind, ActionQueue, EventSet};
use crate::error::SwitchError;
use crate::events::SwitchEvent;
use crate::executor::{InputExecutor, OutputArea, OutputExecutor};
use crate::options::{InitialInput, SwitchMode, SwitchOptions};
use crate::state::{InputState, InputStatus};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_SIZE: usize = 256;

/// State protected by the coordinator lock
#[derive(Debug)]
struct CoreState {
    /// Input the output draws from
    current: usize,
    /// Completed passes through all inputs
    cycle: u64,
    /// One-way termination flag
    terminate: bool,
    /// Status passed to the first `stop`
    exit_status: Option<bool>,
    /// `start` was called
    started: bool,
    /// An initial input committed
    established: bool,
    /// Lifecycle of each input
    inputs: Vec<InputState>,
    /// Inputs already tried as initial input
    tried: Vec<bool>,
    actions: ActionQueue,
    events: EventSet,
    /// Stop decided under the lock, carried out after it is released
    stop_request: Option<bool>,
}

/// The switch coordinator
pub struct Coordinator {
    options: SwitchOptions,
    inputs: Vec<Box<dyn InputExecutor>>,
    output: Box<dyn OutputExecutor>,
    state: Mutex<CoreState>,
    /// Signaled on new packets for the current input, current change, termination
    got_input: Condvar,
    event_tx: broadcast::Sender<SwitchEvent>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("options", &self.options)
            .field("inputs", &self.inputs.iter().map(|i| i.name()).collect::<Vec<_>>())
            .field("output", &self.output.name())
            .finish()
    }
}

impl Coordinator {
    /// Create a coordinator for the given inputs and output
    pub fn new(
        options: SwitchOptions,
        inputs: Vec<Box<dyn InputExecutor>>,
        output: Box<dyn OutputExecutor>,
    ) -> Result<Arc<Self>, SwitchError> {
        options.validate(inputs.len())?;
        let count = inputs.len();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Arc::new(Self {
            state: Mutex::new(CoreState {
                current: options.initial.first_index(),
                cycle: 0,
                terminate: false,
                exit_status: None,
                started: false,
                established: false,
                inputs: vec![InputState::NotStarted; count],
                tried: vec![false; count],
                actions: ActionQueue::new(),
                events: EventSet::new(),
                stop_request: None,
            }),
            options,
            inputs,
            output,
            got_input: Condvar::new(),
            event_tx,
        }))
    }

    /// Launch all workers and start the initial input.
    ///
    /// On failure the switch is stopped and the error returned.
    pub fn start(self: &Arc<Self>) -> Result<(), SwitchError> {
        {
            let mut st = self.state.lock();
            if st.started {
                return Err(SwitchError::AlreadyStarted);
            }
            st.started = true;
        }

        info!(
            "Starting input switch: {} inputs, {} mode",
            self.inputs.len(),
            self.options.mode.name()
        );

        if let Err(e) = self.launch_workers() {
            error!("Startup failed: {}", e);
            self.stop(false);
            return Err(e);
        }

        let mut st = self.state.lock();
        if st.terminate {
            return Err(SwitchError::Terminated);
        }

        let first = st.current;
        st.tried[first] = true;
        if self.options.mode.keeps_inputs_running() {
            for i in (0..self.inputs.len()).filter(|&i| i != first) {
                st.actions.push(Action::new(ActionKind::Start, i, false));
            }
        }
        self.enqueue_initial(&mut st, first);
        self.execute(&mut st, None);
        self.finish(st);
        Ok(())
    }

    fn launch_workers(self: &Arc<Self>) -> Result<(), SwitchError> {
        self.output.launch(self.clone())?;
        for (index, input) in self.inputs.iter().enumerate() {
            input.launch(index, self.clone())?;
            debug!("Launched input {} ({})", index, input.name());
        }
        Ok(())
    }

    /// Stop processing. Only the first call has an effect.
    ///
    /// `success` is false when the stop is triggered by an error; it only
    /// changes the reported exit status.
    pub fn stop(&self, success: bool) {
        {
            let mut st = self.state.lock();
            if st.terminate {
                debug!("Stop already in progress");
                return;
            }
            info!("Stopping input switch (success: {})", success);
            st.terminate = true;
            st.exit_status = Some(success);

            if !st.actions.is_empty() {
                debug!("Dropping pending actions: {}", st.actions);
            }
            st.actions.clear();
            st.events.clear();
            for i in 0..self.inputs.len() {
                if st.inputs[i].is_active() {
                    st.actions.push(Action::plain(ActionKind::Stop, i));
                }
            }
            self.execute(&mut st, None);
            self.emit(SwitchEvent::Terminating { success });
        }
        self.got_input.notify_all();

        self.output.terminate();
        for input in &self.inputs {
            input.terminate();
        }
    }

    /// Wait until the output thread and all input threads exited
    pub fn wait_for_termination(&self) {
        self.output.wait_for_termination();
        for input in &self.inputs {
            input.wait_for_termination();
        }
        debug!("All workers terminated");
    }

    /// Switch to a given input
    pub fn set_input(&self, index: usize) -> Result<(), SwitchError> {
        let count = self.inputs.len();
        if index >= count {
            warn!("Invalid input index {}", index);
            return Err(SwitchError::InvalidInput { index, count });
        }
        let mut st = self.state.lock();
        if st.terminate {
            return Err(SwitchError::Terminated);
        }
        self.switch_locked(&mut st, index);
        self.execute(&mut st, None);
        self.finish(st);
        Ok(())
    }

    /// Switch to the next input, wrapping around to the first one
    pub fn next_input(&self) {
        let mut st = self.state.lock();
        if st.terminate {
            return;
        }
        let (target, wraps) = self.next_target(&st);
        if self.switch_locked(&mut st, target) && wraps {
            self.complete_cycle(&mut st);
        }
        self.execute(&mut st, None);
        self.finish(st);
    }

    /// Switch to the previous input, wrapping around to the last one
    pub fn previous_input(&self) {
        let mut st = self.state.lock();
        if st.terminate {
            return;
        }
        let count = self.inputs.len();
        let target = (Self::selected(&st) + count - 1) % count;
        self.switch_locked(&mut st, target);
        self.execute(&mut st, None);
        self.finish(st);
    }

    /// Called by an input when its start attempt completed.
    ///
    /// Returns false when the switch is terminating.
    pub fn input_started(&self, index: usize, success: bool) -> bool {
        let Some(mut st) = self.lock_for(index) else {
            return false;
        };
        let previous = st.inputs[index];
        if !matches!(previous, InputState::Starting | InputState::Stopping) {
            warn!(
                "Ignoring start report from input {} while {}",
                index,
                previous.name()
            );
            return self.finish(st);
        }
        debug!("Input {} started, success: {}", index, success);

        if !success {
            st.inputs[index] = InputState::Failed;
            if previous == InputState::Stopping {
                // The worker has no session left to stop
                st.events
                    .signal(Action::new(ActionKind::WaitStopped, index, false));
            }
        } else if previous == InputState::Starting {
            st.inputs[index] = InputState::Running;
        }
        self.emit(SwitchEvent::InputStarted { index, success });

        self.execute(&mut st, Some(Action::new(ActionKind::WaitStarted, index, success)));
        self.finish(st)
    }

    /// Called by an input when it has packets ready.
    ///
    /// Returns false when the switch is terminating.
    pub fn input_received(&self, index: usize) -> bool {
        let Some(mut st) = self.lock_for(index) else {
            return false;
        };
        trace!("Input {} received packets", index);

        self.execute(&mut st, Some(Action::plain(ActionKind::WaitInput, index)));
        if index == st.current {
            self.got_input.notify_all();
        }
        self.finish(st)
    }

    /// Called by an input when its session ended, on request or not.
    ///
    /// Returns false when the switch is terminating.
    pub fn input_stopped(&self, index: usize, success: bool) -> bool {
        let Some(mut st) = self.lock_for(index) else {
            return false;
        };
        let previous = st.inputs[index];
        if !matches!(previous, InputState::Running | InputState::Stopping) {
            // Left over from a session that already reported its end
            warn!(
                "Ignoring stop report from input {} while {}",
                index,
                previous.name()
            );
            return self.finish(st);
        }
        debug!(
            "Input {} stopped, success: {}, was {}",
            index,
            success,
            previous.name()
        );

        st.inputs[index] = if success {
            InputState::Stopped
        } else {
            InputState::Failed
        };
        self.emit(SwitchEvent::InputStopped { index, success });

        // Only an input that was not asked to stop triggers the
        // end-of-input policy
        if previous.is_active() && !st.terminate && index == st.current {
            self.handle_input_end(&mut st, index, success);
        }

        self.execute(&mut st, Some(Action::new(ActionKind::WaitStopped, index, success)));
        self.finish(st)
    }

    /// Wait until the current input has packets to output.
    ///
    /// Returns `None` once termination began. A returned area is never empty.
    pub fn get_output_area(&self) -> Option<OutputArea> {
        let mut st = self.state.lock();
        loop {
            if st.terminate {
                return None;
            }
            let input = st.current;
            if let Some(window) = self.inputs[input].output_area() {
                if !window.is_empty() {
                    return Some(OutputArea { input, window });
                }
            }
            self.got_input.wait(&mut st);
        }
    }

    /// Called by the output after sending `count` packets from input `index`.
    ///
    /// The input may no longer be the current one. Returns false when the
    /// switch is terminating.
    pub fn output_sent(&self, index: usize, count: usize) -> bool {
        let Some(input) = self.inputs.get(index) else {
            warn!("Output sent packets from unknown input {}", index);
            return false;
        };
        if !input.free_output(count) {
            error!("Output released {} packets not lent by input {}", count, index);
            self.stop(false);
            return false;
        }
        !self.state.lock().terminate
    }

    /// Number of configured inputs
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Input the output currently draws from
    pub fn current_input(&self) -> usize {
        self.state.lock().current
    }

    /// Most recently selected input, including a queued switch not committed yet
    pub fn selected_input(&self) -> usize {
        Self::selected(&self.state.lock())
    }

    /// Number of completed input cycles
    pub fn cycle(&self) -> u64 {
        self.state.lock().cycle
    }

    /// Whether termination began
    pub fn is_terminating(&self) -> bool {
        self.state.lock().terminate
    }

    /// Status passed to `stop`, None while running
    pub fn exit_status(&self) -> Option<bool> {
        self.state.lock().exit_status
    }

    /// Snapshot of all inputs
    pub fn input_states(&self) -> Vec<InputStatus> {
        let st = self.state.lock();
        st.inputs
            .iter()
            .enumerate()
            .map(|(index, &state)| InputStatus {
                index,
                state,
                current: index == st.current,
            })
            .collect()
    }

    /// Actions waiting in the queue
    pub fn pending_actions(&self) -> Vec<Action> {
        self.state.lock().actions.iter().copied().collect()
    }

    /// Subscribe to switch events
    pub fn subscribe(&self) -> broadcast::Receiver<SwitchEvent> {
        self.event_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Internals, all called with the lock held
    // ------------------------------------------------------------------

    fn lock_for(&self, index: usize) -> Option<MutexGuard<'_, CoreState>> {
        if index >= self.inputs.len() {
            warn!("Callback from unknown input {}", index);
            return None;
        }
        Some(self.state.lock())
    }

    /// Release the lock and carry out a stop decided while holding it.
    /// Returns false when terminating.
    fn finish(&self, mut st: MutexGuard<'_, CoreState>) -> bool {
        let stop_request = st.stop_request.take();
        let running = !st.terminate;
        drop(st);
        match stop_request {
            Some(success) if running => {
                self.stop(success);
                false
            }
            _ => running,
        }
    }

    fn emit(&self, event: SwitchEvent) {
        // No subscriber is not an error
        let _ = self.event_tx.send(event);
    }

    fn selected(st: &CoreState) -> usize {
        st.actions.last_target().unwrap_or(st.current)
    }

    /// Index after the selected one, and whether that wraps around
    fn next_target(&self, st: &CoreState) -> (usize, bool) {
        let selected = Self::selected(st);
        let target = (selected + 1) % self.inputs.len();
        (target, target <= selected)
    }

    fn complete_cycle(&self, st: &mut CoreState) {
        st.cycle += 1;
        debug!("Input cycle {} completed", st.cycle);
        self.emit(SwitchEvent::CycleCompleted { cycle: st.cycle });
    }

    /// Queue a switch to `target`. Returns false if nothing was queued.
    fn switch_locked(&self, st: &mut CoreState, target: usize) -> bool {
        if st.terminate {
            return false;
        }
        let from = Self::selected(st);
        if target == from {
            let pending = st.actions.last_target().is_some();
            if pending || st.inputs[target].is_active() {
                debug!("Input {} already selected", target);
                return false;
            }
            info!("Restarting input {}", target);
            self.enqueue_initial(st, target);
            return true;
        }

        use ActionKind::{NotifyCurrent, SetCurrent, Start, Stop, WaitInput, WaitStarted, WaitStopped};
        let group = match self.options.mode {
            SwitchMode::Standard => vec![
                Action::new(Start, target, true),
                Action::plain(WaitStarted, target),
                Action::new(NotifyCurrent, from, false),
                Action::new(NotifyCurrent, target, true),
                Action::plain(SetCurrent, target),
                Action::plain(WaitInput, target),
                Action::plain(Stop, from),
                Action::plain(WaitStopped, from),
            ],
            SwitchMode::Fast => vec![
                Action::new(Start, target, true),
                Action::plain(WaitStarted, target),
                Action::new(NotifyCurrent, from, false),
                Action::new(NotifyCurrent, target, true),
                Action::plain(SetCurrent, target),
            ],
            SwitchMode::Delayed => vec![
                Action::new(Start, target, false),
                Action::plain(WaitStarted, target),
                Action::plain(WaitInput, target),
                Action::new(NotifyCurrent, from, false),
                Action::new(NotifyCurrent, target, true),
                Action::plain(SetCurrent, target),
                Action::plain(Stop, from),
                Action::plain(WaitStopped, from),
            ],
            SwitchMode::Sequential => vec![
                Action::plain(Stop, from),
                Action::plain(WaitStopped, from),
                Action::new(Start, target, true),
                Action::plain(WaitStarted, target),
                Action::new(NotifyCurrent, target, true),
                Action::plain(SetCurrent, target),
                Action::plain(WaitInput, target),
            ],
        };
        for action in group {
            st.actions.push(action);
        }
        st.actions.push(Action::none());
        debug!("Switch {} -> {} queued: {}", from, target, st.actions);
        true
    }

    /// Start `index` and make it current once started
    fn enqueue_initial(&self, st: &mut CoreState, index: usize) {
        st.actions.push(Action::new(ActionKind::Start, index, true));
        st.actions.push(Action::plain(ActionKind::WaitStarted, index));
        st.actions.push(Action::plain(ActionKind::SetCurrent, index));
        st.actions.push(Action::none());
    }

    /// Run queued actions until one has to wait.
    ///
    /// `event` is recorded first so that it can unlock a wait action.
    fn execute(&self, st: &mut CoreState, event: Option<Action>) {
        if let Some(event) = event {
            st.events.signal(event);
        }

        while let Some(&action) = st.actions.front() {
            trace!("Executing {}", action);
            match action.kind {
                ActionKind::None => {}
                ActionKind::Start => self.execute_start(st, action),
                ActionKind::Stop => self.execute_stop(st, action.index),
                ActionKind::NotifyCurrent => {
                    self.inputs[action.index].notify_current(action.flag);
                }
                ActionKind::SetCurrent => self.execute_set_current(st, action.index),
                ActionKind::WaitStarted | ActionKind::WaitInput | ActionKind::WaitStopped => {
                    match st.events.take(&action) {
                        Some(event) => {
                            if action.kind == ActionKind::WaitStarted && !event.flag {
                                self.abort_switch(st, action.index);
                                continue;
                            }
                        }
                        None if action.kind == ActionKind::WaitInput
                            && matches!(
                                st.inputs[action.index],
                                InputState::Stopped | InputState::Failed
                            ) =>
                        {
                            // A stopped input will not deliver the awaited packets
                            debug!("Input {} stopped, not waiting for packets", action.index);
                        }
                        None => {
                            trace!("Waiting for {}", action);
                            return;
                        }
                    }
                }
            }
            st.actions.pop();
        }
    }

    fn execute_start(&self, st: &mut CoreState, action: Action) {
        let index = action.index;
        match st.inputs[index] {
            InputState::Running => {
                debug!("Input {} already running", index);
                st.events
                    .signal(Action::new(ActionKind::WaitStarted, index, true));
            }
            InputState::Starting => {
                debug!("Input {} already starting", index);
            }
            _ => {
                st.events.forget(ActionKind::WaitStarted, index);
                st.events.forget(ActionKind::WaitInput, index);
                st.inputs[index] = InputState::Starting;
                self.inputs[index].start_input(action.flag);
            }
        }
    }

    fn execute_stop(&self, st: &mut CoreState, index: usize) {
        st.events.forget(ActionKind::WaitStopped, index);
        match st.inputs[index] {
            InputState::Starting | InputState::Running => {
                st.inputs[index] = InputState::Stopping;
                self.inputs[index].stop_input();
            }
            InputState::Stopping => {}
            _ => {
                debug!("Input {} not active, nothing to stop", index);
                st.events
                    .signal(Action::new(ActionKind::WaitStopped, index, true));
            }
        }
    }

    fn execute_set_current(&self, st: &mut CoreState, index: usize) {
        let from = st.current;
        st.current = index;
        st.established = true;
        if from != index {
            info!(
                "Switched from input {} ({}) to input {} ({})",
                from,
                self.inputs[from].name(),
                index,
                self.inputs[index].name()
            );
            self.emit(SwitchEvent::CurrentChanged { from, to: index });
        } else {
            info!("Current input is {} ({})", index, self.inputs[index].name());
        }
        self.got_input.notify_all();
    }

    /// The head WAIT_STARTED reported a failed start: drop the rest of
    /// the switch and decide where to go from there.
    fn abort_switch(&self, st: &mut CoreState, failed: usize) {
        let discarded = st.actions.discard_group();
        warn!(
            "Input {} ({}) failed to start, {} queued actions dropped",
            failed,
            self.inputs[failed].name(),
            discarded
        );
        self.emit(SwitchEvent::SwitchAborted { target: failed });

        if st.terminate {
            return;
        }

        if !st.established {
            if self.options.initial == InitialInput::FirstSuccess {
                let count = self.inputs.len();
                let untried = (1..count)
                    .map(|k| (failed + k) % count)
                    .find(|&i| !st.tried[i]);
                if let Some(next) = untried {
                    info!("Trying input {} as initial input", next);
                    st.tried[next] = true;
                    self.enqueue_initial(st, next);
                    return;
                }
            }
            // In fast mode another input may already be running
            let running = (0..self.inputs.len())
                .find(|&i| i != failed && st.inputs[i] == InputState::Running);
            match running {
                Some(alt) => {
                    info!("Falling back to running input {}", alt);
                    self.enqueue_initial(st, alt);
                }
                None => {
                    error!("No input could be started");
                    st.stop_request = Some(false);
                }
            }
            return;
        }

        let selected = Self::selected(st);
        if selected != failed && st.inputs[selected].is_active() {
            info!("Staying on input {}", selected);
            return;
        }
        self.fail_over(st, failed);
    }

    /// Switch to the next input that has not failed, or stop
    fn fail_over(&self, st: &mut CoreState, failed: usize) {
        let count = self.inputs.len();
        let viable = (1..count)
            .map(|k| (failed + k) % count)
            .find(|&i| st.inputs[i] != InputState::Failed);
        match viable {
            Some(next) => {
                info!("Failing over to input {}", next);
                self.switch_locked(st, next);
            }
            None => {
                error!("No viable input left");
                st.stop_request = Some(false);
            }
        }
    }

    /// The current input stopped without being asked to
    fn handle_input_end(&self, st: &mut CoreState, index: usize, success: bool) {
        if st.actions.last_target().is_some_and(|t| t != index) {
            debug!("Input {} ended, a pending switch moves away from it", index);
            return;
        }

        if !success {
            warn!("Input {} ({}) failed", index, self.inputs[index].name());
            self.fail_over(st, index);
            return;
        }

        if self.options.terminate_on_end {
            info!("Input {} completed, terminating", index);
            st.stop_request = Some(true);
            return;
        }

        let (target, wraps) = self.next_target(st);
        if wraps {
            self.complete_cycle(st);
        }
        if let Some(limit) = self.options.cycle_limit {
            if st.cycle >= limit {
                info!("Terminating after {} input cycles", st.cycle);
                st.stop_request = Some(true);
                return;
            }
        }
        debug!("Input {} completed, moving on to input {}", index, target);
        self.switch_locked(st, target);
    }
}
