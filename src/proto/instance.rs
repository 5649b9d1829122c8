//! # ProtocolInstance: the per-interface lifecycle machine.
//!
//! One instance binds one backend [`Handler`] to one [`Interface`]. It owns
//! the attach configuration, two tracked process slots, an optional abort or
//! teardown deadline, the last recorded exit error and the claimed layer-3
//! device.
//!
//! The instance is synchronous and never waits: every method applies one
//! input and returns. The driver (see `InstanceActor`) feeds it commands,
//! notifications, process exits and deadline expiries, and sleeps until
//! [`deadline`](ProtocolInstance::deadline) in between.
//!
//! ## State machine
//! ```text
//!            SETUP                      update-link(up)
//!   IDLE ───────────────► SETUP ──────────────────────────► IDLE
//!    │                      │
//!    │ TEARDOWN             │ TEARDOWN while script_task runs
//!    │ (script idle)        ▼          (arm abort deadline, SIGTERM both)
//!    │                 SETUP_ABORT ── both exited / deadline ──► IDLE ──► TEARDOWN
//!    ▼
//!  TEARDOWN ── script_task done, proto_task done / deadline ──► IDLE + Down
//!                (SIGTERM proto_task once script_task is done)
//! ```
//!
//! ## Completions
//! - `proto_task` exit in `IDLE`: link-lost, then teardown
//! - `proto_task` exit in `SETUP`: teardown
//! - `script_task` exit in `SETUP` with no `proto_task` running: teardown
//! - deadline expiry: SIGKILL both slots, then proceed as if both exited
//! - exits of processes no longer tracked are ignored
//!
//! ## Rules
//! - A rejected command or notification changes nothing
//! - At most one `script_task` runs per instance
//! - The layer-3 device is released on re-claim, on teardown completion or on drop

use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ProtoError;
use crate::events::{Bus, Event, EventKind};
use crate::handlers::{Handler, HandlerFlags, validate_config};
use crate::process::{LaunchRequest, Launcher, ProcessExit, ProcessSlot, SlotKind};
use crate::proto::iface::{ClaimMode, DeviceUser, Interface, ProtoEvent};
use crate::proto::notify::Notification;
use crate::proto::state::{ProtoCommand, ProtoState};

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

/// Runtime binding of one backend script to one interface.
pub struct ProtocolInstance<I: Interface, L: Launcher> {
    iface: I,
    launcher: L,
    handler: Arc<Handler>,
    config: Map<String, Value>,
    bus: Bus,

    abort_timeout: Duration,
    teardown_timeout: Duration,

    state: ProtoState,
    script_task: ProcessSlot,
    proto_task: ProcessSlot,
    proto_task_killed: bool,
    deadline: Option<Deadline>,
    last_error: Option<i32>,
    l3_dev: Option<DeviceUser>,
}

impl<I: Interface, L: Launcher> ProtocolInstance<I, L> {
    /// Binds `handler` to `iface`.
    ///
    /// Fails with [`ProtoError::InvalidConfig`] if `config` is not an object
    /// or a declared parameter has the wrong type.
    pub fn attach(
        handler: Arc<Handler>,
        mut iface: I,
        config: &Value,
        launcher: L,
        bus: Bus,
        cfg: &Config,
    ) -> Result<Self, ProtoError> {
        let config = validate_config(handler.schema(), config)?;
        if handler.flags().contains(HandlerFlags::INIT_AVAILABLE) {
            iface.set_available(true);
        }

        Ok(Self {
            iface,
            launcher,
            handler,
            config,
            bus,
            abort_timeout: cfg.abort_timeout,
            teardown_timeout: cfg.teardown_timeout,
            state: ProtoState::Idle,
            script_task: ProcessSlot::new(),
            proto_task: ProcessSlot::new(),
            proto_task_killed: false,
            deadline: None,
            last_error: None,
            l3_dev: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProtoState {
        self.state
    }

    /// Owning interface.
    pub fn interface(&self) -> &I {
        &self.iface
    }

    /// Bound handler.
    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    /// Last recorded `proto_task` exit error, if any since the last setup.
    pub fn last_error(&self) -> Option<i32> {
        self.last_error
    }

    /// When the armed abort/teardown deadline fires, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|d| d.at)
    }

    /// Name of the claimed layer-3 device.
    pub fn l3_device(&self) -> Option<&str> {
        self.l3_dev.as_ref().map(DeviceUser::ifname)
    }

    /// Returns `true` while the backend script runs.
    pub fn script_pending(&self) -> bool {
        self.script_task.is_pending()
    }

    /// Returns `true` while an auxiliary process runs.
    pub fn proto_task_pending(&self) -> bool {
        self.proto_task.is_pending()
    }

    /// Applies a command from the interface manager.
    pub fn command(&mut self, cmd: ProtoCommand) -> Result<(), ProtoError> {
        match cmd {
            ProtoCommand::Setup => self.setup(),
            ProtoCommand::Teardown => self.teardown(),
        }
    }

    /// Checks that the instance can be detached: `IDLE` with nothing running.
    pub fn check_detach(&self) -> Result<(), ProtoError> {
        if self.state != ProtoState::Idle || self.script_pending() || self.proto_task_pending() {
            return Err(ProtoError::Busy { state: self.state });
        }
        Ok(())
    }

    /// Decodes and applies a notification from the backend.
    pub fn notify(&mut self, msg: &Value) -> Result<(), ProtoError> {
        let mut action = None;
        let res = match msg.as_object() {
            Some(map) => Notification::decode(map).and_then(|n| {
                action = Some(n.name());
                self.dispatch(map, n)
            }),
            None => Err(ProtoError::invalid_argument("notification is not an object")),
        };
        if let Err(e) = &res {
            let mut ev = Event::new(EventKind::NotifyRejected).with_reason(e.to_string());
            if let Some(action) = action {
                ev = ev.with_action(action);
            }
            self.publish(ev);
        }
        res
    }

    /// Handles the exit of a process this instance started.
    pub fn on_exit(&mut self, exit: ProcessExit) {
        let code = exit.code.as_error_code();
        let pid = exit.handle.pid;

        if self.script_task.complete(exit.handle) {
            self.publish(
                Event::new(EventKind::ScriptExited)
                    .with_pid(pid)
                    .with_exit_code(code),
            );
            self.task_finished(Some(SlotKind::Script));
        } else if self.proto_task.complete(exit.handle) {
            self.publish(
                Event::new(EventKind::ProtoTaskExited)
                    .with_pid(pid)
                    .with_exit_code(code),
            );
            if matches!(self.state, ProtoState::Idle | ProtoState::Setup) {
                self.last_error = Some(exit.code.status());
            }
            self.task_finished(Some(SlotKind::ProtoTask));
        } else {
            debug!(iface = self.iface.name(), pid, "ignoring exit of untracked process");
        }
    }

    /// Handles expiry of the armed deadline. No-op when nothing is armed.
    pub fn on_deadline(&mut self) {
        let Some(deadline) = self.deadline.take() else {
            return;
        };
        self.publish(Event::new(EventKind::DeadlineExpired).with_timeout(deadline.timeout));

        for kind in [SlotKind::Script, SlotKind::ProtoTask] {
            let slot = match kind {
                SlotKind::Script => &mut self.script_task,
                SlotKind::ProtoTask => &mut self.proto_task,
            };
            if let Some(handle) = slot.force_kill(&mut self.launcher) {
                self.publish(
                    Event::new(EventKind::SignalSent)
                        .with_pid(handle.pid)
                        .with_reason(Signal::SIGKILL.as_str()),
                );
            }
        }
        self.task_finished(None);
    }

    fn setup(&mut self) -> Result<(), ProtoError> {
        let busy = matches!(self.state, ProtoState::Teardown | ProtoState::SetupAbort);
        if busy || self.script_task.is_pending() {
            return Err(ProtoError::Busy { state: self.state });
        }

        self.start_script(ProtoCommand::Setup, Vec::new())?;
        self.last_error = None;
        self.set_state(ProtoState::Setup);
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), ProtoError> {
        if matches!(self.state, ProtoState::Teardown | ProtoState::SetupAbort) {
            return Ok(());
        }

        if self.script_task.is_pending() {
            self.arm(self.abort_timeout);
            self.signal_task(SlotKind::Script, Some(Signal::SIGTERM));
            self.signal_task(SlotKind::ProtoTask, Some(Signal::SIGTERM));
            self.set_state(ProtoState::SetupAbort);
            return Ok(());
        }

        let env = self
            .last_error
            .map(|code| vec![format!("ERROR={code}")])
            .unwrap_or_default();
        self.start_script(ProtoCommand::Teardown, env)?;
        self.arm(self.teardown_timeout);
        self.set_state(ProtoState::Teardown);
        Ok(())
    }

    /// Teardown issued by the machine itself; there is no caller to report to.
    fn internal_teardown(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(
                iface = self.iface.name(),
                error = %e,
                "teardown script could not be started; completing teardown"
            );
            self.finish_teardown();
        }
    }

    fn task_finished(&mut self, finished: Option<SlotKind>) {
        match self.state {
            ProtoState::Idle => {
                if finished == Some(SlotKind::ProtoTask) {
                    self.deliver(ProtoEvent::LinkLost);
                    self.internal_teardown();
                }
            }
            ProtoState::Setup => match finished {
                Some(SlotKind::ProtoTask) => self.internal_teardown(),
                Some(SlotKind::Script) if !self.proto_task.is_pending() => {
                    self.internal_teardown()
                }
                _ => {}
            },
            ProtoState::SetupAbort => {
                if self.script_task.is_pending() || self.proto_task.is_pending() {
                    return;
                }
                self.deadline = None;
                self.set_state(ProtoState::Idle);
                self.internal_teardown();
            }
            ProtoState::Teardown => {
                if self.script_task.is_pending() {
                    return;
                }
                if self.proto_task.is_pending() {
                    if !self.proto_task_killed {
                        self.signal_task(SlotKind::ProtoTask, Some(Signal::SIGTERM));
                    }
                    return;
                }
                self.finish_teardown();
            }
        }
    }

    fn finish_teardown(&mut self) {
        self.deadline = None;
        if let Some(handle) = self.proto_task.force_kill(&mut self.launcher) {
            debug!(iface = self.iface.name(), pid = handle.pid, "killed leftover auxiliary process");
        }
        if let Some(dev) = self.l3_dev.take() {
            self.iface.release_device(dev);
        }
        self.set_state(ProtoState::Idle);
        self.deliver(ProtoEvent::Down);
    }

    fn start_script(&mut self, cmd: ProtoCommand, env: Vec<String>) -> Result<(), ProtoError> {
        let config = serde_json::to_string(&self.config)
            .map_err(|e| ProtoError::invalid_config(e.to_string()))?;

        let mut argv = vec![
            self.handler.script().to_string_lossy().into_owned(),
            self.handler.name().to_string(),
            cmd.action().to_string(),
            self.iface.name().to_string(),
            config,
        ];
        if !self.handler.flags().contains(HandlerFlags::NO_DEVICE) {
            if let Some(dev) = self.iface.main_device() {
                argv.push(dev.to_string());
            }
        }

        let request = LaunchRequest::new(argv, self.iface.name()).with_env(env);
        let handle = self.launcher.launch(request)?;
        self.script_task.track(handle);
        self.publish(
            Event::new(EventKind::ScriptStarted)
                .with_action(cmd.action())
                .with_pid(handle.pid),
        );
        Ok(())
    }

    fn dispatch(&mut self, data: &Map<String, Value>, n: Notification<'_>) -> Result<(), ProtoError> {
        match n {
            Notification::UpdateLink { link_up: false, .. } => {
                self.deliver(ProtoEvent::LinkLost);
                Ok(())
            }
            Notification::UpdateLink {
                link_up: true,
                ifname,
                address_external,
                routes,
                routes6,
            } => self.link_up(data, ifname, address_external, routes, routes6),
            Notification::RunCommand { command, env } => self.run_command(command, env),
            Notification::KillCommand { signal } => {
                if self.proto_task.is_pending() {
                    self.proto_task_killed = true;
                    self.signal_task(SlotKind::ProtoTask, signal);
                }
                Ok(())
            }
            Notification::NotifyError { code, details } => {
                self.iface.add_error(self.handler.name(), &code, &details);
                Ok(())
            }
            Notification::BlockRestart => {
                self.iface.set_autostart(false);
                Ok(())
            }
            Notification::SetAvailable { available } => {
                self.iface.set_available(available);
                Ok(())
            }
        }
    }

    fn link_up(
        &mut self,
        data: &Map<String, Value>,
        ifname: Option<&str>,
        external: bool,
        routes: &[Value],
        routes6: &[Value],
    ) -> Result<(), ProtoError> {
        match ifname {
            None if self.iface.main_device().is_none() => {
                return Err(ProtoError::invalid_argument(
                    "no ifname given and interface has no main device",
                ));
            }
            None => {}
            Some(name) => {
                if let Some(prev) = self.l3_dev.take() {
                    self.iface.release_device(prev);
                }
                let mode = if external {
                    ClaimMode::External
                } else {
                    ClaimMode::Create
                };
                self.l3_dev = Some(self.iface.claim_device(name, mode));
            }
        }

        self.iface.update_start();
        self.iface.apply_ip_settings(data, external);
        self.add_routes(routes, false);
        self.add_routes(routes6, true);
        self.iface.update_complete();
        self.deliver(ProtoEvent::Up);

        if self.state == ProtoState::Setup {
            self.set_state(ProtoState::Idle);
        }
        Ok(())
    }

    fn add_routes(&mut self, routes: &[Value], v6: bool) {
        for route in routes {
            match route.as_object() {
                Some(route) => self.iface.add_route(route, v6),
                None => debug!(iface = self.iface.name(), v6, "ignoring malformed route entry"),
            }
        }
    }

    fn run_command(&mut self, command: Vec<String>, env: Vec<String>) -> Result<(), ProtoError> {
        let request = LaunchRequest::new(command, self.iface.name()).with_env(env);
        let handle = self.launcher.launch(request)?;
        if let Some(prev) = self.proto_task.track(handle) {
            debug!(
                iface = self.iface.name(),
                pid = prev.pid,
                "no longer tracking previous auxiliary process"
            );
        }
        self.proto_task_killed = false;
        self.publish(Event::new(EventKind::ProtoTaskStarted).with_pid(handle.pid));
        Ok(())
    }

    fn signal_task(&mut self, kind: SlotKind, signal: Option<Signal>) {
        let slot = match kind {
            SlotKind::Script => &self.script_task,
            SlotKind::ProtoTask => &self.proto_task,
        };
        if let Some(handle) = slot.signal(&mut self.launcher, signal) {
            self.publish(
                Event::new(EventKind::SignalSent)
                    .with_pid(handle.pid)
                    .with_reason(signal.map_or("0", Signal::as_str)),
            );
        }
    }

    fn arm(&mut self, timeout: Duration) {
        self.deadline = Some(Deadline {
            at: Instant::now() + timeout,
            timeout,
        });
        self.publish(Event::new(EventKind::DeadlineArmed).with_timeout(timeout));
    }

    fn set_state(&mut self, next: ProtoState) {
        if self.state == next {
            return;
        }
        let prev = std::mem::replace(&mut self.state, next);
        self.publish(
            Event::new(EventKind::StateChanged)
                .with_state(next)
                .with_reason(prev.as_str()),
        );
    }

    fn deliver(&mut self, event: ProtoEvent) {
        self.iface.proto_event(event);
        let kind = match event {
            ProtoEvent::Up => EventKind::LinkUp,
            ProtoEvent::Down => EventKind::Down,
            ProtoEvent::LinkLost => EventKind::LinkLost,
        };
        self.publish(Event::new(kind).with_state(self.state));
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(
            ev.with_iface(self.iface.name())
                .with_proto(self.handler.name()),
        );
    }
}

impl<I: Interface, L: Launcher> Drop for ProtocolInstance<I, L> {
    fn drop(&mut self) {
        for slot in [&mut self.script_task, &mut self.proto_task] {
            if let Some(handle) = slot.force_kill(&mut self.launcher) {
                warn!(
                    iface = self.iface.name(),
                    pid = handle.pid,
                    "instance dropped with a running process; killed"
                );
            }
        }
        if let Some(dev) = self.l3_dev.take() {
            self.iface.release_device(dev);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerRegistry;
    use crate::process::{ExitCode, ProcessHandle};
    use crate::proto::testing::{FakeInterface, FakeLauncher, IfaceCall};
    use serde_json::json;
    use tokio::sync::broadcast;

    const SCRIPT: &str = "/lib/netifd/proto/static.sh";

    struct Rig {
        inst: ProtocolInstance<FakeInterface, FakeLauncher>,
        iface: FakeInterface,
        launcher: FakeLauncher,
        events: broadcast::Receiver<Event>,
    }

    fn handler(flags: HandlerFlags) -> Arc<Handler> {
        HandlerRegistry::new()
            .register(
                "static",
                SCRIPT,
                vec![("ipaddr".to_string(), 3), ("mtu".to_string(), 5)],
                flags,
            )
            .unwrap()
    }

    fn rig_with(main_dev: Option<&str>, flags: HandlerFlags) -> Rig {
        let bus = Bus::new(256);
        let events = bus.subscribe();
        let iface = FakeInterface::new("wan", main_dev);
        let launcher = FakeLauncher::default();
        let inst = ProtocolInstance::attach(
            handler(flags),
            iface.clone(),
            &json!({"ipaddr": "10.0.0.2"}),
            launcher.clone(),
            bus,
            &Config::default(),
        )
        .unwrap();
        Rig {
            inst,
            iface,
            launcher,
            events,
        }
    }

    fn rig() -> Rig {
        rig_with(None, HandlerFlags::NONE)
    }

    fn exited(handle: ProcessHandle, code: i32) -> ProcessExit {
        ProcessExit {
            handle,
            code: ExitCode::Exited(code),
        }
    }

    fn states(rx: &mut broadcast::Receiver<Event>) -> Vec<ProtoState> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::StateChanged {
                out.extend(ev.state);
            }
        }
        out
    }

    fn link_up(ifname: &str) -> Value {
        json!({"action": 0, "link-up": true, "ifname": ifname})
    }

    fn run(cmd: &[&str]) -> Value {
        json!({"action": 1, "command": cmd})
    }

    #[test]
    fn setup_link_abort_and_teardown_scenario() {
        let mut r = rig();

        r.inst.command(ProtoCommand::Setup).unwrap();
        let (req, script) = r.launcher.launches()[0].clone();
        assert_eq!(
            req.argv,
            vec![SCRIPT, "static", "setup", "wan", r#"{"ipaddr":"10.0.0.2"}"#]
        );
        assert_eq!(req.log_prefix, "wan");
        assert_eq!(r.inst.state(), ProtoState::Setup);

        r.inst.notify(&link_up("eth0")).unwrap();
        assert_eq!(r.inst.l3_device(), Some("eth0"));
        assert_eq!(r.iface.events(), vec![ProtoEvent::Up]);
        assert_eq!(r.inst.state(), ProtoState::Idle);

        r.inst.command(ProtoCommand::Teardown).unwrap();
        assert_eq!(r.inst.state(), ProtoState::SetupAbort);
        assert!(r.inst.deadline().is_some());
        assert_eq!(r.launcher.signals(), vec![(script, Some(Signal::SIGTERM))]);

        r.inst.on_exit(exited(script, 0));
        assert_eq!(r.inst.state(), ProtoState::Teardown);
        let (req, teardown) = r.launcher.launches()[1].clone();
        assert_eq!(req.argv[2], "teardown");
        assert!(req.env.is_empty());

        r.iface.clear();
        r.inst.on_exit(exited(teardown, 0));
        assert_eq!(r.inst.state(), ProtoState::Idle);
        assert_eq!(r.inst.deadline(), None);
        assert_eq!(r.inst.l3_device(), None);
        assert_eq!(
            r.iface.calls(),
            vec![
                IfaceCall::Release("eth0".into()),
                IfaceCall::Event(ProtoEvent::Down)
            ]
        );

        assert_eq!(
            states(&mut r.events),
            vec![
                ProtoState::Setup,
                ProtoState::Idle,
                ProtoState::SetupAbort,
                ProtoState::Idle,
                ProtoState::Teardown,
                ProtoState::Idle,
            ]
        );
    }

    #[test]
    fn repeated_teardown_is_idempotent() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();

        r.inst.command(ProtoCommand::Teardown).unwrap();
        let calls = r.launcher.calls();
        r.inst.command(ProtoCommand::Teardown).unwrap();
        assert_eq!(r.launcher.calls(), calls);

        let script = r.launcher.last();
        r.inst.on_exit(exited(script, 0));
        assert_eq!(r.inst.state(), ProtoState::Teardown);
        let calls = r.launcher.calls();
        r.inst.command(ProtoCommand::Teardown).unwrap();
        assert_eq!(r.launcher.calls(), calls);
    }

    #[test]
    fn deadline_force_kills_both_processes_and_reaches_idle() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        let script = r.launcher.last();
        r.inst.notify(&run(&["/usr/sbin/udhcpc", "-f"])).unwrap();
        let aux = r.launcher.last();

        r.inst.command(ProtoCommand::Teardown).unwrap();
        assert_eq!(r.inst.state(), ProtoState::SetupAbort);

        r.inst.on_deadline();
        let kills: Vec<_> = r
            .launcher
            .signals()
            .into_iter()
            .filter(|(_, s)| *s == Some(Signal::SIGKILL))
            .map(|(h, _)| h)
            .collect();
        assert_eq!(kills, vec![script, aux]);
        assert_eq!(r.inst.state(), ProtoState::Teardown);
        assert!(r.inst.deadline().is_some());

        r.inst.on_deadline();
        assert_eq!(r.inst.state(), ProtoState::Idle);
        assert_eq!(r.inst.deadline(), None);
        assert_eq!(r.iface.events(), vec![ProtoEvent::Down]);

        // Late exits of reclaimed processes change nothing.
        r.inst.on_exit(exited(script, 0));
        r.inst.on_exit(exited(aux, 0));
        assert_eq!(r.inst.state(), ProtoState::Idle);
        assert_eq!(r.iface.events(), vec![ProtoEvent::Down]);
    }

    #[test]
    fn deadline_without_armed_timer_is_a_noop() {
        let mut r = rig();
        r.inst.on_deadline();
        assert_eq!(r.inst.state(), ProtoState::Idle);
        assert!(r.launcher.calls().is_empty());
    }

    #[test]
    fn setup_is_rejected_until_teardown_completes() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Teardown).unwrap();
        assert_eq!(r.inst.state(), ProtoState::Teardown);

        let err = r.inst.command(ProtoCommand::Setup).unwrap_err();
        assert_eq!(
            err,
            ProtoError::Busy {
                state: ProtoState::Teardown
            }
        );
        assert_eq!(r.launcher.launches().len(), 1);

        r.inst.on_exit(exited(r.launcher.last(), 0));
        r.inst.command(ProtoCommand::Setup).unwrap();
        assert_eq!(r.inst.state(), ProtoState::Setup);
    }

    #[test]
    fn setup_is_rejected_while_script_runs() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        r.inst.notify(&link_up("eth0")).unwrap();
        assert_eq!(r.inst.state(), ProtoState::Idle);

        let err = r.inst.command(ProtoCommand::Setup).unwrap_err();
        assert_eq!(err.as_label(), "proto_busy");
    }

    #[test]
    fn spawn_failure_leaves_instance_usable() {
        let mut r = rig();
        r.launcher.set_failing(true);

        let err = r.inst.command(ProtoCommand::Setup).unwrap_err();
        assert_eq!(err.as_label(), "proto_spawn_error");
        assert_eq!(r.inst.state(), ProtoState::Idle);
        assert!(!r.inst.script_pending());

        r.launcher.set_failing(false);
        r.inst.command(ProtoCommand::Setup).unwrap();
        assert_eq!(r.inst.state(), ProtoState::Setup);
    }

    #[test]
    fn aux_exit_while_up_reports_link_lost_and_error() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        let script = r.launcher.last();
        r.inst.notify(&run(&["/usr/sbin/pppd", "nodetach"])).unwrap();
        let aux = r.launcher.last();
        r.inst.on_exit(exited(script, 0));
        assert_eq!(r.inst.state(), ProtoState::Setup);

        r.inst.notify(&link_up("ppp0")).unwrap();
        assert_eq!(r.inst.state(), ProtoState::Idle);

        r.inst.on_exit(exited(aux, 3));
        assert_eq!(r.inst.last_error(), Some(3));
        assert_eq!(r.iface.events(), vec![ProtoEvent::Up, ProtoEvent::LinkLost]);
        assert_eq!(r.inst.state(), ProtoState::Teardown);

        let (req, _) = r.launcher.launches().last().cloned().unwrap();
        assert_eq!(req.argv[2], "teardown");
        assert_eq!(req.env, vec!["ERROR=3".to_string()]);
    }

    #[test]
    fn killed_aux_passes_zero_status_to_teardown() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        let script = r.launcher.last();
        r.inst.notify(&run(&["/usr/sbin/pppd", "nodetach"])).unwrap();
        let aux = r.launcher.last();
        r.inst.on_exit(exited(script, 0));
        r.inst.notify(&link_up("ppp0")).unwrap();

        r.inst.notify(&json!({"action": 2})).unwrap();
        r.inst.on_exit(ProcessExit {
            handle: aux,
            code: ExitCode::Signaled(15),
        });
        assert_eq!(r.inst.last_error(), Some(0));
        assert_eq!(r.inst.state(), ProtoState::Teardown);

        let (req, _) = r.launcher.launches().last().cloned().unwrap();
        assert_eq!(req.argv[2], "teardown");
        assert_eq!(req.env, vec!["ERROR=0".to_string()]);

        let exit_codes: Vec<i32> = std::iter::from_fn(|| r.events.try_recv().ok())
            .filter(|e| e.kind == EventKind::ProtoTaskExited)
            .filter_map(|e| e.exit_code)
            .collect();
        assert_eq!(exit_codes, vec![143]);
    }

    #[test]
    fn aux_exit_during_setup_tears_down_without_link_lost() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        let script = r.launcher.last();
        r.inst.notify(&run(&["/usr/sbin/udhcpc"])).unwrap();
        let aux = r.launcher.last();
        r.inst.on_exit(exited(script, 0));

        r.inst.on_exit(exited(aux, 1));
        assert!(r.iface.events().is_empty());
        assert_eq!(r.inst.state(), ProtoState::Teardown);
    }

    #[test]
    fn script_exit_during_setup_tears_down_only_without_aux() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        r.inst.on_exit(exited(r.launcher.last(), 1));
        assert_eq!(r.inst.state(), ProtoState::Teardown);
        assert!(r.iface.events().is_empty());

        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        let script = r.launcher.last();
        r.inst.notify(&run(&["/usr/sbin/udhcpc"])).unwrap();
        r.inst.on_exit(exited(script, 0));
        assert_eq!(r.inst.state(), ProtoState::Setup);
    }

    #[test]
    fn teardown_terminates_leftover_aux_after_script() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        let script = r.launcher.last();
        r.inst.notify(&run(&["/usr/sbin/udhcpc"])).unwrap();
        let aux = r.launcher.last();
        r.inst.notify(&link_up("eth0")).unwrap();
        r.inst.on_exit(exited(script, 0));

        r.inst.command(ProtoCommand::Teardown).unwrap();
        let teardown = r.launcher.last();
        r.inst.on_exit(exited(teardown, 0));
        assert_eq!(r.inst.state(), ProtoState::Teardown);
        assert_eq!(r.launcher.signals(), vec![(aux, Some(Signal::SIGTERM))]);

        r.inst.on_exit(exited(aux, 0));
        assert_eq!(r.inst.state(), ProtoState::Idle);
        assert_eq!(r.iface.events().last(), Some(&ProtoEvent::Down));
        assert_eq!(r.inst.last_error(), None);
    }

    #[test]
    fn deliberately_killed_aux_is_not_signalled_again() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        let script = r.launcher.last();
        r.inst.notify(&run(&["/usr/sbin/udhcpc"])).unwrap();
        let aux = r.launcher.last();
        r.inst.on_exit(exited(script, 0));

        r.inst.notify(&json!({"action": 2, "signal": 1})).unwrap();
        assert_eq!(r.launcher.signals(), vec![(aux, Some(Signal::SIGHUP))]);

        r.inst.command(ProtoCommand::Teardown).unwrap();
        r.inst.on_exit(exited(r.launcher.last(), 0));
        assert_eq!(r.launcher.signals().len(), 1);
    }

    #[test]
    fn kill_without_aux_is_a_noop() {
        let mut r = rig();
        r.inst.notify(&json!({"action": 2})).unwrap();
        assert!(r.launcher.calls().is_empty());
    }

    #[test]
    fn new_run_command_replaces_tracking() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        r.inst.notify(&link_up("eth0")).unwrap();
        r.inst.notify(&run(&["/bin/first"])).unwrap();
        let first = r.launcher.last();
        r.inst.notify(&run(&["/bin/second"])).unwrap();
        let second = r.launcher.last();
        assert!(r.launcher.signals().is_empty());

        r.inst.on_exit(exited(first, 1));
        assert_eq!(r.iface.events(), vec![ProtoEvent::Up]);
        assert_eq!(r.inst.last_error(), None);
        assert!(r.inst.proto_task_pending());

        let req = &r.launcher.launches()[2].0;
        assert_eq!(req.argv, vec!["/bin/second"]);
        r.inst.on_exit(exited(second, 0));
        assert_eq!(r.iface.events(), vec![ProtoEvent::Up, ProtoEvent::LinkLost]);
    }

    #[test]
    fn run_command_passes_env() {
        let mut r = rig();
        r.inst
            .notify(&json!({"action": 1, "command": ["/bin/x"], "env": ["A=1", "B=2"]}))
            .unwrap();
        let req = &r.launcher.launches()[0].0;
        assert_eq!(req.env, vec!["A=1".to_string(), "B=2".to_string()]);
        assert_eq!(req.log_prefix, "wan");
    }

    #[test]
    fn link_down_only_reports_link_lost() {
        let mut r = rig();
        r.inst
            .notify(&json!({"action": 0, "link-up": false, "ifname": "eth0"}))
            .unwrap();
        assert_eq!(r.iface.calls(), vec![IfaceCall::Event(ProtoEvent::LinkLost)]);
        assert_eq!(r.inst.l3_device(), None);
    }

    #[test]
    fn rejection_names_the_recognized_notification() {
        let mut r = rig();
        let mut rx = r.inst.bus.subscribe();

        r.inst.notify(&json!({"action": 0, "link-up": true})).unwrap_err();
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::NotifyRejected);
        assert_eq!(ev.action, Some("update-link"));

        r.inst.notify(&json!({"action": 42})).unwrap_err();
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::NotifyRejected);
        assert_eq!(ev.action, None);
    }

    #[test]
    fn link_up_needs_ifname_or_main_device() {
        let mut r = rig();
        let mut rx = r.inst.bus.subscribe();
        let err = r.inst.notify(&json!({"action": 0, "link-up": true})).unwrap_err();
        assert_eq!(err.as_label(), "proto_invalid_argument");
        assert!(r.iface.calls().is_empty());
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::NotifyRejected);

        let mut r = rig_with(Some("eth1"), HandlerFlags::NONE);
        r.inst.notify(&json!({"action": 0, "link-up": true})).unwrap();
        assert_eq!(r.inst.l3_device(), None);
        assert_eq!(
            r.iface.calls(),
            vec![
                IfaceCall::UpdateStart,
                IfaceCall::ApplyIp { external: false },
                IfaceCall::UpdateComplete,
                IfaceCall::Event(ProtoEvent::Up),
            ]
        );
    }

    #[test]
    fn reclaim_releases_previous_device_first() {
        let mut r = rig();
        r.inst.notify(&link_up("eth0")).unwrap();
        r.iface.clear();
        r.inst
            .notify(&json!({"action": 0, "link-up": true, "ifname": "eth1", "address-external": true}))
            .unwrap();

        let calls = r.iface.calls();
        assert_eq!(calls[0], IfaceCall::Release("eth0".into()));
        assert_eq!(calls[1], IfaceCall::Claim("eth1".into(), ClaimMode::External));
        assert_eq!(calls[3], IfaceCall::ApplyIp { external: true });
        assert_eq!(r.inst.l3_device(), Some("eth1"));
    }

    #[test]
    fn malformed_routes_are_skipped() {
        let mut r = rig();
        r.inst
            .notify(&json!({
                "action": 0,
                "link-up": true,
                "ifname": "eth0",
                "routes": [{"target": "0.0.0.0", "netmask": "0"}, "bogus", 7],
                "routes6": [[1, 2], {"target": "::", "netmask": "0"}],
            }))
            .unwrap();

        let routes: Vec<_> = r
            .iface
            .calls()
            .into_iter()
            .filter(|c| matches!(c, IfaceCall::Route { .. }))
            .collect();
        assert_eq!(
            routes,
            vec![
                IfaceCall::Route {
                    v6: false,
                    route: json!({"target": "0.0.0.0", "netmask": "0"})
                },
                IfaceCall::Route {
                    v6: true,
                    route: json!({"target": "::", "netmask": "0"})
                },
            ]
        );
    }

    #[test]
    fn notify_error_is_tagged_with_protocol() {
        let mut r = rig();
        r.inst
            .notify(&json!({"action": 3, "error": ["E_RES", "detail1"]}))
            .unwrap();
        assert_eq!(
            r.iface.calls(),
            vec![IfaceCall::Error {
                proto: "static".into(),
                code: "E_RES".into(),
                details: vec!["detail1".into()],
            }]
        );
        assert!(r.inst.notify(&json!({"action": 3, "error": []})).is_err());
    }

    #[test]
    fn restart_block_and_availability() {
        let mut r = rig();
        r.inst.notify(&json!({"action": 4})).unwrap();
        r.inst.notify(&json!({"action": 5, "available": true})).unwrap();
        assert_eq!(
            r.iface.calls(),
            vec![IfaceCall::Autostart(false), IfaceCall::Available(true)]
        );
    }

    #[test]
    fn non_object_notification_is_rejected() {
        let mut r = rig();
        assert!(r.inst.notify(&json!([0])).is_err());
    }

    #[test]
    fn attach_validates_config() {
        let bus = Bus::new(8);
        let cfg = Config::default();
        let attach = |config: Value| {
            ProtocolInstance::attach(
                handler(HandlerFlags::NONE),
                FakeInterface::new("wan", None),
                &config,
                FakeLauncher::default(),
                bus.clone(),
                &cfg,
            )
            .map(|_| ())
        };

        assert!(attach(json!({"ipaddr": "10.0.0.2", "extra": [1]})).is_ok());
        assert_eq!(
            attach(json!({"ipaddr": 5})).unwrap_err().as_label(),
            "proto_invalid_config"
        );
        assert!(attach(json!({"mtu": 1u64 << 40})).is_err());
        assert!(attach(json!("ipaddr=10.0.0.2")).is_err());
    }

    #[test]
    fn main_device_is_appended_unless_no_device() {
        let mut r = rig_with(Some("eth0"), HandlerFlags::NONE);
        r.inst.command(ProtoCommand::Setup).unwrap();
        assert_eq!(r.launcher.launches()[0].0.argv.last().unwrap(), "eth0");

        let mut r = rig_with(Some("eth0"), HandlerFlags::NO_DEVICE);
        r.inst.command(ProtoCommand::Setup).unwrap();
        assert_eq!(r.launcher.launches()[0].0.argv.len(), 5);
    }

    #[test]
    fn init_available_marks_interface_available() {
        let r = rig_with(None, HandlerFlags::INIT_AVAILABLE);
        assert_eq!(r.iface.calls(), vec![IfaceCall::Available(true)]);
    }

    #[test]
    fn failed_internal_teardown_still_completes() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        r.inst.notify(&link_up("eth0")).unwrap();
        r.inst.on_exit(exited(r.launcher.last(), 0));
        r.inst.notify(&run(&["/usr/sbin/pppd"])).unwrap();
        let aux = r.launcher.last();

        r.launcher.set_failing(true);
        r.inst.on_exit(exited(aux, 5));
        assert_eq!(r.inst.state(), ProtoState::Idle);
        assert_eq!(
            r.iface.events(),
            vec![ProtoEvent::Up, ProtoEvent::LinkLost, ProtoEvent::Down]
        );
        assert_eq!(r.inst.l3_device(), None);
    }

    #[test]
    fn detach_requires_quiescence() {
        let mut r = rig();
        assert!(r.inst.check_detach().is_ok());
        r.inst.command(ProtoCommand::Setup).unwrap();
        assert_eq!(r.inst.check_detach().unwrap_err().as_label(), "proto_busy");
    }

    #[test]
    fn drop_reclaims_processes_and_device() {
        let mut r = rig();
        r.inst.command(ProtoCommand::Setup).unwrap();
        let script = r.launcher.last();
        r.inst.notify(&link_up("eth0")).unwrap();
        r.iface.clear();

        drop(r.inst);
        assert_eq!(r.launcher.signals(), vec![(script, Some(Signal::SIGKILL))]);
        assert_eq!(r.iface.calls(), vec![IfaceCall::Release("eth0".into())]);
    }
}
