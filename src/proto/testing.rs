//! Recording fakes for [`Interface`] and [`Launcher`].

use std::sync::{Arc, Mutex};

use nix::sys::signal::Signal;
use serde_json::{Map, Value};

use crate::error::ProtoError;
use crate::process::{LaunchRequest, Launcher, ProcessHandle};
use crate::proto::iface::{ClaimMode, DeviceUser, Interface, ProtoEvent};

/// One call observed by [`FakeInterface`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IfaceCall {
    Event(ProtoEvent),
    Claim(String, ClaimMode),
    Release(String),
    UpdateStart,
    ApplyIp { external: bool },
    Route { v6: bool, route: Value },
    UpdateComplete,
    Error { proto: String, code: String, details: Vec<String> },
    Available(bool),
    Autostart(bool),
}

#[derive(Debug, Clone)]
pub(crate) struct FakeInterface {
    name: String,
    main_dev: Option<String>,
    calls: Arc<Mutex<Vec<IfaceCall>>>,
}

impl FakeInterface {
    pub(crate) fn new(name: &str, main_dev: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            main_dev: main_dev.map(str::to_string),
            calls: Arc::default(),
        }
    }

    pub(crate) fn calls(&self) -> Vec<IfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn events(&self) -> Vec<ProtoEvent> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                IfaceCall::Event(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: IfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Interface for FakeInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn main_device(&self) -> Option<&str> {
        self.main_dev.as_deref()
    }

    fn proto_event(&mut self, event: ProtoEvent) {
        self.record(IfaceCall::Event(event));
    }

    fn claim_device(&mut self, ifname: &str, mode: ClaimMode) -> DeviceUser {
        self.record(IfaceCall::Claim(ifname.to_string(), mode));
        DeviceUser::new(ifname)
    }

    fn release_device(&mut self, device: DeviceUser) {
        self.record(IfaceCall::Release(device.ifname().to_string()));
    }

    fn update_start(&mut self) {
        self.record(IfaceCall::UpdateStart);
    }

    fn apply_ip_settings(&mut self, _data: &Map<String, Value>, external: bool) {
        self.record(IfaceCall::ApplyIp { external });
    }

    fn add_route(&mut self, route: &Map<String, Value>, v6: bool) {
        self.record(IfaceCall::Route {
            v6,
            route: Value::Object(route.clone()),
        });
    }

    fn update_complete(&mut self) {
        self.record(IfaceCall::UpdateComplete);
    }

    fn add_error(&mut self, proto: &str, code: &str, details: &[String]) {
        self.record(IfaceCall::Error {
            proto: proto.to_string(),
            code: code.to_string(),
            details: details.to_vec(),
        });
    }

    fn set_available(&mut self, available: bool) {
        self.record(IfaceCall::Available(available));
    }

    fn set_autostart(&mut self, autostart: bool) {
        self.record(IfaceCall::Autostart(autostart));
    }
}

/// One call observed by [`FakeLauncher`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LaunchCall {
    Launch(LaunchRequest, ProcessHandle),
    Signal(ProcessHandle, Option<Signal>),
}

#[derive(Debug, Default)]
struct LauncherState {
    next_id: u64,
    fail: bool,
    calls: Vec<LaunchCall>,
}

/// Launcher that never starts anything; exits are fed by the test.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub(crate) fn calls(&self) -> Vec<LaunchCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn launches(&self) -> Vec<(LaunchRequest, ProcessHandle)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                LaunchCall::Launch(req, h) => Some((req, h)),
                LaunchCall::Signal(..) => None,
            })
            .collect()
    }

    pub(crate) fn signals(&self) -> Vec<(ProcessHandle, Option<Signal>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                LaunchCall::Signal(h, s) => Some((h, s)),
                LaunchCall::Launch(..) => None,
            })
            .collect()
    }

    /// Handle returned by the most recent successful launch.
    pub(crate) fn last(&self) -> ProcessHandle {
        self.launches().last().expect("nothing launched").1
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }
}

impl Launcher for FakeLauncher {
    fn launch(&mut self, request: LaunchRequest) -> Result<ProcessHandle, ProtoError> {
        let mut st = self.state.lock().unwrap();
        if st.fail {
            return Err(ProtoError::Spawn {
                program: request.program().to_string(),
                reason: "No such file or directory (os error 2)".into(),
            });
        }
        st.next_id += 1;
        let handle = ProcessHandle {
            id: st.next_id,
            pid: 1000 + st.next_id as u32,
        };
        st.calls.push(LaunchCall::Launch(request, handle));
        Ok(handle)
    }

    fn signal(&mut self, handle: ProcessHandle, signal: Option<Signal>) {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(LaunchCall::Signal(handle, signal));
    }
}
