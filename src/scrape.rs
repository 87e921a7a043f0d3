use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::fields::{FieldSet, Group, sanitize};

/// What the inspection script prints when the status cell is not on the page.
pub const STATUS_NOT_FOUND: &str = "Status Not Found";

/// Build state written into the form when the page reports approval.
pub const DESIGN_APPROVED: &str = "Design Approved";

/// Something that can show a page and evaluate a script against it.
pub trait ScriptHost: Send {
    fn load_url(&mut self, url: &str) -> Result<()>;
    fn run_script(&mut self, script: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesignStatus {
    NotFound,
    Approved,
    NotApproved(String),
    Identified { pid: String, node: String },
}

impl DesignStatus {
    /// Polling stops once one of these is seen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DesignStatus::Approved | DesignStatus::NotApproved(_))
    }

    /// Whether an identified page belongs to the row in `fields`.
    pub fn matches(&self, fields: &FieldSet) -> bool {
        match self {
            DesignStatus::Identified { pid, node } => {
                fields.slots(Group::Pid).contains(pid) && fields.slots(Group::Node).contains(node)
            }
            _ => false,
        }
    }
}

impl fmt::Display for DesignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesignStatus::NotFound => f.write_str(STATUS_NOT_FOUND),
            DesignStatus::Approved => f.write_str(DESIGN_APPROVED),
            DesignStatus::NotApproved(line) => f.write_str(line),
            DesignStatus::Identified { pid, node } => write!(f, "PID: {pid} | Node: {node}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ScrapeParseError(String);

/// Classify one line of script output. Malformed structured lines fall back to `NotFound`.
pub fn parse_status(raw: &str) -> DesignStatus {
    let line = sanitize(raw);
    if line.is_empty() || line.eq_ignore_ascii_case(STATUS_NOT_FOUND) {
        return DesignStatus::NotFound;
    }
    if line.contains("PID:") || line.contains("Node:") {
        return match parse_identified(&line) {
            Ok(status) => status,
            Err(ScrapeParseError(msg)) => {
                log::warn!("unexpected status line {line:?}: {msg}");
                DesignStatus::NotFound
            }
        };
    }
    if is_approval(&line) {
        DesignStatus::Approved
    } else {
        DesignStatus::NotApproved(line)
    }
}

/// Words that turn "design approved" into its opposite when they appear anywhere in the line.
const NEGATIONS: [&str; 4] = ["not", "no", "never", "pending"];

fn is_approval(line: &str) -> bool {
    let lower = line.to_lowercase();
    let negated = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| NEGATIONS.contains(&word));
    lower.contains(&DESIGN_APPROVED.to_lowercase()) && !negated
}

fn parse_identified(line: &str) -> std::result::Result<DesignStatus, ScrapeParseError> {
    if !line.contains('|') {
        return Err(ScrapeParseError("missing '|' separator".into()));
    }
    let mut pid = None;
    let mut node = None;
    for part in line.split('|') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("PID:") {
            pid = Some(rest.trim().to_string());
        } else if let Some(rest) = part.strip_prefix("Node:") {
            node = Some(rest.trim().to_string());
        }
    }
    match (pid, node) {
        (Some(pid), Some(node)) if !pid.is_empty() && !node.is_empty() => {
            Ok(DesignStatus::Identified { pid, node })
        }
        _ => Err(ScrapeParseError("missing PID or Node".into())),
    }
}

/// Requests waiting for the host beyond the one it is working on.
const REQUEST_QUEUE: usize = 2;

#[derive(Debug)]
pub enum BridgeRequest {
    LoadUrl(String),
    RunScript { probe: u64, script: String },
}

#[derive(Debug)]
pub enum BridgeResponse {
    Loaded,
    Status(String),
    Error(String),
}

/// A response tagged with the probe it answers; `None` for page loads.
#[derive(Debug)]
struct Reply {
    probe: Option<u64>,
    response: BridgeResponse,
}

/// Request/response channel to a script host running on its own thread.
///
/// Every probe carries a sequence number. Answers to anything but the latest
/// probe are dropped, so a late answer never passes for a fresh one.
pub struct StatusBridge {
    req_tx: Sender<BridgeRequest>,
    resp_rx: Receiver<Reply>,
    script: String,
    last_probe: u64,
}

impl StatusBridge {
    pub fn spawn<H: ScriptHost + 'static>(host: H, script: String) -> Self {
        let (req_tx, req_rx) = crossbeam_channel::bounded::<BridgeRequest>(REQUEST_QUEUE);
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded::<Reply>();
        std::thread::spawn(move || run_host(host, req_rx, resp_tx));
        Self {
            req_tx,
            resp_rx,
            script,
            last_probe: 0,
        }
    }

    pub fn load_url(&self, url: &str) {
        if let Err(e) = self.req_tx.try_send(BridgeRequest::LoadUrl(url.to_string())) {
            log::warn!("status host busy, page load dropped: {e}");
        }
    }

    /// Fire the inspection script; the answer arrives through `try_recv`.
    /// Returns false when the host is still busy and the probe was not queued.
    pub fn send_probe(&mut self) -> bool {
        let probe = self.last_probe + 1;
        let request = BridgeRequest::RunScript {
            probe,
            script: self.script.clone(),
        };
        match self.req_tx.try_send(request) {
            Ok(()) => {
                self.last_probe = probe;
                true
            }
            Err(TrySendError::Full(_)) => {
                log::debug!("status host busy, probe {probe} not sent");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("status host is gone");
                false
            }
        }
    }

    fn is_current(&self, reply: &Reply) -> bool {
        match reply.probe {
            Some(probe) if probe != self.last_probe => {
                log::debug!("dropping stale answer to probe {probe}");
                false
            }
            _ => true,
        }
    }

    pub fn try_recv(&self) -> Option<BridgeResponse> {
        loop {
            let reply = self.resp_rx.try_recv().ok()?;
            if self.is_current(&reply) {
                return Some(reply.response);
            }
        }
    }

    /// Run the script and wait for its status line. A timeout or host error
    /// counts as "not found".
    pub fn request_status(&mut self, timeout: Duration) -> DesignStatus {
        let deadline = Instant::now() + timeout;
        while !self.send_probe() {
            if Instant::now() >= deadline {
                log::warn!("status host busy for {timeout:?}");
                return DesignStatus::NotFound;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let reply = match self.resp_rx.recv_timeout(left) {
                Ok(reply) => reply,
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("status script timed out after {timeout:?}");
                    return DesignStatus::NotFound;
                }
                Err(RecvTimeoutError::Disconnected) => return DesignStatus::NotFound,
            };
            if !self.is_current(&reply) {
                continue;
            }
            match reply.response {
                BridgeResponse::Status(raw) => return parse_status(&raw),
                BridgeResponse::Loaded => continue,
                BridgeResponse::Error(e) if reply.probe.is_none() => {
                    log::warn!("status page failed to load: {e}");
                }
                BridgeResponse::Error(e) => {
                    log::warn!("status script failed: {e}");
                    return DesignStatus::NotFound;
                }
            }
        }
    }
}

fn run_host<H: ScriptHost>(mut host: H, req_rx: Receiver<BridgeRequest>, resp_tx: Sender<Reply>) {
    while let Ok(req) = req_rx.recv() {
        let (probe, result) = match req {
            BridgeRequest::LoadUrl(url) => (None, host.load_url(&url).map(|_| BridgeResponse::Loaded)),
            BridgeRequest::RunScript { probe, script } => {
                (Some(probe), host.run_script(&script).map(BridgeResponse::Status))
            }
        };
        let response = result.unwrap_or_else(|e| BridgeResponse::Error(format!("{e:#}")));
        if resp_tx.send(Reply { probe, response }).is_err() {
            break;
        }
    }
}

/// Fixed-interval re-probe timer with at most one probe in flight.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    interval: Duration,
    timeout: Duration,
    active: bool,
    last_fired: Option<Instant>,
    in_flight: Option<Instant>,
}

impl StatusPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            active: false,
            last_fired: None,
            in_flight: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self) {
        self.active = true;
        self.last_fired = None;
    }

    pub fn cancel(&mut self) {
        self.active = false;
        self.in_flight = None;
    }

    /// Whether a probe should be sent now. Marks it in flight when it is.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        if !self.active {
            return false;
        }
        if let Some(sent) = self.in_flight {
            if now.duration_since(sent) < self.timeout {
                return false;
            }
            log::debug!("status probe timed out, retrying");
        }
        let due = self
            .last_fired
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            self.last_fired = Some(now);
            self.in_flight = Some(now);
        }
        due
    }

    /// Record an answer; returns true if polling stopped because of it.
    pub fn observe(&mut self, status: &DesignStatus) -> bool {
        self.in_flight = None;
        if self.active && status.is_terminal() {
            self.active = false;
            return true;
        }
        false
    }
}
