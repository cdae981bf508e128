use serde::Serialize;
use songproc_service::{ProcessLauncher, ServiceClient};

use songproc::exit::{CliResult, FAILURE, SUCCESS};

use crate::cmd::{start_worker, worker_dir, ProbeArgs};
use crate::output::{print_report, yes_no, OutputFormat, Report};

#[derive(Debug, Serialize)]
struct ProbeOutput {
    worker: Option<String>,
    worker_pid: Option<u32>,
    started: bool,
    connected: bool,
    state: String,
    address: Option<String>,
    status: Vec<String>,
}

impl Report for ProbeOutput {
    fn title(&self) -> &'static str {
        "Worker probe"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            (
                "worker",
                self.worker.clone().unwrap_or_else(|| "unknown".to_string()),
            ),
            (
                "pid",
                self.worker_pid
                    .map(|pid| pid.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("started", yes_no(self.started)),
            ("connected", yes_no(self.connected)),
            ("state", self.state.clone()),
            (
                "address",
                self.address.clone().unwrap_or_else(|| "-".to_string()),
            ),
        ];
        for line in &self.status {
            rows.push(("status", line.clone()));
        }
        rows
    }

    fn raw(&self) -> String {
        self.state.clone()
    }
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let worker = worker_dir(&args.worker)
        .map(|dir| ProcessLauncher::worker_path(dir).display().to_string());
    let (launcher, status) = start_worker(&args.worker);
    let mut client = ServiceClient::new(launcher);

    let connected = client.is_started() && client.connect();
    let output = ProbeOutput {
        worker,
        worker_pid: client.launcher().pid(),
        started: client.is_started(),
        connected,
        state: format!("{:?}", client.state()),
        address: client.address().map(ToString::to_string),
        status,
    };
    client.shutdown();

    print_report(&output, format);
    Ok(if connected { SUCCESS } else { FAILURE })
}
