use std::thread;

use serde::Serialize;
use songproc_service::ServiceClient;

use songproc::exit::{io_error, CliResult, FAILURE, SUCCESS};

use crate::cmd::{start_worker, PlayArgs};
use crate::output::{print_report, yes_no, OutputFormat, Report};

#[derive(Debug, Serialize)]
struct Step {
    name: &'static str,
    ok: bool,
}

#[derive(Debug, Serialize)]
struct PlayOutput {
    file: String,
    size: usize,
    looping: bool,
    volume: i32,
    duration_ms: u128,
    worker_pid: Option<u32>,
    status: Vec<String>,
    steps: Vec<Step>,
    ok: bool,
}

impl Report for PlayOutput {
    fn title(&self) -> &'static str {
        "Playback"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("file", self.file.clone()),
            ("size", self.size.to_string()),
            ("looping", yes_no(self.looping)),
            ("volume", self.volume.to_string()),
            ("duration", format!("{}ms", self.duration_ms)),
        ];
        for step in &self.steps {
            rows.push((step.name, if step.ok { "ok" } else { "failed" }.to_string()));
        }
        for line in &self.status {
            rows.push(("status", line.clone()));
        }
        rows.push(("result", if self.ok { "played" } else { "failed" }.to_string()));
        rows
    }

    fn raw(&self) -> String {
        if self.ok { "ok" } else { "failed" }.to_string()
    }
}

/// Start, connect, register, set the volume, play for `--duration`, stop, and
/// shut down. Stops at the first failed step; shutdown always runs.
pub fn run(args: PlayArgs, format: OutputFormat) -> CliResult<i32> {
    let song = std::fs::read(&args.file)
        .map_err(|err| io_error(&format!("read {}", args.file.display()), err))?;

    let (launcher, status) = start_worker(&args.worker);
    let mut client = ServiceClient::new(launcher);
    let worker_pid = client.launcher().pid();

    let mut steps = Vec::new();
    let mut record = |name: &'static str, ok: bool| {
        steps.push(Step { name, ok });
        ok
    };

    let ok = record("start", client.is_started())
        && record("connect", client.connect())
        && record("register_song", client.register_song(&song))
        && record("set_volume", client.set_volume(args.volume))
        && record("play_song", client.play_song(args.looping))
        && {
            tracing::info!(duration = ?args.duration, "playing");
            thread::sleep(args.duration);
            record("stop_song", client.stop_song())
        };
    client.shutdown();

    let output = PlayOutput {
        file: args.file.display().to_string(),
        size: song.len(),
        looping: args.looping,
        volume: args.volume,
        duration_ms: args.duration.as_millis(),
        worker_pid,
        status,
        steps,
        ok,
    };
    print_report(&output, format);

    Ok(if ok { SUCCESS } else { FAILURE })
}
