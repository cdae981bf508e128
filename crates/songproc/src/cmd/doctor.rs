use std::path::Path;

use serde::Serialize;
use songproc_service::{
    runtime_dir, socket_path, ProcessLauncher, ServiceConfig, PROTOCOL_SEQUENCE, SERVICE_ID,
};

use songproc::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};

use crate::cmd::{worker_dir, DoctorArgs};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Info,
    #[cfg_attr(unix, allow(dead_code))]
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let worker = worker_dir(&args.worker).map(ProcessLauncher::worker_path);
    let checks = vec![
        platform_transport_check(),
        worker_check(worker.as_deref()),
        runtime_dir_check(),
        socket_path_check(),
        binding_check(),
    ];

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("songproc doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<18} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn platform_transport_check() -> CheckResult {
    if cfg!(unix) {
        CheckResult::new(
            "platform_transport",
            CheckStatus::Pass,
            "Unix domain sockets available",
        )
    } else {
        CheckResult::new(
            "platform_transport",
            CheckStatus::Fail,
            "no local socket transport on this platform",
        )
    }
}

fn worker_check(path: Option<&Path>) -> CheckResult {
    let Some(path) = path else {
        return CheckResult::new(
            "worker",
            CheckStatus::Fail,
            "worker folder could not be determined",
        );
    };

    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && is_executable(&meta) => CheckResult::new(
            "worker",
            CheckStatus::Pass,
            format!("{} is executable", path.display()),
        ),
        Ok(_) => CheckResult::new(
            "worker",
            CheckStatus::Fail,
            format!("{} is not an executable file", path.display()),
        ),
        Err(err) => CheckResult::new(
            "worker",
            CheckStatus::Fail,
            format!("{}: {err}", path.display()),
        ),
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

fn runtime_dir_check() -> CheckResult {
    let dir = runtime_dir();

    #[cfg(unix)]
    {
        use songproc_transport::UnixDomainSocket;

        let probe = dir.join(format!("songproc-doctor-{}.sock", std::process::id()));
        match UnixDomainSocket::bind(&probe) {
            Ok(_socket) => CheckResult::new(
                "runtime_dir",
                CheckStatus::Pass,
                format!("socket bind in {} succeeded", dir.display()),
            ),
            Err(err) => CheckResult::new(
                "runtime_dir",
                CheckStatus::Fail,
                format!("socket bind in {} failed: {err}", dir.display()),
            ),
        }
    }

    #[cfg(not(unix))]
    {
        CheckResult::new(
            "runtime_dir",
            CheckStatus::Skip,
            format!("{} (socket check unavailable)", dir.display()),
        )
    }
}

fn socket_path_check() -> CheckResult {
    let path = socket_path(SERVICE_ID);

    #[cfg(unix)]
    {
        match songproc_transport::UnixDomainSocket::check_path(&path) {
            Ok(()) => CheckResult::new(
                "socket_path",
                CheckStatus::Pass,
                path.display().to_string(),
            ),
            Err(err) => CheckResult::new("socket_path", CheckStatus::Fail, err.to_string()),
        }
    }

    #[cfg(not(unix))]
    {
        CheckResult::new("socket_path", CheckStatus::Info, path.display().to_string())
    }
}

fn binding_check() -> CheckResult {
    let config = ServiceConfig::default();
    CheckResult::new(
        "binding",
        CheckStatus::Info,
        format!(
            "{PROTOCOL_SEQUENCE}:[{SERVICE_ID}], {} probes every {:?}",
            config.ready_max_attempts, config.ready_poll_interval
        ),
    )
}
