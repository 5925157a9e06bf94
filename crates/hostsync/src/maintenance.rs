// # System network maintenance
//
// Platform implementation of `NetworkMaintenance`. All platform branching
// lives here; the core never looks at the operating system.
//
// | Platform | flush DNS                                   | reset stack           |
// |----------|---------------------------------------------|-----------------------|
// | Windows  | `ipconfig /flushdns`                        | `netsh winsock reset` |
// | macOS    | `dscacheutil -flushcache`, then HUP mDNSResponder | unsupported     |
// | Linux    | `resolvectl flush-caches` (or `systemd-resolve`) | unsupported      |
//
// Commands run with the privileges of this process; hosts writes need
// elevation anyway.

use hostsync_core::traits::{MaintenanceReport, NetworkMaintenance};
use std::io;
use std::process::Command;
use tracing::{debug, warn};

/// Runs the platform's maintenance commands
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMaintenance;

impl NetworkMaintenance for SystemMaintenance {
    fn flush_dns_cache(&self) -> MaintenanceReport {
        if cfg!(windows) {
            run("ipconfig", &["/flushdns"])
        } else if cfg!(target_os = "macos") {
            match run("dscacheutil", &["-flushcache"]) {
                MaintenanceReport::Done(_) => run("killall", &["-HUP", "mDNSResponder"]),
                other => other,
            }
        } else {
            match run("resolvectl", &["flush-caches"]) {
                MaintenanceReport::Done(msg) => MaintenanceReport::Done(msg),
                first => {
                    debug!("resolvectl unavailable ({:?}), trying systemd-resolve", first);
                    run("systemd-resolve", &["--flush-caches"])
                }
            }
        }
    }

    fn reset_stack(&self) -> MaintenanceReport {
        if cfg!(windows) {
            match run("netsh", &["winsock", "reset"]) {
                MaintenanceReport::Done(msg) => {
                    MaintenanceReport::Done(format!("{msg} (reboot to take effect)"))
                }
                other => other,
            }
        } else {
            MaintenanceReport::Unsupported(
                "network stack reset is only available on Windows".to_string(),
            )
        }
    }
}

fn run(program: &str, args: &[&str]) -> MaintenanceReport {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!("Running {}", command_line);

    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => MaintenanceReport::Done(command_line),
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} failed with {}", command_line, output.status);
            MaintenanceReport::Failed(format!("{}: {}", command_line, stderr.trim()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            MaintenanceReport::Failed(format!("{} not found", program))
        }
        Err(e) => MaintenanceReport::Failed(format!("{}: {}", command_line, e)),
    }
}
