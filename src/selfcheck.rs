//! Startup self-check: verify the portal can run before serving.

use pairgate_core::{config::Config, shellexpand};
use std::path::Path;

/// Result of a single check.
struct CheckResult {
    name: String,
    detail: String,
    ok: bool,
}

/// Run all startup checks. Returns true if all passed.
pub async fn run(config: &Config) -> bool {
    let results = vec![
        check_config(config),
        check_sessions_dir(Path::new(&shellexpand(&config.sessions.dir))),
        check_port(&config.bind_addr()).await,
    ];

    println!("\nPairgate Self-Check");
    println!("===================");
    let mut all_ok = true;
    for r in &results {
        let icon = if r.ok { "+" } else { "x" };
        println!("  {icon} {}: {}", r.name, r.detail);
        if !r.ok {
            all_ok = false;
        }
    }
    println!();

    all_ok
}

fn check_config(config: &Config) -> CheckResult {
    match config.validate() {
        Ok(()) => CheckResult {
            name: "Config".to_string(),
            detail: format!(
                "ok (max_retries {}, backoff {}ms)",
                config.pairing.max_retries, config.pairing.backoff_ms
            ),
            ok: true,
        },
        Err(e) => CheckResult {
            name: "Config".to_string(),
            detail: format!("FAILED: {e}"),
            ok: false,
        },
    }
}

fn check_sessions_dir(dir: &Path) -> CheckResult {
    let name = "Sessions dir".to_string();
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult {
            name,
            detail: format!("{} (cannot create: {e})", dir.display()),
            ok: false,
        };
    }

    // Check writability with a throwaway file.
    let scratch = dir.join(".pairgate-write-check");
    match std::fs::write(&scratch, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&scratch);
            CheckResult {
                name,
                detail: format!("{} (writable)", dir.display()),
                ok: true,
            }
        }
        Err(e) => CheckResult {
            name,
            detail: format!("{} (NOT writable: {e})", dir.display()),
            ok: false,
        },
    }
}

async fn check_port(addr: &str) -> CheckResult {
    match tokio::net::TcpListener::bind(addr).await {
        Ok(_) => CheckResult {
            name: "Listener".to_string(),
            detail: format!("{addr} (available)"),
            ok: true,
        },
        Err(e) => CheckResult {
            name: "Listener".to_string(),
            detail: format!("{addr} (cannot bind: {e})"),
            ok: false,
        },
    }
}
