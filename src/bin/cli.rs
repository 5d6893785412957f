use anyhow::{anyhow, bail, Context};
use capture_engine::permissions::{check_permission_detailed, PermissionInfo};
use capture_engine::testing::{VirtualCatalog, VirtualInputFactory, VirtualSession};
use capture_engine::{
    classify_action, CaptureEngine, DeviceAccessAction, DeviceAccessResult, EngineConfig,
    EngineParts, PermissionKind, SystemAuthorization,
};
use serde::Serialize;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct StatusReport {
    #[serde(flatten)]
    info: PermissionInfo,
    action: DeviceAccessAction,
}

fn main() -> anyhow::Result<()> {
    capture_engine::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: capture-engine-cli <status|negotiate|watch|config> [args] [--json]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "status" => cmd_status(&args),
        "negotiate" => cmd_negotiate(&args),
        "watch" => cmd_watch(&args),
        "config" => cmd_config(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn status_report(kind: PermissionKind) -> StatusReport {
    let info = check_permission_detailed(kind);
    let action = classify_action(&DeviceAccessResult::new(kind, info.status.into()));
    StatusReport { info, action }
}

fn cmd_status(args: &[String]) -> anyhow::Result<()> {
    let reports: Vec<_> = PermissionKind::ALL.into_iter().map(status_report).collect();
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&reports)?);
    } else {
        for r in reports {
            println!("{}: {} -> {} ({})", r.info.kind, r.info.status, r.action, r.info.message);
        }
    }
    Ok(())
}

/// Dry run: real authorization status, in-memory session and devices.
fn cmd_negotiate(args: &[String]) -> anyhow::Result<()> {
    let kind: PermissionKind = args
        .get(2)
        .ok_or_else(|| anyhow!("Usage: capture-engine-cli negotiate <camera|microphone> [--json]"))?
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    let engine = CaptureEngine::new(
        EngineConfig::default(),
        EngineParts {
            session: Box::new(VirtualSession::new()),
            authorization: Arc::new(SystemAuthorization),
            input_factory: Arc::new(VirtualInputFactory::default()),
            catalog: Arc::new(VirtualCatalog::standard()),
        },
    )?;

    let negotiation = engine.negotiate(kind)?;
    let action = negotiation.suggested_action();
    let outcome = negotiation
        .resume(action.clone())?
        .wait()
        .context("negotiation did not complete")?;

    if args.contains(&"--json".to_string()) {
        println!(
            "{}",
            serde_json::json!({
                "result": negotiation.result(),
                "action": action,
                "outcome": outcome,
            })
        );
    } else {
        println!("result:  {}", negotiation.result());
        println!("action:  {}", action);
        println!("outcome: {:?}", outcome);
    }

    engine.shutdown()?;
    Ok(())
}

fn cmd_watch(args: &[String]) -> anyhow::Result<()> {
    let mut interval_ms: u64 = 1000;
    let mut i = 2;
    while i < args.len() {
        if args[i] == "--interval" {
            i += 1;
            interval_ms = args
                .get(i)
                .ok_or_else(|| anyhow!("--interval needs a value"))?
                .parse()?;
        }
        i += 1;
    }
    if interval_ms == 0 {
        bail!("--interval must be greater than zero");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    let mut last = None;
    while running.load(Ordering::SeqCst) {
        let current: Vec<_> = PermissionKind::ALL
            .into_iter()
            .map(|kind| (kind, check_permission_detailed(kind).status))
            .collect();
        if last.as_ref() != Some(&current) {
            for (kind, status) in &current {
                println!("{} {}: {}", chrono::Local::now().format("%H:%M:%S"), kind, status);
            }
            last = Some(current);
        }
        std::thread::sleep(Duration::from_millis(interval_ms));
    }
    Ok(())
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let config = match args.get(2).filter(|a| !a.starts_with("--")) {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_or_default(),
    };
    config.validate().map_err(|e| anyhow!(e))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
