use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{error, info, warn};

use vsr_core::backup::{
    BackupCycle, BackupManager, CycleReport, CycleSettings, PlayerChecker, Restic,
};
use vsr_core::config::{
    load_launcher_config, process_env, validate_restic_env, LauncherConfig, ENV_BACKUP_INTERVAL,
};
use vsr_core::error::{Result as CoreResult, VsrError};
use vsr_core::server::{CommandQueue, Server};

use crate::signal::{install_signal_handlers, received_signal_name, shutdown_requested};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

pub(crate) fn run_launcher(config_path: Option<&Path>) -> CliResult<()> {
    install_signal_handlers();

    let config = load_launcher_config(config_path)?;
    let interval = config.backup.interval_duration()?;
    let grace = config.server.shutdown_grace_duration()?;

    match interval {
        Some(interval) => {
            validate_restic_env(process_env)?;
            info!(
                interval = ?interval,
                on_server_start = config.backup.on_server_start,
                pause_when_no_players = config.backup.pause_when_no_players,
                prune = config.backup.retention().unwrap_or("off"),
                "backups enabled"
            );
        }
        None => warn!("{ENV_BACKUP_INTERVAL} not set, periodic backups are disabled"),
    }

    let players = (interval.is_some() && config.backup.pause_when_no_players)
        .then(|| Arc::new(PlayerChecker::new()));

    let (boot_tx, boot_rx) = bounded::<()>(1);
    let console_players = players.clone();
    let server = Arc::new(
        Server::new(&config.server.program, config.server.command_args())
            .working_dir(&config.server.working_dir)
            .on_output(Arc::new(move |line: &str| {
                println!("{line}");
                if let Some(players) = &console_players {
                    players.handle_output(line);
                }
            }))
            .on_boot(Arc::new(move || {
                let _ = boot_tx.try_send(());
            })),
    );

    let queue = Arc::new(
        CommandQueue::new(server.clone())
            .with_min_delay(config.server.command_delay())
            .on_error(Arc::new(|command: &str, err: Option<&VsrError>| {
                if let Some(e) = err {
                    warn!(command, error = %e, "failed to send command");
                }
            })),
    );

    let manager = match interval {
        Some(interval) => Some(Arc::new(build_manager(
            &config,
            interval,
            &server,
            &queue,
            players.clone(),
        )?)),
        None => None,
    };

    queue.start()?;
    info!(program = %config.server.program, "starting Vintage Story server");
    server.start()?;

    if let Some(manager) = &manager {
        manager.start()?;
        if config.backup.on_server_start {
            spawn_boot_backup(manager.clone(), boot_rx)?;
        }
    }

    let stdin_queue = queue.clone();
    std::thread::Builder::new()
        .name("stdin-relay".into())
        .spawn(move || forward_stdin(&stdin_queue))?;

    let done = server.done();
    let exited_on_its_own = loop {
        if shutdown_requested() {
            break false;
        }
        match done.recv_timeout(POLL_INTERVAL) {
            Err(RecvTimeoutError::Disconnected) => break true,
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
        }
    };

    if exited_on_its_own {
        if let Some(manager) = &manager {
            manager.stop();
        }
        queue.stop();
        return match server.exit_status() {
            Some(status) if status.success() => {
                info!("server exited cleanly");
                Ok(())
            }
            Some(status) => Err(format!("server exited with {status}").into()),
            None => Err("server exited with unknown status".into()),
        };
    }

    info!(
        signal = received_signal_name(),
        grace = ?grace,
        "shutdown requested, stopping server"
    );
    server.stop();
    if let Some(manager) = &manager {
        manager.stop();
    }
    shutdown_server(&server, &done, grace);
    queue.stop();
    Ok(())
}

fn build_manager(
    config: &LauncherConfig,
    interval: Duration,
    server: &Arc<Server>,
    queue: &Arc<CommandQueue>,
    players: Option<Arc<PlayerChecker>>,
) -> CoreResult<BackupManager> {
    let mut settings = CycleSettings::new(&config.server.data_dir, &config.backup.staging_dir);
    settings.timeout = config.backup.timeout_duration()?;
    settings.pause_when_no_players = config.backup.pause_when_no_players;
    settings.prune_retention = config.backup.retention().map(str::to_string);

    let mut cycle = BackupCycle::new(settings, queue.clone())
        .with_boot_checker(server.clone())
        .with_completion_waiter(server.clone())
        .with_restic(Restic::new(config.restic.binary.as_str()));
    if let Some(players) = players {
        cycle = cycle.with_player_gate(players);
    }

    Ok(BackupManager::new(cycle, interval)
        .with_jitter_seconds(config.backup.jitter_seconds)
        .on_scheduled(Arc::new(log_next_run))
        .on_backup_start(Arc::new(|| info!("backup starting")))
        .on_backup_complete(Arc::new(report_outcome)))
}

/// Run one cycle, player gate skipped, once the server announces boot.
fn spawn_boot_backup(manager: Arc<BackupManager>, booted: Receiver<()>) -> CliResult<()> {
    std::thread::Builder::new()
        .name("boot-backup".into())
        .spawn(move || {
            if booted.recv().is_err() {
                return;
            }
            info!("server booted, running startup backup");
            let started = Instant::now();
            let outcome = manager.run_backup_now(true);
            report_outcome(&outcome, started.elapsed());
        })?;
    Ok(())
}

fn forward_stdin(queue: &CommandQueue) {
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) => {
                let command = line.trim_end();
                if !command.is_empty() {
                    queue.submit(command);
                }
            }
            Err(e) => {
                warn!(error = %e, "stopped reading console input");
                return;
            }
        }
    }
}

fn shutdown_server(server: &Server, done: &Receiver<()>, grace: Duration) {
    match done.recv_timeout(grace) {
        Err(RecvTimeoutError::Disconnected) => info!("server shutdown complete"),
        Ok(()) | Err(RecvTimeoutError::Timeout) => {
            warn!(grace = ?grace, "graceful shutdown timed out, killing server");
            server.kill();
            let _ = done.recv();
            info!("server killed");
        }
    }
}

fn report_outcome(outcome: &CoreResult<CycleReport>, took: Duration) {
    match outcome {
        Ok(report) => info!(
            save = %report.save_name,
            written = report.tree.written,
            skipped = report.tree.skipped,
            removed = report.tree.removed,
            pruned = report.pruned,
            duration = ?took,
            "backup completed"
        ),
        Err(e) if e.is_skip() => info!(reason = %e, "backup skipped"),
        Err(e) => error!(error = %e, duration = ?took, "backup failed"),
    }
}

fn log_next_run(delay: Duration) {
    let next_wall = chrono::Local::now() + delay;
    info!(
        next_run = %next_wall.format("%Y-%m-%d %H:%M:%S %Z"),
        delay = ?delay,
        "next backup scheduled"
    );
}
