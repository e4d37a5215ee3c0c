//! Binary entry point: parses [`cli::Cli`], dispatches to `core`, and maps
//! any [`core::error::CoreError`] to a process exit code (§6).

use bloom_intent::cli::{
    Cli, Command, IntentCommand, IntentKindArg, LockCommand, ResponseCommand,
};
use bloom_intent::core::error::CoreError;
use bloom_intent::core::model::IntentKind;
use bloom_intent::core::{
    lock, locator, merge, output, protocol, recovery, response, staging, state_store, submit,
    transport, validator,
};

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

impl From<IntentKindArg> for IntentKind {
    fn from(value: IntentKindArg) -> Self {
        match value {
            IntentKindArg::Dev => IntentKind::Dev,
            IntentKindArg::Doc => IntentKind::Doc,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("bloom: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn project_root(explicit: &Option<PathBuf>) -> Result<PathBuf, CoreError> {
    match explicit {
        Some(dir) => Ok(locator::locate_at(dir)?.path().to_path_buf()),
        None => {
            let cwd = std::env::current_dir().map_err(|e| CoreError::io(".", e))?;
            Ok(locator::locate(&cwd)?.path().to_path_buf())
        }
    }
}

fn pipeline_response_dir(intent_dir: &Path, stage: &str) -> PathBuf {
    intent_dir.join(".pipeline").join(format!(".{}", stage)).join(".response")
}

fn run(cli: Cli) -> Result<(), CoreError> {
    match cli.command {
        Command::Version => {
            println!("bloom {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        Command::Init { dir } => {
            let target = dir.unwrap_or(std::env::current_dir().map_err(|e| CoreError::io(".", e))?);
            let bloom_dir = target.join(".bloom").join(".intents");
            for sub in [".dev", ".doc"] {
                std::fs::create_dir_all(bloom_dir.join(sub)).map_err(|e| CoreError::io(&bloom_dir, e))?;
            }
            println!("initialized .bloom at {}", target.display());
            Ok(())
        }

        Command::Intent(intent_cli) => run_intent(intent_cli.command, &cli.root),

        Command::Lock(lock_cli) => {
            let project = project_root(&cli.root)?;
            let project = locator::locate_at(&project)?;
            match lock_cli.command {
                LockCommand::Acquire {
                    id,
                    operation,
                    recovery_data,
                } => {
                    let intent = locator::locate_intent(&project, &id)?;
                    let data = recovery_data
                        .map(|s| serde_json::from_str(&s))
                        .transpose()
                        .map_err(|e| CoreError::InvalidState(format!("invalid --recovery-data: {}", e)))?;
                    lock::acquire(&intent.path, intent.kind, &operation, data)?;
                    println!("locked {} (operation={})", id, operation);
                    Ok(())
                }
                LockCommand::Release { id, force } => {
                    let intent = locator::locate_intent(&project, &id)?;
                    lock::release(&intent.path, intent.kind, force)?;
                    println!("released {}", id);
                    Ok(())
                }
            }
        }

        Command::Submit(submit_cli) => {
            let project = project_root(&cli.root)?;
            let project = locator::locate_at(&project)?;
            let intent = locator::locate_intent(&project, &submit_cli.id)?;
            let payload_bytes = std::fs::read(&submit_cli.payload)
                .map_err(|e| CoreError::io(&submit_cli.payload, e))?;
            let payload = serde_json::from_slice(&payload_bytes)
                .map_err(|e| CoreError::InvalidState(e.to_string()))?;
            let state = state_store::load(&intent.path, intent.kind)?;
            let req = submit::SubmitRequest {
                intent_uuid: state.uuid.clone(),
                provider: submit_cli.provider,
                payload,
                profile: submit_cli.profile,
            };
            let timeout = submit_cli
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(submit::DEFAULT_CONNECT_TIMEOUT);
            let port = submit_cli.port.unwrap_or(transport::DEFAULT_PORT);
            submit::submit(&intent.path, intent.kind, &submit_cli.host, port, &req, timeout)?;
            println!("submitted {} to {}", submit_cli.id, req.provider);
            Ok(())
        }

        Command::Response(response_cli) => {
            let project = project_root(&cli.root)?;
            let project = locator::locate_at(&project)?;
            match response_cli.command {
                ResponseCommand::Listen {
                    id,
                    stage,
                    host,
                    port,
                    accept_timeout_secs,
                } => {
                    let intent = locator::locate_intent(&project, &id)?;
                    let response_dir = pipeline_response_dir(&intent.path, &stage);
                    let timeout = accept_timeout_secs
                        .map(Duration::from_secs)
                        .unwrap_or(response::DEFAULT_ACCEPT_TIMEOUT);
                    let port = port.unwrap_or(transport::RESPONSE_PORT);
                    let envelope = response::receive_socket(&host, port, timeout)?;
                    response::persist_raw_output(&response_dir, &envelope)?;
                    let report = response::extract_files(&response_dir, &envelope)?;
                    println!(
                        "received response for {}: {} files written, {} missing",
                        id,
                        report.written.len(),
                        report.missing.len()
                    );
                    Ok(())
                }
                ResponseCommand::FromFile { id, stage, path } => {
                    let intent = locator::locate_intent(&project, &id)?;
                    let response_dir = pipeline_response_dir(&intent.path, &stage);
                    let envelope = response::receive_file(&path)?;
                    response::persist_raw_output(&response_dir, &envelope)?;
                    let report = response::extract_files(&response_dir, &envelope)?;
                    println!(
                        "loaded response for {}: {} files written, {} missing",
                        id,
                        report.written.len(),
                        report.missing.len()
                    );
                    Ok(())
                }
            }
        }

        Command::Stage(stage_cli) => {
            let project = project_root(&cli.root)?;
            let project = locator::locate_at(&project)?;
            let intent = locator::locate_intent(&project, &stage_cli.id)?;
            let state = state_store::load(&intent.path, intent.kind)?;
            let response_dir = pipeline_response_dir(&intent.path, &stage_cli.stage);
            let manifest = staging::stage(
                &response_dir,
                &state.uuid,
                &stage_cli.stage,
                stage_cli.overwrite,
                stage_cli.dry_run,
            )?;
            println!(
                "staged {}: {} files, {} bytes",
                stage_cli.id, manifest.total_files, manifest.total_size_bytes
            );
            Ok(())
        }

        Command::Validate(validate_cli) => {
            let project = project_root(&cli.root)?;
            let project = locator::locate_at(&project)?;
            let intent = locator::locate_intent(&project, &validate_cli.id)?;
            let response_dir = pipeline_response_dir(&intent.path, &validate_cli.stage);
            let staging_dir = response_dir.join(".staging");
            let manifest_path = staging_dir.join(".staging_manifest.json");
            let manifest_bytes =
                std::fs::read(&manifest_path).map_err(|e| CoreError::io(&manifest_path, e))?;
            let manifest = serde_json::from_slice(&manifest_bytes)
                .map_err(|e| CoreError::InvalidState(e.to_string()))?;
            let report = validator::validate(&staging_dir, &manifest, None, true, validate_cli.auto_approve)?;
            validator::write_report(&response_dir, &report)?;
            println!(
                "validated {}: ready_for_merge={} issues={}",
                validate_cli.id,
                report.ready_for_merge,
                report.basic.issues.len()
            );
            Ok(())
        }

        Command::Parse(parse_cli) => {
            let bytes = std::fs::read(&parse_cli.path).map_err(|e| CoreError::io(&parse_cli.path, e))?;
            let envelope = serde_json::from_slice(&bytes).map_err(|e| CoreError::InvalidProtocol(e.to_string()))?;
            let report = protocol::parse(
                &envelope,
                &parse_cli.response_dir,
                parse_cli.strict,
                &parse_cli.expected_intent_uuid,
            )?;
            println!("{}", serde_json::to_string_pretty(&report.to_json()).unwrap());
            if !report.is_valid() {
                return Err(CoreError::InvalidProtocol(report.errors.join("; ")));
            }
            Ok(())
        }

        Command::Merge(merge_cli) => {
            let project = project_root(&cli.root)?;
            let project_handle = locator::locate_at(&project)?;
            let intent = locator::locate_intent(&project_handle, &merge_cli.id)?;
            let response_dir = pipeline_response_dir(&intent.path, &merge_cli.stage);
            let staging_dir = response_dir.join(".staging");
            let manifest_path = staging_dir.join(".staging_manifest.json");
            let manifest_bytes =
                std::fs::read(&manifest_path).map_err(|e| CoreError::io(&manifest_path, e))?;
            let manifest = serde_json::from_slice(&manifest_bytes)
                .map_err(|e| CoreError::InvalidState(e.to_string()))?;

            let report_path = response_dir.join(".report.json");
            let report = std::fs::read(&report_path)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok());

            let opts = merge::MergeOptions {
                force: merge_cli.force,
                dry_run: merge_cli.dry_run,
                no_backup: merge_cli.no_backup,
            };
            let outcome = merge::merge(
                &project,
                &intent.path,
                intent.kind,
                &staging_dir,
                &manifest,
                report.as_ref(),
                &merge_cli.stage,
                &opts,
            )?;
            println!(
                "merged {}: {} files merged, {} errors, backup={:?}",
                merge_cli.id,
                outcome.files_merged,
                outcome.errors.len(),
                outcome.backup_dir
            );
            if !outcome.errors.is_empty() {
                eprintln!("bloom: {}", output::preview_messages(&outcome.errors, 5, 120));
            }
            Ok(())
        }

        Command::Recover(recover_cli) => {
            let project = project_root(&cli.root)?;
            let project_handle = locator::locate_at(&project)?;
            match recover_cli.id {
                Some(id) => {
                    let intent = locator::locate_intent(&project_handle, &id)?;
                    let outcome = recovery::recover_one(&intent.path, intent.kind, recover_cli.force_unlock)?;
                    println!("recovered {}: {:?}", id, outcome);
                    Ok(())
                }
                None => {
                    let summary =
                        recovery::recover_all(&project_handle.bloom_dir().join(".intents"), recover_cli.force_unlock)?;
                    println!(
                        "recovered {} intents, {} failures",
                        summary.recovered.len(),
                        summary.failed.len()
                    );
                    if !summary.failed.is_empty() {
                        let messages: Vec<String> = summary
                            .failed
                            .iter()
                            .map(|(path, err)| format!("{}: {}", path.display(), err))
                            .collect();
                        eprintln!("bloom: {}", output::preview_messages(&messages, 5, 120));
                    }
                    Ok(())
                }
            }
        }

        Command::Ping(ping_cli) => {
            let timeout = ping_cli
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(500));
            let result = transport::ping_native_host(&ping_cli.host, timeout)?;
            println!(
                "native host on {}:{} ({} ms)",
                ping_cli.host, result.port, result.response_time_ms
            );
            Ok(())
        }
    }
}

fn run_intent(command: IntentCommand, root: &Option<PathBuf>) -> Result<(), CoreError> {
    let project = project_root(root)?;
    let project = locator::locate_at(&project)?;

    match command {
        IntentCommand::Create { kind, name, files } => {
            let kind: IntentKind = kind.into();
            let intents_dir = project.intents_dir(kind);
            std::fs::create_dir_all(&intents_dir).map_err(|e| CoreError::io(&intents_dir, e))?;
            let (dir, state) = state_store::create(&intents_dir, kind, &name, files)?;
            println!("created intent {} at {}", state.uuid, dir.display());
            Ok(())
        }

        IntentCommand::List { kind } => {
            let kinds = match kind {
                Some(k) => vec![k.into()],
                None => vec![IntentKind::Dev, IntentKind::Doc],
            };
            for kind in kinds {
                let dir = project.intents_dir(kind);
                let Ok(entries) = std::fs::read_dir(&dir) else {
                    continue;
                };
                for entry in entries.flatten() {
                    let path = entry.path();
                    if !path.is_dir() {
                        continue;
                    }
                    if let Ok(state) = state_store::load(&path, kind) {
                        println!(
                            "{}\t{}\t{}\t{}",
                            entry.file_name().to_string_lossy(),
                            state.uuid,
                            kind.as_str(),
                            state.name
                        );
                    }
                }
            }
            Ok(())
        }

        IntentCommand::Status { id } => {
            let intent = locator::locate_intent(&project, &id)?;
            let state = state_store::load(&intent.path, intent.kind)?;
            println!("{}", serde_json::to_string_pretty(&state).unwrap());
            Ok(())
        }

        IntentCommand::Delete { id, force } => {
            let intent = locator::locate_intent(&project, &id)?;
            state_store::delete(&intent.path, intent.kind, force)?;
            println!("deleted {}", id);
            Ok(())
        }
    }
}
