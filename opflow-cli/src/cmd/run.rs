use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use opflow_core::Preset;
use opflow_exec::coordinator::DEFAULT_MAX_CONCURRENT;
use opflow_exec::{Coordinator, ErrorInfo, Operation, ProgressEvent, UploadOperation};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::exit_codes;
use crate::manifest::{Manifest, ManifestError, OperationKind, OperationEntry};
use crate::output::{print_error, print_line, print_result, OutputFormat};
use crate::{OutputArgs, RunArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum EventKind {
    PreLoad,
    PostLoad,
    Progress,
    Success,
    Failure,
    Fatal,
    Abort,
    AfterLoad,
}

impl EventKind {
    fn as_str(self) -> &'static str {
        match self {
            EventKind::PreLoad => "pre_load",
            EventKind::PostLoad => "post_load",
            EventKind::Progress => "progress",
            EventKind::Success => "success",
            EventKind::Failure => "failure",
            EventKind::Fatal => "fatal",
            EventKind::Abort => "abort",
            EventKind::AfterLoad => "after_load",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EventLine {
    id: String,
    event: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<JsonValue>,
}

impl EventLine {
    fn render_text(&self) -> String {
        let mut line = format!("[{}] {}", self.id, self.event.as_str());
        if let Some(status) = self.status {
            line.push_str(&format!(" {status}"));
        }
        if let Some(percent) = self.percent {
            line.push_str(&format!(" {percent}%"));
        }
        if let Some(message) = &self.message {
            line.push_str(&format!(": {message}"));
        }
        if let Some(body) = &self.body {
            line.push_str(&format!(" {body}"));
        }
        line
    }
}

/// Turns lifecycle callbacks of one operation into `EventLine`s.
#[derive(Clone)]
struct EventSink {
    id: String,
    tx: mpsc::UnboundedSender<EventLine>,
}

impl EventSink {
    fn line(&self, event: EventKind) -> EventLine {
        EventLine {
            id: self.id.clone(),
            event,
            status: None,
            percent: None,
            message: None,
            body: None,
        }
    }

    fn emit(&self, line: EventLine) {
        // The receiver only goes away once the run is over.
        let _ = self.tx.send(line);
    }

    fn hook(&self, event: EventKind) -> impl FnMut() + Send + 'static {
        let sink = self.clone();
        move || sink.emit(sink.line(event))
    }

    fn body(&self, event: EventKind) -> impl FnMut(JsonValue, u16) + Send + 'static {
        let sink = self.clone();
        move |body, status| {
            sink.emit(EventLine {
                status: Some(status),
                body: Some(body),
                ..sink.line(event)
            })
        }
    }

    fn fatal(&self) -> impl FnMut(ErrorInfo) + Send + 'static {
        let sink = self.clone();
        move |info| {
            sink.emit(EventLine {
                status: info.code,
                message: Some(info.message),
                ..sink.line(EventKind::Fatal)
            })
        }
    }

    fn progress(&self) -> impl FnMut(u8, &ProgressEvent) + Send + 'static {
        let sink = self.clone();
        move |percent, _event: &ProgressEvent| {
            sink.emit(EventLine {
                percent: Some(percent),
                ..sink.line(EventKind::Progress)
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Succeeded,
    Failed,
    Fatal,
    Aborted,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    run_id: String,
    total: usize,
    succeeded: usize,
    failed: usize,
    fatal: usize,
    aborted: usize,
    interrupted: bool,
    outcomes: BTreeMap<String, Outcome>,
}

pub async fn run_cmd(path: &Path, output: OutputArgs, run: RunArgs) -> i32 {
    let (manifest, _) = match Manifest::load(path) {
        Ok(v) => v,
        Err(e @ ManifestError::Read { .. }) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::RUNTIME_ERROR;
        }
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::VALIDATION_FAILED;
        }
    };

    let errors = manifest.validate(run.preset);
    if !errors.is_empty() {
        for e in &errors {
            print_error(output.format, output.quiet, e);
        }
        return exit_codes::VALIDATION_FAILED;
    }

    let run_id = Uuid::new_v4().to_string();
    let preset = manifest.default_preset(run.preset);
    let max_concurrent = run
        .max_concurrent
        .map(NonZeroUsize::get)
        .or(manifest.max_concurrent)
        .unwrap_or(DEFAULT_MAX_CONCURRENT);

    let done = Arc::new(Notify::new());
    let session_done = done.clone();
    let coordinator = Coordinator::builder()
        .max_concurrent(max_concurrent)
        .post_session(move || session_done.notify_one())
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel();
    for entry in &manifest.operations {
        if let Err(message) = register(&coordinator, entry, preset, &tx) {
            coordinator.close();
            print_error(output.format, output.quiet, &format!("{}: {message}", entry.id));
            return exit_codes::VALIDATION_FAILED;
        }
    }
    drop(tx);

    tracing::info!(
        run_id = %run_id,
        operations = manifest.operations.len(),
        max_concurrent,
        preset = %preset,
        "starting run"
    );
    coordinator.start();

    let mut outcomes: BTreeMap<String, Outcome> = BTreeMap::new();
    let mut interrupted = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(line) = rx.recv() => record(&output, &mut outcomes, line),
            _ = done.notified() => break,
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::warn!(run_id = %run_id, "interrupted; closing active operations");
                coordinator.close();
            }
        }
    }
    while let Ok(line) = rx.try_recv() {
        record(&output, &mut outcomes, line);
    }

    let summary = summarize(run_id, &manifest, outcomes, interrupted);
    if output.format == OutputFormat::Text && !output.quiet {
        println!(
            "run {}: {} succeeded, {} failed, {} fatal, {} aborted",
            summary.run_id, summary.succeeded, summary.failed, summary.fatal, summary.aborted
        );
    } else {
        print_result(output.format, output.quiet, &summary);
    }

    if summary.succeeded == summary.total {
        exit_codes::SUCCESS
    } else {
        exit_codes::RUN_FAILED
    }
}

fn record(output: &OutputArgs, outcomes: &mut BTreeMap<String, Outcome>, line: EventLine) {
    let outcome = match line.event {
        EventKind::Success => Some(Outcome::Succeeded),
        EventKind::Failure => Some(Outcome::Failed),
        EventKind::Fatal => Some(Outcome::Fatal),
        EventKind::Abort => Some(Outcome::Aborted),
        _ => None,
    };
    if let Some(outcome) = outcome {
        outcomes.insert(line.id.clone(), outcome);
    }
    print_line(output.format, output.quiet, &line, || line.render_text());
}

fn summarize(
    run_id: String,
    manifest: &Manifest,
    mut outcomes: BTreeMap<String, Outcome>,
    interrupted: bool,
) -> RunSummary {
    // Anything that never reported an outcome was closed before it finished.
    for entry in &manifest.operations {
        outcomes.entry(entry.id.clone()).or_insert(Outcome::Aborted);
    }
    let count = |o: Outcome| outcomes.values().filter(|v| **v == o).count();
    RunSummary {
        run_id,
        total: manifest.operations.len(),
        succeeded: count(Outcome::Succeeded),
        failed: count(Outcome::Failed),
        fatal: count(Outcome::Fatal),
        aborted: count(Outcome::Aborted),
        interrupted,
        outcomes,
    }
}

fn register(
    coordinator: &Coordinator,
    entry: &OperationEntry,
    preset: Preset,
    tx: &mpsc::UnboundedSender<EventLine>,
) -> Result<(), String> {
    let sink = EventSink {
        id: entry.id.clone(),
        tx: tx.clone(),
    };
    match entry.kind {
        OperationKind::Request => {
            let op = build_request(entry, preset, &sink)?;
            coordinator.add(entry.id.clone(), op).map_err(|e| e.to_string())
        }
        OperationKind::Upload => {
            let op = build_upload(entry, preset, &sink)?;
            coordinator.add(entry.id.clone(), op).map_err(|e| e.to_string())
        }
    }
}

fn build_request(entry: &OperationEntry, preset: Preset, sink: &EventSink) -> Result<Operation, String> {
    let mut builder = Operation::builder(&entry.url).policy(entry.request_policy(preset));
    if let Some(method) = &entry.method {
        builder = builder.method(method.to_ascii_uppercase());
    }
    if let Some(body) = &entry.body {
        builder = builder.json(body);
    }
    if let Some(content_type) = &entry.content_type {
        builder = builder.header("Content-Type", content_type);
    }
    for (name, value) in &entry.headers {
        builder = builder.header(name, value);
    }
    if let Some(poll_while) = entry.poll_while.clone() {
        builder = builder.should_poll(move |body, _status| poll_while.matches(body));
    }

    builder
        .on_pre_load(sink.hook(EventKind::PreLoad))
        .on_post_load(sink.hook(EventKind::PostLoad))
        .on_success(sink.body(EventKind::Success))
        .on_failure(sink.body(EventKind::Failure))
        .on_fatal(sink.fatal())
        .on_abort(sink.hook(EventKind::Abort))
        .on_after_load(sink.hook(EventKind::AfterLoad))
        .build()
        .map_err(|e| e.to_string())
}

fn build_upload(entry: &OperationEntry, preset: Preset, sink: &EventSink) -> Result<UploadOperation, String> {
    let mut builder = UploadOperation::builder(&entry.url)
        .policy(entry.upload_policy(preset))
        .content_type(
            entry.content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        );
    if let Some(method) = &entry.method {
        builder = builder.method(method.to_ascii_uppercase());
    }
    for (name, value) in &entry.headers {
        builder = builder.header(name, value);
    }
    if let Some(file) = &entry.file {
        builder = builder.file(file.clone());
    } else if let Some(bytes) = entry.body_bytes() {
        builder = builder.bytes(bytes);
    }

    builder
        .on_pre_load(sink.hook(EventKind::PreLoad))
        .on_post_load(sink.hook(EventKind::PostLoad))
        .on_progress(sink.progress())
        .on_success(sink.body(EventKind::Success))
        .on_failure(sink.body(EventKind::Failure))
        .on_fatal(sink.fatal())
        .on_abort(sink.hook(EventKind::Abort))
        .on_after_load(sink.hook(EventKind::AfterLoad))
        .build()
        .map_err(|e| e.to_string())
}
