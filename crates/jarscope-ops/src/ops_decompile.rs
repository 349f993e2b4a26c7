//! Stages: fetch binaries and drive the external decompiler.
//!
//! The decompiler itself is injected as a command template mapping
//! `(binary, out_dir)` to an exit status; swapping tools (or mocking them
//! in tests) means swapping the template. Services are processed by a
//! bounded worker pool; within one service artifacts run serially so a
//! host sees one connection at a time.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use jarscope_core::artifact::ArtifactKind;
use jarscope_core::layout::DecompileLayout;
use jarscope_store::{Service, Store};
use jarscope_util::errors::JarscopeError;
use jarscope_util::process::CommandBuilder;
use jarscope_util::{fs as futil, progress};

use crate::{transport_for, ServiceSelector};

const DEFAULT_JOBS: usize = 4;
const DECOMPILE_TIMEOUT: Duration = Duration::from_secs(300);

/// The injected decompilation tool: a command template where `{input}` is
/// the fetched binary and `{output}` the directory to fill with `.java`
/// files. Templates without the tokens get them appended positionally.
#[derive(Debug, Clone)]
pub struct Decompiler {
    command: Vec<String>,
    timeout: Duration,
}

impl Decompiler {
    /// Parse a whitespace-separated command template, e.g.
    /// `java -jar cfr.jar --silent true --outputdir {output} {input}`.
    pub fn from_command(command: &str) -> miette::Result<Self> {
        let command: Vec<String> = command.split_whitespace().map(|s| s.to_string()).collect();
        if command.is_empty() {
            return Err(JarscopeError::Config {
                message: "decompiler command must not be empty".to_string(),
            }
            .into());
        }
        Ok(Self {
            command,
            timeout: DECOMPILE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the tool on one binary. Non-zero exit or timeout is a
    /// [`JarscopeError::Decompile`].
    pub async fn run(&self, binary: &Path, out_dir: &Path) -> miette::Result<()> {
        let input = binary.to_string_lossy();
        let output = out_dir.to_string_lossy();

        let mut args: Vec<String> = self.command[1..]
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output))
            .collect();
        if !self.command.iter().any(|a| a.contains("{input}")) {
            args.push(input.into_owned());
        }
        if !self.command.iter().any(|a| a.contains("{output}")) {
            args.push(output.into_owned());
        }

        let result = CommandBuilder::new(&self.command[0])
            .args(args)
            .timeout(self.timeout)
            .exec()
            .await;

        match result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                Err(JarscopeError::Decompile {
                    message: format!(
                        "{} exited with {} for {}: {}",
                        self.command[0],
                        out.status,
                        binary.display(),
                        stderr.trim()
                    ),
                }
                .into())
            }
            Err(e) => Err(JarscopeError::Decompile {
                message: format!("{} failed for {}: {e}", self.command[0], binary.display()),
            }
            .into()),
        }
    }
}

/// Knobs for one decompile pass.
#[derive(Debug, Clone)]
pub struct DecompileOptions {
    /// Re-run even when output for the observation already exists.
    pub force: bool,
    /// Decompile third-party JARs too (default: internal only).
    pub include_third_party: bool,
    /// Worker pool width across services.
    pub jobs: usize,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            force: false,
            include_third_party: false,
            jobs: DEFAULT_JOBS,
        }
    }
}

/// Outcome of one decompile pass.
#[derive(Debug, Default)]
pub struct DecompileSummary {
    pub decompiled: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl DecompileSummary {
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            4
        } else {
            0
        }
    }

    fn absorb(&mut self, other: DecompileSummary) {
        self.decompiled += other.decompiled;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Fetch and decompile the selected services' JARs.
pub async fn decompile_jars(
    db_path: &Path,
    selector: &ServiceSelector,
    decompiler: Decompiler,
    opts: DecompileOptions,
) -> miette::Result<DecompileSummary> {
    run_stage(db_path, selector, decompiler, opts, ArtifactKind::Jar).await
}

/// Fetch and decompile the selected services' loose classes.
pub async fn decompile_classes(
    db_path: &Path,
    selector: &ServiceSelector,
    decompiler: Decompiler,
    opts: DecompileOptions,
) -> miette::Result<DecompileSummary> {
    run_stage(db_path, selector, decompiler, opts, ArtifactKind::Class).await
}

async fn run_stage(
    db_path: &Path,
    selector: &ServiceSelector,
    decompiler: Decompiler,
    opts: DecompileOptions,
    kind: ArtifactKind,
) -> miette::Result<DecompileSummary> {
    let store = Store::open(db_path)?;
    let services = selector.resolve(&store)?;
    drop(store);

    // Render all paths up front: a bad template is a config error for the
    // whole command, not a per-service failure.
    let mut shards = Vec::with_capacity(services.len());
    for service in services {
        let output_root = match kind {
            ArtifactKind::Jar => service.rendered_jar_output_dir()?,
            ArtifactKind::Class => service.rendered_class_output_dir()?,
        };
        let source_root = match kind {
            ArtifactKind::Jar => service.rendered_jar_path()?,
            ArtifactKind::Class => service.rendered_classes_path()?,
        };
        shards.push((service, source_root, output_root));
    }

    let decompiler = Arc::new(decompiler);
    let semaphore = Arc::new(Semaphore::new(opts.jobs.max(1)));
    let mut join_set = JoinSet::new();
    let pb = progress::progress_bar(shards.len() as u64, "Decompiling");

    for (service, source_root, output_root) in shards {
        let db_path = db_path.to_path_buf();
        let decompiler = decompiler.clone();
        let opts = opts.clone();
        let sem = semaphore.clone();
        join_set.spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore open");
            decompile_service(&db_path, &service, &source_root, &output_root, &decompiler, &opts, kind)
                .await
        });
    }

    let mut summary = DecompileSummary::default();
    while let Some(joined) = join_set.join_next().await {
        pb.inc(1);
        match joined {
            Ok(Ok(shard)) => summary.absorb(shard),
            Ok(Err(e)) => {
                pb.finish_and_clear();
                return Err(e);
            }
            Err(e) => {
                pb.finish_and_clear();
                return Err(JarscopeError::Decompile {
                    message: format!("worker panicked: {e}"),
                }
                .into());
            }
        }
    }
    pb.finish_and_clear();

    progress::status_info(
        "Done",
        &format!(
            "{} decompiled, {} skipped, {} failed",
            summary.decompiled, summary.skipped, summary.failed
        ),
    );
    Ok(summary)
}

/// Process one service's artifacts serially on this worker.
async fn decompile_service(
    db_path: &Path,
    service: &Service,
    source_root: &str,
    output_root: &str,
    decompiler: &Decompiler,
    opts: &DecompileOptions,
    kind: ArtifactKind,
) -> miette::Result<DecompileSummary> {
    let store = Store::open(db_path)?;
    let transport = transport_for(service);
    let layout = DecompileLayout::new(output_root, kind);
    let mut summary = DecompileSummary::default();

    let work: Vec<WorkItem> = match kind {
        ArtifactKind::Jar => store
            .jars_for_service(service.id)?
            .into_iter()
            .filter(|j| opts.include_third_party || !j.is_third_party)
            .map(|j| WorkItem {
                row_id: j.id,
                name: j.jar_name.clone(),
                remote_path: format!("{source_root}/{}", j.jar_name),
                retained_name: j.jar_name,
                last_modified: j.last_modified,
                decompile_path: j.decompile_path,
            })
            .collect(),
        ArtifactKind::Class => store
            .classes_for_service(service.id)?
            .into_iter()
            .map(|c| WorkItem {
                row_id: c.id,
                name: c.class_full_name.clone(),
                remote_path: format!(
                    "{source_root}/{}.class",
                    c.class_full_name.replace('.', "/")
                ),
                retained_name: format!("{}.class", c.class_full_name),
                last_modified: c.last_modified,
                decompile_path: c.decompile_path,
            })
            .collect(),
    };

    for item in work {
        let out_dir = layout.source_dir(
            &item.name,
            &item.last_modified,
            &service.service_name,
            &service.host,
        );
        let fragment = DecompileLayout::observation_fragment(
            &item.last_modified,
            &service.service_name,
            &service.host,
        );

        if !opts.force && already_decompiled(item.decompile_path.as_deref(), &fragment) {
            summary.skipped += 1;
            continue;
        }

        let retained = layout
            .retained_dir(&service.service_name, &service.host)
            .join(&item.retained_name);

        let outcome: miette::Result<()> = 'one: {
            if let Err(e) = transport.fetch(&item.remote_path, &retained).await {
                break 'one Err(e);
            }

            let retained_str = retained.to_string_lossy().into_owned();
            let set_fetched = match kind {
                ArtifactKind::Jar => store.set_jar_fetched(item.row_id, &retained_str),
                ArtifactKind::Class => store.set_class_fetched(item.row_id, &retained_str),
            };
            if let Err(e) = set_fetched {
                break 'one Err(e);
            }

            if let Err(e) = futil::ensure_dir(&out_dir).map_err(JarscopeError::Io) {
                break 'one Err(e.into());
            }
            if let Err(e) = decompiler.run(&retained, &out_dir).await {
                break 'one Err(e);
            }

            let out_str = out_dir.to_string_lossy();
            match kind {
                ArtifactKind::Jar => store.set_jar_decompiled(item.row_id, &out_str),
                ArtifactKind::Class => store.set_class_decompiled(item.row_id, &out_str),
            }
        };

        match outcome {
            Ok(()) => {
                summary.decompiled += 1;
                progress::status("Decompiled", &format!("{} ({})", item.name, service.service_name));
            }
            Err(e) => {
                summary.failed += 1;
                mark_failed(&store, kind, item.row_id)?;
                warn!(
                    service = %service.service_name,
                    artifact = %item.name,
                    error = %e,
                    "decompile failed"
                );
                progress::status_warn("Failed", &format!("{} ({e})", item.name));
            }
        }
    }
    Ok(summary)
}

struct WorkItem {
    row_id: i64,
    name: String,
    remote_path: String,
    retained_name: String,
    last_modified: chrono::DateTime<chrono::Utc>,
    decompile_path: Option<String>,
}

fn already_decompiled(decompile_path: Option<&str>, fragment: &str) -> bool {
    match decompile_path {
        Some(path) => path.contains(fragment) && futil::dir_non_empty(Path::new(path)),
        None => false,
    }
}

fn mark_failed(store: &Store, kind: ArtifactKind, row_id: i64) -> miette::Result<()> {
    match kind {
        ArtifactKind::Jar => store.set_jar_decompile_failed(row_id),
        ArtifactKind::Class => store.set_class_decompile_failed(row_id),
    }
}
