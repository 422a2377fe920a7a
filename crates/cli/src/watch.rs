use nutpipe_core::context::Context;
use nutpipe_core::dao::{NutDao, NutDaoListener};
use nutpipe_core::heap::NutsHeap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Forwards the first change of each poll cycle to the watch loop.
struct ChangeForwarder {
    tx: mpsc::UnboundedSender<String>,
}

impl NutDaoListener for ChangeForwarder {
    fn polling(&self, _pattern: &str, _paths: &HashSet<String>) -> bool {
        !self.tx.is_closed()
    }

    fn nut_polled(&self, path: &str, _marker: u64) -> bool {
        let _ = self.tx.send(path.to_string());
        false
    }
}

fn providers_of(heap: &NutsHeap, out: &mut Vec<Arc<dyn NutDao>>) {
    if let Some(dao) = heap.dao() {
        if !out.iter().any(|d| Arc::ptr_eq(d, dao)) {
            out.push(dao.clone());
        }
    }
    for nested in heap.composition() {
        providers_of(nested, out);
    }
}

async fn run_once(context: Arc<Context>, workflow: String, out: Option<PathBuf>) {
    let result = tokio::task::spawn_blocking(move || {
        crate::process::execute(&context, &workflow, out.as_deref()).map_err(|e| e.to_string())
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Run failed: {}", e),
        Err(e) => error!("Run aborted: {}", e),
    }
}

pub async fn run(
    config: PathBuf,
    workflow: String,
    interval: i64,
    out: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let context = Arc::new(crate::load_context(&config)?);
    let heap = context.workflow(&workflow)?.heap().clone();

    run_once(context.clone(), workflow.clone(), out.clone()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener: Arc<dyn NutDaoListener> = Arc::new(ChangeForwarder { tx });
    {
        // Baseline markers may come from blocking providers.
        let context = context.clone();
        let workflow = workflow.clone();
        tokio::task::spawn_blocking(move || context.observe(&workflow, &listener)).await??;
    }

    let mut providers = Vec::new();
    providers_of(&heap, &mut providers);
    for dao in &providers {
        dao.set_polling_interval(interval)?;
    }
    info!(
        "Watching {} provider(s) every {}s. Press Ctrl+C to stop.",
        providers.len(),
        interval
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.recv() => {
                let Some(path) = changed else {
                    warn!("Change notifications stopped");
                    break;
                };
                info!("'{}' changed, running '{}' again", path, workflow);
                run_once(context.clone(), workflow.clone(), out.clone()).await;
            }
        }
    }

    for dao in &providers {
        dao.shutdown();
    }
    info!("Watcher stopped.");
    Ok(())
}
