use nutpipe_core::context::{Context, save_all};
use nutpipe_core::dao::DiskNutDao;
use std::path::Path;
use tracing::info;

pub fn run(config: &Path, workflow: &str, out: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let context = crate::load_context(config)?;
    execute(&context, workflow, out)
}

/// Runs `workflow` once and reports what it produced.
pub(crate) fn execute(
    context: &Context,
    workflow: &str,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = context.process_with_stats(workflow)?;

    info!(
        "Workflow '{}' produced {} nut(s) (heap {:?}, chain {:?})",
        workflow,
        outcome.nuts.len(),
        outcome.heap_resolution,
        outcome.chain_execution
    );
    for (engine, elapsed) in &outcome.engines {
        info!("  engine {:<16} {:?}", engine, elapsed);
    }
    for nut in &outcome.nuts {
        info!(
            " - {} [{}] version {} ({} referenced)",
            nut.name(),
            nut.nut_type(),
            nut.version_number()?,
            nut.referenced_nuts().len()
        );
    }

    if let Some(dir) = out {
        std::fs::create_dir_all(dir)?;
        let store = DiskNutDao::at(dir)?;
        let written = save_all(store.as_ref(), &outcome.nuts)?;
        info!("Wrote {} file(s) to {}", written, dir.display());
    }
    Ok(())
}
