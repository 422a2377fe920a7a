use nutpipe_core::heap::NutsHeap;
use std::path::Path;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct WorkflowRow {
    #[tabled(rename = "Workflow")]
    id: String,
    #[tabled(rename = "Heap")]
    heap: String,
    #[tabled(rename = "Paths")]
    paths: usize,
    #[tabled(rename = "Engines")]
    engines: String,
}

fn count_paths(heap: &NutsHeap) -> usize {
    heap.paths().len() + heap.composition().iter().map(|h| count_paths(h)).sum::<usize>()
}

pub fn run(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let context = crate::load_context(config)?;

    let mut rows = Vec::new();
    for id in context.workflow_ids() {
        let workflow = context.workflow(id)?;
        rows.push(WorkflowRow {
            id: id.to_string(),
            heap: workflow.heap().id().to_string(),
            paths: count_paths(workflow.heap()),
            engines: workflow.chain().kinds().join(" > "),
        });
    }

    if rows.is_empty() {
        println!("No workflow declared in {}", config.display());
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}
