//! Markup inspection.
//!
//! Scripts, stylesheets and images declared in an HTML nut are collected into heaps, run
//! through the workflow's chains and replaced by references to the produced nuts:
//!
//! ```text
//! <link href="a.css">                       <link ... href="/wf/<v>/<heap>/aggregate.css" />
//! <style>body{}</style>          ===>       <script ... src="/wf/<v>/<heap>/b.js"></script>
//! <script src="b.js"></script>
//! ```

mod parser;

pub use parser::{MarkupParser, Statement, StatementKind, Target};

use super::{Engine, EngineRequest, EngineType, Next};
use crate::dao::{NutDao, ProxyNutDao};
use crate::error::{NutpipeError, Result};
use crate::heap::NutsHeap;
use crate::nut::{Nut, NutBuilder, NutType};
use crate::util::{file_name, hex_digest, merge_path, parent_of, simplify_path};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    pub inspect: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self { inspect: true }
    }
}

/// Statements of one group that resolved to a path, with the heap built from those paths.
struct CapturedGroup {
    statements: Vec<Statement>,
    heap: Arc<NutsHeap>,
}

pub struct HtmlInspectorEngine {
    enabled: bool,
    parser: MarkupParser,
}

impl HtmlInspectorEngine {
    pub fn new(config: InspectorConfig) -> Result<Self> {
        Ok(Self {
            enabled: config.inspect,
            parser: MarkupParser::new()?,
        })
    }

    /// Rewrites one markup nut. The result references every nut produced for it.
    pub fn transform(&self, nut: &Arc<Nut>, request: &EngineRequest) -> Result<Arc<Nut>> {
        let start = Instant::now();
        let markup = nut.read_string()?;
        let delegate = request.heap().find_dao_for(nut.name()).ok_or_else(|| {
            NutpipeError::BadState(format!(
                "heap '{}' has no provider for {}",
                request.heap().id(),
                nut.name()
            ))
        })?;
        // References are relative to the page as the provider sees it.
        let page = delegate.path_of(nut.name());
        let proxy = Arc::new(ProxyNutDao::new(parent_of(&page), delegate));
        let groups = self.capture(&page, &markup, &proxy)?;

        let mut rewritten = String::with_capacity(markup.len());
        let mut cursor = 0;
        let mut referenced = nut.referenced_nuts();

        for group in groups {
            let produced = self.resolve_group(&group, request)?;
            let mut html = String::new();
            for n in &produced {
                html.push_str(&render(n, request)?);
            }

            for (i, statement) in group.statements.iter().enumerate() {
                rewritten.push_str(&markup[cursor..statement.range.start]);
                if i == 0 {
                    rewritten.push_str(&html);
                }
                cursor = statement.range.end;
            }
            referenced.extend(produced);
        }
        rewritten.push_str(&markup[cursor..]);

        let result = NutBuilder::derived(nut)
            .bytes(rewritten.into_bytes())
            .referenced(referenced)
            .build()?;
        info!("HTML transformation of {} in {:?}", nut.name(), start.elapsed());
        Ok(result)
    }

    /// Scans `markup` and turns each group into a heap over `proxy`. Inline content is
    /// pinned in the proxy under a synthetic name.
    fn capture(&self, name: &str, markup: &str, proxy: &Arc<ProxyNutDao>) -> Result<Vec<CapturedGroup>> {
        let root = parent_of(name);
        let base = file_name(name);
        let mut captured = Vec::new();

        for (group_no, group) in self.parser.scan(markup).into_iter().enumerate() {
            let mut statements = Vec::new();
            let mut paths: Vec<String> = Vec::new();

            for statement in group {
                let relative = match statement.target(markup) {
                    None => continue,
                    Some(Target::Path(path)) => path.trim_start_matches('/').to_string(),
                    Some(Target::Inline { content, nut_type }) => {
                        let inline_name = format!(
                            "{base}-{group_no}-{}{}",
                            paths.len(),
                            nut_type.extension()
                        );
                        let full = merge_path(&[root, inline_name.as_str()]);
                        let inline = Nut::from_bytes(full, nut_type, content.into_bytes());
                        proxy.add_nut_rule(&inline_name, inline);
                        inline_name
                    }
                };
                let merged = merge_path(&[root, relative.as_str()]);
                let simplified = simplify_path(&merged).map_err(|_| {
                    NutpipeError::bad_argument(format!(
                        "{merged} does not represent a reachable path"
                    ))
                })?;
                paths.push(simplified);
                statements.push(statement);
            }

            if statements.is_empty() {
                continue;
            }
            let heap_id = hex_digest(paths.join("\n").as_bytes());
            debug!("{}: group {} captured {:?} as heap {}", name, group_no, paths, heap_id);
            let dao: Arc<dyn NutDao> = proxy.clone();
            captured.push(CapturedGroup {
                statements,
                heap: Arc::new(NutsHeap::of(heap_id, dao, paths)),
            });
        }
        Ok(captured)
    }

    /// Runs the group's heap through the chains, without caching, and prefixes every
    /// produced name with the heap id.
    fn resolve_group(&self, group: &CapturedGroup, request: &EngineRequest) -> Result<Vec<Arc<Nut>>> {
        let nuts = group.heap.resolve()?;
        if nuts.is_empty() {
            warn!("Heap {} resolved no nut, its statements are dropped", group.heap.id());
            return Ok(Vec::new());
        }
        let nested = request.nested(group.heap.clone(), nuts, [EngineType::Cache]);
        request
            .chains()
            .run(&nested)?
            .iter()
            .map(|n| {
                n.renamed(merge_path(&[group.heap.id(), n.name()]))?
                    .materialize()
            })
            .collect()
    }
}

impl Engine for HtmlInspectorEngine {
    fn kind(&self) -> &'static str {
        "html-inspector"
    }

    fn category(&self) -> EngineType {
        EngineType::Inspector
    }

    fn applicable_types(&self) -> &[NutType] {
        &[NutType::Html]
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn process(&self, request: &EngineRequest, next: Next<'_>) -> Result<Vec<Arc<Nut>>> {
        let inspected = request
            .nuts()
            .iter()
            .map(|nut| {
                if nut.nut_type() == NutType::Html {
                    self.transform(nut, request)
                } else {
                    Ok(nut.clone())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        next.process(&request.with_nuts(inspected))
    }
}

/// URL under which `nut` is served for the request's workflow.
pub fn url_of(nut: &Nut, request: &EngineRequest) -> Result<String> {
    if let Some(uri) = nut.proxy_uri() {
        return Ok(uri.to_string());
    }
    let version = nut.version_number()?.to_string();
    let url = merge_path(&[
        request.context_path(),
        request.workflow_id(),
        version.as_str(),
        nut.name(),
    ]);
    Ok(if url.starts_with('/') { url } else { format!("/{url}") })
}

fn render(nut: &Nut, request: &EngineRequest) -> Result<String> {
    let url = url_of(nut, request)?;
    let html = match nut.nut_type() {
        NutType::Css => format!(r#"<link type="text/css" rel="stylesheet" href="{url}" />"#),
        NutType::Javascript => {
            format!(r#"<script type="text/javascript" src="{url}"></script>"#)
        }
        t if t.is_image() => format!(r#"<img src="{url}" />"#),
        t => {
            debug!("No markup for {} ({})", nut.name(), t);
            return Ok(String::new());
        }
    };
    Ok(html + "\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::DiskNutDao;
    use crate::engine::{ChainSet, EngineChain, TextAggregatorEngine};
    use std::fs;
    use tempfile::tempdir;

    fn run(html: &str, with_aggregator: bool) -> Arc<Nut> {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("site")).unwrap();
        fs::write(dir.path().join("site/index.html"), html).unwrap();
        fs::write(dir.path().join("site/a.css"), "a{}").unwrap();
        fs::write(dir.path().join("site/b.js"), "b();").unwrap();
        let dao: Arc<dyn NutDao> = DiskNutDao::at(dir.path()).unwrap();
        let heap = Arc::new(NutsHeap::of("pages", dao, vec!["site/index.html".into()]));

        let mut engines: Vec<Arc<dyn Engine>> = vec![Arc::new(HtmlInspectorEngine::new(InspectorConfig::default()).unwrap())];
        if with_aggregator {
            engines.push(Arc::new(TextAggregatorEngine::default()));
        }
        let chain = EngineChain::new(engines);
        let request = EngineRequest::builder("wf", heap.clone())
            .nuts(heap.resolve().unwrap())
            .chains(Arc::new(ChainSet::from_chain(&chain)))
            .build();
        let out = ChainSet::from_chain(&chain).run(&request).unwrap();
        assert_eq!(out.len(), 1);
        out[0].materialize().unwrap()
    }

    #[test]
    fn test_contiguous_statements_become_one_heap() {
        let page = run(
            r#"<html><head><link href="a.css"><style>body{}</style><script src="b.js"></script></head></html>"#,
            false,
        );
        let referenced = page.referenced_nuts();
        let names: Vec<_> = referenced.iter().map(|n| file_name(n.name()).to_string()).collect();
        assert_eq!(names, vec!["a.css", "index.html-0-1.css", "b.js"]);

        let heap_id = parent_of(referenced[0].name()).to_string();
        assert!(referenced.iter().all(|n| n.name().starts_with(&heap_id)));
        assert_eq!(referenced[1].read_string().unwrap(), "body{}");

        let html = page.read_string().unwrap();
        assert!(html.starts_with("<html><head><link type=\"text/css\""));
        assert!(html.ends_with("</head></html>"));
        assert!(!html.contains("<style>"));
        assert_eq!(html.matches("rel=\"stylesheet\"").count(), 2);
        assert_eq!(html.matches("<script").count(), 1);
        assert!(html.contains(&format!("/wf/{}/{}", referenced[2].version_number().unwrap(), referenced[2].name())));
    }

    #[test]
    fn test_aggregated_heap_renders_one_reference_per_type() {
        let page = run(
            r#"<link href="a.css"><style>body{}</style><script src="b.js"></script>"#,
            true,
        );
        let referenced = page.referenced_nuts();
        assert_eq!(referenced.len(), 2);
        assert_eq!(file_name(referenced[0].name()), "aggregate.css");
        assert_eq!(referenced[0].read_string().unwrap(), "a{}\r\nbody{}");
        assert_eq!(file_name(referenced[1].name()), "aggregate.js");
    }

    #[test]
    fn test_skip_marker_keeps_statement() {
        let page = run(
            r#"<link data-wuic-skip href="a.css"><script src="b.js"></script>"#,
            false,
        );
        let html = page.read_string().unwrap();
        assert!(html.starts_with(r#"<link data-wuic-skip href="a.css">"#));
        assert_eq!(page.referenced_nuts().len(), 1);
    }

    #[test]
    fn test_escaping_path_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.html"), r#"<script src="../../x.js"></script>"#).unwrap();
        let dao: Arc<dyn NutDao> = DiskNutDao::at(dir.path()).unwrap();
        let heap = Arc::new(NutsHeap::of("pages", dao, vec!["index.html".into()]));
        let request = EngineRequest::builder("wf", heap.clone())
            .nuts(heap.resolve().unwrap())
            .build();
        let err = HtmlInspectorEngine::new(InspectorConfig::default()).unwrap()
            .transform(&request.nuts()[0], &request)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadArgument);
    }

    #[test]
    fn test_inline_names_stay_distinct_past_ten_groups() {
        let mut html = String::new();
        for group in 0..12 {
            match group {
                1 => {
                    html.push_str(&r#"<link href="a.css">"#.repeat(11));
                    html.push_str("<style>one{}</style>");
                }
                11 => html.push_str(r#"<link href="a.css"><style>two{}</style>"#),
                n => html.push_str(&format!("<style>g{n}{{}}</style>")),
            }
            html.push_str("<p>x</p>");
        }

        let page = run(&html, false);
        let referenced = page.referenced_nuts();
        let named = |wanted: &str| {
            referenced
                .iter()
                .find(|n| file_name(n.name()) == wanted)
                .unwrap_or_else(|| panic!("no {wanted}"))
                .read_string()
                .unwrap()
        };
        assert_eq!(named("index.html-1-11.css"), "one{}");
        assert_eq!(named("index.html-11-1.css"), "two{}");
        assert_eq!(named("index.html-10-0.css"), "g10{}");
    }

    #[test]
    fn test_page_behind_rooted_provider_resolves_relative_references() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("theme/site")).unwrap();
        fs::write(
            dir.path().join("theme/site/index.html"),
            r#"<link href="a.css"><script src="b.js"></script>"#,
        )
        .unwrap();
        fs::write(dir.path().join("theme/site/a.css"), "a{}").unwrap();
        fs::write(dir.path().join("theme/site/b.js"), "b();").unwrap();
        let dao = crate::dao::with_root_path(DiskNutDao::at(dir.path()).unwrap(), "theme");
        let heap = Arc::new(NutsHeap::of("pages", dao, vec!["site/index.html".into()]));

        let chain = EngineChain::new([
            Arc::new(HtmlInspectorEngine::new(InspectorConfig::default()).unwrap()) as Arc<dyn Engine>,
        ]);
        let request = EngineRequest::builder("wf", heap.clone())
            .nuts(heap.resolve().unwrap())
            .chains(Arc::new(ChainSet::from_chain(&chain)))
            .build();
        assert_eq!(request.nuts()[0].name(), "theme/site/index.html");

        let out = ChainSet::from_chain(&chain).run(&request).unwrap();
        let contents: Vec<String> = out[0]
            .referenced_nuts()
            .iter()
            .map(|n| n.read_string().unwrap())
            .collect();
        assert_eq!(contents, vec!["a{}", "b();"]);
    }
}
