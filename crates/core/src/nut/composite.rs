use super::version::{VersionNumber, combine_versions};
use super::{Nut, NutBuilder, NutContent, NutFlags};
use crate::error::{NutpipeError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

impl Nut {
    /// Composite streaming the concatenation of `parts`, `separator` between each.
    ///
    /// Nested composites are flattened. The name defaults to the first component's name.
    /// Components after the first contribute their referenced nuts.
    pub fn composite(
        name: Option<String>,
        separator: Option<&[u8]>,
        parts: Vec<Arc<Nut>>,
    ) -> Result<Arc<Nut>> {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            if part.is_composite() {
                flat.extend(part.components().iter().cloned());
            } else {
                flat.push(part);
            }
        }

        let first = flat
            .first()
            .cloned()
            .ok_or_else(|| NutpipeError::bad_argument("composite of zero nuts"))?;

        let mut referenced = first.referenced_nuts();
        for part in flat.iter().skip(1) {
            referenced.extend(part.referenced_nuts());
        }

        let flags = NutFlags {
            compressed: flat.iter().all(|p| p.is_compressed()),
            aggregatable: flat.iter().all(|p| p.is_aggregatable()),
            text_reducible: flat.iter().all(|p| p.is_text_reducible()),
            cacheable: flat.iter().all(|p| p.is_cacheable()),
        };

        let versions: Vec<VersionNumber> = flat.iter().map(|p| p.version().clone()).collect();
        let version = VersionNumber::deferred(move || {
            let values = versions
                .iter()
                .map(|v| v.value())
                .collect::<Result<Vec<_>>>()?;
            Ok(combine_versions(&values))
        });

        NutBuilder::new(
            name.unwrap_or_else(|| first.name().to_string()),
            first.nut_type(),
        )
        .version(version)
        .flags(flags)
        .proxy_uri(first.proxy_uri().map(str::to_string))
        .content(NutContent::Composite {
            parts: flat.clone(),
            separator: separator.map(Arc::from),
        })
        .originals(flat)
        .referenced(referenced)
        .build()
    }
}

/// Folds runs of same-named nuts into composites, keeping names unique.
///
/// A name already claimed in this combiner's lifetime receives a numeric prefix inserted
/// after its last `/`, so `css/a.css` becomes `css/0a.css`.
#[derive(Default)]
pub struct Combiner {
    state: Mutex<CombinerState>,
}

#[derive(Default)]
struct CombinerState {
    counter: usize,
    used: HashSet<String>,
}

impl Combiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[A, A, B, C, A]` becomes `[0A(A, A), B, C, A]`.
    ///
    /// Runs are claimed from the end so the last occurrence of a name keeps it bare.
    pub fn merge(&self, nuts: Vec<Arc<Nut>>) -> Result<Vec<Arc<Nut>>> {
        let mut runs: Vec<Vec<Arc<Nut>>> = Vec::new();
        for nut in nuts {
            match runs.last_mut() {
                Some(run) if run[0].name() == nut.name() => run.push(nut),
                _ => runs.push(vec![nut]),
            }
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names = vec![String::new(); runs.len()];
        for (idx, run) in runs.iter().enumerate().rev() {
            let name = run[0].name();
            names[idx] = if state.used.insert(name.to_string()) {
                name.to_string()
            } else {
                let mut prefixed = prefix_name(name, state.counter);
                state.counter += 1;
                while !state.used.insert(prefixed.clone()) {
                    prefixed = prefix_name(name, state.counter);
                    state.counter += 1;
                }
                prefixed
            };
        }
        drop(state);

        runs.into_iter()
            .zip(names)
            .map(|(mut run, name)| {
                if run.len() == 1 {
                    let nut = run.remove(0);
                    if nut.name() == name {
                        Ok(nut)
                    } else {
                        nut.renamed(name)
                    }
                } else {
                    Nut::composite(Some(name), None, run)
                }
            })
            .collect()
    }
}

fn prefix_name(name: &str, counter: usize) -> String {
    match name.rfind('/') {
        Some(idx) => format!("{}{}{}", &name[..=idx], counter, &name[idx + 1..]),
        None => format!("{counter}{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nut::NutType;

    fn css(name: &str, body: &str) -> Arc<Nut> {
        Nut::from_bytes(name, NutType::Css, body.as_bytes().to_vec())
    }

    #[test]
    fn test_composite_concatenates_with_separator() {
        let composite = Nut::composite(
            Some("aggregate.css".to_string()),
            Some(&b"\r\n"[..]),
            vec![css("a.css", "a{}"), css("b.css", "b{}")],
        )
        .unwrap();
        assert_eq!(composite.read_string().unwrap(), "a{}\r\nb{}");
        assert_eq!(composite.name(), "aggregate.css");
        assert_eq!(composite.original_nuts().len(), 2);
    }

    #[test]
    fn test_composite_name_defaults_to_first_component() {
        let composite = Nut::composite(None, None, vec![css("a.css", "a"), css("b.css", "b")]).unwrap();
        assert_eq!(composite.name(), "a.css");
        assert_eq!(composite.read_string().unwrap(), "ab");
    }

    #[test]
    fn test_nested_composites_are_flattened() {
        let inner = Nut::composite(None, None, vec![css("a.css", "a"), css("b.css", "b")]).unwrap();
        let outer = Nut::composite(None, None, vec![inner, css("c.css", "c")]).unwrap();
        assert_eq!(outer.components().len(), 3);
    }

    #[test]
    fn test_composite_version_is_deterministic() {
        let a = Nut::composite(None, None, vec![css("a.css", "a"), css("b.css", "b")]).unwrap();
        let b = Nut::composite(None, None, vec![css("a.css", "a"), css("b.css", "b")]).unwrap();
        assert_eq!(a.version_number().unwrap(), b.version_number().unwrap());
    }

    #[test]
    fn test_empty_composite_is_rejected() {
        assert!(Nut::composite(None, None, Vec::new()).is_err());
    }

    #[test]
    fn test_merge_folds_consecutive_names() {
        let a1 = css("a.css", "1");
        let a2 = css("a.css", "2");
        let b = css("b.css", "b");
        let c = css("c.css", "c");
        let a3 = css("a.css", "3");

        let merged = Combiner::new()
            .merge(vec![a1, a2, b.clone(), c.clone(), a3.clone()])
            .unwrap();

        assert_eq!(merged.len(), 4);
        assert!(merged[0].is_composite());
        assert_ne!(merged[0].name(), "a.css");
        assert!(merged[0].name().ends_with("a.css"));
        assert_eq!(merged[0].read_string().unwrap(), "12");
        assert!(Arc::ptr_eq(&merged[1], &b));
        assert!(Arc::ptr_eq(&merged[2], &c));
        assert!(Arc::ptr_eq(&merged[3], &a3));
    }

    #[test]
    fn test_merge_names_stay_unique_across_calls() {
        let combiner = Combiner::new();
        let first = combiner.merge(vec![css("css/a.css", "1")]).unwrap();
        let second = combiner.merge(vec![css("css/a.css", "2")]).unwrap();
        assert_eq!(first[0].name(), "css/a.css");
        assert_eq!(second[0].name(), "css/0a.css");
    }
}
