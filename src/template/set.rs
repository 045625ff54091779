use crate::error::TplError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use super::exec;
use super::funcs::FuncRegistry;
use super::parse::Template;

/// All templates loaded for this process, keyed by name, sharing one helper registry
#[derive(Debug)]
pub struct TemplateSet {
    templates: BTreeMap<String, Template>,
    funcs: FuncRegistry,
}

impl TemplateSet {
    /// Parse every file matching `pattern`; each template is named after its file name
    pub fn from_glob(pattern: &str, funcs: FuncRegistry) -> Result<Self, TplError> {
        let paths = glob::glob(pattern).map_err(|e| TplError::TemplateGlob {
            pattern: pattern.to_string(),
            source: e,
        })?;

        let mut sources = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let path = e.path().display().to_string();
                TplError::TemplateRead {
                    path,
                    source: io::Error::from(e),
                }
            })?;
            let text = fs::read_to_string(&path).map_err(|e| TplError::TemplateRead {
                path: path.display().to_string(),
                source: e,
            })?;
            sources.push((template_name(&path), text));
        }

        if sources.is_empty() {
            return Err(TplError::NoTemplates {
                pattern: pattern.to_string(),
            });
        }

        let set = Self::from_sources(
            sources.iter().map(|(name, text)| (name.as_str(), text.as_str())),
            funcs,
        )?;
        tracing::debug!(
            pattern,
            templates = ?set.names().collect::<Vec<_>>(),
            "loaded templates"
        );
        Ok(set)
    }

    /// Parse in-memory `(name, text)` pairs; a later duplicate name replaces the earlier one
    pub fn from_sources<'s, I>(sources: I, funcs: FuncRegistry) -> Result<Self, TplError>
    where
        I: IntoIterator<Item = (&'s str, &'s str)>,
    {
        let mut templates = BTreeMap::new();
        for (name, text) in sources {
            let template = Template::parse(name, text, &funcs)?;
            templates.insert(name.to_string(), template);
        }
        Ok(Self { templates, funcs })
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Templates in name order
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn funcs(&self) -> &FuncRegistry {
        &self.funcs
    }

    /// Execute the template `name` against `data`, streaming output into `out`
    pub fn execute<W: Write>(&self, name: &str, data: &Value, out: &mut W) -> Result<(), TplError> {
        let template = self.get(name).ok_or_else(|| TplError::Render {
            template: name.to_string(),
            message: format!("no template named {:?}", name),
        })?;
        exec::execute(self, template, data, out)
    }
}

fn template_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_from_glob_names_by_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("hello.tmpl"), "Hello {{.Name}}!").unwrap();
        fs::write(dir.path().join("list.tmpl"), "{{range .Items}}{{.}}{{end}}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let pattern = dir.path().join("*.tmpl").display().to_string();
        let set = TemplateSet::from_glob(&pattern, FuncRegistry::standard()).unwrap();

        assert_eq!(set.names().collect::<Vec<_>>(), vec!["hello.tmpl", "list.tmpl"]);
    }

    #[test]
    fn test_from_glob_no_matches() {
        let dir = tempdir().unwrap();
        let pattern = dir.path().join("*.tmpl").display().to_string();
        let result = TemplateSet::from_glob(&pattern, FuncRegistry::standard());
        assert!(matches!(result, Err(TplError::NoTemplates { .. })));
    }

    #[test]
    fn test_from_glob_bad_pattern() {
        let result = TemplateSet::from_glob("/tmp/[", FuncRegistry::standard());
        assert!(matches!(result, Err(TplError::TemplateGlob { .. })));
    }

    #[test]
    fn test_from_glob_syntax_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.tmpl"), "{{if .X}}never closed").unwrap();

        let pattern = dir.path().join("*.tmpl").display().to_string();
        match TemplateSet::from_glob(&pattern, FuncRegistry::standard()) {
            Err(TplError::TemplateCompile { location, .. }) => {
                assert_eq!(location.file, "broken.tmpl");
            }
            other => panic!("Expected TemplateCompile error, got {:?}", other),
        }
    }

    #[test]
    fn test_execute_unknown_name() {
        let set = TemplateSet::from_sources([("a", "x")], FuncRegistry::new()).unwrap();
        let mut out = Vec::new();
        let result = set.execute("b", &json!({}), &mut out);
        assert!(matches!(result, Err(TplError::Render { .. })));
    }

    #[test]
    fn test_templates_in_name_order() {
        let set = TemplateSet::from_sources([("b", "2"), ("a", "1")], FuncRegistry::new()).unwrap();
        let names: Vec<&str> = set.templates().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
